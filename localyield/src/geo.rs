//! ZIP code validation and centroid-based distances.
//!
//! Distances are computed between ZIP centroids with the haversine formula. A ZIP that isn't in
//! the [`ZipDirectory`] simply has no distance; callers treat that as "unknown", never as an error.

use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use tracing::info;

/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Normalize a US ZIP code to its 5-digit form.
///
/// Accepts `12345` and `12345-6789`; surrounding whitespace is ignored.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (base, plus4) = match raw.split_once('-') {
        Some((base, plus4)) => (base, Some(plus4)),
        None => (raw, None),
    };

    let all_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(base, 5) {
        return None;
    }
    if let Some(plus4) = plus4
        && !all_digits(plus4, 4)
    {
        return None;
    }
    Some(base.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Great-circle distance in miles.
pub fn haversine_miles(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Deserialize)]
struct CentroidRow {
    zip: String,
    lat: f64,
    lng: f64,
}

/// In-memory ZIP → centroid lookup.
#[derive(Debug, Clone, Default)]
pub struct ZipDirectory {
    centroids: HashMap<String, LatLng>,
}

impl ZipDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load centroids from a CSV file with a `zip,lat,lng` header.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| anyhow::anyhow!("Failed to open ZIP centroids {}: {e}", path.display()))?;
        let directory = Self::from_reader(file)?;
        info!(path = %path.display(), zips = directory.len(), "Loaded ZIP centroids");
        Ok(directory)
    }

    /// Rows with an invalid ZIP or out-of-range coordinates are rejected rather than skipped.
    pub fn from_reader<R: std::io::Read>(reader: R) -> anyhow::Result<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut centroids = HashMap::new();

        for (index, row) in csv.deserialize::<CentroidRow>().enumerate() {
            let row = row?;
            // +2: header line and 1-based numbering
            let line = index + 2;
            let zip = normalize_zip(&row.zip).ok_or_else(|| anyhow::anyhow!("line {line}: invalid ZIP '{}'", row.zip))?;
            if !(-90.0..=90.0).contains(&row.lat) || !(-180.0..=180.0).contains(&row.lng) {
                anyhow::bail!("line {line}: coordinates out of range for ZIP {zip}");
            }
            centroids.insert(zip, LatLng { lat: row.lat, lng: row.lng });
        }

        Ok(Self { centroids })
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn lookup(&self, zip: &str) -> Option<LatLng> {
        let zip = normalize_zip(zip)?;
        self.centroids.get(&zip).copied()
    }

    /// Distance between two ZIP centroids, `None` if either is unknown.
    pub fn distance_miles(&self, from: &str, to: &str) -> Option<f64> {
        Some(haversine_miles(self.lookup(from)?, self.lookup(to)?))
    }
}

impl FromIterator<(String, LatLng)> for ZipDirectory {
    fn from_iter<I: IntoIterator<Item = (String, LatLng)>>(iter: I) -> Self {
        Self {
            centroids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = "zip,lat,lng\n05401,44.4759,-73.2121\n05602, 44.2601,-72.5754\n10001,40.7506,-73.9972\n";

    #[test]
    fn test_normalize_zip() {
        assert_eq!(normalize_zip("05401").as_deref(), Some("05401"));
        assert_eq!(normalize_zip(" 05401-1234 ").as_deref(), Some("05401"));
        assert_eq!(normalize_zip("5401"), None);
        assert_eq!(normalize_zip("05401-12"), None);
        assert_eq!(normalize_zip("0540a"), None);
        assert_eq!(normalize_zip("054011"), None);
        assert_eq!(normalize_zip(""), None);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Burlington VT to New York City, roughly 260 miles
        let d = haversine_miles(
            LatLng { lat: 44.4759, lng: -73.2121 },
            LatLng { lat: 40.7506, lng: -73.9972 },
        );
        assert!((255.0..265.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_haversine_zero_and_symmetric() {
        let a = LatLng { lat: 44.0, lng: -72.0 };
        let b = LatLng { lat: 45.0, lng: -71.0 };
        assert_eq!(haversine_miles(a, a), 0.0);
        assert!((haversine_miles(a, b) - haversine_miles(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_directory_from_csv() {
        let zips = ZipDirectory::from_reader(FIXTURE.as_bytes()).unwrap();
        assert_eq!(zips.len(), 3);
        assert!(zips.lookup("05602-0001").is_some());

        let d = zips.distance_miles("05401", "05602").unwrap();
        assert!((30.0..45.0).contains(&d), "got {d}");
        assert_eq!(zips.distance_miles("05401", "99999"), None);
        assert_eq!(zips.distance_miles("not-a-zip", "05401"), None);
    }

    #[test]
    fn test_directory_rejects_bad_rows() {
        let err = ZipDirectory::from_reader("zip,lat,lng\n123,1.0,1.0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(ZipDirectory::from_reader("zip,lat,lng\n12345,91.0,1.0\n".as_bytes()).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let zips = ZipDirectory::load(file.path()).unwrap();
        assert_eq!(zips.len(), 3);

        assert!(ZipDirectory::load(Path::new("/nonexistent/zips.csv")).is_err());
    }
}
