//! Authentication helper functions.

use rand::prelude::RngExt;
use rand::rng;

/// Generate a friendly display name for accounts that arrive without one.
/// Format: "{adjective} {noun} {4-digit number}"
/// Example: "Sunny Orchard 4729"
pub fn generate_random_display_name() -> String {
    const ADJECTIVES: &[&str] = &[
        "Sunny", "Rustic", "Golden", "Misty", "Wild", "Green", "Quiet", "Hardy", "Early", "Bright", "Mossy", "Amber",
    ];

    const NOUNS: &[&str] = &[
        "Orchard", "Meadow", "Acre", "Harvest", "Pasture", "Grove", "Hollow", "Barn", "Field", "Creek", "Garden", "Ridge",
    ];

    let mut rng = rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    let number = rng.random_range(1000..10000);

    format!("{adjective} {noun} {number}")
}

/// Value of the named cookie in a `Cookie` header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
