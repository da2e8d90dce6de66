//! Field validation shared by request models.
//!
//! Every failure is an [`Error::Validation`] naming the offending field, so clients can attach the
//! message to the right form input.

use crate::errors::Error;
use crate::geo::normalize_zip;
use rust_decimal::Decimal;

pub fn invalid(field: &str, message: impl Into<String>) -> Error {
    Error::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Trimmed text whose character count lies within `min..=max`.
pub fn text(field: &str, value: &str, min: usize, max: usize) -> Result<String, Error> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(if min == 1 {
            invalid(field, "must not be empty")
        } else {
            invalid(field, format!("must be at least {min} characters"))
        });
    }
    if len > max {
        return Err(invalid(field, format!("must be at most {max} characters")));
    }
    Ok(trimmed.to_string())
}

/// Like [`text`], but blank input becomes `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, Error> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => text(field, value, 1, max).map(Some),
    }
}

pub fn zip(field: &str, value: &str) -> Result<String, Error> {
    normalize_zip(value).ok_or_else(|| invalid(field, "must be a 5-digit ZIP code"))
}

/// A strictly positive amount with at most two decimal places.
pub fn money(field: &str, value: Decimal) -> Result<Decimal, Error> {
    if value <= Decimal::ZERO {
        return Err(invalid(field, "must be greater than zero"));
    }
    if value.normalize().scale() > 2 {
        return Err(invalid(field, "must have at most two decimal places"));
    }
    if value >= Decimal::from(100_000_000) {
        return Err(invalid(field, "is too large"));
    }
    Ok(value.round_dp(2))
}

pub fn range<T: PartialOrd + std::fmt::Display + Copy>(field: &str, value: T, min: T, max: T) -> Result<T, Error> {
    if value < min || value > max {
        return Err(invalid(field, format!("must be between {min} and {max}")));
    }
    Ok(value)
}

pub fn http_url(field: &str, value: &str) -> Result<String, Error> {
    let parsed = url::Url::parse(value.trim()).map_err(|_| invalid(field, "must be a valid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(field, "must be an http(s) URL"));
    }
    Ok(parsed.to_string())
}

pub fn email(field: &str, value: &str) -> Result<String, Error> {
    let value = value.trim().to_ascii_lowercase();
    let valid = match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
        None => false,
    };
    if !valid || value.len() > 254 || value.contains(char::is_whitespace) {
        return Err(invalid(field, "must be a valid email address"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_text_trims_and_bounds() {
        assert_eq!(text("title", "  Eggs  ", 1, 10).unwrap(), "Eggs");
        assert!(matches!(text("title", "   ", 1, 10), Err(Error::Validation { field, .. }) if field == "title"));
        assert!(text("title", "abcdefghijk", 1, 10).is_err());
        // characters, not bytes
        assert!(text("title", "ééééé", 1, 5).is_ok());
    }

    #[test]
    fn test_optional_text_blank_is_none() {
        assert_eq!(optional_text("note", Some("  "), 10).unwrap(), None);
        assert_eq!(optional_text("note", None, 10).unwrap(), None);
        assert_eq!(optional_text("note", Some(" hi "), 10).unwrap().as_deref(), Some("hi"));
    }

    #[test]
    fn test_money() {
        assert_eq!(money("price", Decimal::from_str("4.50").unwrap()).unwrap(), Decimal::from_str("4.5").unwrap());
        assert!(money("price", Decimal::from_str("4.500").unwrap()).is_ok());
        assert!(money("price", Decimal::from_str("4.505").unwrap()).is_err());
        assert!(money("price", Decimal::ZERO).is_err());
        assert!(money("price", Decimal::from_str("-1").unwrap()).is_err());
    }

    #[test]
    fn test_zip_and_email() {
        assert_eq!(zip("zip", "05401-1234").unwrap(), "05401");
        assert!(zip("zip", "ABCDE").is_err());
        assert_eq!(email("email", " Farmer@Example.COM ").unwrap(), "farmer@example.com");
        assert!(email("email", "farmer@localhost").is_err());
        assert!(email("email", "@example.com").is_err());
    }

    #[test]
    fn test_http_url() {
        assert!(http_url("image_url", "https://cdn.example.com/eggs.jpg").is_ok());
        assert!(http_url("image_url", "javascript:alert(1)").is_err());
        assert!(http_url("image_url", "not a url").is_err());
    }
}
