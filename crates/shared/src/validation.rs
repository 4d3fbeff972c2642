//! Common validation utilities for request fields.

use chrono::Datelike;
use validator::ValidationError;

/// Validates that a latitude value is within valid range (-90 to 90).
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be between -180 and 180".into());
        Err(err)
    }
}

/// Validates an equipment identifier: alphanumeric characters, hyphens and
/// underscores only.
pub fn validate_identifier(identifier: &str) -> Result<(), ValidationError> {
    if !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_identifier");
        err.message = Some(
            "Identifier may only contain alphanumeric characters, hyphens, and underscores".into(),
        );
        Err(err)
    }
}

/// Validates a site progress percentage (0 to 100).
pub fn validate_progress(progress: i32) -> Result<(), ValidationError> {
    if (0..=100).contains(&progress) {
        Ok(())
    } else {
        let mut err = ValidationError::new("progress_range");
        err.message = Some("Progress must be between 0 and 100".into());
        Err(err)
    }
}

/// Validates a manufacturing year. Anything before 1900 or absurdly far in
/// the future is treated as a data entry error.
pub fn validate_year(year: i32) -> Result<(), ValidationError> {
    let next_year = chrono::Utc::now().date_naive().year() + 1;
    if (1900..=next_year).contains(&year) {
        Ok(())
    } else {
        let mut err = ValidationError::new("year_range");
        err.message = Some("Year is out of range".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latitude_bounds() {
        assert!(validate_latitude(0.0).is_ok());
        assert!(validate_latitude(-90.0).is_ok());
        assert!(validate_latitude(90.0).is_ok());
        assert!(validate_latitude(90.01).is_err());
        assert!(validate_latitude(-120.0).is_err());
    }

    #[test]
    fn longitude_bounds() {
        assert!(validate_longitude(180.0).is_ok());
        assert!(validate_longitude(-180.0).is_ok());
        assert!(validate_longitude(181.0).is_err());
    }

    #[test]
    fn identifier_charset() {
        assert!(validate_identifier("CRANE-042").is_ok());
        assert!(validate_identifier("drill_07").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad id").is_err());
        assert!(validate_identifier("semi;colon").is_err());
    }

    #[test]
    fn progress_bounds() {
        assert!(validate_progress(0).is_ok());
        assert!(validate_progress(100).is_ok());
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(-1).is_err());
    }

    #[test]
    fn year_bounds() {
        assert!(validate_year(2020).is_ok());
        assert!(validate_year(1899).is_err());
        assert!(validate_year(3000).is_err());
    }
}
