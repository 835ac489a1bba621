//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `updated_at`, `start_time`, `created_at`, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse an RFC 3339 timestamp into UTC.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimestamp`](crate::error::ValidationError::InvalidTimestamp)
/// when `value` is not valid RFC 3339.
pub fn parse_rfc3339(value: &str) -> Result<Timestamp, crate::error::ValidationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(|_| crate::error::ValidationError::InvalidTimestamp(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_parse_offset_timestamps_into_utc() {
        let ts = parse_rfc3339("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn should_reject_malformed_timestamps() {
        assert!(parse_rfc3339("yesterday").is_err());
    }
}
