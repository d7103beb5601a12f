//! SVN revision timestamp handling
//!
//! The wire format is `YYYY-MM-DDThh:mm:ss.ffffffZ` (27 bytes, UTC).
//! Parsing is lenient: anything that does not match yields the zero date.
//! Serialization is always canonical.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// A parsed revision date: seconds since the epoch plus microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RevDate {
    pub seconds: i64,
    pub micros: u32,
}

impl RevDate {
    pub fn new(seconds: i64, micros: u32) -> Self {
        Self { seconds, micros }
    }

    /// Parse an svn date string.
    ///
    /// Malformed or absent input is tolerated and maps to the zero date;
    /// the caller re-serializes canonically on write.
    pub fn parse(date_str: &str) -> Self {
        let bytes = date_str.as_bytes();
        if bytes.len() != 27 || bytes[19] != b'.' || bytes[26] != b'Z' {
            return Self::default();
        }
        let micros = match date_str[20..26].parse::<u32>() {
            Ok(m) => m,
            Err(_) => return Self::default(),
        };
        match NaiveDateTime::parse_from_str(&date_str[..19], "%Y-%m-%dT%H:%M:%S") {
            Ok(dt) => Self::new(dt.and_utc().timestamp(), micros),
            Err(_) => Self::default(),
        }
    }

    /// Format as the canonical 27-byte svn date string.
    pub fn to_svn_string(&self) -> String {
        let dt: DateTime<Utc> = DateTime::from_timestamp(self.seconds, 0).unwrap_or_default();
        format!("{}.{:06}Z", dt.format("%Y-%m-%dT%H:%M:%S"), self.micros)
    }
}

impl std::fmt::Display for RevDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_svn_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_date() {
        let d = RevDate::parse("2004-01-01T12:30:00.123456Z");
        assert_eq!(d.micros, 123456);
        assert_eq!(d.to_svn_string(), "2004-01-01T12:30:00.123456Z");
    }

    #[test]
    fn parse_epoch() {
        let d = RevDate::parse("1970-01-01T00:00:00.000000Z");
        assert_eq!(d, RevDate::new(0, 0));
    }

    #[test]
    fn malformed_input_maps_to_zero() {
        assert_eq!(RevDate::parse(""), RevDate::default());
        assert_eq!(RevDate::parse("not a date at all, definitel"), RevDate::default());
        assert_eq!(RevDate::parse("2004-01-01T12:30:00.123456X"), RevDate::default());
        assert_eq!(RevDate::parse("2004-01-01T12:30:00,123456Z"), RevDate::default());
    }

    #[test]
    fn canonical_form_is_27_bytes() {
        assert_eq!(RevDate::default().to_svn_string().len(), 27);
        assert_eq!(RevDate::new(1_100_000_000, 42).to_svn_string().len(), 27);
    }

    #[test]
    fn ordering_follows_time() {
        let a = RevDate::new(100, 999_999);
        let b = RevDate::new(101, 0);
        assert!(a < b);
        assert!(RevDate::new(100, 1) > RevDate::new(100, 0));
    }
}
