use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{VellumError, VellumResult};

/// UTC microseconds since the epoch.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Micros(pub i64);

impl Micros {
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64;
        Self(micros)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn from_i64(value: i64) -> Self {
        Self(value)
    }

    /// Parse a date-parseable string (RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`,
    /// or a bare `YYYY-MM-DD`) into UTC microseconds.
    pub fn from_date_string(value: &str) -> VellumResult<Self> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(parsed.timestamp_micros()));
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(Self(parsed.and_utc().timestamp_micros()));
        }
        if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            let midnight = parsed
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| VellumError::invalid(format!("invalid date '{value}'")))?;
            return Ok(Self(midnight.and_utc().timestamp_micros()));
        }
        Err(VellumError::invalid(format!(
            "'{value}' is not a parseable date"
        )))
    }

    pub fn to_datetime(self) -> VellumResult<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
            .ok_or_else(|| VellumError::invalid(format!("{} is out of date range", self.0)))
    }
}

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Micros;

    #[test]
    fn parses_rfc3339() {
        let micros = Micros::from_date_string("2024-03-01T12:30:00Z").expect("parse");
        assert_eq!(micros.as_i64(), 1_709_296_200_000_000);
    }

    #[test]
    fn parses_bare_dates_as_midnight_utc() {
        let midnight = Micros::from_date_string("2024-03-01").expect("parse");
        let explicit = Micros::from_date_string("2024-03-01T00:00:00Z").expect("parse");
        assert_eq!(midnight, explicit);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Micros::from_date_string("yesterday-ish").is_err());
    }

    #[test]
    fn roundtrips_through_datetime() {
        let now = Micros::now();
        let datetime = now.to_datetime().expect("datetime");
        assert_eq!(datetime.timestamp_micros(), now.as_i64());
    }
}
