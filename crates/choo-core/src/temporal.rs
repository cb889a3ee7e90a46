//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to millisecond
//! precision. Staleness checks (stuck staging records, retry-entry age) are
//! computed by subtracting two `Timestamp`s, so every stored instant uses
//! the same precision and the same zone.
//!
//! Serialized as RFC 3339 with a `Z` suffix, e.g. `2026-01-15T12:00:00.250Z`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC-only timestamp, truncated to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-millisecond precision.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_millis(dt))
    }

    /// Parse an RFC 3339 string, accepting any offset and converting to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimestamp`] if the string is not
    /// valid RFC 3339.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| ValidationError::InvalidTimestamp {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// From Unix epoch milliseconds.
    pub fn from_epoch_millis(millis: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimestamp {
                value: millis.to_string(),
                reason: "out of range".to_string(),
            })
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch milliseconds.
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Time elapsed from `earlier` to `self`. Negative if `earlier` is later.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        self.0 - earlier.0
    }

    /// This instant shifted back by `d`, saturating at the representable range.
    pub fn saturating_sub(&self, d: Duration) -> Self {
        Self(self.0.checked_sub_signed(d).unwrap_or(self.0))
    }

    /// This instant shifted forward by `d`, saturating at the representable range.
    pub fn saturating_add(&self, d: Duration) -> Self {
        Self(self.0.checked_add_signed(d).unwrap_or(self.0))
    }

    /// Render as RFC 3339 with millisecond precision and `Z` suffix.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn now_has_millisecond_precision() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn from_utc_truncates_sub_millis() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let dt = dt.with_nanosecond(123_456_789).unwrap();
        let ts = Timestamp::from_utc(dt);
        assert_eq!(ts.to_rfc3339(), "2026-01-15T12:30:45.123Z");
    }

    #[test]
    fn parse_converts_offsets_to_utc() {
        let ts = Timestamp::parse("2026-01-15T17:00:00+05:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-15T12:00:00.000Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Timestamp::parse("not-a-date").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn duration_since_measures_age() {
        let created = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let now = Timestamp::parse("2026-01-15T12:10:01Z").unwrap();
        assert_eq!(now.duration_since(created), Duration::seconds(601));
        assert!(created.duration_since(now) < Duration::zero());
    }

    #[test]
    fn epoch_millis_roundtrip() {
        let ts = Timestamp::parse("2026-01-15T12:00:00.250Z").unwrap();
        let back = Timestamp::from_epoch_millis(ts.epoch_millis()).unwrap();
        assert_eq!(ts, back);
    }

    #[test]
    fn serde_roundtrip() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn saturating_sub_moves_back() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let earlier = ts.saturating_sub(Duration::minutes(5));
        assert_eq!(earlier.to_rfc3339(), "2026-01-15T11:55:00.000Z");
    }
}
