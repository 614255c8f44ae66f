use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage format for timestamps: fixed-width UTC with microseconds, so
/// lexicographic order over the stored strings equals chronological order.
const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn to_storage(ts: DateTime<Utc>) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts RFC 3339 as a fallback because older
/// rows may carry SQLite's own `datetime('now')` output or client-supplied
/// values.
pub fn from_storage(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ts.and_utc());
    }
    value
        .parse::<DateTime<Utc>>()
        .map_err(|e| anyhow!("unparseable timestamp '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_roundtrip() {
        let now = Utc::now();
        let stored = to_storage(now);
        let parsed = from_storage(&stored).unwrap();
        // Microsecond precision is preserved
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn accepts_sqlite_datetime() {
        let parsed = from_storage("2026-08-08 10:30:00").unwrap();
        assert_eq!(parsed.timestamp() % 60, 0);
    }

    #[test]
    fn storage_order_is_chronological() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(to_storage(earlier) < to_storage(later));
    }
}
