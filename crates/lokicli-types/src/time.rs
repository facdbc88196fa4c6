//! Time bound parsing and conversion
//!
//! Human bounds use `YYYY-MM-DDTHH:MM:SSZ`; the query service wants decimal
//! nanosecond epoch values.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::{LokiError, Result, TimeWindow};

/// Format of `--from_time` / `--to_time`
pub const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Parse a `YYYY-MM-DDTHH:MM:SSZ` timestamp
pub fn parse_utc(value: &str) -> Result<DateTime<Utc>> {
    let invalid = || {
        LokiError::Validation(format!(
            "Invalid time '{value}'. Correct format is: YYYY-MM-DDTHH:MM:SSZ."
        ))
    };

    if value.len() != 20 {
        return Err(invalid());
    }
    NaiveDateTime::parse_from_str(value, UTC_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid())
}

pub fn format_utc(time: &DateTime<Utc>) -> String {
    time.format(UTC_FORMAT).to_string()
}

/// Whole seconds since the epoch, scaled to nanoseconds
pub fn to_epoch_nanos(time: &DateTime<Utc>) -> i64 {
    time.timestamp().saturating_mul(NANOS_PER_SECOND)
}

/// Parse the since-shorthand: an integer followed by `m` or `h`
pub fn parse_since(since: &str) -> Result<Duration> {
    let invalid = || {
        LokiError::Validation(
            "Invalid format for since. Specify value in minutes or hours eg: 30m or 1h."
                .to_string(),
        )
    };

    let (value, minutes_per_unit) = if let Some(value) = since.strip_suffix('m') {
        (value, 1)
    } else if let Some(value) = since.strip_suffix('h') {
        (value, 60)
    } else {
        return Err(invalid());
    };

    let value: i64 = value.parse().map_err(|_| invalid())?;
    if value < 0 {
        return Err(invalid());
    }
    value
        .checked_mul(minutes_per_unit)
        .and_then(Duration::try_minutes)
        .ok_or_else(invalid)
}

/// A validated pair of human time bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UtcRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl UtcRange {
    /// Resolve explicit bounds, or fall back to `[now - since, now]`.
    ///
    /// Giving only one of `from`/`to` is an error.
    pub fn resolve(
        from: Option<&str>,
        to: Option<&str>,
        since: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        match (from, to) {
            (Some(from), Some(to)) => {
                let from = parse_utc(from)?;
                let to = parse_utc(to)?;
                if from >= to {
                    return Err(LokiError::Validation(
                        "'from_time' cannot be after 'to_time'.".to_string(),
                    ));
                }
                Ok(Self { from, to })
            }
            (None, None) => {
                // Truncate to whole seconds so both bounds round-trip through UTC_FORMAT
                let to = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
                Ok(Self {
                    from: to - parse_since(since)?,
                    to,
                })
            }
            _ => Err(LokiError::Validation(
                "Both 'from_time' and 'to_time' times must be specified.".to_string(),
            )),
        }
    }

    /// Nanosecond window for range queries
    pub fn window(&self) -> Result<TimeWindow> {
        TimeWindow::new(to_epoch_nanos(&self.from), to_epoch_nanos(&self.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc_to_nanos() {
        let time = parse_utc("2024-01-22T10:30:00Z").unwrap();
        assert_eq!(to_epoch_nanos(&time), 1_705_919_400_000_000_000);
        assert_eq!(format_utc(&time), "2024-01-22T10:30:00Z");
    }

    #[test]
    fn test_parse_utc_rejects_other_formats() {
        assert!(parse_utc("2024-01-22 10:30:00").is_err());
        assert!(parse_utc("2024-01-22T10:30:00.123Z").is_err());
        assert!(parse_utc("2024-01-22T10:30:00+00:00").is_err());
    }

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_since("2h").unwrap(), Duration::hours(2));
        assert!(parse_since("h").is_err());
        assert!(parse_since("10d").is_err());
        assert!(parse_since("xm").is_err());
        assert!(parse_since("-5m").is_err());
    }

    #[test]
    fn test_parse_since_non_ascii_unit() {
        assert!(matches!(parse_since("5µ"), Err(LokiError::Validation(_))));
        assert!(matches!(parse_since("µ"), Err(LokiError::Validation(_))));
        assert!(matches!(parse_since("5mµ"), Err(LokiError::Validation(_))));
        assert!(matches!(parse_since("µm"), Err(LokiError::Validation(_))));
    }

    #[test]
    fn test_resolve_explicit_range() {
        let now = Utc::now();
        let range = UtcRange::resolve(
            Some("2024-01-22T10:00:00Z"),
            Some("2024-01-22T12:00:00Z"),
            "1h",
            now,
        )
        .unwrap();
        let window = range.window().unwrap();
        assert_eq!(window.end() - window.start(), 2 * 3600 * NANOS_PER_SECOND);
    }

    #[test]
    fn test_resolve_requires_both_bounds() {
        let err = UtcRange::resolve(Some("2024-01-22T10:00:00Z"), None, "1h", Utc::now());
        assert!(matches!(err, Err(LokiError::Validation(_))));
    }

    #[test]
    fn test_resolve_rejects_reversed_bounds() {
        let err = UtcRange::resolve(
            Some("2024-01-22T12:00:00Z"),
            Some("2024-01-22T10:00:00Z"),
            "1h",
            Utc::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_resolve_since() {
        let now = parse_utc("2024-01-22T12:00:00Z").unwrap();
        let range = UtcRange::resolve(None, None, "30m", now).unwrap();
        assert_eq!(format_utc(&range.from), "2024-01-22T11:30:00Z");
        assert_eq!(range.to, now);
    }
}
