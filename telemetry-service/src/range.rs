use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::EngineError;

const DAY_SECONDS: i64 = 86_400;

/// Raw range parameters as they arrive on a query. `from`/`to` accept
/// either epoch seconds or wall-clock date strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeQuery {
    pub period: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub from: i64,
    pub to: i64,
    pub duration_seconds: i64,
}

pub fn parse_timezone(name: Option<&str>) -> Result<Tz, EngineError> {
    let name = name.unwrap_or("UTC");
    name.parse::<Tz>()
        .map_err(|_| EngineError::validation(format!("unknown timezone: {name}")))
}

/// Resolve a period or explicit bounds into absolute epoch seconds.
///
/// Numeric bound strings are epoch seconds (UTC); non-numeric strings
/// are wall-clock dates interpreted in the request timezone. When
/// explicit bounds are absent, the period keyword selects a lookback
/// from `now` (default one day).
pub fn resolve_range(query: &RangeQuery, now: i64) -> Result<ResolvedRange, EngineError> {
    let tz = parse_timezone(query.timezone.as_deref())?;

    let (from, to) = match (&query.from, &query.to) {
        (Some(f), Some(t)) => (parse_bound(f, tz)?, parse_bound(t, tz)?),
        _ => {
            let days = match query.period.as_deref() {
                Some("week") => 7,
                Some("month") => 30,
                Some("year") => 365,
                _ => 1,
            };
            (now - days * DAY_SECONDS, now)
        }
    };

    Ok(ResolvedRange {
        from,
        to,
        duration_seconds: (to - from).max(1),
    })
}

/// Default bucket width for a range when the caller does not pass an
/// explicit interval. Wider ranges get coarser buckets.
pub fn default_interval(duration_seconds: i64) -> i64 {
    match duration_seconds {
        d if d <= 6 * 3600 => 300,
        d if d <= 2 * DAY_SECONDS => 900,
        d if d <= 7 * DAY_SECONDS => 3600,
        d if d <= 31 * DAY_SECONDS => 14_400,
        _ => DAY_SECONDS,
    }
}

fn parse_bound(raw: &str, tz: Tz) -> Result<i64, EngineError> {
    let trimmed = raw.trim();

    if let Ok(epoch) = trimmed.parse::<i64>() {
        return Ok(epoch);
    }

    // Offset-qualified strings carry their own zone.
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp());
    }

    let local = if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        dt
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        dt
    } else if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        d.and_hms_opt(0, 0, 0)
            .ok_or_else(|| EngineError::validation(format!("unrepresentable date: {raw}")))?
    } else {
        return Err(EngineError::validation(format!("unparsable time bound: {raw}")));
    };

    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| EngineError::validation(format!("time does not exist in timezone: {raw}")))
}

/// Local hour (0-23) of an epoch timestamp in the given zone.
pub fn local_hour(epoch: i64, tz: Tz) -> u32 {
    use chrono::Timelike;

    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.with_timezone(&tz).hour())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_epoch_bounds_pass_through() {
        let q = RangeQuery {
            from: Some("1000".to_string()),
            to: Some("5000".to_string()),
            ..Default::default()
        };
        let r = resolve_range(&q, 99_999).unwrap();
        assert_eq!(r.from, 1000);
        assert_eq!(r.to, 5000);
        assert_eq!(r.duration_seconds, 4000);
    }

    #[test]
    fn period_fallback_defaults_to_one_day() {
        let now = 1_700_000_000;
        let r = resolve_range(&RangeQuery::default(), now).unwrap();
        assert_eq!(r.to, now);
        assert_eq!(r.from, now - DAY_SECONDS);
    }

    #[test]
    fn period_keywords_select_lookback() {
        let now = 1_700_000_000;
        for (period, days) in [("week", 7), ("month", 30), ("year", 365)] {
            let q = RangeQuery {
                period: Some(period.to_string()),
                ..Default::default()
            };
            let r = resolve_range(&q, now).unwrap();
            assert_eq!(r.from, now - days * DAY_SECONDS, "period {period}");
        }
    }

    #[test]
    fn wall_clock_date_parses_in_timezone() {
        let q = RangeQuery {
            from: Some("2024-01-15".to_string()),
            to: Some("2024-01-16".to_string()),
            timezone: Some("America/New_York".to_string()),
            ..Default::default()
        };
        let r = resolve_range(&q, 0).unwrap();
        // Midnight Jan 15 in New York is 05:00 UTC.
        assert_eq!(r.from, 1_705_294_800);
        assert_eq!(r.duration_seconds, DAY_SECONDS);
    }

    #[test]
    fn inverted_bounds_clamp_duration_to_one() {
        let q = RangeQuery {
            from: Some("5000".to_string()),
            to: Some("1000".to_string()),
            ..Default::default()
        };
        let r = resolve_range(&q, 0).unwrap();
        assert_eq!(r.duration_seconds, 1);
    }

    #[test]
    fn unknown_timezone_is_a_validation_error() {
        let q = RangeQuery {
            timezone: Some("Mars/Olympus".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_range(&q, 0),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn default_interval_widens_with_duration() {
        assert_eq!(default_interval(3600), 300);
        assert_eq!(default_interval(6 * 3600), 300);
        assert_eq!(default_interval(DAY_SECONDS), 900);
        assert_eq!(default_interval(3 * DAY_SECONDS), 3600);
        assert_eq!(default_interval(20 * DAY_SECONDS), 14_400);
        assert_eq!(default_interval(90 * DAY_SECONDS), DAY_SECONDS);
    }

    #[test]
    fn local_hour_respects_zone() {
        // 2024-06-01 00:00 UTC is 20:00 the previous evening in New York.
        let tz: Tz = "America/New_York".parse().unwrap();
        assert_eq!(local_hour(1_717_200_000, tz), 20);
        assert_eq!(local_hour(1_717_200_000, chrono_tz::UTC), 0);
    }
}
