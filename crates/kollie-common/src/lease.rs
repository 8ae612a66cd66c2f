//! Lease and uptime window arithmetic
//!
//! An app's lease is expressed to the cluster downscaler as an uptime
//! window `<start>-<end>`. Leases are daily: the window runs from now until
//! the given hour (UTC) on today's date plus a day offset.

use chrono::{DateTime, Duration, DurationRound, NaiveTime, Utc};

use crate::timestamp::format_timestamp;
use crate::{Error, Result};

/// Hour (UTC) a lease expires at when none is given
pub const DEFAULT_LEASE_HOUR: u32 = 19;

/// Days a lease is extended by when none is given
pub const DEFAULT_LEASE_DAYS: u32 = 0;

/// Largest day offset a lease may be extended by
pub const MAX_LEASE_DAYS: u32 = 5;

/// Uptime window from now until `hour`:00 UTC, `days` days from today
pub fn uptime_window(hour: u32, days: u32) -> Result<String> {
    uptime_window_at(Utc::now(), hour, days)
}

/// Uptime window with the default lease hour and day offset
pub fn default_uptime_window() -> String {
    window_string(Utc::now(), DEFAULT_LEASE_HOUR, DEFAULT_LEASE_DAYS)
}

/// Uptime window relative to an explicit `now`
///
/// The end may lie before `now` (e.g. hour 7 requested at 10:00 with zero
/// days); choosing a forward-looking window is the caller's concern.
pub fn uptime_window_at(now: DateTime<Utc>, hour: u32, days: u32) -> Result<String> {
    if hour > 23 {
        return Err(Error::validation_for_field(
            "hour",
            "Hour must be between 0 and 23.",
        ));
    }

    if days > MAX_LEASE_DAYS {
        return Err(Error::validation_for_field(
            "days",
            format!("Days must be between 0 and {}.", MAX_LEASE_DAYS),
        ));
    }

    Ok(window_string(now, hour, days))
}

fn window_string(now: DateTime<Utc>, hour: u32, days: u32) -> String {
    let start = now
        .duration_trunc(Duration::seconds(1))
        .unwrap_or(now);
    let end_time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let end = now.date_naive().and_time(end_time).and_utc() + Duration::days(i64::from(days));

    format!("{}-{}", format_timestamp(&start), format_timestamp(&end))
}

/// Lease information for an app or environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaseInfo {
    /// When the lease runs out
    pub lease_until: DateTime<Utc>,
}

impl LeaseInfo {
    /// Wrap a lease end instant
    pub fn new(lease_until: DateTime<Utc>) -> Self {
        Self { lease_until }
    }

    /// Whether the lease has run out
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the lease had run out at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.lease_until
    }

    /// Time remaining on the lease; negative once expired
    pub fn time_left(&self) -> Duration {
        self.time_left_at(Utc::now())
    }

    /// Time remaining on the lease at `now`
    pub fn time_left_at(&self, now: DateTime<Utc>) -> Duration {
        self.lease_until - now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_timestamp;
    use chrono::{TimeZone, Timelike};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 29, 8, 30, 15).unwrap() + Duration::milliseconds(450)
    }

    #[test]
    fn window_runs_from_now_to_the_requested_hour() {
        let window = uptime_window_at(now(), 19, 0).unwrap();
        assert_eq!(window, "2024-07-29T08:30:15+00:00-2024-07-29T19:00:00+00:00");
    }

    #[test]
    fn window_end_adds_day_offset() {
        let window = uptime_window_at(now(), 7, 3).unwrap();
        assert!(window.ends_with("2024-08-01T07:00:00+00:00"));
    }

    #[test]
    fn every_valid_hour_and_day_lands_on_the_hour() {
        for hour in 0..=23 {
            for days in 0..=MAX_LEASE_DAYS {
                let window = uptime_window_at(now(), hour, days).unwrap();
                let end = parse_timestamp(&window).unwrap();
                assert_eq!(end.hour(), hour);
                assert_eq!(end.minute(), 0);
                assert_eq!(end.second(), 0);
                assert_eq!(
                    end.date_naive(),
                    now().date_naive() + Duration::days(i64::from(days))
                );
            }
        }
    }

    #[test]
    fn end_may_precede_start() {
        let window = uptime_window_at(now(), 0, 0).unwrap();
        assert!(window.ends_with("2024-07-29T00:00:00+00:00"));
    }

    #[test]
    fn out_of_range_hour_is_rejected() {
        let err = uptime_window_at(now(), 24, 0).unwrap_err();
        assert!(matches!(err, Error::Validation { field: Some(ref f), .. } if f == "hour"));
    }

    #[test]
    fn out_of_range_days_are_rejected() {
        let err = uptime_window_at(now(), 19, 6).unwrap_err();
        assert!(matches!(err, Error::Validation { field: Some(ref f), .. } if f == "days"));
    }

    #[test]
    fn default_window_parses() {
        let end = parse_timestamp(&default_uptime_window()).unwrap();
        assert_eq!(end.hour(), DEFAULT_LEASE_HOUR);
    }

    #[test]
    fn lease_expiry_is_relative_to_now() {
        let lease = LeaseInfo::new(now());
        assert!(!lease.is_expired_at(now() - Duration::minutes(1)));
        assert!(lease.is_expired_at(now() + Duration::seconds(1)));
        assert_eq!(
            lease.time_left_at(now() - Duration::hours(2)),
            Duration::hours(2)
        );
    }
}
