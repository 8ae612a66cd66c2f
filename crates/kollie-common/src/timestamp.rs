//! Timestamp parsing for values stored on cluster resources
//!
//! Kollie has written timestamps in several shapes over time, and resources
//! created by older releases are still around. Accepted, in priority order:
//!
//! 1. an uptime span `<iso8601>-<iso8601>`; only the trailing 25 characters
//!    (the end instant) are parsed
//! 2. a bare ISO 8601 instant, e.g. `2021-09-01T12:00:00.000`
//! 3. `DD-MM-YYYY HH:MM:SS`, e.g. `01-09-2021 12:00:00`
//! 4. `YYYY-MM-DDTHH:MM`, e.g. `2021-09-01T12:00`
//!
//! Values without an offset are taken to be UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Length of an RFC 3339 instant with seconds precision and a `+HH:MM` offset
const SPAN_END_LEN: usize = 25;

const NAIVE_ISO_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%:z"];

const LEGACY_FORMATS: &[&str] = &["%d-%m-%Y %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a stored timestamp in any of the supported formats
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Some(ts) = parse_iso8601(span_end(value)) {
        return Ok(ts);
    }

    if let Some(ts) = parse_iso8601(value) {
        return Ok(ts);
    }

    for fmt in LEGACY_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(naive.and_utc());
        }
    }

    Err(Error::parse(
        value,
        format!(
            "invalid date format: {}. Expected ISO 8601, '%d-%m-%Y %H:%M:%S' or '%Y-%m-%dT%H:%M'",
            value
        ),
    ))
}

/// Format an instant the way Kollie writes it: seconds precision, `+00:00`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// The trailing [`SPAN_END_LEN`] characters, or the whole value if shorter
fn span_end(value: &str) -> &str {
    match value.char_indices().rev().nth(SPAN_END_LEN - 1) {
        Some((idx, _)) => &value[idx..],
        None => value,
    }
}

fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in OFFSET_ISO_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_ISO_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
