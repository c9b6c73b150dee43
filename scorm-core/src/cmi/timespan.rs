//! Session and total time encodings
//!
//! Times are carried internally as hundredths of a second, the finest
//! resolution either version can express.

use std::sync::LazyLock;

use regex::Regex;

const CENTIS_PER_SECOND: u64 = 100;
const CENTIS_PER_MINUTE: u64 = 60 * CENTIS_PER_SECOND;
const CENTIS_PER_HOUR: u64 = 60 * CENTIS_PER_MINUTE;
const CENTIS_PER_DAY: u64 = 24 * CENTIS_PER_HOUR;

static TIMESPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2,4}):([0-5]\d):([0-5]\d)(?:\.(\d{1,2}))?$").expect("valid timespan regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d{1,2}))?S)?)?$",
    )
    .expect("valid duration regex")
});

/// Why a time value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRejection {
    /// Does not match the format
    Malformed,
    /// Well formed, but more than hundredths of a second fit in a `u64`
    Overflow,
}

fn fraction_to_centis(fraction: Option<&str>) -> u64 {
    match fraction {
        Some(f) if f.len() == 1 => f.parse::<u64>().unwrap_or(0) * 10,
        Some(f) => f.parse::<u64>().unwrap_or(0),
        None => 0,
    }
}

/// One captured component scaled to hundredths of a second
fn component(caps: &regex::Captures<'_>, idx: usize, unit: u64) -> Result<u64, TimeRejection> {
    let Some(digits) = caps.get(idx) else {
        return Ok(0);
    };
    digits
        .as_str()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit))
        .ok_or(TimeRejection::Overflow)
}

fn checked_sum(parts: &[Result<u64, TimeRejection>]) -> Result<u64, TimeRejection> {
    parts.iter().try_fold(0u64, |total, part| {
        total
            .checked_add((*part)?)
            .ok_or(TimeRejection::Overflow)
    })
}

/// Parse a SCORM 1.2 `CMITimespan` (`HHHH:MM:SS.SS`)
pub fn parse_timespan(value: &str) -> Result<u64, TimeRejection> {
    let caps = TIMESPAN.captures(value).ok_or(TimeRejection::Malformed)?;
    checked_sum(&[
        component(&caps, 1, CENTIS_PER_HOUR),
        component(&caps, 2, CENTIS_PER_MINUTE),
        component(&caps, 3, CENTIS_PER_SECOND),
        Ok(fraction_to_centis(caps.get(4).map(|m| m.as_str()))),
    ])
}

/// Format hundredths of a second as a SCORM 1.2 `CMITimespan`
///
/// Hours saturate at 9999, the largest value the format can carry.
pub fn format_timespan(centis: u64) -> String {
    let hours = (centis / CENTIS_PER_HOUR).min(9999);
    let minutes = (centis % CENTIS_PER_HOUR) / CENTIS_PER_MINUTE;
    let seconds = (centis % CENTIS_PER_MINUTE) / CENTIS_PER_SECOND;
    let fraction = centis % CENTIS_PER_SECOND;
    format!("{:04}:{:02}:{:02}.{:02}", hours, minutes, seconds, fraction)
}

/// Parse a SCORM 2004 `timeinterval` (ISO 8601 duration)
///
/// Years count as 365 days and months as 30 days.
pub fn parse_duration(value: &str) -> Result<u64, TimeRejection> {
    if value == "P" || value.ends_with('T') {
        return Err(TimeRejection::Malformed);
    }
    let caps = DURATION.captures(value).ok_or(TimeRejection::Malformed)?;
    checked_sum(&[
        component(&caps, 1, 365 * CENTIS_PER_DAY),
        component(&caps, 2, 30 * CENTIS_PER_DAY),
        component(&caps, 3, CENTIS_PER_DAY),
        component(&caps, 4, CENTIS_PER_HOUR),
        component(&caps, 5, CENTIS_PER_MINUTE),
        component(&caps, 6, CENTIS_PER_SECOND),
        Ok(fraction_to_centis(caps.get(7).map(|m| m.as_str()))),
    ])
}

/// Format hundredths of a second as a SCORM 2004 `timeinterval`
pub fn format_duration(centis: u64) -> String {
    let hours = centis / CENTIS_PER_HOUR;
    let minutes = (centis % CENTIS_PER_HOUR) / CENTIS_PER_MINUTE;
    let seconds = (centis % CENTIS_PER_MINUTE) / CENTIS_PER_SECOND;
    let fraction = centis % CENTIS_PER_SECOND;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if fraction > 0 {
        out.push_str(&format!("{}.{:02}S", seconds, fraction));
    } else if seconds > 0 || (hours == 0 && minutes == 0) {
        out.push_str(&format!("{}S", seconds));
    }
    out
}
