//! Analysis date/time handling for model runs.
//!
//! Dates travel as `YYYYMMDD` integers and times as `HHMM` integers, the
//! way they appear in retrieval requests.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Analysis times a run may start from.
pub const VALID_TIMES: [u32; 4] = [0, 600, 1200, 1800];

/// A (date, time) pair as used in requests.
///
/// Ordering is by date, then time, so `max()` yields the latest pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunDateTime {
    /// `YYYYMMDD`
    pub date: u32,
    /// `HHMM`
    pub time: u32,
}

impl RunDateTime {
    pub fn new(date: u32, time: u32) -> Self {
        Self { date, time }
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        Self {
            date: dt.year() as u32 * 10_000 + dt.month() * 100 + dt.day(),
            time: dt.hour() * 100 + dt.minute(),
        }
    }

    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        let date = parse_yyyymmdd(self.date as i64)?;
        let time = NaiveTime::from_hms_opt(self.time / 100, self.time % 100, 0)
            .ok_or_else(|| ForecastError::config("time", format!("invalid time {:04}", self.time)))?;
        Ok(date.and_time(time))
    }
}

impl fmt::Display for RunDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:04}", self.date, self.time)
    }
}

/// Normalize an analysis time: values under 100 are hours (`12` -> `1200`).
///
/// The result must be one of 0000, 0600, 1200 or 1800.
pub fn normalize_time(time: i64) -> Result<u32> {
    let time = hhmm(time)?;
    u32::try_from(time)
        .ok()
        .filter(|t| VALID_TIMES.contains(t))
        .ok_or_else(|| {
            ForecastError::config(
                "time",
                format!("{} is not one of 0000, 0600, 1200, 1800", time),
            )
        })
}

/// `time` as `HHMM`; values under 100 are taken as hours.
pub fn hhmm(time: i64) -> Result<i64> {
    if time >= 100 {
        return Ok(time);
    }
    time.checked_mul(100)
        .ok_or_else(|| ForecastError::config("time", format!("{} is out of range", time)))
}

/// Parse a `YYYYMMDD` integer.
pub fn parse_yyyymmdd(date: i64) -> Result<NaiveDate> {
    let (y, m, d) = (date / 10_000, (date / 100) % 100, date % 100);
    i32::try_from(y)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, m as u32, d as u32))
        .ok_or_else(|| ForecastError::config("date", format!("{} is not a valid YYYYMMDD date", date)))
}

/// Resolve a configured base date.
///
/// `date <= 0` is relative to `today` (`-1` is yesterday).
pub fn resolve_date(date: i64, today: NaiveDate) -> Result<NaiveDate> {
    if date <= 0 {
        today
            .checked_add_signed(Duration::days(date))
            .ok_or_else(|| ForecastError::config("date", format!("{} days is out of range", date)))
    } else {
        parse_yyyymmdd(date)
    }
}

/// Parse a `--date` style argument: an integer (`20230101`, `-1`) or an
/// ISO date (`2023-01-01`).
pub fn parse_date_arg(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.year() as i64 * 10_000 + d.month() as i64 * 100 + d.day() as i64)
        .map_err(|_| ForecastError::config("date", format!("cannot parse '{}'", s)))
}

/// Base date-time of a run, shifted by `step` hours.
pub fn base_datetime(date: i64, time: i64, step: i64, today: NaiveDate) -> Result<NaiveDateTime> {
    let date = resolve_date(date, today)?;
    let time = normalize_time(time)?;
    let start = date.and_time(
        NaiveTime::from_hms_opt(time / 100, time % 100, 0)
            .ok_or_else(|| ForecastError::config("time", format!("invalid time {:04}", time)))?,
    );
    shift(start, step)
}

fn shift(start: NaiveDateTime, hours: i64) -> Result<NaiveDateTime> {
    Duration::try_hours(hours)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| ForecastError::config("step", format!("{} hours is out of range", hours)))
}

/// Expand base date-times by lag offsets (hours).
///
/// An empty lag list means a single, unshifted date. Order follows
/// (base, lag) and duplicates are kept.
pub fn expand_lags(bases: &[NaiveDateTime], lags: &[i64]) -> Vec<RunDateTime> {
    let lags: &[i64] = if lags.is_empty() { &[0] } else { lags };
    bases
        .iter()
        .flat_map(|base| {
            lags.iter()
                .map(move |lag| RunDateTime::from_datetime(*base + Duration::hours(*lag)))
        })
        .collect()
}

/// Date/time pairs for a run starting now-relative or at a fixed date.
pub fn datetimes(base_date: i64, base_time: i64, lags: &[i64], step: i64) -> Result<Vec<RunDateTime>> {
    datetimes_at(Utc::now().date_naive(), base_date, base_time, lags, step)
}

/// Same as [`datetimes`], with an explicit "today" for relative dates.
pub fn datetimes_at(
    today: NaiveDate,
    base_date: i64,
    base_time: i64,
    lags: &[i64],
    step: i64,
) -> Result<Vec<RunDateTime>> {
    let base = base_datetime(base_date, base_time, step, today)?;
    Ok(expand_lags(&[base], lags))
}

/// Parse a staging-dates file: one ISO date or date-time per line.
pub fn parse_staging_dates(text: &str) -> Result<Vec<NaiveDateTime>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            NaiveDateTime::parse_from_str(line, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(line, "%Y-%m-%d %H:%M:%S"))
                .or_else(|_| NaiveDateTime::parse_from_str(line, "%Y-%m-%dT%H:%M"))
                .or_else(|_| {
                    NaiveDate::parse_from_str(line, "%Y-%m-%d")
                        .map(|d| d.and_time(NaiveTime::MIN))
                })
                .map_err(|_| {
                    ForecastError::config("staging_dates", format!("cannot parse '{}'", line))
                })
        })
        .collect()
}

/// Valid date-time of a field from its `date`, `time` and `step`.
pub fn valid_datetime(date: i64, time: i64, step: i64) -> Result<NaiveDateTime> {
    let time = hhmm(time)?;
    let date = parse_yyyymmdd(date)?;
    let start = u32::try_from(time)
        .ok()
        .and_then(|t| NaiveTime::from_hms_opt(t / 100, t % 100, 0))
        .ok_or_else(|| ForecastError::config("time", format!("invalid time {:04}", time)))?;
    shift(date.and_time(start), step)
}
