//! Resampling frequencies and normalised sample dates.
//!
//! Dates are handled as milliseconds since the Unix epoch (UTC, no
//! timezone), matching the `DATE` column of every summary artifact.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Target frequency of resampled summary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every calendar day.
    Daily,
    /// Every Monday.
    Weekly,
    /// First day of every month.
    Monthly,
    /// First day of January, April, July and October.
    Quarterly,
    /// First day of every year.
    Yearly,
}

/// Error returned when parsing an unknown frequency string.
#[derive(Debug, Snafu)]
#[snafu(display("unknown frequency '{value}' (expected daily|weekly|monthly|quarterly|yearly)"))]
pub struct ParseFrequencyError {
    /// The rejected input.
    pub value: String,
}

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Frequency::Daily),
            "weekly" | "week" | "w" => Ok(Frequency::Weekly),
            "monthly" | "month" | "m" | "ms" => Ok(Frequency::Monthly),
            "quarterly" | "quarter" | "q" | "qs" => Ok(Frequency::Quarterly),
            "yearly" | "year" | "y" | "ys" | "a" => Ok(Frequency::Yearly),
            _ => ParseFrequencySnafu { value: s }.fail(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

fn to_date(ms: i64) -> Option<(NaiveDate, bool)> {
    let dt = DateTime::from_timestamp_millis(ms)?.naive_utc();
    let at_midnight = dt.time() == chrono::NaiveTime::MIN;
    Some((dt.date(), at_midnight))
}

fn to_millis(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis()
}

impl Frequency {
    /// Stable lowercase name, used in storage keys and logs.
    pub fn tag(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Latest boundary at or before `date`.
    pub fn floor(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily => Some(date),
            Frequency::Weekly => {
                date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
            }
            Frequency::Monthly => date.with_day(1),
            Frequency::Quarterly => {
                NaiveDate::from_ymd_opt(date.year(), (date.month0() / 3) * 3 + 1, 1)
            }
            Frequency::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        }
    }

    /// Boundary following the boundary `date`.
    pub fn next(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily => date.checked_add_days(Days::new(1)),
            Frequency::Weekly => date.checked_add_days(Days::new(7)),
            Frequency::Monthly => date.checked_add_months(Months::new(1)),
            Frequency::Quarterly => date.checked_add_months(Months::new(3)),
            Frequency::Yearly => date.checked_add_months(Months::new(12)),
        }
    }

    /// Sample dates covering `[min_ms, max_ms]`, in milliseconds.
    ///
    /// The first date is `min_ms` floored to a boundary, the last is
    /// `max_ms` ceiled to a boundary; every boundary in between is included.
    /// An inverted or out-of-range interval yields no dates.
    pub fn normalized_sample_dates(self, min_ms: i64, max_ms: i64) -> Vec<i64> {
        if min_ms > max_ms {
            return Vec::new();
        }
        let (Some((min_date, _)), Some((max_date, max_at_midnight))) =
            (to_date(min_ms), to_date(max_ms))
        else {
            return Vec::new();
        };
        let Some(start) = self.floor(min_date) else {
            return Vec::new();
        };
        let end = match self.floor(max_date) {
            Some(f) if f == max_date && max_at_midnight => Some(f),
            Some(f) => self.next(f),
            None => None,
        };
        let Some(end) = end else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut cur = Some(start);
        while let Some(d) = cur {
            if d > end {
                break;
            }
            out.push(to_millis(d));
            cur = self.next(d);
        }
        out
    }
}
