//! Calendar grains and period keys
//!
//! Keys follow the warehouse layout: daily `YYYYMMDD`, weekly ISO `YYYYWW`,
//! monthly `YYYYMM`. All periods are UTC.

use crate::models::HourKey;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grain {
    Daily,
    Weekly,
    Monthly,
}

impl Grain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grain::Daily => "daily",
            Grain::Weekly => "weekly",
            Grain::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One calendar period of a given grain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodRepr", into = "PeriodRepr")]
pub enum Period {
    Day(NaiveDate),
    IsoWeek { year: i32, week: u32 },
    Month { year: i32, month: u32 },
}

impl Period {
    /// Period of `grain` that contains `date`
    pub fn containing(grain: Grain, date: NaiveDate) -> Self {
        match grain {
            Grain::Daily => Period::Day(date),
            Grain::Weekly => {
                let iso = date.iso_week();
                Period::IsoWeek {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            Grain::Monthly => Period::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }

    pub fn of_hour(grain: Grain, hour: HourKey) -> Self {
        Self::containing(grain, hour.date())
    }

    pub fn grain(&self) -> Grain {
        match self {
            Period::Day(_) => Grain::Daily,
            Period::IsoWeek { .. } => Grain::Weekly,
            Period::Month { .. } => Grain::Monthly,
        }
    }

    pub fn key(&self) -> String {
        match self {
            Period::Day(date) => date.format("%Y%m%d").to_string(),
            Period::IsoWeek { year, week } => format!("{year:04}{week:02}"),
            Period::Month { year, month } => format!("{year:04}{month:02}"),
        }
    }

    /// Parse a period key of the given grain
    pub fn parse(grain: Grain, key: &str) -> Option<Self> {
        let digits = key.bytes().all(|b| b.is_ascii_digit());
        match grain {
            Grain::Daily if digits && key.len() == 8 => {
                NaiveDate::parse_from_str(key, "%Y%m%d").ok().map(Period::Day)
            }
            Grain::Weekly if digits && key.len() == 6 => {
                let year = key[0..4].parse().ok()?;
                let week = key[4..6].parse().ok()?;
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                Some(Period::IsoWeek { year, week })
            }
            Grain::Monthly if digits && key.len() == 6 => {
                let year = key[0..4].parse().ok()?;
                let month = key[4..6].parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, 1)?;
                Some(Period::Month { year, month })
            }
            _ => None,
        }
    }

    /// First calendar day of the period
    pub fn first_day(&self) -> Option<NaiveDate> {
        match *self {
            Period::Day(date) => Some(date),
            Period::IsoWeek { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Mon),
            Period::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
        }
    }

    /// First day after the period
    pub fn end_day(&self) -> Option<NaiveDate> {
        match *self {
            Period::Day(date) => date.succ_opt(),
            Period::IsoWeek { .. } => self.first_day().map(|d| d + Duration::days(7)),
            Period::Month { year, month } => {
                if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
            }
        }
    }

    /// Half-open hour range `[start, end)` covered by the period
    pub fn hour_range(&self) -> Option<(HourKey, HourKey)> {
        let start = self.first_day()?;
        let end = self.end_day()?;
        Some((
            HourKey::from_ymdh(start.year(), start.month(), start.day(), 0)?,
            HourKey::from_ymdh(end.year(), end.month(), end.day(), 0)?,
        ))
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        Period::containing(self.grain(), date) == *self
    }

    pub fn contains_hour(&self, hour: HourKey) -> bool {
        self.contains_date(hour.date())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Serialize, Deserialize)]
struct PeriodRepr {
    grain: Grain,
    key: String,
}

impl From<Period> for PeriodRepr {
    fn from(period: Period) -> Self {
        Self {
            grain: period.grain(),
            key: period.key(),
        }
    }
}

impl TryFrom<PeriodRepr> for Period {
    type Error = String;

    fn try_from(repr: PeriodRepr) -> Result<Self, Self::Error> {
        Period::parse(repr.grain, &repr.key)
            .ok_or_else(|| format!("invalid {} period key {:?}", repr.grain, repr.key))
    }
}
