//! Request identity for a risk query: where and when.

use chrono::{Month, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::Location;

/// Year the date picker is pinned to when a month/day pair becomes a date stamp.
pub const DEFAULT_REFERENCE_YEAR: i32 = 2026;

/// Reasons a selection cannot be turned into a [`LocationDateKey`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    #[error("coordinates must be finite, got ({latitude}, {longitude})")]
    NonFiniteCoordinates { latitude: f64, longitude: f64 },

    #[error("month index {0} is outside 0..=11")]
    MonthOutOfRange(u32),

    #[error("day {day} does not exist in {month} {year}")]
    DayOutOfRange { year: i32, month: &'static str, day: u32 },

    #[error("reference year {0} cannot be written as four digits")]
    YearOutOfRange(i32),
}

/// Month/day pair as emitted by the date picker. Not validated on its own:
/// validity depends on the reference year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSelection {
    /// Zero-based month, 0 = January.
    pub month_index: u32,
    pub day: u32,
}

impl DateSelection {
    pub fn new(month_index: u32, day: u32) -> Self {
        Self { month_index, day }
    }

    /// Resolve against `year`, rejecting months and days the picker would never offer.
    pub fn to_date(self, year: i32) -> Result<NaiveDate, KeyError> {
        if !(1000..=9999).contains(&year) {
            return Err(KeyError::YearOutOfRange(year));
        }

        let month = month_name(self.month_index).ok_or(KeyError::MonthOutOfRange(self.month_index))?;

        NaiveDate::from_ymd_opt(year, self.month_index + 1, self.day).ok_or(KeyError::DayOutOfRange {
            year,
            month,
            day: self.day,
        })
    }
}

impl Default for DateSelection {
    fn default() -> Self {
        Self { month_index: 0, day: 1 }
    }
}

/// Number of days the day picker offers for `month_index` (0-based) in `year`.
pub fn days_in_month(year: i32, month_index: u32) -> Option<u32> {
    let month = month_index.checked_add(1).filter(|m| (1..=12).contains(m))?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

/// English month name for a 0-based month index.
pub fn month_name(month_index: u32) -> Option<&'static str> {
    let number = u8::try_from(month_index.checked_add(1)?).ok()?;
    Month::try_from(number).ok().map(|m| m.name())
}

/// Canonical identity of one risk query. Two keys are equal when they would
/// produce the same outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationDateKey {
    latitude: f64,
    longitude: f64,
    date_stamp: String,
}

impl LocationDateKey {
    pub fn new(latitude: f64, longitude: f64, date: NaiveDate) -> Result<Self, KeyError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(KeyError::NonFiniteCoordinates { latitude, longitude });
        }

        Ok(Self {
            latitude,
            longitude,
            date_stamp: date.format("%Y%m%d").to_string(),
        })
    }

    /// Build the key for the current picker state.
    pub fn from_selection(
        location: &Location,
        date: DateSelection,
        reference_year: i32,
    ) -> Result<Self, KeyError> {
        let date = date.to_date(reference_year)?;
        Self::new(location.latitude, location.longitude, date)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `YYYYMMDD`, as sent in the `date_str` field.
    pub fn date_stamp(&self) -> &str {
        &self.date_stamp
    }
}

impl fmt::Display for LocationDateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ ({:.4}, {:.4})", self.date_stamp, self.latitude, self.longitude)
    }
}
