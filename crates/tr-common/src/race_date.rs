use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Serialize, Serializer};

/// First race date of the default renumbering pass.
pub const DEFAULT_START_KEY: &str = "20180220";
/// Last race date (inclusive) of the default renumbering pass.
pub const DEFAULT_END_KEY: &str = "20180302";

const KEY_FORMAT: &str = "%Y%m%d";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RaceDateError {
    #[error("race date key must be 8 digits (YYYYMMDD), got {0:?}")]
    Malformed(String),
    #[error("race date key {0:?} is not a calendar date")]
    InvalidDate(String),
}

/// Calendar day a ticket belongs to, keyed as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RaceDate(NaiveDate);

impl RaceDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// `YYYYMMDD` key used in logs and configuration.
    pub fn key(&self) -> String {
        self.0.format(KEY_FORMAT).to_string()
    }

    pub fn next_day(&self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }
}

impl fmt::Display for RaceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(KEY_FORMAT))
    }
}

impl FromStr for RaceDate {
    type Err = RaceDateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RaceDateError::Malformed(raw.to_string()));
        }

        NaiveDate::parse_from_str(trimmed, KEY_FORMAT)
            .map(Self)
            .map_err(|_| RaceDateError::InvalidDate(raw.to_string()))
    }
}

impl Serialize for RaceDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inclusive range of race dates.
///
/// The range holds no cursor: every call to [`RaceDates::iter`] starts again
/// from `start`. A range whose `start` is after its `end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceDates {
    start: RaceDate,
    end: RaceDate,
}

impl RaceDates {
    pub fn new(start: RaceDate, end: RaceDate) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> RaceDate {
        self.start
    }

    pub fn end(&self) -> RaceDate {
        self.end
    }

    pub fn len(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        let days = (self.end.0 - self.start.0).num_days();
        usize::try_from(days).map_or(0, |d| d + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn iter(&self) -> RaceDateIter {
        RaceDateIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for RaceDates {
    type Item = RaceDate;
    type IntoIter = RaceDateIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &RaceDates {
    type Item = RaceDate;
    type IntoIter = RaceDateIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy walk over a [`RaceDates`] range, one day per step.
#[derive(Debug, Clone)]
pub struct RaceDateIter {
    next: Option<RaceDate>,
    end: RaceDate,
}

impl Iterator for RaceDateIter {
    type Item = RaceDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|date| *date <= self.end)?;
        self.next = current.next_day();
        Some(current)
    }
}

/// Build the inclusive range `start..=end` of race dates.
pub fn race_dates(start: RaceDate, end: RaceDate) -> RaceDates {
    RaceDates::new(start, end)
}
