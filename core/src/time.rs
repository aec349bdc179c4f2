//! Date and time value types.
//!
//! Fudge carries dates and times in packed binary forms which allow reduced
//! precision: a date may omit its day or its month and day, and a time may
//! omit its UTC offset. These types model exactly what the wire can carry;
//! conversions to and from the `chrono` types are provided for the common
//! full-precision case.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use snafu::{ensure, Snafu};
use std::fmt;

/// Number of seconds in a day, one past the largest valid second-of-day.
const SECONDS_PER_DAY: u32 = 86_400;

/// An error constructing a date or time value out of range.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The calendar components do not form a valid date.
    #[snafu(display("invalid date components {year}-{month}-{day}"))]
    InvalidDate {
        /// The offending year.
        year: i32,
        /// The offending month.
        month: u8,
        /// The offending day.
        day: u8,
    },
    /// The time components do not form a valid time of day.
    #[snafu(display("invalid time components {seconds_of_day}s + {nanos}ns"))]
    InvalidTime {
        /// The offending second of day.
        seconds_of_day: u32,
        /// The offending nanosecond count.
        nanos: u32,
    },
    /// The value cannot be converted because a component is unspecified.
    #[snafu(display("date has unspecified components"))]
    ReducedPrecision,
}

type Result<T> = std::result::Result<T, Error>;

/// A calendar date, possibly of reduced precision.
///
/// A zero month or day marks the component as unspecified; a specified day
/// requires a specified month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FudgeDate {
    year: i32,
    month: u8,
    day: u8,
}

impl FudgeDate {
    /// Create a date, validating the component ranges.
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self> {
        ensure!(
            month <= 12 && day <= 31 && (day == 0 || month != 0),
            InvalidDateSnafu { year, month, day }
        );
        Ok(FudgeDate { year, month, day })
    }

    /// Create a year-only date.
    pub fn from_year(year: i32) -> Self {
        FudgeDate {
            year,
            month: 0,
            day: 0,
        }
    }

    /// The year component.
    #[inline]
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month component, 0 when unspecified.
    #[inline]
    pub fn month(&self) -> u8 {
        self.month
    }

    /// The day component, 0 when unspecified.
    #[inline]
    pub fn day(&self) -> u8 {
        self.day
    }
}

impl From<NaiveDate> for FudgeDate {
    fn from(d: NaiveDate) -> Self {
        FudgeDate {
            year: d.year(),
            month: d.month() as u8,
            day: d.day() as u8,
        }
    }
}

impl TryFrom<FudgeDate> for NaiveDate {
    type Error = Error;

    fn try_from(d: FudgeDate) -> Result<Self> {
        ensure!(d.month != 0 && d.day != 0, ReducedPrecisionSnafu);
        NaiveDate::from_ymd_opt(d.year, u32::from(d.month), u32::from(d.day)).ok_or(
            Error::InvalidDate {
                year: d.year,
                month: d.month,
                day: d.day,
            },
        )
    }
}

impl fmt::Display for FudgeDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.month, self.day) {
            (0, _) => write!(f, "{:04}", self.year),
            (m, 0) => write!(f, "{:04}-{:02}", self.year, m),
            (m, d) => write!(f, "{:04}-{:02}-{:02}", self.year, m, d),
        }
    }
}

/// A time of day with nanosecond resolution and an optional UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FudgeTime {
    seconds_of_day: u32,
    nanos: u32,
    /// UTC offset in 15-minute units, `None` when the time is offset-free.
    offset: Option<i8>,
}

impl FudgeTime {
    /// Create a time of day, validating the component ranges.
    ///
    /// An offset of `i8::MIN` is refused: the packed form reserves it to
    /// mean "no offset".
    pub fn new(seconds_of_day: u32, nanos: u32, offset: Option<i8>) -> Result<Self> {
        ensure!(
            seconds_of_day < SECONDS_PER_DAY
                && nanos < 1_000_000_000
                && offset != Some(i8::MIN),
            InvalidTimeSnafu {
                seconds_of_day,
                nanos
            }
        );
        Ok(FudgeTime {
            seconds_of_day,
            nanos,
            offset,
        })
    }

    /// Seconds elapsed since midnight.
    #[inline]
    pub fn seconds_of_day(&self) -> u32 {
        self.seconds_of_day
    }

    /// Nanoseconds within the current second.
    #[inline]
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// The UTC offset in 15-minute units, if any.
    #[inline]
    pub fn offset(&self) -> Option<i8> {
        self.offset
    }
}

impl From<NaiveTime> for FudgeTime {
    fn from(t: NaiveTime) -> Self {
        FudgeTime {
            seconds_of_day: t.num_seconds_from_midnight(),
            nanos: t.nanosecond().min(999_999_999),
            offset: None,
        }
    }
}

impl TryFrom<FudgeTime> for NaiveTime {
    type Error = Error;

    fn try_from(t: FudgeTime) -> Result<Self> {
        NaiveTime::from_num_seconds_from_midnight_opt(t.seconds_of_day, t.nanos).ok_or(
            Error::InvalidTime {
                seconds_of_day: t.seconds_of_day,
                nanos: t.nanos,
            },
        )
    }
}

impl fmt::Display for FudgeTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let h = self.seconds_of_day / 3600;
        let m = (self.seconds_of_day / 60) % 60;
        let s = self.seconds_of_day % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")?;
        if self.nanos != 0 {
            write!(f, ".{:09}", self.nanos)?;
        }
        if let Some(offset) = self.offset {
            let minutes = i32::from(offset) * 15;
            write!(f, "{:+03}:{:02}", minutes / 60, (minutes % 60).abs())?;
        }
        Ok(())
    }
}

/// A combined date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FudgeDateTime {
    /// The date half.
    pub date: FudgeDate,
    /// The time half.
    pub time: FudgeTime,
}

impl FudgeDateTime {
    /// Combine a date and a time of day.
    pub fn new(date: FudgeDate, time: FudgeTime) -> Self {
        FudgeDateTime { date, time }
    }
}

impl From<NaiveDateTime> for FudgeDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        FudgeDateTime {
            date: dt.date().into(),
            time: dt.time().into(),
        }
    }
}

impl TryFrom<FudgeDateTime> for NaiveDateTime {
    type Error = Error;

    fn try_from(dt: FudgeDateTime) -> Result<Self> {
        Ok(NaiveDateTime::new(
            dt.date.try_into()?,
            dt.time.try_into()?,
        ))
    }
}

impl fmt::Display for FudgeDateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)
    }
}
