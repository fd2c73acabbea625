//! Reference-time intervals and partial datetime parsing.
//!
//! A record's reference time is an interval with inclusive endpoints; an
//! instant is the degenerate interval with `begin == end`. Query literals may
//! spell out only a prefix of a full datetime (`2020`, `2020-01`,
//! `2020-01-01 12`); such a partial denotes the span it covers, with an
//! inclusive start and an exclusive end.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::{Error, Result};

pub type Timestamp = PrimitiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub begin: Timestamp,
    pub end: Timestamp,
}

impl TimeInterval {
    pub fn new(begin: Timestamp, end: Timestamp) -> Result<Self> {
        if end < begin {
            return Err(Error::Parse(format!(
                "reference time interval ends ({end}) before it begins ({begin})"
            )));
        }
        Ok(Self { begin, end })
    }

    pub fn instant(at: Timestamp) -> Self {
        Self { begin: at, end: at }
    }

    pub fn is_instant(&self) -> bool {
        self.begin == self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let begin = self.begin.format(&fmt).map_err(|_| fmt::Error)?;
        if self.is_instant() {
            write!(f, "{begin}")
        } else {
            let end = self.end.format(&fmt).map_err(|_| fmt::Error)?;
            write!(f, "{begin}/{end}")
        }
    }
}

/// A possibly-partial datetime literal, expanded to the span it covers.
/// `start` is inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialTime {
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Parse `YYYY[-MM[-DD[ hh[:mm[:ss]]]]]` into the covered span.
pub fn parse_partial(text: &str) -> Result<PartialTime> {
    let text = text.trim();
    let bad = |detail: &str| Error::Parse(format!("cannot parse time `{text}`: {detail}"));

    let (date_part, time_part) = match text.split_once(|c: char| c == ' ' || c == 'T') {
        Some((d, t)) => (d, Some(t.trim())),
        None => (text, None),
    };

    let mut date_fields = date_part.split('-');
    let year: i32 = date_fields
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("invalid year"))?;
    let month: Option<u8> = match date_fields.next() {
        Some(s) => Some(s.parse().map_err(|_| bad("invalid month"))?),
        None => None,
    };
    let day: Option<u8> = match date_fields.next() {
        Some(s) => Some(s.parse().map_err(|_| bad("invalid day"))?),
        None => None,
    };
    if date_fields.next().is_some() {
        return Err(bad("trailing date fields"));
    }
    if time_part.is_some() && day.is_none() {
        return Err(bad("time of day requires a complete date"));
    }

    let mut precision = Precision::Year;
    if month.is_some() {
        precision = Precision::Month;
    }
    if day.is_some() {
        precision = Precision::Day;
    }

    let mut hour = 0u8;
    let mut minute = 0u8;
    let mut second = 0u8;
    if let Some(tp) = time_part.filter(|tp| !tp.is_empty()) {
        let mut time_fields = tp.split(':');
        hour = time_fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad("invalid hour"))?;
        precision = Precision::Hour;
        if let Some(s) = time_fields.next() {
            minute = s.parse().map_err(|_| bad("invalid minute"))?;
            precision = Precision::Minute;
        }
        if let Some(s) = time_fields.next() {
            second = s.parse().map_err(|_| bad("invalid second"))?;
            precision = Precision::Second;
        }
        if time_fields.next().is_some() {
            return Err(bad("trailing time fields"));
        }
    }

    let month_val = Month::try_from(month.unwrap_or(1)).map_err(|_| bad("month out of range"))?;
    let date = Date::from_calendar_date(year, month_val, day.unwrap_or(1))
        .map_err(|_| bad("no such calendar date"))?;
    let tod = Time::from_hms(hour, minute, second).map_err(|_| bad("time of day out of range"))?;
    let start = PrimitiveDateTime::new(date, tod);

    let end = match precision {
        Precision::Year => start.replace_year(year + 1).map_err(|_| bad("year out of range"))?,
        Precision::Month => {
            let (next_year, next_month) = match month_val {
                Month::December => (year + 1, Month::January),
                m => (year, m.next()),
            };
            let date = Date::from_calendar_date(next_year, next_month, 1)
                .map_err(|_| bad("year out of range"))?;
            PrimitiveDateTime::new(date, Time::MIDNIGHT)
        }
        Precision::Day => start.checked_add(Duration::days(1)).ok_or_else(|| bad("date overflow"))?,
        Precision::Hour => start.checked_add(Duration::hours(1)).ok_or_else(|| bad("date overflow"))?,
        Precision::Minute => start
            .checked_add(Duration::minutes(1))
            .ok_or_else(|| bad("date overflow"))?,
        Precision::Second => start
            .checked_add(Duration::seconds(1))
            .ok_or_else(|| bad("date overflow"))?,
    };

    Ok(PartialTime { start, end })
}

/// Parse a fully-specified instant; partial literals are taken at the start
/// of the span they cover.
pub fn parse_instant(text: &str) -> Result<Timestamp> {
    Ok(parse_partial(text)?.start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn partial_expansion() {
        let p = parse_partial("2020").unwrap();
        assert_eq!(p.start, datetime!(2020-01-01 00:00:00));
        assert_eq!(p.end, datetime!(2021-01-01 00:00:00));

        let p = parse_partial("2020-12").unwrap();
        assert_eq!(p.start, datetime!(2020-12-01 00:00:00));
        assert_eq!(p.end, datetime!(2021-01-01 00:00:00));

        let p = parse_partial("2020-02-28 23:59").unwrap();
        assert_eq!(p.start, datetime!(2020-02-28 23:59:00));
        assert_eq!(p.end, datetime!(2020-02-29 00:00:00));
    }

    #[test]
    fn full_instant() {
        let p = parse_partial("2020-06-15 12:30:45").unwrap();
        assert_eq!(p.start, datetime!(2020-06-15 12:30:45));
        assert_eq!(p.end, datetime!(2020-06-15 12:30:46));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_partial("widget").is_err());
        assert!(parse_partial("2020-13").is_err());
        assert!(parse_partial("2020-02-30").is_err());
        assert!(parse_partial("2020 12:00").is_err());
    }

    #[test]
    fn interval_ordering_enforced() {
        let a = datetime!(2020-01-02 00:00:00);
        let b = datetime!(2020-01-01 00:00:00);
        assert!(TimeInterval::new(a, b).is_err());
        assert!(TimeInterval::new(b, a).is_ok());
    }
}
