//! Patterns over forecast time ranges.
//!
//! Grammar: `GRIB1,ptype[,p1[,p2]]`. Durations take a unit suffix: `s`, `m`,
//! `h`, `d` normalize to seconds; `mo`, `y` normalize to months. Seconds and
//! months have no defined conversion, so mixing the two classes inside one
//! pattern is a parse error, and a second-based pattern never matches a
//! month-based record value.

use std::fmt;

use crate::metadata::types::{Timerange, UnitClass};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerangePattern {
    pub unit: UnitClass,
    pub ptype: Option<u32>,
    pub p1: Option<i64>,
    pub p2: Option<i64>,
}

/// A duration literal normalized into its unit class. Zero carries no class.
fn parse_duration(text: &str, whole: &str) -> Result<Option<(i64, Option<UnitClass>)>> {
    if text.is_empty() {
        return Ok(None);
    }
    let split = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '-' && *c != '+')
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);
    let value: i64 = digits.parse().map_err(|_| {
        Error::Parse(format!("timerange: `{text}` is not a duration in `{whole}`"))
    })?;
    let normalized = match suffix {
        "s" => (value, Some(UnitClass::Second)),
        "m" => (value * 60, Some(UnitClass::Second)),
        "h" => (value * 3600, Some(UnitClass::Second)),
        "d" => (value * 86400, Some(UnitClass::Second)),
        "mo" => (value, Some(UnitClass::Month)),
        "y" => (value * 12, Some(UnitClass::Month)),
        "" if value == 0 => (0, None),
        "" => {
            return Err(Error::Parse(format!(
                "timerange: `{text}` needs a unit suffix (s, m, h, d, mo, y) in `{whole}`"
            )))
        }
        _ => {
            return Err(Error::Parse(format!(
                "timerange: unknown unit suffix `{suffix}` in `{whole}`"
            )))
        }
    };
    Ok(Some(normalized))
}

impl TimerangePattern {
    pub fn parse(text: &str) -> Result<TimerangePattern> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix("GRIB1").ok_or_else(|| {
            Error::Parse(format!("timerange: expected `GRIB1,...`, got `{text}`"))
        })?;
        let rest = rest.strip_prefix(',').unwrap_or(rest);
        let fields: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };
        if fields.len() > 3 {
            return Err(Error::Parse(format!("timerange: too many fields in `{text}`")));
        }

        let ptype = match fields.first() {
            None | Some(&"") => None,
            Some(field) => Some(field.parse().map_err(|_| {
                Error::Parse(format!("timerange: `{field}` is not a step type in `{text}`"))
            })?),
        };

        let d1 = fields.get(1).map(|f| parse_duration(f, text)).transpose()?.flatten();
        let d2 = fields.get(2).map(|f| parse_duration(f, text)).transpose()?.flatten();

        let unit = match (d1.and_then(|d| d.1), d2.and_then(|d| d.1)) {
            (Some(a), Some(b)) if a != b => {
                return Err(Error::Parse(format!(
                    "timerange: mixed second- and month-based durations in `{text}`"
                )))
            }
            (Some(a), _) => a,
            (None, Some(b)) => b,
            (None, None) => UnitClass::Second,
        };

        Ok(TimerangePattern {
            unit,
            ptype,
            p1: d1.map(|d| d.0),
            p2: d2.map(|d| d.0),
        })
    }

    pub fn matches(&self, value: &Timerange) -> bool {
        if let Some(want) = self.ptype {
            if want != value.ptype {
                return false;
            }
        }
        // Unit classes are only comparable when a duration is actually
        // constrained; a bare `GRIB1,0` matches either class.
        if (self.p1.is_some() || self.p2.is_some()) && self.unit != value.unit {
            return false;
        }
        if let Some(want) = self.p1 {
            if value.p1 != Some(want) {
                return false;
            }
        }
        if let Some(want) = self.p2 {
            if value.p2 != Some(want) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for TimerangePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            UnitClass::Second => "s",
            UnitClass::Month => "mo",
        };
        f.write_str("GRIB1")?;
        let render = |v: Option<i64>| v.map(|v| format!("{v}{suffix}"));
        let slots = [self.ptype.map(|v| v.to_string()), render(self.p1), render(self.p2)];
        let last_set = slots.iter().rposition(|c| c.is_some());
        if let Some(last) = last_set {
            for slot in &slots[..=last] {
                match slot {
                    Some(v) => write!(f, ",{v}")?,
                    None => f.write_str(",")?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(unit: UnitClass, ptype: u32, p1: Option<i64>, p2: Option<i64>) -> Timerange {
        Timerange { unit, ptype, p1, p2 }
    }

    #[test]
    fn units_normalize_to_seconds() {
        let p = TimerangePattern::parse("GRIB1,0,6h").unwrap();
        assert_eq!(p.p1, Some(21600));
        assert!(p.matches(&tr(UnitClass::Second, 0, Some(21600), None)));
        assert!(!p.matches(&tr(UnitClass::Second, 0, Some(3600), None)));
    }

    #[test]
    fn months_are_their_own_class() {
        let p = TimerangePattern::parse("GRIB1,0,1y").unwrap();
        assert_eq!(p.p1, Some(12));
        assert!(p.matches(&tr(UnitClass::Month, 0, Some(12), None)));
        // Same magnitude, wrong class.
        assert!(!p.matches(&tr(UnitClass::Second, 0, Some(12), None)));
    }

    #[test]
    fn mixed_units_fail_at_parse_time() {
        let err = TimerangePattern::parse("GRIB1,0,6h,1mo").unwrap_err();
        assert!(err.to_string().contains("mixed"));
    }

    #[test]
    fn suffixless_nonzero_is_rejected() {
        assert!(TimerangePattern::parse("GRIB1,0,6").is_err());
        assert!(TimerangePattern::parse("GRIB1,0,0").is_ok());
    }

    #[test]
    fn renders_back() {
        let p = TimerangePattern::parse("GRIB1,4,0,12h").unwrap();
        assert_eq!(p.to_string(), "GRIB1,4,0s,12h".replace("12h", "43200s"));
    }
}
