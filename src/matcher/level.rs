//! Patterns over vertical levels.
//!
//! Three forms are accepted:
//! - `GRIB1,type[,l1[,l2]]` — coded level, empty positions are wildcards;
//! - `range MIN MAX` — matches any record whose vertical extent overlaps
//!   the given extent;
//! - a bare number — shorthand for "any coded level with l1 equal to it".

use std::fmt;

use crate::metadata::types::Level;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum LevelPattern {
    Coded {
        ltype: Option<u32>,
        l1: Option<u32>,
        l2: Option<u32>,
    },
    Range {
        min: f64,
        max: f64,
    },
}

fn parse_f64(text: &str, whole: &str) -> Result<f64> {
    text.parse()
        .map_err(|_| Error::Parse(format!("level: `{text}` is not a number in `{whole}`")))
}

fn parse_slot(text: &str, whole: &str) -> Result<Option<u32>> {
    if text.is_empty() {
        return Ok(None);
    }
    text.parse().map(Some).map_err(|_| {
        Error::Parse(format!("level: `{text}` is not a numeric code in `{whole}`"))
    })
}

impl LevelPattern {
    pub fn parse(text: &str) -> Result<LevelPattern> {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix("range") {
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(Error::Parse(format!(
                    "level: `range` wants two bounds in `{text}`"
                )));
            }
            let a = parse_f64(fields[0], text)?;
            let b = parse_f64(fields[1], text)?;
            return Ok(LevelPattern::Range {
                min: a.min(b),
                max: a.max(b),
            });
        }
        if let Some(rest) = trimmed.strip_prefix("GRIB1") {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            let fields: Vec<&str> = if rest.is_empty() {
                Vec::new()
            } else {
                rest.split(',').map(str::trim).collect()
            };
            if fields.len() > 3 {
                return Err(Error::Parse(format!("level: too many fields in `{text}`")));
            }
            return Ok(LevelPattern::Coded {
                ltype: fields.first().map(|f| parse_slot(f, text)).transpose()?.flatten(),
                l1: fields.get(1).map(|f| parse_slot(f, text)).transpose()?.flatten(),
                l2: fields.get(2).map(|f| parse_slot(f, text)).transpose()?.flatten(),
            });
        }
        // Bare numeric shorthand: match on l1 regardless of level type.
        let l1 = trimmed.parse().map_err(|_| {
            Error::Parse(format!("level: cannot parse `{text}` as a level pattern"))
        })?;
        Ok(LevelPattern::Coded {
            ltype: None,
            l1: Some(l1),
            l2: None,
        })
    }

    pub fn matches(&self, value: &Level) -> bool {
        match (self, value) {
            (LevelPattern::Coded { ltype, l1, l2 }, Level::Coded { ltype: vt, l1: v1, l2: v2 }) => {
                if let Some(want) = ltype {
                    if want != vt {
                        return false;
                    }
                }
                if let Some(want) = l1 {
                    if Some(*want) != *v1 {
                        return false;
                    }
                }
                if let Some(want) = l2 {
                    if Some(*want) != *v2 {
                        return false;
                    }
                }
                true
            }
            (LevelPattern::Range { min, max }, Level::Range { min: vmin, max: vmax }) => {
                !(vmin > max || vmax < min)
            }
            // A range pattern against a coded single level checks containment
            // of l1; a coded pattern never matches a range value.
            (LevelPattern::Range { min, max }, Level::Coded { l1: Some(l1), .. }) => {
                let l1 = f64::from(*l1);
                l1 >= *min && l1 <= *max
            }
            _ => false,
        }
    }
}

impl fmt::Display for LevelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelPattern::Coded { ltype, l1, l2 } => {
                f.write_str("GRIB1")?;
                let slots = [ltype, l1, l2];
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
            LevelPattern::Range { min, max } => write!(f, "range {min} {max}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_number_matches_l1() {
        let p = LevelPattern::parse("1000").unwrap();
        assert!(p.matches(&Level::Coded { ltype: 100, l1: Some(1000), l2: None }));
        assert!(!p.matches(&Level::Coded { ltype: 100, l1: Some(500), l2: None }));
    }

    #[test]
    fn coded_with_wildcards() {
        let p = LevelPattern::parse("GRIB1,100,,50").unwrap();
        assert!(p.matches(&Level::Coded { ltype: 100, l1: Some(7), l2: Some(50) }));
        assert!(!p.matches(&Level::Coded { ltype: 100, l1: Some(7), l2: Some(51) }));
    }

    #[test]
    fn range_overlap() {
        let p = LevelPattern::parse("range 0.5 1.5").unwrap();
        assert!(p.matches(&Level::Range { min: 1.0, max: 3.0 }));
        assert!(!p.matches(&Level::Range { min: 2.0, max: 3.0 }));
        assert!(p.matches(&Level::Coded { ltype: 105, l1: Some(1), l2: None }));
    }

    #[test]
    fn malformed_is_rejected() {
        assert!(LevelPattern::parse("range 1").is_err());
        assert!(LevelPattern::parse("GRIB1,a").is_err());
        assert!(LevelPattern::parse("surface").is_err());
    }
}
