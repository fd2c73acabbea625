//! Patterns over reference times.
//!
//! A reftime clause is a comma-separated conjunction of constraints, each an
//! optional comparison operator followed by a possibly-partial datetime:
//! `>=2020-01-01,<2020-02-01` or `=2020-06`. A partial datetime stands for
//! the span it covers, inclusive at the start and exclusive at the end, and
//! `=` means non-empty overlap with the record's own interval.

use std::fmt;

use crate::metadata::time::{parse_partial, PartialTime, TimeInterval, Timestamp};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Lt => "<",
            CmpOp::Eq => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: CmpOp,
    pub at: PartialTime,
    text: String,
}

impl Constraint {
    /// Record intervals have inclusive endpoints; constraint spans are
    /// inclusive-start, exclusive-end.
    fn matches(&self, value: &TimeInterval) -> bool {
        match self.op {
            CmpOp::Ge => value.end >= self.at.start,
            CmpOp::Gt => value.end >= self.at.end,
            CmpOp::Le => value.begin < self.at.end,
            CmpOp::Lt => value.begin < self.at.start,
            CmpOp::Eq => value.begin < self.at.end && value.end >= self.at.start,
        }
    }

    /// Bounds this constraint puts on matching instants, as
    /// (inclusive lower, exclusive upper).
    fn bounds(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        match self.op {
            CmpOp::Ge => (Some(self.at.start), None),
            CmpOp::Gt => (Some(self.at.end), None),
            CmpOp::Le => (None, Some(self.at.end)),
            CmpOp::Lt => (None, Some(self.at.start)),
            CmpOp::Eq => (Some(self.at.start), Some(self.at.end)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReftimePattern {
    constraints: Vec<Constraint>,
}

impl ReftimePattern {
    pub fn parse(text: &str) -> Result<ReftimePattern> {
        let mut constraints = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::Parse(format!("reftime: empty constraint in `{text}`")));
            }
            let (op, rest) = if let Some(rest) = part.strip_prefix(">=") {
                (CmpOp::Ge, rest)
            } else if let Some(rest) = part.strip_prefix("<=") {
                (CmpOp::Le, rest)
            } else if let Some(rest) = part.strip_prefix(">") {
                (CmpOp::Gt, rest)
            } else if let Some(rest) = part.strip_prefix("<") {
                (CmpOp::Lt, rest)
            } else if let Some(rest) = part.strip_prefix("==") {
                (CmpOp::Eq, rest)
            } else if let Some(rest) = part.strip_prefix("=") {
                (CmpOp::Eq, rest)
            } else {
                (CmpOp::Eq, part)
            };
            let rest = rest.trim();
            let at = parse_partial(rest)?;
            constraints.push(Constraint {
                op,
                at,
                text: rest.to_string(),
            });
        }
        Ok(ReftimePattern { constraints })
    }

    pub fn matches(&self, value: &TimeInterval) -> bool {
        self.constraints.iter().all(|c| c.matches(value))
    }

    /// Combined (inclusive lower, exclusive upper) bounds of all constraints.
    pub fn bounds(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        let mut lower: Option<Timestamp> = None;
        let mut upper: Option<Timestamp> = None;
        for c in &self.constraints {
            let (lo, up) = c.bounds();
            if let Some(lo) = lo {
                lower = Some(lower.map_or(lo, |cur| cur.max(lo)));
            }
            if let Some(up) = up {
                upper = Some(upper.map_or(up, |cur| cur.min(up)));
            }
        }
        (lower, upper)
    }
}

impl fmt::Display for ReftimePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.constraints {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}{}", c.op.symbol(), c.text)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn instant(ts: Timestamp) -> TimeInterval {
        TimeInterval::instant(ts)
    }

    #[test]
    fn month_window() {
        let p = ReftimePattern::parse(">=2020-01-01,<2020-02-01").unwrap();
        assert!(p.matches(&instant(datetime!(2020-01-01 00:00:00))));
        assert!(p.matches(&instant(datetime!(2020-01-31 23:59:59))));
        assert!(!p.matches(&instant(datetime!(2020-02-01 00:00:00))));
        assert!(!p.matches(&instant(datetime!(2019-12-31 23:59:59))));
    }

    #[test]
    fn equality_is_overlap() {
        let p = ReftimePattern::parse("=2020-06").unwrap();
        assert!(p.matches(&instant(datetime!(2020-06-15 12:00:00))));
        let spanning = TimeInterval::new(
            datetime!(2020-05-20 00:00:00),
            datetime!(2020-06-02 00:00:00),
        )
        .unwrap();
        assert!(p.matches(&spanning));
        assert!(!p.matches(&instant(datetime!(2020-07-01 00:00:00))));
    }

    #[test]
    fn strict_after_partial_excludes_its_span() {
        let p = ReftimePattern::parse(">2020-01").unwrap();
        assert!(!p.matches(&instant(datetime!(2020-01-31 23:59:59))));
        assert!(p.matches(&instant(datetime!(2020-02-01 00:00:00))));
    }

    #[test]
    fn bounds_intersect_constraints() {
        let p = ReftimePattern::parse(">=2020-01-01,<2020-02-01").unwrap();
        let (lo, up) = p.bounds();
        assert_eq!(lo, Some(datetime!(2020-01-01 00:00:00)));
        assert_eq!(up, Some(datetime!(2020-02-01 00:00:00)));
    }

    #[test]
    fn malformed_literal_names_clause() {
        let err = ReftimePattern::parse(">=2020-13-01").unwrap_err();
        assert!(err.to_string().contains("2020-13-01"));
    }
}
