//! The metadata match expression language.
//!
//! An expression is a set of clauses separated by `;` (or newlines), each
//! `kind:pattern or pattern or ...`. Clauses for different kinds are ANDed;
//! alternatives inside a clause are ORed. Repeating a kind adds another
//! AND-ed OR-group, which is also how [`Matcher::merge`] composes two
//! matchers, so the structure is a conjunction of OR-groups per kind.
//!
//! Evaluation is a pure predicate over one [`Metadata`] record and never
//! looks at payload bytes. A clause whose kind is absent from the record
//! passes: absence is not failure.
//!
//! ```
//! use nimbus::matcher::Matcher;
//! let m = Matcher::parse("origin:GRIB1,98; reftime:>=2020-01-01,<2020-02-01").unwrap();
//! assert!(!m.is_empty());
//! ```

pub mod aliases;
mod area;
mod attrs;
mod coded;
mod level;
mod reftime;
mod timerange;

use std::collections::BTreeMap;
use std::fmt;

pub use aliases::AliasDatabase;
pub use area::{AreaPattern, BBoxOp};
pub use attrs::{ProddefPattern, QuantityPattern, RunPattern, TaskPattern};
pub use coded::CodedPattern;
pub use level::LevelPattern;
pub use reftime::{CmpOp, ReftimePattern};
pub use timerange::TimerangePattern;

use crate::metadata::time::Timestamp;
use crate::metadata::types::{Kind, Value};
use crate::metadata::Metadata;
use crate::{Error, Result};

/// One parsed alternative, tagged with its attribute kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Origin(CodedPattern),
    Product(CodedPattern),
    Level(LevelPattern),
    Timerange(TimerangePattern),
    Reftime(ReftimePattern),
    Run(RunPattern),
    Area(AreaPattern),
    Proddef(ProddefPattern),
    Quantity(QuantityPattern),
    Task(TaskPattern),
}

impl Pattern {
    pub fn parse(kind: Kind, text: &str) -> Result<Pattern> {
        let text = text.trim();
        Ok(match kind {
            Kind::Origin => Pattern::Origin(CodedPattern::parse(kind, text)?),
            Kind::Product => Pattern::Product(CodedPattern::parse(kind, text)?),
            Kind::Level => Pattern::Level(LevelPattern::parse(text)?),
            Kind::Timerange => Pattern::Timerange(TimerangePattern::parse(text)?),
            Kind::Reftime => Pattern::Reftime(ReftimePattern::parse(text)?),
            Kind::Run => Pattern::Run(RunPattern::parse(text)?),
            Kind::Area => Pattern::Area(AreaPattern::parse(text)?),
            Kind::Proddef => Pattern::Proddef(ProddefPattern::parse(text)?),
            Kind::Quantity => Pattern::Quantity(QuantityPattern::parse(text)?),
            Kind::Task => Pattern::Task(TaskPattern::parse(text)?),
        })
    }

    pub fn kind(&self) -> Kind {
        match self {
            Pattern::Origin(_) => Kind::Origin,
            Pattern::Product(_) => Kind::Product,
            Pattern::Level(_) => Kind::Level,
            Pattern::Timerange(_) => Kind::Timerange,
            Pattern::Reftime(_) => Kind::Reftime,
            Pattern::Run(_) => Kind::Run,
            Pattern::Area(_) => Kind::Area,
            Pattern::Proddef(_) => Kind::Proddef,
            Pattern::Quantity(_) => Kind::Quantity,
            Pattern::Task(_) => Kind::Task,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Pattern::Origin(p), Value::Origin(v)) => p.matches(v),
            (Pattern::Product(p), Value::Product(v)) => p.matches(v),
            (Pattern::Level(p), Value::Level(v)) => p.matches(v),
            (Pattern::Timerange(p), Value::Timerange(v)) => p.matches(v),
            (Pattern::Reftime(p), Value::Reftime(v)) => p.matches(v),
            (Pattern::Run(p), Value::Run(v)) => p.matches(v),
            (Pattern::Area(p), Value::Area(v)) => p.matches(v),
            (Pattern::Proddef(p), Value::Proddef(v)) => p.matches(v),
            (Pattern::Quantity(p), Value::Quantity(v)) => p.matches(v),
            (Pattern::Task(p), Value::Task(v)) => p.matches(v),
            _ => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Origin(p) => p.fmt(f),
            Pattern::Product(p) => p.fmt(f),
            Pattern::Level(p) => p.fmt(f),
            Pattern::Timerange(p) => p.fmt(f),
            Pattern::Reftime(p) => p.fmt(f),
            Pattern::Run(p) => p.fmt(f),
            Pattern::Area(p) => p.fmt(f),
            Pattern::Proddef(p) => p.fmt(f),
            Pattern::Quantity(p) => p.fmt(f),
            Pattern::Task(p) => p.fmt(f),
        }
    }
}

/// ORed alternatives for one attribute kind.
#[derive(Debug, Clone, PartialEq)]
pub struct OrGroup {
    alts: Vec<Pattern>,
}

impl OrGroup {
    pub fn alts(&self) -> &[Pattern] {
        &self.alts
    }

    pub fn matches_value(&self, value: &Value) -> bool {
        self.alts.iter().any(|p| p.matches(value))
    }
}

impl fmt::Display for OrGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for alt in &self.alts {
            if !first {
                f.write_str(" or ")?;
            }
            alt.fmt(f)?;
            first = false;
        }
        Ok(())
    }
}

/// A parsed match expression: per kind, a conjunction of OR-groups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matcher {
    clauses: BTreeMap<Kind, Vec<OrGroup>>,
}

fn looks_like_alias_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Matcher {
    /// Parse an expression without alias support. Bare names fail.
    pub fn parse(text: &str) -> Result<Matcher> {
        Self::parse_inner(text, None)
    }

    /// Parse an expression, resolving bare alternatives against the alias
    /// database. An alternative that is neither a valid pattern nor a known
    /// alias is a parse error.
    pub fn parse_with_aliases(text: &str, aliases: &AliasDatabase) -> Result<Matcher> {
        Self::parse_inner(text, Some(aliases))
    }

    fn parse_inner(text: &str, aliases: Option<&AliasDatabase>) -> Result<Matcher> {
        let mut clauses: BTreeMap<Kind, Vec<OrGroup>> = BTreeMap::new();
        for clause in text.split(|c| c == ';' || c == '\n') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (kind_name, rest) = clause.split_once(':').ok_or_else(|| {
                Error::Parse(format!("expected `kind:pattern`, got `{clause}`"))
            })?;
            let kind_name = kind_name.trim();
            let kind = Kind::from_name(kind_name)
                .ok_or_else(|| Error::Parse(format!("unknown attribute kind `{kind_name}`")))?;
            let mut alts = Vec::new();
            for alt in rest.split(" or ") {
                let alt = alt.trim();
                if alt.is_empty() {
                    return Err(Error::Parse(format!("{kind}: empty alternative in `{clause}`")));
                }
                if let Some(expansions) = aliases.and_then(|db| db.resolve(kind, alt)) {
                    for expansion in expansions {
                        alts.push(Pattern::parse(kind, expansion)?);
                    }
                    continue;
                }
                match Pattern::parse(kind, alt) {
                    Ok(pattern) => alts.push(pattern),
                    Err(err) => {
                        if looks_like_alias_name(alt) {
                            return Err(Error::Parse(format!(
                                "{kind}: `{alt}` is not a known alias"
                            )));
                        }
                        return Err(err);
                    }
                }
            }
            clauses.entry(kind).or_default().push(OrGroup { alts });
        }
        Ok(Matcher { clauses })
    }

    /// An empty matcher matches everything.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.clauses.keys().copied()
    }

    pub fn groups(&self, kind: Kind) -> Option<&[OrGroup]> {
        self.clauses.get(&kind).map(Vec::as_slice)
    }

    /// Evaluate against one record. Pure and deterministic.
    pub fn matches(&self, md: &Metadata) -> bool {
        for (kind, groups) in &self.clauses {
            let value = match md.get(*kind) {
                Some(value) => value,
                // Open world: a record without this attribute passes.
                None => continue,
            };
            if !groups.iter().all(|g| g.matches_value(value)) {
                return false;
            }
        }
        true
    }

    /// Intersection of two matchers: a record matches the result iff it
    /// matches both inputs.
    pub fn merge(&self, other: &Matcher) -> Matcher {
        let mut clauses = self.clauses.clone();
        for (kind, groups) in &other.clauses {
            clauses.entry(*kind).or_default().extend(groups.iter().cloned());
        }
        Matcher { clauses }
    }

    /// Reference-time bounds implied by the expression, as
    /// (inclusive lower, exclusive upper). Used for segment pruning.
    pub fn date_extremes(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        let mut lower: Option<Timestamp> = None;
        let mut upper: Option<Timestamp> = None;
        let Some(groups) = self.clauses.get(&Kind::Reftime) else {
            return (None, None);
        };
        for group in groups {
            // Union over the group's alternatives.
            let mut group_lower: Option<Timestamp> = None;
            let mut group_upper: Option<Timestamp> = None;
            let mut unbounded_below = false;
            let mut unbounded_above = false;
            for alt in &group.alts {
                let Pattern::Reftime(p) = alt else { continue };
                let (lo, up) = p.bounds();
                match lo {
                    Some(lo) => {
                        group_lower = Some(group_lower.map_or(lo, |cur: Timestamp| cur.min(lo)))
                    }
                    None => unbounded_below = true,
                }
                match up {
                    Some(up) => {
                        group_upper = Some(group_upper.map_or(up, |cur: Timestamp| cur.max(up)))
                    }
                    None => unbounded_above = true,
                }
            }
            // Intersection across groups.
            if let (false, Some(lo)) = (unbounded_below, group_lower) {
                lower = Some(lower.map_or(lo, |cur| cur.max(lo)));
            }
            if let (false, Some(up)) = (unbounded_above, group_upper) {
                upper = Some(upper.map_or(up, |cur| cur.min(up)));
            }
        }
        (lower, upper)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, groups) in &self.clauses {
            for group in groups {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{kind}:{group}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::time::TimeInterval;
    use crate::metadata::types::{CodeStyle, CodeTriple, Level};
    use time::macros::datetime;

    fn record() -> Metadata {
        Metadata::new()
            .with(Value::Origin(CodeTriple::new(CodeStyle::Grib1, [Some(98), Some(0), Some(12)])))
            .with(Value::Level(Level::Coded { ltype: 100, l1: Some(1000), l2: None }))
            .with(Value::Reftime(TimeInterval::instant(datetime!(2020-01-15 12:00:00))))
    }

    #[test]
    fn and_across_kinds_or_within() {
        let m = Matcher::parse("level:1000 or 2000; origin:GRIB1,98").unwrap();
        assert!(m.matches(&record()));
        let m = Matcher::parse("level:500 or 2000; origin:GRIB1,98").unwrap();
        assert!(!m.matches(&record()));
    }

    #[test]
    fn absent_kind_passes() {
        let m = Matcher::parse("task:volume").unwrap();
        assert!(m.matches(&record()));
    }

    #[test]
    fn unknown_kind_is_parse_error() {
        let err = Matcher::parse("flavour:mint").unwrap_err();
        assert!(err.to_string().contains("flavour"));
    }

    #[test]
    fn merge_is_conjunction() {
        let a = Matcher::parse("level:1000 or 2000").unwrap();
        let b = Matcher::parse("level:2000").unwrap();
        let merged = a.merge(&b);
        // 1000 satisfies a but not b.
        assert!(!merged.matches(&record()));
        let mut md = record();
        md.set(Value::Level(Level::Coded { ltype: 100, l1: Some(2000), l2: None }));
        assert!(merged.matches(&md));
    }

    #[test]
    fn display_round_trips() {
        let m = Matcher::parse("level:1000 or GRIB1,100,500; reftime:>=2020-01-01").unwrap();
        let rendered = m.to_string();
        let reparsed = Matcher::parse(&rendered).unwrap();
        assert_eq!(m, reparsed);
    }

    #[test]
    fn date_extremes_from_clause() {
        let m = Matcher::parse("reftime:>=2020-01-01,<2020-02-01").unwrap();
        let (lo, up) = m.date_extremes();
        assert_eq!(lo, Some(datetime!(2020-01-01 00:00:00)));
        assert_eq!(up, Some(datetime!(2020-02-01 00:00:00)));
        assert_eq!(Matcher::parse("level:1000").unwrap().date_extremes(), (None, None));
    }
}
