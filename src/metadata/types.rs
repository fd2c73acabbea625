//! Attribute kinds and their typed values.
//!
//! Each archived record is described by a small set of attributes drawn from
//! a fixed enumeration of kinds. Every kind has its own value representation
//! and its own rendering, chosen so that `Display` output round-trips
//! through the corresponding match pattern grammar.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::time::TimeInterval;

/// The fixed enumeration of matchable attribute kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Origin,
    Product,
    Level,
    Timerange,
    Reftime,
    Run,
    Area,
    Proddef,
    Quantity,
    Task,
}

impl Kind {
    pub const ALL: [Kind; 10] = [
        Kind::Origin,
        Kind::Product,
        Kind::Level,
        Kind::Timerange,
        Kind::Reftime,
        Kind::Run,
        Kind::Area,
        Kind::Proddef,
        Kind::Quantity,
        Kind::Task,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kind::Origin => "origin",
            Kind::Product => "product",
            Kind::Level => "level",
            Kind::Timerange => "timerange",
            Kind::Reftime => "reftime",
            Kind::Run => "run",
            Kind::Area => "area",
            Kind::Proddef => "proddef",
            Kind::Quantity => "quantity",
            Kind::Task => "task",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoding family of a coded identifier (origin, product).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeStyle {
    Grib1,
    Grib2,
    Bufr,
    Odimh5,
}

impl CodeStyle {
    pub fn name(self) -> &'static str {
        match self {
            CodeStyle::Grib1 => "GRIB1",
            CodeStyle::Grib2 => "GRIB2",
            CodeStyle::Bufr => "BUFR",
            CodeStyle::Odimh5 => "ODIMH5",
        }
    }

    pub fn from_name(name: &str) -> Option<CodeStyle> {
        match name.to_ascii_uppercase().as_str() {
            "GRIB1" => Some(CodeStyle::Grib1),
            "GRIB2" => Some(CodeStyle::Grib2),
            "BUFR" => Some(CodeStyle::Bufr),
            "ODIMH5" => Some(CodeStyle::Odimh5),
            _ => None,
        }
    }
}

/// A coded identifier: style plus up to three integer codes
/// (e.g. GRIB1 centre, subcentre, process).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTriple {
    pub style: CodeStyle,
    pub codes: [Option<u32>; 3],
}

impl CodeTriple {
    pub fn new(style: CodeStyle, codes: [Option<u32>; 3]) -> Self {
        Self { style, codes }
    }
}

impl fmt::Display for CodeTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.style.name())?;
        let last_set = self.codes.iter().rposition(|c| c.is_some());
        if let Some(last) = last_set {
            for code in &self.codes[..=last] {
                match code {
                    Some(v) => write!(f, ",{v}")?,
                    None => f.write_str(",")?,
                }
            }
        }
        Ok(())
    }
}

/// Vertical level: either a coded (type, l1, l2) triple or a vertical extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Level {
    Coded {
        ltype: u32,
        l1: Option<u32>,
        l2: Option<u32>,
    },
    Range {
        min: f64,
        max: f64,
    },
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Coded { ltype, l1, l2 } => {
                write!(f, "GRIB1,{ltype}")?;
                let slots = [l1, l2];
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
            Level::Range { min, max } => write!(f, "range {min} {max}"),
        }
    }
}

/// Unit class a time range is normalized into. Second-based and month-based
/// durations have no defined conversion between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitClass {
    Second,
    Month,
}

/// Forecast time range: step type plus normalized p1/p2 durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timerange {
    pub unit: UnitClass,
    pub ptype: u32,
    pub p1: Option<i64>,
    pub p2: Option<i64>,
}

impl fmt::Display for Timerange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            UnitClass::Second => "s",
            UnitClass::Month => "mo",
        };
        write!(f, "GRIB1,{}", self.ptype)?;
        if let Some(p1) = self.p1 {
            write!(f, ",{p1}{suffix}")?;
        }
        if let Some(p2) = self.p2 {
            write!(f, ",{p2}{suffix}")?;
        }
        Ok(())
    }
}

/// Model run, as minute of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run(pub u32);

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BBox {
    pub fn contains(&self, other: &BBox) -> bool {
        self.lat_min <= other.lat_min
            && self.lat_max >= other.lat_max
            && self.lon_min <= other.lon_min
            && self.lon_max >= other.lon_max
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.lat_min <= other.lat_max
            && self.lat_max >= other.lat_min
            && self.lon_min <= other.lon_max
            && self.lon_max >= other.lon_min
    }
}

/// Geographic area: a named grid and/or a bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: Option<String>,
    pub bbox: Option<BBox>,
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.bbox) {
            (Some(id), _) => write!(f, "id {id}"),
            (None, Some(b)) => write!(
                f,
                "bbox {} {} {} {}",
                b.lat_min, b.lon_min, b.lat_max, b.lon_max
            ),
            (None, None) => f.write_str("empty"),
        }
    }
}

/// Product definition: free-form key=value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proddef(pub BTreeMap<String, String>);

impl fmt::Display for Proddef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Measured quantities carried by the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(pub BTreeSet<String>);

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for q in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(q)?;
            first = false;
        }
        Ok(())
    }
}

/// Acquisition task name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task(pub String);

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One typed attribute value. The variant fixes the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Origin(CodeTriple),
    Product(CodeTriple),
    Level(Level),
    Timerange(Timerange),
    Reftime(TimeInterval),
    Run(Run),
    Area(Area),
    Proddef(Proddef),
    Quantity(Quantity),
    Task(Task),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Origin(_) => Kind::Origin,
            Value::Product(_) => Kind::Product,
            Value::Level(_) => Kind::Level,
            Value::Timerange(_) => Kind::Timerange,
            Value::Reftime(_) => Kind::Reftime,
            Value::Run(_) => Kind::Run,
            Value::Area(_) => Kind::Area,
            Value::Proddef(_) => Kind::Proddef,
            Value::Quantity(_) => Kind::Quantity,
            Value::Task(_) => Kind::Task,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Origin(v) => v.fmt(f),
            Value::Product(v) => v.fmt(f),
            Value::Level(v) => v.fmt(f),
            Value::Timerange(v) => v.fmt(f),
            Value::Reftime(v) => v.fmt(f),
            Value::Run(v) => v.fmt(f),
            Value::Area(v) => v.fmt(f),
            Value::Proddef(v) => v.fmt(f),
            Value::Quantity(v) => v.fmt(f),
            Value::Task(v) => v.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_triple_trims_trailing_blanks() {
        let t = CodeTriple::new(CodeStyle::Grib1, [Some(98), None, Some(12)]);
        assert_eq!(t.to_string(), "GRIB1,98,,12");
        let t = CodeTriple::new(CodeStyle::Grib1, [Some(98), None, None]);
        assert_eq!(t.to_string(), "GRIB1,98");
        let t = CodeTriple::new(CodeStyle::Bufr, [None, None, None]);
        assert_eq!(t.to_string(), "BUFR");
    }

    #[test]
    fn run_renders_minute_of_day() {
        assert_eq!(Run(750).to_string(), "12:30");
        assert_eq!(Run(0).to_string(), "00:00");
    }
}
