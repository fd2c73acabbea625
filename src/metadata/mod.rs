//! Metadata records: the typed attribute set describing one archived item,
//! plus the source reference pointing at its payload bytes inside a segment.

pub mod time;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::time::TimeInterval;
use crate::metadata::types::{Kind, Value};

/// On-disk payload format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Grib,
    Bufr,
    Odimh5,
    Vm2,
}

impl Format {
    pub fn ext(self) -> &'static str {
        match self {
            Format::Grib => "grib",
            Format::Bufr => "bufr",
            Format::Odimh5 => "h5",
            Format::Vm2 => "vm2",
        }
    }

    pub fn from_name(name: &str) -> Option<Format> {
        match name.to_ascii_lowercase().as_str() {
            "grib" => Some(Format::Grib),
            "bufr" => Some(Format::Bufr),
            "odimh5" | "h5" => Some(Format::Odimh5),
            "vm2" => Some(Format::Vm2),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}

/// Where a record's payload bytes live. The segment owns the bytes; the
/// record only points at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub format: Format,
    pub relpath: String,
    pub offset: u64,
    pub length: u64,
}

/// A metadata record: ordered (kind, value) attributes plus an optional
/// source reference assigned at import time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    items: BTreeMap<Kind, Value>,
    source: Option<Source>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, replacing any previous value of the same kind.
    pub fn set(&mut self, value: Value) {
        self.items.insert(value.kind(), value);
    }

    pub fn with(mut self, value: Value) -> Self {
        self.set(value);
        self
    }

    pub fn get(&self, kind: Kind) -> Option<&Value> {
        self.items.get(&kind)
    }

    pub fn has(&self, kind: Kind) -> bool {
        self.items.contains_key(&kind)
    }

    pub fn unset(&mut self, kind: Kind) -> Option<Value> {
        self.items.remove(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Kind, &Value)> {
        self.items.iter().map(|(k, v)| (*k, v))
    }

    pub fn reftime(&self) -> Option<&TimeInterval> {
        match self.items.get(&Kind::Reftime) {
            Some(Value::Reftime(interval)) => Some(interval),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Assign the source reference. Called once by the dataset writer when
    /// the payload lands in a segment; metadata edits never move the payload.
    pub(crate) fn set_source(&mut self, source: Source) {
        self.source = Some(source);
    }

    /// Render the identifying attributes used for duplicate detection.
    pub fn unique_key(&self, kinds: &[Kind]) -> String {
        let mut parts = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.items.get(kind) {
                Some(value) => parts.push(format!("{kind}:{value}")),
                None => parts.push(format!("{kind}:-")),
            }
        }
        parts.join("; ")
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, value) in &self.items {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{kind}:{value}")?;
            first = false;
        }
        Ok(())
    }
}
