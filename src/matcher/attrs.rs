//! Patterns over the small scalar attributes: run, proddef, quantity, task.

use std::collections::BTreeSet;
use std::fmt;

use crate::metadata::types::{Proddef, Quantity, Run, Task};
use crate::{Error, Result};

/// Model run pattern: a list of minute-of-day alternatives. `12` means
/// 12:00; `12:30` is accepted too. An optional `MINUTE,` prefix matches the
/// coded form used in archived expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPattern {
    minutes: Vec<u32>,
}

impl RunPattern {
    pub fn parse(text: &str) -> Result<RunPattern> {
        let rest = text.trim().strip_prefix("MINUTE,").unwrap_or(text.trim());
        let mut minutes = Vec::new();
        for part in rest.split(',') {
            let part = part.trim();
            let minute = match part.split_once(':') {
                Some((h, m)) => {
                    let h: u32 = h.parse().map_err(|_| {
                        Error::Parse(format!("run: `{part}` is not a time of day in `{text}`"))
                    })?;
                    let m: u32 = m.parse().map_err(|_| {
                        Error::Parse(format!("run: `{part}` is not a time of day in `{text}`"))
                    })?;
                    h * 60 + m
                }
                None => {
                    let h: u32 = part.parse().map_err(|_| {
                        Error::Parse(format!("run: `{part}` is not an hour in `{text}`"))
                    })?;
                    h * 60
                }
            };
            if minute >= 24 * 60 {
                return Err(Error::Parse(format!("run: `{part}` is past 24:00 in `{text}`")));
            }
            minutes.push(minute);
        }
        Ok(RunPattern { minutes })
    }

    pub fn matches(&self, value: &Run) -> bool {
        self.minutes.contains(&value.0)
    }
}

impl fmt::Display for RunPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MINUTE")?;
        for m in &self.minutes {
            write!(f, ",{:02}:{:02}", m / 60, m % 60)?;
        }
        Ok(())
    }
}

/// Product definition pattern: every listed `key=value` pair must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProddefPattern {
    pairs: Vec<(String, String)>,
}

impl ProddefPattern {
    pub fn parse(text: &str) -> Result<ProddefPattern> {
        let mut pairs = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            let (k, v) = part.split_once('=').ok_or_else(|| {
                Error::Parse(format!("proddef: expected `key=value`, got `{part}` in `{text}`"))
            })?;
            pairs.push((k.trim().to_string(), v.trim().to_string()));
        }
        Ok(ProddefPattern { pairs })
    }

    pub fn matches(&self, value: &Proddef) -> bool {
        self.pairs
            .iter()
            .all(|(k, v)| value.0.get(k).map(String::as_str) == Some(v.as_str()))
    }
}

impl fmt::Display for ProddefPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.pairs {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Quantity pattern: non-empty intersection with the record's quantity set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityPattern {
    names: BTreeSet<String>,
}

impl QuantityPattern {
    pub fn parse(text: &str) -> Result<QuantityPattern> {
        let names: BTreeSet<String> = text
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(Error::Parse(format!("quantity: empty pattern `{text}`")));
        }
        Ok(QuantityPattern { names })
    }

    pub fn matches(&self, value: &Quantity) -> bool {
        self.names.iter().any(|n| value.0.contains(n))
    }
}

impl fmt::Display for QuantityPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for n in &self.names {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(n)?;
            first = false;
        }
        Ok(())
    }
}

/// Task pattern: case-insensitive substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPattern {
    needle: String,
}

impl TaskPattern {
    pub fn parse(text: &str) -> Result<TaskPattern> {
        let needle = text.trim();
        if needle.is_empty() {
            return Err(Error::Parse("task: empty pattern".to_string()));
        }
        Ok(TaskPattern {
            needle: needle.to_string(),
        })
    }

    pub fn matches(&self, value: &Task) -> bool {
        value
            .0
            .to_ascii_lowercase()
            .contains(&self.needle.to_ascii_lowercase())
    }
}

impl fmt::Display for TaskPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.needle)
    }
}
