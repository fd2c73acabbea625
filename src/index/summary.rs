//! Coarse per-segment summaries used to prune queries at segment
//! granularity before any per-record work.

use serde::{Deserialize, Serialize};

use crate::matcher::Matcher;
use crate::metadata::time::{TimeInterval, Timestamp};
use crate::metadata::types::{Kind, Value};
use crate::metadata::Metadata;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub count: u64,
    pub reftime_min: Option<Timestamp>,
    pub reftime_max: Option<Timestamp>,
    /// Distinct origin values present in the segment.
    pub origins: Vec<Value>,
    /// Distinct product values present in the segment.
    pub products: Vec<Value>,
}

impl SegmentSummary {
    pub fn add(&mut self, md: &Metadata) {
        self.count += 1;
        if let Some(reftime) = md.reftime() {
            self.reftime_min = Some(match self.reftime_min {
                Some(cur) => cur.min(reftime.begin),
                None => reftime.begin,
            });
            self.reftime_max = Some(match self.reftime_max {
                Some(cur) => cur.max(reftime.end),
                None => reftime.end,
            });
        }
        if let Some(origin) = md.get(Kind::Origin) {
            if !self.origins.contains(origin) {
                self.origins.push(origin.clone());
            }
        }
        if let Some(product) = md.get(Kind::Product) {
            if !self.products.contains(product) {
                self.products.push(product.clone());
            }
        }
    }

    pub fn of_records<'a>(records: impl Iterator<Item = &'a Metadata>) -> SegmentSummary {
        let mut summary = SegmentSummary::default();
        for md in records {
            summary.add(md);
        }
        summary
    }

    /// Conservative may-match: false only when no record in the segment can
    /// possibly satisfy the matcher.
    pub fn could_match(&self, matcher: &Matcher) -> bool {
        if self.count == 0 {
            return true;
        }
        for kind in matcher.kinds() {
            let Some(groups) = matcher.groups(kind) else { continue };
            match kind {
                Kind::Reftime => {
                    if let (Some(min), Some(max)) = (self.reftime_min, self.reftime_max) {
                        // Overlap with the whole span is conservative for
                        // any record inside it.
                        let span = Value::Reftime(TimeInterval { begin: min, end: max });
                        if !groups.iter().all(|g| g.matches_value(&span)) {
                            return false;
                        }
                    }
                }
                Kind::Origin => {
                    if !self.origins.is_empty()
                        && !groups
                            .iter()
                            .all(|g| self.origins.iter().any(|v| g.matches_value(v)))
                    {
                        return false;
                    }
                }
                Kind::Product => {
                    if !self.products.is_empty()
                        && !groups
                            .iter()
                            .all(|g| self.products.iter().any(|v| g.matches_value(v)))
                    {
                        return false;
                    }
                }
                // Other kinds are not summarized.
                _ => {}
            }
        }
        true
    }
}
