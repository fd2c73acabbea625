//! A session: the explicitly constructed registry of datasets and aliases.
//!
//! There is no process-wide state anywhere in this crate; whoever drives it
//! builds a `Session`, loads alias definition layers and dataset
//! configurations into it, and passes it around for as long as it is
//! needed. The session also offers a merged virtual view that queries every
//! registered dataset and interleaves the results in reference-time order.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::dataset::{Checker, DatasetConfig, Query, Reader, Writer};
use crate::matcher::{AliasDatabase, Matcher};
use crate::metadata::Metadata;
use crate::{Error, Result};

#[derive(Default)]
pub struct Session {
    aliases: AliasDatabase,
    datasets: BTreeMap<String, DatasetConfig>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Layer one alias definition source on top of the ones already loaded.
    pub fn load_aliases(&mut self, text: &str) -> Result<()> {
        self.aliases.load_str(text)
    }

    pub fn load_alias_file(&mut self, path: &Path) -> Result<()> {
        self.aliases.load_path(path)
    }

    pub fn aliases(&self) -> &AliasDatabase {
        &self.aliases
    }

    pub fn add_dataset(&mut self, config: DatasetConfig) {
        self.datasets.insert(config.name.clone(), config);
    }

    /// Register every dataset described by a configuration file: one
    /// `[name]` section per dataset.
    pub fn load_config_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        self.load_config(&text)
            .with_context(|| format!("loading {}", path.display()))?;
        Ok(())
    }

    pub fn load_config(&mut self, text: &str) -> Result<()> {
        for section in crate::config::parse_sections(text)? {
            self.add_dataset(DatasetConfig::from_section(&section)?);
        }
        Ok(())
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig> {
        self.datasets
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("dataset {name} is not registered")))
    }

    /// Parse a match expression against the session's alias database.
    pub fn parse_matcher(&self, text: &str) -> Result<Matcher> {
        Matcher::parse_with_aliases(text, &self.aliases)
    }

    pub fn reader(&self, name: &str) -> Result<Reader> {
        Reader::open(self.dataset(name)?.clone())
    }

    pub fn writer(&self, name: &str) -> Result<Writer> {
        Writer::open(self.dataset(name)?.clone())
    }

    pub fn checker(&self, name: &str) -> Result<Checker> {
        Checker::open(self.dataset(name)?.clone())
    }

    /// Query every registered dataset and merge the streams in ascending
    /// reference-time order.
    pub fn query_merged(&self, matcher: &Matcher, with_data: bool) -> Result<MergedQuery> {
        let mut arms = Vec::with_capacity(self.datasets.len());
        for config in self.datasets.values() {
            let reader = Reader::open(config.clone())?;
            arms.push(reader.query(matcher, with_data)?);
        }
        MergedQuery::new(arms)
    }
}

/// K-way merge over per-dataset query streams. Errors from any stream
/// surface in order; pulling stops cleanly when the caller drops the merge.
pub struct MergedQuery {
    arms: Vec<Query>,
    heads: Vec<Option<Result<(Metadata, Option<Vec<u8>>)>>>,
}

impl MergedQuery {
    fn new(mut arms: Vec<Query>) -> Result<MergedQuery> {
        let heads = arms.iter_mut().map(Iterator::next).collect();
        Ok(MergedQuery { arms, heads })
    }
}

impl Iterator for MergedQuery {
    type Item = Result<(Metadata, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut best: Option<usize> = None;
        for (i, head) in self.heads.iter().enumerate() {
            match head {
                None => continue,
                // Surface stream errors as soon as they are reached.
                Some(Err(_)) => {
                    best = Some(i);
                    break;
                }
                Some(Ok((md, _))) => {
                    let at = md.reftime().map(|r| r.begin);
                    let better = match best {
                        None => true,
                        Some(j) => match &self.heads[j] {
                            Some(Ok((cur, _))) => at < cur.reftime().map(|r| r.begin),
                            _ => false,
                        },
                    };
                    if better {
                        best = Some(i);
                    }
                }
            }
        }
        let i = best?;
        let item = self.heads[i].take().expect("selected head is present");
        self.heads[i] = self.arms[i].next();
        Some(item)
    }
}
