//! Datasets: named collections spanning many time-addressed segments,
//! served through three roles with distinct rights.
//!
//! - [`Reader`] answers matcher queries, lock-free;
//! - [`Writer`] accepts new records under the dataset write lock;
//! - [`Checker`] runs maintenance (check, reindex, repack) under the same
//!   lock.
//!
//! Concurrency model: operations block on file I/O; concurrency across
//! datasets comes from independent instances per dataset, not from threads
//! inside this crate. Many readers may run at once. Repack renumbers
//! offsets, so it requires exclusivity: the write lock excludes writers and
//! checkers in other processes, and fcntl lock semantics leave same-process
//! exclusion to the caller, who keeps a single writing role per dataset.
//! Readers do not take the lock; a repack therefore runs only when the
//! caller knows no reader is in flight on that dataset.

mod checker;
mod lock;
mod reader;
mod step;
mod writer;

use std::path::{Path, PathBuf};

pub use checker::{Checker, RepackStats, SegmentReport, SegmentStatus};
pub use lock::DatasetLock;
pub use reader::{Query, Reader};
pub use step::Step;
pub use writer::{Acquired, Writer};

use crate::config::Section;
use crate::index::journal_path;
use crate::metadata::types::Kind;
use crate::metadata::Format;
use crate::segment::Flavor;
use crate::{Error, Result};

/// Identifying attributes that participate in duplicate detection unless
/// the configuration overrides them.
pub const DEFAULT_UNIQUE: [Kind; 8] = [
    Kind::Reftime,
    Kind::Origin,
    Kind::Product,
    Kind::Level,
    Kind::Timerange,
    Kind::Run,
    Kind::Area,
    Kind::Proddef,
];

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub name: String,
    pub root: PathBuf,
    pub format: Format,
    pub step: Step,
    pub flavor: Flavor,
    /// Attribute kinds whose rendering forms the duplicate-detection key.
    pub unique: Vec<Kind>,
}

impl DatasetConfig {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            format,
            step: Step::Monthly,
            flavor: Flavor::Concat,
            unique: DEFAULT_UNIQUE.to_vec(),
        }
    }

    /// Build from one `[name]` section of a session configuration file.
    /// Recognized keys: `path`, `format`, `step`, `segment`, `unique`.
    pub fn from_section(section: &Section) -> Result<DatasetConfig> {
        let name = section.name.clone();
        let mut root = None;
        let mut format = None;
        let mut step = Step::Monthly;
        let mut flavor = Flavor::Concat;
        let mut unique = DEFAULT_UNIQUE.to_vec();
        for (key, value) in &section.entries {
            match key.as_str() {
                "path" => root = Some(PathBuf::from(value)),
                "format" => {
                    format = Some(Format::from_name(value).ok_or_else(|| {
                        Error::Parse(format!("dataset {name}: unknown format `{value}`"))
                    })?)
                }
                "step" => {
                    step = Step::from_name(value).ok_or_else(|| {
                        Error::Parse(format!("dataset {name}: unknown step `{value}`"))
                    })?
                }
                "segment" => {
                    flavor = Flavor::from_name(value).ok_or_else(|| {
                        Error::Parse(format!("dataset {name}: unknown segment type `{value}`"))
                    })?
                }
                "unique" => {
                    unique = value
                        .split(',')
                        .map(|k| {
                            Kind::from_name(k.trim()).ok_or_else(|| {
                                Error::Parse(format!(
                                    "dataset {name}: unknown attribute kind `{k}` in unique"
                                ))
                            })
                        })
                        .collect::<Result<Vec<Kind>>>()?
                }
                other => {
                    return Err(Error::Parse(format!(
                        "dataset {name}: unknown configuration key `{other}`"
                    )))
                }
            }
        }
        Ok(DatasetConfig {
            root: root
                .ok_or_else(|| Error::Parse(format!("dataset {name}: missing `path`")))?,
            format: format
                .ok_or_else(|| Error::Parse(format!("dataset {name}: missing `format`")))?,
            name,
            step,
            flavor,
            unique,
        })
    }

    pub fn segment_abspath(&self, relpath: &str) -> PathBuf {
        self.root.join(relpath)
    }

    pub fn journal_abspath(&self, relpath: &str) -> PathBuf {
        journal_path(&self.root.join(relpath))
    }

    pub(crate) fn err_context(&self, relpath: &str) -> String {
        format!("dataset {}: segment {relpath}", self.name)
    }
}

/// Walk the dataset root for segment storage paths, returning relpaths as
/// the index knows them (container suffixes stripped).
pub(crate) fn scan_segment_relpaths(config: &DatasetConfig) -> Result<Vec<String>> {
    let mut found = Vec::new();
    let ext = format!(".{}", config.format.ext());
    walk(&config.root, &config.root, &ext, &mut found)?;
    found.sort();
    found.dedup();
    Ok(found)
}

fn walk(root: &Path, dir: &Path, ext: &str, found: &mut Vec<String>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || name.ends_with(".repack") || name.ends_with(".old") {
            continue;
        }
        let ftype = entry.file_type()?;
        if ftype.is_dir() {
            if name.ends_with(ext) {
                // Directory-of-files segment.
                push_relpath(root, &path, found);
            } else {
                walk(root, &path, ext, found)?;
            }
            continue;
        }
        // The index names a segment by its logical relpath: strip container
        // suffixes so `2020/01.grib.gz` and `2020/01.grib.tar` both map to
        // `2020/01.grib`.
        let stripped = name
            .strip_suffix(".gz")
            .or_else(|| name.strip_suffix(".tar"))
            .or_else(|| name.strip_suffix(".zip"))
            .unwrap_or(name);
        if stripped.ends_with(ext) && !name.ends_with(".meta.jsonl") {
            push_relpath(root, &path.with_file_name(stripped), found);
        }
    }
    Ok(())
}

fn push_relpath(root: &Path, path: &Path, found: &mut Vec<String>) {
    if let Ok(rel) = path.strip_prefix(root) {
        found.push(rel.to_string_lossy().replace('\\', "/"));
    }
}
