//! The per-dataset index: per-segment record journals plus a dataset
//! manifest with coarse summaries.
//!
//! The journal (`<segment>.meta.jsonl`, one JSON record per line) is the
//! authoritative record directory of a segment: the writer appends to it
//! right after every payload append, and rebuilds always read from it, never
//! from the manifest. The manifest (`index.json` at the dataset root) is an
//! advisory cache: per segment it remembers the size and mtime observed at
//! the last update together with a [`SegmentSummary`] used to prune queries.
//! Staleness is detected by comparing the remembered (size, mtime) against
//! the segment on disk; a stale entry is rebuilt from the journal.

mod summary;

pub use summary::SegmentSummary;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::matcher::Matcher;
use crate::metadata::{Format, Metadata};
use crate::segment::Flavor;
use crate::{Error, Result};

pub const MANIFEST_NAME: &str = "index.json";
const MANIFEST_VERSION: u32 = 1;

/// One line of a segment's record journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub md: Metadata,
    pub offset: u64,
    pub length: u64,
    /// crc32 of the payload bytes, verified when payloads are read back.
    pub checksum: u32,
    /// Tombstone: the payload stays in the segment until the next repack.
    #[serde(default)]
    pub deleted: bool,
}

/// Journal file next to a segment's storage path.
pub fn journal_path(segment_abspath: &Path) -> PathBuf {
    let mut name = segment_abspath
        .file_name()
        .unwrap_or_default()
        .to_os_string();
    name.push(".meta.jsonl");
    segment_abspath.with_file_name(name)
}

pub struct Journal;

impl Journal {
    /// None when the journal file does not exist.
    pub fn load(path: &Path) -> Result<Option<Vec<JournalEntry>>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(line).map_err(|err| {
                Error::Corrupt(format!(
                    "{}: journal line {}: {err}",
                    path.display(),
                    lineno + 1
                ))
            })?;
            entries.push(entry);
        }
        Ok(Some(entries))
    }

    pub fn append(path: &Path, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|err| Error::Corrupt(format!("{}: {err}", path.display())))?;
        line.push(b'\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(&line)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn rewrite(path: &Path, entries: &[JournalEntry]) -> Result<()> {
        let tmp = path.with_extension("jsonl.tmp");
        Self::write_to(&tmp, entries)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Write a journal to an arbitrary path (used for repack staging).
    pub fn write_to(path: &Path, entries: &[JournalEntry]) -> Result<()> {
        let mut data = Vec::new();
        for entry in entries {
            let line = serde_json::to_vec(entry)
                .map_err(|err| Error::Corrupt(format!("{}: {err}", path.display())))?;
            data.extend_from_slice(&line);
            data.push(b'\n');
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Manifest record for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relpath: String,
    pub flavor: Flavor,
    pub format: Format,
    /// Segment size observed at the last manifest update.
    pub size: u64,
    /// Segment mtime (unix seconds) observed at the last manifest update.
    pub mtime: i64,
    pub summary: SegmentSummary,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    segments: Vec<ManifestEntry>,
}

/// The dataset manifest, keyed by segment relative path.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn load(dataset_root: &Path) -> Result<Manifest> {
        let path = dataset_root.join(MANIFEST_NAME);
        let entries = match std::fs::read(&path) {
            Ok(buf) => {
                let file: ManifestFile = serde_json::from_slice(&buf).map_err(|err| {
                    Error::Corrupt(format!("{}: {err}", path.display()))
                })?;
                if file.version != MANIFEST_VERSION {
                    return Err(Error::Corrupt(format!(
                        "{}: manifest version {} is not supported",
                        path.display(),
                        file.version
                    )));
                }
                file.segments
                    .into_iter()
                    .map(|e| (e.relpath.clone(), e))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Manifest { path, entries })
    }

    pub fn store(&self) -> Result<()> {
        let file = ManifestFile {
            version: MANIFEST_VERSION,
            segments: self.entries.values().cloned().collect(),
        };
        let data = serde_json::to_vec_pretty(&file)
            .map_err(|err| Error::Corrupt(format!("{}: {err}", self.path.display())))?;
        let tmp = self.path.with_extension("json.tmp");
        let mut out = std::fs::File::create(&tmp)?;
        out.write_all(&data)?;
        out.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, relpath: &str) -> Option<&ManifestEntry> {
        self.entries.get(relpath)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn relpaths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn remove(&mut self, relpath: &str) -> Option<ManifestEntry> {
        self.entries.remove(relpath)
    }

    /// Fold one appended record into a segment's entry without reloading the
    /// journal.
    pub fn note_append(
        &mut self,
        relpath: &str,
        flavor: Flavor,
        format: Format,
        md: &Metadata,
        on_disk: Option<(u64, i64)>,
    ) {
        let entry = self
            .entries
            .entry(relpath.to_string())
            .or_insert_with(|| ManifestEntry {
                relpath: relpath.to_string(),
                flavor,
                format,
                size: 0,
                mtime: 0,
                summary: SegmentSummary::default(),
            });
        entry.summary.add(md);
        if let Some((size, mtime)) = on_disk {
            entry.size = size;
            entry.mtime = mtime;
        }
    }

    /// Replace a segment's entry from its journal (the segment's own record
    /// directory), never from manifest-only repair.
    pub fn rebuild_segment(
        &mut self,
        relpath: &str,
        flavor: Flavor,
        format: Format,
        journal: &[JournalEntry],
        on_disk: Option<(u64, i64)>,
    ) {
        let live: Vec<&Metadata> = journal
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| &e.md)
            .collect();
        let summary = SegmentSummary::of_records(live.into_iter());
        let (size, mtime) = on_disk.unwrap_or((0, 0));
        self.entries.insert(
            relpath.to_string(),
            ManifestEntry {
                relpath: relpath.to_string(),
                flavor,
                format,
                size,
                mtime,
                summary,
            },
        );
    }

    /// Segments that may hold matching records, cheapest pruning first:
    /// the matcher's reference-time extremes, then the per-segment summary.
    /// Returned in ascending order of the segments' earliest reference time.
    pub fn candidates(&self, matcher: &Matcher) -> Vec<&ManifestEntry> {
        let (lower, upper) = matcher.date_extremes();
        let mut picked: Vec<&ManifestEntry> = Vec::new();
        let mut pruned = 0usize;
        for entry in self.entries.values() {
            let by_time = match (&entry.summary.reftime_min, &entry.summary.reftime_max) {
                (Some(min), Some(max)) => {
                    let below = upper.map(|up| *min >= up).unwrap_or(false);
                    let above = lower.map(|lo| *max < lo).unwrap_or(false);
                    !(below || above)
                }
                _ => true,
            };
            if by_time && entry.summary.could_match(matcher) {
                picked.push(entry);
            } else {
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(
                "{}: pruned {pruned} of {} segments",
                self.path.display(),
                self.entries.len()
            );
        }
        picked.sort_by(|a, b| {
            (a.summary.reftime_min, &a.relpath).cmp(&(b.summary.reftime_min, &b.relpath))
        });
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::time::TimeInterval;
    use crate::metadata::types::Value;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn entry(relpath: &str, month: u8) -> ManifestEntry {
        let begin = datetime!(2020-01-01 00:00:00).replace_month(month.try_into().unwrap()).unwrap();
        let md = Metadata::new().with(Value::Reftime(TimeInterval::instant(begin)));
        ManifestEntry {
            relpath: relpath.to_string(),
            flavor: Flavor::Concat,
            format: Format::Grib,
            size: 10,
            mtime: 0,
            summary: SegmentSummary::of_records(std::iter::once(&md)),
        }
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        manifest
            .entries
            .insert("2020/01.grib".to_string(), entry("2020/01.grib", 1));
        manifest.store().unwrap();
        let reloaded = Manifest::load(dir.path()).unwrap();
        assert!(reloaded.get("2020/01.grib").is_some());
    }

    #[test]
    fn candidates_prune_by_date_extremes() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        for (relpath, month) in [("2020/01.grib", 1), ("2020/02.grib", 2), ("2020/03.grib", 3)] {
            manifest
                .entries
                .insert(relpath.to_string(), entry(relpath, month));
        }
        let matcher = Matcher::parse("reftime:>=2020-02-01,<2020-03-01").unwrap();
        let picked = manifest.candidates(&matcher);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].relpath, "2020/02.grib");
    }
}
