//! Dataset writer: imports records under the dataset write lock.
//!
//! Import ordering is payload first, journal second, manifest last:
//!
//! 1. the payload is appended to the segment resolved from the record's
//!    reference time (write + fsync, or temp + rename for container
//!    layouts);
//! 2. the record, now carrying its source reference, is appended to the
//!    segment's journal;
//! 3. the in-memory manifest entry is updated, and persisted on
//!    [`Writer::flush`] (also called on drop).
//!
//! A crash after step 1 leaves an unjournaled tail in the segment; a crash
//! after step 2 leaves the manifest stale. Both are detected by the checker
//! (needs-reindex) and reconciled by reindex/repack; no acknowledged import
//! is ever silently lost, and no failure mode loses a payload silently.

use std::collections::{HashMap, HashSet};

use log::{error, warn};

use crate::dataset::{DatasetConfig, DatasetLock};
use crate::index::{Journal, JournalEntry, Manifest};
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Source};
use crate::segment::Segment;
use crate::{Error, Result};

/// Outcome of a single import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// Stored and indexed.
    Ok,
    /// Rejected by the uniqueness policy; the original record is retained
    /// and the new payload discarded. A no-op, not a fault.
    Duplicate,
}

pub struct Writer {
    config: DatasetConfig,
    manifest: Manifest,
    /// Unique keys of live records per segment, loaded lazily per segment.
    unique_cache: HashMap<String, HashSet<String>>,
    dirty: bool,
    _lock: DatasetLock,
}

impl Writer {
    /// Open the dataset for writing, blocking until the write lock is free.
    pub fn open(config: DatasetConfig) -> Result<Writer> {
        std::fs::create_dir_all(&config.root)?;
        let lock = DatasetLock::acquire(&config.root)?;
        let manifest = Manifest::load(&config.root)
            .map_err(|err| err.context(&format!("dataset {}", config.name)))?;
        Ok(Writer {
            config,
            manifest,
            unique_cache: HashMap::new(),
            dirty: false,
            _lock: lock,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Import one record with its payload. On success the record's source
    /// reference points into the target segment; it is never moved again by
    /// metadata edits.
    pub fn acquire(&mut self, md: &mut Metadata, payload: &[u8]) -> Result<Acquired> {
        let reftime = md.reftime().ok_or_else(|| {
            Error::ImportFailed(format!(
                "dataset {}: record has no reference time",
                self.config.name
            ))
        })?;
        let relpath = self.config.step.relpath(reftime.begin, self.config.format);

        let key = md.unique_key(&self.config.unique);
        self.load_unique_keys(&relpath)?;
        let keys = self.unique_cache.entry(relpath.clone()).or_default();
        if keys.contains(&key) {
            warn!(
                "dataset {}: duplicate import into {relpath} rejected: {key}",
                self.config.name
            );
            return Ok(Acquired::Duplicate);
        }

        let abspath = self.config.segment_abspath(&relpath);
        if let Some(parent) = abspath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut segment = Segment::new(self.config.flavor, &abspath, self.config.format);
        let (offset, length) = segment.append(payload).map_err(|err| {
            Error::ImportFailed(format!("{}: {err}", self.config.err_context(&relpath)))
        })?;

        md.set_source(Source {
            format: self.config.format,
            relpath: relpath.clone(),
            offset,
            length,
        });
        let entry = JournalEntry {
            md: md.clone(),
            offset,
            length,
            checksum: crc32fast::hash(payload),
            deleted: false,
        };
        if let Err(err) = Journal::append(&self.config.journal_abspath(&relpath), &entry) {
            // The payload is in the segment but not in the journal: an
            // unjournaled tail the next check/repack will surface.
            error!(
                "dataset {}: journal update for {relpath} failed after append; \
                 payload at offset {offset} awaits check/repack: {err}",
                self.config.name
            );
            return Err(Error::ImportFailed(format!(
                "{}: journal update failed: {err}",
                self.config.err_context(&relpath)
            )));
        }

        self.manifest.note_append(
            &relpath,
            self.config.flavor,
            self.config.format,
            md,
            segment.on_disk(),
        );
        self.dirty = true;
        self.unique_cache.get_mut(&relpath).expect("loaded above").insert(key);
        Ok(Acquired::Ok)
    }

    /// Import a batch, preserving per-record outcomes. Stops at the first
    /// hard failure; records before it stay imported.
    pub fn acquire_batch(
        &mut self,
        items: &mut [(Metadata, Vec<u8>)],
    ) -> Result<Vec<Acquired>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (md, payload) in items.iter_mut() {
            outcomes.push(self.acquire(md, payload)?);
        }
        Ok(outcomes)
    }

    /// Tombstone every live record matching `matcher`. Payload bytes stay in
    /// place until the next repack reclaims them. Returns the count marked.
    pub fn remove(&mut self, matcher: &Matcher) -> Result<u64> {
        let mut marked = 0u64;
        for relpath in self.manifest.relpaths() {
            let journal_path = self.config.journal_abspath(&relpath);
            let Some(mut entries) = Journal::load(&journal_path)
                .map_err(|err| err.context(&self.config.err_context(&relpath)))?
            else {
                continue;
            };
            let mut touched = false;
            for entry in entries.iter_mut() {
                if !entry.deleted && matcher.matches(&entry.md) {
                    entry.deleted = true;
                    touched = true;
                    marked += 1;
                }
            }
            if touched {
                Journal::rewrite(&journal_path, &entries)
                    .map_err(|err| err.context(&self.config.err_context(&relpath)))?;
                let manifest_entry = self.manifest.get(&relpath);
                let (flavor, format) = manifest_entry
                    .map(|e| (e.flavor, e.format))
                    .unwrap_or((self.config.flavor, self.config.format));
                let segment =
                    Segment::new(flavor, self.config.segment_abspath(&relpath), format);
                self.manifest
                    .rebuild_segment(&relpath, flavor, format, &entries, segment.on_disk());
                self.unique_cache.remove(&relpath);
                self.dirty = true;
            }
        }
        Ok(marked)
    }

    /// Persist the manifest.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.manifest
                .store()
                .map_err(|err| err.context(&format!("dataset {}", self.config.name)))?;
            self.dirty = false;
        }
        Ok(())
    }

    fn load_unique_keys(&mut self, relpath: &str) -> Result<()> {
        if self.unique_cache.contains_key(relpath) {
            return Ok(());
        }
        let entries = Journal::load(&self.config.journal_abspath(relpath))
            .map_err(|err| err.context(&self.config.err_context(relpath)))?
            .unwrap_or_default();
        let keys = entries
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| e.md.unique_key(&self.config.unique))
            .collect();
        self.unique_cache.insert(relpath.to_string(), keys);
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!("dataset {}: manifest flush on close failed: {err}", self.config.name);
        }
    }
}
