//! Dataset maintenance: consistency checking, reindexing and repack.
//!
//! The checker holds the dataset write lock for its whole lifetime, so no
//! writer can race a repack. `check` is strictly read-only; `reindex`
//! rebuilds manifest entries from segment journals; `repack` rewrites
//! segments without their tombstoned records, re-sorted by reference time.
//!
//! Repack is staged so that an interrupted run converges when re-run: the
//! post-repack journal is written to a `.repack` sibling before the segment
//! swap, and promoted only when the segment on disk matches it exactly. A
//! crash at any point leaves either the old state (stage discarded and
//! rebuilt) or the new state (stage promoted); never a half-applied one.

use log::{info, warn};

use crate::dataset::{scan_segment_relpaths, DatasetConfig, DatasetLock};
use crate::index::{Journal, JournalEntry, Manifest};
use crate::metadata::{Format, Source};
use crate::segment::{Flavor, Segment, SegmentState};
use crate::{Error, Result};

/// Per-segment verdict of a maintenance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Segment, journal and manifest agree.
    Ok,
    /// Segment is newer or bigger than the index records. Safe; recovered
    /// by reindex (and repack for unjournaled tails).
    NeedsReindex,
    /// The index knows nothing usable about this segment; only an external
    /// rescan of the payloads can rebuild its metadata.
    NeedsRescan,
    /// Unreadable or truncated per the layout's own integrity rules.
    /// Surfaced, never auto-repaired.
    Corrupt,
}

#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub relpath: String,
    pub status: SegmentStatus,
    /// Live (non-tombstoned) records in the journal.
    pub records: u64,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepackStats {
    pub segments_repacked: usize,
    pub records_dropped: u64,
    pub bytes_reclaimed: u64,
}

pub struct Checker {
    config: DatasetConfig,
    manifest: Manifest,
    _lock: DatasetLock,
}

impl Checker {
    /// Open the dataset for maintenance, blocking until the write lock is
    /// free.
    pub fn open(config: DatasetConfig) -> Result<Checker> {
        std::fs::create_dir_all(&config.root)?;
        let lock = DatasetLock::acquire(&config.root)?;
        let manifest = Manifest::load(&config.root)
            .map_err(|err| err.context(&format!("dataset {}", config.name)))?;
        Ok(Checker {
            config,
            manifest,
            _lock: lock,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn segment_for(&self, relpath: &str) -> Segment {
        let (flavor, format) = self
            .manifest
            .get(relpath)
            .map(|e| (e.flavor, e.format))
            .unwrap_or((self.config.flavor, self.config.format));
        Segment::new(flavor, self.config.segment_abspath(relpath), format)
    }

    fn known_relpaths(&self) -> Result<Vec<String>> {
        let mut relpaths = self.manifest.relpaths();
        relpaths.extend(scan_segment_relpaths(&self.config)?);
        relpaths.sort();
        relpaths.dedup();
        Ok(relpaths)
    }

    /// Read-only per-segment status report.
    pub fn check(&self) -> Result<Vec<SegmentReport>> {
        let mut reports = Vec::new();
        for relpath in self.known_relpaths()? {
            let segment = self.segment_for(&relpath);
            let journal = Journal::load(&self.config.journal_abspath(&relpath))
                .map_err(|err| err.context(&self.config.err_context(&relpath)))?;
            let report = match journal {
                None => {
                    if segment.exists() {
                        SegmentReport {
                            relpath: relpath.clone(),
                            status: SegmentStatus::NeedsRescan,
                            records: 0,
                            detail: "segment present but no record journal".to_string(),
                        }
                    } else {
                        SegmentReport {
                            relpath: relpath.clone(),
                            status: SegmentStatus::NeedsReindex,
                            records: 0,
                            detail: "segment and journal gone; reindex drops the entry"
                                .to_string(),
                        }
                    }
                }
                Some(entries) => self.check_journaled(&relpath, &segment, &entries),
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Segments whose on-disk (size, mtime) disagree with what the manifest
    /// recorded at its last update. Detected, never silently trusted.
    pub fn stale_segments(&self) -> Vec<String> {
        let mut stale = Vec::new();
        for entry in self.manifest.entries() {
            let segment = Segment::new(
                entry.flavor,
                self.config.segment_abspath(&entry.relpath),
                entry.format,
            );
            if segment.on_disk() != Some((entry.size, entry.mtime)) {
                stale.push(entry.relpath.clone());
            }
        }
        stale
    }

    fn check_journaled(
        &self,
        relpath: &str,
        segment: &Segment,
        entries: &[JournalEntry],
    ) -> SegmentReport {
        let mut expected: Vec<(u64, u64)> =
            entries.iter().map(|e| (e.offset, e.length)).collect();
        expected.sort_unstable();
        let live = entries.iter().filter(|e| !e.deleted).count() as u64;
        let (status, detail) = match segment.check(&expected) {
            SegmentState::Ok => match self.manifest.get(relpath) {
                None => (
                    SegmentStatus::NeedsReindex,
                    "journal present but segment unknown to the manifest".to_string(),
                ),
                Some(entry) => {
                    let current = segment.on_disk();
                    if current != Some((entry.size, entry.mtime)) {
                        (
                            SegmentStatus::NeedsReindex,
                            "segment changed since the last manifest update".to_string(),
                        )
                    } else if entry.summary.count != live {
                        (
                            SegmentStatus::NeedsReindex,
                            "manifest record count disagrees with the journal".to_string(),
                        )
                    } else {
                        (SegmentStatus::Ok, String::new())
                    }
                }
            },
            SegmentState::Dirty => (
                SegmentStatus::NeedsReindex,
                "segment holds more data than the journal records".to_string(),
            ),
            SegmentState::Missing => (
                SegmentStatus::Corrupt,
                "segment data missing for journaled records".to_string(),
            ),
            SegmentState::Corrupt => (
                SegmentStatus::Corrupt,
                "segment fails its layout integrity check".to_string(),
            ),
        };
        SegmentReport {
            relpath: relpath.to_string(),
            status,
            records: live,
            detail,
        }
    }

    /// Rebuild stale manifest entries from segment journals. Entries whose
    /// segment and journal both vanished are dropped. Returns how many
    /// entries changed.
    pub fn reindex(&mut self) -> Result<usize> {
        let mut changed = 0usize;
        for relpath in self.known_relpaths()? {
            let segment = self.segment_for(&relpath);
            let journal = Journal::load(&self.config.journal_abspath(&relpath))
                .map_err(|err| err.context(&self.config.err_context(&relpath)))?;
            match journal {
                Some(entries) => {
                    let (flavor, format) = self
                        .manifest
                        .get(&relpath)
                        .map(|e| (e.flavor, e.format))
                        .unwrap_or((self.config.flavor, self.config.format));
                    self.manifest.rebuild_segment(
                        &relpath,
                        flavor,
                        format,
                        &entries,
                        segment.on_disk(),
                    );
                    changed += 1;
                }
                None if !segment.exists() => {
                    if self.manifest.remove(&relpath).is_some() {
                        changed += 1;
                    }
                }
                None => {
                    warn!(
                        "dataset {}: segment {relpath} needs a rescan; reindex cannot \
                         recover its metadata",
                        self.config.name
                    );
                }
            }
        }
        self.manifest
            .store()
            .map_err(|err| err.context(&format!("dataset {}", self.config.name)))?;
        info!("dataset {}: reindexed {changed} segments", self.config.name);
        Ok(changed)
    }

    /// Reclaim space from tombstoned records and unjournaled tails, re-sort
    /// records by reference time, and rewrite journals and manifest. Safe to
    /// interrupt: re-running converges to the same end state.
    pub fn repack(&mut self) -> Result<RepackStats> {
        let mut stats = RepackStats::default();
        for relpath in self.known_relpaths()? {
            self.recover_staged(&relpath)?;
            let journal_path = self.config.journal_abspath(&relpath);
            let Some(entries) = Journal::load(&journal_path)
                .map_err(|err| err.context(&self.config.err_context(&relpath)))?
            else {
                continue;
            };
            let (flavor, format) = self
                .manifest
                .get(&relpath)
                .map(|e| (e.flavor, e.format))
                .unwrap_or((self.config.flavor, self.config.format));
            let mut segment =
                Segment::new(flavor, self.config.segment_abspath(&relpath), format);

            let mut expected: Vec<(u64, u64)> =
                entries.iter().map(|e| (e.offset, e.length)).collect();
            expected.sort_unstable();
            let state = segment.check(&expected);
            if matches!(state, SegmentState::Corrupt | SegmentState::Missing) {
                return Err(Error::Corrupt(format!(
                    "{}: cannot repack a damaged segment; repair it explicitly first",
                    self.config.err_context(&relpath)
                )));
            }

            let mut live: Vec<JournalEntry> =
                entries.iter().filter(|e| !e.deleted).cloned().collect();
            live.sort_by_key(|e| (e.md.reftime().map(|r| r.begin), e.offset));
            let dropped = entries.len() as u64 - live.len() as u64;

            let in_order = live.windows(2).all(|w| w[0].offset <= w[1].offset);
            if dropped == 0 && state == SegmentState::Ok && in_order {
                continue;
            }

            let old_size = segment.on_disk().map(|(size, _)| size).unwrap_or(0);
            let retained: Vec<(u64, u64)> = live.iter().map(|e| (e.offset, e.length)).collect();
            let planned = self.plan_entries(&relpath, flavor, format, &live);
            let staged_path = staged_journal_path(&journal_path);
            Journal::write_to(&staged_path, &planned)
                .map_err(|err| err.context(&self.config.err_context(&relpath)))?;

            segment
                .repack(&retained)
                .map_err(|err| err.context(&self.config.err_context(&relpath)))?;
            std::fs::rename(&staged_path, &journal_path)?;

            self.manifest
                .rebuild_segment(&relpath, flavor, format, &planned, segment.on_disk());
            let new_size = segment.on_disk().map(|(size, _)| size).unwrap_or(0);
            stats.segments_repacked += 1;
            stats.records_dropped += dropped;
            stats.bytes_reclaimed += old_size.saturating_sub(new_size);
        }
        self.manifest
            .store()
            .map_err(|err| err.context(&format!("dataset {}", self.config.name)))?;
        info!(
            "dataset {}: repacked {} segments, dropped {} records, reclaimed {} bytes",
            self.config.name,
            stats.segments_repacked,
            stats.records_dropped,
            stats.bytes_reclaimed
        );
        Ok(stats)
    }

    /// The journal entries as they will read after the repack: compacted
    /// offsets in retained order.
    fn plan_entries(
        &self,
        relpath: &str,
        flavor: Flavor,
        format: Format,
        live: &[JournalEntry],
    ) -> Vec<JournalEntry> {
        let mut planned = Vec::with_capacity(live.len());
        let mut next_offset = 0u64;
        for (i, entry) in live.iter().enumerate() {
            let new_offset = match flavor {
                Flavor::Dir => i as u64,
                _ => next_offset,
            };
            let mut md = entry.md.clone();
            md.set_source(Source {
                format,
                relpath: relpath.to_string(),
                offset: new_offset,
                length: entry.length,
            });
            planned.push(JournalEntry {
                md,
                offset: new_offset,
                length: entry.length,
                checksum: entry.checksum,
                deleted: false,
            });
            next_offset += entry.length;
        }
        planned
    }

    /// Finish or discard the staged journal of an interrupted repack. The
    /// stage is promoted only when the segment on disk already matches it.
    fn recover_staged(&mut self, relpath: &str) -> Result<()> {
        let journal_path = self.config.journal_abspath(relpath);
        let staged_path = staged_journal_path(&journal_path);
        if !staged_path.exists() {
            return Ok(());
        }
        let staged = match Journal::load(&staged_path) {
            Ok(Some(entries)) => entries,
            _ => {
                std::fs::remove_file(&staged_path)?;
                return Ok(());
            }
        };
        let segment = self.segment_for(relpath);
        let expected: Vec<(u64, u64)> = staged.iter().map(|e| (e.offset, e.length)).collect();
        if segment.check(&expected) == SegmentState::Ok {
            info!(
                "dataset {}: finishing interrupted repack of {relpath}",
                self.config.name
            );
            std::fs::rename(&staged_path, &journal_path)?;
            self.manifest.rebuild_segment(
                relpath,
                segment.flavor(),
                self.config.format,
                &staged,
                segment.on_disk(),
            );
        } else {
            std::fs::remove_file(&staged_path)?;
        }
        Ok(())
    }

    /// Explicitly destroy one segment: its storage, journal and manifest
    /// entry. Never invoked implicitly.
    pub fn remove_segment(&mut self, relpath: &str) -> Result<()> {
        let mut segment = self.segment_for(relpath);
        segment
            .remove()
            .map_err(|err| err.context(&self.config.err_context(relpath)))?;
        Journal::remove(&self.config.journal_abspath(relpath))?;
        self.manifest.remove(relpath);
        self.manifest
            .store()
            .map_err(|err| err.context(&format!("dataset {}", self.config.name)))?;
        info!("dataset {}: removed segment {relpath}", self.config.name);
        Ok(())
    }
}

fn staged_journal_path(journal_path: &std::path::Path) -> std::path::PathBuf {
    let mut name = journal_path
        .file_name()
        .unwrap_or_default()
        .to_os_string();
    name.push(".repack");
    journal_path.with_file_name(name)
}
