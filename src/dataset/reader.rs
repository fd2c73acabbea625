//! Read-only dataset access: streaming matcher queries.

use std::collections::VecDeque;

use log::warn;

use crate::dataset::DatasetConfig;
use crate::index::{Journal, JournalEntry, Manifest};
use crate::matcher::Matcher;
use crate::metadata::{Format, Metadata};
use crate::segment::{Flavor, Segment};
use crate::{Error, Result};

/// Lock-free reader over one dataset.
pub struct Reader {
    config: DatasetConfig,
    manifest: Manifest,
}

impl Reader {
    pub fn open(config: DatasetConfig) -> Result<Reader> {
        let manifest = Manifest::load(&config.root)
            .map_err(|err| err.context(&format!("dataset {}", config.name)))?;
        Ok(Reader { config, manifest })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Stream records matching `matcher`, ordered by reference time
    /// ascending. With `with_data` each item also carries the payload bytes,
    /// checksum-verified. The stream is lazy: stopping iteration releases
    /// everything; restarting means re-issuing the query.
    pub fn query(&self, matcher: &Matcher, with_data: bool) -> Result<Query> {
        let mut candidates = VecDeque::new();
        for entry in self.manifest.candidates(matcher) {
            let segment = Segment::new(
                entry.flavor,
                self.config.segment_abspath(&entry.relpath),
                entry.format,
            );
            if let Some((size, mtime)) = segment.on_disk() {
                if size != entry.size || mtime != entry.mtime {
                    warn!(
                        "dataset {}: segment {} is newer than the index; reindex advised",
                        self.config.name, entry.relpath
                    );
                }
            }
            candidates.push_back(CandidateSegment {
                relpath: entry.relpath.clone(),
                flavor: entry.flavor,
                format: entry.format,
            });
        }
        let considered = self.manifest.entries().count();
        Ok(Query {
            config: self.config.clone(),
            matcher: matcher.clone(),
            with_data,
            candidates,
            current: None,
            segments_considered: considered,
            segments_visited: 0,
        })
    }
}

struct CandidateSegment {
    relpath: String,
    flavor: Flavor,
    format: Format,
}

/// Lazy query result stream. Dropping it mid-iteration releases all file
/// handles; there is no cursor that survives a restart.
pub struct Query {
    config: DatasetConfig,
    matcher: Matcher,
    with_data: bool,
    candidates: VecDeque<CandidateSegment>,
    current: Option<(Segment, std::vec::IntoIter<JournalEntry>)>,
    segments_considered: usize,
    segments_visited: usize,
}

impl Query {
    /// Segments known to the dataset when the query started.
    pub fn segments_considered(&self) -> usize {
        self.segments_considered
    }

    /// Segments whose record journals were actually opened so far.
    pub fn segments_visited(&self) -> usize {
        self.segments_visited
    }

    fn open_next_segment(&mut self) -> Result<bool> {
        let Some(candidate) = self.candidates.pop_front() else {
            return Ok(false);
        };
        self.segments_visited += 1;
        let journal = Journal::load(&self.config.journal_abspath(&candidate.relpath))
            .map_err(|err| err.context(&self.config.err_context(&candidate.relpath)))?;
        let mut entries = match journal {
            Some(entries) => entries,
            None => {
                warn!(
                    "dataset {}: segment {} has no record journal; skipping",
                    self.config.name, candidate.relpath
                );
                return Ok(true);
            }
        };
        entries.retain(|e| !e.deleted);
        entries.sort_by_key(|e| (e.md.reftime().map(|r| r.begin), e.offset));
        let segment = Segment::new(
            candidate.flavor,
            self.config.segment_abspath(&candidate.relpath),
            candidate.format,
        );
        self.current = Some((segment, entries.into_iter()));
        Ok(true)
    }

    fn read_payload(
        config: &DatasetConfig,
        segment: &Segment,
        entry: &JournalEntry,
    ) -> Result<Vec<u8>> {
        let relpath = entry
            .md
            .source()
            .map(|s| s.relpath.clone())
            .unwrap_or_default();
        let data = segment
            .read_range(entry.offset, entry.length)
            .map_err(|err| err.context(&config.err_context(&relpath)))?;
        if crc32fast::hash(&data) != entry.checksum {
            return Err(Error::Corrupt(format!(
                "{}: payload checksum mismatch at offset {}",
                config.err_context(&relpath),
                entry.offset
            )));
        }
        Ok(data)
    }
}

impl Iterator for Query {
    type Item = Result<(Metadata, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((segment, mut entries)) = self.current.take() {
                while let Some(entry) = entries.next() {
                    if !self.matcher.matches(&entry.md) {
                        continue;
                    }
                    let payload = if self.with_data {
                        match Self::read_payload(&self.config, &segment, &entry) {
                            Ok(data) => Some(data),
                            Err(err) => {
                                self.current = Some((segment, entries));
                                return Some(Err(err));
                            }
                        }
                    } else {
                        None
                    };
                    self.current = Some((segment, entries));
                    return Some(Ok((entry.md, payload)));
                }
                // Segment exhausted; move on.
            }
            match self.open_next_segment() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
