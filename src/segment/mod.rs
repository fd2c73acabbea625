//! Uniform storage contract over one physical segment layout.
//!
//! A segment holds the payload bytes of many records under one of five
//! on-disk layouts: a single concatenated file, a directory of one file per
//! payload, a gzip stream with a sibling seek index, a tar archive, or a zip
//! archive. All five speak the same contract:
//!
//! - `append` adds one payload and returns its (offset, length);
//! - `read_range` returns exactly the bytes of one committed payload;
//! - `scan` lists the physical record directory where the layout is
//!   self-describing (`None` for the concatenated layout, whose directory
//!   lives only in the dataset index);
//! - `repack` rewrites the segment with exactly the retained payloads in the
//!   given order, crash-safe via write-to-temp then atomic rename;
//! - `check` is a read-only diagnostic against an expected record directory.
//!
//! Dispatch is a tagged enum over backend structs; every backend is
//! exercised by the same contract test suite.

mod concat;
mod dir;
mod gzip;
mod tar;
mod zip;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::metadata::Format;
use crate::{Error, Result};

pub use concat::ConcatSegment;
pub use dir::DirSegment;
pub use gzip::GzipSegment;
pub use tar::TarSegment;
pub use zip::ZipSegment;

/// Outcome of a layout check against the expected record directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentState {
    /// Physical layout matches the expected directory exactly.
    Ok,
    /// Segment holds more than expected (e.g. an unindexed tail after an
    /// interrupted import). Recoverable by reindex/repack.
    Dirty,
    /// Segment is absent although records are expected.
    Missing,
    /// Layout-level damage: truncation, size mismatch, unreadable container.
    Corrupt,
}

/// Storage layout of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flavor {
    Concat,
    Dir,
    Gzip,
    Tar,
    Zip,
}

impl Flavor {
    pub fn name(self) -> &'static str {
        match self {
            Flavor::Concat => "concat",
            Flavor::Dir => "dir",
            Flavor::Gzip => "gzip",
            Flavor::Tar => "tar",
            Flavor::Zip => "zip",
        }
    }

    pub fn from_name(name: &str) -> Option<Flavor> {
        match name {
            "concat" => Some(Flavor::Concat),
            "dir" => Some(Flavor::Dir),
            "gzip" | "gz" => Some(Flavor::Gzip),
            "tar" => Some(Flavor::Tar),
            "zip" => Some(Flavor::Zip),
            _ => None,
        }
    }
}

/// One payload relocation performed by a repack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackMove {
    pub old_offset: u64,
    pub new_offset: u64,
    pub length: u64,
}

/// A segment under one of the five layouts.
#[derive(Debug)]
pub struct Segment {
    backend: Backend,
}

#[derive(Debug)]
enum Backend {
    Concat(ConcatSegment),
    Dir(DirSegment),
    Gzip(GzipSegment),
    Tar(TarSegment),
    Zip(ZipSegment),
}

impl Segment {
    /// Bind a segment at `abspath` (the path the dataset derives from the
    /// record reference time, extension included). Cheap; no I/O happens
    /// until the first operation.
    pub fn new(flavor: Flavor, abspath: impl Into<PathBuf>, format: Format) -> Segment {
        let abspath = abspath.into();
        let backend = match flavor {
            Flavor::Concat => Backend::Concat(ConcatSegment::new(abspath)),
            Flavor::Dir => Backend::Dir(DirSegment::new(abspath, format)),
            Flavor::Gzip => Backend::Gzip(GzipSegment::new(abspath)),
            Flavor::Tar => Backend::Tar(TarSegment::new(abspath, format)),
            Flavor::Zip => Backend::Zip(ZipSegment::new(abspath, format)),
        };
        Segment { backend }
    }

    pub fn flavor(&self) -> Flavor {
        match &self.backend {
            Backend::Concat(_) => Flavor::Concat,
            Backend::Dir(_) => Flavor::Dir,
            Backend::Gzip(_) => Flavor::Gzip,
            Backend::Tar(_) => Flavor::Tar,
            Backend::Zip(_) => Flavor::Zip,
        }
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<(u64, u64)> {
        match &mut self.backend {
            Backend::Concat(s) => s.append(payload),
            Backend::Dir(s) => s.append(payload),
            Backend::Gzip(s) => s.append(payload),
            Backend::Tar(s) => s.append(payload),
            Backend::Zip(s) => s.append(payload),
        }
    }

    pub fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        match &self.backend {
            Backend::Concat(s) => s.read_range(offset, length),
            Backend::Dir(s) => s.read_range(offset, length),
            Backend::Gzip(s) => s.read_range(offset, length),
            Backend::Tar(s) => s.read_range(offset, length),
            Backend::Zip(s) => s.read_range(offset, length),
        }
    }

    pub fn scan(&self) -> Result<Option<Vec<(u64, u64)>>> {
        match &self.backend {
            Backend::Concat(s) => s.scan(),
            Backend::Dir(s) => s.scan(),
            Backend::Gzip(s) => s.scan(),
            Backend::Tar(s) => s.scan(),
            Backend::Zip(s) => s.scan(),
        }
    }

    pub fn repack(&mut self, retained: &[(u64, u64)]) -> Result<Vec<RepackMove>> {
        match &mut self.backend {
            Backend::Concat(s) => s.repack(retained),
            Backend::Dir(s) => s.repack(retained),
            Backend::Gzip(s) => s.repack(retained),
            Backend::Tar(s) => s.repack(retained),
            Backend::Zip(s) => s.repack(retained),
        }
    }

    pub fn check(&self, expected: &[(u64, u64)]) -> SegmentState {
        match &self.backend {
            Backend::Concat(s) => s.check(expected),
            Backend::Dir(s) => s.check(expected),
            Backend::Gzip(s) => s.check(expected),
            Backend::Tar(s) => s.check(expected),
            Backend::Zip(s) => s.check(expected),
        }
    }

    pub fn exists(&self) -> bool {
        self.storage_path().exists()
    }

    /// (size, mtime seconds) snapshot used for staleness detection,
    /// or None if the segment has no on-disk presence yet.
    pub fn on_disk(&self) -> Option<(u64, i64)> {
        match &self.backend {
            Backend::Dir(s) => s.on_disk(),
            _ => file_on_disk(&self.storage_path()),
        }
    }

    /// Explicit destruction. Never called implicitly by the core.
    pub fn remove(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Concat(s) => s.remove(),
            Backend::Dir(s) => s.remove(),
            Backend::Gzip(s) => s.remove(),
            Backend::Tar(s) => s.remove(),
            Backend::Zip(s) => s.remove(),
        }
    }

    fn storage_path(&self) -> PathBuf {
        match &self.backend {
            Backend::Concat(s) => s.path().to_path_buf(),
            Backend::Dir(s) => s.path().to_path_buf(),
            Backend::Gzip(s) => s.gz_path(),
            Backend::Tar(s) => s.tar_path(),
            Backend::Zip(s) => s.zip_path(),
        }
    }
}

pub(crate) fn file_on_disk(path: &Path) -> Option<(u64, i64)> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Some((meta.len(), mtime))
}

/// Archive member name for the payload at `offset`.
pub(crate) fn member_name(offset: u64, format: Format) -> String {
    format!("{offset:012}.{}", format.ext())
}

pub(crate) fn parse_member_name(name: &str, format: Format) -> Option<u64> {
    let stem = name.strip_suffix(&format!(".{}", format.ext()))?;
    if stem.len() != 12 {
        return None;
    }
    stem.parse().ok()
}

/// Write `bytes` to `path` and flush them to stable storage.
pub(crate) fn write_file_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

pub(crate) fn not_found(path: &Path, offset: u64, length: u64) -> Error {
    Error::NotFound(format!(
        "{}: no committed payload at offset {offset} length {length}",
        path.display()
    ))
}
