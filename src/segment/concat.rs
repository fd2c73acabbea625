//! Concatenated-file layout: raw payloads back to back in one file.
//!
//! The record directory lives only in the dataset index; the file itself is
//! opaque. Appends are write-then-fsync so a reader that raced the append
//! sees either the old extent or the fully written payload, never a torn
//! tail. Reads go through a memory map of the current committed extent.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::segment::{not_found, write_file_sync, RepackMove, SegmentState};
use crate::{Error, Result};

#[derive(Debug)]
pub struct ConcatSegment {
    path: PathBuf,
}

impl ConcatSegment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let offset = file.metadata()?.len();
        use std::io::Write;
        file.write_all(payload)?;
        file.sync_all()?;
        Ok((offset, payload.len() as u64))
    }

    pub fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found(&self.path, offset, length))
            }
            Err(err) => return Err(err.into()),
        };
        let end = offset
            .checked_add(length)
            .ok_or_else(|| not_found(&self.path, offset, length))?;
        if end > file.metadata()?.len() {
            return Err(not_found(&self.path, offset, length));
        }
        if length == 0 {
            return Ok(Vec::new());
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap[offset as usize..end as usize].to_vec())
    }

    /// The layout is not self-describing: payload boundaries only exist in
    /// the index.
    pub fn scan(&self) -> Result<Option<Vec<(u64, u64)>>> {
        Ok(None)
    }

    pub fn repack(&mut self, retained: &[(u64, u64)]) -> Result<Vec<RepackMove>> {
        let mut data = Vec::new();
        let mut moves = Vec::with_capacity(retained.len());
        let mut new_offset = 0u64;
        for &(offset, length) in retained {
            let payload = self.read_range(offset, length)?;
            data.extend_from_slice(&payload);
            moves.push(RepackMove {
                old_offset: offset,
                new_offset,
                length,
            });
            new_offset += length;
        }
        let tmp = self.path.with_extension(repack_ext(&self.path));
        write_file_sync(&tmp, &data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(moves)
    }

    pub fn check(&self, expected: &[(u64, u64)]) -> SegmentState {
        let expected_size = expected
            .iter()
            .map(|&(offset, length)| offset + length)
            .max()
            .unwrap_or(0);
        let actual = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) if expected.is_empty() => return SegmentState::Ok,
            Err(_) => return SegmentState::Missing,
        };
        match actual.cmp(&expected_size) {
            std::cmp::Ordering::Equal => SegmentState::Ok,
            std::cmp::Ordering::Greater => SegmentState::Dirty,
            std::cmp::Ordering::Less => SegmentState::Corrupt,
        }
    }

    pub fn remove(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::from(err)),
        }
    }
}

fn repack_ext(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.repack"),
        None => "repack".to_string(),
    }
}
