//! Directory-of-files layout: one file per payload.
//!
//! File names encode the payload sequence number plus the format extension
//! (`000042.grib`); the sequence number doubles as the record "offset" in
//! this layout, with the file size as the length. Appends write the new
//! member under a hidden temporary name and rename it into the directory, so
//! a concurrent reader either misses it or sees it complete.

use std::path::{Path, PathBuf};

use crate::metadata::Format;
use crate::segment::{write_file_sync, RepackMove, SegmentState};
use crate::{Error, Result};

#[derive(Debug)]
pub struct DirSegment {
    path: PathBuf,
    format: Format,
}

impl DirSegment {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn member_path(&self, seq: u64) -> PathBuf {
        self.path.join(format!("{seq:06}.{}", self.format.ext()))
    }

    fn parse_member(&self, name: &str) -> Option<u64> {
        let stem = name.strip_suffix(&format!(".{}", self.format.ext()))?;
        if stem.len() != 6 {
            return None;
        }
        stem.parse().ok()
    }

    /// Sorted (sequence, size) listing of the directory.
    fn list(&self) -> Result<Vec<(u64, u64)>> {
        let mut members = Vec::new();
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(members),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(seq) = self.parse_member(name) else { continue };
            members.push((seq, entry.metadata()?.len()));
        }
        members.sort_unstable();
        Ok(members)
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<(u64, u64)> {
        self.recover()?;
        std::fs::create_dir_all(&self.path)?;
        let seq = self.list()?.last().map(|&(seq, _)| seq + 1).unwrap_or(0);
        let tmp = self.path.join(format!(".tmp.{seq:06}"));
        write_file_sync(&tmp, payload)?;
        std::fs::rename(&tmp, self.member_path(seq))?;
        Ok((seq, payload.len() as u64))
    }

    pub fn read_range(&self, seq: u64, length: u64) -> Result<Vec<u8>> {
        let member = self.member_path(seq);
        let data = match std::fs::read(&member) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "{}: no member for sequence {seq}",
                    self.path.display()
                )))
            }
            Err(err) => return Err(err.into()),
        };
        if data.len() as u64 != length {
            return Err(Error::Corrupt(format!(
                "{}: member {seq} is {} bytes, expected {length}",
                self.path.display(),
                data.len()
            )));
        }
        Ok(data)
    }

    pub fn scan(&self) -> Result<Option<Vec<(u64, u64)>>> {
        Ok(Some(self.list()?))
    }

    pub fn repack(&mut self, retained: &[(u64, u64)]) -> Result<Vec<RepackMove>> {
        self.recover()?;
        let tmp = sibling(&self.path, "repack");
        let old = sibling(&self.path, "old");
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(&tmp)?;
        let mut moves = Vec::with_capacity(retained.len());
        for (new_seq, &(seq, length)) in retained.iter().enumerate() {
            let payload = self.read_range(seq, length)?;
            write_file_sync(
                &tmp.join(format!("{new_seq:06}.{}", self.format.ext())),
                &payload,
            )?;
            moves.push(RepackMove {
                old_offset: seq,
                new_offset: new_seq as u64,
                length,
            });
        }
        if self.path.exists() {
            std::fs::rename(&self.path, &old)?;
        }
        std::fs::rename(&tmp, &self.path)?;
        if old.exists() {
            std::fs::remove_dir_all(&old)?;
        }
        Ok(moves)
    }

    /// Finish or discard the leftovers of an interrupted repack swap.
    fn recover(&self) -> Result<()> {
        let tmp = sibling(&self.path, "repack");
        let old = sibling(&self.path, "old");
        if old.exists() {
            if !self.path.exists() && tmp.exists() {
                // Crashed between the two renames; the temp directory was
                // fully written and synced, promote it.
                std::fs::rename(&tmp, &self.path)?;
            }
            if self.path.exists() {
                std::fs::remove_dir_all(&old)?;
            }
        }
        Ok(())
    }

    pub fn check(&self, expected: &[(u64, u64)]) -> SegmentState {
        let members = match self.list() {
            Ok(members) => members,
            Err(_) => return SegmentState::Corrupt,
        };
        if members.is_empty() && !expected.is_empty() && !self.path.exists() {
            return SegmentState::Missing;
        }
        for &(seq, length) in expected {
            match members.binary_search_by_key(&seq, |&(s, _)| s) {
                Ok(i) if members[i].1 == length => {}
                _ => return SegmentState::Corrupt,
            }
        }
        if members.len() > expected.len() {
            return SegmentState::Dirty;
        }
        SegmentState::Ok
    }

    pub fn on_disk(&self) -> Option<(u64, i64)> {
        let members = self.list().ok()?;
        let size = members.iter().map(|&(_, len)| len).sum();
        let mtime = crate::segment::file_on_disk(&self.path).map(|(_, m)| m)?;
        Some((size, mtime))
    }

    pub fn remove(&mut self) -> Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::from(err)),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sequences_grow_monotonically() {
        let dir = tempdir().unwrap();
        let mut seg = DirSegment::new(dir.path().join("01.grib"), Format::Grib);
        assert_eq!(seg.append(b"aa").unwrap(), (0, 2));
        assert_eq!(seg.append(b"bbbb").unwrap(), (1, 4));
        assert_eq!(seg.read_range(1, 4).unwrap(), b"bbbb");
        assert_eq!(seg.scan().unwrap().unwrap(), vec![(0, 2), (1, 4)]);
    }

    #[test]
    fn repack_renumbers_from_zero() {
        let dir = tempdir().unwrap();
        let mut seg = DirSegment::new(dir.path().join("01.grib"), Format::Grib);
        seg.append(b"aa").unwrap();
        seg.append(b"bb").unwrap();
        seg.append(b"cc").unwrap();
        let moves = seg.repack(&[(2, 2), (0, 2)]).unwrap();
        assert_eq!(moves[0].new_offset, 0);
        assert_eq!(moves[1].new_offset, 1);
        assert_eq!(seg.read_range(0, 2).unwrap(), b"cc");
        assert_eq!(seg.read_range(1, 2).unwrap(), b"aa");
        assert!(seg.read_range(2, 2).is_err());
    }
}
