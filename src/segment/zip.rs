//! Zip layout: a standard zip archive with one stored member per payload.
//!
//! Members are stored uncompressed so member sizes are payload sizes, and
//! names encode logical offsets exactly as in the tar layout. Append and
//! repack rebuild the archive to a temporary file and rename it into place.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::metadata::Format;
use crate::segment::{member_name, not_found, parse_member_name, RepackMove, SegmentState};
use crate::{Error, Result};

#[derive(Debug)]
pub struct ZipSegment {
    base: PathBuf,
    format: Format,
}

impl ZipSegment {
    pub fn new(base: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            base: base.into(),
            format,
        }
    }

    pub fn zip_path(&self) -> PathBuf {
        path_with_suffix(&self.base, ".zip")
    }

    fn corrupt(&self, detail: impl std::fmt::Display) -> Error {
        Error::Corrupt(format!("{}: {detail}", self.zip_path().display()))
    }

    fn read_members(&self, with_data: bool) -> Result<Vec<(u64, u64, Option<Vec<u8>>)>> {
        let file = match std::fs::File::open(self.zip_path()) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut archive = ZipArchive::new(file).map_err(|e| self.corrupt(e))?;
        let mut members = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| self.corrupt(e))?;
            let Some(offset) = parse_member_name(entry.name(), self.format) else {
                continue;
            };
            let length = entry.size();
            let data = if with_data {
                let mut buf = Vec::with_capacity(length as usize);
                entry.read_to_end(&mut buf).map_err(|e| self.corrupt(e))?;
                Some(buf)
            } else {
                None
            };
            members.push((offset, length, data));
        }
        Ok(members)
    }

    fn publish(&self, members: &[(u64, &[u8])]) -> Result<()> {
        let zip_path = self.zip_path();
        let tmp = path_with_suffix(&zip_path, ".repack");
        let file = std::fs::File::create(&tmp)?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for &(offset, payload) in members {
            writer
                .start_file(member_name(offset, self.format), options)
                .map_err(|e| self.corrupt(e))?;
            writer.write_all(payload)?;
        }
        let file = writer.finish().map_err(|e| self.corrupt(e))?;
        file.sync_all()?;
        std::fs::rename(&tmp, &zip_path)?;
        Ok(())
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<(u64, u64)> {
        let members = self.read_members(true)?;
        let offset = members.iter().map(|&(o, l, _)| o + l).max().unwrap_or(0);
        let mut all: Vec<(u64, &[u8])> = members
            .iter()
            .map(|(o, _, data)| (*o, data.as_deref().expect("read_members with data")))
            .collect();
        all.push((offset, payload));
        self.publish(&all)?;
        Ok((offset, payload.len() as u64))
    }

    pub fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        for (member_offset, member_length, data) in self.read_members(true)? {
            if member_offset == offset {
                if member_length != length {
                    return Err(self.corrupt(format!(
                        "member at {offset} is {member_length} bytes, expected {length}"
                    )));
                }
                return Ok(data.expect("read_members with data"));
            }
        }
        Err(not_found(&self.zip_path(), offset, length))
    }

    pub fn scan(&self) -> Result<Option<Vec<(u64, u64)>>> {
        let mut listed: Vec<(u64, u64)> = self
            .read_members(false)?
            .into_iter()
            .map(|(o, l, _)| (o, l))
            .collect();
        listed.sort_unstable();
        Ok(Some(listed))
    }

    pub fn repack(&mut self, retained: &[(u64, u64)]) -> Result<Vec<RepackMove>> {
        let members = self.read_members(true)?;
        let mut moves = Vec::with_capacity(retained.len());
        let mut rebuilt: Vec<(u64, Vec<u8>)> = Vec::with_capacity(retained.len());
        let mut new_offset = 0u64;
        for &(offset, length) in retained {
            let data = members
                .iter()
                .find(|&&(o, l, _)| o == offset && l == length)
                .and_then(|(_, _, data)| data.clone())
                .ok_or_else(|| not_found(&self.zip_path(), offset, length))?;
            moves.push(RepackMove {
                old_offset: offset,
                new_offset,
                length,
            });
            rebuilt.push((new_offset, data));
            new_offset += length;
        }
        let borrowed: Vec<(u64, &[u8])> =
            rebuilt.iter().map(|(o, d)| (*o, d.as_slice())).collect();
        self.publish(&borrowed)?;
        Ok(moves)
    }

    pub fn check(&self, expected: &[(u64, u64)]) -> SegmentState {
        if !self.zip_path().exists() {
            return if expected.is_empty() {
                SegmentState::Ok
            } else {
                SegmentState::Missing
            };
        }
        let listed = match self.scan() {
            Ok(Some(listed)) => listed,
            _ => return SegmentState::Corrupt,
        };
        let mut expected_sorted = expected.to_vec();
        expected_sorted.sort_unstable();
        if listed == expected_sorted {
            return SegmentState::Ok;
        }
        if expected_sorted.iter().all(|e| listed.contains(e)) {
            return SegmentState::Dirty;
        }
        SegmentState::Corrupt
    }

    pub fn remove(&mut self) -> Result<()> {
        match std::fs::remove_file(self.zip_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::from(err)),
        }
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stored_members_round_trip() {
        let dir = tempdir().unwrap();
        let mut seg = ZipSegment::new(dir.path().join("01.grib"), Format::Grib);
        let (o1, l1) = seg.append(b"alpha").unwrap();
        let (o2, l2) = seg.append(b"beta payload").unwrap();
        assert_eq!((o1, l1), (0, 5));
        assert_eq!((o2, l2), (5, 12));
        assert_eq!(seg.read_range(o1, l1).unwrap(), b"alpha");
        assert_eq!(seg.read_range(o2, l2).unwrap(), b"beta payload");
    }

    #[test]
    fn garbage_archive_reports_corrupt() {
        let dir = tempdir().unwrap();
        let seg = ZipSegment::new(dir.path().join("01.grib"), Format::Grib);
        std::fs::write(seg.zip_path(), b"not a zip file").unwrap();
        assert!(matches!(seg.read_range(0, 4), Err(Error::Corrupt(_))));
        assert_eq!(seg.check(&[(0, 4)]), SegmentState::Corrupt);
    }
}
