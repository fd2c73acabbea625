//! Gzip layout: one gzip member per payload, concatenated, with a sibling
//! seek index so random access decompresses only the member that holds the
//! requested range.
//!
//! The seek index maps logical offsets to compressed member starts and
//! records the compressed file size it describes; any disagreement with the
//! file on disk is detected before the index is trusted. The index is
//! regenerated on every append and repack, and carries a crc32 footer.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::segment::{not_found, write_file_sync, RepackMove, SegmentState};
use crate::{Error, Result};

const IDX_MAGIC: [u8; 4] = *b"NGZX";
const IDX_VERSION: u32 = 1;
const IDX_ENTRY_SIZE: usize = 24;
const IDX_HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdxEntry {
    logical_offset: u64,
    length: u64,
    comp_offset: u64,
}

#[derive(Debug, Clone, Default)]
struct SeekIndex {
    /// Size of the compressed file this index describes.
    gz_size: u64,
    entries: Vec<IdxEntry>,
}

impl SeekIndex {
    fn logical_end(&self) -> u64 {
        self.entries
            .last()
            .map(|e| e.logical_offset + e.length)
            .unwrap_or(0)
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(IDX_HEADER_SIZE + self.entries.len() * IDX_ENTRY_SIZE + 4);
        buf.extend_from_slice(&IDX_MAGIC);
        buf.extend_from_slice(&IDX_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.gz_size.to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            buf.extend_from_slice(&e.logical_offset.to_le_bytes());
            buf.extend_from_slice(&e.length.to_le_bytes());
            buf.extend_from_slice(&e.comp_offset.to_le_bytes());
        }
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8], what: &Path) -> Result<SeekIndex> {
        let corrupt = |msg: &str| {
            Error::Corrupt(format!("{}: {msg}", what.display()))
        };
        if buf.len() < IDX_HEADER_SIZE + 4 {
            return Err(corrupt("seek index too small"));
        }
        let (body, footer) = buf.split_at(buf.len() - 4);
        let stored = u32::from_le_bytes(footer.try_into().expect("slice length"));
        if crc32fast::hash(body) != stored {
            return Err(corrupt("seek index checksum mismatch"));
        }
        if body[0..4] != IDX_MAGIC {
            return Err(corrupt("seek index magic mismatch"));
        }
        let version = u32::from_le_bytes(body[4..8].try_into().expect("slice length"));
        if version != IDX_VERSION {
            return Err(corrupt("seek index version mismatch"));
        }
        let gz_size = u64::from_le_bytes(body[8..16].try_into().expect("slice length"));
        let count = u32::from_le_bytes(body[16..20].try_into().expect("slice length")) as usize;
        if body.len() != IDX_HEADER_SIZE + count * IDX_ENTRY_SIZE {
            return Err(corrupt("seek index entry count mismatch"));
        }
        let mut entries = Vec::with_capacity(count);
        for chunk in body[IDX_HEADER_SIZE..].chunks_exact(IDX_ENTRY_SIZE) {
            entries.push(IdxEntry {
                logical_offset: u64::from_le_bytes(chunk[0..8].try_into().expect("slice length")),
                length: u64::from_le_bytes(chunk[8..16].try_into().expect("slice length")),
                comp_offset: u64::from_le_bytes(chunk[16..24].try_into().expect("slice length")),
            });
        }
        Ok(SeekIndex { gz_size, entries })
    }
}

#[derive(Debug)]
pub struct GzipSegment {
    base: PathBuf,
}

impl GzipSegment {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn gz_path(&self) -> PathBuf {
        path_with_suffix(&self.base, ".gz")
    }

    fn idx_path(&self) -> PathBuf {
        path_with_suffix(&self.base, ".gz.idx")
    }

    fn gz_size_on_disk(&self) -> u64 {
        std::fs::metadata(self.gz_path()).map(|m| m.len()).unwrap_or(0)
    }

    /// Load the seek index, promoting the staged copy left by an
    /// interrupted repack when it matches the file on disk.
    fn load_idx(&self) -> Result<SeekIndex> {
        let idx_path = self.idx_path();
        let actual = self.gz_size_on_disk();
        let staged = path_with_suffix(&idx_path, ".repack");
        let current = match std::fs::read(&idx_path) {
            Ok(buf) => Some(SeekIndex::decode(&buf, &idx_path)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        match current {
            Some(idx) if idx.gz_size <= actual => Ok(idx),
            other => {
                // Stale or missing: the staged index is authoritative if it
                // describes exactly the bytes now on disk.
                if let Ok(buf) = std::fs::read(&staged) {
                    if let Ok(idx) = SeekIndex::decode(&buf, &staged) {
                        if idx.gz_size == actual {
                            std::fs::rename(&staged, &idx_path)?;
                            return Ok(idx);
                        }
                    }
                }
                match other {
                    None if actual == 0 => Ok(SeekIndex::default()),
                    None => Err(Error::Corrupt(format!(
                        "{}: compressed data without a seek index",
                        self.gz_path().display()
                    ))),
                    Some(_) => Err(Error::Corrupt(format!(
                        "{}: seek index describes more data than is on disk",
                        self.gz_path().display()
                    ))),
                }
            }
        }
    }

    fn compress_member(payload: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload)?;
        Ok(encoder.finish()?)
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut idx = self.load_idx()?;
        let member = Self::compress_member(payload)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.gz_path())?;
        let comp_offset = file.metadata()?.len();
        file.write_all(&member)?;
        file.sync_all()?;
        let logical_offset = idx.logical_end();
        idx.entries.push(IdxEntry {
            logical_offset,
            length: payload.len() as u64,
            comp_offset,
        });
        idx.gz_size = comp_offset + member.len() as u64;
        self.store_idx(&idx)?;
        Ok((logical_offset, payload.len() as u64))
    }

    fn store_idx(&self, idx: &SeekIndex) -> Result<()> {
        let idx_path = self.idx_path();
        let tmp = path_with_suffix(&idx_path, ".tmp");
        write_file_sync(&tmp, &idx.encode())?;
        std::fs::rename(&tmp, &idx_path)?;
        Ok(())
    }

    pub fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let idx = self.load_idx()?;
        let i = idx
            .entries
            .partition_point(|e| e.logical_offset <= offset)
            .checked_sub(1)
            .ok_or_else(|| not_found(&self.gz_path(), offset, length))?;
        let entry = idx.entries[i];
        if offset + length > entry.logical_offset + entry.length {
            return Err(not_found(&self.gz_path(), offset, length));
        }
        let mut file = std::fs::File::open(self.gz_path())?;
        file.seek(SeekFrom::Start(entry.comp_offset))?;
        let mut decoder = GzDecoder::new(std::io::BufReader::new(file));
        let mut block = Vec::with_capacity(entry.length as usize);
        decoder.read_to_end(&mut block).map_err(|err| {
            Error::Corrupt(format!("{}: {err}", self.gz_path().display()))
        })?;
        if block.len() as u64 != entry.length {
            return Err(Error::Corrupt(format!(
                "{}: member at {} decompressed to {} bytes, expected {}",
                self.gz_path().display(),
                entry.comp_offset,
                block.len(),
                entry.length
            )));
        }
        let start = (offset - entry.logical_offset) as usize;
        Ok(block[start..start + length as usize].to_vec())
    }

    pub fn scan(&self) -> Result<Option<Vec<(u64, u64)>>> {
        let idx = self.load_idx()?;
        Ok(Some(
            idx.entries
                .iter()
                .map(|e| (e.logical_offset, e.length))
                .collect(),
        ))
    }

    pub fn repack(&mut self, retained: &[(u64, u64)]) -> Result<Vec<RepackMove>> {
        let gz_path = self.gz_path();
        let staged_gz = path_with_suffix(&gz_path, ".repack");
        let staged_idx = path_with_suffix(&self.idx_path(), ".repack");

        let mut data = Vec::new();
        let mut idx = SeekIndex::default();
        let mut moves = Vec::with_capacity(retained.len());
        let mut logical_offset = 0u64;
        for &(offset, length) in retained {
            let payload = self.read_range(offset, length)?;
            let member = Self::compress_member(&payload)?;
            idx.entries.push(IdxEntry {
                logical_offset,
                length,
                comp_offset: data.len() as u64,
            });
            moves.push(RepackMove {
                old_offset: offset,
                new_offset: logical_offset,
                length,
            });
            data.extend_from_slice(&member);
            logical_offset += length;
        }
        idx.gz_size = data.len() as u64;

        write_file_sync(&staged_gz, &data)?;
        write_file_sync(&staged_idx, &idx.encode())?;
        std::fs::rename(&staged_gz, &gz_path)?;
        std::fs::rename(&staged_idx, self.idx_path())?;
        Ok(moves)
    }

    pub fn check(&self, expected: &[(u64, u64)]) -> SegmentState {
        if !self.gz_path().exists() {
            return if expected.is_empty() {
                SegmentState::Ok
            } else {
                SegmentState::Missing
            };
        }
        let idx = match self.load_idx() {
            Ok(idx) => idx,
            Err(_) => return SegmentState::Corrupt,
        };
        let listed: Vec<(u64, u64)> = idx
            .entries
            .iter()
            .map(|e| (e.logical_offset, e.length))
            .collect();
        if listed == expected {
            if self.gz_size_on_disk() > idx.gz_size {
                // An appended member made it to the data file but its index
                // update did not.
                return SegmentState::Dirty;
            }
            return SegmentState::Ok;
        }
        if listed.len() > expected.len() && listed[..expected.len()] == *expected {
            return SegmentState::Dirty;
        }
        SegmentState::Corrupt
    }

    pub fn remove(&mut self) -> Result<()> {
        for path in [self.gz_path(), self.idx_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
