//! Advisory dataset write lock.
//!
//! At most one writer or checker may hold append/repack rights over a
//! dataset at a time. The lock is a POSIX fcntl write lock on a `.lock` file
//! at the dataset root; dropping the guard releases it on every exit path.
//! Readers never take it.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const LOCK_NAME: &str = ".lock";

#[derive(Debug)]
pub struct DatasetLock {
    file: File,
    path: PathBuf,
}

fn lock_op(file: &File, cmd: libc::c_int, l_type: libc::c_short) -> std::io::Result<()> {
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = l_type;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = 0;
    fl.l_len = 0;
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), cmd, &fl) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl DatasetLock {
    fn open_lock_file(root: &Path) -> Result<(File, PathBuf)> {
        std::fs::create_dir_all(root)?;
        let path = root.join(LOCK_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok((file, path))
    }

    /// Block until the lock is free, then take it.
    pub fn acquire(root: &Path) -> Result<DatasetLock> {
        let (file, path) = Self::open_lock_file(root)?;
        lock_op(&file, libc::F_SETLKW, libc::F_WRLCK as libc::c_short)
            .map_err(|err| Error::Locked(format!("{}: {err}", path.display())))?;
        Ok(DatasetLock { file, path })
    }

    /// Take the lock or fail immediately with [`Error::Locked`].
    pub fn try_acquire(root: &Path) -> Result<DatasetLock> {
        let (file, path) = Self::open_lock_file(root)?;
        lock_op(&file, libc::F_SETLK, libc::F_WRLCK as libc::c_short).map_err(|err| {
            Error::Locked(format!("{}: held by another writer ({err})", path.display()))
        })?;
        Ok(DatasetLock { file, path })
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if let Err(err) = lock_op(&self.file, libc::F_SETLK, libc::F_UNLCK as libc::c_short) {
            log::warn!("{}: failed to release lock: {err}", self.path.display());
        }
    }
}
