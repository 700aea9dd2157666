//! Advisory file locking for the dirstate file (§4.10, §5, §6's `FileLock`
//! collaborator interface).
//!
//! Grounded on the teacher's `transport::fcntl-locks` `ReadLock`/`WriteLock`/
//! `TemporaryWriteLock` trio: a read lock can be atomically promoted to a
//! write lock for the duration of a `save()` and then demoted back, so the
//! caller's original lock discipline survives a save. Reimplemented here
//! (rather than depending on the `transport` crate, which is out of this
//! core's scope) using `nix::fcntl` directly.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};

#[cfg(unix)]
fn set_lock(file: &File, kind: nix::libc::c_short) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let flock = nix::libc::flock {
        l_type: kind,
        l_whence: nix::libc::SEEK_SET as i16,
        l_start: 0,
        l_len: 0,
        l_pid: 0,
    };
    nix::fcntl::fcntl(file.as_raw_fd(), nix::fcntl::FcntlArg::F_SETLK(&flock))
        .map(|_| ())
        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
}

/// A read lock on the dirstate file. Guarantees the header/parents and
/// (on re-read) the body are stable for as long as it is held.
pub struct ReadLock {
    path: PathBuf,
    file: File,
}

impl ReadLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| Error::Io(path.to_path_buf(), e))?;
        #[cfg(unix)]
        set_lock(&file, nix::libc::F_RDLCK as i16)
            .map_err(|_| Error::LockContention(path.to_path_buf()))?;
        Ok(ReadLock {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to grab a write lock without giving up the read lock's file
    /// handle. On failure (another writer holds the lock) the original
    /// `ReadLock` is handed back unharmed — the caller keeps its read
    /// lock and `save()` becomes a silent no-op (§4.3, §4.10).
    pub fn temporary_write_lock(self) -> std::result::Result<WriteLock, ReadLock> {
        #[cfg(unix)]
        {
            match set_lock(&self.file, nix::libc::F_WRLCK as i16) {
                Ok(()) => Ok(WriteLock {
                    path: self.path,
                    file: self.file,
                    demote_on_release: true,
                }),
                Err(_) => Err(self),
            }
        }
        #[cfg(not(unix))]
        {
            Err(self)
        }
    }

    pub fn release(self) {
        #[cfg(unix)]
        let _ = set_lock(&self.file, nix::libc::F_UNLCK as i16);
        debug!("released read lock on {}", self.path.display());
    }
}

/// A write lock on the dirstate file. The exclusive holder may mutate and
/// `save()`.
pub struct WriteLock {
    path: PathBuf,
    file: File,
    demote_on_release: bool,
}

impl WriteLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| Error::Io(path.to_path_buf(), e))?;
        #[cfg(unix)]
        set_lock(&file, nix::libc::F_WRLCK as i16)
            .map_err(|_| Error::LockContention(path.to_path_buf()))?;
        Ok(WriteLock {
            path: path.to_path_buf(),
            file,
            demote_on_release: false,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the original read lock after a temporary promotion. Demotes
    /// back to a read lock rather than releasing entirely, preserving the
    /// caller's original lock discipline (§4.10).
    pub fn restore_read_lock(self) -> ReadLock {
        if self.demote_on_release {
            #[cfg(unix)]
            let _ = set_lock(&self.file, nix::libc::F_RDLCK as i16);
        }
        ReadLock {
            path: self.path,
            file: self.file,
        }
    }

    pub fn release(self) {
        #[cfg(unix)]
        let _ = set_lock(&self.file, nix::libc::F_UNLCK as i16);
        debug!("released write lock on {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_lock_round_trips_through_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        let read = ReadLock::acquire(&path).unwrap();
        let write = read.temporary_write_lock().unwrap_or_else(|_| panic!("promotion should succeed when uncontended"));
        let read_again = write.restore_read_lock();
        read_again.release();
    }
}
