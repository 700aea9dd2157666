use std::fmt;

use bazaar::FileId;

/// Errors produced by the dirstate core.
///
/// Mirrors the error kinds enumerated for the dirstate engine: an IO/format
/// failure aborts the whole object, while `InconsistentDelta` leaves it
/// queryable but no longer persistable (see `DirState::is_aborted`).
#[derive(Debug)]
pub enum Error {
    /// Underlying read/write/lock failure, with the path that was being
    /// operated on when it occurred.
    Io(std::path::PathBuf, std::io::Error),
    /// The on-disk format is malformed: bad header, CRC mismatch, missing
    /// `crc32:`/`num_entries:` line, truncated record, or wrong field
    /// count for the declared parent count.
    Format(String),
    /// A mutation could not be applied because the dirstate does not match
    /// the delta's assumptions.
    InconsistentDelta {
        path: Vec<u8>,
        file_id: FileId,
        reason: String,
    },
    /// `add` of a file-id that is already present somewhere in the state.
    DuplicateFileId { file_id: FileId, existing_path: Vec<u8> },
    /// `add` beneath a directory that is not itself versioned.
    NotVersioned(Vec<u8>),
    /// Attempt to add `.`/`..`, or a path/file-id containing a NUL or LF
    /// byte, or whose normalization does not round-trip.
    InvalidEntryName(Vec<u8>),
    /// A lock-requiring method was called without the lock, or a lock was
    /// requested twice.
    LockContention(std::path::PathBuf),
    LockNotHeld,
    /// The mutation is not (yet) implemented for this shape of input.
    NotImplemented(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(path, e) => write!(f, "I/O error on {}: {}", path.display(), e),
            Error::Format(msg) => write!(f, "dirstate format error: {}", msg),
            Error::InconsistentDelta {
                path,
                file_id,
                reason,
            } => write!(
                f,
                "inconsistent delta for {:?} (file-id {:?}): {}",
                String::from_utf8_lossy(path),
                file_id,
                reason
            ),
            Error::DuplicateFileId {
                file_id,
                existing_path,
            } => write!(
                f,
                "file-id {:?} already present at {:?}",
                file_id,
                String::from_utf8_lossy(existing_path)
            ),
            Error::NotVersioned(path) => write!(
                f,
                "{:?} is not versioned (parent directory missing from dirstate)",
                String::from_utf8_lossy(path)
            ),
            Error::InvalidEntryName(path) => {
                write!(f, "invalid entry name: {:?}", String::from_utf8_lossy(path))
            }
            Error::LockContention(path) => {
                write!(f, "could not lock {}: contended", path.display())
            }
            Error::LockNotHeld => write!(f, "operation requires a lock that is not held"),
            Error::NotImplemented(what) => write!(f, "not implemented: {}", what),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
