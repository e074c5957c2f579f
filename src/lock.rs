use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Fixed name of the lock file kept at the destination root. The file is
/// never deleted, only unlocked, so another process may take it over; its
/// persistent presence is expected.
pub const LOCK_FILENAME: &str = ".dashsync.lock";

#[derive(Debug, Error)]
pub enum LockError {
    /// Expected under overlapping scheduled invocations; not a failure.
    #[error("another instance is already running for destination : {0}")]
    AlreadyRunning(PathBuf),

    #[error("cannot create lock file in destination : {0}")]
    Io(#[from] io::Error),
}

/// Exclusive advisory lock scoped to one destination directory, held for
/// the lifetime of a run and released on every exit path via `Drop`.
///
/// The lock is filesystem-local; it is not reliable over network-mounted
/// destinations (NFS and similar).
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    pub fn acquire(destination: &Path) -> Result<Self, LockError> {
        let path = destination.join(LOCK_FILENAME);
        let file = OpenOptions::new().write(true).create(true).open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file }),
            Err(_) => Err(LockError::AlreadyRunning(destination.to_path_buf())),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquisition_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();

        let held = InstanceLock::acquire(dir.path()).unwrap();
        match InstanceLock::acquire(dir.path()) {
            Err(LockError::AlreadyRunning(path)) => assert_eq!(path, dir.path()),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        drop(held);
        InstanceLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn lock_file_survives_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstanceLock::acquire(dir.path()).unwrap();
        drop(lock);
        assert!(dir.path().join(LOCK_FILENAME).exists());
    }

    #[test]
    fn missing_destination_is_an_io_error() {
        let err = InstanceLock::acquire(Path::new("/nonexistent/destination")).unwrap_err();
        assert!(matches!(err, LockError::Io(_)));
    }
}
