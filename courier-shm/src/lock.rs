//! Named lock shared by every process using a segment.
//!
//! On Unix the lock is an exclusive `flock` on a file next to the segment.
//! Locks taken through separately opened files exclude each other even within
//! one process, so two contexts on the same segment are serialized too.
//! Other targets have no implementation: acquiring fails with a `Lock` error,
//! and segments there must be configured without the cross-process lock.

use courier_core::{CourierError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Cross-process mutual exclusion keyed by a file path.
#[derive(Debug, Clone)]
pub struct CrossProcessLock {
    name: String,
    path: PathBuf,
}

impl CrossProcessLock {
    /// Creates the lock, creating its file if needed.
    ///
    /// # Arguments
    /// * `name` - Global lock name, used in errors and logs
    /// * `path` - Path of the lock file
    ///
    /// # Errors
    /// Returns IO error if the lock file cannot be created.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let lock = Self {
            name: name.into(),
            path: path.into(),
        };
        lock.open()?;
        Ok(lock)
    }

    /// Returns the lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the lock is held.
    ///
    /// # Errors
    /// Returns `Lock` if the OS refuses the lock, IO error if the file cannot
    /// be opened.
    pub fn acquire(&self) -> Result<LockGuard> {
        let file = self.open()?;
        sys::lock(&file, true).map_err(|e| self.error(e))?;
        Ok(LockGuard { file })
    }

    /// Takes the lock if no one else holds it.
    ///
    /// # Errors
    /// Returns `Lock` if the OS refuses the lock, IO error if the file cannot
    /// be opened.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>> {
        let file = self.open()?;
        if sys::lock(&file, false).map_err(|e| self.error(e))? {
            Ok(Some(LockGuard { file }))
        } else {
            Ok(None)
        }
    }

    fn open(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?)
    }

    fn error(&self, e: std::io::Error) -> CourierError {
        CourierError::lock(format!("{}: {}", self.name, e))
    }
}

/// Holds a [`CrossProcessLock`] until dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        sys::unlock(&self.file);
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    /// Returns `Ok(false)` when `blocking` is false and the lock is taken.
    pub(super) fn lock(file: &File, blocking: bool) -> io::Result<bool> {
        let op = if blocking {
            libc::LOCK_EX
        } else {
            libc::LOCK_EX | libc::LOCK_NB
        };
        loop {
            // SAFETY: the descriptor is owned by `file` and open.
            if unsafe { libc::flock(file.as_raw_fd(), op) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock if !blocking => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    pub(super) fn unlock(file: &File) {
        // SAFETY: as above; closing the file would release the lock anyway.
        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    /// No file locking here; callers must turn the cross-process lock off.
    pub(super) fn lock(_file: &File, _blocking: bool) -> io::Result<bool> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "cross-process lock is only available on unix",
        ))
    }

    pub(super) fn unlock(_file: &File) {}
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders_Mutex.lock");
        let lock = CrossProcessLock::new("Global\\orders_Mutex", &path).unwrap();
        assert!(path.exists());
        assert_eq!(lock.name(), "Global\\orders_Mutex");
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn test_lock_excludes_other_holders() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.lock");
        let first = CrossProcessLock::new("q", &path).unwrap();
        let second = CrossProcessLock::new("q", &path).unwrap();

        let guard = first.acquire().unwrap();
        assert!(second.try_acquire().unwrap().is_none());

        drop(guard);
        let again = second.try_acquire().unwrap();
        assert!(again.is_some());
        assert!(first.try_acquire().unwrap().is_none());
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.lock");
        let lock = CrossProcessLock::new("q", &path).unwrap();

        let guard = lock.acquire().unwrap();
        let contender = lock.clone();
        let waiter = std::thread::spawn(move || {
            let _guard = contender.acquire().unwrap();
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.join().unwrap();
    }
}

#[cfg(all(test, not(unix)))]
mod unsupported_tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_reports_unsupported() {
        let dir = tempdir().unwrap();
        let lock = CrossProcessLock::new("q", dir.path().join("q.lock")).unwrap();

        assert!(matches!(lock.acquire(), Err(CourierError::Lock { .. })));
        assert!(matches!(lock.try_acquire(), Err(CourierError::Lock { .. })));
    }
}
