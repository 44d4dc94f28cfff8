//! Segment configuration.

use crate::framing::Framing;
use courier_core::{CourierError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default segment capacity (1 MiB).
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Default delay between two reads of the segment.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Prefix placing segment and lock names in the machine-wide namespace.
pub const GLOBAL_PREFIX: &str = "Global\\";

/// Suffix appended to the segment name to name its lock.
pub const MUTEX_SUFFIX: &str = "_Mutex";

/// Configuration for a shared segment.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Caller-supplied base name, without the global prefix.
    pub name: String,
    /// Size of the segment in bytes.
    pub capacity: usize,
    /// Directory holding the backing files.
    pub directory: PathBuf,
    /// Delay between two polls.
    pub poll_interval: Duration,
    /// Message layout inside the segment.
    pub framing: Framing,
    /// Whether reads and writes take the cross-process lock.
    ///
    /// On by default where the lock is implemented (Unix).
    pub cross_process_lock: bool,
}

impl SegmentConfig {
    /// Creates a configuration with default settings for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            directory: default_directory(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            framing: Framing::default(),
            cross_process_lock: cfg!(unix),
        }
    }

    /// Sets the capacity in bytes (at least 1).
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the directory holding the backing files.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the framing.
    #[must_use]
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Enables or disables the cross-process lock.
    #[must_use]
    pub fn cross_process_lock(mut self, enabled: bool) -> Self {
        self.cross_process_lock = enabled;
        self
    }

    /// Returns the global segment name, e.g. `Global\orders`.
    #[must_use]
    pub fn segment_name(&self) -> String {
        format!("{}{}", GLOBAL_PREFIX, self.name)
    }

    /// Returns the global lock name, e.g. `Global\orders_Mutex`.
    #[must_use]
    pub fn lock_name(&self) -> String {
        format!("{}{}", self.segment_name(), MUTEX_SUFFIX)
    }

    /// Returns the path of the segment's backing file.
    #[must_use]
    pub fn segment_path(&self) -> PathBuf {
        self.directory.join(file_name(&self.segment_name()))
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.lock", file_name(&self.lock_name())))
    }

    /// Checks that the configuration can name a segment.
    ///
    /// # Errors
    /// Returns `InvalidName` if the base name is empty or blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CourierError::InvalidName {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Returns `/dev/shm` when available, the system temp directory otherwise.
#[must_use]
pub fn default_directory() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

fn file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
