//! Memory-mapped shared segment.

use courier_core::{CourierError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

/// Fixed-size shared memory region backed by a file.
///
/// Every process mapping the same file sees the same bytes.
pub struct SharedSegment {
    mmap: MmapMut,
    size: usize,
}

impl SharedSegment {
    /// Opens a segment, creating its backing file if needed.
    ///
    /// An existing file smaller than `capacity` is grown; a larger one is
    /// left as is and mapped whole, so a writer with a smaller capacity can
    /// still clear what a larger one left behind.
    ///
    /// # Arguments
    /// * `path` - Path to the backing file
    /// * `capacity` - Minimum size of the mapping in bytes
    ///
    /// # Errors
    /// Returns IO error if file operations fail.
    pub fn open_or_create(path: &Path, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        if len < capacity {
            file.set_len(capacity as u64)?;
        }
        let size = capacity.max(len);

        // SAFETY: the mapping is only accessed through this value, and
        // concurrent writers are serialized by the segment's lock.
        let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };

        Ok(Self { mmap, size })
    }

    /// Opens an existing segment without creating it.
    ///
    /// Maps at most `capacity` bytes, fewer if the backing file is shorter.
    ///
    /// # Arguments
    /// * `path` - Path to the backing file
    /// * `capacity` - Maximum size of the mapping in bytes
    /// * `name` - Segment name used in the not-found error
    ///
    /// # Errors
    /// Returns `SegmentNotFound` if the file is missing or empty, and IO error
    /// if any other file operation fails.
    pub fn open_existing(path: &Path, capacity: usize, name: &str) -> Result<Self> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CourierError::SegmentNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        let size = capacity.min(len);
        if size == 0 {
            return Err(CourierError::SegmentNotFound {
                name: name.to_string(),
            });
        }

        // SAFETY: see `open_or_create`.
        let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };

        Ok(Self { mmap, size })
    }

    /// Returns the size of the mapping.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns a slice of the shared memory.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Returns a mutable slice of the shared memory.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Copies the whole segment out.
    #[must_use]
    pub fn read_all(&self) -> Vec<u8> {
        self.mmap.to_vec()
    }

    /// Writes `data` at offset 0 and returns the number of bytes written.
    ///
    /// Bytes past the end of the segment are dropped; callers check the size
    /// beforehand.
    pub fn write_at_zero(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(self.size);
        self.mmap[..len].copy_from_slice(&data[..len]);
        len
    }

    /// Zero-fills the segment from `offset` to the end.
    pub fn clear_from(&mut self, offset: usize) {
        if offset < self.size {
            self.mmap[offset..].fill(0);
        }
    }

    /// Flushes changes to the backing file.
    ///
    /// # Errors
    /// Returns IO error if flush fails.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("size", &self.size)
            .finish()
    }
}
