use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::SegmentConfig;
use crate::error::{Result, StorageError};
use crate::storage::mmap::MmapRegion;

/// Width of the relative offset field.
pub const OFF_WIDTH: u64 = 4;
/// Width of the store position field.
pub const POS_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENT_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

/// An Index maps relative offsets to frame positions in the paired Store.
///
/// Responsibilities:
/// - Own a `.index` file and a shared mapping over its full capacity
/// - Append (relative offset, position) entries in place
/// - Look up entry N in O(1)
/// - Shrink the file back to its real contents on close
///
/// NOT responsible for:
/// - Reading store data
/// - Enforcing offset ordering (the owner writes entries in order)
/// - Segment rolling (a full index is reported, never grown)
/// - Locking
///
/// ## On-disk format:
/// Each entry is exactly 12 bytes:
/// ```text
/// | offset: u32 (BE) | position: u64 (BE) |
/// | 4 bytes          | 8 bytes            |
/// ```
/// Entry `i` lives at byte `i * 12`.
///
/// ## Sizing:
/// A live mapping cannot be resized, so the file is grown to
/// `max_index_bytes` before mapping and truncated to the logical size on
/// `close`. `size` tracks the logical size separately from `capacity`.
///
/// ## Crash gap:
/// After an unclean shutdown the file stays at full capacity. Reopening
/// trusts the raw file size, so zero padding reads back as entries of
/// `(0, 0)`. Owners that need crash recovery must keep their own count of
/// entries written.
///
/// ## Ownership:
/// - Index owns its File and its mapping exclusively
/// - No internal lock; mutations require `&mut self` and concurrent use
///   must be serialized by the owner (usually under the Store's lock)
pub struct Index {
    path: PathBuf,
    file: File,
    mmap: MmapRegion,
    /// Bytes used by real entries. Always a multiple of ENT_WIDTH.
    size: u64,
    /// Mapped length, fixed for the lifetime of the mapping.
    capacity: u64,
}

impl Index {
    /// Open or create the index file at `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>, config: &SegmentConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        Self::new(file, path, config)
    }

    /// Map an already-open, read/write file handle.
    ///
    /// 1. Logical size = current file length (reopening keeps old entries)
    /// 2. Grow the file to `max_index_bytes`
    /// 3. Map the whole capacity shared and writable
    ///
    /// # Errors
    /// - `InvalidConfig` if the capacity cannot hold a single entry
    /// - `CorruptedIndex` if the file length is not a multiple of 12 or
    ///   already exceeds the capacity
    /// - I/O errors from stat, grow or mmap
    pub fn new(file: File, path: impl Into<PathBuf>, config: &SegmentConfig) -> Result<Self> {
        config.validate()?;
        let path = path.into();
        let capacity = config.max_index_bytes;

        let size = file.metadata()?.len();

        if size % ENT_WIDTH != 0 {
            return Err(StorageError::CorruptedIndex(format!(
                "{}: size {} is not divisible by {}",
                path.display(),
                size,
                ENT_WIDTH
            )));
        }

        // Growing to a smaller capacity would cut off entries.
        if size > capacity {
            return Err(StorageError::CorruptedIndex(format!(
                "{}: size {} exceeds capacity {}",
                path.display(),
                size,
                capacity
            )));
        }

        file.set_len(capacity)?;

        let map_len = usize::try_from(capacity).map_err(|_| {
            StorageError::InvalidConfig(format!("capacity {} cannot be mapped", capacity))
        })?;
        let mmap = MmapRegion::map_shared(&file, map_len)?;

        debug!(path = %path.display(), size, capacity, "index mapped");

        Ok(Index {
            path,
            file,
            mmap,
            size,
            capacity,
        })
    }

    /// Read one entry.
    ///
    /// `selector == -1` means the last entry written; any non-negative
    /// value addresses entry number `selector`.
    ///
    /// # Returns
    /// - `(relative_offset, position)`
    ///
    /// # Errors
    /// - `EndOfIndex` if the index is empty, the selector is another
    ///   negative number, or the entry lies past the logical size
    pub fn read(&self, selector: i64) -> Result<(u32, u64)> {
        let end_of_index = || StorageError::EndOfIndex {
            requested: selector,
            entries: self.entries(),
        };

        if self.size == 0 {
            return Err(end_of_index());
        }

        let entry = match selector {
            -1 => self.entries() - 1,
            n if n < 0 => return Err(end_of_index()),
            n => n as u64,
        };

        let end = entry
            .checked_mul(ENT_WIDTH)
            .and_then(|at| at.checked_add(ENT_WIDTH));
        let at = match end {
            Some(end) if end <= self.size => (end - ENT_WIDTH) as usize,
            _ => return Err(end_of_index()),
        };

        let offset = self.mmap.read_u32(at)?;
        let position = self.mmap.read_u64(at + OFF_WIDTH as usize)?;
        Ok((offset, position))
    }

    /// Append one entry at the logical-size cursor.
    ///
    /// The capacity check runs before any byte is written, so a failed
    /// call leaves no partial entry behind.
    ///
    /// # Errors
    /// - `IndexFull` once `size + 12 > capacity`; the owner must roll over
    pub fn write(&mut self, offset: u32, position: u64) -> Result<()> {
        if self.size + ENT_WIDTH > self.capacity {
            return Err(StorageError::IndexFull {
                size: self.size,
                capacity: self.capacity,
            });
        }

        let at = self.size as usize;
        self.mmap.write_u32(at, offset)?;
        self.mmap.write_u64(at + OFF_WIDTH as usize, position)?;

        self.size += ENT_WIDTH;
        Ok(())
    }

    /// Persist entries and release the file.
    ///
    /// Order matters: the mapping is flushed synchronously and the file
    /// fsynced before it is truncated to its logical size; truncating
    /// first could discard entries still in dirty pages.
    pub fn close(self) -> Result<()> {
        let Index {
            path,
            file,
            mmap,
            size,
            capacity,
        } = self;

        mmap.flush()?;
        file.sync_all()?;

        // Unmap before shrinking so no mapped page outlives the file end.
        drop(mmap);
        file.set_len(size)?;
        drop(file);

        debug!(path = %path.display(), size, capacity, "index closed");
        Ok(())
    }

    /// Path of the backing file, for diagnostics and reopening.
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mapped byte budget fixed at open (`max_index_bytes`).
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of whole entries written.
    pub fn entries(&self) -> u64 {
        self.size / ENT_WIDTH
    }

    /// True before the first `write`.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True when the next `write` would fail with `IndexFull`.
    pub fn is_full(&self) -> bool {
        self.size + ENT_WIDTH > self.capacity
    }
}
