use std::fs::File;
use std::io;

use memmap2::{MmapMut, MmapOptions};

/// Writable, shared mapping over the pre-allocated part of an index file.
///
/// Entries written here reach the file through the page cache; `flush`
/// forces them out with msync before the Index fsyncs and truncates.
///
/// The region only exposes fixed-width big-endian integers at byte
/// offsets, each access checked against the mapped length, so callers
/// never hold a slice into the mapping.
///
/// Invariants kept by the owning Index:
/// 1. The file is grown to the mapped length before `map_shared`
/// 2. The file is not shrunk until this region has been dropped
/// 3. The mapped length is fixed; a bigger index means a new segment
///
/// `&mut self` for writes; no lock of its own.
#[derive(Debug)]
pub struct MmapRegion {
    mmap: MmapMut,
}

impl MmapRegion {
    /// Map the first `len` bytes of `file` shared and writable.
    ///
    /// The file must already be at least `len` bytes long and opened for
    /// both reading and writing.
    ///
    /// # Errors
    /// - `len` is zero (cannot mmap an empty range)
    /// - OS mmap call fails (permissions, limits, etc.)
    pub fn map_shared(file: &File, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot mmap empty region",
            ));
        }

        // SAFETY: the caller grew the file to at least `len` bytes and the
        // owning Index never shrinks it while this region is alive. All
        // access below goes through bounds-checked slices.
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(file)? };

        Ok(MmapRegion { mmap })
    }

    pub fn read_u32(&self, at: usize) -> io::Result<u32> {
        let bytes = self.slice(at, 4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64(&self, at: usize) -> io::Result<u64> {
        let bytes = self.slice(at, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn write_u32(&mut self, at: usize, value: u32) -> io::Result<()> {
        self.slice_mut(at, 4)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_u64(&mut self, at: usize, value: u64) -> io::Result<()> {
        self.slice_mut(at, 8)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Flush dirty pages back to the file, blocking until done (msync MS_SYNC).
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.mmap.len()
    }

    fn slice(&self, at: usize, width: usize) -> io::Result<&[u8]> {
        let end = self.checked_end(at, width)?;
        Ok(&self.mmap[at..end])
    }

    fn slice_mut(&mut self, at: usize, width: usize) -> io::Result<&mut [u8]> {
        let end = self.checked_end(at, width)?;
        Ok(&mut self.mmap[at..end])
    }

    fn checked_end(&self, at: usize, width: usize) -> io::Result<usize> {
        match at.checked_add(width) {
            Some(end) if end <= self.mmap.len() => Ok(end),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "mmap access [{}, +{}) outside mapped length {}",
                    at,
                    width,
                    self.mmap.len()
                ),
            )),
        }
    }
}
