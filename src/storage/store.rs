use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{Result, StorageError};

/// Width of the big-endian length prefix in front of every payload.
pub const LEN_WIDTH: u64 = 8;

/// A Store is the append-only record file of one segment.
///
/// Responsibilities:
/// - Own a `.store` file handle and the buffered writer wrapping it
/// - Frame payloads with a length prefix and append them
/// - Track the exact byte size of the file
/// - Serve positional reads of frames and raw byte ranges
///
/// NOT responsible for:
/// - Mapping offsets to positions (that is the Index)
/// - Segment rolling
/// - Checksums or compression
///
/// ## On-disk format:
/// ```text
/// | length: u64 (BE) | payload: [u8; length] | length | payload | ...
/// ```
/// No header, no footer. Without an index, record boundaries are found by
/// scanning from position 0.
///
/// ## Durability:
/// `append` only writes into the buffer. A frame reaches the OS on the next
/// `read`, `read_at`, `flush` or `close`; a crash before that loses it.
///
/// ## Thread safety:
/// One mutex guards every operation, so appends and reads never overlap on
/// the same Store. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    inner: Mutex<Option<StoreInner>>,
}

#[derive(Debug)]
struct StoreInner {
    writer: BufWriter<File>,
    /// Exact byte length of the file, buffered bytes included.
    size: u64,
    /// Set when an append failed midway. The buffer or the file may then
    /// hold a partial frame, so `size` no longer matches the file.
    failed: Option<io::ErrorKind>,
}

impl StoreInner {
    fn check(&self) -> io::Result<()> {
        match self.failed {
            Some(kind) => Err(io::Error::new(
                kind,
                format!("store unusable after failed append at size {}", self.size),
            )),
            None => Ok(()),
        }
    }

    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer
            .write_all(&(payload.len() as u64).to_be_bytes())?;
        self.writer.write_all(payload)
    }
}

impl Store {
    /// Open or create the store file at `path` in read + append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Self::new(file, path)
    }

    /// Wrap an already-open file handle.
    ///
    /// The handle must be readable and writable. Size is taken from the
    /// file's current length, and the write cursor is moved to the end so
    /// appends resume after existing frames.
    ///
    /// # Errors
    /// - I/O errors reading metadata or seeking
    pub fn new(mut file: File, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = file.metadata()?.len();
        file.seek(SeekFrom::End(0))?;

        debug!(path = %path.display(), size, "store opened");

        Ok(Store {
            path,
            inner: Mutex::new(Some(StoreInner {
                writer: BufWriter::new(file),
                size,
                failed: None,
            })),
        })
    }

    /// Append one payload as a frame.
    ///
    /// ## Frame written:
    /// ```text
    /// [len(payload): u64 BE][payload]
    /// ```
    ///
    /// # Returns
    /// - `(bytes_written, position)` where `bytes_written = 8 + len` and
    ///   `position` is the store size before this frame, i.e. where the
    ///   frame starts. The owner stores `position` in the Index.
    ///
    /// # Errors
    /// - I/O errors writing into the buffer (may spill to the file). After
    ///   one, the store is failed: every later call returns an I/O error of
    ///   the same kind and `close` only releases the handle.
    /// - `Closed` after `close`
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut guard = self.lock()?;
        let inner = live(&mut guard)?;

        let position = inner.size;
        if let Err(e) = inner.write_frame(payload) {
            warn!(
                path = %self.path.display(),
                position,
                error = %e,
                "append failed, store unusable"
            );
            inner.failed = Some(e.kind());
            return Err(e.into());
        }

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;

        Ok((written, position))
    }

    /// Read the payload of the frame starting at `position`.
    ///
    /// Flushes pending appends first so they are visible to positional reads.
    ///
    /// # Errors
    /// - `Io(UnexpectedEof)` if `position` is past the end, or the frame's
    ///   length prefix points past the end of the store
    /// - other I/O errors
    /// - `Closed` after `close`
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut guard = self.lock()?;
        let inner = live(&mut guard)?;
        inner.writer.flush()?;

        let file = inner.writer.get_ref();

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        read_exact_at(file, &mut len_buf, position)?;
        let len = u64::from_be_bytes(len_buf);

        // Refuse to allocate for a prefix that cannot describe a real frame.
        let end = position
            .checked_add(LEN_WIDTH)
            .and_then(|p| p.checked_add(len));
        match end {
            Some(end) if end <= inner.size => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "frame at position {} with length {} runs past store size {}",
                        position, len, inner.size
                    ),
                )
                .into())
            }
        }

        let mut payload = vec![0u8; len as usize];
        read_exact_at(file, &mut payload, position + LEN_WIDTH)?;
        Ok(payload)
    }

    /// Raw positional read into `buf`, ignoring frame boundaries.
    ///
    /// Used for bulk copies of the whole file. Fills `buf` as far as the
    /// store allows and returns the byte count, which is short only when
    /// the end of the store is reached.
    ///
    /// # Errors
    /// - `Io(UnexpectedEof)` if `offset` is at or past the end of the store
    ///   and `buf` is non-empty
    /// - other I/O errors
    /// - `Closed` after `close`
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut guard = self.lock()?;
        let inner = live(&mut guard)?;
        inner.writer.flush()?;

        let n = read_full_at(inner.writer.get_ref(), buf, offset)?;
        if n == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("offset {} is past store size {}", offset, inner.size),
            )
            .into());
        }

        Ok(n)
    }

    /// Push buffered frames to the OS without closing.
    pub fn flush(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = live(&mut guard)?;
        inner.writer.flush()?;
        Ok(())
    }

    /// Current size in bytes, including frames still in the buffer.
    pub fn size(&self) -> Result<u64> {
        let mut guard = self.lock()?;
        let inner = live(&mut guard)?;
        Ok(inner.size)
    }

    /// Path the store was opened with.
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Flush the buffer and release the file handle.
    ///
    /// If the flush fails the store stays open with its buffer intact, so
    /// `close` can be retried. Once it succeeds, every later call, `close`
    /// included, fails with `Closed`.
    ///
    /// A failed store is released without flushing, since its buffer may
    /// end in a partial frame, and the original error kind is returned.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = guard.as_mut().ok_or(StorageError::Closed)?;

        if let Err(e) = inner.check() {
            if let Some(inner) = guard.take() {
                let (file, _discarded) = inner.writer.into_parts();
                drop(file);
            }
            return Err(e.into());
        }

        inner.writer.flush()?;

        let inner = guard.take().ok_or(StorageError::Closed)?;
        let size = inner.size;
        let file = inner.writer.into_inner().map_err(|e| e.into_error())?;
        drop(file);

        debug!(path = %self.path.display(), size, "store closed");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<StoreInner>>> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

/// The open, healthy state behind the lock.
fn live(state: &mut Option<StoreInner>) -> Result<&mut StoreInner> {
    let inner = state.as_mut().ok_or(StorageError::Closed)?;
    inner.check()?;
    Ok(inner)
}

/// Read until `buf` is full or the file ends. Does not move the write cursor.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match pread(file, &mut buf[total..], offset + total as u64) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let n = read_full_at(file, buf, offset)?;
    if n < buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted {} bytes at offset {}, got {}", buf.len(), offset, n),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn pread(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    // seek_read moves the cursor on Windows; put it back at the end for appends.
    let n = file.seek_read(buf, offset)?;
    file.seek(SeekFrom::End(0))?;
    Ok(n)
}
