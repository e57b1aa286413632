//! The buffered file handle.
//!
//! A [`BufferedFile`] owns one open descriptor together with a write buffer
//! and a scratch read buffer, both of a capacity fixed at open time. Writes
//! accumulate in the write buffer and reach the file when it fills up, when
//! [`flush`](BufferedFile::flush) is called, before every read, and on
//! [`close`](BufferedFile::close).
//!
//! # Example
//!
//! ```no_run
//! use preappend_core::fs::{AccessMode, OpenOptions};
//!
//! let mut file = OpenOptions::new()
//!     .with_access(AccessMode::ReadWrite)
//!     .with_create(0o644)
//!     .open("notes.txt")?;
//!
//! file.write(b"hello")?;
//!
//! // Reads see buffered writes: the buffer is flushed first.
//! let mut buf = [0u8; 5];
//! let n = file.read(&mut buf)?;
//!
//! file.close()?;
//! # Ok::<(), preappend_core::BufferedFileError>(())
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace, warn};

use super::error::{BufferedFileError, FileContext};
use super::options::{AccessMode, OpenOptions};

/// Where the next flushed block goes when pre-append was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreappendState {
    /// Plain trailing writes at the descriptor offset.
    Off,
    /// Pre-append requested, no insertion performed yet.
    Pending,
    /// At least one block inserted; the next one goes at `cursor`, the end
    /// of the most recently inserted block.
    Inserted { cursor: u64 },
}

/// Counters for successful non-empty flushes of one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Number of flushes that drained the write buffer.
    pub flushes: u64,
    /// Total bytes drained from the write buffer.
    pub bytes_flushed: u64,
    /// How many of those flushes were pre-append insertions.
    pub insertions: u64,
}

/// A buffered handle over one open file.
///
/// Dropping a handle without calling [`close`](Self::close) releases the
/// descriptor and buffers but discards any bytes still in the write buffer.
#[must_use = "buffered bytes are discarded unless the handle is closed"]
pub struct BufferedFile {
    pub(super) file: File,
    pub(super) path: PathBuf,
    pub(super) access: AccessMode,
    /// Fixed-capacity write buffer; `write_pos` is the valid prefix
    pub(super) write_buf: Vec<u8>,
    pub(super) write_pos: usize,
    /// Scratch space for one read call; never holds bytes across calls
    pub(super) read_buf: Vec<u8>,
    pub(super) pending_truncate: bool,
    pub(super) pending_append_seek: bool,
    pub(super) preappend: PreappendState,
    pub(super) stats: FlushStats,
}

impl fmt::Debug for BufferedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedFile")
            .field("path", &self.path)
            .field("access", &self.access)
            .field("capacity", &self.write_buf.len())
            .field("write_pos", &self.write_pos)
            .field("pending_truncate", &self.pending_truncate)
            .field("pending_append_seek", &self.pending_append_seek)
            .field("preappend", &self.preappend)
            .finish_non_exhaustive()
    }
}

/// Allocate a zeroed buffer of exactly `len` bytes without aborting on OOM.
pub(super) fn allocate_buffer(
    len: usize,
    context: &FileContext,
) -> Result<Vec<u8>, BufferedFileError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        warn!(requested = len, error = %e, "Buffer allocation failed");
        BufferedFileError::Allocation {
            requested: len as u64,
            context: context.clone(),
        }
    })?;
    buf.resize(len, 0);
    Ok(buf)
}

impl BufferedFile {
    /// Open `path` according to `options`.
    ///
    /// Both buffers are allocated before the file is opened; if either the
    /// allocation or the open fails, everything acquired so far is released.
    #[instrument(level = "debug", skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        options: &OpenOptions,
    ) -> Result<Self, BufferedFileError> {
        let path = path.as_ref();
        let context = FileContext::new().with_path(path).with_operation("open");

        if options.capacity == 0 {
            warn!("Rejected zero buffer capacity");
            return Err(BufferedFileError::InvalidOptions {
                reason: "buffer capacity must be at least one byte".to_string(),
                context,
            });
        }

        let write_buf = allocate_buffer(options.capacity, &context)?;
        let read_buf = allocate_buffer(options.capacity, &context)?;

        let file = options.to_os_options().open(path).map_err(|e| {
            warn!(error = %e, "Error opening file");
            BufferedFileError::open_with_context(e, context)
        })?;

        let preappend = if options.preappend {
            PreappendState::Pending
        } else {
            PreappendState::Off
        };

        debug!(
            access = ?options.access,
            capacity = options.capacity,
            truncate = options.truncate,
            append = options.append,
            ?preappend,
            "Opened buffered file"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            access: options.access,
            write_buf,
            write_pos: 0,
            read_buf,
            pending_truncate: options.truncate,
            pending_append_seek: options.append,
            preappend,
            stats: FlushStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    /// Fixed capacity of the write and read buffers.
    pub fn capacity(&self) -> usize {
        self.write_buf.len()
    }

    /// Bytes accepted by [`write`](Self::write) but not yet flushed.
    pub fn buffered_len(&self) -> usize {
        self.write_pos
    }

    pub fn preappend_state(&self) -> PreappendState {
        self.preappend
    }

    /// Offset at which the next pre-append insertion will land, once the
    /// first insertion has happened.
    pub fn insertion_cursor(&self) -> Option<u64> {
        match self.preappend {
            PreappendState::Inserted { cursor } => Some(cursor),
            PreappendState::Off | PreappendState::Pending => None,
        }
    }

    pub fn stats(&self) -> FlushStats {
        self.stats
    }

    pub(super) fn context(&self, operation: &'static str) -> FileContext {
        FileContext::new()
            .with_path(&self.path)
            .with_operation(operation)
    }

    /// Buffer `data`, flushing every time the write buffer fills up.
    ///
    /// Returns `data.len()` on success. If a flush fails the error is
    /// returned immediately; the full buffer stays in place so a later
    /// `write` or `flush` retries it.
    #[instrument(level = "trace", skip(self, data), fields(path = %self.path.display(), data_len = data.len()))]
    pub fn write(&mut self, data: &[u8]) -> Result<usize, BufferedFileError> {
        let capacity = self.write_buf.len();
        let mut consumed = 0;

        while consumed < data.len() {
            let space = capacity - self.write_pos;
            let to_copy = space.min(data.len() - consumed);

            self.write_buf[self.write_pos..self.write_pos + to_copy]
                .copy_from_slice(&data[consumed..consumed + to_copy]);
            self.write_pos += to_copy;
            consumed += to_copy;

            if self.write_pos == capacity {
                self.flush()?;
            }
        }

        Ok(consumed)
    }

    /// Fill `buf` from the current file offset.
    ///
    /// Pending writes are flushed first so the read observes them. Returns
    /// fewer than `buf.len()` bytes only at end of file.
    #[instrument(level = "trace", skip(self, buf), fields(path = %self.path.display(), requested = buf.len()))]
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, BufferedFileError> {
        self.flush()?;

        // A write-only pre-append descriptor is readable at the OS level.
        if !self.access.is_readable() {
            warn!("Read on a write-only handle");
            return Err(BufferedFileError::io_with_context(
                io::Error::from_raw_os_error(libc::EBADF),
                self.context("read"),
            ));
        }

        let mut filled = 0;
        while filled < buf.len() {
            let chunk = (buf.len() - filled).min(self.read_buf.len());
            let n = match self.file.read(&mut self.read_buf[..chunk]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Error reading from file");
                    return Err(BufferedFileError::io_with_context(
                        e,
                        self.context("read"),
                    ));
                }
            };

            buf[filled..filled + n].copy_from_slice(&self.read_buf[..n]);
            filled += n;
        }

        trace!(read = filled, "Read complete");
        Ok(filled)
    }

    /// Flush (for writable handles) and release the descriptor and buffers.
    ///
    /// The handle is released even when the flush fails. If both the flush
    /// and the close fail, the flush error is returned.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn close(mut self) -> Result<(), BufferedFileError> {
        let flush_result = if self.access.is_writable() {
            self.flush()
        } else {
            Ok(())
        };
        if let Err(ref e) = flush_result {
            warn!(error = %e, "Flush before close failed, releasing handle anyway");
        }

        let context = self.context("close");
        let BufferedFile {
            file,
            write_buf,
            read_buf,
            stats,
            ..
        } = self;
        drop(write_buf);
        drop(read_buf);

        let close_result = close_descriptor(file.into_raw_fd()).map_err(|e| {
            warn!(error = %e, "Error closing file");
            BufferedFileError::Close { source: e, context }
        });

        debug!(
            flushes = stats.flushes,
            bytes_flushed = stats.bytes_flushed,
            "Closed buffered file"
        );

        flush_result?;
        close_result
    }
}

/// Close a descriptor, reporting the error `File`'s drop would swallow.
#[allow(unsafe_code)]
fn close_descriptor(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` was just taken out of an owned `File`; nothing else owns
    // or closes it.
    if unsafe { libc::close(fd) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl Write for BufferedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BufferedFile::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        BufferedFile::flush(self).map_err(io::Error::from)
    }
}

impl Read for BufferedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        BufferedFile::read(self, buf).map_err(io::Error::from)
    }
}
