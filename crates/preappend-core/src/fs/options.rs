//! Open-mode configuration for [`BufferedFile`].
//!
//! [`OpenOptions`] records the requested access mode, the one-shot truncate
//! and append flags, the library-only pre-append flag and, when creation is
//! requested, the permission bits for a new file. Only the flags the OS
//! should see are forwarded to the underlying `open(2)`:
//!
//! - truncate is forwarded for writable handles only
//! - append is never forwarded; it becomes a one-shot seek to end-of-file on
//!   the first flush, since `O_APPEND` would pin every later write to the end
//! - pre-append never reaches the OS, but a writable pre-append handle is
//!   opened read-write since every insertion reads back the file's content

use std::fs;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use super::buffered::BufferedFile;
use super::error::BufferedFileError;

/// Default capacity of a handle's write and read buffers, in bytes.
pub const BUFFER_SIZE: usize = 4096;

/// Access mode of the underlying descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Whether writes (and therefore flushes) are permitted.
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    /// Whether reads are permitted.
    pub fn is_readable(self) -> bool {
        !matches!(self, AccessMode::WriteOnly)
    }
}

/// Options for opening a [`BufferedFile`].
///
/// # Example
///
/// ```no_run
/// use preappend_core::fs::{AccessMode, OpenOptions};
///
/// let file = OpenOptions::new()
///     .with_access(AccessMode::WriteOnly)
///     .with_create(0o600)
///     .with_truncate()
///     .open("out.bin")?;
/// # Ok::<(), preappend_core::BufferedFileError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub(crate) access: AccessMode,
    /// Permission bits for a newly created file; `None` means no creation
    pub(crate) create: Option<u32>,
    pub(crate) truncate: bool,
    pub(crate) append: bool,
    pub(crate) preappend: bool,
    pub(crate) capacity: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    /// Read-only, no creation, no one-shot flags, default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            access: AccessMode::ReadOnly,
            create: None,
            truncate: false,
            append: false,
            preappend: false,
            capacity: BUFFER_SIZE,
        }
    }

    #[must_use]
    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Create the file if it does not exist, with the given permission bits
    /// (subject to the process umask).
    #[must_use]
    pub fn with_create(mut self, permission: u32) -> Self {
        self.create = Some(permission);
        self
    }

    /// Truncate the file on the first non-empty flush.
    #[must_use]
    pub fn with_truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Seek to end-of-file before the first flush.
    #[must_use]
    pub fn with_append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Insert flushed bytes in front of the file's existing content.
    #[must_use]
    pub fn with_preappend(mut self) -> Self {
        self.preappend = true;
        self
    }

    /// Override the capacity of both handle buffers.
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn creation_permission(&self) -> Option<u32> {
        self.create
    }

    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    /// Open `path` with these options.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<BufferedFile, BufferedFileError> {
        BufferedFile::open(path, self)
    }

    /// Build the std options handed to `open(2)`.
    pub(crate) fn to_os_options(&self) -> fs::OpenOptions {
        let mut opts = fs::OpenOptions::new();
        match self.access {
            AccessMode::ReadOnly => opts.read(true),
            AccessMode::WriteOnly => opts.write(true),
            AccessMode::ReadWrite => opts.read(true).write(true),
        };

        if self.preappend {
            opts.read(true);
        }

        if let Some(permission) = self.create {
            // std refuses `create(true)` without write access, so O_CREAT goes
            // through custom flags to keep read-only creation possible.
            opts.custom_flags(libc::O_CREAT).mode(permission);
        }

        if self.truncate && self.access.is_writable() {
            opts.truncate(true);
        }

        opts
    }
}
