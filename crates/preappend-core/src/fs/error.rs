use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Context for buffered file operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    /// Path the handle was opened with
    pub path: Option<PathBuf>,
    /// Operation being performed
    pub operation: Option<&'static str>,
    /// File offset the operation was working at
    pub offset: Option<u64>,
}

impl FileContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("offset {offset}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors produced by [`BufferedFile`](crate::fs::BufferedFile) operations.
///
/// Every variant carries a [`FileContext`]. The same failure is also emitted
/// as a `warn!` event, but callers must inspect the returned error to decide
/// whether an operation succeeded.
#[derive(Error, Debug)]
pub enum BufferedFileError {
    /// A handle buffer or a temporary hold buffer could not be allocated
    #[error("Failed to allocate {requested} bytes for {context}")]
    Allocation { requested: u64, context: FileContext },

    /// The underlying file could not be opened or created
    #[error("Failed to open {context}: {source}")]
    Open {
        #[source]
        source: io::Error,
        context: FileContext,
    },

    /// A read, write, seek or truncate against the underlying file failed
    #[error("IO error during {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: FileContext,
    },

    /// Releasing the underlying descriptor failed
    #[error("Failed to close {context}: {source}")]
    Close {
        #[source]
        source: io::Error,
        context: FileContext,
    },

    /// The open options were rejected before touching the filesystem
    #[error("Invalid options for {context}: {reason}")]
    InvalidOptions { reason: String, context: FileContext },
}

impl BufferedFileError {
    /// Create an IO error with context
    #[must_use]
    pub fn io_with_context(source: io::Error, context: FileContext) -> Self {
        BufferedFileError::Io { source, context }
    }

    /// Create an open error with context
    #[must_use]
    pub fn open_with_context(source: io::Error, context: FileContext) -> Self {
        BufferedFileError::Open { source, context }
    }

    /// The context attached to this error.
    pub fn context(&self) -> &FileContext {
        match self {
            BufferedFileError::Allocation { context, .. }
            | BufferedFileError::Open { context, .. }
            | BufferedFileError::Io { context, .. }
            | BufferedFileError::Close { context, .. }
            | BufferedFileError::InvalidOptions { context, .. } => context,
        }
    }

    /// The kind of the underlying OS error, if there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            BufferedFileError::Open { source, .. }
            | BufferedFileError::Io { source, .. }
            | BufferedFileError::Close { source, .. } => Some(source.kind()),
            BufferedFileError::Allocation { .. } | BufferedFileError::InvalidOptions { .. } => {
                None
            }
        }
    }
}

impl From<BufferedFileError> for io::Error {
    fn from(err: BufferedFileError) -> Self {
        match err.io_kind() {
            Some(kind) => io::Error::new(kind, err),
            None => match err {
                BufferedFileError::Allocation { .. } => {
                    io::Error::new(io::ErrorKind::OutOfMemory, err)
                }
                _ => io::Error::new(io::ErrorKind::InvalidInput, err),
            },
        }
    }
}
