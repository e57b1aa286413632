//! Error types for the buffered file crate
//!
//! Re-exports the error type and its context so callers can match on failures
//! without reaching into `fs`.

pub use crate::fs::error::{BufferedFileError, FileContext};

/// Result alias for buffered file operations.
pub type Result<T, E = BufferedFileError> = std::result::Result<T, E>;
