//! Buffered file I/O over a raw descriptor, with one-shot truncate/append
//! handling and a "pre-append" mode that inserts written bytes in front of
//! the content a file already had.
//!
//! ```no_run
//! use preappend_core::fs::{AccessMode, OpenOptions};
//!
//! # fn main() -> Result<(), preappend_core::error::BufferedFileError> {
//! let mut file = OpenOptions::new()
//!     .with_access(AccessMode::ReadWrite)
//!     .with_create(0o644)
//!     .with_preappend()
//!     .open("journal.log")?;
//!
//! file.write(b"newest entry\n")?;
//! file.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod fs;

pub use error::BufferedFileError;
pub use fs::{AccessMode, BUFFER_SIZE, BufferedFile, FlushStats, OpenOptions, PreappendState};
