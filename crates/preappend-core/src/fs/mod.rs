//! Buffered file handles and the pre-append flush state machine

pub mod buffered;
pub mod error;
mod flush;
pub mod options;

// Re-export commonly used types
pub use buffered::{BufferedFile, FlushStats, PreappendState};
pub use error::{BufferedFileError, FileContext};
pub use options::{AccessMode, BUFFER_SIZE, OpenOptions};
