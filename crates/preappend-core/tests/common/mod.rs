#![allow(dead_code)]

use preappend_core::fs::{AccessMode, BufferedFile, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temp directory with one file path inside it
pub struct TestFile {
    _temp: TempDir,
    pub path: PathBuf,
}

impl TestFile {
    /// A path to a file that does not exist yet
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("data.bin");
        Self { _temp: temp, path }
    }

    /// A file pre-populated with `content`
    pub fn with_content(content: &[u8]) -> Self {
        let file = Self::new();
        std::fs::write(&file.path, content).expect("Failed to seed test file");
        file
    }

    pub fn content(&self) -> Vec<u8> {
        std::fs::read(&self.path).expect("Failed to read test file")
    }
}

/// Read-write options that create the file with mode 0644
pub fn rw() -> OpenOptions {
    OpenOptions::new()
        .with_access(AccessMode::ReadWrite)
        .with_create(0o644)
}

/// Write-only options that create the file with mode 0644
pub fn wo() -> OpenOptions {
    OpenOptions::new()
        .with_access(AccessMode::WriteOnly)
        .with_create(0o644)
}

pub fn open(path: &Path, options: &OpenOptions) -> BufferedFile {
    options.open(path).expect("Failed to open buffered file")
}

/// Read a whole file back through a read-only buffered handle
pub fn read_back(path: &Path) -> Vec<u8> {
    let mut file = open(path, &OpenOptions::new());
    let mut out = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = file.read(&mut chunk).expect("Failed to read");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    file.close().expect("Failed to close");
    out
}

/// Standard test contents
pub mod test_files {
    pub const SMALL_TEXT: &[u8] = b"Hello, World!";
    pub const LOREM_IPSUM: &[u8] = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

    /// Create content of exactly the specified size
    pub fn create_sized_content(size: usize) -> Vec<u8> {
        let pattern = b"0123456789ABCDEF";
        (0..size).map(|i| pattern[i % pattern.len()]).collect()
    }
}
