//! Draining the write buffer: one-shot truncate/append handling and the
//! pre-append insertion state machine.
//!
//! Pre-append keeps an explicit insertion cursor instead of trusting the
//! descriptor offset between calls:
//!
//! ```text
//! Pending  --first flush-->  Inserted  --every later flush-->  Inserted
//!
//! first:  [old.......]            ->  [new1][old.......]
//!                                           ^ cursor
//! later:  [new1][old.......]      ->  [new1][new2][old.......]
//!                                                 ^ cursor
//! ```
//!
//! Each step may fail on its own. A failure aborts the flush, leaves the
//! buffered bytes in place for a retry, and can leave the file in an
//! intermediate state (e.g. truncated but not yet rewritten); insertion is
//! not transactional.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, instrument, trace, warn};

use super::buffered::{BufferedFile, PreappendState, allocate_buffer};
use super::error::BufferedFileError;

impl BufferedFile {
    /// Write the buffered bytes to the file at the position the handle's mode
    /// dictates, then empty the buffer.
    ///
    /// With an empty buffer this only performs a pending one-shot seek to
    /// end-of-file (never the one-shot truncate). On error the buffer is left
    /// untouched and the flush may be retried.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display(), buffered = self.write_pos))]
    pub fn flush(&mut self) -> Result<(), BufferedFileError> {
        if self.write_pos == 0 {
            if self.pending_append_seek {
                self.seek(SeekFrom::End(0), "append seek")?;
                self.pending_append_seek = false;
                trace!("Applied one-shot append seek on empty flush");
            }
            return Ok(());
        }

        if self.pending_truncate {
            self.truncate(0)?;
            self.seek(SeekFrom::Start(0), "truncate")?;
            self.pending_truncate = false;
            debug!("Applied one-shot truncate");
        }

        if self.pending_append_seek {
            self.seek(SeekFrom::End(0), "append seek")?;
            self.pending_append_seek = false;
            debug!("Applied one-shot append seek");
        }

        match self.preappend {
            PreappendState::Off => {
                let data = &self.write_buf[..self.write_pos];
                self.file.write_all(data).map_err(|e| {
                    warn!(error = %e, "Error writing buffer to file");
                    BufferedFileError::io_with_context(e, self.context("write"))
                })?;
            }
            PreappendState::Pending => self.insert_first()?,
            PreappendState::Inserted { cursor } => self.insert_at_cursor(cursor)?,
        }

        self.stats.flushes += 1;
        self.stats.bytes_flushed += self.write_pos as u64;
        trace!(bytes = self.write_pos, "Flushed write buffer");
        self.write_pos = 0;
        Ok(())
    }

    /// First insertion: the buffered block becomes the start of the file and
    /// everything previously in it moves behind the block.
    fn insert_first(&mut self) -> Result<(), BufferedFileError> {
        let file_len = self.seek(SeekFrom::End(0), "preappend size")?;
        let held = self.read_range(0, file_len)?;

        self.seek(SeekFrom::Start(0), "preappend rewind")?;
        self.truncate(0)?;
        self.write_block(0, "preappend write")?;

        let cursor = self.write_pos as u64;
        self.write_held(cursor, &held)?;
        self.seek(SeekFrom::Start(cursor), "preappend reposition")?;

        self.preappend = PreappendState::Inserted { cursor };
        self.stats.insertions += 1;
        debug!(cursor, moved = file_len, "First pre-append insertion");
        Ok(())
    }

    /// Later insertions: the block goes right after the previous one and the
    /// trailing content shifts back by the block's length.
    fn insert_at_cursor(&mut self, previous_end: u64) -> Result<(), BufferedFileError> {
        let file_len = self.seek(SeekFrom::End(0), "preappend size")?;
        let held = self.read_range(previous_end, file_len.saturating_sub(previous_end))?;

        self.seek(SeekFrom::Start(previous_end), "preappend seek")?;
        self.write_block(previous_end, "preappend write")?;

        let cursor = previous_end + self.write_pos as u64;
        self.write_held(cursor, &held)?;
        self.seek(SeekFrom::Start(cursor), "preappend reposition")?;

        self.preappend = PreappendState::Inserted { cursor };
        self.stats.insertions += 1;
        trace!(previous_end, cursor, moved = held.len(), "Pre-append insertion");
        Ok(())
    }

    /// Read `len` bytes starting at `offset` into a temporary hold buffer.
    fn read_range(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, BufferedFileError> {
        let context = self.context("preappend hold").with_offset(offset);
        let size = usize::try_from(len).map_err(|_| {
            warn!(requested = len, "Hold buffer larger than address space");
            BufferedFileError::Allocation {
                requested: len,
                context: context.clone(),
            }
        })?;
        let mut held = allocate_buffer(size, &context)?;

        self.seek(SeekFrom::Start(offset), "preappend hold")?;
        self.file.read_exact(&mut held).map_err(|e| {
            warn!(error = %e, "Error reading file content into hold buffer");
            BufferedFileError::io_with_context(e, context)
        })?;
        Ok(held)
    }

    fn write_block(&mut self, offset: u64, operation: &'static str) -> Result<(), BufferedFileError> {
        let data = &self.write_buf[..self.write_pos];
        self.file.write_all(data).map_err(|e| {
            warn!(error = %e, "Error writing new data to file");
            BufferedFileError::io_with_context(e, self.context(operation).with_offset(offset))
        })
    }

    fn write_held(&mut self, offset: u64, held: &[u8]) -> Result<(), BufferedFileError> {
        if held.is_empty() {
            return Ok(());
        }
        self.seek(SeekFrom::Start(offset), "preappend restore")?;
        self.file.write_all(held).map_err(|e| {
            warn!(error = %e, "Error writing held content back to file");
            BufferedFileError::io_with_context(
                e,
                self.context("preappend restore").with_offset(offset),
            )
        })
    }

    fn seek(&mut self, pos: SeekFrom, operation: &'static str) -> Result<u64, BufferedFileError> {
        self.file.seek(pos).map_err(|e| {
            warn!(error = %e, ?pos, "Error seeking in file");
            BufferedFileError::io_with_context(e, self.context(operation))
        })
    }

    fn truncate(&mut self, len: u64) -> Result<(), BufferedFileError> {
        self.file.set_len(len).map_err(|e| {
            warn!(error = %e, "Error truncating file");
            BufferedFileError::io_with_context(e, self.context("truncate").with_offset(len))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::options::{AccessMode, OpenOptions};
    use std::fs;
    use tempfile::TempDir;

    fn open_with(path: &std::path::Path, options: OpenOptions) -> BufferedFile {
        options
            .with_access(AccessMode::ReadWrite)
            .with_create(0o644)
            .open(path)
            .unwrap()
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"keep").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_preappend());
        file.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"keep");
        assert_eq!(file.preappend_state(), PreappendState::Pending);
        assert_eq!(file.stats().flushes, 0);
    }

    #[test]
    fn test_plain_flush_writes_at_offset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"xxxxxx").unwrap();

        let mut file = open_with(&path, OpenOptions::new());
        file.write(b"ab").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"abxxxx");
        assert_eq!(file.buffered_len(), 0);
    }

    #[test]
    fn test_one_shot_truncate_then_cleared() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        let mut file = open_with(&path, OpenOptions::new().with_truncate());
        assert!(file.pending_truncate);

        file.write(b"first").unwrap();
        file.flush().unwrap();
        assert!(!file.pending_truncate);

        file.write(b"second").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"firstsecond");
    }

    #[test]
    fn test_empty_flush_keeps_pending_truncate() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        let mut file = open_with(&path, OpenOptions::new().with_truncate());

        file.flush().unwrap();
        assert!(file.pending_truncate, "truncate waits for a non-empty flush");
    }

    #[test]
    fn test_one_shot_append_seek() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"head").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_append());
        file.write(b"-tail").unwrap();
        file.flush().unwrap();
        assert!(!file.pending_append_seek);
        assert_eq!(fs::read(&path).unwrap(), b"head-tail");
    }

    #[test]
    fn test_append_seek_applies_on_empty_flush() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"head").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_append());
        file.flush().unwrap();
        assert!(!file.pending_append_seek);

        // The offset is already at the end, so a read sees nothing.
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_append_is_one_shot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"0123").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_append());
        file.write(b"ab").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"0123ab");

        // Move the offset back; a real O_APPEND would ignore this.
        file.seek(SeekFrom::Start(0), "test").unwrap();
        file.write(b"XY").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"XY23ab");
    }

    #[test]
    fn test_first_insertion_moves_existing_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"old").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_preappend());
        file.write(b"new-").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new-old");
        assert_eq!(file.preappend_state(), PreappendState::Inserted { cursor: 4 });
        assert_eq!(file.insertion_cursor(), Some(4));
        assert_eq!(file.stats().insertions, 1);
    }

    #[test]
    fn test_later_insertions_follow_cursor() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"|old").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_preappend());
        for block in [&b"one "[..], b"two ", b"three "] {
            file.write(block).unwrap();
            file.flush().unwrap();
        }

        assert_eq!(fs::read(&path).unwrap(), b"one two three |old");
        assert_eq!(file.insertion_cursor(), Some(14));
        assert_eq!(file.stats().insertions, 3);
    }

    #[test]
    fn test_insertion_ignores_offset_moved_by_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"tail").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_preappend());
        file.write(b"A").unwrap();
        file.flush().unwrap();

        // Reading moves the descriptor offset to end-of-file.
        let mut buf = [0u8; 16];
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"tail");

        file.write(b"B").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"ABtail");
    }

    #[test]
    fn test_preappend_with_truncate_drops_old_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"stale").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_truncate().with_preappend());
        file.write(b"C").unwrap();
        file.flush().unwrap();
        file.write(b"B").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"CB");
    }

    #[test]
    fn test_insertion_cursor_past_shrunk_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"abcdef").unwrap();

        let mut file = open_with(&path, OpenOptions::new().with_preappend());
        file.write(b"123").unwrap();
        file.flush().unwrap();
        assert_eq!(file.insertion_cursor(), Some(3));

        // Shrink the file behind the handle's back.
        file.truncate(1).unwrap();
        file.write(b"Z").unwrap();
        file.flush().unwrap();

        let content = fs::read(&path).unwrap();
        assert_eq!(content.len(), 4);
        assert_eq!(&content[..1], b"1");
        assert_eq!(&content[3..], b"Z");
    }
}
