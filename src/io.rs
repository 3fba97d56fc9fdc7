//! Low-level file operations for the write side.
//!
//! [`SeqWriter`] appends to a freshly created file and tracks the absolute offset
//! of the next byte, which is how the writer learns where the catalog starts.
//! [`backpatch`] rewrites a reserved region of a file that is already complete.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

/// A buffered, append-only writer that knows its current offset.
#[derive(Debug)]
pub struct SeqWriter {
    writer: BufWriter<File>,
    current_offset: u64,
}

impl SeqWriter {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, buffer_size: usize) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            current_offset: 0,
        })
    }

    /// Writes a complete buffer. Returns the offset where the writing started.
    pub fn write_all(&mut self, buffer: &[u8]) -> Result<u64> {
        let start_offset = self.current_offset;
        self.writer.write_all(buffer)?;
        self.current_offset += buffer.len() as u64;
        Ok(start_offset)
    }

    /// Returns the current file cursor position.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Flushes, syncs and closes the file. Returns its final length.
    pub fn finish(self) -> Result<u64> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(self.current_offset)
    }
}

/// Reopens `path` and overwrites `bytes.len()` bytes at `position` in place.
pub fn backpatch(path: &Path, position: u64, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(position))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
