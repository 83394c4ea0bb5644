//! Shared random-access byte source.
//!
//! A PDF file is read through a single seekable cursor. Every read seeks
//! and reads under one mutex, so concurrent resolvers never interleave a
//! seek with another thread's read. Cache hits in the object store never
//! touch this lock.

use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

/// Anything that can back a [`ByteSource`].
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Random-access source with one scoped cursor lock.
pub struct ByteSource {
    cursor: Mutex<Box<dyn ReadSeek>>,
    len: u64,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource").field("len", &self.len).finish()
    }
}

impl ByteSource {
    /// Wrap a seekable reader.
    pub fn new<R: ReadSeek + 'static>(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            cursor: Mutex::new(Box::new(reader)),
            len,
        })
    }

    /// Source over an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            cursor: Mutex::new(Box::new(Cursor::new(data))),
            len,
        }
    }

    /// Open a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }

    /// Total length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the source is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read up to `max` bytes starting at `offset`.
    ///
    /// Returns fewer bytes near the end of the source and an empty buffer
    /// past it.
    pub fn read_at(&self, offset: u64, max: usize) -> Result<Vec<u8>> {
        if offset >= self.len {
            return Ok(Vec::new());
        }
        let want = (self.len - offset).min(max as u64);
        let mut buf = Vec::with_capacity(want as usize);

        let mut cursor = self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cursor.seek(SeekFrom::Start(offset))?;
        (&mut **cursor).take(want).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read everything from `offset` to the end.
    pub fn read_from(&self, offset: u64) -> Result<Vec<u8>> {
        self.read_at(offset, usize::MAX)
    }

    /// Read the last `n` bytes, returning their starting offset too.
    pub fn read_tail(&self, n: usize) -> Result<(u64, Vec<u8>)> {
        let start = self.len.saturating_sub(n as u64);
        Ok((start, self.read_at(start, n)?))
    }
}
