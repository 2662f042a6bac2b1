//! Fixed-ceiling chunks of file content.
//!
//! ```text
//! |<------- len -------->|
//! |....................)..........| <~ up to BLOCK_SIZE
//! |<- offset ->|
//!              ^ next byte read or written
//! ```

use async_trait::async_trait;
use std::io::SeekFrom;

use tsumiki_io::{Error, Reader, Result, Seeker, Span, Writer};

/// Largest number of bytes a block holds.
pub const BLOCK_SIZE: usize = 64 << 10;

/// One chunk of a file with its own cursor.
///
/// Only the last block of a file may be shorter than [`BLOCK_SIZE`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    data: Vec<u8>,
    offset: usize,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical length: the high-water mark of written bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left to read from the cursor.
    pub fn available(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Copy from the cursor into `dst`. `None` once the cursor is at the end.
    pub fn read_into(&mut self, dst: &Span) -> Option<usize> {
        if self.offset >= self.data.len() {
            return None;
        }
        let n = dst.copy_from_slice(&self.data[self.offset..]);
        self.offset += n;
        Some(n)
    }

    /// Copy `src` in at the cursor, growing up to [`BLOCK_SIZE`].
    ///
    /// Returns `None` when the cursor already sits at the ceiling: the caller
    /// moves on to the next block. A short count means the block filled up
    /// part-way and the rest belongs in the next block.
    pub fn write_from(&mut self, src: &Span) -> Option<usize> {
        let o = self.offset;
        if o >= BLOCK_SIZE {
            return None;
        }

        let n = src.len().min(BLOCK_SIZE - o);
        if self.data.len() < o + n {
            self.data.resize(o + n, 0);
        }
        src.slice(..n)
            .with_bytes(|b| self.data[o..o + n].copy_from_slice(b));

        self.offset += n;
        Some(n)
    }

    /// Move the cursor. The target must lie within `[0, len]`.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<usize> {
        let base = match pos {
            SeekFrom::Start(o) => return self.set_offset(i128::from(o)),
            SeekFrom::Current(d) => (self.offset, d),
            SeekFrom::End(d) => (self.data.len(), d),
        };
        self.set_offset(base.0 as i128 + i128::from(base.1))
    }

    fn set_offset(&mut self, o: i128) -> Result<usize> {
        if o < 0 || o > self.data.len() as i128 {
            return Err(Error::out_of_range(format!(
                "block offset {o} outside [0, {}]",
                self.data.len()
            )));
        }
        self.offset = o as usize;
        Ok(self.offset)
    }
}

impl From<Vec<u8>> for Block {
    fn from(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }
}

#[async_trait]
impl Reader for Block {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        Ok(self.read_into(dst))
    }
}

#[async_trait]
impl Writer for Block {
    /// A full block accepts nothing.
    async fn write(&mut self, src: &Span) -> Result<usize> {
        Ok(self.write_from(src).unwrap_or(0))
    }
}

#[async_trait]
impl Seeker for Block {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.seek_to(pos).map(|o| o as u64)
    }
}
