//! File handles shared by the backends.
//!
//! A [`FileHandle`] walks a file's block chain with a single cursor. The
//! backend only supplies block storage through [`BlockSource`]; the handle
//! caches the current [`Block`], writes it back when the cursor leaves it
//! and on close, and flavours its behaviour by [`AccessMode`].
//!
//! A reader that runs out of its cached block reloads it before moving on,
//! so data other handles have stored since is not missed.

use async_trait::async_trait;
use std::io::SeekFrom;

use tsumiki_io::{Closer, Error, Reader, Result, Seeker, Span, Writer};

use crate::block::{BLOCK_SIZE, Block};
use crate::ops::ReadOnlyFile;
use crate::types::FileInfo;

/// How a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
    /// Writes go to the end of the file; reads see nothing.
    Append,
}

impl AccessMode {
    pub fn is_writer(&self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

/// Block storage of one open file.
///
/// A file always has at least one block.
pub(crate) trait BlockSource: Send {
    /// Write every change back immediately instead of on block change.
    const WRITE_THROUGH: bool;

    fn block_count(&self) -> Result<usize>;

    /// Content length in bytes.
    fn size(&self) -> Result<u64>;

    fn load(&self, index: usize) -> Result<Vec<u8>>;

    /// Replace block `index`, or append when `index == block_count()`.
    fn store(&mut self, index: usize, data: &[u8]) -> Result<()>;

    fn info(&self, name: &str) -> Result<FileInfo>;

    /// Drop the open count taken for `mode`, reclaiming the node if it was
    /// unlinked while open.
    fn release(&mut self, mode: AccessMode) -> Result<()>;
}

/// Open regular file.
pub(crate) struct FileHandle<S: BlockSource> {
    src: S,
    name: String,
    mode: AccessMode,
    curr: usize,
    block: Block,
    dirty: bool,
    closed: bool,
}

impl<S: BlockSource> FileHandle<S> {
    /// Take over `src`, whose open count for `mode` is already held.
    pub fn new(src: S, name: impl Into<String>, mode: AccessMode, at_end: bool) -> Result<Self> {
        // Built before loading so a failure still releases the open count.
        let mut h = Self {
            src,
            name: name.into(),
            mode,
            curr: 0,
            block: Block::new(),
            dirty: false,
            closed: false,
        };
        h.block = Block::from(h.src.load(0)?);
        if at_end || mode == AccessMode::Append {
            h.seek_to(SeekFrom::End(0))?;
        }
        Ok(h)
    }

    fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.src.store(self.curr, self.block.as_bytes())?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Move to block `index`, writing back the current one.
    fn switch_to(&mut self, index: usize) -> Result<()> {
        if index == self.curr {
            return Ok(());
        }
        self.flush()?;
        self.block = Block::from(self.src.load(index)?);
        self.curr = index;
        Ok(())
    }

    /// Reload a partly filled current block that may have grown in storage.
    fn refresh(&mut self) -> Result<bool> {
        let offset = self.block.offset();
        if self.dirty || self.block.len() >= BLOCK_SIZE {
            return Ok(false);
        }
        if self.curr >= self.src.block_count()? {
            return Ok(false);
        }
        let data = self.src.load(self.curr)?;
        if data.len() <= offset {
            return Ok(false);
        }
        self.block = Block::from(data);
        self.block.seek_to(SeekFrom::Start(offset as u64))?;
        tracing::trace!(file = %self.name, block = self.curr, "reloaded");
        Ok(true)
    }

    /// Move to the next block if there is one.
    fn advance(&mut self) -> Result<bool> {
        let next = self.curr + 1;
        if next >= self.src.block_count()? {
            return Ok(false);
        }
        self.switch_to(next)?;
        tracing::trace!(file = %self.name, block = next, "advanced");
        Ok(true)
    }

    fn read_blocks(&mut self, dst: &Span) -> Result<Option<usize>> {
        let mut o = 0;
        while o < dst.len() {
            if self.block.available() == 0 {
                if self.refresh()? || self.advance()? {
                    continue;
                }
                break;
            }
            o += self.block.read_into(&dst.slice(o..)).unwrap_or(0);
        }

        if o == 0 && !dst.is_empty() {
            return Ok(None);
        }
        Ok(Some(o))
    }

    fn write_blocks(&mut self, src: &Span) -> Result<usize> {
        if self.mode == AccessMode::Append {
            self.seek_to(SeekFrom::End(0))?;
        }

        let mut o = 0;
        while o < src.len() {
            match self.block.write_from(&src.slice(o..)) {
                Some(n) => {
                    o += n;
                    self.dirty = true;
                }
                None => {
                    if self.advance()? {
                        continue;
                    }
                    // Past the last block: start a new one.
                    self.flush()?;
                    let next = self.curr + 1;
                    self.src.store(next, &[])?;
                    self.block = Block::new();
                    self.curr = next;
                    tracing::debug!(file = %self.name, block = next, "appended block");
                }
            }
        }

        if S::WRITE_THROUGH {
            self.flush()?;
        }
        Ok(o)
    }

    fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        self.flush()?;
        let end = self.src.size()?;
        if self.mode == AccessMode::Append && pos != SeekFrom::End(0) {
            return Ok(end);
        }

        let here = (self.curr * BLOCK_SIZE + self.block.offset()) as u64;
        let target = match pos {
            SeekFrom::Start(o) => i128::from(o),
            SeekFrom::Current(d) => i128::from(here) + i128::from(d),
            SeekFrom::End(d) => i128::from(end) + i128::from(d),
        };
        if target < 0 || target > i128::from(end) {
            return Err(Error::out_of_range(format!(
                "seek to {target} outside [0, {end}]"
            )));
        }

        let pos = target as u64;
        let mut index = (pos / BLOCK_SIZE as u64) as usize;
        let mut offset = (pos % BLOCK_SIZE as u64) as usize;
        // The end of a file that fills its last block exactly.
        if offset == 0 && index > 0 && index >= self.src.block_count()? {
            index -= 1;
            offset = BLOCK_SIZE;
        }

        self.switch_to(index)?;
        self.block.seek_to(SeekFrom::Start(offset as u64))?;
        Ok(pos)
    }

    fn close_now(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let flushed = self.flush();
        let released = self.src.release(self.mode);
        tracing::debug!(file = %self.name, mode = %self.mode, "closed");
        flushed.and(released)
    }
}

impl<S: BlockSource> Drop for FileHandle<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close_now() {
            tracing::warn!(file = %self.name, error = %e, "failed to close dropped handle");
        }
    }
}

#[async_trait]
impl<S: BlockSource> Reader for FileHandle<S> {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        if self.closed || self.mode == AccessMode::Append {
            return Ok(None);
        }
        self.read_blocks(dst)
    }
}

#[async_trait]
impl<S: BlockSource> Writer for FileHandle<S> {
    async fn write(&mut self, src: &Span) -> Result<usize> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.mode == AccessMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        self.write_blocks(src)
    }
}

#[async_trait]
impl<S: BlockSource> Seeker for FileHandle<S> {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.seek_to(pos)
    }
}

#[async_trait]
impl<S: BlockSource> Closer for FileHandle<S> {
    async fn close(&mut self) -> Result<()> {
        self.close_now()
    }
}

#[async_trait]
impl<S: BlockSource> ReadOnlyFile for FileHandle<S> {
    async fn stat(&mut self) -> Result<FileInfo> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.flush()?;
        self.src.info(&self.name)
    }
}

/// Open directory. Only `stat` and `close` do anything.
pub(crate) struct DirHandle {
    info: FileInfo,
}

impl DirHandle {
    pub fn new(info: FileInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl Reader for DirHandle {
    async fn read(&mut self, _dst: &Span) -> Result<Option<usize>> {
        Err(Error::IsDirectory)
    }
}

#[async_trait]
impl Writer for DirHandle {
    async fn write(&mut self, _src: &Span) -> Result<usize> {
        Err(Error::IsDirectory)
    }
}

#[async_trait]
impl Seeker for DirHandle {
    async fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(Error::IsDirectory)
    }
}

#[async_trait]
impl Closer for DirHandle {
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ReadOnlyFile for DirHandle {
    async fn stat(&mut self) -> Result<FileInfo> {
        Ok(self.info.clone())
    }
}
