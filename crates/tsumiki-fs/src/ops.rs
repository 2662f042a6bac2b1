//! Filesystem and file handle traits.

use async_trait::async_trait;

use tsumiki_io::{Closer, Error, Reader, Result, Seeker, Writer};

use crate::types::{DEFAULT_FILE_MODE, DirEntry, FileInfo, FileMode, OpenFlag};

/// An open file that can be read, positioned and closed.
#[async_trait]
pub trait ReadOnlyFile: Reader + Seeker + Closer {
    /// Metadata of the file this handle refers to.
    async fn stat(&mut self) -> Result<FileInfo>;
}

/// An open file that can also be written.
pub trait File: ReadOnlyFile + Writer {
    /// Drop the write capability.
    fn into_read_only(self: Box<Self>) -> Box<dyn ReadOnlyFile>;
}

impl<T: ReadOnlyFile + Writer + 'static> File for T {
    fn into_read_only(self: Box<Self>) -> Box<dyn ReadOnlyFile> {
        self
    }
}

/// Core filesystem operations.
///
/// Paths are slash-separated and cleaned before use; relative and absolute
/// paths both start at the filesystem root. Errors carry the operation and
/// path that failed (see [`Error::path`]).
///
/// Operations that act on a name itself (`rename`, `remove`, `mkdir`, the
/// new name of `link` and `symlink`, `lstat`, `read_link`) do not follow a
/// symbolic link in the final component. Everything else does.
#[async_trait]
pub trait Fs: Send + Sync {
    // ========================================================================
    // Opening
    // ========================================================================

    /// Open an existing file for reading.
    async fn open(&self, name: &str) -> Result<Box<dyn ReadOnlyFile>> {
        let f = self.open_file(name, OpenFlag::READ, 0).await?;
        Ok(f.into_read_only())
    }

    /// Open a file with the given flags.
    ///
    /// | state | flags | result |
    /// |---|---|---|
    /// | directory | `WRITE` or `TRUNC` | `IsDirectory` |
    /// | directory | otherwise | handle whose reads fail with `IsDirectory` |
    /// | absent | `READ`, or no `WRITE` | `NotExist` |
    /// | absent | `WRITE` | new file with `mode` |
    /// | file held by a writer | anything but plain `WRITE` | `Busy` |
    /// | file | `WRITE \| NO_REPLACE` | `Exist` |
    /// | file | no write flag | read-only handle |
    /// | file | plain `WRITE` | a new file replaces the old one |
    /// | file | `TRUNC` | content reset before the first write |
    /// | file | `APPEND` | writes go to the end, reads see nothing |
    ///
    /// `AT_END` starts the cursor at the end of the file. Empty flags mean
    /// `READ`.
    async fn open_file(&self, name: &str, flag: OpenFlag, mode: FileMode) -> Result<Box<dyn File>>;

    /// Create or truncate a file: `open_file(name, WRITE | TRUNC)`.
    async fn create(&self, name: &str) -> Result<Box<dyn File>> {
        self.open_file(name, OpenFlag::WRITE | OpenFlag::TRUNC, DEFAULT_FILE_MODE)
            .await
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Metadata of the file `name` resolves to.
    async fn stat(&self, name: &str) -> Result<FileInfo>;

    /// Like [`Fs::stat`], but describes a final symbolic link itself.
    async fn lstat(&self, name: &str) -> Result<FileInfo> {
        Err(Error::unsupported("lstat").with_path("lstat", name))
    }

    /// Entries of a directory, in no particular order.
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>>;

    /// Target of a symbolic link.
    async fn read_link(&self, name: &str) -> Result<String> {
        Err(Error::unsupported("read_link").with_path("read_link", name))
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Create a directory. The parent must exist.
    async fn mkdir(&self, name: &str, mode: FileMode) -> Result<()>;

    /// Create a directory and any missing parents.
    async fn mkdir_all(&self, name: &str, mode: FileMode) -> Result<()>;

    /// Move `old` to `new`, replacing a file or empty directory at `new`.
    async fn rename(&self, old: &str, new: &str) -> Result<()>;

    /// Remove a file, symbolic link or empty directory.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Add `new` as another name for the file at `old`.
    async fn link(&self, old: &str, _new: &str) -> Result<()> {
        Err(Error::unsupported("link").with_path("link", old))
    }

    /// Create a symbolic link `name` pointing at `target`.
    ///
    /// The target is not checked; dangling links are allowed.
    async fn symlink(&self, _target: &str, name: &str) -> Result<()> {
        Err(Error::unsupported("symlink").with_path("symlink", name))
    }
}
