//! A filesystem view rooted at a subdirectory of another filesystem.

use async_trait::async_trait;
use std::sync::Arc;

use tsumiki_io::{Error, Result, path};

use crate::ops::{File, Fs, ReadOnlyFile};
use crate::types::{DirEntry, FileInfo, FileMode, OpenFlag};

/// Every path is taken relative to `dir` of the wrapped filesystem.
///
/// Names that would climb out of `dir` are rejected with `InvalidArgument`.
/// Errors keep their kind, but their path is rewritten back to the name the
/// caller used. Symbolic link targets are stored and returned verbatim and
/// resolve in the wrapped filesystem.
pub struct SubFs<F: ?Sized> {
    fs: Arc<F>,
    /// Cleaned, without leading slash; empty for the root.
    dir: String,
}

/// View `fs` through `dir`.
pub fn sub<F: Fs + ?Sized>(fs: Arc<F>, dir: &str) -> Result<SubFs<F>> {
    SubFs::new(fs, dir)
}

impl<F: Fs + ?Sized> SubFs<F> {
    pub fn new(fs: Arc<F>, dir: &str) -> Result<Self> {
        let cleaned = path::clean(dir);
        let dir = cleaned.trim_start_matches('/');
        if dir == ".." || dir.starts_with("../") {
            return Err(Error::invalid_argument(format!("{dir:?} escapes the root")));
        }
        let dir = if dir == "." { "" } else { dir };
        Ok(Self {
            fs,
            dir: dir.to_string(),
        })
    }

    /// The prefix every name is resolved under.
    pub fn dir(&self) -> &str {
        if self.dir.is_empty() { "/" } else { &self.dir }
    }

    fn full_name(&self, op: &'static str, name: &str) -> Result<String> {
        let cleaned = path::clean(name);
        let rel = cleaned.trim_start_matches('/');
        if rel == ".." || rel.starts_with("../") {
            return Err(Error::invalid_argument("name escapes the subtree").with_path(op, name));
        }
        if self.dir.is_empty() {
            return Ok(if rel.is_empty() { ".".to_string() } else { rel.to_string() });
        }
        Ok(path::join(&[self.dir.as_str(), rel]))
    }

    /// Map a path of the wrapped filesystem back into this view.
    fn shorten<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.dir.is_empty() {
            return None;
        }
        if name == self.dir {
            return Some(".");
        }
        name.strip_prefix(self.dir.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }

    fn fix_err(&self, mut e: Error) -> Error {
        if let Some(short) = e.path().and_then(|p| self.shorten(p)).map(str::to_string) {
            e.set_path(short);
        }
        e
    }
}

#[async_trait]
impl<F: Fs + ?Sized> Fs for SubFs<F> {
    #[tracing::instrument(skip(self), name = "subfs.open")]
    async fn open(&self, name: &str) -> Result<Box<dyn ReadOnlyFile>> {
        let full = self.full_name("open", name)?;
        self.fs.open(&full).await.map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.open_file")]
    async fn open_file(&self, name: &str, flag: OpenFlag, mode: FileMode) -> Result<Box<dyn File>> {
        let full = self.full_name("open", name)?;
        self.fs
            .open_file(&full, flag, mode)
            .await
            .map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.create")]
    async fn create(&self, name: &str) -> Result<Box<dyn File>> {
        let full = self.full_name("open", name)?;
        self.fs.create(&full).await.map_err(|e| self.fix_err(e))
    }

    async fn stat(&self, name: &str) -> Result<FileInfo> {
        let full = self.full_name("stat", name)?;
        self.fs.stat(&full).await.map_err(|e| self.fix_err(e))
    }

    async fn lstat(&self, name: &str) -> Result<FileInfo> {
        let full = self.full_name("lstat", name)?;
        self.fs.lstat(&full).await.map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.read_dir")]
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        let full = self.full_name("read_dir", name)?;
        self.fs.read_dir(&full).await.map_err(|e| self.fix_err(e))
    }

    async fn read_link(&self, name: &str) -> Result<String> {
        let full = self.full_name("read_link", name)?;
        self.fs.read_link(&full).await.map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.mkdir")]
    async fn mkdir(&self, name: &str, mode: FileMode) -> Result<()> {
        let full = self.full_name("mkdir", name)?;
        self.fs.mkdir(&full, mode).await.map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.mkdir_all")]
    async fn mkdir_all(&self, name: &str, mode: FileMode) -> Result<()> {
        let full = self.full_name("mkdir", name)?;
        self.fs
            .mkdir_all(&full, mode)
            .await
            .map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.rename")]
    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old_full = self.full_name("rename", old)?;
        let new_full = self.full_name("rename", new)?;
        self.fs
            .rename(&old_full, &new_full)
            .await
            .map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.remove")]
    async fn remove(&self, name: &str) -> Result<()> {
        let full = self.full_name("remove", name)?;
        self.fs.remove(&full).await.map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.link")]
    async fn link(&self, old: &str, new: &str) -> Result<()> {
        let old_full = self.full_name("link", old)?;
        let new_full = self.full_name("link", new)?;
        self.fs
            .link(&old_full, &new_full)
            .await
            .map_err(|e| self.fix_err(e))
    }

    #[tracing::instrument(skip(self), name = "subfs.symlink")]
    async fn symlink(&self, target: &str, name: &str) -> Result<()> {
        let full = self.full_name("symlink", name)?;
        self.fs
            .symlink(target, &full)
            .await
            .map_err(|e| self.fix_err(e))
    }
}
