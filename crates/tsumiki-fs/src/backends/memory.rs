//! In-memory filesystem backend.
//!
//! Nodes are reference-counted and hold their children directly. All data
//! is lost when the last reference to the filesystem and its handles drops.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tsumiki_io::{Error, Result, path};

use crate::cursor::{AccessMode, BlockSource, DirHandle, FileHandle};
use crate::ops::{File, Fs};
use crate::open::{self, Plan, Target};
use crate::resolve::{Lookup, Step, Walk, resolve};
use crate::types::{
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DirEntry, FileInfo, FileMode, FileType, OpenFlag,
    SYMLINK_MODE,
};

type NodeRef = Arc<Mutex<MemNode>>;

#[derive(Debug)]
pub(crate) struct MemNode {
    mode: FileMode,
    mod_time: SystemTime,
    num_link: u64,
    payload: Payload,
}

#[derive(Debug)]
enum Payload {
    File(FileData),
    Dir(HashMap<String, NodeRef>),
    Symlink(String),
}

#[derive(Debug)]
struct FileData {
    blocks: Vec<Vec<u8>>,
    readers: usize,
    writers: usize,
}

impl FileData {
    fn new() -> Self {
        Self {
            blocks: vec![Vec::new()],
            readers: 0,
            writers: 0,
        }
    }

    fn size(&self) -> u64 {
        self.blocks.iter().map(|b| b.len() as u64).sum()
    }
}

impl MemNode {
    fn new(mode: FileMode, payload: Payload) -> NodeRef {
        Arc::new(Mutex::new(Self {
            mode,
            mod_time: SystemTime::now(),
            num_link: 0,
            payload,
        }))
    }

    fn file_type(&self) -> FileType {
        match self.payload {
            Payload::File(_) => FileType::File,
            Payload::Dir(_) => FileType::Directory,
            Payload::Symlink(_) => FileType::Symlink,
        }
    }

    fn info(&self, name: &str) -> FileInfo {
        let size = match &self.payload {
            Payload::File(f) => f.size(),
            Payload::Dir(_) => 0,
            Payload::Symlink(target) => target.len() as u64,
        };
        FileInfo {
            name: name.to_string(),
            size,
            mode: self.mode,
            mod_time: self.mod_time,
            file_type: self.file_type(),
            num_link: self.num_link,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.payload, Payload::Dir(_))
    }

    fn is_empty_dir(&self) -> bool {
        matches!(&self.payload, Payload::Dir(e) if e.is_empty())
    }

    fn file_mut(&mut self) -> Result<&mut FileData> {
        match &mut self.payload {
            Payload::File(f) => Ok(f),
            _ => Err(Error::invalid_argument("not a regular file")),
        }
    }
}

/// Link `node` under `name` in `parent`, returning the node it displaced.
fn attach(parent: &NodeRef, name: &str, node: NodeRef) -> Option<NodeRef> {
    node.lock().num_link += 1;
    let displaced = {
        let mut p = parent.lock();
        p.mod_time = SystemTime::now();
        match &mut p.payload {
            Payload::Dir(entries) => entries.insert(name.to_string(), node),
            _ => None,
        }
    };
    if let Some(old) = &displaced {
        let mut old = old.lock();
        old.num_link = old.num_link.saturating_sub(1);
    }
    displaced
}

/// Unlink `name` from `parent`.
fn detach(parent: &NodeRef, name: &str) -> Option<NodeRef> {
    let removed = {
        let mut p = parent.lock();
        p.mod_time = SystemTime::now();
        match &mut p.payload {
            Payload::Dir(entries) => entries.remove(name),
            _ => None,
        }
    };
    if let Some(node) = &removed {
        let mut node = node.lock();
        node.num_link = node.num_link.saturating_sub(1);
    }
    removed
}

/// Block storage of an open in-memory file.
struct MemSource {
    node: NodeRef,
}

impl MemSource {
    fn with_file<T>(&self, f: impl FnOnce(&mut FileData) -> T) -> Result<T> {
        let mut node = self.node.lock();
        Ok(f(node.file_mut()?))
    }
}

impl BlockSource for MemSource {
    // Other handles on the node see every write as soon as it returns.
    const WRITE_THROUGH: bool = true;

    fn block_count(&self) -> Result<usize> {
        self.with_file(|f| f.blocks.len())
    }

    fn size(&self) -> Result<u64> {
        self.with_file(|f| f.size())
    }

    fn load(&self, index: usize) -> Result<Vec<u8>> {
        self.with_file(|f| f.blocks.get(index).cloned())?
            .ok_or_else(|| Error::out_of_range(format!("block {index}")))
    }

    fn store(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let mut node = self.node.lock();
        let f = node.file_mut()?;
        match index.cmp(&f.blocks.len()) {
            std::cmp::Ordering::Less => f.blocks[index] = data.to_vec(),
            std::cmp::Ordering::Equal => f.blocks.push(data.to_vec()),
            std::cmp::Ordering::Greater => {
                return Err(Error::out_of_range(format!("block {index}")));
            }
        }
        node.mod_time = SystemTime::now();
        Ok(())
    }

    fn info(&self, name: &str) -> Result<FileInfo> {
        Ok(self.node.lock().info(name))
    }

    fn release(&mut self, mode: AccessMode) -> Result<()> {
        self.with_file(|f| {
            f.readers = f.readers.saturating_sub(1);
            if mode.is_writer() {
                f.writers = f.writers.saturating_sub(1);
            }
        })
    }
}

/// In-memory filesystem.
///
/// Namespace changes are serialized by one lock; file content is guarded
/// per node, so handles on different files never contend.
pub struct MemFs {
    root: NodeRef,
    ns: Mutex<()>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs").finish_non_exhaustive()
    }
}

impl Walk for MemFs {
    type Node = NodeRef;

    fn root(&self) -> Result<NodeRef> {
        Ok(self.root.clone())
    }

    fn child(&self, dir: &NodeRef, name: &str) -> Result<Option<NodeRef>> {
        Ok(match &dir.lock().payload {
            Payload::Dir(entries) => entries.get(name).cloned(),
            _ => None,
        })
    }

    fn step(&self, node: &NodeRef) -> Result<Step> {
        Ok(match &node.lock().payload {
            Payload::Dir(_) => Step::Dir,
            Payload::Symlink(target) => Step::Link(target.clone()),
            Payload::File(_) => Step::Leaf,
        })
    }
}

impl MemFs {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        let root = MemNode::new(DEFAULT_DIR_MODE, Payload::Dir(HashMap::new()));
        root.lock().num_link = 1;
        Self {
            root,
            ns: Mutex::new(()),
        }
    }

    fn lookup(&self, name: &str, follow_last: bool) -> Result<Lookup<NodeRef>> {
        resolve(self, name, follow_last)
    }

    // ========================================================================
    // Opening
    // ========================================================================

    fn open_file_sync(&self, name: &str, flag: OpenFlag, mode: FileMode) -> Result<Box<dyn File>> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, true)?;
        l.ensure_complete()?;

        let target = match &l.entry {
            None => Target::Absent,
            Some(node) => match &node.lock().payload {
                Payload::Dir(_) => Target::Dir,
                Payload::File(f) => Target::File { writers: f.writers },
                Payload::Symlink(_) => return Err(Error::NotExist),
            },
        };
        let plan = open::plan(flag, target)?;

        let node = match plan {
            Plan::Dir => {
                let info = l.found()?.lock().info(&l.name);
                return Ok(Box::new(DirHandle::new(info)));
            }
            Plan::Create(_) | Plan::Replace(_) => {
                let mode = if mode == 0 { DEFAULT_FILE_MODE } else { mode };
                let node = MemNode::new(mode, Payload::File(FileData::new()));
                attach(&l.parent, &l.name, node.clone());
                tracing::debug!(file = %l.name, "created file");
                node
            }
            Plan::Existing { trunc, .. } => {
                let node = l.found()?.clone();
                if trunc {
                    let mut n = node.lock();
                    n.file_mut()?.blocks = vec![Vec::new()];
                    n.mod_time = SystemTime::now();
                }
                node
            }
        };

        let access = plan.mode();
        {
            let mut n = node.lock();
            let f = n.file_mut()?;
            f.readers += 1;
            if access.is_writer() {
                f.writers += 1;
            }
        }

        let at_end = flag.contains(OpenFlag::AT_END);
        let h = FileHandle::new(MemSource { node }, l.name, access, at_end)?;
        Ok(Box::new(h))
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    fn stat_sync(&self, name: &str, follow_last: bool) -> Result<FileInfo> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, follow_last)?;
        let info = l.found()?.lock().info(&l.name);
        Ok(info)
    }

    fn read_dir_sync(&self, name: &str) -> Result<Vec<DirEntry>> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, true)?;
        let dir = l.found()?.lock();
        let Payload::Dir(entries) = &dir.payload else {
            return Err(Error::NotDirectory);
        };

        let entries = entries
            .iter()
            .map(|(n, node)| {
                let file_type = node.lock().file_type();
                let node = node.clone();
                let name = n.clone();
                DirEntry::new(
                    n.clone(),
                    file_type,
                    Arc::new(move || Ok(node.lock().info(&name))),
                )
            })
            .collect();
        Ok(entries)
    }

    fn read_link_sync(&self, name: &str) -> Result<String> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, false)?;
        match &l.found()?.lock().payload {
            Payload::Symlink(target) => Ok(target.clone()),
            _ => Err(Error::invalid_argument("not a symbolic link")),
        }
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    fn mkdir_sync(&self, name: &str, mode: FileMode) -> Result<()> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, false)?;
        l.ensure_vacant()?;
        let mode = if mode == 0 { DEFAULT_DIR_MODE } else { mode };
        attach(&l.parent, &l.name, MemNode::new(mode, Payload::Dir(HashMap::new())));
        Ok(())
    }

    fn mkdir_all_sync(&self, name: &str, mode: FileMode) -> Result<()> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, true)?;
        if let Some(node) = &l.entry {
            if !node.lock().is_dir() {
                return Err(Error::NotDirectory);
            }
            if l.rest.is_empty() {
                return Ok(());
            }
        }

        let mode = if mode == 0 { DEFAULT_DIR_MODE } else { mode };
        let mut dir = MemNode::new(mode, Payload::Dir(HashMap::new()));
        attach(&l.parent, &l.name, dir.clone());
        for (elem, _) in path::entries(&l.rest) {
            let next = MemNode::new(mode, Payload::Dir(HashMap::new()));
            attach(&dir, elem, next.clone());
            dir = next;
        }
        tracing::debug!(dir = %name, "created directories");
        Ok(())
    }

    fn rename_sync(&self, old: &str, new: &str) -> Result<()> {
        let _ns = self.ns.lock();
        let a = self.lookup(old, false)?;
        let node = a.found()?.clone();
        if a.is_root() {
            return Err(Error::invalid_argument("cannot rename the root"));
        }

        let b = self.lookup(new, false)?;
        b.ensure_complete()?;
        if b.is_root() {
            return Err(Error::invalid_argument("cannot replace the root"));
        }

        if let Some(dst) = &b.entry {
            if Arc::ptr_eq(dst, &node) {
                return Ok(());
            }
            let src_is_dir = node.lock().is_dir();
            let dst = dst.lock();
            match (src_is_dir, dst.is_dir()) {
                (false, true) => return Err(Error::IsDirectory),
                (true, false) => return Err(Error::NotDirectory),
                (true, true) if !dst.is_empty_dir() => return Err(Error::DirectoryNotEmpty),
                _ => {}
            }
        }
        if b.ancestors.iter().any(|d| Arc::ptr_eq(d, &node)) {
            return Err(Error::invalid_argument("cannot move a directory into itself"));
        }

        detach(&a.parent, &a.name);
        attach(&b.parent, &b.name, node);
        tracing::debug!(from = %old, to = %new, "renamed");
        Ok(())
    }

    fn remove_sync(&self, name: &str) -> Result<()> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, false)?;
        let node = l.found()?;
        if l.is_root() {
            return Err(Error::invalid_argument("cannot remove the root"));
        }
        {
            let n = node.lock();
            if n.is_dir() && !n.is_empty_dir() {
                return Err(Error::DirectoryNotEmpty);
            }
        }
        detach(&l.parent, &l.name);
        Ok(())
    }

    fn link_sync(&self, old: &str, new: &str) -> Result<()> {
        let _ns = self.ns.lock();
        let a = self.lookup(old, true)?;
        let node = a.found()?.clone();
        if node.lock().is_dir() {
            return Err(Error::IsDirectory);
        }

        let b = self.lookup(new, false)?;
        b.ensure_vacant()?;
        attach(&b.parent, &b.name, node);
        Ok(())
    }

    fn symlink_sync(&self, target: &str, name: &str) -> Result<()> {
        let _ns = self.ns.lock();
        let l = self.lookup(name, false)?;
        l.ensure_vacant()?;
        let node = MemNode::new(SYMLINK_MODE, Payload::Symlink(target.to_string()));
        attach(&l.parent, &l.name, node);
        Ok(())
    }
}

#[async_trait]
impl Fs for MemFs {
    #[tracing::instrument(skip(self), name = "memfs.open_file")]
    async fn open_file(&self, name: &str, flag: OpenFlag, mode: FileMode) -> Result<Box<dyn File>> {
        self.open_file_sync(name, flag, mode)
            .map_err(|e| e.with_path("open", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.stat")]
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        self.stat_sync(name, true).map_err(|e| e.with_path("stat", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.lstat")]
    async fn lstat(&self, name: &str) -> Result<FileInfo> {
        self.stat_sync(name, false)
            .map_err(|e| e.with_path("lstat", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.read_dir")]
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        self.read_dir_sync(name)
            .map_err(|e| e.with_path("read_dir", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.read_link")]
    async fn read_link(&self, name: &str) -> Result<String> {
        self.read_link_sync(name)
            .map_err(|e| e.with_path("read_link", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.mkdir")]
    async fn mkdir(&self, name: &str, mode: FileMode) -> Result<()> {
        self.mkdir_sync(name, mode)
            .map_err(|e| e.with_path("mkdir", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.mkdir_all")]
    async fn mkdir_all(&self, name: &str, mode: FileMode) -> Result<()> {
        self.mkdir_all_sync(name, mode)
            .map_err(|e| e.with_path("mkdir", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.rename")]
    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.rename_sync(old, new)
            .map_err(|e| e.with_path("rename", old))
    }

    #[tracing::instrument(skip(self), name = "memfs.remove")]
    async fn remove(&self, name: &str) -> Result<()> {
        self.remove_sync(name)
            .map_err(|e| e.with_path("remove", name))
    }

    #[tracing::instrument(skip(self), name = "memfs.link")]
    async fn link(&self, old: &str, new: &str) -> Result<()> {
        self.link_sync(old, new).map_err(|e| e.with_path("link", old))
    }

    #[tracing::instrument(skip(self), name = "memfs.symlink")]
    async fn symlink(&self, target: &str, name: &str) -> Result<()> {
        self.symlink_sync(target, name)
            .map_err(|e| e.with_path("symlink", name))
    }
}
