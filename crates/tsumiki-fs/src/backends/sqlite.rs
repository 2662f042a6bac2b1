//! SQLite-backed filesystem.
//!
//! Namespace operations run on the blocking pool, one transaction each.
//! Open handles cache one block and write it back when the cursor leaves
//! it or the handle closes.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::runtime::{Handle, RuntimeFlavor};
use tsumiki_io::{Error, Result, path};

use crate::cursor::{AccessMode, BlockSource, DirHandle, FileHandle};
use crate::db::{NodeId, NodeRow, NodeStore, Payload, ROOT_NODE_ID, Tx};
use crate::ops::{File, Fs};
use crate::open::{self, Plan, Target};
use crate::resolve::{Lookup, Step, Walk, resolve};
use crate::types::{
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DirEntry, FileInfo, FileMode, OpenFlag, SYMLINK_MODE,
};

impl Walk for Tx<'_> {
    type Node = NodeRow;

    fn root(&self) -> Result<NodeRow> {
        self.get(ROOT_NODE_ID)
    }

    fn child(&self, dir: &NodeRow, name: &str) -> Result<Option<NodeRow>> {
        match dir.entries().and_then(|e| e.get(name)) {
            Some(&id) => self.get(id).map(Some),
            None => Ok(None),
        }
    }

    fn step(&self, node: &NodeRow) -> Result<Step> {
        Ok(match &node.payload {
            Payload::Dir { .. } => Step::Dir,
            Payload::Symlink { target } => Step::Link(target.clone()),
            Payload::File { .. } => Step::Leaf,
        })
    }
}

/// Link node `child` under `name` in directory `parent`.
///
/// A node displaced from `name` loses a link and is reclaimed if nothing
/// else holds it.
fn attach(tx: &Tx<'_>, parent: NodeId, name: &str, child: NodeId) -> Result<()> {
    let mut node = tx.get(child)?;
    node.num_link += 1;
    tx.update(&node)?;

    let mut dir = tx.get(parent)?;
    let Payload::Dir { entries } = &mut dir.payload else {
        return Err(Error::NotDirectory);
    };
    let displaced = entries.insert(name.to_string(), child);
    dir.mod_time = SystemTime::now();
    tx.update(&dir)?;

    if let Some(id) = displaced {
        unlinked(tx, id)?;
    }
    Ok(())
}

/// Unlink `name` from directory `parent`.
fn detach(tx: &Tx<'_>, parent: NodeId, name: &str) -> Result<()> {
    let mut dir = tx.get(parent)?;
    let Payload::Dir { entries } = &mut dir.payload else {
        return Err(Error::NotDirectory);
    };
    let removed = entries.remove(name);
    dir.mod_time = SystemTime::now();
    tx.update(&dir)?;

    if let Some(id) = removed {
        unlinked(tx, id)?;
    }
    Ok(())
}

fn unlinked(tx: &Tx<'_>, id: NodeId) -> Result<()> {
    let mut node = tx.get(id)?;
    node.num_link = node.num_link.saturating_sub(1);
    if !tx.reclaim(&node)? {
        tx.update(&node)?;
    }
    Ok(())
}

/// Run synchronous database work reached from async code.
///
/// Handle I/O and lazy entry info run inside tasks. On a multi-thread
/// runtime the worker is handed off first; anywhere else `f` runs inline.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Block storage of an open file, read and written through the database.
struct SqlSource {
    db: Arc<NodeStore>,
    id: NodeId,
}

impl SqlSource {
    fn transact<T>(&self, f: impl FnOnce(&Tx<'_>) -> Result<T>) -> Result<T> {
        off_worker(|| self.db.transact(f))
    }
}

impl BlockSource for SqlSource {
    const WRITE_THROUGH: bool = false;

    fn block_count(&self) -> Result<usize> {
        self.transact(|tx| Ok(tx.get(self.id)?.blocks()?.len()))
    }

    fn size(&self) -> Result<u64> {
        self.transact(|tx| Ok(tx.get(self.id)?.size))
    }

    fn load(&self, index: usize) -> Result<Vec<u8>> {
        self.transact(|tx| {
            let node = tx.get(self.id)?;
            let Some(&block) = node.blocks()?.get(index) else {
                return Err(Error::out_of_range(format!("block {index}")));
            };
            tx.load_block(block)
        })
    }

    fn store(&mut self, index: usize, data: &[u8]) -> Result<()> {
        self.transact(|tx| {
            let mut node = tx.get(self.id)?;
            let blocks = node.blocks()?.to_vec();
            let new_len = data.len() as u64;

            if let Some(&block) = blocks.get(index) {
                let old_len = tx.block_len(block)?;
                tx.update_block(block, data)?;
                node.size = node.size.saturating_sub(old_len) + new_len;
            } else if index == blocks.len() {
                let block = tx.insert_block(data)?;
                if let Payload::File { blocks } = &mut node.payload {
                    blocks.push(block);
                }
                node.size += new_len;
            } else {
                return Err(Error::out_of_range(format!("block {index}")));
            }

            node.mod_time = SystemTime::now();
            tx.update(&node)
        })
    }

    fn info(&self, name: &str) -> Result<FileInfo> {
        self.transact(|tx| Ok(tx.get(self.id)?.info(name)))
    }

    fn release(&mut self, mode: AccessMode) -> Result<()> {
        self.transact(|tx| {
            let mut node = tx.get(self.id)?;
            node.readers = node.readers.saturating_sub(1);
            if mode.is_writer() {
                node.writers = node.writers.saturating_sub(1);
            }
            if !tx.reclaim(&node)? {
                tx.update(&node)?;
            }
            Ok(())
        })
    }
}

/// Filesystem persisted in a SQLite database.
///
/// Cheap to clone; clones share the database connection.
#[derive(Clone)]
pub struct SqlFs {
    store: Arc<NodeStore>,
}

impl std::fmt::Debug for SqlFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlFs").finish_non_exhaustive()
    }
}

impl SqlFs {
    /// Open or create a filesystem in the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = NodeStore::open(path)?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Create a filesystem in a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            store: Arc::new(NodeStore::in_memory()?),
        })
    }

    /// Run `f` against the store on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<NodeStore>) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(Error::storage)?
    }
}

fn lookup(tx: &Tx<'_>, name: &str, follow_last: bool) -> Result<Lookup<NodeRow>> {
    resolve(tx, name, follow_last)
}

// ============================================================================
// Operations, each inside one transaction
// ============================================================================

enum Opened {
    Dir(FileInfo),
    File {
        id: NodeId,
        name: String,
        mode: AccessMode,
    },
}

fn open_file(store: &Arc<NodeStore>, name: &str, flag: OpenFlag, mode: FileMode) -> Result<Box<dyn File>> {
    let opened = store.transact(|tx| {
        let l = lookup(tx, name, true)?;
        l.ensure_complete()?;

        let target = match &l.entry {
            None => Target::Absent,
            Some(node) => match node.payload {
                Payload::Dir { .. } => Target::Dir,
                Payload::File { .. } => Target::File {
                    writers: node.writers as usize,
                },
                Payload::Symlink { .. } => return Err(Error::NotExist),
            },
        };
        let plan = open::plan(flag, target)?;

        let mut node = match plan {
            Plan::Dir => return Ok(Opened::Dir(l.found()?.info(&l.name))),
            Plan::Create(_) | Plan::Replace(_) => {
                let mode = if mode == 0 { DEFAULT_FILE_MODE } else { mode };
                let block = tx.insert_block(&[])?;
                let id = tx.insert(&NodeRow::new(mode, Payload::File { blocks: vec![block] }))?;
                attach(tx, l.parent.id, &l.name, id)?;
                tracing::debug!(file = %l.name, node = id, "created file");
                tx.get(id)?
            }
            Plan::Existing { trunc, .. } => {
                let mut node = l.found()?.clone();
                if trunc {
                    tx.delete_blocks(node.blocks()?)?;
                    node.payload = Payload::File {
                        blocks: vec![tx.insert_block(&[])?],
                    };
                    node.size = 0;
                    node.mod_time = SystemTime::now();
                }
                node
            }
        };

        let access = plan.mode();
        node.readers += 1;
        if access.is_writer() {
            node.writers += 1;
        }
        tx.update(&node)?;
        Ok(Opened::File {
            id: node.id,
            name: l.name,
            mode: access,
        })
    })?;

    match opened {
        Opened::Dir(info) => Ok(Box::new(DirHandle::new(info))),
        Opened::File { id, name, mode } => {
            let src = SqlSource {
                db: store.clone(),
                id,
            };
            let at_end = flag.contains(OpenFlag::AT_END);
            Ok(Box::new(FileHandle::new(src, name, mode, at_end)?))
        }
    }
}

fn stat(store: &Arc<NodeStore>, name: &str, follow_last: bool) -> Result<FileInfo> {
    store.transact(|tx| {
        let l = lookup(tx, name, follow_last)?;
        Ok(l.found()?.info(&l.name))
    })
}

fn read_dir(store: &Arc<NodeStore>, name: &str) -> Result<Vec<DirEntry>> {
    let children = store.transact(|tx| {
        let l = lookup(tx, name, true)?;
        let Some(entries) = l.found()?.entries() else {
            return Err(Error::NotDirectory);
        };
        entries
            .iter()
            .map(|(n, &id)| tx.get(id).map(|node| (n.clone(), id, node.file_type())))
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(children
        .into_iter()
        .map(|(n, id, file_type)| {
            let store = store.clone();
            let name = n.clone();
            DirEntry::new(
                n,
                file_type,
                Arc::new(move || {
                    off_worker(|| store.transact(|tx| Ok(tx.get(id)?.info(&name))))
                }),
            )
        })
        .collect())
}

fn read_link(store: &Arc<NodeStore>, name: &str) -> Result<String> {
    store.transact(|tx| {
        let l = lookup(tx, name, false)?;
        match &l.found()?.payload {
            Payload::Symlink { target } => Ok(target.clone()),
            _ => Err(Error::invalid_argument("not a symbolic link")),
        }
    })
}

fn new_dir(tx: &Tx<'_>, parent: NodeId, name: &str, mode: FileMode) -> Result<NodeId> {
    let payload = Payload::Dir {
        entries: Default::default(),
    };
    let mode = if mode == 0 { DEFAULT_DIR_MODE } else { mode };
    let id = tx.insert(&NodeRow::new(mode, payload))?;
    attach(tx, parent, name, id)?;
    Ok(id)
}

fn mkdir(store: &Arc<NodeStore>, name: &str, mode: FileMode) -> Result<()> {
    store.transact(|tx| {
        let l = lookup(tx, name, false)?;
        l.ensure_vacant()?;
        new_dir(tx, l.parent.id, &l.name, mode)?;
        Ok(())
    })
}

fn mkdir_all(store: &Arc<NodeStore>, name: &str, mode: FileMode) -> Result<()> {
    store.transact(|tx| {
        let l = lookup(tx, name, true)?;
        if let Some(node) = &l.entry {
            if !node.is_dir() {
                return Err(Error::NotDirectory);
            }
            if l.rest.is_empty() {
                return Ok(());
            }
        }

        let mut dir = new_dir(tx, l.parent.id, &l.name, mode)?;
        for (elem, _) in path::entries(&l.rest) {
            dir = new_dir(tx, dir, elem, mode)?;
        }
        tracing::debug!(dir = %name, "created directories");
        Ok(())
    })
}

fn rename(store: &Arc<NodeStore>, old: &str, new: &str) -> Result<()> {
    store.transact(|tx| {
        let a = lookup(tx, old, false)?;
        let node = a.found()?;
        if a.is_root() {
            return Err(Error::invalid_argument("cannot rename the root"));
        }

        let b = lookup(tx, new, false)?;
        b.ensure_complete()?;
        if b.is_root() {
            return Err(Error::invalid_argument("cannot replace the root"));
        }

        if let Some(dst) = &b.entry {
            if dst.id == node.id {
                return Ok(());
            }
            match (node.is_dir(), dst.is_dir()) {
                (false, true) => return Err(Error::IsDirectory),
                (true, false) => return Err(Error::NotDirectory),
                (true, true) if !dst.is_empty_dir() => return Err(Error::DirectoryNotEmpty),
                _ => {}
            }
        }
        if b.ancestors.iter().any(|d| d.id == node.id) {
            return Err(Error::invalid_argument("cannot move a directory into itself"));
        }

        // Link first so the node never drops to zero links mid-move.
        attach(tx, b.parent.id, &b.name, node.id)?;
        detach(tx, a.parent.id, &a.name)?;
        tracing::debug!(from = %old, to = %new, node = node.id, "renamed");
        Ok(())
    })
}

fn remove(store: &Arc<NodeStore>, name: &str) -> Result<()> {
    store.transact(|tx| {
        let l = lookup(tx, name, false)?;
        let node = l.found()?;
        if l.is_root() {
            return Err(Error::invalid_argument("cannot remove the root"));
        }
        if node.is_dir() && !node.is_empty_dir() {
            return Err(Error::DirectoryNotEmpty);
        }
        detach(tx, l.parent.id, &l.name)
    })
}

fn link(store: &Arc<NodeStore>, old: &str, new: &str) -> Result<()> {
    store.transact(|tx| {
        let a = lookup(tx, old, true)?;
        let node = a.found()?;
        if node.is_dir() {
            return Err(Error::IsDirectory);
        }

        let b = lookup(tx, new, false)?;
        b.ensure_vacant()?;
        attach(tx, b.parent.id, &b.name, node.id)
    })
}

fn symlink(store: &Arc<NodeStore>, target: &str, name: &str) -> Result<()> {
    store.transact(|tx| {
        let l = lookup(tx, name, false)?;
        l.ensure_vacant()?;
        let payload = Payload::Symlink {
            target: target.to_string(),
        };
        let id = tx.insert(&NodeRow::new(SYMLINK_MODE, payload))?;
        attach(tx, l.parent.id, &l.name, id)
    })
}

#[async_trait]
impl Fs for SqlFs {
    #[tracing::instrument(skip(self), name = "sqlfs.open_file")]
    async fn open_file(&self, name: &str, flag: OpenFlag, mode: FileMode) -> Result<Box<dyn File>> {
        let owned = name.to_string();
        self.blocking(move |s| open_file(s, &owned, flag, mode))
            .await
            .map_err(|e| e.with_path("open", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.stat")]
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        let owned = name.to_string();
        self.blocking(move |s| stat(s, &owned, true))
            .await
            .map_err(|e| e.with_path("stat", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.lstat")]
    async fn lstat(&self, name: &str) -> Result<FileInfo> {
        let owned = name.to_string();
        self.blocking(move |s| stat(s, &owned, false))
            .await
            .map_err(|e| e.with_path("lstat", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.read_dir")]
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        let owned = name.to_string();
        self.blocking(move |s| read_dir(s, &owned))
            .await
            .map_err(|e| e.with_path("read_dir", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.read_link")]
    async fn read_link(&self, name: &str) -> Result<String> {
        let owned = name.to_string();
        self.blocking(move |s| read_link(s, &owned))
            .await
            .map_err(|e| e.with_path("read_link", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.mkdir")]
    async fn mkdir(&self, name: &str, mode: FileMode) -> Result<()> {
        let owned = name.to_string();
        self.blocking(move |s| mkdir(s, &owned, mode))
            .await
            .map_err(|e| e.with_path("mkdir", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.mkdir_all")]
    async fn mkdir_all(&self, name: &str, mode: FileMode) -> Result<()> {
        let owned = name.to_string();
        self.blocking(move |s| mkdir_all(s, &owned, mode))
            .await
            .map_err(|e| e.with_path("mkdir", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.rename")]
    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let (a, b) = (old.to_string(), new.to_string());
        self.blocking(move |s| rename(s, &a, &b))
            .await
            .map_err(|e| e.with_path("rename", old))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.remove")]
    async fn remove(&self, name: &str) -> Result<()> {
        let owned = name.to_string();
        self.blocking(move |s| remove(s, &owned))
            .await
            .map_err(|e| e.with_path("remove", name))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.link")]
    async fn link(&self, old: &str, new: &str) -> Result<()> {
        let (a, b) = (old.to_string(), new.to_string());
        self.blocking(move |s| link(s, &a, &b))
            .await
            .map_err(|e| e.with_path("link", old))
    }

    #[tracing::instrument(skip(self), name = "sqlfs.symlink")]
    async fn symlink(&self, target: &str, name: &str) -> Result<()> {
        let (t, n) = (target.to_string(), name.to_string());
        self.blocking(move |s| symlink(s, &t, &n))
            .await
            .map_err(|e| e.with_path("symlink", name))
    }
}
