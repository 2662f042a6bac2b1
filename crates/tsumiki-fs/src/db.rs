//! SQLite persistence for nodes and blocks.
//!
//! Two tables: `nodes` keyed by a surrogate id, with the kind-specific part
//! of a node (directory entries, block ids, link target) as a JSON payload,
//! and `blocks` holding file content. Every filesystem mutation runs inside
//! one transaction spanning both.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tsumiki_io::{Error, Result};

use crate::types::{DEFAULT_DIR_MODE, FileInfo, FileMode, FileType};

pub(crate) type NodeId = i64;
pub(crate) type BlockId = i64;

/// Id of the root directory, created with the schema.
pub(crate) const ROOT_NODE_ID: NodeId = 1;

const SCHEMA: &str = r#"
-- Files, directories and symbolic links
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mode INTEGER NOT NULL,
    mod_time INTEGER NOT NULL,
    num_link INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    cnt_readers INTEGER NOT NULL DEFAULT 0,
    cnt_writers INTEGER NOT NULL DEFAULT 0,
    payload TEXT NOT NULL
);

-- File content, one row per block
CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data BLOB NOT NULL
);
"#;

/// Kind-specific part of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Payload {
    File { blocks: Vec<BlockId> },
    Dir { entries: BTreeMap<String, NodeId> },
    Symlink { target: String },
}

/// A row of the `nodes` table.
#[derive(Debug, Clone)]
pub(crate) struct NodeRow {
    pub id: NodeId,
    pub mode: FileMode,
    pub mod_time: SystemTime,
    pub num_link: u64,
    /// Content length of a file; kept in step with its blocks.
    pub size: u64,
    pub readers: u64,
    pub writers: u64,
    pub payload: Payload,
}

impl NodeRow {
    /// A node not yet stored; `insert` assigns the id.
    pub fn new(mode: FileMode, payload: Payload) -> Self {
        Self {
            id: 0,
            mode,
            mod_time: SystemTime::now(),
            num_link: 0,
            size: 0,
            readers: 0,
            writers: 0,
            payload,
        }
    }

    pub fn file_type(&self) -> FileType {
        match self.payload {
            Payload::File { .. } => FileType::File,
            Payload::Dir { .. } => FileType::Directory,
            Payload::Symlink { .. } => FileType::Symlink,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.payload, Payload::Dir { .. })
    }

    pub fn is_empty_dir(&self) -> bool {
        matches!(&self.payload, Payload::Dir { entries } if entries.is_empty())
    }

    pub fn entries(&self) -> Option<&BTreeMap<String, NodeId>> {
        match &self.payload {
            Payload::Dir { entries } => Some(entries),
            _ => None,
        }
    }

    pub fn blocks(&self) -> Result<&[BlockId]> {
        match &self.payload {
            Payload::File { blocks } => Ok(blocks),
            _ => Err(Error::invalid_argument("not a regular file")),
        }
    }

    pub fn info(&self, name: &str) -> FileInfo {
        let size = match &self.payload {
            Payload::File { .. } => self.size,
            Payload::Dir { .. } => 0,
            Payload::Symlink { target } => target.len() as u64,
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

    /// Unlinked and not held open by any handle.
    pub fn is_orphan(&self) -> bool {
        self.id != ROOT_NODE_ID && self.num_link == 0 && self.readers == 0
    }
}

fn to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn from_millis(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

/// Database handle holding the filesystem.
pub(crate) struct NodeStore {
    conn: Mutex<Connection>,
}

impl NodeStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::storage)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(Error::storage)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.transact(|tx| {
            tx.ensure_root()?;
            tx.recover()
        })?;
        Ok(store)
    }

    /// Run `f` in a transaction, committing on success.
    ///
    /// Not reentrant: `f` must not call back into the store.
    pub fn transact<T>(&self, f: impl FnOnce(&Tx<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(Error::storage)?;
        let out = f(&Tx { conn: &*tx })?;
        tx.commit().map_err(Error::storage)?;
        Ok(out)
    }

    #[cfg(test)]
    pub fn count_rows(&self, table: &str) -> i64 {
        self.conn
            .lock()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }
}

/// Row-level access inside a transaction.
pub(crate) struct Tx<'a> {
    conn: &'a Connection,
}

impl Tx<'_> {
    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn get(&self, id: NodeId) -> Result<NodeRow> {
        let row = self
            .conn
            .query_row(
                "SELECT id, mode, mod_time, num_link, size, cnt_readers, cnt_writers, payload
                 FROM nodes WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(Error::storage)?;

        let Some((id, mode, mod_time, num_link, size, readers, writers, payload)) = row else {
            return Err(Error::NotExist);
        };
        Ok(NodeRow {
            id,
            mode: mode as FileMode,
            mod_time: from_millis(mod_time),
            num_link: num_link as u64,
            size: size as u64,
            readers: readers as u64,
            writers: writers as u64,
            payload: serde_json::from_str(&payload).map_err(Error::storage)?,
        })
    }

    /// Store a new node and return its id.
    pub fn insert(&self, node: &NodeRow) -> Result<NodeId> {
        let payload = serde_json::to_string(&node.payload).map_err(Error::storage)?;
        self.conn
            .execute(
                "INSERT INTO nodes (mode, mod_time, num_link, size, cnt_readers, cnt_writers, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    node.mode as i64,
                    to_millis(node.mod_time),
                    node.num_link as i64,
                    node.size as i64,
                    node.readers as i64,
                    node.writers as i64,
                    payload,
                ],
            )
            .map_err(Error::storage)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update(&self, node: &NodeRow) -> Result<()> {
        let payload = serde_json::to_string(&node.payload).map_err(Error::storage)?;
        self.conn
            .execute(
                "UPDATE nodes SET mode = ?1, mod_time = ?2, num_link = ?3, size = ?4,
                 cnt_readers = ?5, cnt_writers = ?6, payload = ?7 WHERE id = ?8",
                params![
                    node.mode as i64,
                    to_millis(node.mod_time),
                    node.num_link as i64,
                    node.size as i64,
                    node.readers as i64,
                    node.writers as i64,
                    payload,
                    node.id,
                ],
            )
            .map_err(Error::storage)?;
        Ok(())
    }

    /// Delete a node and the blocks it owns.
    pub fn delete(&self, node: &NodeRow) -> Result<()> {
        if let Payload::File { blocks } = &node.payload {
            self.delete_blocks(blocks)?;
        }
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![node.id])
            .map_err(Error::storage)?;
        tracing::debug!(node = node.id, "reclaimed node");
        Ok(())
    }

    /// Delete `node` if nothing references it any more.
    pub fn reclaim(&self, node: &NodeRow) -> Result<bool> {
        if !node.is_orphan() {
            return Ok(false);
        }
        self.delete(node)?;
        Ok(true)
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    pub fn load_block(&self, id: BlockId) -> Result<Vec<u8>> {
        self.conn
            .query_row("SELECT data FROM blocks WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .map_err(Error::storage)
    }

    pub fn block_len(&self, id: BlockId) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT length(data) FROM blocks WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .map_err(Error::storage)?;
        Ok(n as u64)
    }

    pub fn insert_block(&self, data: &[u8]) -> Result<BlockId> {
        self.conn
            .execute("INSERT INTO blocks (data) VALUES (?1)", params![data])
            .map_err(Error::storage)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_block(&self, id: BlockId, data: &[u8]) -> Result<()> {
        self.conn
            .execute("UPDATE blocks SET data = ?1 WHERE id = ?2", params![data, id])
            .map_err(Error::storage)?;
        Ok(())
    }

    pub fn delete_blocks(&self, ids: &[BlockId]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM blocks WHERE id = ?1")
            .map_err(Error::storage)?;
        for id in ids {
            stmt.execute(params![id]).map_err(Error::storage)?;
        }
        Ok(())
    }

    // ========================================================================
    // Startup
    // ========================================================================

    fn ensure_root(&self) -> Result<()> {
        let payload = serde_json::to_string(&Payload::Dir {
            entries: BTreeMap::new(),
        })
        .map_err(Error::storage)?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO nodes (id, mode, mod_time, num_link, payload)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    ROOT_NODE_ID,
                    DEFAULT_DIR_MODE as i64,
                    to_millis(SystemTime::now()),
                    payload
                ],
            )
            .map_err(Error::storage)?;
        Ok(())
    }

    /// Forget open counts left by a previous process and drop nodes that
    /// were only kept alive by them.
    fn recover(&self) -> Result<()> {
        self.conn
            .execute("UPDATE nodes SET cnt_readers = 0, cnt_writers = 0", [])
            .map_err(Error::storage)?;

        let ids: Vec<NodeId> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM nodes WHERE num_link = 0 AND id != ?1")
                .map_err(Error::storage)?;
            let rows = stmt
                .query_map(params![ROOT_NODE_ID], |row| row.get(0))
                .map_err(Error::storage)?;
            rows.collect::<rusqlite::Result<_>>()
                .map_err(Error::storage)?
        };
        for id in ids {
            let node = self.get(id)?;
            self.delete(&node)?;
        }
        Ok(())
    }
}
