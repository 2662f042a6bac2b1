//! Filesystem metadata types.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tsumiki_io::Result;

/// Unix permission bits, e.g. `0o644`.
pub type FileMode = u32;

/// Mode for files created without an explicit mode.
pub const DEFAULT_FILE_MODE: FileMode = 0o644;

/// Mode for directories created without an explicit mode.
pub const DEFAULT_DIR_MODE: FileMode = 0o755;

/// Mode of every symbolic link.
pub const SYMLINK_MODE: FileMode = 0o777;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// File metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Base name of the file.
    pub name: String,
    /// Size in bytes. For symbolic links, the length of the target.
    pub size: u64,
    /// Unix permissions.
    pub mode: FileMode,
    /// Last modification time.
    pub mod_time: SystemTime,
    pub file_type: FileType,
    /// Number of directory entries naming this node.
    pub num_link: u64,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type.is_symlink()
    }
}

bitflags! {
    /// Flags for [`Fs::open_file`](crate::Fs::open_file).
    ///
    /// Flags are independent bits; the combinations that matter are
    /// described on `open_file`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlag: u32 {
        /// Writes always go to the end; reads see nothing.
        const APPEND = 1;
        /// The file must exist.
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        /// Discard existing content.
        const TRUNC = 1 << 3;
        /// Start with the cursor at the end.
        const AT_END = 1 << 4;
        /// With `WRITE`, fail if the file exists.
        const NO_REPLACE = 1 << 5;
    }
}

/// Fetches metadata for a directory entry on demand.
pub(crate) type InfoFn = Arc<dyn Fn() -> Result<FileInfo> + Send + Sync>;

/// Entry yielded by [`Fs::read_dir`](crate::Fs::read_dir).
#[derive(Clone)]
pub struct DirEntry {
    name: String,
    file_type: FileType,
    info: InfoFn,
}

impl DirEntry {
    pub(crate) fn new(name: impl Into<String>, file_type: FileType, info: InfoFn) -> Self {
        Self {
            name: name.into(),
            file_type,
            info,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    /// Current metadata of the entry. Each call fetches afresh.
    pub async fn info(&self) -> Result<FileInfo> {
        (self.info)()
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &self.name)
            .field("file_type", &self.file_type)
            .finish_non_exhaustive()
    }
}
