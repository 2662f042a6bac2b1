//! # tsumiki-fs
//!
//! A virtual filesystem that stores file content as a chain of fixed-size
//! blocks.
//!
//! - [`Fs`]: the filesystem trait, with [`MemFs`] and [`SqlFs`] backends
//! - [`File`] / [`ReadOnlyFile`]: open handles, built on `tsumiki-io`'s
//!   capability traits
//! - [`SubFs`]: a view rooted at a subdirectory
//! - [`Config`]: pick and open a backend from TOML
//!
//! Both backends share path resolution (symbolic links included) and the
//! open-flag semantics described on [`Fs::open_file`].

pub mod backends;
pub mod block;
pub mod config;
mod cursor;
mod db;
mod open;
pub mod ops;
mod resolve;
pub mod sub;
pub mod types;

pub use backends::{MemFs, SqlFs};
pub use block::{BLOCK_SIZE, Block};
pub use config::{Backend, Config, ConfigError};
pub use cursor::AccessMode;
pub use ops::{File, Fs, ReadOnlyFile};
pub use resolve::MAX_SYMLINK_HOPS;
pub use sub::{SubFs, sub};
pub use types::{
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DirEntry, FileInfo, FileMode, FileType, OpenFlag,
    SYMLINK_MODE,
};
