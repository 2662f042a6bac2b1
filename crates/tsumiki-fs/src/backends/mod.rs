//! Filesystem backends.
//!
//! - `memory`: nodes held in process memory
//! - `sqlite`: nodes and blocks persisted in a SQLite database

pub mod memory;
pub mod sqlite;

pub use memory::MemFs;
pub use sqlite::SqlFs;
