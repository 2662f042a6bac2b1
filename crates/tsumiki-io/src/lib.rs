//! tsumiki-io: span-based I/O primitives.
//!
//! - [`Span`]: a window over a shared, growable byte store
//! - [`Buff`]: a growable buffer that is both a [`Reader`] and a [`Writer`]
//! - capability traits: [`Reader`], [`Writer`], [`Seeker`], [`Closer`]
//! - combinators in [`util`], path strings in [`path`]
//! - tokio adapters in [`compat`]

pub mod buff;
pub mod compat;
pub mod error;
pub mod ops;
pub mod path;
pub mod span;
pub mod util;

pub use buff::Buff;
pub use compat::{ReadCompat, WriteCompat};
pub use error::{Error, ErrorKind, Result};
pub use ops::{Closer, Reader, Seeker, Writer};
pub use span::{SMALL_BUFFER_SIZE, Span};
pub use util::{
    COPY_BUFFER_SIZE, LimitedReader, MAX_EMPTY_READS, TeeReader, copy, copy_buffer, gulp, limit,
    read_all, read_at_least, read_full, tee,
};
