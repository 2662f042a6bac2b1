//! Error taxonomy shared by buffers, streams and filesystems.

use std::io;
use thiserror::Error;

/// I/O error type.
///
/// Every failure in the workspace is one of these kinds. Filesystem
/// operations wrap the kind in [`Error::Path`] so callers can see which
/// operation and which path failed; [`Error::kind`] looks through the wrapper.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad parameter, e.g. a length larger than the requested capacity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Out-of-bounds slice or seek.
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("file does not exist")]
    NotExist,

    #[error("file already exists")]
    Exist,

    #[error("is a directory")]
    IsDirectory,

    #[error("not a directory")]
    NotDirectory,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    /// Another writer holds the file.
    #[error("file is busy")]
    Busy,

    #[error("read-only file")]
    ReadOnly,

    /// Destination smaller than the requested minimum.
    #[error("short buffer")]
    ShortBuffer,

    /// A writer accepted fewer bytes than it was given.
    #[error("short write")]
    ShortWrite,

    /// A writer reported more bytes than it was given.
    #[error("invalid write result")]
    InvalidWrite,

    /// A reader kept returning zero bytes without reaching end-of-data.
    #[error("multiple reads returned no data")]
    NoProgress,

    /// Symbolic link resolution exceeded the hop budget.
    #[error("too many levels of symbolic links")]
    Loop,

    /// Operation not implemented by this backend or decorator.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Operation on a handle that was already closed.
    #[error("file already closed")]
    Closed,

    /// An error annotated with the failing operation and path.
    #[error("{op} {path}: {source}")]
    Path {
        op: &'static str,
        path: String,
        source: Box<Error>,
    },

    /// Backend storage failure.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Error kinds, independent of any path annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    OutOfRange,
    NotExist,
    Exist,
    IsDirectory,
    NotDirectory,
    DirectoryNotEmpty,
    Busy,
    ReadOnly,
    ShortBuffer,
    ShortWrite,
    InvalidWrite,
    NoProgress,
    Loop,
    Unsupported,
    Closed,
    Storage,
    Io,
}

impl Error {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::Unsupported(op.into())
    }

    /// Wrap a backend storage error.
    pub fn storage(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage(e.into())
    }

    /// The kind of this error, looking through path annotations.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::OutOfRange(_) => ErrorKind::OutOfRange,
            Error::NotExist => ErrorKind::NotExist,
            Error::Exist => ErrorKind::Exist,
            Error::IsDirectory => ErrorKind::IsDirectory,
            Error::NotDirectory => ErrorKind::NotDirectory,
            Error::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty,
            Error::Busy => ErrorKind::Busy,
            Error::ReadOnly => ErrorKind::ReadOnly,
            Error::ShortBuffer => ErrorKind::ShortBuffer,
            Error::ShortWrite => ErrorKind::ShortWrite,
            Error::InvalidWrite => ErrorKind::InvalidWrite,
            Error::NoProgress => ErrorKind::NoProgress,
            Error::Loop => ErrorKind::Loop,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Closed => ErrorKind::Closed,
            Error::Path { source, .. } => source.kind(),
            Error::Storage(_) => ErrorKind::Storage,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Annotate with an operation and path.
    ///
    /// An error that already carries a path is returned unchanged, so the
    /// innermost (most precise) path wins.
    pub fn with_path(self, op: &'static str, path: impl Into<String>) -> Self {
        match self {
            Error::Path { .. } => self,
            source => Error::Path {
                op,
                path: path.into(),
                source: Box::new(source),
            },
        }
    }

    /// The annotated path, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Path { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Replace the annotated path. No-op for unannotated errors.
    pub fn set_path(&mut self, new_path: impl Into<String>) {
        if let Error::Path { path, .. } = self {
            *path = new_path.into();
        }
    }
}

/// Convert Error to std::io::Error for compatibility.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match e.kind() {
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::OutOfRange => io::ErrorKind::InvalidInput,
            ErrorKind::NotExist => io::ErrorKind::NotFound,
            ErrorKind::Exist => io::ErrorKind::AlreadyExists,
            ErrorKind::IsDirectory => io::ErrorKind::IsADirectory,
            ErrorKind::NotDirectory => io::ErrorKind::NotADirectory,
            ErrorKind::DirectoryNotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::Busy => io::ErrorKind::ResourceBusy,
            ErrorKind::ReadOnly => io::ErrorKind::PermissionDenied,
            ErrorKind::ShortBuffer => io::ErrorKind::InvalidInput,
            ErrorKind::ShortWrite => io::ErrorKind::WriteZero,
            ErrorKind::InvalidWrite => io::ErrorKind::InvalidData,
            ErrorKind::NoProgress => io::ErrorKind::UnexpectedEof,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::Io => match e {
                Error::Io(inner) => return inner,
                _ => io::ErrorKind::Other,
            },
            ErrorKind::Loop | ErrorKind::Closed | ErrorKind::Storage => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// I/O result type.
pub type Result<T> = std::result::Result<T, Error>;
