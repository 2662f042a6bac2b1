//! Open-flag semantics, shared by the backends.

use tsumiki_io::{Error, Result};

use crate::cursor::AccessMode;
use crate::types::OpenFlag;

/// What `open_file` found at the resolved path.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target {
    Absent,
    Dir,
    File { writers: usize },
}

/// What `open_file` should do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Hand out a directory handle.
    Dir,
    /// Link a new empty file under the name.
    Create(AccessMode),
    /// Link a new empty file in place of the existing one.
    Replace(AccessMode),
    /// Open the existing file, optionally discarding its content.
    Existing { mode: AccessMode, trunc: bool },
}

impl Plan {
    pub fn mode(&self) -> AccessMode {
        match *self {
            Plan::Dir => AccessMode::ReadOnly,
            Plan::Create(mode) | Plan::Replace(mode) => mode,
            Plan::Existing { mode, .. } => mode,
        }
    }
}

/// Decide how to open `target` with `flag`. Empty flags mean `READ`.
pub(crate) fn plan(flag: OpenFlag, target: Target) -> Result<Plan> {
    let flag = if flag.is_empty() { OpenFlag::READ } else { flag };
    let writer = if flag.contains(OpenFlag::APPEND) {
        AccessMode::Append
    } else {
        AccessMode::ReadWrite
    };

    match target {
        Target::Dir => {
            if flag.intersects(OpenFlag::WRITE | OpenFlag::TRUNC) {
                return Err(Error::IsDirectory);
            }
            Ok(Plan::Dir)
        }
        Target::Absent => {
            if flag.contains(OpenFlag::READ) || !flag.contains(OpenFlag::WRITE) {
                return Err(Error::NotExist);
            }
            Ok(Plan::Create(writer))
        }
        Target::File { writers } => {
            let access = OpenFlag::READ | OpenFlag::WRITE | OpenFlag::APPEND | OpenFlag::TRUNC;
            // Plain WRITE links a fresh file, so it never contends. Everything
            // else, readers included, waits for the writer to close.
            if writers > 0 && flag & access != OpenFlag::WRITE {
                return Err(Error::Busy);
            }
            let wflag = flag & (OpenFlag::WRITE | OpenFlag::APPEND | OpenFlag::TRUNC);
            if flag.contains(OpenFlag::WRITE | OpenFlag::NO_REPLACE) {
                return Err(Error::Exist);
            }
            if wflag.is_empty() {
                return Ok(Plan::Existing {
                    mode: AccessMode::ReadOnly,
                    trunc: false,
                });
            }
            if !flag.intersects(OpenFlag::READ | OpenFlag::APPEND | OpenFlag::TRUNC) {
                return Ok(Plan::Replace(writer));
            }
            Ok(Plan::Existing {
                mode: writer,
                trunc: flag.contains(OpenFlag::TRUNC),
            })
        }
    }
}
