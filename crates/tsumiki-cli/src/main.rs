//! tsumiki: command-line access to a tsumiki filesystem.
//!
//! Usage:
//!   # SQLite database in the current directory (default: tsumiki.db)
//!   tsumiki mkdir -p docs/notes
//!   echo hello | tsumiki put - docs/notes/hi.txt
//!   tsumiki cat docs/notes/hi.txt
//!
//!   # Backend and root from a config file
//!   tsumiki --config tsumiki.toml ls -l docs
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see filesystem activity.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use tsumiki_fs::{Config, FileInfo, FileMode, FileType, Fs};
use tsumiki_io::{Closer, ReadCompat, Reader, WriteCompat, Writer, copy};

/// Inspect and edit a tsumiki filesystem.
#[derive(Parser, Debug)]
#[command(name = "tsumiki")]
#[command(about = "Inspect and edit a tsumiki filesystem")]
struct Args {
    /// TOML config naming the backend
    #[arg(short, long, conflicts_with = "memory")]
    config: Option<PathBuf>,

    /// SQLite database file, created if missing
    #[arg(long, default_value = "tsumiki.db", conflicts_with_all = ["config", "memory"])]
    db: PathBuf,

    /// Use a throwaway in-memory filesystem
    #[arg(long)]
    memory: bool,

    /// Expose only this directory of the filesystem
    #[arg(long)]
    root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: String,
        /// Show type, mode, links and size
        #[arg(short, long)]
        long: bool,
    },
    /// Print a file
    Cat { path: String },
    /// Copy a local file into the filesystem (`-` reads stdin)
    Put { local: String, path: String },
    /// Copy a file out of the filesystem (`-` writes stdout)
    Get { path: String, local: String },
    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parents too
        #[arg(short, long)]
        parents: bool,
        /// Permission bits, in octal
        #[arg(short, long, value_parser = parse_mode, default_value = "755")]
        mode: FileMode,
    },
    /// Remove a file, link or empty directory
    Rm { path: String },
    /// Rename or move
    Mv { old: String, new: String },
    /// Make a link named NAME to TARGET
    Ln {
        target: String,
        name: String,
        /// Make a symbolic link instead of a hard link
        #[arg(short, long)]
        symbolic: bool,
    },
    /// Show metadata
    Stat {
        path: String,
        /// Describe a final symbolic link itself
        #[arg(long)]
        no_follow: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print the target of a symbolic link
    Readlink { path: String },
}

impl Args {
    fn config(&self) -> Result<Config> {
        let mut config = if let Some(path) = &self.config {
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        } else if self.memory {
            Config::default()
        } else {
            Config::sqlite(self.db.clone())
        };
        if self.root.is_some() {
            config.root = self.root.clone();
        }
        Ok(config)
    }
}

fn parse_mode(s: &str) -> Result<FileMode, String> {
    FileMode::from_str_radix(s, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.config()?;
    tracing::debug!(?config, "opening filesystem");
    let fs = config.open()?;

    run(fs.as_ref(), args.command).await
}

async fn run(fs: &dyn Fs, command: Command) -> Result<()> {
    match command {
        Command::Ls { path, long } => print!("{}", ls(fs, &path, long).await?),
        Command::Cat { path } => {
            let mut out = WriteCompat::new(tokio::io::stdout());
            cat(fs, &path, &mut out).await?;
            out.close().await?;
        }
        Command::Put { local, path } => {
            let n = if local == "-" {
                put(fs, &mut ReadCompat::new(tokio::io::stdin()), &path).await?
            } else {
                let file = tokio::fs::File::open(&local)
                    .await
                    .with_context(|| format!("opening {local}"))?;
                put(fs, &mut ReadCompat::new(file), &path).await?
            };
            tracing::info!(path = %path, bytes = n, "stored");
        }
        Command::Get { path, local } => {
            if local == "-" {
                let mut out = WriteCompat::new(tokio::io::stdout());
                cat(fs, &path, &mut out).await?;
                out.close().await?;
            } else {
                let file = tokio::fs::File::create(&local)
                    .await
                    .with_context(|| format!("creating {local}"))?;
                let mut out = WriteCompat::new(file);
                let n = cat(fs, &path, &mut out).await?;
                out.close().await?;
                tracing::info!(path = %path, bytes = n, "fetched");
            }
        }
        Command::Mkdir {
            path,
            parents,
            mode,
        } => {
            if parents {
                fs.mkdir_all(&path, mode).await?;
            } else {
                fs.mkdir(&path, mode).await?;
            }
        }
        Command::Rm { path } => fs.remove(&path).await?,
        Command::Mv { old, new } => fs.rename(&old, &new).await?,
        Command::Ln {
            target,
            name,
            symbolic,
        } => {
            if symbolic {
                fs.symlink(&target, &name).await?;
            } else {
                fs.link(&target, &name).await?;
            }
        }
        Command::Stat {
            path,
            no_follow,
            json,
        } => print!("{}", stat(fs, &path, !no_follow, json).await?),
        Command::Readlink { path } => println!("{}", fs.read_link(&path).await?),
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn ls(fs: &dyn Fs, path: &str, long: bool) -> Result<String> {
    let mut entries = fs.read_dir(path).await?;
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    let mut out = String::new();
    for e in entries {
        if long {
            writeln!(out, "{}", long_line(&e.info().await?))?;
        } else if e.is_dir() {
            writeln!(out, "{}/", e.name())?;
        } else {
            writeln!(out, "{}", e.name())?;
        }
    }
    Ok(out)
}

fn long_line(info: &FileInfo) -> String {
    let kind = match info.file_type {
        FileType::File => '-',
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
    };
    format!(
        "{kind}{:04o} {:>3} {:>10} {}",
        info.mode, info.num_link, info.size, info.name
    )
}

/// Copy `path` into `out`, returning the byte count.
async fn cat<W: Writer + ?Sized>(fs: &dyn Fs, path: &str, out: &mut W) -> Result<u64> {
    let mut f = fs.open(path).await?;
    let n = copy(out, &mut f).await?;
    f.close().await?;
    Ok(n)
}

/// Replace `path` with everything `src` yields.
async fn put<R: Reader + ?Sized>(fs: &dyn Fs, src: &mut R, path: &str) -> Result<u64> {
    let mut f = fs.create(path).await?;
    let n = copy(&mut f, src).await?;
    f.close().await?;
    Ok(n)
}

async fn stat(fs: &dyn Fs, path: &str, follow: bool, json: bool) -> Result<String> {
    let info = if follow {
        fs.stat(path).await?
    } else {
        fs.lstat(path).await?
    };
    if json {
        return Ok(serde_json::to_string_pretty(&info)? + "\n");
    }

    let modified = info
        .mod_time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let mut out = String::new();
    writeln!(out, "    name: {}", info.name)?;
    writeln!(out, "    type: {}", info.file_type)?;
    writeln!(out, "    size: {}", info.size)?;
    writeln!(out, "    mode: {:04o}", info.mode)?;
    writeln!(out, "   links: {}", info.num_link)?;
    writeln!(out, "modified: {modified}")?;
    Ok(out)
}
