//! Error types for the backup engine.
//!
//! Component errors carry the failing path and the underlying OS error so
//! diagnostics can name both. Only [`ReconcileError`] aborts a run; everything
//! wrapped in [`EntryError`] is logged and the walk moves on.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Byte copier failures
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("cannot open source {}: {source}", path.display())]
    SourceUnreadable { path: PathBuf, source: io::Error },

    #[error("cannot open destination {}: {source}", path.display())]
    DestUnwritable { path: PathBuf, source: io::Error },

    #[error("read failed on {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("write failed on {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// A write stopped making progress partway through a chunk.
    #[error(
        "short write on {}: wrote {written} of {requested} bytes (delta {})",
        path.display(),
        *written as i64 - *requested as i64
    )]
    ShortWrite {
        path: PathBuf,
        written: usize,
        requested: usize,
    },
}

/// Byte comparator failures
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("cannot open {} for comparison: {source}", path.display())]
    PathAUnreadable { path: PathBuf, source: io::Error },

    #[error("cannot open {} for comparison: {source}", path.display())]
    PathBUnreadable { path: PathBuf, source: io::Error },

    #[error("read failed on {} during comparison: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// Compression adapter failures
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("cannot run {program}: {source}")]
    ToolUnavailable { program: String, source: io::Error },

    #[error("{program} exited with {status} on {}: {stderr}", path.display())]
    ExitStatus {
        program: String,
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {:?} on {}", timeout, path.display())]
    TimedOut {
        program: String,
        path: PathBuf,
        timeout: Duration,
    },

    #[error("archive already exists: {}", path.display())]
    ArchiveExists { path: PathBuf },

    #[error("not a gzip archive name: {}", path.display())]
    NotAnArchive { path: PathBuf },

    #[error("corrupt archive {}: {source}", path.display())]
    Corrupt { path: PathBuf, source: io::Error },

    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// Raised by the recording compressor when a failure was injected.
    #[error("injected failure for {}", path.display())]
    Injected { path: PathBuf },
}

/// Failure of a single file's backup. Never fatal to the run.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error(transparent)]
    Compress(#[from] CompressError),

    #[error("cannot check for archive {}: {source}", path.display())]
    Probe { path: PathBuf, source: io::Error },

    #[error("cannot remove {}: {source}", path.display())]
    Cleanup { path: PathBuf, source: io::Error },
}

/// Conditions that abort the whole run
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("source root {} is not a readable directory: {reason}", path.display())]
    SourceRoot { path: PathBuf, reason: String },

    #[error("dir \"{}\" create failed: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),
}

impl ReconcileError {
    /// Path the failure concerns, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ReconcileError::SourceRoot { path, .. } | ReconcileError::CreateDir { path, .. } => {
                Some(path.as_path())
            }
            ReconcileError::WorkerPool(_) => None,
        }
    }
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
