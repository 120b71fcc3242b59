//! Compression adapter.
//!
//! The reconciler only relies on two effects: `compress` turns `path` into
//! `path.gz` and removes `path`; `decompress` recreates `path` next to
//! `path.gz` and leaves the archive in place.

mod builtin;
mod command;
mod recording;

pub use builtin::BuiltinGzip;
pub use command::GzipCommand;
pub use recording::{CompressOp, RecordingCompressor};

use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filetime::FileTime;
use tempfile::{Builder, NamedTempFile};

use crate::config::{CompressorKind, Config};
use crate::error::CompressError;
use crate::mirror::{archive_path_for, plain_path_for};

/// Name prefix of every in-flight temp file written next to a plain file or
/// archive. Anything with it left in the destination is debris from an
/// interrupted run.
pub const TEMP_PREFIX: &str = ".gzmirror-";

pub trait Compressor: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Replace `path` with `path.gz`. Fails with `ArchiveExists` when the
    /// archive is already there and `overwrite` is false.
    fn compress(&self, path: &Path, overwrite: bool) -> Result<PathBuf, CompressError>;

    /// Recreate the plain file next to `archive`, overwriting any existing
    /// plain file and keeping the archive.
    fn decompress(&self, archive: &Path) -> Result<PathBuf, CompressError>;
}

/// Build the compressor selected by `config`.
pub fn from_config(config: &Config) -> Arc<dyn Compressor> {
    match config.compressor {
        CompressorKind::Gzip => {
            let timeout = match config.timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
            Arc::new(
                GzipCommand::new(&config.gzip_program)
                    .with_level(config.level)
                    .with_timeout(timeout),
            )
        }
        CompressorKind::Builtin => Arc::new(BuiltinGzip::new(config.level)),
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CompressError + '_ {
    move |source| CompressError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn plain_or_err(archive: &Path) -> Result<PathBuf, CompressError> {
    plain_path_for(archive).ok_or_else(|| CompressError::NotAnArchive {
        path: archive.to_path_buf(),
    })
}

/// Temp file in the same directory as `target`, so persisting is a rename.
fn sibling_temp(target: &Path) -> Result<NamedTempFile, CompressError> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(io_err(target))
}

/// Give `tmp` the plain file's mode and mtime, move it to `path.gz`, then
/// drop the plain file.
fn install_archive(
    tmp: NamedTempFile,
    plain: &Path,
    plain_meta: &Metadata,
    overwrite: bool,
) -> Result<PathBuf, CompressError> {
    let archive = archive_path_for(plain);
    fs::set_permissions(tmp.path(), plain_meta.permissions()).map_err(io_err(&archive))?;
    filetime::set_file_mtime(tmp.path(), FileTime::from_last_modification_time(plain_meta))
        .map_err(io_err(&archive))?;

    if overwrite {
        tmp.persist(&archive).map_err(|e| CompressError::Io {
            path: archive.clone(),
            source: e.error,
        })?;
    } else {
        tmp.persist_noclobber(&archive).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                CompressError::ArchiveExists {
                    path: archive.clone(),
                }
            } else {
                CompressError::Io {
                    path: archive.clone(),
                    source: e.error,
                }
            }
        })?;
    }

    fs::remove_file(plain).map_err(io_err(plain))?;
    Ok(archive)
}

/// Move a fully written temp file over the plain path, mirroring the
/// archive's mode.
fn install_plain(
    tmp: NamedTempFile,
    archive: &Path,
    plain: PathBuf,
) -> Result<PathBuf, CompressError> {
    let archive_meta = fs::metadata(archive).map_err(io_err(archive))?;
    fs::set_permissions(tmp.path(), archive_meta.permissions()).map_err(io_err(&plain))?;
    tmp.persist(&plain).map_err(|e| CompressError::Io {
        path: plain.clone(),
        source: e.error,
    })?;
    Ok(plain)
}
