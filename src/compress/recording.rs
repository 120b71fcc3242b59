//! Test double that records every call.
//!
//! "Compression" is an identity rename (`a` -> `a.gz`) so archives stay
//! readable in assertions. Failures can be injected per path.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{io_err, plain_or_err, Compressor};
use crate::error::CompressError;
use crate::mirror::archive_path_for;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOp {
    Compress { path: PathBuf, overwrite: bool },
    Decompress { archive: PathBuf },
}

#[derive(Debug, Default)]
pub struct RecordingCompressor {
    ops: Mutex<Vec<CompressOp>>,
    fail_compress: Mutex<HashSet<PathBuf>>,
    fail_decompress: Mutex<HashSet<PathBuf>>,
}

impl RecordingCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `compress(path, _)` fail.
    pub fn fail_compress(&self, path: impl Into<PathBuf>) {
        self.fail_compress.lock().insert(path.into());
    }

    /// Make `decompress(archive)` fail.
    pub fn fail_decompress(&self, archive: impl Into<PathBuf>) {
        self.fail_decompress.lock().insert(archive.into());
    }

    pub fn ops(&self) -> Vec<CompressOp> {
        self.ops.lock().clone()
    }

    pub fn compress_count(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, CompressOp::Compress { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}

impl Compressor for RecordingCompressor {
    fn name(&self) -> &str {
        "recording"
    }

    fn compress(&self, path: &Path, overwrite: bool) -> Result<PathBuf, CompressError> {
        self.ops.lock().push(CompressOp::Compress {
            path: path.to_path_buf(),
            overwrite,
        });
        if self.fail_compress.lock().contains(path) {
            return Err(CompressError::Injected {
                path: path.to_path_buf(),
            });
        }

        let archive = archive_path_for(path);
        if !overwrite && archive.exists() {
            return Err(CompressError::ArchiveExists { path: archive });
        }
        fs::rename(path, &archive).map_err(io_err(path))?;
        Ok(archive)
    }

    fn decompress(&self, archive: &Path) -> Result<PathBuf, CompressError> {
        self.ops.lock().push(CompressOp::Decompress {
            archive: archive.to_path_buf(),
        });
        if self.fail_decompress.lock().contains(archive) {
            return Err(CompressError::Injected {
                path: archive.to_path_buf(),
            });
        }

        let plain = plain_or_err(archive)?;
        fs::copy(archive, &plain).map_err(io_err(archive))?;
        Ok(plain)
    }
}
