//! Destination path derivation.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Suffix appended to every archived file name
pub const ARCHIVE_SUFFIX: &str = ".gz";

/// Plain and archive paths for one file in the destination tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPaths {
    pub dest_path: PathBuf,
    pub archive_path: PathBuf,
}

impl MirrorPaths {
    pub fn new(dest_root: &Path, relative: &Path) -> Self {
        let dest_path = dest_root.join(relative);
        let archive_path = archive_path_for(&dest_path);
        Self {
            dest_path,
            archive_path,
        }
    }
}

/// `dir/a.txt` -> `dir/a.txt.gz`
pub fn archive_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

/// `dir/a.txt.gz` -> `dir/a.txt`; `None` if the suffix is missing or the
/// name would be empty.
pub fn plain_path_for(archive: &Path) -> Option<PathBuf> {
    let stem = strip_archive_suffix(archive.file_name()?)?;
    Some(archive.with_file_name(stem))
}

/// Works on raw bytes so names that are not valid UTF-8 still map back.
#[cfg(unix)]
fn strip_archive_suffix(name: &OsStr) -> Option<OsString> {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let stem = name.as_bytes().strip_suffix(ARCHIVE_SUFFIX.as_bytes())?;
    if stem.is_empty() {
        return None;
    }
    Some(OsString::from_vec(stem.to_vec()))
}

#[cfg(not(unix))]
fn strip_archive_suffix(name: &OsStr) -> Option<OsString> {
    let stem = name.to_str()?.strip_suffix(ARCHIVE_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(OsString::from(stem))
}
