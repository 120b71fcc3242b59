//! In-process gzip codec.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{install_archive, install_plain, io_err, plain_or_err, sibling_temp, Compressor};
use crate::copy::copy_stream;
use crate::error::{CompressError, CopyError};

/// gzip implemented with `flate2`; needs no external program.
#[derive(Debug, Clone)]
pub struct BuiltinGzip {
    level: u32,
}

impl BuiltinGzip {
    /// `level` is clamped to 1-9.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.clamp(1, 9),
        }
    }
}

impl Default for BuiltinGzip {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Compressor for BuiltinGzip {
    fn name(&self) -> &str {
        "builtin-gzip"
    }

    fn compress(&self, path: &Path, overwrite: bool) -> Result<PathBuf, CompressError> {
        let plain_meta = fs::metadata(path).map_err(io_err(path))?;
        let reader = File::open(path).map_err(io_err(path))?;

        let mut tmp = sibling_temp(path)?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let mut encoder = GzEncoder::new(&mut tmp, Compression::new(self.level));
            copy_stream(reader, path, &mut encoder, &tmp_path).map_err(copy_to_compress)?;
            encoder.finish().map_err(io_err(&tmp_path))?;
        }

        install_archive(tmp, path, &plain_meta, overwrite)
    }

    fn decompress(&self, archive: &Path) -> Result<PathBuf, CompressError> {
        let plain = plain_or_err(archive)?;
        let reader = File::open(archive).map_err(io_err(archive))?;
        let decoder = MultiGzDecoder::new(BufReader::new(reader));

        let mut tmp = sibling_temp(&plain)?;
        let tmp_path = tmp.path().to_path_buf();
        copy_stream(decoder, archive, &mut tmp, &tmp_path).map_err(|e| match e {
            CopyError::Read { path, source } if is_corruption(source.kind()) => {
                CompressError::Corrupt { path, source }
            }
            other => copy_to_compress(other),
        })?;

        install_plain(tmp, archive, plain)
    }
}

fn is_corruption(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof
    )
}

fn copy_to_compress(err: CopyError) -> CompressError {
    match err {
        CopyError::SourceUnreadable { path, source }
        | CopyError::DestUnwritable { path, source }
        | CopyError::Read { path, source }
        | CopyError::Write { path, source } => CompressError::Io { path, source },
        CopyError::ShortWrite { path, .. } => CompressError::Io {
            path,
            source: ErrorKind::WriteZero.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn gunzip(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn compress_replaces_plain_with_archive() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        fs::write(&plain, b"hello").unwrap();

        let archive = BuiltinGzip::default().compress(&plain, false).unwrap();
        assert_eq!(archive, dir.path().join("a.txt.gz"));
        assert!(!plain.exists());
        assert_eq!(gunzip(&archive), b"hello");
    }

    #[test]
    fn compress_refuses_existing_archive_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        fs::write(&plain, b"new").unwrap();
        fs::write(dir.path().join("a.txt.gz"), b"old").unwrap();

        let err = BuiltinGzip::default().compress(&plain, false).unwrap_err();
        assert!(matches!(err, CompressError::ArchiveExists { .. }));
        assert!(plain.exists());
        assert_eq!(fs::read(dir.path().join("a.txt.gz")).unwrap(), b"old");
    }

    #[test]
    fn compress_with_overwrite_replaces_archive() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        fs::write(dir.path().join("a.txt.gz"), b"stale").unwrap();
        fs::write(&plain, b"fresh").unwrap();

        let archive = BuiltinGzip::new(9).compress(&plain, true).unwrap();
        assert_eq!(gunzip(&archive), b"fresh");
    }

    #[test]
    fn archive_keeps_plain_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        fs::write(&plain, b"x").unwrap();
        let when = FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&plain, when).unwrap();

        let archive = BuiltinGzip::default().compress(&plain, false).unwrap();
        let meta = fs::metadata(&archive).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), when);
    }

    #[test]
    fn decompress_keeps_archive() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("b.bin");
        let body: Vec<u8> = (0..20_000).map(|i| (i % 7) as u8).collect();
        fs::write(&plain, &body).unwrap();
        let gz = BuiltinGzip::default();
        let archive = gz.compress(&plain, false).unwrap();

        let restored = gz.decompress(&archive).unwrap();
        assert_eq!(restored, plain);
        assert_eq!(fs::read(&restored).unwrap(), body);
        assert!(archive.exists());
    }

    #[test]
    fn decompress_overwrites_stale_plain() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("c");
        fs::write(&plain, b"v1").unwrap();
        let gz = BuiltinGzip::default();
        let archive = gz.compress(&plain, false).unwrap();
        fs::write(&plain, b"leftover junk").unwrap();

        gz.decompress(&archive).unwrap();
        assert_eq!(fs::read(&plain).unwrap(), b"v1");
    }

    #[test]
    fn corrupt_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();

        let err = BuiltinGzip::default().decompress(&archive).unwrap_err();
        assert!(matches!(err, CompressError::Corrupt { .. }), "{err}");
        assert!(!dir.path().join("bad").exists());
    }

    #[test]
    fn decompress_requires_suffix() {
        let err = BuiltinGzip::default()
            .decompress(Path::new("/tmp/whatever.txt"))
            .unwrap_err();
        assert!(matches!(err, CompressError::NotAnArchive { .. }));
    }
}
