//! Byte copier: streams a source file into a destination path in fixed chunks.
//!
//! The destination is created if absent (mode 0644 on Unix) and truncated.
//! A failed copy is NOT rolled back: the destination may be left partially
//! written and the caller is responsible for removing it.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::error::CopyError;

/// Chunk size shared by the copier and the comparator
pub const CHUNK_SIZE: usize = 4096;

#[cfg(unix)]
const DEST_MODE: u32 = 0o644;

/// Copy `src` to `dst`, returning the number of bytes written.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, CopyError> {
    let reader = File::open(src).map_err(|source| CopyError::SourceUnreadable {
        path: src.to_path_buf(),
        source,
    })?;
    let writer = open_dest(dst).map_err(|source| CopyError::DestUnwritable {
        path: dst.to_path_buf(),
        source,
    })?;
    copy_stream(reader, src, writer, dst)
}

fn open_dest(dst: &Path) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(DEST_MODE);
    }
    opts.open(dst)
}

/// Copy loop over arbitrary streams; `src`/`dst` only label errors.
pub(crate) fn copy_stream<R: Read, W: Write>(
    mut reader: R,
    src: &Path,
    mut writer: W,
    dst: &Path,
) -> Result<u64, CopyError> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(CopyError::Read {
                    path: src.to_path_buf(),
                    source,
                })
            }
        };
        if bytes_read == 0 {
            break;
        }
        write_chunk(&mut writer, &buffer[..bytes_read], dst)?;
        total_bytes += bytes_read as u64;
    }

    writer.flush().map_err(|source| CopyError::Write {
        path: dst.to_path_buf(),
        source,
    })?;
    Ok(total_bytes)
}

/// Write one chunk, retrying partial writes until the writer stops making
/// progress.
fn write_chunk<W: Write>(writer: &mut W, chunk: &[u8], dst: &Path) -> Result<(), CopyError> {
    let mut written = 0;
    while written < chunk.len() {
        match writer.write(&chunk[written..]) {
            Ok(0) => {
                return Err(CopyError::ShortWrite {
                    path: dst.to_path_buf(),
                    written,
                    requested: chunk.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(CopyError::Write {
                    path: dst.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(())
}
