//! Byte comparator: lock-step chunked comparison of two files.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::copy::CHUNK_SIZE;
use crate::error::CompareError;

/// Return `true` when `a` and `b` hold exactly the same bytes.
///
/// Stops at the first differing chunk or as soon as one side runs out before
/// the other.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool, CompareError> {
    let file_a = File::open(a).map_err(|source| CompareError::PathAUnreadable {
        path: a.to_path_buf(),
        source,
    })?;
    let file_b = File::open(b).map_err(|source| CompareError::PathBUnreadable {
        path: b.to_path_buf(),
        source,
    })?;
    streams_identical(file_a, a, file_b, b)
}

pub(crate) fn streams_identical<A: Read, B: Read>(
    mut reader_a: A,
    a: &Path,
    mut reader_b: B,
    b: &Path,
) -> Result<bool, CompareError> {
    let mut buf_a = [0u8; CHUNK_SIZE];
    let mut buf_b = [0u8; CHUNK_SIZE];

    let first_a = fill_chunk(&mut reader_a, &mut buf_a, a)?;
    let first_b = fill_chunk(&mut reader_b, &mut buf_b, b)?;
    // Empty vs non-empty never matches
    if (first_a == 0) != (first_b == 0) {
        return Ok(false);
    }

    let (mut n_a, mut n_b) = (first_a, first_b);
    loop {
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
        n_a = fill_chunk(&mut reader_a, &mut buf_a, a)?;
        n_b = fill_chunk(&mut reader_b, &mut buf_b, b)?;
    }
}

/// Read until `buf` is full or the stream ends.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<usize, CompareError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(CompareError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn pair(a: &[u8], b: &[u8]) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let pa = dir.path().join("a");
        let pb = dir.path().join("b");
        fs::write(&pa, a).unwrap();
        fs::write(&pb, b).unwrap();
        (dir, pa, pb)
    }

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn identical_files_match() {
        let body: Vec<u8> = (0..CHUNK_SIZE * 2 + 5).map(|i| (i % 13) as u8).collect();
        let (_d, a, b) = pair(&body, &body);
        assert!(files_identical(&a, &b).unwrap());
    }

    #[test]
    fn both_empty_match() {
        let (_d, a, b) = pair(b"", b"");
        assert!(files_identical(&a, &b).unwrap());
    }

    #[test]
    fn empty_against_non_empty_differs() {
        let (_d, a, b) = pair(b"", b"hello");
        assert!(!files_identical(&a, &b).unwrap());
        assert!(!files_identical(&b, &a).unwrap());
    }

    #[test]
    fn prefix_is_not_identical() {
        let (_d, a, b) = pair(b"hello", b"hello world");
        assert!(!files_identical(&a, &b).unwrap());
        assert!(!files_identical(&b, &a).unwrap());
    }

    #[test]
    fn length_difference_past_first_chunk() {
        let long = vec![1u8; CHUNK_SIZE + 1];
        let short = vec![1u8; CHUNK_SIZE];
        let (_d, a, b) = pair(&long, &short);
        assert!(!files_identical(&a, &b).unwrap());
    }

    #[test]
    fn late_byte_difference_detected() {
        let a_body = vec![0u8; CHUNK_SIZE * 3];
        let mut b_body = a_body.clone();
        b_body[CHUNK_SIZE * 2 + 100] = 1;
        let (_d, a, b) = pair(&a_body, &b_body);
        assert!(!files_identical(&a, &b).unwrap());
    }

    #[test]
    fn short_reads_do_not_fake_a_mismatch() {
        let body: Vec<u8> = (0..CHUNK_SIZE * 2).map(|i| i as u8).collect();
        let a = Trickle { data: &body, step: 100 };
        let b = Trickle { data: &body, step: 4000 };
        assert!(streams_identical(a, Path::new("a"), b, Path::new("b")).unwrap());
    }

    #[test]
    fn unreadable_sides_are_distinguished() {
        let (dir, a, _b) = pair(b"x", b"x");
        let missing = dir.path().join("missing");
        assert!(matches!(
            files_identical(&missing, &a),
            Err(CompareError::PathAUnreadable { .. })
        ));
        assert!(matches!(
            files_identical(&a, &missing),
            Err(CompareError::PathBUnreadable { .. })
        ));
    }
}
