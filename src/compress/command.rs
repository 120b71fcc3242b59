//! External `gzip` program adapter.
//!
//! Each call spawns one short-lived child and blocks until it exits or the
//! timeout expires. A timed-out child is killed and reaped before the error is
//! returned.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{install_archive, io_err, plain_or_err, sibling_temp, Compressor};
use crate::error::CompressError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default bound on a single gzip invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct GzipCommand {
    program: String,
    level: u32,
    timeout: Option<Duration>,
}

impl GzipCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            level: 6,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.clamp(1, 9);
        self
    }

    /// `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the program to completion. A non-zero exit carries the child's
    /// stderr.
    fn run(&self, mut cmd: Command, path: &Path) -> Result<(), CompressError> {
        cmd.stdin(Stdio::null()).stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| CompressError::ToolUnavailable {
            program: self.program.clone(),
            source,
        })?;

        // Drain stderr on the side so a chatty child can't block on a full pipe
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let status = self.wait(&mut child, path)?;
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(CompressError::ExitStatus {
                program: self.program.clone(),
                path: path.to_path_buf(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    fn wait(&self, child: &mut Child, path: &Path) -> Result<ExitStatus, CompressError> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(io_err(path));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(io_err(path))? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CompressError::TimedOut {
                    program: self.program.clone(),
                    path: path.to_path_buf(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for GzipCommand {
    fn default() -> Self {
        Self::new("gzip")
    }
}

impl Compressor for GzipCommand {
    fn name(&self) -> &str {
        &self.program
    }

    /// `gzip -c -<level> -- <path>` into a sibling temp file. Going through
    /// stdout keeps sources whose names already end in `.gz` archivable;
    /// gzip refuses those in place.
    fn compress(&self, path: &Path, overwrite: bool) -> Result<PathBuf, CompressError> {
        let plain_meta = fs::metadata(path).map_err(io_err(path))?;
        let tmp = sibling_temp(path)?;
        let out = tmp.reopen().map_err(io_err(tmp.path()))?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg(format!("-{}", self.level))
            .arg("--")
            .arg(path)
            .stdout(Stdio::from(out));
        self.run(cmd, path)?;

        install_archive(tmp, path, &plain_meta, overwrite)
    }

    /// `gzip -d -k -f <archive>`
    fn decompress(&self, archive: &Path) -> Result<PathBuf, CompressError> {
        let plain = plain_or_err(archive)?;
        File::open(archive).map_err(io_err(archive))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(["-d", "-k", "-f", "--"])
            .arg(archive)
            .stdout(Stdio::null());
        self.run(cmd, archive)?;

        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gzip_available() -> bool {
        Command::new("gzip")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn missing_program_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a");
        fs::write(&plain, b"x").unwrap();

        let gz = GzipCommand::new("/nonexistent/gzip-binary");
        let err = gz.compress(&plain, false).unwrap_err();
        assert!(matches!(err, CompressError::ToolUnavailable { .. }), "{err}");
        assert!(plain.exists());
        assert!(!dir.path().join("a.gz").exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a");
        fs::write(&plain, b"x").unwrap();

        let gz = GzipCommand::new("false");
        let err = gz.compress(&plain, false).unwrap_err();
        assert!(matches!(err, CompressError::ExitStatus { .. }), "{err}");
        assert!(plain.exists());
    }

    #[cfg(unix)]
    #[test]
    fn hung_program_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.gz");
        fs::write(&archive, b"x").unwrap();

        let script = dir.path().join("hang.sh");
        fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let gz = GzipCommand::new(script.to_string_lossy())
            .with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = gz.decompress(&archive).unwrap_err();
        assert!(matches!(err, CompressError::TimedOut { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn round_trip_with_system_gzip() {
        if !gzip_available() {
            eprintln!("gzip not on PATH; skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("notes.txt");
        fs::write(&plain, b"hello world").unwrap();
        let gz = GzipCommand::default();

        let archive = gz.compress(&plain, false).unwrap();
        assert!(!plain.exists());
        assert!(archive.exists());

        let restored = gz.decompress(&archive).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"hello world");
        assert!(archive.exists());
    }

    #[test]
    fn already_gz_named_source_is_archivable() {
        if !gzip_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("data.gz");
        fs::write(&plain, b"opaque bytes").unwrap();
        let gz = GzipCommand::default();

        let archive = gz.compress(&plain, false).unwrap();
        assert_eq!(archive, dir.path().join("data.gz.gz"));
        gz.decompress(&archive).unwrap();
        assert_eq!(fs::read(&plain).unwrap(), b"opaque bytes");
    }
}
