use anyhow::Result;
use chrono::Utc;
use clap::ValueEnum;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use crate::reconcile::{EntryOutcome, RunStats};

/// Environment variable holding a `tracing` filter directive
pub const LOG_ENV: &str = "GZMIRROR_LOG";

/// Event sink injected into the reconciler. Every hook defaults to a no-op.
pub trait Logger: Send + Sync {
    fn start(&self, _src: &Path, _dst: &Path) {}
    fn dir_created(&self, _path: &Path) {}
    fn entry_done(&self, _src: &Path, _archive: &Path, _outcome: EntryOutcome, _bytes: u64) {}
    fn entry_failed(&self, _src: &Path, _archive: &Path, _msg: &str) {}
    fn skipped(&self, _path: &Path, _reason: &str) {}
    fn warn(&self, _context: &str, _path: &Path, _msg: &str) {}
    fn error(&self, _context: &str, _path: &Path, _msg: &str) {}
    fn done(&self, _stats: &RunStats, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, src: &Path, dst: &Path) {
        self.line(&format!("START src={} dst={}", src.display(), dst.display()));
    }
    fn dir_created(&self, path: &Path) {
        self.line(&format!("MKDIR path={}", path.display()));
    }
    fn entry_done(&self, src: &Path, archive: &Path, outcome: EntryOutcome, bytes: u64) {
        self.line(&format!(
            "{} src={} archive={} bytes={}",
            outcome.as_str().to_uppercase(),
            src.display(),
            archive.display(),
            bytes
        ));
    }
    fn entry_failed(&self, src: &Path, archive: &Path, msg: &str) {
        self.line(&format!(
            "FAILED src={} archive={} msg={}",
            src.display(),
            archive.display(),
            msg
        ));
    }
    fn skipped(&self, path: &Path, reason: &str) {
        self.line(&format!("SKIP path={} reason={}", path.display(), reason));
    }
    fn warn(&self, context: &str, path: &Path, msg: &str) {
        self.line(&format!("WARN ctx={} path={} msg={}", context, path.display(), msg));
    }
    fn error(&self, context: &str, path: &Path, msg: &str) {
        self.line(&format!("ERROR ctx={} path={} msg={}", context, path.display(), msg));
    }
    fn done(&self, stats: &RunStats, seconds: f64) {
        self.line(&format!(
            "DONE backed_up={} refreshed={} unchanged={} failed={} bytes={} cancelled={} seconds={seconds:.3}",
            stats.backed_up,
            stats.refreshed,
            stats.unchanged,
            stats.failed,
            stats.bytes_copied,
            stats.cancelled
        ));
    }
}

/// Forwards events to the global `tracing` subscriber at matching levels.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn start(&self, src: &Path, dst: &Path) {
        tracing::info!(src = %src.display(), dst = %dst.display(), "backup started");
    }
    fn dir_created(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "directory ready");
    }
    fn entry_done(&self, src: &Path, archive: &Path, outcome: EntryOutcome, bytes: u64) {
        match outcome {
            EntryOutcome::Unchanged => {
                tracing::debug!(src = %src.display(), "unchanged")
            }
            _ => tracing::info!(
                src = %src.display(),
                archive = %archive.display(),
                bytes,
                "{}",
                outcome.as_str()
            ),
        }
    }
    fn entry_failed(&self, src: &Path, archive: &Path, msg: &str) {
        tracing::error!(src = %src.display(), archive = %archive.display(), "{msg}");
    }
    fn skipped(&self, path: &Path, reason: &str) {
        tracing::debug!(path = %path.display(), reason, "skipped");
    }
    fn warn(&self, context: &str, path: &Path, msg: &str) {
        tracing::warn!(context, path = %path.display(), "{msg}");
    }
    fn error(&self, context: &str, path: &Path, msg: &str) {
        tracing::error!(context, path = %path.display(), "{msg}");
    }
    fn done(&self, stats: &RunStats, seconds: f64) {
        tracing::info!(
            backed_up = stats.backed_up,
            refreshed = stats.refreshed,
            unchanged = stats.unchanged,
            failed = stats.failed,
            seconds,
            "backup finished"
        );
    }
}

/// Sends every event to each inner logger in order.
pub struct Fanout(pub Vec<Arc<dyn Logger>>);

impl Logger for Fanout {
    fn start(&self, src: &Path, dst: &Path) {
        self.0.iter().for_each(|l| l.start(src, dst));
    }
    fn dir_created(&self, path: &Path) {
        self.0.iter().for_each(|l| l.dir_created(path));
    }
    fn entry_done(&self, src: &Path, archive: &Path, outcome: EntryOutcome, bytes: u64) {
        self.0
            .iter()
            .for_each(|l| l.entry_done(src, archive, outcome, bytes));
    }
    fn entry_failed(&self, src: &Path, archive: &Path, msg: &str) {
        self.0.iter().for_each(|l| l.entry_failed(src, archive, msg));
    }
    fn skipped(&self, path: &Path, reason: &str) {
        self.0.iter().for_each(|l| l.skipped(path, reason));
    }
    fn warn(&self, context: &str, path: &Path, msg: &str) {
        self.0.iter().for_each(|l| l.warn(context, path, msg));
    }
    fn error(&self, context: &str, path: &Path, msg: &str) {
        self.0.iter().for_each(|l| l.error(context, path, msg));
    }
    fn done(&self, stats: &RunStats, seconds: f64) {
        self.0.iter().for_each(|l| l.done(stats, seconds));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the stderr subscriber. `GZMIRROR_LOG` wins over `verbosity`.
pub fn init_tracing(verbosity: u8, quiet: bool, format: LogFormat) -> Result<()> {
    let level = if quiet {
        "error"
    } else {
        match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("gzmirror={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install log subscriber: {e}"))
}
