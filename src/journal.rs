//! JSON Lines journal: one record per processed file.
//!
//! The journal is an audit trail only. Nothing in a run reads it back.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::logger::Logger;
use crate::reconcile::EntryOutcome;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    BackedUp,
    Refreshed,
    Unchanged,
    Failed,
}

impl From<EntryOutcome> for JournalStatus {
    fn from(outcome: EntryOutcome) -> Self {
        match outcome {
            EntryOutcome::FirstBackup => JournalStatus::BackedUp,
            EntryOutcome::Refreshed => JournalStatus::Refreshed,
            EntryOutcome::Unchanged => JournalStatus::Unchanged,
        }
    }
}

/// Paths are stored lossily so names that are not valid UTF-8 still get a
/// record.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JournalEntry {
    pub timestamp: String,
    pub source: String,
    pub archive: String,
    pub status: JournalStatus,
    pub bytes: u64,
    pub error: Option<String>,
}

pub struct JournalLogger {
    file: Mutex<File>,
}

impl JournalLogger {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn add_entry(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        // One write per record keeps lines whole when workers interleave
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("journal lock poisoned"))?;
        file.write_all(&line)?;
        Ok(())
    }

    fn record(&self, src: &Path, archive: &Path, status: JournalStatus, bytes: u64, error: Option<&str>) {
        let entry = JournalEntry {
            timestamp: Utc::now().to_rfc3339(),
            source: src.to_string_lossy().into_owned(),
            archive: archive.to_string_lossy().into_owned(),
            status,
            bytes,
            error: error.map(str::to_string),
        };
        if let Err(e) = self.add_entry(&entry) {
            tracing::warn!("journal write failed: {e:#}");
        }
    }
}

impl Logger for JournalLogger {
    fn entry_done(&self, src: &Path, archive: &Path, outcome: EntryOutcome, bytes: u64) {
        self.record(src, archive, outcome.into(), bytes, None);
    }

    fn entry_failed(&self, src: &Path, archive: &Path, msg: &str) {
        self.record(src, archive, JournalStatus::Failed, 0, Some(msg));
    }
}

/// Parse a journal file; a missing file reads as empty.
pub fn read_journal(path: &Path) -> Result<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).context("Failed to open journal for reading")?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalEntry = serde_json::from_str(&line)?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = JournalLogger::new(&path).unwrap();

        journal.entry_done(
            Path::new("/s/a"),
            Path::new("/d/a.gz"),
            EntryOutcome::Refreshed,
            42,
        );
        journal.entry_failed(Path::new("/s/b"), Path::new("/d/b.gz"), "permission denied");
        // Non-entry events are not journaled
        journal.skipped(Path::new("/s/link"), "symlink");

        let entries = read_journal(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, JournalStatus::Refreshed);
        assert_eq!(entries[0].bytes, 42);
        assert_eq!(entries[0].error, None);
        assert_eq!(entries[1].status, JournalStatus::Failed);
        assert_eq!(entries[1].source, "/s/b");
        assert_eq!(entries[1].error.as_deref(), Some("permission denied"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_are_still_journaled() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = JournalLogger::new(&path).unwrap();
        let src = Path::new("/s").join(OsStr::from_bytes(b"caf\xE9.txt"));
        let archive = Path::new("/d").join(OsStr::from_bytes(b"caf\xE9.txt.gz"));

        journal.entry_done(&src, &archive, EntryOutcome::FirstBackup, 5);

        let entries = read_journal(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "/s/caf\u{FFFD}.txt");
        assert_eq!(entries[0].archive, "/d/caf\u{FFFD}.txt.gz");
        assert_eq!(entries[0].status, JournalStatus::BackedUp);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JournalStatus::BackedUp).unwrap();
        assert_eq!(json, "\"backed_up\"");
    }

    #[test]
    fn missing_journal_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_journal(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }
}
