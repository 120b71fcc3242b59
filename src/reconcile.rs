//! Tree reconciler: walks the source tree and brings each file's archive in
//! the destination tree up to date.
//!
//! Directories are mirrored synchronously as the walk reaches them, so a
//! directory always exists before any file inside it is processed. Each
//! file's lifecycle (probe, then copy and compress when needed) runs start to
//! finish inside one job; with more than one worker, jobs for different files
//! may overlap but a single file's steps never reorder.
//!
//! Directory failures abort the run. File failures are logged, counted, and
//! the walk continues. Raising the cancel flag stops the walk and any job that
//! has not started yet; jobs already running finish normally.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use walkdir::{DirEntry, WalkDir};

use crate::compare::files_identical;
use crate::compress::{Compressor, TEMP_PREFIX};
use crate::copy::copy_file;
use crate::error::{EntryError, ReconcileError};
use crate::logger::{Logger, NoopLogger};
use crate::mirror::{plain_path_for, MirrorPaths, ARCHIVE_SUFFIX};

#[cfg(unix)]
const DIR_MODE: u32 = 0o775;

/// What the destination holds for a file before it is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    /// No archive yet
    Absent,
    /// Archive decompresses to the current source bytes
    ArchivedUnchanged,
    /// Archive differs from the source, or could not be decompressed
    ArchivedChanged,
}

/// How a successfully processed file ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    FirstBackup,
    Refreshed,
    Unchanged,
}

impl EntryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryOutcome::FirstBackup => "backed_up",
            EntryOutcome::Refreshed => "refreshed",
            EntryOutcome::Unchanged => "unchanged",
        }
    }
}

/// A directory or regular file found under the source root
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub name: OsString,
    pub is_directory: bool,
    pub source_path: PathBuf,
}

impl SourceEntry {
    /// `None` for symlinks and special files.
    fn from_walk(entry: &DirEntry) -> Option<Self> {
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            return None;
        }
        Some(Self {
            name: entry.file_name().to_os_string(),
            is_directory: file_type.is_dir(),
            source_path: entry.path().to_path_buf(),
        })
    }

    /// For `x.gz`, the sibling `x` whose archive would take the same
    /// destination name.
    fn archive_twin(&self) -> Option<PathBuf> {
        let stem = plain_path_for(Path::new(&self.name))?;
        let twin = self.source_path.with_file_name(stem);
        twin.is_file().then_some(twin)
    }
}

#[derive(Debug, Clone)]
struct FileJob {
    source: SourceEntry,
    paths: MirrorPaths,
}

#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub dirs: u64,
    pub backed_up: u64,
    pub refreshed: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_copied: u64,
    pub errors: Vec<String>,
    /// The run stopped early on the cancel flag
    pub cancelled: bool,
}

impl RunStats {
    pub fn record(&mut self, outcome: EntryOutcome, bytes: u64) {
        match outcome {
            EntryOutcome::FirstBackup => self.backed_up += 1,
            EntryOutcome::Refreshed => self.refreshed += 1,
            EntryOutcome::Unchanged => self.unchanged += 1,
        }
        self.bytes_copied += bytes;
    }

    pub fn add_error(&mut self, error: String) {
        self.failed += 1;
        self.errors.push(error);
    }

    /// Files that reached a terminal state, successful or not
    pub fn files_seen(&self) -> u64 {
        self.backed_up + self.refreshed + self.unchanged + self.failed
    }
}

pub struct Reconciler {
    compressor: Arc<dyn Compressor>,
    logger: Arc<dyn Logger>,
    jobs: usize,
    cancel: Arc<AtomicBool>,
}

impl Reconciler {
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self {
            compressor,
            logger: Arc::new(NoopLogger),
            jobs: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Number of files processed concurrently; 0 and 1 both mean serial.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Share a flag that stops the run once set (e.g. from a Ctrl-C handler).
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Reconcile `dest_root` against `source_root`.
    pub fn run(&self, source_root: &Path, dest_root: &Path) -> Result<RunStats, ReconcileError> {
        self.reconcile(source_root, dest_root).map_err(|e| {
            let path = e.path().unwrap_or(dest_root);
            self.logger.error("reconcile", path, &e.to_string());
            e
        })
    }

    fn reconcile(&self, source_root: &Path, dest_root: &Path) -> Result<RunStats, ReconcileError> {
        let start = Instant::now();
        check_source_root(source_root)?;
        create_dest_root(dest_root)?;
        self.logger.start(source_root, dest_root);
        self.sweep_temps(dest_root);

        let stats = Mutex::new(RunStats::default());
        if self.jobs <= 1 {
            self.walk(source_root, dest_root, &stats, &mut |job| {
                self.process_file(&job, &stats)
            })?;
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|e| ReconcileError::WorkerPool(e.to_string()))?;
            let stats_ref = &stats;
            pool.scope(|scope| {
                self.walk(source_root, dest_root, stats_ref, &mut |job| {
                    scope.spawn(move |_| self.process_file(&job, stats_ref))
                })
            })?;
        }

        let mut stats = stats.into_inner();
        stats.cancelled = self.cancelled();
        self.logger.done(&stats, start.elapsed().as_secs_f64());
        Ok(stats)
    }

    /// Depth-first pre-order walk. Directories are mirrored inline; files go
    /// to `dispatch`.
    fn walk(
        &self,
        source_root: &Path,
        dest_root: &Path,
        stats: &Mutex<RunStats>,
        dispatch: &mut dyn FnMut(FileJob),
    ) -> Result<(), ReconcileError> {
        let dest_canonical = fs::canonicalize(dest_root).ok();
        let mut entries = WalkDir::new(source_root)
            .min_depth(1)
            .follow_links(false)
            .into_iter();

        while let Some(next) = entries.next() {
            if self.cancelled() {
                break;
            }
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(source_root).to_path_buf();
                    self.logger.warn("walk", &path, &e.to_string());
                    stats.lock().skipped += 1;
                    continue;
                }
            };

            let Some(source) = SourceEntry::from_walk(&entry) else {
                let kind = if entry.file_type().is_symlink() {
                    "symlink"
                } else {
                    "not a regular file"
                };
                self.logger.skipped(entry.path(), kind);
                stats.lock().skipped += 1;
                continue;
            };
            let relative = match source.source_path.strip_prefix(source_root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };

            if source.is_directory {
                // Never back up our own output
                if dest_canonical.is_some()
                    && fs::canonicalize(&source.source_path).ok() == dest_canonical
                {
                    self.logger
                        .skipped(&source.source_path, "destination directory");
                    stats.lock().skipped += 1;
                    entries.skip_current_dir();
                    continue;
                }
                let mirrored = dest_root.join(&relative);
                ensure_dir(&mirrored)?;
                self.logger.dir_created(&mirrored);
                self.sweep_temps(&mirrored);
                stats.lock().dirs += 1;
            } else {
                if let Some(twin) = source.archive_twin() {
                    self.logger.warn(
                        "collision",
                        &source.source_path,
                        &format!("shares its backup name with the archive of {}", twin.display()),
                    );
                }
                dispatch(FileJob {
                    paths: MirrorPaths::new(dest_root, &relative),
                    source,
                });
            }
        }
        Ok(())
    }

    fn process_file(&self, job: &FileJob, stats: &Mutex<RunStats>) {
        if self.cancelled() {
            return;
        }
        let src = &job.source.source_path;
        match self.backup_file(src, &job.paths) {
            Ok((outcome, bytes)) => {
                self.logger
                    .entry_done(src, &job.paths.archive_path, outcome, bytes);
                stats.lock().record(outcome, bytes);
            }
            Err(e) => {
                self.discard_plain(&job.paths.dest_path);
                let msg = e.to_string();
                self.logger.entry_failed(src, &job.paths.archive_path, &msg);
                stats
                    .lock()
                    .add_error(format!("{}: {}", src.display(), msg));
            }
        }
    }

    /// Bring one file's archive up to date.
    pub fn backup_file(
        &self,
        src: &Path,
        paths: &MirrorPaths,
    ) -> Result<(EntryOutcome, u64), EntryError> {
        match self.probe(src, paths)? {
            BackupState::Absent => {
                let bytes = copy_file(src, &paths.dest_path)?;
                self.compressor.compress(&paths.dest_path, false)?;
                Ok((EntryOutcome::FirstBackup, bytes))
            }
            BackupState::ArchivedUnchanged => {
                fs::remove_file(&paths.dest_path).map_err(|source| EntryError::Cleanup {
                    path: paths.dest_path.clone(),
                    source,
                })?;
                Ok((EntryOutcome::Unchanged, 0))
            }
            BackupState::ArchivedChanged => {
                let bytes = copy_file(src, &paths.dest_path)?;
                self.compressor.compress(&paths.dest_path, true)?;
                Ok((EntryOutcome::Refreshed, bytes))
            }
        }
    }

    /// Determine the file's [`BackupState`].
    ///
    /// When an archive exists this decompresses it next to itself and
    /// compares; the decompressed copy stays at `dest_path` for the caller
    /// to discard or overwrite. An archive that fails to decompress counts as
    /// changed and gets rebuilt from the source.
    pub fn probe(&self, src: &Path, paths: &MirrorPaths) -> Result<BackupState, EntryError> {
        let archived = paths
            .archive_path
            .try_exists()
            .map_err(|source| EntryError::Probe {
                path: paths.archive_path.clone(),
                source,
            })?;
        if !archived {
            return Ok(BackupState::Absent);
        }

        if let Err(e) = self.compressor.decompress(&paths.archive_path) {
            self.logger.warn(
                "decompress",
                &paths.archive_path,
                &format!("{e}; rebuilding from source"),
            );
            return Ok(BackupState::ArchivedChanged);
        }

        if files_identical(src, &paths.dest_path)? {
            Ok(BackupState::ArchivedUnchanged)
        } else {
            Ok(BackupState::ArchivedChanged)
        }
    }

    /// Delete temp files an interrupted run left in `dir`. Runs before any
    /// file of `dir` is dispatched, so none of them can belong to this run.
    fn sweep_temps(&self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.logger.warn("sweep", dir, &e.to_string());
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let stale = name
                .to_str()
                .is_some_and(|n| n.starts_with(TEMP_PREFIX) && !n.ends_with(ARCHIVE_SUFFIX));
            if !stale || !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => self.logger.warn("sweep", &path, "removed leftover temp file"),
                Err(e) => self.logger.warn("sweep", &path, &e.to_string()),
            }
        }
    }

    /// Remove a transient plain copy left behind by a failed entry.
    fn discard_plain(&self, dest_path: &Path) {
        match fs::remove_file(dest_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => self.logger.warn("cleanup", dest_path, &e.to_string()),
        }
    }
}

fn check_source_root(source_root: &Path) -> Result<(), ReconcileError> {
    match fs::metadata(source_root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ReconcileError::SourceRoot {
            path: source_root.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(ReconcileError::SourceRoot {
            path: source_root.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn dir_builder(recursive: bool) -> fs::DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder
}

fn create_dest_root(dest_root: &Path) -> Result<(), ReconcileError> {
    dir_builder(true)
        .create(dest_root)
        .map_err(|source| ReconcileError::CreateDir {
            path: dest_root.to_path_buf(),
            source,
        })
}

/// Create one mirrored directory. An existing directory is fine; anything
/// else in the way is fatal.
fn ensure_dir(path: &Path) -> Result<(), ReconcileError> {
    match dir_builder(false).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(ReconcileError::CreateDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}
