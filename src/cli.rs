//! Command-line surface

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::{CompressorKind, Config};
use crate::logger::LogFormat;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "gzmirror - incremental one-way backup of a directory tree into gzip archives"
)]
pub struct Args {
    /// Directory to back up
    pub source: PathBuf,

    /// Backup destination (created if missing)
    pub destination: PathBuf,

    /// TOML config file; flags given here override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Files processed concurrently (0 = one per CPU)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Compression backend
    #[arg(long, value_enum)]
    pub compressor: Option<CompressorKind>,

    /// gzip executable for the external backend
    #[arg(long)]
    pub gzip_program: Option<String>,

    /// Compression level
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=9))]
    pub level: Option<u32>,

    /// Seconds to wait for each external gzip call (0 = no limit)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// More console output (-v actions, -vv decisions)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Append a plain-text event log to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON line per processed file to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Console log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Config file (if any) with flags layered on top.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(kind) = self.compressor {
            config.compressor = kind;
        }
        if let Some(program) = &self.gzip_program {
            config.gzip_program = program.clone();
        }
        if let Some(level) = self.level {
            config.level = level;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file.clone();
        }
        if self.journal.is_some() {
            config.journal = self.journal.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
