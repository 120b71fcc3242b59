//! Run configuration.
//!
//! Loaded from an optional TOML file; every field has a default and CLI flags
//! override whatever the file sets.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Which compression backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressorKind {
    /// External `gzip` program
    #[default]
    Gzip,
    /// In-process gzip (no external program needed)
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compressor: CompressorKind,
    pub gzip_program: String,
    /// 1 (fastest) to 9 (smallest)
    pub level: u32,
    /// Per external command; 0 waits forever
    pub timeout_secs: u64,
    /// Per-file workers; 0 means one per CPU
    pub jobs: usize,
    pub log_file: Option<PathBuf>,
    pub journal: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compressor: CompressorKind::Gzip,
            gzip_program: "gzip".to_string(),
            level: 6,
            timeout_secs: 300,
            jobs: 1,
            log_file: None,
            journal: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=9).contains(&self.level) {
            return Err(ConfigError::Invalid {
                key: "level",
                message: format!("{} is outside 1-9", self.level),
            });
        }
        if self.gzip_program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "gzip_program",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Worker count with `0` resolved to the CPU count
    pub fn effective_jobs(&self) -> usize {
        match self.jobs {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn empty_file_gives_defaults() {
        let f = write_config("");
        assert_eq!(Config::load(f.path()).unwrap(), Config::default());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let f = write_config(
            r#"
compressor = "builtin"
level = 9
jobs = 4
journal = "/var/log/gzmirror.jsonl"
"#,
        );
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.compressor, CompressorKind::Builtin);
        assert_eq!(cfg.level, 9);
        assert_eq!(cfg.jobs, 4);
        assert_eq!(cfg.timeout_secs, 300);
        assert_eq!(cfg.gzip_program, "gzip");
        assert_eq!(cfg.journal, Some(PathBuf::from("/var/log/gzmirror.jsonl")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let f = write_config("compresser = \"gzip\"\n");
        assert!(matches!(
            Config::load(f.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        let f = write_config("level = 12\n");
        assert!(matches!(
            Config::load(f.path()),
            Err(ConfigError::Invalid { key: "level", .. })
        ));
    }

    #[test]
    fn zero_jobs_means_cpu_count() {
        let cfg = Config {
            jobs: 0,
            ..Config::default()
        };
        assert!(cfg.effective_jobs() >= 1);
    }
}
