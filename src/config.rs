use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

pub const DEFAULT_CONFIG_FILE: &str = "tiktok-archive.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FetcherKind {
    YtDlp,
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub export_path: Utf8PathBuf,
    pub cookie_path: Utf8PathBuf,
    pub output_root: Utf8PathBuf,
    pub deleted_dir: String,
    pub active_dir: String,
    /// Relative to `output_root`.
    pub failure_log: String,
    pub workers: usize,
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub fetch_timeout_secs: u64,
    pub fetcher: FetcherKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            export_path: Utf8PathBuf::from("user_data_tiktok.json"),
            cookie_path: Utf8PathBuf::from("Cookies.txt"),
            output_root: Utf8PathBuf::from("tiktok_videos"),
            deleted_dir: "deleted_videos".to_string(),
            active_dir: "active_videos".to_string(),
            failure_log: "failed_downloads.json".to_string(),
            workers: 2,
            max_retries: 3,
            backoff_secs: 5,
            fetch_timeout_secs: 30,
            fetcher: FetcherKind::YtDlp,
        }
    }
}

impl RunConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(self) -> Result<Self, ArchiveError> {
        if self.workers == 0 {
            return Err(ArchiveError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ArchiveError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ArchiveError::InvalidConfig(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("deleted_dir", &self.deleted_dir),
            ("active_dir", &self.active_dir),
            ("failure_log", &self.failure_log),
        ] {
            if value.trim().is_empty() {
                return Err(ArchiveError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.deleted_dir == self.active_dir {
            return Err(ArchiveError::InvalidConfig(
                "deleted_dir and active_dir must differ".to_string(),
            ));
        }
        Ok(self)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the default file in the working
    /// directory is optional.
    pub fn resolve(path: Option<&Utf8Path>) -> Result<RunConfig, ArchiveError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(RunConfig::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| ArchiveError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<RunConfig, ArchiveError> {
        serde_json::from_str(content).map_err(|err| ArchiveError::ConfigParse(err.to_string()))
    }
}
