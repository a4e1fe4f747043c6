use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::RunConfig;
use crate::domain::{Category, ItemDescriptor};
use crate::error::ArchiveError;

pub const UNKNOWN_DATE: &str = "unknown_date";
const VIDEO_EXT: &str = "mp4";

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
    deleted_dir: Utf8PathBuf,
    active_dir: Utf8PathBuf,
    failure_log: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(root: Utf8PathBuf, deleted: &str, active: &str, failure_log: &str) -> Self {
        Self {
            deleted_dir: root.join(deleted),
            active_dir: root.join(active),
            failure_log: root.join(failure_log),
            root,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.output_root.clone(),
            &config.deleted_dir,
            &config.active_dir,
            &config.failure_log,
        )
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn category_dir(&self, category: Category) -> &Utf8Path {
        match category {
            Category::Deleted => &self.deleted_dir,
            Category::Active => &self.active_dir,
        }
    }

    pub fn failure_log_path(&self) -> &Utf8Path {
        &self.failure_log
    }

    pub fn resolve(&self, item: &ItemDescriptor) -> Utf8PathBuf {
        self.category_dir(item.category).join(file_name(item))
    }

    pub fn ensure_dirs(&self) -> Result<(), ArchiveError> {
        for dir in [&self.root, &self.deleted_dir, &self.active_dir] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| ArchiveError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ArchiveError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".tiktok-archive")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Deterministic in `(timestamp, deleted_timestamp, category)`.
pub fn file_name(item: &ItemDescriptor) -> String {
    let date = normalize_timestamp(&item.timestamp);
    match item.category {
        Category::Active => format!("video_{date}.{VIDEO_EXT}"),
        Category::Deleted => {
            let removed = normalize_timestamp(item.deleted_timestamp.as_deref().unwrap_or(""));
            format!("deleted_{date}_removed_{removed}.{VIDEO_EXT}")
        }
    }
}

pub fn normalize_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return UNKNOWN_DATE.to_string();
    }
    raw.chars()
        .map(|ch| match ch {
            ':' | '/' | '\\' => '-',
            ' ' => '_',
            other => other,
        })
        .collect()
}
