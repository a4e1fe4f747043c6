use std::fs;

use camino::Utf8Path;
use serde::Deserialize;

use crate::domain::{Category, ItemDescriptor};
use crate::error::ArchiveError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportFile {
    #[serde(default)]
    pub video: Option<VideoSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VideoSection {
    #[serde(default)]
    pub recently_deleted_posts: Option<DeletedPosts>,
    #[serde(default)]
    pub videos: Option<ActiveVideos>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletedPosts {
    #[serde(default)]
    pub post_list: Option<Vec<ExportEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActiveVideos {
    #[serde(default)]
    pub video_list: Option<Vec<ExportEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportEntry {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_deleted: Option<String>,
}

/// Items of one export, split by category. Missing sections are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportItems {
    pub deleted: Vec<ItemDescriptor>,
    pub active: Vec<ItemDescriptor>,
}

impl ExportItems {
    pub fn for_category(&self, category: Category) -> &[ItemDescriptor] {
        match category {
            Category::Deleted => &self.deleted,
            Category::Active => &self.active,
        }
    }

    pub fn len(&self) -> usize {
        self.deleted.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ExportLoader;

impl ExportLoader {
    pub fn load(path: &Utf8Path) -> Result<ExportItems, ArchiveError> {
        if !path.as_std_path().exists() {
            return Err(ArchiveError::MissingExport(path.to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| ArchiveError::ExportRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<ExportItems, ArchiveError> {
        let export: ExportFile = serde_json::from_str(content)
            .map_err(|err| ArchiveError::ExportParse(err.to_string()))?;
        Ok(Self::items(export))
    }

    fn items(export: ExportFile) -> ExportItems {
        let Some(video) = export.video else {
            return ExportItems::default();
        };

        let deleted = video
            .recently_deleted_posts
            .and_then(|posts| posts.post_list)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| ItemDescriptor {
                source_ref: entry.link.unwrap_or_default(),
                timestamp: entry.date.unwrap_or_default(),
                deleted_timestamp: Some(entry.date_deleted.unwrap_or_default()),
                category: Category::Deleted,
            })
            .collect();

        let active = video
            .videos
            .and_then(|videos| videos.video_list)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| ItemDescriptor {
                source_ref: entry.link.unwrap_or_default(),
                timestamp: entry.date.unwrap_or_default(),
                deleted_timestamp: None,
                category: Category::Active,
            })
            .collect();

        ExportItems { deleted, active }
    }
}
