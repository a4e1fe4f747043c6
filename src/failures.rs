use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::FailureRecord;
use crate::error::ArchiveError;
use crate::layout::OutputLayout;

/// Failure records of a whole run, shared by every batch.
#[derive(Debug, Default)]
pub struct FailureSink {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, records: impl IntoIterator<Item = FailureRecord>) {
        self.lock().extend(records);
    }

    /// Writes the log in one go, replacing any earlier one. Nothing is
    /// written when no item failed.
    pub fn persist(&self, path: &Utf8Path) -> Result<Option<Utf8PathBuf>, ArchiveError> {
        let records = self.lock();
        if records.is_empty() {
            tracing::debug!("no failed downloads, failure log not written");
            return Ok(None);
        }
        let content = serde_json::to_vec_pretty(&*records)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        OutputLayout::write_bytes_atomic(path, &content)?;
        tracing::info!(path = %path, failures = records.len(), "failure log written");
        Ok(Some(path.to_path_buf()))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        // A panicking worker never holds this lock mid-update.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemDescriptor;

    #[test]
    fn empty_sink_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("failed_downloads.json")).unwrap();
        let sink = FailureSink::new();
        assert_eq!(sink.persist(&path).unwrap(), None);
        assert!(!path.as_std_path().exists());
    }

    #[test]
    fn persist_overwrites_previous_log() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("failed_downloads.json")).unwrap();
        std::fs::write(path.as_std_path(), b"stale").unwrap();

        let sink = FailureSink::new();
        let item = ItemDescriptor::active("https://t.example/v", "2023-01-01");
        sink.extend([FailureRecord::new(&item, "boom", 3)]);
        assert_eq!(sink.persist(&path).unwrap(), Some(path.clone()));

        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        let records: Vec<FailureRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_message, "boom");
    }
}
