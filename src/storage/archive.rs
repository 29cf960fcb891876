use super::file::StorageFile;
use crate::core::{Record, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{Level, event};
use uuid::Uuid;

pub const ARCHIVE_FILE: &str = "archive.db";

/// Shadow copy of the last-written version of every record, across all tables.
///
/// Snapshots are kept as JSON values so records of different types share one
/// mapping. The backing file is opened on the first commit; entries found in
/// it at that point are kept unless overwritten by a newer snapshot.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    entries: HashMap<Uuid, serde_json::Value>,
    file: Option<StorageFile>,
}

impl Archive {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(ARCHIVE_FILE),
            entries: HashMap::new(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores the record's current snapshot under its surrogate id.
    pub fn record<T: Record>(&mut self, record: &T) -> Result<()> {
        let snapshot = serde_json::to_value(record)?;
        self.entries.insert(record.id(), snapshot);
        Ok(())
    }

    /// Archived snapshot of a record, if one was written through this archive
    /// or found on disk when it was opened.
    pub fn get<T: Record>(&self, id: &Uuid) -> Result<Option<T>> {
        match self.entries.get(id) {
            Some(snapshot) => Ok(Some(serde_json::from_value(snapshot.clone())?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Overwrites the archive file with the whole mapping.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_open().await?;
        if let Some(file) = self.file.as_mut() {
            file.write_json(&self.entries).await?;
        }
        Ok(())
    }

    /// Opens the archive file if needed and merges what it already holds.
    pub async fn ensure_open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let mut file = StorageFile::open(&self.path).await?;
        let existing: HashMap<Uuid, serde_json::Value> = match file.read_json().await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                event!(
                    Level::WARN,
                    path = %self.path.display(),
                    error = %err,
                    "archive is unreadable and will be rewritten"
                );
                HashMap::new()
            }
        };
        for (id, snapshot) in existing {
            self.entries.entry(id).or_insert(snapshot);
        }

        self.file = Some(file);
        Ok(())
    }

    /// Closes the handle. In-memory entries are kept for the next commit.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.close().await?;
        }
        Ok(())
    }
}
