use crate::core::{DbError, Result};
use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Exclusively locked storage handle, opened once and reused for every
/// read and rewrite of the file.
#[derive(Debug)]
pub struct StorageFile {
    path: PathBuf,
    file: File,
}

impl StorageFile {
    /// Opens or creates `path` and takes an exclusive lock on it.
    ///
    /// The lock is released when the handle is dropped.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let open_path = path.clone();
        let std_file = tokio::task::spawn_blocking(move || -> Result<std::fs::File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&open_path)?;
            file.try_lock_exclusive()
                .map_err(|_| DbError::Locked(open_path.display().to_string()))?;
            Ok(file)
        })
        .await??;

        Ok(Self {
            path,
            file: File::from_std(std_file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file. Empty or `null` content yields `None`.
    pub async fn read_json<V: DeserializeOwned>(&mut self) -> Result<Option<V>> {
        self.file.seek(std::io::SeekFrom::Start(0)).await?;
        let mut buffer = Vec::new();
        self.file.read_to_end(&mut buffer).await?;

        let content = trim_padding(&buffer);
        if content.is_empty() || content == b"null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(content)?))
    }

    /// Overwrites the whole file with the serialized value.
    pub async fn write_json<V: Serialize + ?Sized>(&mut self, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.file.set_len(0).await?;
        self.file.seek(std::io::SeekFrom::Start(0)).await?;
        self.file.write_all(&bytes).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }

    /// Flushes pending writes and drops the handle, releasing the lock.
    pub async fn close(mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

// Files written by older builds may carry NUL padding after the document.
fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    let start = bytes[..end]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(end);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rewrite_shrinks_file() {
        let dir = TempDir::new().unwrap();
        let mut file = StorageFile::open(dir.path().join("Item.db")).await.unwrap();

        file.write_json(&vec![1, 2, 3, 4, 5, 6, 7, 8]).await.unwrap();
        file.write_json(&vec![9]).await.unwrap();

        let values: Option<Vec<i32>> = file.read_json().await.unwrap();
        assert_eq!(values, Some(vec![9]));
        assert_eq!(std::fs::read_to_string(dir.path().join("Item.db")).unwrap(), "[9]");
    }

    #[tokio::test]
    async fn test_empty_and_null_read_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Empty.db");
        let mut file = StorageFile::open(&path).await.unwrap();
        let values: Option<Vec<i32>> = file.read_json().await.unwrap();
        assert!(values.is_none());
        drop(file);

        std::fs::write(&path, b"null").unwrap();
        let mut file = StorageFile::open(&path).await.unwrap();
        let values: Option<Vec<i32>> = file.read_json().await.unwrap();
        assert!(values.is_none());
    }

    #[tokio::test]
    async fn test_nul_padding_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Padded.db");
        std::fs::write(&path, b"[1,2]\0\0\0\0").unwrap();

        let mut file = StorageFile::open(&path).await.unwrap();
        let values: Option<Vec<i32>> = file.read_json().await.unwrap();
        assert_eq!(values, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_second_handle_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Locked.db");
        let _first = StorageFile::open(&path).await.unwrap();

        let second = StorageFile::open(&path).await;
        assert!(matches!(second, Err(DbError::Locked(_))));
    }
}
