//! Directory-backed blob engine
//!
//! One JSON file per entry, named by the hex encoding of its key, plus a
//! `schema_version` file. Writes go through a temporary file and a rename so
//! a reader never sees a half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::storage::blob::{BlobBackend, BlobEntry};

const SCHEMA_FILE: &str = "schema_version";
const ENTRY_EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct FileBlobBackend {
    dir: PathBuf,
}

impl FileBlobBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.{}", name, ENTRY_EXT))
    }

    async fn stored_version(&self) -> Result<Option<u32>, StoreError> {
        match fs::read_to_string(self.dir.join(SCHEMA_FILE)).await {
            Ok(raw) => Ok(raw.trim().parse().ok()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn entry_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }

    // == Upgrade Hook ==
    /// Entries written under an older schema are dropped.
    async fn upgrade(&self, from: Option<u32>, to: u32) -> Result<(), StoreError> {
        let stale = self.entry_files().await?;
        for path in &stale {
            remove_if_present(path).await?;
        }
        fs::write(self.dir.join(SCHEMA_FILE), to.to_string()).await?;
        info!(from = ?from, to, dropped = stale.len(), "blob schema upgraded");
        Ok(())
    }
}

#[async_trait]
impl BlobBackend for FileBlobBackend {
    async fn open(&self, schema_version: u32) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;

        match self.stored_version().await? {
            Some(current) if current == schema_version => Ok(()),
            Some(current) if current > schema_version => Err(StoreError::Unavailable(format!(
                "blob directory uses schema {}, newer than supported {}",
                current, schema_version
            ))),
            previous => self.upgrade(previous, schema_version).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<BlobEntry>, StoreError> {
        let raw = match fs::read(self.entry_path(key)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| StoreError::Corrupted {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    async fn put(&self, entry: BlobEntry) -> Result<(), StoreError> {
        let path = self.entry_path(&entry.key);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec(&entry).map_err(|err| StoreError::Corrupted {
            key: entry.key.clone(),
            reason: err.to_string(),
        })?;

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        remove_if_present(&self.entry_path(key)).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        for path in self.entry_files().await? {
            remove_if_present(&path).await?;
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<BlobEntry>, StoreError> {
        let mut entries = Vec::new();
        for path in self.entry_files().await? {
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            match serde_json::from_slice::<BlobEntry>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable blob entry");
                }
            }
        }
        debug!(count = entries.len(), "blob entries listed");
        Ok(entries)
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
