use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::storage::traits::{record_id, require_record_id, HealthStatus, StorageProvider};

/// File-backed collection kept as one JSON array in `<dir>/<collection>.json`.
///
/// Every mutation rewrites the whole array through a temporary file and a
/// rename, so readers never observe a half-written collection.
pub struct LocalStorage {
    collection: String,
    file: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStorage {
    pub fn new(dir: impl AsRef<Path>, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        let dir = dir.as_ref();

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create data directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let file = dir.join(format!("{}.json", collection));
        Ok(Self {
            collection,
            file,
            write_lock: Mutex::new(()),
        })
    }

    /// Storage rooted at an explicit file path rather than a directory.
    pub fn at_path(file: impl Into<PathBuf>, collection: impl Into<String>) -> Result<Self> {
        let file = file.into();
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create data directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(Self {
            collection: collection.into(),
            file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn load(&self) -> Result<Vec<Value>> {
        if !self.file.exists() {
            tracing::debug!("Collection file does not exist yet: {}", self.file.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.file).await.map_err(|e| {
            Error::Persistence(format!(
                "Failed to read collection '{}': {}",
                self.file.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            Error::Persistence(format!(
                "Collection '{}' is not a JSON array: {}",
                self.collection, e
            ))
        })
    }

    async fn save(&self, records: &[Value]) -> Result<()> {
        let json = serde_json::to_string(records)?;

        let temp_file = self.file.with_extension("tmp");
        fs::write(&temp_file, json).await.map_err(|e| {
            Error::Persistence(format!(
                "Failed to write collection to '{}': {}",
                temp_file.display(),
                e
            ))
        })?;

        fs::rename(&temp_file, &self.file).await.map_err(|e| {
            Error::Persistence(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_file.display(),
                self.file.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Saved {} records to {}",
            records.len(),
            self.file.display()
        );
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list(&self) -> Result<Vec<Value>> {
        match self.load().await {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!("Error loading news, treating collection as empty: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn insert(&self, record: Value) -> Result<()> {
        require_record_id(&record)?;
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        records.insert(0, record);
        self.save(&records).await
    }

    async fn replace(&self, id: &str, record: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;
        *slot = record;
        self.save(&records).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        records.retain(|r| record_id(r) != Some(id));
        self.save(&records).await
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        match self.load().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Warning(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_missing_file_lists_empty() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "nairobi-tea-news").unwrap();
        assert!(storage.list().await.unwrap().is_empty());
        assert!(storage.path().ends_with("nairobi-tea-news.json"));
    }

    #[tokio::test]
    async fn test_local_storage_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        {
            let storage = LocalStorage::new(dir.path(), "news").unwrap();
            storage.insert(json!({ "id": "a" })).await.unwrap();
            storage.insert(json!({ "id": "b" })).await.unwrap();
        }

        let storage = LocalStorage::new(dir.path(), "news").unwrap();
        let records = storage.list().await.unwrap();
        let ids: Vec<_> = records.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(!dir.path().join("news.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_storage_replace_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "news").unwrap();
        storage.insert(json!({ "id": "a", "views": 0 })).await.unwrap();

        storage.replace("a", json!({ "id": "a", "views": 3 })).await.unwrap();
        assert_eq!(storage.list().await.unwrap()[0]["views"], 3);

        assert!(matches!(
            storage.replace("zzz", json!({ "id": "zzz" })).await,
            Err(Error::NotFound(_))
        ));

        storage.remove("a").await.unwrap();
        storage.remove("a").await.unwrap();
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_storage_corrupt_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("news.json"), "{not json").unwrap();
        let storage = LocalStorage::new(dir.path(), "news").unwrap();

        assert!(storage.list().await.unwrap().is_empty());
        assert!(matches!(
            storage.insert(json!({ "id": "a" })).await,
            Err(Error::Persistence(_))
        ));
        assert!(matches!(
            storage.health_check().await.unwrap(),
            HealthStatus::Warning(_)
        ));
    }
}
