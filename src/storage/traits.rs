use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Persistence capability for the article collection.
///
/// Records are opaque JSON objects carrying a string `id` key. Implementations
/// return them in their natural order, newest first.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;

    /// List every record in the collection
    async fn list(&self) -> Result<Vec<Value>>;

    /// Add a new record at the front of the collection
    async fn insert(&self, record: Value) -> Result<()>;

    /// Replace the record with the given id
    async fn replace(&self, id: &str, record: Value) -> Result<()>;

    /// Remove the record with the given id; removing a missing id is not an error
    async fn remove(&self, id: &str) -> Result<()>;

    /// Check if the backend is reachable and usable
    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

/// Health status of a storage backend
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Warning(String),
    Unavailable(String),
}

/// Read and write counters kept by the in-memory backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    pub total_records: usize,
    pub reads: u64,
    pub writes: u64,
}

pub(crate) fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

pub(crate) fn require_record_id(record: &Value) -> Result<&str> {
    record_id(record)
        .ok_or_else(|| Error::Persistence("record is missing a string id".to_string()))
}

/// Memory-only storage implementation for testing and development
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<Vec<Value>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Default::default()
        }
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            total_records: self.records.read().len(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().clone())
    }

    async fn insert(&self, record: Value) -> Result<()> {
        require_record_id(&record)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.records.write().insert(0, record);
        Ok(())
    }

    async fn replace(&self, id: &str, record: Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut records = self.records.write();
        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;
        *slot = record;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.records.write().retain(|r| record_id(r) != Some(id));
        Ok(())
    }
}
