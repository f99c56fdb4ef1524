//! Session-scoped markers and durable flags.
//!
//! Session markers answer "already counted in this session" and disappear when
//! the session ends. Durable flags survive restarts until removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

pub trait SessionStore: Send + Sync {
    fn has(&self, key: &str) -> bool;

    fn set(&self, key: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Drops every marker; called when the session ends.
    fn clear(&self) -> Result<()>;

    /// Sets the marker and reports whether it was absent before.
    fn mark(&self, key: &str) -> Result<bool> {
        if self.has(key) {
            return Ok(false);
        }
        self.set(key)?;
        Ok(true)
    }
}

pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    markers: Mutex<BTreeSet<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.lock().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn has(&self, key: &str) -> bool {
        self.markers.lock().contains(key)
    }

    fn set(&self, key: &str) -> Result<()> {
        self.markers.lock().insert(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.markers.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.markers.lock().clear();
        Ok(())
    }

    fn mark(&self, key: &str) -> Result<bool> {
        Ok(self.markers.lock().insert(key.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryFlagStore {
    flags: Mutex<BTreeMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Option<String> {
        self.flags.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.flags.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.flags.lock().remove(key);
        Ok(())
    }
}

fn write_atomic(path: &Path, json: String) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("tmp");
    fs::write(&temp, json)
        .map_err(|e| Error::Persistence(format!("Failed to write '{}': {}", temp.display(), e)))?;
    fs::rename(&temp, path)
        .map_err(|e| Error::Persistence(format!("Failed to rename '{}': {}", temp.display(), e)))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable store '{}': {}", path.display(), e);
            T::default()
        }),
        Err(_) => T::default(),
    }
}

/// Session markers kept in a file so separate command invocations share one session.
pub struct FileSessionStore {
    path: PathBuf,
    markers: Mutex<BTreeSet<String>>,
}

impl FileSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let markers = read_json(&path);
        Self {
            path,
            markers: Mutex::new(markers),
        }
    }

    fn persist(&self, markers: &BTreeSet<String>) -> Result<()> {
        write_atomic(&self.path, serde_json::to_string(markers)?)
    }
}

impl SessionStore for FileSessionStore {
    fn has(&self, key: &str) -> bool {
        self.markers.lock().contains(key)
    }

    fn set(&self, key: &str) -> Result<()> {
        let mut markers = self.markers.lock();
        if markers.insert(key.to_string()) {
            self.persist(&markers)?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut markers = self.markers.lock();
        if markers.remove(key) {
            self.persist(&markers)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.markers.lock().clear();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn mark(&self, key: &str) -> Result<bool> {
        let mut markers = self.markers.lock();
        if !markers.insert(key.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&markers) {
            markers.remove(key);
            return Err(e);
        }
        Ok(true)
    }
}

/// Durable key/value flags in a JSON file.
pub struct FileFlagStore {
    path: PathBuf,
    flags: Mutex<BTreeMap<String, String>>,
}

impl FileFlagStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let flags = read_json(&path);
        Self {
            path,
            flags: Mutex::new(flags),
        }
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: &str) -> Option<String> {
        self.flags.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut flags = self.flags.lock();
        flags.insert(key.to_string(), value.to_string());
        write_atomic(&self.path, serde_json::to_string(&*flags)?)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut flags = self.flags.lock();
        if flags.remove(key).is_some() {
            write_atomic(&self.path, serde_json::to_string(&*flags)?)?;
        }
        Ok(())
    }
}

/// Explicit per-session state handed to the services that need it.
#[derive(Clone)]
pub struct SessionContext {
    pub markers: Arc<dyn SessionStore>,
    pub flags: Arc<dyn FlagStore>,
}

impl SessionContext {
    pub fn new(markers: Arc<dyn SessionStore>, flags: Arc<dyn FlagStore>) -> Self {
        Self { markers, flags }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()), Arc::new(MemoryFlagStore::new()))
    }

    /// `session.json` and `flags.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            Arc::new(FileSessionStore::open(dir.join("session.json"))),
            Arc::new(FileFlagStore::open(dir.join("flags.json"))),
        )
    }

    /// Tears the session down; durable flags are left in place.
    pub fn end(&self) -> Result<()> {
        tracing::debug!("Ending session, clearing markers");
        self.markers.clear()
    }
}
