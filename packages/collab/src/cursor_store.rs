//! Durable materialization cursors, keyed per project.

use crate::errors::StoreError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `routevn:collab:cursor:<projectId>`
pub fn cursor_key(project_id: &str) -> String {
    format!("routevn:collab:cursor:{project_id}")
}

pub trait CursorStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<u64>, StoreError>;

    fn save(&self, key: &str, cursor: u64) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, u64>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cursors.get(key).copied())
    }

    fn save(&self, key: &str, cursor: u64) -> Result<(), StoreError> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.insert(key.to_string(), cursor);
        Ok(())
    }
}

/// Cursors in a JSON object on disk
#[derive(Debug)]
pub struct FileCursorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.get(key).copied())
    }

    fn save(&self, key: &str, cursor: u64) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut cursors = self.read_all()?;
        cursors.insert(key.to_string(), cursor);

        // Atomic replace
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&cursors)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
