// # Dfs
//
// The distributed filesystem seam `GcWorker` reaps unreferenced CellStore
// files through. Production code would wrap an HDFS/object-store client;
// `MemDfs` is the in-process double used by tests and tracks exactly which
// paths were removed.

use crate::error::{RangeTableError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

#[async_trait]
pub trait Dfs: Send + Sync {
    /// Removes the file at `path`. Errors if it doesn't exist.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Lists files currently present, for tests and diagnostics.
    async fn list(&self, dir: &str) -> Result<Vec<String>>;
}

pub struct MemDfs {
    files: Mutex<HashSet<String>>,
    removed: Mutex<Vec<String>>,
}

impl MemDfs {
    pub fn new() -> Self {
        MemDfs {
            files: Mutex::new(HashSet::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self, path: &str) {
        self.files.lock().insert(path.to_string());
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().contains(path)
    }
}

impl Default for MemDfs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dfs for MemDfs {
    async fn remove(&self, path: &str) -> Result<()> {
        let removed = self.files.lock().remove(path);
        if !removed {
            return Err(RangeTableError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {path}"),
            )));
        }
        self.removed.lock().push(path.to_string());
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .lock()
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect())
    }
}
