//! Caller-owned registry of open databases.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{Database, DatabaseOptions, normalize_root};
use crate::error::Result;

/// Open databases keyed by their normalized root path.
///
/// Opening the same root twice returns the same instance; the options given
/// the second time are ignored.
#[derive(Debug, Default)]
pub struct Registry {
    databases: HashMap<PathBuf, Arc<Database>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a database, or return the one already open at this root.
    pub fn open(&mut self, root: impl AsRef<Path>, options: DatabaseOptions) -> Result<Arc<Database>> {
        let root = normalize_root(root.as_ref())?;
        if let Some(db) = self.databases.get(&root) {
            debug!(root = %root.display(), "database already open, ignoring options");
            return Ok(Arc::clone(db));
        }

        let db = Arc::new(Database::open(&root, options)?);
        self.databases.insert(root, Arc::clone(&db));
        Ok(db)
    }

    /// The open database at `root`, if any.
    pub fn get(&self, root: impl AsRef<Path>) -> Option<Arc<Database>> {
        let root = normalize_root(root.as_ref()).ok()?;
        self.databases.get(&root).cloned()
    }

    /// Forget the database at `root`, returning it if it was open.
    pub fn close(&mut self, root: impl AsRef<Path>) -> Option<Arc<Database>> {
        let root = normalize_root(root.as_ref()).ok()?;
        self.databases.remove(&root)
    }

    /// Forget every open database.
    pub fn clear(&mut self) {
        self.databases.clear();
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_same_root_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("FUELS.csv"), "name\ngas\n").unwrap();

        let mut registry = Registry::new();
        let a = registry.open(dir.path(), DatabaseOptions::default()).unwrap();
        // a non-normalized spelling of the same root
        let b = registry
            .open(dir.path().join("."), DatabaseOptions::new().with_eager_load(true))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        // options of the second call were ignored
        assert_eq!(b.cached_table_count(), 0);
    }

    #[test]
    fn test_distinct_roots_and_close() {
        let one = tempfile::tempdir().unwrap();
        let two = tempfile::tempdir().unwrap();

        let mut registry = Registry::new();
        let a = registry.open(one.path(), DatabaseOptions::default()).unwrap();
        let b = registry.open(two.path(), DatabaseOptions::default()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(registry.get(one.path()).is_some());

        assert!(registry.close(one.path()).is_some());
        assert!(registry.get(one.path()).is_none());

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        assert!(
            registry
                .open(dir.path().join("missing"), DatabaseOptions::default())
                .is_err()
        );
    }
}
