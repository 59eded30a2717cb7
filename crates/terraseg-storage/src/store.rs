//! Object storage abstraction.
//!
//! The region listings and the prediction cache both go through this trait,
//! so tests and deployments can swap the backend without touching the
//! service. Keys are '/'-separated paths relative to the store root.

use std::fs;
use std::path::{Path, PathBuf};

use terraseg_core::{Error, Result};

/// Flat object store: existence checks, byte blobs, prefix listing
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists under this key
    fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch an object's bytes
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write an object, replacing any previous content
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// List object keys under a prefix, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Filesystem-backed object store rooted at a directory
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| Error::storage(format!("cannot create store root {:?}: {}", root, e)))?;
        Ok(Self { root })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir | std::path::Component::RootDir
            )
        }) {
            return Err(Error::storage(format!(
                "object key '{}' escapes the store root",
                key
            )));
        }
        Ok(self.root.join(relative))
    }

    fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)
            .map_err(|e| Error::storage(format!("cannot list {:?}: {}", dir, e)))?
        {
            let entry = entry.map_err(|e| Error::storage(e.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                self.collect_keys(&path, keys)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key)?.is_file())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).map_err(|e| Error::storage(format!("cannot read '{}': {}", key, e)))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("cannot create {:?}: {}", parent, e)))?;
        }
        fs::write(&path, data).map_err(|e| Error::storage(format!("cannot write '{}': {}", key, e)))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix.trim_end_matches('/'))?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        self.collect_keys(&dir, &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_exists_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        assert!(!store.exists("a/b.bin").unwrap());
        store.put("a/b.bin", b"payload").unwrap();
        assert!(store.exists("a/b.bin").unwrap());
        assert_eq!(store.get("a/b.bin").unwrap(), b"payload");
    }

    #[test]
    fn list_returns_sorted_keys_under_prefix() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        store.put("data/FR1/2021/b.tif", b"b").unwrap();
        store.put("data/FR1/2021/a.tif", b"a").unwrap();
        store.put("data/FR1/2022/c.tif", b"c").unwrap();

        let keys = store.list("data/FR1/2021/").unwrap();
        assert_eq!(keys, vec!["data/FR1/2021/a.tif", "data/FR1/2021/b.tif"]);

        assert!(store.list("data/missing/").unwrap().is_empty());
    }

    #[test]
    fn rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        assert!(store.get("../outside").is_err());
        assert!(store.put("/absolute", b"x").is_err());
    }
}
