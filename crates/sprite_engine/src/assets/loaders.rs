//! Resource loaders
//!
//! [`DirectoryLoader`] reads from a data directory on disk; [`MemoryLoader`]
//! serves blobs registered in memory (embedded data, tools, tests).

use super::ResourceLoader;
use crate::core::{EngineError, EngineResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Loader reading files relative to a root directory
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    /// Loader rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        // Asset paths may use either separator
        self.root.join(path.replace('\\', "/"))
    }
}

impl ResourceLoader for DirectoryLoader {
    fn read(&self, path: &str) -> EngineResult<Vec<u8>> {
        std::fs::read(self.resolve(path)).map_err(|err| match err.kind() {
            ErrorKind::NotFound => EngineError::ResourceNotFound(path.to_string()),
            _ => EngineError::Io(err),
        })
    }

    fn persist(&self, path: &str, bytes: &[u8]) -> EngineResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, bytes)?;
        Ok(())
    }
}

/// Loader serving in-memory blobs; clones share the same store
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl MemoryLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with_file(self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Register or replace a blob
    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.borrow_mut().insert(path.into(), bytes);
    }

    /// Copy of a stored blob
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }
}

impl ResourceLoader for MemoryLoader {
    fn read(&self, path: &str) -> EngineResult<Vec<u8>> {
        self.get(path)
            .ok_or_else(|| EngineError::ResourceNotFound(path.to_string()))
    }

    fn persist(&self, path: &str, bytes: &[u8]) -> EngineResult<()> {
        self.insert(path, bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_loader_round_trip() {
        let root = std::env::temp_dir().join(format!("sprite_engine_loader_{}", std::process::id()));
        let loader = DirectoryLoader::new(&root);
        loader.persist("art\\cache\\x.dds", &[1, 2, 3]).unwrap();
        assert_eq!(loader.read("art/cache/x.dds").unwrap(), vec![1, 2, 3]);
        assert!(matches!(loader.read("art/none.png"), Err(EngineError::ResourceNotFound(_))));
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_memory_loader_clones_share_store() {
        let loader = MemoryLoader::new();
        let other = loader.clone();
        other.persist("a", &[9]).unwrap();
        assert_eq!(loader.read("a").unwrap(), vec![9]);
    }
}
