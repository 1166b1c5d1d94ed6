// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::watch::path_utils::normalize_lexically;

/// In-memory source tree. Clones share the same files, so a test can keep a
/// handle and edit sources between builds.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = normalize_lexically(path.as_ref());
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, content.into());
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        let path = normalize_lexically(path.as_ref());
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path)
            .is_some()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files
            .get(&normalize_lexically(path))
            .cloned()
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.contains_key(&normalize_lexically(path))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Paths are used as given; tests are expected to use absolute paths.
        let path = normalize_lexically(path);
        if self.is_file(&path) {
            Ok(path)
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }
}
