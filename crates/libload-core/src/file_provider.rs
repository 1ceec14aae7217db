use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{normalize_path, FileProvider, FileProviderError};

/// In-memory file provider.
/// Useful for tests and for hosts that ship their library sources embedded.
///
/// Clones share the same file table, so files can be added after the provider
/// has been handed to a [`Loader`](crate::Loader).
#[derive(Clone, Debug, Default)]
pub struct InMemoryFileProvider {
    files: Arc<RwLock<BTreeMap<PathBuf, String>>>,
    accesses: Arc<AtomicUsize>,
}

impl InMemoryFileProvider {
    /// Create a provider from `(path, contents)` pairs.
    /// Relative paths are anchored at `/`.
    pub fn new<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        let provider = Self::default();
        for (path, content) in files {
            provider.add_file(path, content);
        }
        provider
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path: PathBuf = path.into();
        let path = Self::key(&path);
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, content.into());
    }

    pub fn remove_file(&self, path: impl Into<PathBuf>) {
        let path: PathBuf = path.into();
        let path = Self::key(&path);
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path);
    }

    /// Number of calls made through the [`FileProvider`] interface so far.
    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    fn key(path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&Path::new("/").join(path))
        }
    }

    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }

    fn is_dir_key(files: &BTreeMap<PathBuf, String>, dir: &Path) -> bool {
        files.keys().any(|file| file != dir && file.starts_with(dir))
    }
}

impl FileProvider for InMemoryFileProvider {
    fn read_file(&self, path: &Path) -> Result<String, FileProviderError> {
        self.touch();
        let path = Self::key(path);
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(content) = files.get(&path) {
            return Ok(content.clone());
        }
        if Self::is_dir_key(&files, &path) {
            return Err(FileProviderError::IoError(format!(
                "Is a directory: {}",
                path.display()
            )));
        }
        Err(FileProviderError::NotFound(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.touch();
        let path = Self::key(path);
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.contains_key(&path) || Self::is_dir_key(&files, &path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.touch();
        let path = Self::key(path);
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        Self::is_dir_key(&files, &path)
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, FileProviderError> {
        self.touch();
        let dir = Self::key(path);
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);

        if !Self::is_dir_key(&files, &dir) {
            return Err(FileProviderError::NotFound(dir));
        }

        // Immediate children only: the first component below `dir`.
        let entries: BTreeSet<PathBuf> = files
            .keys()
            .filter_map(|file| file.strip_prefix(&dir).ok())
            .filter_map(|relative| relative.components().next())
            .map(|first| dir.join(first))
            .collect();

        Ok(entries.into_iter().collect())
    }
}
