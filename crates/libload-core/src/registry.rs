use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{normalize_path, LoaderError};

/// Table of registered libraries, `name -> root directory`.
///
/// A name is bound to exactly one root for the lifetime of the registry.
/// Registration only inspects the file name of the marker path; it never
/// touches the file system.
#[derive(Debug)]
pub struct LibraryRegistry {
    marker_file: String,
    /// Insertion ordered; the table stays small enough for linear lookups.
    libraries: Mutex<Vec<(String, PathBuf)>>,
}

impl LibraryRegistry {
    pub fn new(marker_file: impl Into<String>) -> Self {
        Self {
            marker_file: marker_file.into(),
            libraries: Mutex::new(Vec::new()),
        }
    }

    fn libraries(&self) -> MutexGuard<'_, Vec<(String, PathBuf)>> {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `name` with the directory containing `marker_path`.
    ///
    /// Returns the library root. Registering the same name and root twice is a
    /// no-op; a different root is rejected with [`LoaderError::LibraryConflict`].
    pub fn register(&self, name: &str, marker_path: &Path) -> Result<PathBuf, LoaderError> {
        let is_marker = marker_path
            .file_name()
            .is_some_and(|file_name| file_name == self.marker_file.as_str());
        let root = normalize_path(marker_path)
            .parent()
            .map(Path::to_path_buf)
            .filter(|_| is_marker)
            .ok_or_else(|| LoaderError::Configuration {
                path: marker_path.to_path_buf(),
                expected: self.marker_file.clone(),
            })?;

        let mut libraries = self.libraries();
        if let Some((_, existing)) = libraries.iter().find(|(known, _)| known == name) {
            if *existing == root {
                log::trace!("library `{name}` already registered at {}", root.display());
                return Ok(root);
            }
            return Err(LoaderError::LibraryConflict {
                name: name.to_string(),
                old: existing.clone(),
                new: root,
            });
        }

        log::debug!("registered library `{name}` at {}", root.display());
        libraries.push((name.to_string(), root.clone()));
        Ok(root)
    }

    /// Root directory of a registered library.
    pub fn root(&self, name: &str) -> Result<PathBuf, LoaderError> {
        self.libraries()
            .iter()
            .find(|(known, _)| known == name)
            .map(|(_, root)| root.clone())
            .ok_or_else(|| LoaderError::NotLoaded(name.to_string()))
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.libraries().iter().map(|(name, _)| name.clone()).collect()
    }

    /// All registrations, in registration order.
    pub fn entries(&self) -> Vec<(String, PathBuf)> {
        self.libraries().clone()
    }

    /// Name of the library registered at `root`, if any.
    pub fn name_for_root(&self, root: &Path) -> Option<String> {
        let root = normalize_path(root);
        self.libraries()
            .iter()
            .find(|(_, known)| *known == root)
            .map(|(name, _)| name.clone())
    }
}
