//! Library registration, lazy symbol lookup and include-once loading.
//!
//! A [`Loader`] owns three pieces of process state: the library registry
//! (`name -> root`), the symbol index (`symbol -> file`, read lazily from each
//! library's `symbols.toml`) and the set of files that have already been
//! included. Executing a file is delegated to a [`SourceExecutor`] which gets
//! the loader back so that executed files can trigger further loads.

use std::path::{Component, Path, PathBuf};

pub mod config;
pub mod directive;
mod error;
mod file_provider;
mod include;
mod loader;
mod registry;
mod symbol_index;
mod symbol_map;

pub use config::{LoaderConfig, Manifest};
pub use directive::DirectiveExecutor;
pub use error::{ExecError, LoadFailure, LoaderError};
pub use file_provider::InMemoryFileProvider;
pub use include::{IncludeOutcome, SourceExecutor};
pub use loader::{ContextKind, LoadContext, Loader, SymbolMissHook};
pub use registry::LibraryRegistry;
pub use symbol_index::{ResolvedSymbol, SymbolIndex};
pub use symbol_map::{SymbolEntry, SymbolKind, SymbolMap, SymbolMapSource, TomlSymbolMapSource};

/// File name that marks a library root and doubles as the entry file of
/// libraries and units.
pub const MARKER_FILE: &str = "__init__";

/// File name of the declarative symbol map at a library root.
pub const SYMBOL_MAP_FILE: &str = "symbols.toml";

/// Environment variable holding the root prefix applied to relative library paths.
pub const ROOT_PREFIX_ENV: &str = "LIBLOAD_ROOT";

/// Abstraction for file system access so the loader can run against an
/// in-memory tree in tests.
pub trait FileProvider: Send + Sync {
    /// Read the contents of a file at the given path
    fn read_file(&self, path: &Path) -> Result<String, FileProviderError>;

    /// Check if a file or directory exists
    fn exists(&self, path: &Path) -> bool;

    /// Like [`FileProvider::exists`] but reports I/O failures that are not
    /// plain absence.
    fn try_exists(&self, path: &Path) -> Result<bool, FileProviderError> {
        Ok(self.exists(path))
    }

    /// Check if a path is a directory
    fn is_directory(&self, path: &Path) -> bool;

    /// List the immediate children of a directory
    fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, FileProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileProviderError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

impl FileProviderError {
    fn from_io(err: std::io::Error, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FileProviderError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                FileProviderError::PermissionDenied(path.to_path_buf())
            }
            _ => FileProviderError::IoError(format!("{}: {err}", path.display())),
        }
    }
}

/// [`FileProvider`] backed by the real file system.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Default)]
pub struct DefaultFileProvider;

#[cfg(feature = "native")]
impl FileProvider for DefaultFileProvider {
    fn read_file(&self, path: &Path) -> Result<String, FileProviderError> {
        if path.is_dir() {
            return Err(FileProviderError::IoError(format!(
                "Is a directory: {}",
                path.display()
            )));
        }
        std::fs::read_to_string(path).map_err(|e| FileProviderError::from_io(e, path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn try_exists(&self, path: &Path) -> Result<bool, FileProviderError> {
        path.try_exists().map_err(|e| FileProviderError::from_io(e, path))
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, FileProviderError> {
        let entries = std::fs::read_dir(path).map_err(|e| FileProviderError::from_io(e, path))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FileProviderError::from_io(e, path))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }
}

/// Lexically normalize a path by resolving `.` and `..` components.
///
/// No file system access happens here; symlinks are left alone.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            Component::Normal(name) => normalized.push(name),
        }
    }
    normalized
}
