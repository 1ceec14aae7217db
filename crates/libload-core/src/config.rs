//! Loader configuration and the `libload.toml` workspace manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::{FileProvider, Loader, LoaderError, MARKER_FILE, ROOT_PREFIX_ENV, SYMBOL_MAP_FILE};

/// File name of the workspace manifest.
pub const MANIFEST_FILE: &str = "libload.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Marker file at a library root, also the entry file of libraries and units.
    pub marker_file: String,
    /// Symbol map file at a library root.
    pub symbol_map_file: String,
    /// Prepended to relative paths passed to [`Loader::load_library`].
    pub root_prefix: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            marker_file: MARKER_FILE.to_string(),
            symbol_map_file: SYMBOL_MAP_FILE.to_string(),
            root_prefix: None,
        }
    }
}

impl LoaderConfig {
    /// Default configuration with the root prefix taken from `LIBLOAD_ROOT`.
    pub fn from_env() -> Self {
        Self::default().with_root_prefix(root_prefix_from_env())
    }

    pub fn with_root_prefix(mut self, prefix: Option<PathBuf>) -> Self {
        self.root_prefix = prefix;
        self
    }
}

/// `LIBLOAD_ROOT`, ignoring an empty value.
pub fn root_prefix_from_env() -> Option<PathBuf> {
    std::env::var_os(ROOT_PREFIX_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Workspace manifest listing the libraries a program uses.
///
/// ```toml
/// root_prefix = "vendor"
///
/// [libraries]
/// core = "libs/core/__init__"
/// ```
///
/// Relative paths are resolved against the directory holding the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub root_prefix: Option<PathBuf>,
    #[serde(default)]
    pub libraries: BTreeMap<String, PathBuf>,
}

impl Manifest {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to parse libload manifest")
    }

    /// Read `<dir>/libload.toml`.
    pub fn load(file_provider: &dyn FileProvider, dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let contents = file_provider
            .read_file(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Root prefix of the manifest, anchored at `dir`.
    pub fn root_prefix_in(&self, dir: &Path) -> Option<PathBuf> {
        self.root_prefix.as_ref().map(|prefix| dir.join(prefix))
    }

    /// Register every library, in name order. Stops at the first failure.
    pub fn register_all(&self, loader: &Loader, dir: &Path) -> Result<(), LoaderError> {
        for (name, marker) in &self.libraries {
            loader.register_library(name, &dir.join(marker))?;
        }
        Ok(())
    }
}

/// Walk up from `start` until a directory containing `libload.toml` is found.
pub fn find_manifest_dir(file_provider: &dyn FileProvider, start: &Path) -> Option<PathBuf> {
    let mut current = if file_provider.is_directory(start) {
        Some(start.to_path_buf())
    } else {
        start.parent().map(Path::to_path_buf)
    };

    while let Some(dir) = current {
        if file_provider.exists(&dir.join(MANIFEST_FILE)) {
            return Some(dir);
        }
        current = dir.parent().map(Path::to_path_buf);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryFileProvider;

    #[test]
    fn parses_manifest() {
        let manifest = Manifest::parse(
            r#"
            root_prefix = "vendor"

            [libraries]
            core = "libs/core/__init__"
            util = "/abs/util/__init__"
            "#,
        )
        .unwrap();

        assert_eq!(manifest.root_prefix, Some(PathBuf::from("vendor")));
        assert_eq!(
            manifest.root_prefix_in(Path::new("/ws")),
            Some(PathBuf::from("/ws/vendor"))
        );
        assert_eq!(
            manifest.libraries.keys().collect::<Vec<_>>(),
            vec!["core", "util"]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Manifest::parse("librarys = {}").is_err());
    }

    #[test]
    fn manifest_is_found_from_nested_paths() {
        let provider = InMemoryFileProvider::new([
            ("/ws/libload.toml", ""),
            ("/ws/src/app/main.src", ""),
        ]);

        assert_eq!(
            find_manifest_dir(&provider, Path::new("/ws/src/app/main.src")),
            Some(PathBuf::from("/ws"))
        );
        assert_eq!(
            find_manifest_dir(&provider, Path::new("/ws/src")),
            Some(PathBuf::from("/ws"))
        );
        assert_eq!(find_manifest_dir(&provider, Path::new("/elsewhere")), None);
    }
}
