use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use libload_core::config::{find_manifest_dir, Manifest};
use libload_core::{DefaultFileProvider, DirectiveExecutor, Loader, LoaderConfig};
use log::debug;

/// A manifest directory and a loader with its libraries registered.
pub struct Workspace {
    pub dir: PathBuf,
    pub loader: Loader,
    pub executor: Arc<DirectiveExecutor>,
}

impl Workspace {
    pub fn open(manifest_dir: Option<&Path>) -> Result<Self> {
        let provider = DefaultFileProvider;
        let cwd = std::env::current_dir()?;
        let dir = match manifest_dir {
            Some(dir) => cwd.join(dir),
            None => {
                find_manifest_dir(&provider, &cwd).with_context(|| {
                    format!(
                        "No {} found in {} or any parent directory",
                        libload_core::config::MANIFEST_FILE,
                        cwd.display()
                    )
                })?
            }
        };
        debug!("Using manifest in {}", dir.display());

        let manifest = Manifest::load(&provider, &dir)?;

        // The manifest's prefix wins over LIBLOAD_ROOT.
        let mut config = LoaderConfig::from_env();
        if let Some(prefix) = manifest.root_prefix_in(&dir) {
            config.root_prefix = Some(prefix);
        }

        let executor = Arc::new(DirectiveExecutor::new());
        let loader = Loader::native(config, executor.clone());
        manifest
            .register_all(&loader, &dir)
            .context("Failed to register manifest libraries")?;

        Ok(Self {
            dir,
            loader,
            executor,
        })
    }

    /// `path` relative to the manifest directory when it lives below it.
    pub fn display_path(&self, path: &Path) -> String {
        pathdiff::diff_paths(path, &self.dir)
            .filter(|relative| !relative.starts_with(".."))
            .unwrap_or_else(|| path.to_path_buf())
            .display()
            .to_string()
    }
}
