#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use libload_core::{
    DirectiveExecutor, ExecError, InMemoryFileProvider, Loader, LoaderConfig, SourceExecutor,
};

/// A loader over an in-memory tree, driven by the directive executor.
pub struct Fixture {
    pub provider: InMemoryFileProvider,
    pub executor: Arc<DirectiveExecutor>,
    pub loader: Loader,
}

pub fn fixture(files: &[(&str, &str)]) -> Fixture {
    fixture_with_config(LoaderConfig::default(), files)
}

pub fn fixture_with_config(config: LoaderConfig, files: &[(&str, &str)]) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let provider =
        InMemoryFileProvider::new(files.iter().map(|(path, content)| (*path, dedent(content))));
    let executor = Arc::new(DirectiveExecutor::new());
    let loader = Loader::new(config, Arc::new(provider.clone()), executor.clone());
    Fixture {
        provider,
        executor,
        loader,
    }
}

/// Records every executed path and runs nothing.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl SourceExecutor for RecordingExecutor {
    fn execute(&self, _loader: &Loader, path: &Path, _source: &str) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Strip the common leading indentation so fixtures can be written inline.
pub fn dedent(s: &str) -> String {
    let lines: Vec<&str> = s.lines().collect();
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
