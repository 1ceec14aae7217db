use std::path::Path;

use crate::{ExecError, LoadFailure, Loader};

/// Executes the top-level content of an included file.
///
/// The loader is handed back so the file can register libraries, install
/// symbol maps or trigger nested loads while it runs. No loader lock is held
/// during the call.
pub trait SourceExecutor: Send + Sync {
    fn execute(&self, loader: &Loader, path: &Path, source: &str) -> Result<(), ExecError>;
}

/// Result of a single inclusion attempt.
///
/// Absence and failure are kept apart so callers decide how loud to be about
/// each of them.
#[derive(Debug)]
pub enum IncludeOutcome {
    /// The file was read and executed.
    Included,
    /// The file was included before, or is being included right now.
    AlreadyIncluded,
    NotFound,
    Failed(LoadFailure),
}

impl IncludeOutcome {
    /// Return `true` if the file's content is (or is being) part of the process.
    pub fn is_success(&self) -> bool {
        matches!(self, IncludeOutcome::Included | IncludeOutcome::AlreadyIncluded)
    }

    /// Convert a non-success outcome into its failure reason.
    pub fn into_failure(self) -> Option<LoadFailure> {
        match self {
            IncludeOutcome::Included | IncludeOutcome::AlreadyIncluded => None,
            IncludeOutcome::NotFound => Some(LoadFailure::NotFound),
            IncludeOutcome::Failed(reason) => Some(reason),
        }
    }
}

impl<F> SourceExecutor for F
where
    F: Fn(&Loader, &Path, &str) -> Result<(), ExecError> + Send + Sync,
{
    fn execute(&self, loader: &Loader, path: &Path, source: &str) -> Result<(), ExecError> {
        self(loader, path, source)
    }
}
