use std::path::PathBuf;

use crate::FileProviderError;

/// Errors surfaced by the [`Loader`](crate::Loader) and its components.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// A registration call pointed at something that is not a library marker.
    #[error("`{}` is not a library marker: expected a file named `{expected}`", path.display())]
    Configuration { path: PathBuf, expected: String },

    /// The library name is already bound to another root. The existing
    /// registration is left untouched.
    #[error(
        "library `{name}` is already registered at {}, refusing to register it again at {}",
        old.display(),
        new.display()
    )]
    LibraryConflict {
        name: String,
        old: PathBuf,
        new: PathBuf,
    },

    #[error("library `{0}` has not been registered")]
    NotLoaded(String),

    /// A file could not be included. `request` names what the caller asked for
    /// (a unit, a relative source, a symbol...).
    #[error("cannot load {request} from {}: {reason}", path.display())]
    Load {
        path: PathBuf,
        request: String,
        reason: LoadFailure,
    },

    /// The loader was used outside of the discipline it requires, e.g. a
    /// relative include with no load in progress.
    #[error("invalid loader state: {0}")]
    InvalidState(String),
}

/// Why a guarded inclusion did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum LoadFailure {
    #[error("file not found")]
    NotFound,

    #[error(transparent)]
    Unreadable(FileProviderError),

    #[error("invalid symbol map: {0}")]
    InvalidSymbolMap(String),

    #[error(transparent)]
    Execution(ExecError),
}

/// Failure reported by a [`SourceExecutor`](crate::SourceExecutor).
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The file is structurally invalid for the executor.
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// The file referenced a symbol that nothing defines.
    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),

    /// A load triggered from inside the file failed.
    #[error("{0}")]
    Loader(Box<LoaderError>),
}

impl From<LoaderError> for ExecError {
    fn from(err: LoaderError) -> Self {
        ExecError::Loader(Box::new(err))
    }
}

impl ExecError {
    /// Return `true` if the file itself is malformed rather than failing at runtime.
    pub fn is_syntax(&self) -> bool {
        matches!(self, ExecError::Syntax { .. })
    }
}
