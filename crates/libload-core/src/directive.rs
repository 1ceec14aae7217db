//! A line-oriented [`SourceExecutor`].
//!
//! Each non-blank line that does not start with `#` is one directive:
//!
//! ```text
//! library <name>                  register the library rooted at this file
//! symbol <Name> <kind> <path>     add one entry to that library's symbol map
//! unit <library> <unit>           require a unit
//! source <relative path>          require a file relative to the current load
//! define <Name>                   declare that this file defines `Name`
//! use <Name>                      reference `Name`, autoloading it if needed
//! print <text>                    log `text`
//! ```
//!
//! It is deliberately tiny: enough to describe libraries whose files load each
//! other, which is what the CLI and the tests need.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{ExecError, Loader, SourceExecutor, SymbolEntry, SymbolKind, SymbolMap};

#[derive(Debug, Default)]
struct ExecState {
    defined: HashSet<String>,
    executions: HashMap<PathBuf, usize>,
}

#[derive(Debug, Default)]
pub struct DirectiveExecutor {
    state: Mutex<ExecState>,
}

impl DirectiveExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ExecState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a `define` directive for `symbol` has run.
    pub fn is_defined(&self, symbol: &str) -> bool {
        self.state().defined.contains(symbol)
    }

    /// Number of times `path` has been executed.
    pub fn executions(&self, path: &Path) -> usize {
        self.state().executions.get(path).copied().unwrap_or(0)
    }

    /// Reference `symbol` the way a `use` directive does: autoload it when it
    /// is not defined yet and fail if it is still undefined afterwards.
    pub fn use_symbol(&self, loader: &Loader, symbol: &str) -> Result<(), ExecError> {
        if self.is_defined(symbol) {
            return Ok(());
        }
        loader.autoload(symbol)?;
        if self.is_defined(symbol) {
            Ok(())
        } else {
            Err(ExecError::UndefinedSymbol(symbol.to_string()))
        }
    }

    fn run_line(
        &self,
        loader: &Loader,
        path: &Path,
        line: usize,
        directive: &str,
        args: &[&str],
    ) -> Result<(), ExecError> {
        let syntax = |message: String| ExecError::Syntax { line, message };
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(syntax(format!(
                    "`{directive}` takes {expected} argument(s), got {}",
                    args.len()
                )))
            }
        };

        match directive {
            "library" => {
                arity(1)?;
                loader.register_library(args[0], path)?;
            }
            "symbol" => {
                arity(3)?;
                let kind: SymbolKind = args[1].parse().map_err(syntax)?;
                let map = SymbolMap::new().with(args[0], SymbolEntry::new(kind, args[2]));
                loader.register_library_map(map)?;
            }
            "unit" => {
                arity(2)?;
                loader.require_unit(args[0], args[1])?;
            }
            "source" => {
                arity(1)?;
                loader.require_source(args[0])?;
            }
            "define" => {
                arity(1)?;
                self.state().defined.insert(args[0].to_string());
            }
            "use" => {
                arity(1)?;
                self.use_symbol(loader, args[0])?;
            }
            "print" => {
                log::info!("{}", args.join(" "));
            }
            other => return Err(syntax(format!("unknown directive `{other}`"))),
        }
        Ok(())
    }
}

impl SourceExecutor for DirectiveExecutor {
    fn execute(&self, loader: &Loader, path: &Path, source: &str) -> Result<(), ExecError> {
        *self
            .state()
            .executions
            .entry(path.to_path_buf())
            .or_default() += 1;

        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let Some(directive) = words.next() else {
                continue;
            };
            let args: Vec<&str> = words.collect();
            self.run_line(loader, path, index + 1, directive, &args)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{InMemoryFileProvider, LoadFailure, LoaderConfig, LoaderError};

    fn setup(files: &[(&str, &str)]) -> (Loader, Arc<DirectiveExecutor>) {
        let provider = InMemoryFileProvider::new(files.iter().copied());
        let executor = Arc::new(DirectiveExecutor::new());
        let loader = Loader::new(
            LoaderConfig::default(),
            Arc::new(provider),
            executor.clone(),
        );
        (loader, executor)
    }

    #[test]
    fn library_entry_registers_itself_and_its_symbols() {
        let (loader, executor) = setup(&[
            (
                "/libs/core/__init__",
                "library core\nsymbol Foo class foo.src\n",
            ),
            ("/libs/core/foo.src", "define Foo\n"),
        ]);

        loader.load_library(Path::new("/libs/core")).unwrap();
        assert_eq!(loader.libraries(), vec!["core"]);

        executor.use_symbol(&loader, "Foo").unwrap();
        assert!(executor.is_defined("Foo"));
        assert_eq!(executor.executions(Path::new("/libs/core/foo.src")), 1);
    }

    #[test]
    fn unknown_directive_is_a_syntax_error() {
        let (loader, _) = setup(&[("/libs/core/__init__", "library core\nfrobnicate\n")]);

        let err = loader.load_library(Path::new("/libs/core")).unwrap_err();
        match err {
            LoaderError::Load {
                reason: LoadFailure::Execution(ExecError::Syntax { line, .. }),
                ..
            } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!loader.is_included(Path::new("/libs/core/__init__")));
    }

    #[test]
    fn wrong_arity_is_a_syntax_error() {
        let (loader, _) = setup(&[("/libs/core/__init__", "unit core\n")]);

        let err = loader.load_library(Path::new("/libs/core")).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"cannot load library `/libs/core` from /libs/core/__init__: syntax error on line 1: `unit` takes 2 argument(s), got 1"
        );
    }

    #[test]
    fn use_of_unknown_symbol_is_undefined() {
        let (loader, executor) = setup(&[]);
        assert!(matches!(
            executor.use_symbol(&loader, "Nope"),
            Err(ExecError::UndefinedSymbol(name)) if name == "Nope"
        ));
    }
}
