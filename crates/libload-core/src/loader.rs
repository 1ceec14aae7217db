use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::{
    normalize_path, FileProvider, FileProviderError, IncludeOutcome, LibraryRegistry, LoadFailure,
    LoaderConfig, LoaderError, ResolvedSymbol, SourceExecutor, SymbolIndex, SymbolMap,
    TomlSymbolMapSource,
};

/// What kind of load pushed a [`LoadContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// A library entry file, see [`Loader::load_library`].
    Library,
    /// A unit entry file, see [`Loader::require_unit`].
    Unit,
    /// The file defining an autoloaded symbol, see [`Loader::autoload`].
    Symbol,
}

/// A directory relative includes are resolved against while a load is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    pub dir: PathBuf,
    pub kind: ContextKind,
}

/// Called by a host when it meets a symbol it does not know.
pub trait SymbolMissHook {
    /// Load the file defining `symbol`. Returns `Ok(false)` when no registered
    /// library declares it; reporting the undefined symbol is up to the host.
    fn on_missing_symbol(&self, symbol: &str) -> Result<bool, LoaderError>;
}

#[derive(Debug, Default)]
struct LoadState {
    contexts: Vec<LoadContext>,
    /// Successfully included files, in inclusion order.
    included: Vec<PathBuf>,
    included_set: HashSet<PathBuf>,
    /// Files whose execution has started but not finished, with the thread
    /// running them.
    in_progress: HashMap<PathBuf, ThreadId>,
    /// Threads blocked until another thread finishes including a file.
    waiting: HashMap<ThreadId, PathBuf>,
}

impl LoadState {
    /// Whether `thread` waiting for `path` would close a cycle of threads
    /// each waiting on a file another one of them is running.
    fn would_deadlock(&self, thread: ThreadId, path: &Path) -> bool {
        let mut owner = self.in_progress.get(path);
        for _ in 0..=self.waiting.len() {
            match owner {
                Some(owner) if *owner == thread => return true,
                Some(current) => match self.waiting.get(current) {
                    Some(next) => owner = self.in_progress.get(next),
                    None => return false,
                },
                None => return false,
            }
        }
        false
    }
}

/// Pops the context it pushed when dropped, whatever way the load ends.
struct ContextGuard<'a> {
    state: &'a Mutex<LoadState>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.contexts.pop();
    }
}

/// Removes a path from the in-progress set when dropped and wakes the
/// threads waiting for it.
struct InProgressGuard<'a> {
    state: &'a Mutex<LoadState>,
    finished: &'a Condvar,
    path: PathBuf,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_progress.remove(&self.path);
        drop(state);
        self.finished.notify_all();
    }
}

/// The load coordinator: one per process (or per test).
///
/// Holds the library registry, the symbol index and the set of included
/// files. No lock is held while a file executes, so the [`SourceExecutor`]
/// may call back into the loader.
///
/// A file being included by one thread is waited for by the others; only
/// the including thread itself sees it as already included.
pub struct Loader {
    config: LoaderConfig,
    file_provider: Arc<dyn FileProvider>,
    executor: Arc<dyn SourceExecutor>,
    registry: LibraryRegistry,
    symbols: SymbolIndex,
    state: Mutex<LoadState>,
    include_finished: Condvar,
}

impl Loader {
    pub fn new(
        config: LoaderConfig,
        file_provider: Arc<dyn FileProvider>,
        executor: Arc<dyn SourceExecutor>,
    ) -> Self {
        let registry = LibraryRegistry::new(config.marker_file.clone());
        let symbols = SymbolIndex::new(Arc::new(TomlSymbolMapSource::new(
            config.symbol_map_file.clone(),
        )));
        Self {
            config,
            file_provider,
            executor,
            registry,
            symbols,
            state: Mutex::new(LoadState::default()),
            include_finished: Condvar::new(),
        }
    }

    /// Loader over the real file system.
    #[cfg(feature = "native")]
    pub fn native(config: LoaderConfig, executor: Arc<dyn SourceExecutor>) -> Self {
        Self::new(config, Arc::new(crate::DefaultFileProvider), executor)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_context(&self, dir: PathBuf, kind: ContextKind) -> ContextGuard<'_> {
        log::trace!("entering {kind:?} context {}", dir.display());
        self.state().contexts.push(LoadContext { dir, kind });
        ContextGuard { state: &self.state }
    }

    fn absolute(&self, path: &Path) -> Result<PathBuf, LoaderError> {
        if path.is_absolute() {
            return Ok(normalize_path(path));
        }
        let cwd = std::env::current_dir().map_err(|e| {
            LoaderError::InvalidState(format!(
                "cannot resolve relative path {}: {e}",
                path.display()
            ))
        })?;
        Ok(normalize_path(&cwd.join(path)))
    }

    /// Register library `name` rooted at the directory holding `marker`.
    /// Returns the root.
    pub fn register_library(&self, name: &str, marker: &Path) -> Result<PathBuf, LoaderError> {
        let marker = self.absolute(marker)?;
        self.registry.register(name, &marker)
    }

    pub fn library_root(&self, name: &str) -> Result<PathBuf, LoaderError> {
        self.registry.root(name)
    }

    /// Registered library names, in registration order.
    pub fn libraries(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Install `map` for the library whose entry file is currently loading.
    pub fn register_library_map(&self, map: SymbolMap) -> Result<(), LoaderError> {
        let root = self
            .state()
            .contexts
            .iter()
            .rev()
            .find(|context| context.kind == ContextKind::Library)
            .map(|context| context.dir.clone())
            .ok_or_else(|| {
                LoaderError::InvalidState(
                    "a symbol map can only be registered while a library is loading".to_string(),
                )
            })?;
        let library = self.registry.name_for_root(&root).ok_or_else(|| {
            LoaderError::InvalidState(format!(
                "no library is registered at {}, register it before its symbol map",
                root.display()
            ))
        })?;

        log::debug!("installing {} symbols for `{library}`", map.len());
        self.symbols.install(&library, &root, map)
    }

    /// Include the entry file of the library at `path` and return the library root.
    ///
    /// A relative `path` is placed under the configured root prefix when there
    /// is one, under the current directory otherwise.
    pub fn load_library(&self, path: &Path) -> Result<PathBuf, LoaderError> {
        let root = match &self.config.root_prefix {
            Some(prefix) if !path.is_absolute() => self.absolute(&prefix.join(path))?,
            _ => self.absolute(path)?,
        };
        let entry = root.join(&self.config.marker_file);

        let _context = self.push_context(root.clone(), ContextKind::Library);
        self.include_guarded(&entry, format!("library `{}`", path.display()))?;
        Ok(root)
    }

    /// Include the entry file of `unit` inside `library`.
    pub fn require_unit(&self, library: &str, unit: &str) -> Result<(), LoaderError> {
        let unit_dir = normalize_path(&self.registry.root(library)?.join(unit));
        let entry = unit_dir.join(&self.config.marker_file);

        let _context = self.push_context(unit_dir, ContextKind::Unit);
        self.include_guarded(&entry, format!("unit `{library}/{unit}`"))
    }

    /// Include `relative` from the directory of the innermost load in progress.
    pub fn require_source(&self, relative: impl AsRef<Path>) -> Result<(), LoaderError> {
        let relative = relative.as_ref();
        let base = self
            .state()
            .contexts
            .last()
            .map(|context| context.dir.clone())
            .ok_or_else(|| {
                LoaderError::InvalidState(format!(
                    "source `{}` was requested outside of any library, unit or symbol load",
                    relative.display()
                ))
            })?;

        let path = normalize_path(&base.join(relative));
        self.include_guarded(&path, format!("source `{}`", relative.display()))
    }

    /// Whether the entry file of `unit` exists. Never includes anything.
    pub fn unit_exists(&self, library: &str, unit: &str) -> Result<bool, LoaderError> {
        let entry = normalize_path(&self.registry.root(library)?.join(unit))
            .join(&self.config.marker_file);
        self.file_provider
            .try_exists(&entry)
            .map_err(|e| LoaderError::Load {
                path: entry.clone(),
                request: format!("unit `{library}/{unit}`"),
                reason: LoadFailure::Unreadable(e),
            })
    }

    /// Units of `library`: sub-directories of its root that carry an entry file.
    pub fn units(&self, library: &str) -> Result<Vec<String>, LoaderError> {
        let root = self.registry.root(library)?;
        let entries = self
            .file_provider
            .list_directory(&root)
            .map_err(|e| LoaderError::Load {
                path: root.clone(),
                request: format!("unit listing of `{library}`"),
                reason: LoadFailure::Unreadable(e),
            })?;

        let mut units: Vec<String> = entries
            .into_iter()
            .filter(|dir| self.file_provider.is_directory(dir))
            .filter(|dir| self.file_provider.exists(&dir.join(&self.config.marker_file)))
            .filter_map(|dir| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();
        units.sort();
        Ok(units)
    }

    /// Find the library and file declaring `symbol` without loading anything
    /// but symbol maps.
    pub fn resolve_symbol(&self, symbol: &str) -> Result<Option<ResolvedSymbol>, LoaderError> {
        self.symbols
            .owner_of(self.file_provider.as_ref(), &self.registry.entries(), symbol)
    }

    /// Include the file declaring `symbol`.
    ///
    /// Returns `Ok(false)` when no registered library declares the symbol.
    pub fn autoload(&self, symbol: &str) -> Result<bool, LoaderError> {
        let Some(resolved) = self.resolve_symbol(symbol)? else {
            log::trace!("no library declares `{symbol}`");
            return Ok(false);
        };

        let root = self.registry.root(&resolved.library)?;
        let path = normalize_path(&root.join(&resolved.path));
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());

        let _context = self.push_context(dir, ContextKind::Symbol);
        self.include_guarded(
            &path,
            format!(
                "{} `{symbol}` of library `{}`",
                resolved.kind, resolved.library
            ),
        )?;
        Ok(true)
    }

    /// Include `path` at most once.
    ///
    /// When another thread is including `path`, blocks until it is done and
    /// reports its result as seen from here: already included on success, a
    /// fresh attempt otherwise. Absence is only logged at debug level; syntax
    /// errors reported by the executor are logged as errors.
    pub fn try_include(&self, path: &Path) -> IncludeOutcome {
        let path = match self.absolute(path) {
            Ok(path) => path,
            Err(e) => {
                return IncludeOutcome::Failed(LoadFailure::Unreadable(FileProviderError::IoError(
                    e.to_string(),
                )))
            }
        };

        let current = thread::current().id();
        {
            let mut state = self.state();
            loop {
                if state.included_set.contains(&path) {
                    log::trace!("{} already included", path.display());
                    return IncludeOutcome::AlreadyIncluded;
                }
                match state.in_progress.get(&path).copied() {
                    None => break,
                    Some(owner) if owner == current => {
                        log::debug!("{} is still being included, skipping", path.display());
                        return IncludeOutcome::AlreadyIncluded;
                    }
                    Some(_) if state.would_deadlock(current, &path) => {
                        log::debug!(
                            "{} is part of a cross-thread include cycle, skipping",
                            path.display()
                        );
                        return IncludeOutcome::AlreadyIncluded;
                    }
                    Some(_) => {
                        log::trace!("waiting for {} to be included", path.display());
                        state.waiting.insert(current, path.clone());
                        state = self
                            .include_finished
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                        state.waiting.remove(&current);
                    }
                }
            }
            state.in_progress.insert(path.clone(), current);
        }
        let _in_progress = InProgressGuard {
            state: &self.state,
            finished: &self.include_finished,
            path: path.clone(),
        };

        let source = match self.file_provider.read_file(&path) {
            Ok(source) => source,
            Err(FileProviderError::NotFound(_)) => {
                log::debug!("{} does not exist", path.display());
                return IncludeOutcome::NotFound;
            }
            Err(e) => return IncludeOutcome::Failed(LoadFailure::Unreadable(e)),
        };

        log::debug!("including {}", path.display());
        if let Err(err) = self.executor.execute(self, &path, &source) {
            if err.is_syntax() {
                log::error!("{}: {err}", path.display());
            }
            return IncludeOutcome::Failed(LoadFailure::Execution(err));
        }

        let mut state = self.state();
        state.included_set.insert(path.clone());
        state.included.push(path);
        IncludeOutcome::Included
    }

    fn include_guarded(&self, path: &Path, request: String) -> Result<(), LoaderError> {
        match self.try_include(path).into_failure() {
            None => Ok(()),
            Some(reason) => Err(LoaderError::Load {
                path: path.to_path_buf(),
                request,
                reason,
            }),
        }
    }

    /// Whether `path` has been included successfully.
    pub fn is_included(&self, path: &Path) -> bool {
        self.absolute(path)
            .map(|path| self.state().included_set.contains(&path))
            .unwrap_or(false)
    }

    /// Included files, in the order their inclusion completed.
    pub fn included_files(&self) -> Vec<PathBuf> {
        self.state().included.clone()
    }

    pub fn context_depth(&self) -> usize {
        self.state().contexts.len()
    }

    pub fn current_context(&self) -> Option<LoadContext> {
        self.state().contexts.last().cloned()
    }
}

impl SymbolMissHook for Loader {
    fn on_missing_symbol(&self, symbol: &str) -> Result<bool, LoaderError> {
        self.autoload(symbol)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("symbols", &self.symbols)
            .finish_non_exhaustive()
    }
}
