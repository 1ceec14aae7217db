use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::{
    FileProvider, LoadFailure, LoaderError, SymbolEntry, SymbolKind, SymbolMap, SymbolMapSource,
};

/// A symbol located in a registered library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSymbol {
    pub symbol: String,
    pub library: String,
    pub kind: SymbolKind,
    /// Path of the defining file, relative to the library root.
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct Aggregate {
    owners: HashMap<String, (String, SymbolEntry)>,
    /// Libraries whose maps have been folded into `owners`.
    folded: HashSet<String>,
}

/// Per-library symbol maps plus the cross-library lookup table used by the
/// symbol-miss hook.
pub struct SymbolIndex {
    source: Arc<dyn SymbolMapSource>,
    maps: Mutex<HashMap<String, Arc<SymbolMap>>>,
    aggregate: Mutex<Aggregate>,
}

impl SymbolIndex {
    pub fn new(source: Arc<dyn SymbolMapSource>) -> Self {
        Self {
            source,
            maps: Mutex::new(HashMap::new()),
            aggregate: Mutex::new(Aggregate::default()),
        }
    }

    fn maps(&self) -> MutexGuard<'_, HashMap<String, Arc<SymbolMap>>> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn aggregate(&self) -> MutexGuard<'_, Aggregate> {
        self.aggregate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the map of `library` has been fetched or installed.
    pub fn is_loaded(&self, library: &str) -> bool {
        self.maps().contains_key(library)
    }

    /// Fetch the map of `library` unless it is already cached.
    ///
    /// The index lock is held across the fetch so two first references to the
    /// same library never both hit the source.
    pub fn ensure_loaded(
        &self,
        file_provider: &dyn FileProvider,
        library: &str,
        root: &Path,
    ) -> Result<Arc<SymbolMap>, LoaderError> {
        let mut maps = self.maps();
        if let Some(map) = maps.get(library) {
            return Ok(map.clone());
        }

        let location = self.source.location(root);
        log::debug!(
            "reading symbol map of `{library}` from {}",
            location.display()
        );
        let map = self
            .source
            .fetch(file_provider, root)
            .map_err(|reason| LoaderError::Load {
                path: location,
                request: format!("symbol map of library `{library}`"),
                reason,
            })?;
        log::debug!("library `{library}` declares {} symbols", map.len());

        let map = Arc::new(map);
        maps.insert(library.to_string(), map.clone());
        Ok(map)
    }

    /// Look a symbol up in one library. `Ok(None)` is the ordinary "not here" answer.
    pub fn resolve(
        &self,
        file_provider: &dyn FileProvider,
        library: &str,
        root: &Path,
        symbol: &str,
    ) -> Result<Option<SymbolEntry>, LoaderError> {
        let map = self.ensure_loaded(file_provider, library, root)?;
        Ok(map.get(symbol).cloned())
    }

    /// Merge an explicitly supplied map into the map of `library`.
    ///
    /// Installing counts as loading: the source is not consulted for this
    /// library afterwards.
    pub fn install(&self, library: &str, root: &Path, map: SymbolMap) -> Result<(), LoaderError> {
        map.validate().map_err(|reason| LoaderError::Load {
            path: root.to_path_buf(),
            request: format!("symbol map of library `{library}`"),
            reason,
        })?;

        {
            let mut maps = self.maps();
            let merged = match maps.get(library) {
                Some(existing) => {
                    let mut merged = existing.as_ref().clone();
                    for symbol in merged.merge(map) {
                        log::warn!(
                            "library `{library}` already maps `{symbol}`, keeping the first definition"
                        );
                    }
                    merged
                }
                None => map,
            };
            maps.insert(library.to_string(), Arc::new(merged));
        }

        // Refold on the next aggregated lookup.
        self.aggregate().folded.remove(library);
        Ok(())
    }

    /// Find which of `libraries` (name and root, in registration order)
    /// declares `symbol`.
    ///
    /// Every library that has not been folded yet is loaded and merged into the
    /// aggregated table first. Earlier libraries win ties. A library without a
    /// map yet is skipped and tried again on the next lookup, so its entry file
    /// can still install one; a map that exists but is invalid is an error.
    pub fn owner_of(
        &self,
        file_provider: &dyn FileProvider,
        libraries: &[(String, PathBuf)],
        symbol: &str,
    ) -> Result<Option<ResolvedSymbol>, LoaderError> {
        let pending: Vec<&(String, PathBuf)> = {
            let aggregate = self.aggregate();
            libraries
                .iter()
                .filter(|(name, _)| !aggregate.folded.contains(name))
                .collect()
        };

        for (library, root) in pending {
            let map = match self.ensure_loaded(file_provider, library, root) {
                Ok(map) => map,
                Err(LoaderError::Load {
                    path,
                    reason: LoadFailure::NotFound,
                    ..
                }) => {
                    log::debug!(
                        "library `{library}` has no symbol map at {} yet, skipping it",
                        path.display()
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            let mut aggregate = self.aggregate();
            for (name, entry) in map.iter() {
                let owner = aggregate.owners.get(name).map(|(owner, _)| owner.clone());
                match owner {
                    Some(owner) if owner != *library => {
                        log::warn!(
                            "symbol `{name}` is declared by both `{owner}` and `{library}`, using `{owner}`"
                        );
                    }
                    _ => {
                        aggregate
                            .owners
                            .insert(name.clone(), (library.clone(), entry.clone()));
                    }
                }
            }
            aggregate.folded.insert(library.clone());
        }

        let aggregate = self.aggregate();
        Ok(aggregate
            .owners
            .get(symbol)
            .map(|(library, entry)| ResolvedSymbol {
                symbol: symbol.to_string(),
                library: library.clone(),
                kind: entry.kind,
                path: entry.path.clone(),
            }))
    }
}

impl std::fmt::Debug for SymbolIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut libraries: Vec<String> = self.maps().keys().cloned().collect();
        libraries.sort();
        f.debug_struct("SymbolIndex")
            .field("loaded", &libraries)
            .finish_non_exhaustive()
    }
}
