use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{FileProvider, FileProviderError, LoadFailure};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    #[default]
    Class,
    Function,
    Constant,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Constant => "constant",
        };
        f.write_str(kind)
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" => Ok(SymbolKind::Class),
            "function" => Ok(SymbolKind::Function),
            "constant" => Ok(SymbolKind::Constant),
            other => Err(format!(
                "unknown symbol kind `{other}` (expected class, function or constant)"
            )),
        }
    }
}

/// Where a symbol is defined, relative to its library root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    #[serde(default)]
    pub kind: SymbolKind,
    pub path: PathBuf,
}

impl SymbolEntry {
    pub fn new(kind: SymbolKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Symbol name to defining file, for a single library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMap {
    #[serde(default)]
    symbols: BTreeMap<String, SymbolEntry>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, symbol: impl Into<String>, entry: SymbolEntry) -> Self {
        self.insert(symbol, entry);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, entry: SymbolEntry) -> Option<SymbolEntry> {
        self.symbols.insert(symbol.into(), entry)
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolEntry> {
        self.symbols.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SymbolEntry)> {
        self.symbols.iter()
    }

    /// Merge `other` into `self`. Existing entries win; the names of symbols
    /// that `other` tried to move elsewhere are returned.
    pub fn merge(&mut self, other: SymbolMap) -> Vec<String> {
        let mut conflicts = Vec::new();
        for (symbol, entry) in other.symbols {
            match self.symbols.get(&symbol) {
                Some(existing) if *existing != entry => conflicts.push(symbol),
                Some(_) => {}
                None => {
                    self.symbols.insert(symbol, entry);
                }
            }
        }
        conflicts
    }

    /// Parse the TOML form of a symbol map.
    pub fn from_toml(contents: &str) -> Result<Self, LoadFailure> {
        let map: SymbolMap = toml::from_str(contents)
            .map_err(|e| LoadFailure::InvalidSymbolMap(e.message().to_string()))?;
        map.validate()?;
        Ok(map)
    }

    /// Every entry must point inside its library.
    pub fn validate(&self) -> Result<(), LoadFailure> {
        for (symbol, entry) in &self.symbols {
            let escapes = entry
                .path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes || entry.path.as_os_str().is_empty() {
                return Err(LoadFailure::InvalidSymbolMap(format!(
                    "symbol `{symbol}` must point to a path relative to the library root, got `{}`",
                    entry.path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Produces the symbol map of a library. Called at most once per library.
pub trait SymbolMapSource: Send + Sync {
    fn fetch(&self, file_provider: &dyn FileProvider, root: &Path)
        -> Result<SymbolMap, LoadFailure>;

    /// The file the map is read from, for error reporting.
    fn location(&self, root: &Path) -> PathBuf;
}

/// Reads `<root>/<file_name>` as TOML.
#[derive(Debug, Clone)]
pub struct TomlSymbolMapSource {
    file_name: String,
}

impl TomlSymbolMapSource {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for TomlSymbolMapSource {
    fn default() -> Self {
        Self::new(crate::SYMBOL_MAP_FILE)
    }
}

impl SymbolMapSource for TomlSymbolMapSource {
    fn fetch(
        &self,
        file_provider: &dyn FileProvider,
        root: &Path,
    ) -> Result<SymbolMap, LoadFailure> {
        let path = self.location(root);
        let contents = file_provider.read_file(&path).map_err(|e| match e {
            FileProviderError::NotFound(_) => LoadFailure::NotFound,
            other => LoadFailure::Unreadable(other),
        })?;
        SymbolMap::from_toml(&contents)
    }

    fn location(&self, root: &Path) -> PathBuf {
        root.join(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_with_default_kind() {
        let map = SymbolMap::from_toml(
            r#"
            [symbols]
            Foo = { path = "foo.src" }
            make_foo = { kind = "function", path = "util/make.src" }
            "#,
        )
        .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("Foo"),
            Some(&SymbolEntry::new(SymbolKind::Class, "foo.src"))
        );
        assert_eq!(map.get("make_foo").unwrap().kind, SymbolKind::Function);
        assert_eq!(map.get("Bar"), None);
    }

    #[test]
    fn rejects_paths_outside_the_library() {
        for path in ["/etc/passwd", "../other/foo.src", ""] {
            let contents = format!("[symbols]\nFoo = {{ path = \"{path}\" }}\n");
            assert!(
                matches!(
                    SymbolMap::from_toml(&contents),
                    Err(LoadFailure::InvalidSymbolMap(_))
                ),
                "accepted {path:?}"
            );
        }
    }

    #[test]
    fn rejects_unknown_kinds() {
        let err = SymbolMap::from_toml("[symbols]\nFoo = { kind = \"trait\", path = \"a\" }\n")
            .unwrap_err();
        assert!(matches!(err, LoadFailure::InvalidSymbolMap(_)));
    }

    #[test]
    fn merge_keeps_first_definition() {
        let mut map = SymbolMap::new().with("Foo", SymbolEntry::new(SymbolKind::Class, "a.src"));
        let conflicts = map.merge(
            SymbolMap::new()
                .with("Foo", SymbolEntry::new(SymbolKind::Class, "b.src"))
                .with("Bar", SymbolEntry::new(SymbolKind::Constant, "c.src")),
        );

        assert_eq!(conflicts, vec!["Foo".to_string()]);
        assert_eq!(map.get("Foo").unwrap().path, PathBuf::from("a.src"));
        assert_eq!(map.get("Bar").unwrap().kind, SymbolKind::Constant);
    }

    #[test]
    fn kind_round_trips_through_display() {
        for kind in [SymbolKind::Class, SymbolKind::Function, SymbolKind::Constant] {
            assert_eq!(kind.to_string().parse::<SymbolKind>(), Ok(kind));
        }
        assert!("module".parse::<SymbolKind>().is_err());
    }
}
