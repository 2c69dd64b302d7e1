//! External symbol references and import coalescing

use std::fmt;

use log::debug;

use crate::{names::UniqueNameAllocator, types::FxIndexMap};

/// A symbol a template needs from outside the archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalSymbolRef {
    /// Module the symbol comes from
    pub source: String,
    /// Symbol inside `source`; `None` imports the module itself
    pub name: Option<String>,
    /// Name the template uses for the symbol
    pub alias: String,
}

impl ExternalSymbolRef {
    /// `import source`, bound to an identifier alias.
    ///
    /// A dotted source such as `os.path` is bound as `os_path`, so the
    /// declaration reads `import os.path as os_path` and the cleanup deletes
    /// only that alias.
    pub fn module(source: &str) -> Self {
        Self {
            source: source.to_owned(),
            name: None,
            alias: source.replace('.', "_"),
        }
    }

    /// `from source import name`
    pub fn symbol(source: &str, name: &str) -> Self {
        Self {
            source: source.to_owned(),
            name: Some(name.to_owned()),
            alias: name.to_owned(),
        }
    }

    /// `from source import name as alias` (or `import source as alias` when
    /// `name` is `None`)
    pub fn aliased(source: &str, name: Option<&str>, alias: &str) -> Self {
        Self {
            source: source.to_owned(),
            name: name.map(str::to_owned),
            alias: alias.to_owned(),
        }
    }

    fn key(&self) -> (String, Option<String>) {
        (self.source.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportForm {
    /// `import source` or `import source as alias`
    Module,
    /// `from source import name`
    Plain,
    /// `from source import name as alias`
    Aliased,
}

/// A final import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub source: String,
    pub name: Option<String>,
    pub alias: String,
}

impl ImportDecl {
    pub fn form(&self) -> ImportForm {
        match &self.name {
            None => ImportForm::Module,
            Some(name) if *name == self.alias => ImportForm::Plain,
            Some(_) => ImportForm::Aliased,
        }
    }
}

impl fmt::Display for ImportDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            None if self.source == self.alias => write!(f, "import {}", self.source),
            None => write!(f, "import {} as {}", self.source, self.alias),
            Some(name) if *name == self.alias => {
                write!(f, "from {} import {name}", self.source)
            }
            Some(name) => write!(f, "from {} import {name} as {}", self.source, self.alias),
        }
    }
}

/// Deduplicates external references by (source, name), one alias per pair
#[derive(Debug, Clone, Default)]
pub struct ImportCoalescer {
    table: FxIndexMap<(String, Option<String>), String>,
}

impl ImportCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `symbol` and return the alias templates must use for it.
    ///
    /// The first reference to a pair claims its desired alias through
    /// `names`, so the alias never shadows an object or an earlier import.
    pub fn coalesce(
        &mut self,
        symbol: &ExternalSymbolRef,
        names: &mut UniqueNameAllocator,
    ) -> String {
        let key = symbol.key();
        if let Some(alias) = self.table.get(&key) {
            return alias.clone();
        }
        let alias = names.claim(&symbol.alias);
        if alias != symbol.alias {
            debug!(
                "Import alias '{}' for {}.{} taken, using '{alias}'",
                symbol.alias,
                symbol.source,
                symbol.name.as_deref().unwrap_or("*")
            );
        }
        self.table.insert(key, alias.clone());
        alias
    }

    pub fn alias_for(&self, source: &str, name: Option<&str>) -> Option<&str> {
        self.table
            .get(&(source.to_owned(), name.map(str::to_owned)))
            .map(String::as_str)
    }

    /// Declarations in first-seen order
    pub fn declarations(&self) -> Vec<ImportDecl> {
        self.table
            .iter()
            .map(|((source, name), alias)| ImportDecl {
                source: source.clone(),
                name: name.clone(),
                alias: alias.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_forms() {
        let decl = |source: &str, name: Option<&str>, alias: &str| ImportDecl {
            source: source.to_owned(),
            name: name.map(str::to_owned),
            alias: alias.to_owned(),
        };
        assert_eq!(decl("os", None, "os").to_string(), "import os");
        assert_eq!(decl("numpy", None, "np").to_string(), "import numpy as np");
        assert_eq!(decl("math", Some("inf"), "inf").to_string(), "from math import inf");
        assert_eq!(
            decl("math", Some("inf"), "inf_0").to_string(),
            "from math import inf as inf_0"
        );
        assert_eq!(decl("math", Some("inf"), "inf_0").form(), ImportForm::Aliased);
        assert_eq!(decl("os", None, "os").form(), ImportForm::Module);
        assert_eq!(
            decl("os.path", None, "os_path").to_string(),
            "import os.path as os_path"
        );
    }

    #[test]
    fn test_dotted_module_alias_is_an_identifier() {
        let mut names = UniqueNameAllocator::seeded("_", ["os_path"]);
        let mut imports = ImportCoalescer::new();
        let symbol = ExternalSymbolRef::module("os.path");
        assert_eq!(symbol.alias, "os_path");

        let alias = imports.coalesce(&symbol, &mut names);
        assert_eq!(alias, "os_path_0");
        assert_eq!(
            imports.declarations()[0].to_string(),
            "import os.path as os_path_0"
        );
    }

    #[test]
    fn test_same_module_coalesced() {
        let mut names = UniqueNameAllocator::default();
        let mut imports = ImportCoalescer::new();
        let first = imports.coalesce(&ExternalSymbolRef::module("moduleFoo"), &mut names);
        let second = imports.coalesce(&ExternalSymbolRef::module("moduleFoo"), &mut names);
        assert_eq!(first, "moduleFoo");
        assert_eq!(first, second);
        assert_eq!(imports.declarations().len(), 1);
    }

    #[test]
    fn test_alias_avoids_taken_names() {
        let mut names = UniqueNameAllocator::seeded("_", ["inf"]);
        let mut imports = ImportCoalescer::new();
        let alias = imports.coalesce(&ExternalSymbolRef::symbol("math", "inf"), &mut names);
        assert_eq!(alias, "inf_0");
        assert_eq!(imports.alias_for("math", Some("inf")), Some("inf_0"));
        assert_eq!(
            imports.declarations()[0].to_string(),
            "from math import inf as inf_0"
        );
    }

    #[test]
    fn test_distinct_sources_with_same_alias() {
        let mut names = UniqueNameAllocator::default();
        let mut imports = ImportCoalescer::new();
        let a = imports.coalesce(&ExternalSymbolRef::symbol("numpy", "array"), &mut names);
        let b = imports.coalesce(&ExternalSymbolRef::symbol("array", "array"), &mut names);
        assert_eq!((a.as_str(), b.as_str()), ("array", "array_0"));
        // Later lookups by key return the claimed alias
        let again = imports.coalesce(
            &ExternalSymbolRef::aliased("array", Some("array"), "arr"),
            &mut names,
        );
        assert_eq!(again, "array_0");
    }
}
