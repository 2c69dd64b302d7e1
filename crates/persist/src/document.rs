//! TOML object documents
//!
//! A document describes a heap of named objects, the roots to archive and the
//! environment used to resolve free names in repr text:
//!
//! ```toml
//! roots = ["config"]
//!
//! [objects]
//! shared = [1, 2]
//! config = { a = "@shared", b = "@shared", t = { __tuple__ = [1, "@@x"] } }
//! clock = { __repr__ = "datetime(2024, 1, 1)" }
//!
//! [env]
//! datetime = "datetime"
//! ```
//!
//! Strings starting with `@` refer to another named object, `@@` escapes a
//! literal leading `@`. Arrays become lists and tables become dicts with
//! string keys, except for the single-key forms `__tuple__` and `__repr__`.
//! `roots` defaults to every object in document order.

use log::{debug, trace};
use rustc_hash::FxHashSet;
use toml::{Table, Value as TomlValue};

use crate::{
    archive::Archive,
    config::Config,
    error::{ArchiveError, Result},
    types::FxIndexMap,
    value::{Env, Heap, ObjRef, Scalar, SequenceKind, Value},
};

const TOP_LEVEL_KEYS: [&str; 4] = ["roots", "objects", "env", "config"];

/// A parsed object document
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub heap: Heap,
    /// Named objects in document order
    pub objects: FxIndexMap<String, ObjRef>,
    pub roots: Vec<String>,
    pub env: Env,
    /// The `[config]` table, if the document has one
    pub config: Option<Config>,
}

impl LoadedDocument {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let document: Table = toml::from_str(text).map_err(|err| invalid(err.to_string()))?;

        if let Some(key) = document
            .keys()
            .find(|key| !TOP_LEVEL_KEYS.contains(&key.as_str()))
        {
            return Err(invalid(format!("unknown top-level key '{key}'")));
        }

        let empty = Table::new();
        let objects_table = match document.get("objects") {
            Some(TomlValue::Table(table)) => table,
            Some(other) => return Err(not_a_table("objects", other)),
            None => &empty,
        };

        let mut loader = Loader::default();
        loader.bind_names(objects_table)?;
        loader.fill(objects_table)?;

        let roots = match document.get("roots") {
            Some(roots) => string_array("roots", roots)?,
            None => objects_table.keys().cloned().collect(),
        };
        if let Some(missing) = roots.iter().find(|root| !loader.objects.contains_key(*root)) {
            return Err(invalid(format!("root '{missing}' is not a named object")));
        }

        let env = match document.get("env") {
            Some(TomlValue::Table(table)) => env_from_table(table)?,
            Some(other) => return Err(not_a_table("env", other)),
            None => Env::new(),
        };

        let config = document
            .get("config")
            .cloned()
            .map(TomlValue::try_into::<Config>)
            .transpose()?;

        debug!(
            "Loaded document with {} named objects ({} heap values) and {} roots",
            loader.objects.len(),
            loader.heap.len(),
            roots.len()
        );
        Ok(Self {
            heap: loader.heap,
            objects: loader.objects,
            roots,
            env,
            config,
        })
    }

    pub fn object(&self, name: &str) -> Option<ObjRef> {
        self.objects.get(name).copied()
    }

    /// An archive over this document's heap with every root inserted
    pub fn archive(&self, config: Config) -> Result<Archive<'_>> {
        let mut archive = Archive::with_config(&self.heap, config);
        for root in &self.roots {
            let object = self
                .object(root)
                .ok_or_else(|| invalid(format!("root '{root}' is not a named object")))?;
            archive.insert_with_env(root, object, self.env.clone())?;
        }
        Ok(archive)
    }
}

fn invalid(message: String) -> ArchiveError {
    ArchiveError::InvalidDocument(message)
}

fn not_a_table(key: &str, value: &TomlValue) -> ArchiveError {
    invalid(format!("'{key}' must be a table, not {}", value.type_str()))
}

/// The target of an `@name` reference, or `None` for any other value
fn reference(value: &TomlValue) -> Option<&str> {
    let text = value.as_str()?;
    let target = text.strip_prefix('@')?;
    if target.starts_with('@') {
        None
    } else {
        Some(target)
    }
}

fn string_array(key: &str, value: &TomlValue) -> Result<Vec<String>> {
    let TomlValue::Array(items) = value else {
        return Err(invalid(format!("'{key}' must be an array of strings")));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| invalid(format!("'{key}' must be an array of strings")))
        })
        .collect()
}

fn env_from_table(table: &Table) -> Result<Env> {
    let mut env = Env::new();
    for (symbol, module) in table {
        let module = module
            .as_str()
            .ok_or_else(|| invalid(format!("env entry '{symbol}' must name a module")))?;
        env.insert(symbol, module);
    }
    Ok(env)
}

#[derive(Default)]
struct Loader {
    heap: Heap,
    objects: FxIndexMap<String, ObjRef>,
}

impl Loader {
    /// Give every named object a handle before any value is built, so
    /// references may point forward
    fn bind_names(&mut self, table: &Table) -> Result<()> {
        for (name, value) in table {
            if reference(value).is_none() {
                let handle = self.heap.placeholder();
                self.objects.insert(name.clone(), handle);
            }
        }

        // A top-level reference makes the name another handle to its target
        for (name, value) in table {
            if reference(value).is_none() {
                continue;
            }
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            let mut current = value;
            let target = loop {
                let Some(target) = reference(current) else {
                    break None;
                };
                if !seen.insert(target) {
                    return Err(invalid(format!("reference cycle through '{name}'")));
                }
                if let Some(handle) = self.objects.get(target) {
                    break Some(*handle);
                }
                current = table.get(target).ok_or_else(|| {
                    invalid(format!("'{name}' refers to unknown object '{target}'"))
                })?;
            };
            let Some(target) = target else {
                return Err(invalid(format!("'{name}' does not resolve to an object")));
            };
            trace!("'{name}' is another name for {target}");
            self.objects.insert(name.clone(), target);
        }

        // Restore document order, which the alias pass disturbed
        let mut ordered = FxIndexMap::default();
        for name in table.keys() {
            if let Some(handle) = self.objects.get(name) {
                ordered.insert(name.clone(), *handle);
            }
        }
        self.objects = ordered;
        Ok(())
    }

    fn fill(&mut self, table: &Table) -> Result<()> {
        for (name, value) in table {
            if reference(value).is_some() {
                continue;
            }
            let handle = self
                .objects
                .get(name)
                .copied()
                .ok_or_else(|| invalid(format!("object '{name}' has no handle")))?;
            let value = self.value(value).map_err(|err| match err {
                ArchiveError::InvalidDocument(message) => {
                    invalid(format!("in '{name}': {message}"))
                }
                other => other,
            })?;
            self.heap.replace(handle, value)?;
        }
        Ok(())
    }

    /// A handle for a nested value: the named object for a reference, a fresh
    /// object otherwise
    fn object(&mut self, value: &TomlValue) -> Result<ObjRef> {
        if let Some(target) = reference(value) {
            return self
                .objects
                .get(target)
                .copied()
                .ok_or_else(|| invalid(format!("unknown object '{target}'")));
        }
        let value = self.value(value)?;
        Ok(self.heap.alloc(value))
    }

    fn value(&mut self, value: &TomlValue) -> Result<Value> {
        let scalar = match value {
            TomlValue::String(text) => {
                let text = text.strip_prefix('@').unwrap_or(text);
                Scalar::Str(text.to_owned())
            }
            TomlValue::Integer(int) => Scalar::Int(*int),
            TomlValue::Float(float) => Scalar::Float(*float),
            TomlValue::Boolean(flag) => Scalar::Bool(*flag),
            TomlValue::Datetime(datetime) => {
                return Err(invalid(format!("datetime {datetime} is not supported")));
            }
            TomlValue::Array(items) => {
                return Ok(Value::Sequence {
                    kind: SequenceKind::List,
                    items: self.objects_of(items)?,
                });
            }
            TomlValue::Table(table) => return self.table(table),
        };
        Ok(Value::Scalar(scalar))
    }

    fn table(&mut self, table: &Table) -> Result<Value> {
        if table.len() == 1 {
            if let Some(items) = table.get("__tuple__") {
                let TomlValue::Array(items) = items else {
                    return Err(invalid("'__tuple__' must be an array".to_owned()));
                };
                return Ok(Value::Sequence {
                    kind: SequenceKind::Tuple,
                    items: self.objects_of(items)?,
                });
            }
            if let Some(text) = table.get("__repr__") {
                let text = text
                    .as_str()
                    .ok_or_else(|| invalid("'__repr__' must be a string".to_owned()))?;
                return Ok(Value::Repr {
                    text: text.to_owned(),
                });
            }
        }

        let mut entries = Vec::with_capacity(table.len());
        for (key, value) in table {
            let key = self.heap.str(key);
            entries.push((key, self.object(value)?));
        }
        Ok(Value::Mapping(entries))
    }

    fn objects_of(&mut self, items: &[TomlValue]) -> Result<Vec<ObjRef>> {
        items.iter().map(|item| self.object(item)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> LoadedDocument {
        LoadedDocument::from_toml_str(text).unwrap()
    }

    fn load_err(text: &str) -> String {
        match LoadedDocument::from_toml_str(text) {
            Err(ArchiveError::InvalidDocument(message)) => message,
            other => panic!("expected an invalid document, got {other:?}"),
        }
    }

    #[test]
    fn test_references_share_identity() {
        let document = load(
            r#"
            [objects]
            d = { a = "@shared", b = "@shared" }
            shared = [1, 2]
            "#,
        );
        let shared = document.object("shared").unwrap();
        let Value::Mapping(entries) = document.heap.get(document.object("d").unwrap()).unwrap()
        else {
            panic!("expected a mapping");
        };
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|(_, value)| *value == shared));
        assert_eq!(document.roots, ["d", "shared"]);
    }

    #[test]
    fn test_special_tables_and_escapes() {
        let document = load(
            r#"
            roots = ["t"]
            [objects]
            t = { __tuple__ = ["@@at", { __repr__ = "now()" }, true, 1.5] }
            "#,
        );
        let Value::Sequence { kind, items } =
            document.heap.get(document.object("t").unwrap()).unwrap()
        else {
            panic!("expected a sequence");
        };
        assert_eq!(*kind, SequenceKind::Tuple);
        let values: Vec<&Value> = items
            .iter()
            .map(|item| document.heap.get(*item).unwrap())
            .collect();
        assert!(matches!(values[0], Value::Scalar(Scalar::Str(s)) if s == "@at"));
        assert!(matches!(values[1], Value::Repr { text } if text == "now()"));
        assert!(matches!(values[2], Value::Scalar(Scalar::Bool(true))));
        assert!(
            matches!(values[3], Value::Scalar(Scalar::Float(f)) if (*f - 1.5).abs() < f64::EPSILON)
        );
    }

    #[test]
    fn test_top_level_reference_is_same_object() {
        let document = load(
            r#"
            [objects]
            a = []
            b = "@c"
            c = "@a"
            "#,
        );
        assert_eq!(document.object("a"), document.object("b"));
        assert_eq!(document.object("a"), document.object("c"));
        assert_eq!(document.objects.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(load_err("[objects]\na = [\"@missing\"]").contains("unknown object 'missing'"));
        assert!(load_err("[objects]\na = \"@b\"\nb = \"@a\"").contains("reference cycle"));
        assert!(load_err("roots = [\"x\"]\n[objects]\na = 1").contains("root 'x'"));
        assert!(load_err("extra = 1").contains("unknown top-level key"));
        assert!(load_err("[objects]\nwhen = 1979-05-27").contains("datetime"));
    }

    #[test]
    fn test_env_and_config_tables() {
        let document = load(
            r#"
            [objects]
            a = { __repr__ = "array([1])" }
            [env]
            array = "numpy"
            [config]
            reduce-passes = 2
            "#,
        );
        assert_eq!(document.env.resolve("array"), Some("numpy"));
        assert_eq!(document.config.map(|config| config.reduce_passes), Some(2));

        assert!(matches!(
            LoadedDocument::from_toml_str("[config]\nbogus = 1"),
            Err(ArchiveError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cyclic_document_rejected_at_build() {
        let document = load(
            r#"
            [objects]
            a = ["@b"]
            b = ["@a"]
            "#,
        );
        let archive = document.archive(Config::default()).unwrap();
        assert!(matches!(
            archive.make_persistent(),
            Err(ArchiveError::Cycle { .. })
        ));
    }
}
