//! The archive facade: named roots in, definitions and imports out

use log::debug;
use ruff_python_stdlib::{identifiers::is_identifier, keyword::is_keyword};

use crate::{
    config::Config,
    encoder::EncoderRegistry,
    error::{ArchiveError, Result},
    graph::{Definition, DependencyGraph, RootEntry},
    graph_builder::GraphBuilder,
    imports::ImportDecl,
    names::UniqueNameAllocator,
    render,
    value::{Env, Heap, ObjRef},
};

/// The persistent form of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persistent {
    pub imports: Vec<ImportDecl>,
    pub definitions: Vec<Definition>,
}

/// Collects named objects from a [`Heap`] and turns them into a script
#[derive(Debug)]
pub struct Archive<'h> {
    heap: &'h Heap,
    config: Config,
    encoders: EncoderRegistry,
    roots: Vec<RootEntry>,
}

impl<'h> Archive<'h> {
    pub fn new(heap: &'h Heap) -> Self {
        Self::with_config(heap, Config::default())
    }

    pub fn with_config(heap: &'h Heap, config: Config) -> Self {
        Self {
            heap,
            config,
            encoders: EncoderRegistry::default(),
            roots: Vec::new(),
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub const fn encoders_mut(&mut self) -> &mut EncoderRegistry {
        &mut self.encoders
    }

    /// Insert `object` under `name` with an empty environment
    pub fn insert(&mut self, name: &str, object: ObjRef) -> Result<()> {
        self.insert_with_env(name, object, Env::default())
    }

    /// Insert `object` under `name`; free names in repr text resolve through
    /// `env`.
    ///
    /// Inserting the same object under the same name again is a no-op; a
    /// different object under a used name is a [`ArchiveError::NameCollision`].
    pub fn insert_with_env(&mut self, name: &str, object: ObjRef, env: Env) -> Result<()> {
        self.validate_name(name)?;
        if !self.heap.contains(object) {
            return Err(ArchiveError::UnknownObject(object));
        }

        if let Some(existing) = self.roots.iter().find(|root| root.name == name) {
            if existing.object == object {
                return Ok(());
            }
            return Err(ArchiveError::NameCollision(name.to_owned()));
        }

        if self.config.check_on_insert {
            self.encoders.decompose(self.heap.get(object)?, &env)?;
        }

        debug!("Inserted '{name}' ({object})");
        self.roots.push(RootEntry::new(name, object).with_env(env));
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        let reason = if !is_identifier(name) {
            "not a Python identifier"
        } else if is_keyword(name) {
            "is a Python keyword"
        } else if name.starts_with('_') && !self.config.is_allowed(name) {
            "must not start with '_'"
        } else {
            return Ok(());
        };
        Err(ArchiveError::InvalidName {
            name: name.to_owned(),
            reason,
        })
    }

    /// A name starting with `base` that no root uses yet
    pub fn unique_name(&self, base: &str) -> String {
        let mut names = UniqueNameAllocator::seeded(&self.config.separator, self.names());
        names.claim(base)
    }

    /// Root names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.roots.iter().map(|root| root.name.as_str())
    }

    pub fn roots(&self) -> &[RootEntry] {
        &self.roots
    }

    /// Build the unreduced dependency graph
    pub fn graph(&self) -> Result<DependencyGraph> {
        GraphBuilder::new(self.heap, &self.encoders, &self.config).build(&self.roots)
    }

    /// Build, reduce and return the imports and definitions.
    ///
    /// Runs at most `reduce-passes` reduction passes and stops early once a
    /// pass inlines nothing.
    pub fn make_persistent(&self) -> Result<Persistent> {
        let mut graph = self.graph()?;
        for pass in 0..self.config.reduce_passes {
            let inlined = graph.reduce()?;
            debug!("Reduction pass {pass} inlined {inlined} nodes");
            if inlined == 0 {
                break;
            }
        }
        Ok(Persistent {
            imports: graph.imports(),
            definitions: graph.definitions(),
        })
    }

    /// The archive as a Python script
    pub fn render(&self) -> Result<String> {
        let persistent = self.make_persistent()?;
        Ok(render::render(&persistent, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_insert_validates_names() {
        let mut heap = Heap::new();
        let one = heap.int(1);
        let mut archive = Archive::new(&heap);
        for bad in ["1x", "lambda", "_x", "a-b", ""] {
            assert!(
                matches!(archive.insert(bad, one), Err(ArchiveError::InvalidName { .. })),
                "{bad}"
            );
        }
        archive.config_mut().allowed_names.push("_x".to_owned());
        archive.insert("_x", one).unwrap();
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut heap = Heap::new();
        let one = heap.int(1);
        let two = heap.int(2);
        let mut archive = Archive::new(&heap);
        archive.insert("x", one).unwrap();
        archive.insert("x", one).unwrap();
        assert_eq!(archive.roots().len(), 1);
        assert!(matches!(
            archive.insert("x", two),
            Err(ArchiveError::NameCollision(_))
        ));
        let name = archive.unique_name("x");
        assert_eq!(name, "x_0");
        archive.insert(&name, two).unwrap();
        assert_eq!(archive.names().collect::<Vec<_>>(), ["x", "x_0"]);
    }

    #[test]
    fn test_check_on_insert_reports_encoder_errors() {
        let mut heap = Heap::new();
        let value = heap.repr("thing");
        let mut archive = Archive::new(&heap);
        *archive.encoders_mut() = EncoderRegistry::empty();

        archive.insert("lazy", value).unwrap();
        archive.config_mut().check_on_insert = true;
        assert!(matches!(
            archive.insert("eager", value),
            Err(ArchiveError::NoEncoder(_))
        ));
        assert!(matches!(
            archive.make_persistent(),
            Err(ArchiveError::NoEncoder(_))
        ));
    }

    #[test]
    fn test_unknown_object_rejected() {
        let heap = Heap::new();
        let mut archive = Archive::new(&heap);
        assert!(matches!(
            archive.insert("x", ObjRef::new(0)),
            Err(ArchiveError::UnknownObject(_))
        ));
    }

    #[test]
    fn test_reduce_passes_zero_keeps_everything() {
        let mut heap = Heap::new();
        let one = heap.int(1);
        let list = heap.list(vec![one]);
        let mut archive = Archive::new(&heap);
        archive.insert("l", list).unwrap();
        archive.config_mut().reduce_passes = 0;
        let persistent = archive.make_persistent().unwrap();
        assert_eq!(persistent.definitions.len(), 2);

        archive.config_mut().reduce_passes = 1;
        let persistent = archive.make_persistent().unwrap();
        assert_eq!(
            persistent.definitions,
            [Definition {
                name: "l".to_owned(),
                template: "[1]".to_owned()
            }]
        );
    }

    #[test]
    fn test_env_flows_to_repr_imports() {
        let mut heap = Heap::new();
        let array = heap.alloc(Value::Repr {
            text: "array([1, 2])".to_owned(),
        });
        let mut archive = Archive::new(&heap);
        archive
            .insert_with_env("a", array, Env::new().with("array", "numpy"))
            .unwrap();
        let persistent = archive.make_persistent().unwrap();
        assert_eq!(persistent.imports[0].to_string(), "from numpy import array");
        assert_eq!(persistent.definitions[0].to_string(), "a = array([1, 2])");
    }
}
