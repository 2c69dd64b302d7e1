//! Builds a [`DependencyGraph`] from named roots
//!
//! The build runs in fixed phases: insert roots, discover every reachable
//! object depth-first, order the nodes, name the intermediate ones, then
//! coalesce imports and rewrite each template once with the final names.

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::{
    config::Config,
    encoder::EncoderRegistry,
    error::{ArchiveError, Result},
    graph::{DependencyGraph, Node, NodeId, RootEntry},
    names::UniqueNameAllocator,
    rewrite::Replacements,
    template::Template,
    types::FxIndexSet,
    value::{Env, Heap, ObjRef},
};

/// Children of a freshly created node that still need to be visited
type Pending = std::vec::IntoIter<(String, ObjRef)>;

#[derive(Debug)]
pub struct GraphBuilder<'a> {
    heap: &'a Heap,
    encoders: &'a EncoderRegistry,
    temp_prefix: &'a str,
    graph: DependencyGraph,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(heap: &'a Heap, encoders: &'a EncoderRegistry, config: &'a Config) -> Self {
        Self {
            heap,
            encoders,
            temp_prefix: &config.temp_prefix,
            graph: DependencyGraph::new(
                UniqueNameAllocator::new(&config.separator),
                config.rewriter(),
            ),
        }
    }

    /// Build the graph for `roots`, in order
    pub fn build(mut self, roots: &[RootEntry]) -> Result<DependencyGraph> {
        debug!("Building dependency graph from {} roots", roots.len());

        let pending = self.insert_roots(roots)?;
        for (root, children, env) in pending {
            self.discover(root, children, env)?;
        }
        debug!("Discovered {} objects", self.graph.nodes.len());

        self.graph.order = self.graph.topological_order()?;
        self.assign_names()?;
        self.resolve_templates()?;

        debug!(
            "Built graph with {} nodes and {} imports",
            self.graph.len(),
            self.graph.imports.len()
        );
        Ok(self.graph)
    }

    /// Create one node per new root identity and record extra names as aliases
    fn insert_roots<'r>(
        &mut self,
        roots: &'r [RootEntry],
    ) -> Result<Vec<(NodeId, Pending, &'r Env)>> {
        let mut by_name: FxHashMap<&str, ObjRef> = FxHashMap::default();
        let mut pending = Vec::new();

        for root in roots {
            if let Some(existing) = by_name.get(root.name.as_str()) {
                if *existing == root.object {
                    trace!("Root '{}' inserted twice, ignoring", root.name);
                    continue;
                }
                return Err(ArchiveError::NameCollision(root.name.clone()));
            }
            by_name.insert(&root.name, root.object);
            self.graph.names.reserve(&root.name);

            if let Some(id) = self.graph.id_for(root.object) {
                debug!(
                    "Root '{}' is the same object as '{}', emitting an alias",
                    root.name,
                    self.graph.expect_node(id)?.name
                );
                self.graph.aliases.push((root.name.clone(), id));
                continue;
            }

            let (id, children) = self.create_node(root.object, &root.name, &root.env)?;
            let node = self.graph.expect_node_mut(id)?;
            node.root = true;
            node.name.clone_from(&root.name);
            pending.push((id, children, &root.env));
        }

        Ok(pending)
    }

    /// Decompose `object` and register its node; registration marks it visited
    fn create_node(
        &mut self,
        object: ObjRef,
        hint: &str,
        env: &Env,
    ) -> Result<(NodeId, Pending)> {
        let value = self.heap.get(object)?;
        let decomposition = self.encoders.decompose(value, env)?;
        let simple = value.is_simple()
            && matches!(decomposition.template, Template::Literal(_))
            && decomposition.children.is_empty()
            && decomposition.imports.is_empty();

        let id = self.graph.add_node(Node {
            object,
            template: decomposition.template,
            children: Vec::new(),
            parents: FxIndexSet::default(),
            name: String::new(),
            hint: hint.to_owned(),
            root: false,
            simple,
            imports: decomposition.imports,
        });
        trace!("Registered {object} as node {id} ('{hint}')");

        let children: Vec<(String, ObjRef)> = decomposition.children.into_iter().collect();
        Ok((id, children.into_iter()))
    }

    /// Depth-first, pre-order discovery below `root` with an explicit stack.
    ///
    /// Children are linked under their local names here; they are renamed
    /// once every node has its final name.
    fn discover(&mut self, root: NodeId, children: Pending, env: &Env) -> Result<()> {
        let mut stack: Vec<(NodeId, Pending)> = vec![(root, children)];

        loop {
            let Some((parent, pending)) = stack.last_mut() else {
                break;
            };
            let parent = *parent;
            let Some((local, object)) = pending.next() else {
                stack.pop();
                continue;
            };

            let child = if let Some(id) = self.graph.id_for(object) {
                id
            } else {
                let (id, grandchildren) = self.create_node(object, &local, env)?;
                stack.push((id, grandchildren));
                id
            };
            self.graph.expect_node_mut(parent)?.children.push((local, child));
        }

        Ok(())
    }

    /// Give every non-root node a unique name, in topological order
    fn assign_names(&mut self) -> Result<()> {
        for index in 0..self.graph.order.len() {
            let id = self.graph.order[index];
            let node = self.graph.expect_node(id)?;
            if node.root {
                continue;
            }
            let hint = if node.hint.starts_with(self.temp_prefix) {
                node.hint.clone()
            } else {
                format!("{}{}", self.temp_prefix, node.hint)
            };
            let name = self.graph.names.claim(&hint);
            trace!("Named node {id} '{name}'");
            self.graph.expect_node_mut(id)?.name = name;
        }
        Ok(())
    }

    /// Coalesce each node's imports and rewrite its template with the final
    /// child names and import aliases in a single pass
    fn resolve_templates(&mut self) -> Result<()> {
        let rewriter = self.graph.rewriter;

        for index in 0..self.graph.order.len() {
            let id = self.graph.order[index];
            let node = self.graph.expect_node_mut(id)?;
            let imports = std::mem::take(&mut node.imports);
            let local_children = std::mem::take(&mut node.children);

            let mut symbols = Replacements::default();
            for symbol in &imports {
                let alias = self.graph.imports.coalesce(symbol, &mut self.graph.names);
                symbols.insert(symbol.alias.clone(), alias);
            }

            let mut refs = Replacements::default();
            let mut children: Vec<(String, NodeId)> = Vec::with_capacity(local_children.len());
            for (local, child) in local_children {
                let child_name = self.graph.expect_node(child)?.name.clone();
                refs.insert(local, child_name.clone());
                if !children.iter().any(|(_, existing)| *existing == child) {
                    children.push((child_name, child));
                }
            }

            for (_, child) in &children {
                self.graph.expect_node_mut(*child)?.parents.insert(id);
            }

            let node = self.graph.expect_node_mut(id)?;
            node.template.rename(&refs, &symbols, &rewriter)?;
            node.children = children;
        }
        Ok(())
    }
}
