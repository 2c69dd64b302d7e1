//! Object dependency graph
//!
//! One [`Node`] per distinct object identity reachable from the roots. Edges
//! run from a node to the children its template refers to. Nodes live in an
//! arena of slots: removing a node empties its slot, so every [`NodeId`] held
//! elsewhere stays valid.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, VecDeque},
    fmt,
};

use log::{debug, trace};
use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::{ArchiveError, Result},
    imports::{ExternalSymbolRef, ImportCoalescer, ImportDecl},
    names::UniqueNameAllocator,
    reducer::GraphReducer,
    rewrite::TemplateRewriter,
    template::Template,
    types::FxIndexSet,
    value::{Env, ObjRef},
};

/// Arena index of a node, assigned in discovery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A named object the caller wants to keep
#[derive(Debug, Clone, PartialEq)]
pub struct RootEntry {
    pub name: String,
    pub object: ObjRef,
    pub env: Env,
}

impl RootEntry {
    pub fn new(name: &str, object: ObjRef) -> Self {
        Self {
            name: name.to_owned(),
            object,
            env: Env::default(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) object: ObjRef,
    pub(crate) template: Template,
    /// Name used for the child inside `template`, and the child itself
    pub(crate) children: Vec<(String, NodeId)>,
    pub(crate) parents: FxIndexSet<NodeId>,
    /// Output name; empty until naming runs for non-root nodes
    pub(crate) name: String,
    /// Local name the node was first discovered under
    pub(crate) hint: String,
    pub(crate) root: bool,
    pub(crate) simple: bool,
    /// External references not yet handed to the coalescer
    pub(crate) imports: Vec<ExternalSymbolRef>,
}

impl Node {
    pub const fn object(&self) -> ObjRef {
        self.object
    }

    pub const fn template(&self) -> &Template {
        &self.template
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn is_root(&self) -> bool {
        self.root
    }

    pub const fn is_simple(&self) -> bool {
        self.simple
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().map(|(_, child)| *child)
    }

    pub const fn parents(&self) -> &FxIndexSet<NodeId> {
        &self.parents
    }

    /// Name for diagnostics, available before naming has run
    pub(crate) fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{}{}", self.hint, self.object)
        } else {
            self.name.clone()
        }
    }
}

/// One line of output: `name = template`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub template: String,
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.template)
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub(crate) nodes: Vec<Option<Node>>,
    /// Object identity to its node
    pub(crate) registry: FxHashMap<ObjRef, NodeId>,
    /// Topological order, dependencies first
    pub(crate) order: Vec<NodeId>,
    /// Extra root names bound to an already named node
    pub(crate) aliases: Vec<(String, NodeId)>,
    pub(crate) names: UniqueNameAllocator,
    pub(crate) imports: ImportCoalescer,
    pub(crate) rewriter: TemplateRewriter,
}

impl DependencyGraph {
    pub(crate) fn new(names: UniqueNameAllocator, rewriter: TemplateRewriter) -> Self {
        Self {
            nodes: Vec::new(),
            registry: FxHashMap::default(),
            order: Vec::new(),
            aliases: Vec::new(),
            names,
            imports: ImportCoalescer::new(),
            rewriter,
        }
    }

    pub(crate) fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.registry.insert(node.object, id);
        self.nodes.push(Some(node));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub(crate) fn expect_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| ArchiveError::Integrity(format!("node {id} is missing")))
    }

    pub(crate) fn expect_node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.node_mut(id)
            .ok_or_else(|| ArchiveError::Integrity(format!("node {id} is missing")))
    }

    /// Node holding `object`, if it is still part of the graph
    pub fn node_for(&self, object: ObjRef) -> Option<&Node> {
        self.registry.get(&object).and_then(|id| self.node(*id))
    }

    pub fn id_for(&self, object: ObjRef) -> Option<NodeId> {
        self.registry.get(&object).copied()
    }

    /// Live nodes in topological order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.node(*id).map(|node| (*id, node)))
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn rewriter(&self) -> &TemplateRewriter {
        &self.rewriter
    }

    pub const fn names(&self) -> &UniqueNameAllocator {
        &self.names
    }

    /// Ordered definitions; extra root names come last as plain aliases
    pub fn definitions(&self) -> Vec<Definition> {
        let mut definitions: Vec<Definition> = self
            .nodes()
            .map(|(_, node)| Definition {
                name: node.name.clone(),
                template: node.template.to_string(),
            })
            .collect();
        for (alias, id) in &self.aliases {
            if let Some(node) = self.node(*id) {
                definitions.push(Definition {
                    name: alias.clone(),
                    template: node.name.clone(),
                });
            }
        }
        definitions
    }

    pub fn imports(&self) -> Vec<ImportDecl> {
        self.imports.declarations()
    }

    /// Inline every reducible node once; see [`GraphReducer`]
    pub fn reduce(&mut self) -> Result<usize> {
        GraphReducer::new(self).reduce()
    }

    /// Verify that children are unique and parent links mirror child links
    pub fn check(&self) -> Result<()> {
        for (index, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            let id = NodeId(index);

            let mut seen = FxHashSet::default();
            for child in node.children() {
                if !seen.insert(child) {
                    return Err(ArchiveError::Integrity(format!(
                        "'{}' lists child {child} twice",
                        node.label()
                    )));
                }
                let child_node = self.expect_node(child)?;
                if !child_node.parents.contains(&id) {
                    return Err(ArchiveError::Integrity(format!(
                        "'{}' is a child of '{}' but does not list it as parent",
                        child_node.label(),
                        node.label()
                    )));
                }
            }

            for parent in &node.parents {
                let parent_node = self.expect_node(*parent)?;
                if !parent_node.children().any(|child| child == id) {
                    return Err(ArchiveError::Integrity(format!(
                        "'{}' lists parent '{}' which has no such child",
                        node.label(),
                        parent_node.label()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Order live nodes so that every node follows its children.
    ///
    /// Connected nodes are ordered with Kahn's algorithm, breaking ties by
    /// discovery order; isolated nodes follow in discovery order.
    pub(crate) fn topological_order(&self) -> Result<Vec<NodeId>> {
        // Edges run from dependency to dependent: if A needs B, add B -> A
        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut indices: FxHashMap<NodeId, NodeIndex> = FxHashMap::default();
        let mut isolated = Vec::new();

        // Parent links may not exist yet, so connectivity comes from child edges
        let referenced: FxHashSet<NodeId> = self
            .nodes
            .iter()
            .flatten()
            .flat_map(Node::children)
            .collect();

        for (index, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            let id = NodeId(index);
            if node.children.is_empty() && !referenced.contains(&id) {
                isolated.push(id);
            } else {
                indices.insert(id, graph.add_node(id));
            }
        }

        for (index, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            let id = NodeId(index);
            for child in node.children() {
                if let (Some(&from), Some(&to)) = (indices.get(&child), indices.get(&id)) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|index| graph.neighbors_directed(index, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = graph
            .node_indices()
            .filter(|index| in_degree[index.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(graph.node_count() + isolated.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(graph[index]);
            for dependent in graph.neighbors_directed(index, Direction::Outgoing) {
                in_degree[dependent.index()] -= 1;
                if in_degree[dependent.index()] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < graph.node_count() {
            return Err(self.cycle_error(&graph));
        }

        order.extend(isolated);
        trace!("Topological order: {order:?}");
        Ok(order)
    }

    /// Describe one cycle of `graph` by the labels of its nodes
    fn cycle_error(&self, graph: &DiGraph<NodeId, ()>) -> ArchiveError {
        let component = tarjan_scc(graph).into_iter().find(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|index| graph.contains_edge(*index, *index))
        });
        let members: FxHashSet<NodeId> = component
            .unwrap_or_default()
            .into_iter()
            .map(|index| graph[index])
            .collect();

        let path = self.cycle_path(&members);
        debug!("Cycle detected: {}", path.join(" -> "));
        ArchiveError::Cycle { path }
    }

    /// Walk child edges inside `members` from its earliest node back to itself
    fn cycle_path(&self, members: &FxHashSet<NodeId>) -> Vec<String> {
        let Some(&start) = members.iter().min() else {
            return Vec::new();
        };
        let label = |id: NodeId| self.node(id).map_or_else(|| id.to_string(), Node::label);

        let mut previous: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.node(current) else { continue };
            for child in node.children() {
                if child == start {
                    let mut path = vec![label(start)];
                    let mut cursor = current;
                    let mut tail = Vec::new();
                    while cursor != start {
                        tail.push(label(cursor));
                        let Some(&step) = previous.get(&cursor) else { break };
                        cursor = step;
                    }
                    path.extend(tail.into_iter().rev());
                    path.push(label(start));
                    return path;
                }
                if members.contains(&child) && !previous.contains_key(&child) {
                    previous.insert(child, current);
                    queue.push_back(child);
                }
            }
        }

        let mut ids: Vec<NodeId> = members.iter().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(label).collect()
    }
}
