//! Single-pass graph reduction
//!
//! Inlines nodes that do not need a name of their own into their parents.
//! A node survives when it is a root, when more than one parent refers to it,
//! or when its only parent refers to it more than once. Inlining it in the
//! last two cases would turn one shared object into several copies.

use log::{debug, trace};

use crate::{
    error::Result,
    graph::{DependencyGraph, NodeId},
};

#[derive(Debug)]
pub struct GraphReducer<'g> {
    graph: &'g mut DependencyGraph,
}

impl<'g> GraphReducer<'g> {
    pub const fn new(graph: &'g mut DependencyGraph) -> Self {
        Self { graph }
    }

    /// Non-root, and either a simple literal or referenced exactly once by
    /// its single parent
    pub fn is_reducible(&self, id: NodeId) -> Result<bool> {
        let node = self.graph.expect_node(id)?;
        if node.root {
            return Ok(false);
        }
        if node.simple {
            return Ok(true);
        }
        if node.parents.len() != 1 {
            return Ok(false);
        }
        let Some(parent) = node.parents.first() else {
            return Ok(false);
        };
        let parent = self.graph.expect_node(*parent)?;
        Ok(parent.template.count_references(&node.name) == 1)
    }

    /// Inline every reducible node once, in topological order.
    ///
    /// Returns the number of inlined nodes. Nodes that only become reducible
    /// because of this pass are left for the next one.
    pub fn reduce(&mut self) -> Result<usize> {
        self.graph.check()?;

        let order = self.graph.order.clone();
        let mut inlined = 0;
        for id in order {
            if self.graph.node(id).is_none() || !self.is_reducible(id)? {
                continue;
            }
            self.inline_node(id)?;
            inlined += 1;
        }

        self.graph.order = self.graph.topological_order()?;
        debug!("Reduction inlined {inlined} nodes, {} remain", self.graph.len());
        Ok(inlined)
    }

    /// Substitute `id` into all of its parents and remove it from the graph
    fn inline_node(&mut self, id: NodeId) -> Result<()> {
        let rewriter = self.graph.rewriter;
        let node = self.graph.expect_node(id)?;
        let name = node.name.clone();
        let object = node.object;
        let template = node.template.clone();
        let parents: Vec<NodeId> = node.parents.iter().copied().collect();
        let grandchildren = node.children.clone();

        // Rewrite every parent before touching any of them, so a failing
        // rewrite leaves the graph unchanged
        let mut rewritten = Vec::with_capacity(parents.len());
        for parent in &parents {
            let mut parent_template = self.graph.expect_node(*parent)?.template.clone();
            parent_template.inline(&name, &template, &rewriter)?;
            rewritten.push(parent_template);
        }

        for (parent, parent_template) in parents.iter().zip(rewritten) {
            let parent_node = self.graph.expect_node_mut(*parent)?;
            parent_node.template = parent_template;
            parent_node.children.retain(|(_, child)| *child != id);
            for (child_name, grandchild) in &grandchildren {
                if !parent_node.children.iter().any(|(_, child)| child == grandchild) {
                    parent_node.children.push((child_name.clone(), *grandchild));
                }
            }
        }

        for (_, grandchild) in &grandchildren {
            let grandchild_node = self.graph.expect_node_mut(*grandchild)?;
            grandchild_node.parents.shift_remove(&id);
            grandchild_node.parents.extend(parents.iter().copied());
        }

        self.graph.nodes[id.index()] = None;
        self.graph.registry.remove(&object);
        trace!("Inlined '{name}' into {} parent(s)", parents.len());
        Ok(())
    }
}
