//! Rename resolution over a directed path graph.
//!
//! Each rename record becomes an edge `from → to` weighted by the record's
//! ordinal in the history. A lookup follows, from a given point in time, the
//! first later rename of the path and then keeps walking forward. Rename
//! chains are therefore tracked per identity: a name that is freed by a
//! rename and later reused by an unrelated file does not inherit the old
//! chain, because the old edge is earlier than anything the new file does.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

#[derive(Debug, Clone, Copy)]
struct RenameEdge {
    ordinal: usize,
    /// Where a walk that takes this edge ends up.
    terminal: NodeIndex,
}

/// Read-only rename graph. Every walk is resolved once at construction,
/// so lookups cost one scan of a node's outgoing edges.
#[derive(Debug, Clone, Default)]
pub struct RenameIndex {
    graph: DiGraph<String, RenameEdge>,
    nodes: HashMap<String, NodeIndex>,
}

impl RenameIndex {
    /// Build from `(ordinal, from, to)` triples. Ordinals must be unique.
    pub fn build<'a, I>(renames: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a str, &'a str)>,
    {
        let mut index = Self::default();
        for (ordinal, from, to) in renames {
            let a = index.node(from);
            let b = index.node(to);
            index.graph.add_edge(
                a,
                b,
                RenameEdge {
                    ordinal,
                    terminal: b,
                },
            );
        }

        // Latest renames first: the continuation of every edge is already
        // final by the time the edge itself is visited.
        let mut edges: Vec<EdgeIndex> = index.graph.edge_indices().collect();
        edges.sort_by_key(|e| std::cmp::Reverse(index.graph[*e].ordinal));
        for edge in edges {
            let ordinal = index.graph[edge].ordinal;
            let Some((_, target)) = index.graph.edge_endpoints(edge) else {
                continue;
            };
            if let Some(next) = index.next_rename(target, Some(ordinal)) {
                let terminal = index.graph[next].terminal;
                index.graph[edge].terminal = terminal;
            }
        }
        index
    }

    fn node(&mut self, path: &str) -> NodeIndex {
        if let Some(&n) = self.nodes.get(path) {
            return n;
        }
        let n = self.graph.add_node(path.to_string());
        self.nodes.insert(path.to_string(), n);
        n
    }

    /// First outgoing rename of `node` strictly after `after`.
    fn next_rename(&self, node: NodeIndex, after: Option<usize>) -> Option<EdgeIndex> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .filter(|e| after.is_none_or(|a| e.weight().ordinal > a))
            .min_by_key(|e| e.weight().ordinal)
            .map(|e| e.id())
    }

    /// The name `path` ends up with, considering only renames recorded
    /// after `after` (all renames when `None`).
    pub fn resolve<'a>(&'a self, path: &'a str, after: Option<usize>) -> &'a str {
        let Some(&node) = self.nodes.get(path) else {
            return path;
        };
        match self.next_rename(node, after) {
            Some(edge) => self.graph[self.graph[edge].terminal].as_str(),
            None => path,
        }
    }

    /// Latest name of `path` over the whole history.
    pub fn canonical<'a>(&'a self, path: &'a str) -> &'a str {
        self.resolve(path, None)
    }

    pub fn rename_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_renamed_resolves_to_itself() {
        let index = RenameIndex::build([(0, "a", "b")]);
        assert_eq!(index.canonical("z"), "z");
        assert_eq!(index.canonical("b"), "b");
    }

    #[test]
    fn chains_are_transitive_in_any_lookup_order() {
        let index = RenameIndex::build([(5, "B", "C"), (2, "A", "B")]);
        assert_eq!(index.canonical("B"), "C");
        assert_eq!(index.canonical("A"), "C");
        assert_eq!(index.canonical("C"), "C");
    }

    #[test]
    fn lookups_respect_time() {
        let index = RenameIndex::build([(2, "A", "B"), (5, "B", "C")]);
        // Seen after the second rename: already final.
        assert_eq!(index.resolve("B", Some(6)), "B");
        // Seen between the renames.
        assert_eq!(index.resolve("B", Some(3)), "C");
        assert_eq!(index.resolve("A", Some(3)), "A");
    }

    #[test]
    fn reused_name_does_not_join_old_chain() {
        // Old A becomes B. A new, unrelated A appears and later becomes D.
        let index = RenameIndex::build([(1, "A", "B"), (7, "A", "D")]);
        assert_eq!(index.resolve("A", Some(0)), "B");
        assert_eq!(index.resolve("A", Some(4)), "D");
    }

    #[test]
    fn rename_back_and_forth_terminates() {
        let index = RenameIndex::build([(1, "A", "B"), (2, "B", "A"), (3, "A", "B")]);
        assert_eq!(index.canonical("A"), "B");
        assert_eq!(index.resolve("B", Some(1)), "B");
        assert_eq!(index.resolve("A", Some(3)), "A");
        assert_eq!(index.rename_count(), 3);
    }
}
