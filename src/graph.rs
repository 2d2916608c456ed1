//! A small generic graph used for both the control-flow graph (directed,
//! over [`crate::block::BlockId`]) and the interference graph (undirected,
//! over [`crate::vreg::VarId`]), plus the greedy coloring routine the
//! allocator runs over the latter.

use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

use crate::error::{Error, Result};

/// A graph over nodes of type `T`, directed or undirected depending on how
/// edges are added (`add_edge` for undirected, `add_directed_edge` for
/// directed — callers pick per use site; the CFG uses the latter, the
/// interference graph the former).
///
/// Backed by an `IndexMap` so iteration order follows insertion order:
/// coloring's degree-tie-break and the CFG's block ordering both depend on
/// this being deterministic rather than hash-order.
#[derive(Clone, Debug)]
pub struct Graph<T: Eq + Hash + Clone> {
    nodes: IndexSet<T>,
    edges: IndexMap<T, IndexSet<T>>,
}

impl<T: Eq + Hash + Clone> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Graph<T> {
    pub fn new() -> Self {
        Self { nodes: IndexSet::new(), edges: IndexMap::new() }
    }

    pub fn add_node(&mut self, node: T) {
        if self.nodes.insert(node.clone()) {
            self.edges.entry(node).or_insert_with(IndexSet::new);
        }
    }

    pub fn has_node(&self, node: &T) -> bool {
        self.nodes.contains(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Undirected edge: `a` and `b` each gain the other as a neighbor.
    pub fn add_edge(&mut self, a: T, b: T) {
        self.add_node(a.clone());
        self.add_node(b.clone());
        if a != b {
            self.edges.get_mut(&a).unwrap().insert(b.clone());
            self.edges.get_mut(&b).unwrap().insert(a);
        }
    }

    /// Directed edge: only `from` gains `to` as a successor.
    pub fn add_directed_edge(&mut self, from: T, to: T) {
        self.add_node(from.clone());
        self.add_node(to.clone());
        self.edges.get_mut(&from).unwrap().insert(to);
    }

    pub fn neighbors(&self, node: &T) -> impl Iterator<Item = &T> {
        self.edges.get(node).into_iter().flat_map(|set| set.iter())
    }

    pub fn degree(&self, node: &T) -> usize {
        self.edges.get(node).map(IndexSet::len).unwrap_or(0)
    }
}

impl<T: Eq + Hash + Clone + Ord> Graph<T> {
    /// Greedily colors the graph with the fewest colors from `0..limit`,
    /// honoring any precoloring already present in `colors`. Nodes are
    /// visited in descending-degree order (ties broken by insertion order,
    /// since `IndexSet` iteration is stable) and each is assigned the lowest
    /// color not used by an already-colored neighbor. Returns
    /// [`Error::Uncolorable`] if some node has no free color under `limit`.
    pub fn color(&self, limit: usize, precolored: &IndexMap<T, usize>) -> Result<IndexMap<T, usize>> {
        let mut order: Vec<&T> = self.nodes.iter().collect();
        order.sort_by(|a, b| self.degree(b).cmp(&self.degree(a)).then_with(|| a.cmp(b)));

        let mut colors: IndexMap<T, usize> = precolored.clone();
        for node in order {
            if colors.contains_key(node) {
                continue;
            }
            let used: IndexSet<usize> =
                self.neighbors(node).filter_map(|n| colors.get(n).copied()).collect();
            let chosen = (0..limit).find(|c| !used.contains(c));
            match chosen {
                Some(c) => {
                    colors.insert(node.clone(), c);
                }
                None => return Err(Error::Uncolorable { colors: limit }),
            }
        }
        Ok(colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undirected_edge_is_symmetric() {
        let mut g: Graph<u32> = Graph::new();
        g.add_edge(1, 2);
        assert!(g.neighbors(&1).any(|&n| n == 2));
        assert!(g.neighbors(&2).any(|&n| n == 1));
    }

    #[test]
    fn directed_edge_is_one_way() {
        let mut g: Graph<u32> = Graph::new();
        g.add_directed_edge(1, 2);
        assert!(g.neighbors(&1).any(|&n| n == 2));
        assert!(!g.neighbors(&2).any(|&n| n == 1));
    }

    #[test]
    fn triangle_needs_three_colors() {
        let mut g: Graph<u32> = Graph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(1, 3);
        assert!(g.color(2, &IndexMap::new()).is_err());
        let colors = g.color(3, &IndexMap::new()).unwrap();
        assert_eq!(colors.len(), 3);
        assert_ne!(colors[&1], colors[&2]);
        assert_ne!(colors[&2], colors[&3]);
        assert_ne!(colors[&1], colors[&3]);
    }

    #[test]
    fn two_disconnected_nodes_share_a_color() {
        let mut g: Graph<u32> = Graph::new();
        g.add_node(1);
        g.add_node(2);
        let colors = g.color(1, &IndexMap::new()).unwrap();
        assert_eq!(colors[&1], 0);
        assert_eq!(colors[&2], 0);
    }

    #[test]
    fn precolored_nodes_are_respected() {
        let mut g: Graph<u32> = Graph::new();
        g.add_edge(1, 2);
        let mut pre = IndexMap::new();
        pre.insert(1, 4);
        let colors = g.color(5, &pre).unwrap();
        assert_eq!(colors[&1], 4);
        assert_ne!(colors[&2], 4);
    }
}
