//! Dense adjacency index over a graph's realized directed edges.
//!
//! Algorithms work on contiguous node indices rather than [`NodeId`]s. The index
//! keeps sorted successor, predecessor and undirected-neighbor lists per node,
//! so membership checks are binary searches and iteration order is stable.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::graph::{FlatGraph, HierarchicalGraph, NodeId};

/// Maximum size for inline storage in SmallVec
const INLINE_VEC_SIZE: usize = 8;

pub type NeighborList = SmallVec<[usize; INLINE_VEC_SIZE]>;

/// Directed adjacency with an undirected projection.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    /// Node ids in ascending order; position is the node index.
    nodes: Vec<NodeId>,
    index: FxHashMap<NodeId, usize>,
    out: Vec<NeighborList>,
    inc: Vec<NeighborList>,
    und: Vec<NeighborList>,
    edge_count: usize,
}

fn insert_sorted(list: &mut NeighborList, value: usize) -> bool {
    match list.binary_search(&value) {
        Ok(_) => false,
        Err(pos) => {
            list.insert(pos, value);
            true
        }
    }
}

fn remove_sorted(list: &mut NeighborList, value: usize) -> bool {
    match list.binary_search(&value) {
        Ok(pos) => {
            list.remove(pos);
            true
        }
        Err(_) => false,
    }
}

impl Adjacency {
    /// Builds the index from a node set and directed edges. Edge endpoints that
    /// are not in `nodes` are added; self-loops and duplicate edges are ignored.
    pub fn from_edges<N, E>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator<Item = NodeId>,
        E: IntoIterator<Item = (NodeId, NodeId)>,
    {
        let edges: Vec<(NodeId, NodeId)> = edges.into_iter().collect();
        let mut ids: Vec<NodeId> = nodes.into_iter().collect();
        ids.extend(edges.iter().flat_map(|(u, v)| [*u, *v]));
        ids.sort_unstable();
        ids.dedup();

        let index: FxHashMap<NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let n = ids.len();
        let mut adj = Self {
            nodes: ids,
            index,
            out: vec![NeighborList::new(); n],
            inc: vec![NeighborList::new(); n],
            und: vec![NeighborList::new(); n],
            edge_count: 0,
        };
        for (u, v) in edges {
            if let (Some(&i), Some(&j)) = (adj.index.get(&u), adj.index.get(&v)) {
                adj.add_edge(i, j);
            }
        }
        adj
    }

    pub fn from_hierarchical(graph: &HierarchicalGraph) -> Self {
        Self::from_edges(graph.node_ids(), graph.directed_edges())
    }

    pub fn from_flat(graph: &FlatGraph) -> Self {
        Self::from_edges(graph.node_ids(), graph.directed_edges())
    }

    /// The subgraph induced by `keep` (node indices of `self`).
    pub fn induced(&self, keep: &[usize]) -> Self {
        let ids: Vec<NodeId> = keep.iter().map(|&i| self.nodes[i]).collect();
        let mut member = vec![false; self.nodes.len()];
        for &i in keep {
            member[i] = true;
        }
        let edges: Vec<(NodeId, NodeId)> = keep
            .iter()
            .flat_map(|&i| {
                self.out[i]
                    .iter()
                    .filter(|&&j| member[j])
                    .map(move |&j| (i, j))
            })
            .map(|(i, j)| (self.nodes[i], self.nodes[j]))
            .collect();
        Self::from_edges(ids, edges)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Number of edges in the undirected projection.
    pub fn undirected_edge_count(&self) -> usize {
        self.und.iter().map(|l| l.len()).sum::<usize>() / 2
    }

    pub fn node_id(&self, index: usize) -> NodeId {
        self.nodes[index]
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn successors(&self, i: usize) -> &[usize] {
        &self.out[i]
    }

    pub fn predecessors(&self, i: usize) -> &[usize] {
        &self.inc[i]
    }

    /// Neighbors in the undirected projection.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.und[i]
    }

    pub fn out_degree(&self, i: usize) -> usize {
        self.out[i].len()
    }

    pub fn in_degree(&self, i: usize) -> usize {
        self.inc[i].len()
    }

    /// Degree in the undirected projection.
    pub fn degree(&self, i: usize) -> usize {
        self.und[i].len()
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.out[i].binary_search(&j).is_ok()
    }

    /// Whether `i` and `j` are connected in either direction.
    pub fn adjacent(&self, i: usize, j: usize) -> bool {
        self.und[i].binary_search(&j).is_ok()
    }

    pub fn has_edge_ids(&self, u: NodeId, v: NodeId) -> bool {
        match (self.index_of(u), self.index_of(v)) {
            (Some(i), Some(j)) => self.has_edge(i, j),
            _ => false,
        }
    }

    /// Iterates directed edges as index pairs, ordered by source then target.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.out
            .iter()
            .enumerate()
            .flat_map(|(i, list)| list.iter().map(move |&j| (i, j)))
    }

    /// Inserts the directed edge `i → j`. Returns false for self-loops and existing edges.
    pub fn add_edge(&mut self, i: usize, j: usize) -> bool {
        if i == j || !insert_sorted(&mut self.out[i], j) {
            return false;
        }
        insert_sorted(&mut self.inc[j], i);
        insert_sorted(&mut self.und[i], j);
        insert_sorted(&mut self.und[j], i);
        self.edge_count += 1;
        true
    }

    /// Removes the directed edge `i → j`, keeping the undirected link if `j → i` remains.
    pub fn remove_edge(&mut self, i: usize, j: usize) -> bool {
        if !remove_sorted(&mut self.out[i], j) {
            return false;
        }
        remove_sorted(&mut self.inc[j], i);
        if !self.has_edge(j, i) {
            remove_sorted(&mut self.und[i], j);
            remove_sorted(&mut self.und[j], i);
        }
        self.edge_count -= 1;
        true
    }

    /// Number of common undirected neighbors of `i` and `j`, excluding both.
    pub fn common_neighbor_count(&self, i: usize, j: usize) -> usize {
        self.common_neighbors(i, j).len()
    }

    /// Common undirected neighbors of `i` and `j`, excluding both endpoints.
    pub fn common_neighbors(&self, i: usize, j: usize) -> NeighborList {
        let (a, b) = (&self.und[i], &self.und[j]);
        let (mut x, mut y) = (0, 0);
        let mut out = NeighborList::new();
        while x < a.len() && y < b.len() {
            match a[x].cmp(&b[y]) {
                std::cmp::Ordering::Less => x += 1,
                std::cmp::Ordering::Greater => y += 1,
                std::cmp::Ordering::Equal => {
                    if a[x] != i && a[x] != j {
                        out.push(a[x]);
                    }
                    x += 1;
                    y += 1;
                }
            }
        }
        out
    }

    /// Size of the union of the undirected neighborhoods of `i` and `j`.
    pub fn union_size(&self, i: usize, j: usize) -> usize {
        let (a, b) = (&self.und[i], &self.und[j]);
        let (mut x, mut y, mut count) = (0, 0, 0);
        while x < a.len() || y < b.len() {
            if y == b.len() || (x < a.len() && a[x] < b[y]) {
                x += 1;
            } else if x == a.len() || b[y] < a[x] {
                y += 1;
            } else {
                x += 1;
                y += 1;
            }
            count += 1;
        }
        count
    }

    /// Connected components of the undirected projection, each sorted, ordered
    /// by their smallest member.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.nodes.len();
        let mut seen = vec![false; n];
        let mut components = Vec::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut members = Vec::new();
            while let Some(u) = stack.pop() {
                members.push(u);
                for &w in &self.und[u] {
                    if !seen[w] {
                        seen[w] = true;
                        stack.push(w);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }
}
