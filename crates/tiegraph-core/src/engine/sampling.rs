//! Edge sampling and dataset labeling.
//!
//! A training graph is the ground truth with a random share of its edges
//! removed; the candidate pairs of a graph are its directed non-edges. Both the
//! exhaustive candidate set and the labels are computed here.
//!
//! `find_all_missing_edges` is quadratic in the number of nodes.
//! `find_missing_edges_at_distance` bounds the candidates by hop distance for
//! larger networks.

use std::collections::{BTreeSet, VecDeque};

use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashSet;

use super::adjacency::Adjacency;
use super::dataset::{Dataset, NodePair};
use super::errors::PredictError;
use super::graph::FlatGraph;

/// Copy of `graph` keeping exactly `keep` of its edges, chosen uniformly at random.
///
/// Surviving edges keep their original order.
pub fn sampling_by_count<R>(graph: &FlatGraph, keep: usize, rng: &mut R) -> Result<FlatGraph, PredictError>
where
    R: Rng + ?Sized,
{
    let total = graph.edge_count();
    if keep > total {
        return Err(PredictError::InvalidParameter(format!(
            "cannot keep {} of {} edges",
            keep, total
        )));
    }
    let removed: FxHashSet<usize> = sample(rng, total, total - keep).into_iter().collect();
    let edges = graph
        .edges
        .iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(i))
        .map(|(_, e)| e.clone())
        .collect();
    Ok(FlatGraph {
        nodes: graph.nodes.clone(),
        edges,
    })
}

/// Copy of `graph` keeping the fraction `ratio` of its edges; exactly
/// `round((1 - ratio) * |E|)` edges are removed.
pub fn sampling_by_percentage<R>(graph: &FlatGraph, ratio: f64, rng: &mut R) -> Result<FlatGraph, PredictError>
where
    R: Rng + ?Sized,
{
    if !(0.0..=1.0).contains(&ratio) {
        return Err(PredictError::InvalidParameter(format!(
            "sampling ratio must be within [0, 1], got {}",
            ratio
        )));
    }
    let total = graph.edge_count();
    let removed = (((1.0 - ratio) * total as f64).round() as usize).min(total);
    sampling_by_count(graph, total - removed, rng)
}

/// Every ordered pair `(u, v)`, `u != v`, without a directed edge `u → v`.
///
/// Quadratic in the node count and memory; this bounds the graph sizes a run
/// can handle. [`find_missing_edges_at_distance`] is the bounded alternative.
pub fn find_all_missing_edges(graph: &FlatGraph) -> Vec<NodePair> {
    let adj = Adjacency::from_flat(graph);
    let n = adj.node_count();
    let mut out = Vec::with_capacity((n * n.saturating_sub(1)).saturating_sub(adj.edge_count()));
    for u in 0..n {
        for v in 0..n {
            if u != v && !adj.has_edge(u, v) {
                out.push((adj.node_id(u), adj.node_id(v)));
            }
        }
    }
    out
}

/// Pairs `(u, v)` where `v` is exactly `distance` hops from `u` in the undirected
/// projection and there is no edge `u → v`.
///
/// With `undirected`, a pair is dropped when its reverse was already emitted.
pub fn find_missing_edges_at_distance(graph: &FlatGraph, distance: usize, undirected: bool) -> Vec<NodePair> {
    let adj = Adjacency::from_flat(graph);
    let n = adj.node_count();
    let mut out = Vec::new();
    let mut seen: BTreeSet<(usize, usize)> = BTreeSet::new();
    for u in 0..n {
        let mut visited = vec![false; n];
        visited[u] = true;
        let mut frontier = VecDeque::from([u]);
        for _ in 0..distance {
            let mut next = VecDeque::new();
            while let Some(x) = frontier.pop_front() {
                for &w in adj.neighbors(x) {
                    if !visited[w] {
                        visited[w] = true;
                        next.push_back(w);
                    }
                }
            }
            frontier = next;
        }
        for v in frontier {
            if adj.has_edge(u, v) {
                continue;
            }
            if undirected {
                if seen.contains(&(v, u)) {
                    continue;
                }
                seen.insert((u, v));
            }
            out.push((adj.node_id(u), adj.node_id(v)));
        }
    }
    out
}

/// Labels each pair 1 if `ground_truth` has the directed edge, else 0.
pub fn assign_labels(pairs: Vec<NodePair>, ground_truth: &FlatGraph) -> Result<Dataset, PredictError> {
    let edges: FxHashSet<NodePair> = ground_truth.directed_edges().collect();
    let labels = pairs
        .iter()
        .map(|p| edges.contains(p) as u8)
        .collect();
    Dataset::new(pairs, labels)
}

/// Undersamples negative rows to the number of positive rows, then shuffles.
pub fn balance_classes<R>(dataset: &Dataset, rng: &mut R) -> Dataset
where
    R: Rng + ?Sized,
{
    let (positives, negatives): (Vec<usize>, Vec<usize>) =
        (0..dataset.len()).partition(|&i| dataset.labels()[i] == 1);
    let mut keep = positives;
    if negatives.len() > keep.len() {
        let chosen = sample(rng, negatives.len(), keep.len());
        keep.extend(chosen.into_iter().map(|i| negatives[i]));
    } else {
        keep.extend(negatives);
    }
    keep.shuffle(rng);
    dataset.select_rows(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::{FlatEdge, NodeData, NodeId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn flat(n: u32, edges: &[(u32, u32)]) -> FlatGraph {
        let mut g = FlatGraph::new();
        for i in 0..n {
            g.add_node(NodeData::new(NodeId(i)));
        }
        g.edges = edges
            .iter()
            .map(|&(u, v)| FlatEdge::original(NodeId(u), NodeId(v)))
            .collect();
        g
    }

    fn ring(n: u32) -> FlatGraph {
        let edges: Vec<(u32, u32)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        flat(n, &edges)
    }

    // ============================================================================
    // Sampling
    // ============================================================================

    #[test]
    fn full_ratio_keeps_every_edge() {
        let g = ring(10);
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(sampling_by_percentage(&g, 1.0, &mut rng).unwrap(), g);
    }

    #[test]
    fn zero_ratio_removes_every_edge() {
        let g = ring(10);
        let mut rng = StdRng::seed_from_u64(42);
        let s = sampling_by_percentage(&g, 0.0, &mut rng).unwrap();
        assert_eq!(s.edge_count(), 0);
        assert_eq!(s.node_count(), 10);
    }

    #[test]
    fn ratio_removes_rounded_share() {
        let g = ring(10);
        let mut rng = StdRng::seed_from_u64(7);
        let s = sampling_by_percentage(&g, 0.75, &mut rng).unwrap();
        // round(0.25 * 10) = 3 removed (2.5 rounds away from zero)
        assert_eq!(s.edge_count(), 7);
        assert!(s.edges.iter().all(|e| g.edges.contains(e)));
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let g = ring(20);
        let a = sampling_by_percentage(&g, 0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = sampling_by_percentage(&g, 0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_ratio_and_count_are_rejected() {
        let g = ring(4);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sampling_by_percentage(&g, 1.2, &mut rng),
            Err(PredictError::InvalidParameter(_))
        ));
        assert!(matches!(
            sampling_by_count(&g, 5, &mut rng),
            Err(PredictError::InvalidParameter(_))
        ));
    }

    // ============================================================================
    // Candidates and labels
    // ============================================================================

    #[test]
    fn missing_edges_are_directed_non_edges() {
        let g = flat(4, &[(0, 1), (1, 2), (2, 3)]);
        let missing = find_all_missing_edges(&g);
        assert_eq!(missing.len(), 4 * 3 - 3);
        assert!(missing.contains(&(NodeId(1), NodeId(0))));
        assert!(!missing.contains(&(NodeId(0), NodeId(1))));
    }

    #[test]
    fn missing_edges_at_distance_two() {
        let g = flat(4, &[(0, 1), (1, 2), (2, 3)]);
        let directed = find_missing_edges_at_distance(&g, 2, false);
        assert_eq!(
            directed,
            vec![
                (NodeId(0), NodeId(2)),
                (NodeId(1), NodeId(3)),
                (NodeId(2), NodeId(0)),
                (NodeId(3), NodeId(1)),
            ]
        );
        let undirected = find_missing_edges_at_distance(&g, 2, true);
        assert_eq!(undirected, vec![(NodeId(0), NodeId(2)), (NodeId(1), NodeId(3))]);
    }

    #[test]
    fn labels_follow_ground_truth_direction() {
        let gt = flat(3, &[(0, 1), (1, 2)]);
        let pairs = vec![(NodeId(0), NodeId(1)), (NodeId(1), NodeId(0)), (NodeId(1), NodeId(2))];
        let d = assign_labels(pairs, &gt).unwrap();
        assert_eq!(d.labels(), &[1, 0, 1]);
    }

    #[test]
    fn balancing_undersamples_negatives() {
        let gt = flat(4, &[(0, 1)]);
        let d = assign_labels(find_all_missing_edges(&flat(4, &[])), &gt).unwrap();
        assert_eq!((d.len(), d.positives()), (12, 1));
        let balanced = balance_classes(&d, &mut StdRng::seed_from_u64(3));
        assert_eq!((balanced.len(), balanced.positives()), (2, 1));
    }
}
