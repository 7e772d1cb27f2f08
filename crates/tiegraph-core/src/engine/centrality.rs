//! Node-level measures shared by the social-theory predictors: Katz
//! centrality (iterative and exact), Burt's structural-hole constraint,
//! shortest-path lengths and nearest-rank percentiles.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::str::FromStr;

use super::adjacency::Adjacency;
use super::errors::PredictError;

pub const KATZ_ALPHA: f64 = 0.1;
pub const KATZ_BETA: f64 = 1.0;
const KATZ_MAX_ITER: usize = 1000;
const KATZ_TOLERANCE: f64 = 1.0e-6;
const KATZ_SINGULAR: f64 = 1.0e-12;

/// Katz centrality by power iteration over in-edges, L2-normalised.
///
/// Returns `Numerical` if the iteration does not converge, which happens when
/// `alpha` is at or above the reciprocal of the largest eigenvalue.
pub fn katz_centrality(graph: &Adjacency, alpha: f64) -> Result<Vec<f64>, PredictError> {
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut x = vec![0.0f64; n];
    for _ in 0..KATZ_MAX_ITER {
        let last = x.clone();
        let mut next = vec![0.0f64; n];
        for (u, v) in graph.edges() {
            next[v] += last[u];
        }
        for value in next.iter_mut() {
            *value = alpha * *value + KATZ_BETA;
        }
        let err: f64 = next.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if !err.is_finite() {
            break;
        }
        if err < n as f64 * KATZ_TOLERANCE {
            let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
            let scale = if norm == 0.0 { 1.0 } else { 1.0 / norm };
            return Ok(x.into_iter().map(|v| v * scale).collect());
        }
    }
    Err(PredictError::Numerical(format!(
        "Katz centrality failed to converge in {} iterations (alpha = {})",
        KATZ_MAX_ITER, alpha
    )))
}

/// Katz centrality by solving `(I - alpha * A^T) x = beta * 1` directly,
/// normalised to unit length with a positive sum.
///
/// Unlike [`katz_centrality`] this has no convergence condition on `alpha`;
/// it only fails when `1 / alpha` is an eigenvalue of the adjacency matrix.
/// Costs O(n^3) time and O(n^2) memory.
pub fn katz_centrality_exact(graph: &Adjacency, alpha: f64) -> Result<Vec<f64>, PredictError> {
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    // Row v holds the in-edges of v; the last column is the right-hand side.
    let width = n + 1;
    let mut m = vec![0.0f64; n * width];
    for v in 0..n {
        m[v * width + v] = 1.0;
        m[v * width + n] = KATZ_BETA;
    }
    for (u, v) in graph.edges() {
        m[v * width + u] -= alpha;
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| m[a * width + col].abs().total_cmp(&m[b * width + col].abs()))
            .unwrap_or(col);
        if m[pivot * width + col].abs() < KATZ_SINGULAR {
            return Err(PredictError::Numerical(format!(
                "Katz system is singular (alpha = {})",
                alpha
            )));
        }
        if pivot != col {
            for k in 0..width {
                m.swap(pivot * width + k, col * width + k);
            }
        }
        let head = m[col * width + col];
        for row in col + 1..n {
            let factor = m[row * width + col] / head;
            if factor == 0.0 {
                continue;
            }
            for k in col..width {
                m[row * width + k] -= factor * m[col * width + k];
            }
        }
    }
    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row * width + k] * x[k]).sum();
        x[row] = (m[row * width + n] - tail) / m[row * width + row];
    }

    let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return Err(PredictError::Numerical(format!(
            "Katz solution is degenerate (alpha = {})",
            alpha
        )));
    }
    let scale = if x.iter().sum::<f64>() < 0.0 { -norm } else { norm };
    Ok(x.into_iter().map(|v| v / scale).collect())
}

fn mutual_weight(graph: &Adjacency, u: usize, v: usize) -> f64 {
    graph.has_edge(u, v) as u8 as f64 + graph.has_edge(v, u) as u8 as f64
}

fn normalized_mutual_weight(graph: &Adjacency, u: usize, v: usize) -> f64 {
    let scale: f64 = graph
        .neighbors(u)
        .iter()
        .map(|&w| mutual_weight(graph, u, w))
        .sum();
    if scale == 0.0 {
        0.0
    } else {
        mutual_weight(graph, u, v) / scale
    }
}

/// Burt's local constraint of `u` with respect to `v`.
pub fn local_constraint(graph: &Adjacency, u: usize, v: usize) -> f64 {
    let direct = normalized_mutual_weight(graph, u, v);
    let indirect: f64 = graph
        .neighbors(u)
        .iter()
        .map(|&w| normalized_mutual_weight(graph, u, w) * normalized_mutual_weight(graph, w, v))
        .sum();
    (direct + indirect).powi(2)
}

/// Constraint of a single node; `None` when it has no outgoing edge.
pub fn node_constraint(graph: &Adjacency, u: usize) -> Option<f64> {
    if graph.out_degree(u) == 0 {
        return None;
    }
    Some(
        graph
            .neighbors(u)
            .iter()
            .map(|&v| local_constraint(graph, u, v))
            .sum(),
    )
}

/// Constraint of every node. Nodes without outgoing edges have an undefined
/// constraint and are reported as maximally constrained (1).
pub fn constraints(graph: &Adjacency) -> Vec<f64> {
    (0..graph.node_count())
        .map(|u| node_constraint(graph, u).unwrap_or(1.0))
        .collect()
}

/// Shortest-path algorithm used by the shortest-path predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathMethod {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "dijkstra"))]
    Dijkstra,
    #[cfg_attr(feature = "serde", serde(rename = "bellman-ford"))]
    BellmanFord,
    #[cfg_attr(feature = "serde", serde(rename = "unweighted"))]
    Unweighted,
}

impl FromStr for PathMethod {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dijkstra" => Ok(PathMethod::Dijkstra),
            "bellman-ford" => Ok(PathMethod::BellmanFord),
            "unweighted" => Ok(PathMethod::Unweighted),
            other => Err(PredictError::InvalidParameter(format!(
                "unsupported shortest path method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PathMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PathMethod::Dijkstra => "dijkstra",
            PathMethod::BellmanFord => "bellman-ford",
            PathMethod::Unweighted => "unweighted",
        })
    }
}

/// Hop distances from `source` in the undirected projection (`None` = unreachable).
pub fn bfs_distances(graph: &Adjacency, source: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; graph.node_count()];
    dist[source] = Some(0);
    let mut queue = VecDeque::from([source]);
    while let Some(u) = queue.pop_front() {
        let d = dist[u].unwrap_or(0);
        for &w in graph.neighbors(u) {
            if dist[w].is_none() {
                dist[w] = Some(d + 1);
                queue.push_back(w);
            }
        }
    }
    dist
}

fn dijkstra_distances(graph: &Adjacency, source: usize) -> Vec<Option<usize>> {
    let mut dist: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut heap = BinaryHeap::new();
    dist[source] = Some(0);
    heap.push(Reverse((0usize, source)));
    while let Some(Reverse((d, u))) = heap.pop() {
        if dist[u].is_some_and(|best| d > best) {
            continue;
        }
        for &w in graph.neighbors(u) {
            let candidate = d + 1;
            if dist[w].map_or(true, |best| candidate < best) {
                dist[w] = Some(candidate);
                heap.push(Reverse((candidate, w)));
            }
        }
    }
    dist
}

fn bellman_ford_distances(graph: &Adjacency, source: usize) -> Vec<Option<usize>> {
    let n = graph.node_count();
    let mut dist: Vec<Option<usize>> = vec![None; n];
    dist[source] = Some(0);
    for _ in 1..n.max(2) {
        let mut changed = false;
        for u in 0..n {
            let Some(du) = dist[u] else { continue };
            for &w in graph.neighbors(u) {
                if dist[w].map_or(true, |dw| du + 1 < dw) {
                    dist[w] = Some(du + 1);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    dist
}

/// Single-source distances in the undirected projection using `method`.
pub fn distances_from(graph: &Adjacency, source: usize, method: PathMethod) -> Vec<Option<usize>> {
    match method {
        PathMethod::Dijkstra => dijkstra_distances(graph, source),
        PathMethod::BellmanFord => bellman_ford_distances(graph, source),
        PathMethod::Unweighted => bfs_distances(graph, source),
    }
}

/// Percentile of `values` using the nearest-rank rule: the sorted element at
/// `round(q / 100 * (n - 1))`, ties rounding to even. `None` for empty input.
pub fn percentile_nearest(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let idx = (pos.round_ties_even() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}
