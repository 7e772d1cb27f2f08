//! Topology similarity indices.
//!
//! Every index scores node pairs over the undirected projection of a graph.
//! Divisions by zero score 0; the only failing index is the shortest path,
//! which rejects unreachable pairs.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::adjacency::Adjacency;
use super::centrality::{distances_from, PathMethod};
use super::community::{girvan_newman, membership};
use super::dataset::NodePair;
use super::errors::PredictError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyIndex {
    AdamicAdar,
    AdjustedRand,
    CommonNeighbors,
    Jaccard,
    Salton,
    PreferentialAttachment,
    ResourceAllocation,
    SameCommunity,
    ShortestPath,
    TotalNeighbors,
    UDegree,
    VDegree,
    Sorensen,
    HubPromoted,
    HubDepressed,
    LeichtHolmeNewman,
}

impl TopologyIndex {
    pub const ALL: [TopologyIndex; 16] = [
        TopologyIndex::AdamicAdar,
        TopologyIndex::AdjustedRand,
        TopologyIndex::CommonNeighbors,
        TopologyIndex::Jaccard,
        TopologyIndex::Salton,
        TopologyIndex::PreferentialAttachment,
        TopologyIndex::ResourceAllocation,
        TopologyIndex::SameCommunity,
        TopologyIndex::ShortestPath,
        TopologyIndex::TotalNeighbors,
        TopologyIndex::UDegree,
        TopologyIndex::VDegree,
        TopologyIndex::Sorensen,
        TopologyIndex::HubPromoted,
        TopologyIndex::HubDepressed,
        TopologyIndex::LeichtHolmeNewman,
    ];

    /// Designation used in predictor descriptors and feature columns.
    pub fn designation(&self) -> &'static str {
        match self {
            TopologyIndex::AdamicAdar => "AdamicAdar",
            TopologyIndex::AdjustedRand => "AdjustedRand",
            TopologyIndex::CommonNeighbors => "CommonNeighbors",
            TopologyIndex::Jaccard => "Jaccard",
            TopologyIndex::Salton => "Salton",
            TopologyIndex::PreferentialAttachment => "PreferentialAttachement",
            TopologyIndex::ResourceAllocation => "ResourceAllocation",
            TopologyIndex::SameCommunity => "SameCommunity",
            TopologyIndex::ShortestPath => "ShortestPath",
            TopologyIndex::TotalNeighbors => "TotalNeighbors",
            TopologyIndex::UDegree => "UDegree",
            TopologyIndex::VDegree => "VDegree",
            TopologyIndex::Sorensen => "Sorensen",
            TopologyIndex::HubPromoted => "HubPromoted",
            TopologyIndex::HubDepressed => "HubDepressed",
            TopologyIndex::LeichtHolmeNewman => "LeichtHolmeNewman",
        }
    }
}

impl fmt::Display for TopologyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.designation())
    }
}

impl FromStr for TopologyIndex {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.designation() == s)
            .ok_or_else(|| {
                PredictError::InvalidParameter(format!("unknown topology predictor '{}'", s))
            })
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Scores that need no precomputation beyond the adjacency.
fn local_score(index: TopologyIndex, g: &Adjacency, u: usize, v: usize) -> f64 {
    let du = g.degree(u) as f64;
    let dv = g.degree(v) as f64;
    let common = || g.common_neighbor_count(u, v) as f64;
    match index {
        TopologyIndex::AdamicAdar => g
            .common_neighbors(u, v)
            .iter()
            .map(|&w| g.degree(w))
            .filter(|&d| d > 1)
            .map(|d| 1.0 / (d as f64).ln())
            .sum(),
        TopologyIndex::AdjustedRand => {
            let a = common();
            let b = g.union_size(u, v) as f64;
            let c = b;
            let d = g.node_count() as f64 - b;
            let den = (a + b) * (b + d) + (a + c) * (c + d);
            ratio(2.0 * (a * d - b * c), den)
        }
        TopologyIndex::CommonNeighbors => common(),
        TopologyIndex::Jaccard => ratio(common(), g.union_size(u, v) as f64),
        TopologyIndex::Salton => ratio(common(), (du * dv).sqrt()),
        TopologyIndex::PreferentialAttachment => du * dv,
        TopologyIndex::ResourceAllocation => g
            .common_neighbors(u, v)
            .iter()
            .map(|&w| ratio(1.0, g.degree(w) as f64))
            .sum(),
        TopologyIndex::TotalNeighbors => g.union_size(u, v) as f64,
        TopologyIndex::UDegree => du,
        TopologyIndex::VDegree => dv,
        TopologyIndex::Sorensen => ratio(2.0 * common(), du + dv),
        TopologyIndex::HubPromoted => ratio(2.0 * common(), du.min(dv)),
        TopologyIndex::HubDepressed => ratio(2.0 * common(), du.max(dv)),
        TopologyIndex::LeichtHolmeNewman => ratio(2.0 * common(), du * dv),
        // Handled by the predictor with graph-wide state.
        TopologyIndex::SameCommunity | TopologyIndex::ShortestPath => 0.0,
    }
}

/// A configured topology predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyPredictor {
    pub index: TopologyIndex,
    /// Shortest-path algorithm.
    pub method: PathMethod,
    /// Girvan–Newman level used by same-community (≥ 1).
    pub iterations: usize,
    /// Score pairs on the rayon pool when the `parallel` feature is enabled.
    pub parallel: bool,
}

impl TopologyPredictor {
    pub fn new(index: TopologyIndex) -> Self {
        Self {
            index,
            method: PathMethod::default(),
            iterations: 1,
            parallel: false,
        }
    }

    pub fn designation(&self) -> &'static str {
        self.index.designation()
    }

    fn resolve(g: &Adjacency, pairs: &[NodePair]) -> Result<Vec<(usize, usize)>, PredictError> {
        pairs
            .iter()
            .map(|&(u, v)| {
                let i = g.index_of(u).ok_or_else(|| PredictError::missing_node(u))?;
                let j = g.index_of(v).ok_or_else(|| PredictError::missing_node(v))?;
                Ok((i, j))
            })
            .collect()
    }

    /// Scores every pair, in input order.
    pub fn predict(&self, graph: &Adjacency, pairs: &[NodePair]) -> Result<Vec<f64>, PredictError> {
        let resolved = Self::resolve(graph, pairs)?;
        match self.index {
            TopologyIndex::SameCommunity => {
                if self.iterations < 1 {
                    return Err(PredictError::InvalidParameter(
                        "same community iterations must be at least 1".into(),
                    ));
                }
                let communities = girvan_newman(graph, self.iterations);
                let member = membership(graph.node_count(), &communities);
                Ok(resolved
                    .iter()
                    .map(|&(i, j)| match (member[i], member[j]) {
                        (Some(a), Some(b)) if a == b => 1.0,
                        _ => 0.0,
                    })
                    .collect())
            }
            TopologyIndex::ShortestPath => {
                let mut out = Vec::with_capacity(resolved.len());
                let mut cache: Option<(usize, Vec<Option<usize>>)> = None;
                for (k, &(i, j)) in resolved.iter().enumerate() {
                    if cache.as_ref().map_or(true, |(src, _)| *src != i) {
                        cache = Some((i, distances_from(graph, i, self.method)));
                    }
                    let dist = cache.as_ref().and_then(|(_, d)| d[j]);
                    match dist {
                        Some(d) => out.push(d as f64),
                        None => {
                            let (from, to) = pairs[k];
                            return Err(PredictError::NoPath { from, to });
                        }
                    }
                }
                Ok(out)
            }
            index => Ok(self.score_local(index, graph, &resolved)),
        }
    }

    #[cfg(feature = "parallel")]
    fn score_local(&self, index: TopologyIndex, g: &Adjacency, pairs: &[(usize, usize)]) -> Vec<f64> {
        if self.parallel {
            pairs
                .par_iter()
                .map(|&(i, j)| local_score(index, g, i, j))
                .collect()
        } else {
            pairs.iter().map(|&(i, j)| local_score(index, g, i, j)).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn score_local(&self, index: TopologyIndex, g: &Adjacency, pairs: &[(usize, usize)]) -> Vec<f64> {
        pairs.iter().map(|&(i, j)| local_score(index, g, i, j)).collect()
    }
}
