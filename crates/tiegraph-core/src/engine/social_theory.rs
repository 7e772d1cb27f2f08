//! Social-theory predictors.
//!
//! Each theory reads a graph and proposes edges into a separate predicted graph
//! through [`HierarchicalGraph::upsert_prediction`], always with score 1. The
//! endogenous theories only look at structure; the exogenous ones also compare
//! node attributes against a similarity threshold.

use std::collections::BTreeSet;

use super::adjacency::Adjacency;
use super::attributes::{AttributeWeightings, SimilarityModel};
use super::centrality::{
    bfs_distances, constraints, katz_centrality, katz_centrality_exact, local_constraint, percentile_nearest,
    KATZ_ALPHA,
};
use super::community::girvan_newman;
use super::dataset::{FeatureColumn, NodePair};
use super::errors::PredictError;
use super::graph::{HierarchicalGraph, MethodCategory, NodeData, NodeId};
use super::triads::{enumerate_types, missing_balance_edges, BALANCE_TRIADS};
use crate::storage::AttributeLookup;

const PROPOSAL_SCORE: f64 = 1.0;

/// Tuning of the collective-action theories.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveActionParams {
    /// Farthest hop distance a proposal may bridge.
    pub max_distance: usize,
    /// Percentile of centrality a node needs to act as a hub.
    pub percentile_centrality: f64,
    /// Percentile of centrality among a hub's distant nodes to be proposed.
    pub percentile_distant_nodes: f64,
    pub katz_alpha: f64,
}

impl Default for CollectiveActionParams {
    fn default() -> Self {
        Self {
            max_distance: 3,
            percentile_centrality: 80.0,
            percentile_distant_nodes: 90.0,
            katz_alpha: KATZ_ALPHA,
        }
    }
}

/// Attribute weighting and optional fixed threshold of an exogenous theory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExogenousParams {
    pub weightings: AttributeWeightings,
    /// Overrides the mean similarity over existing edges.
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocialTheoryPredictor {
    StructuralHole { percentile_constraints: f64 },
    SocialExchange,
    Balance { exogenous: Option<ExogenousParams> },
    CollectiveAction {
        params: CollectiveActionParams,
        exogenous: Option<ExogenousParams>,
    },
    Homophily(ExogenousParams),
    ResourceDependence(ExogenousParams),
}

/// Shared state of one `predict` call.
struct Context<'a> {
    graph: &'a HierarchicalGraph,
    adj: Adjacency,
    category: MethodCategory,
    proposals: usize,
}

impl<'a> Context<'a> {
    fn node(&self, i: usize) -> Result<&'a NodeData, PredictError> {
        let id = self.adj.node_id(i);
        self.graph.node(id).ok_or_else(|| PredictError::missing_node(id))
    }

    fn propose(
        &mut self,
        predicted: &mut HierarchicalGraph,
        source: usize,
        target: usize,
        method: &str,
    ) -> Result<(), PredictError> {
        let (s, t): (NodeId, NodeId) = (self.adj.node_id(source), self.adj.node_id(target));
        predicted.upsert_prediction(s, t, self.category, method, PROPOSAL_SCORE)?;
        self.proposals += 1;
        Ok(())
    }
}

/// Indices of `values` ordered by ascending value, ties by index.
fn ascending(indices: impl IntoIterator<Item = usize>, values: &[f64]) -> Vec<usize> {
    let mut out: Vec<usize> = indices.into_iter().collect();
    out.sort_by(|a, b| values[*a].total_cmp(&values[*b]).then(a.cmp(b)));
    out
}

impl SocialTheoryPredictor {
    pub fn designation(&self) -> &'static str {
        match self {
            SocialTheoryPredictor::StructuralHole { .. } => "StructuralHoleTheory",
            SocialTheoryPredictor::SocialExchange => "SocialExchangeTheory",
            SocialTheoryPredictor::Balance { .. } => "BalanceTheory",
            SocialTheoryPredictor::CollectiveAction { .. } => "CollectiveActionTheory",
            SocialTheoryPredictor::Homophily(_) => "HomophilyTheories",
            SocialTheoryPredictor::ResourceDependence(_) => "ResourceDependenceTheory",
        }
    }

    fn exogenous(&self) -> Option<&ExogenousParams> {
        match self {
            SocialTheoryPredictor::Balance { exogenous } => exogenous.as_ref(),
            SocialTheoryPredictor::CollectiveAction { exogenous, .. } => exogenous.as_ref(),
            SocialTheoryPredictor::Homophily(p) | SocialTheoryPredictor::ResourceDependence(p) => Some(p),
            _ => None,
        }
    }

    pub fn category(&self) -> MethodCategory {
        if self.exogenous().is_some() {
            MethodCategory::ExogenousSocialTheory
        } else {
            MethodCategory::EndogenousSocialTheory
        }
    }

    /// Proposes edges read from `graph` into `predicted`; returns the number of
    /// proposals made.
    pub fn predict(
        &self,
        graph: &HierarchicalGraph,
        predicted: &mut HierarchicalGraph,
        lookup: &dyn AttributeLookup,
    ) -> Result<usize, PredictError> {
        let mut ctx = Context {
            graph,
            adj: Adjacency::from_hierarchical(graph),
            category: self.category(),
            proposals: 0,
        };
        let similarity = match self.exogenous() {
            Some(params) => {
                let model = SimilarityModel::prepare(graph.nodes(), params.weightings.clone(), lookup)?;
                let threshold = params.threshold.unwrap_or_else(|| model.threshold(graph));
                tracing::debug!(predictor = self.designation(), threshold, "attribute threshold");
                Some((model, threshold))
            }
            None => None,
        };
        let sim = similarity.as_ref();

        match (self, sim) {
            (SocialTheoryPredictor::StructuralHole { percentile_constraints }, _) => {
                structural_holes(&mut ctx, predicted, *percentile_constraints)?
            }
            (SocialTheoryPredictor::SocialExchange, _) => social_exchange(&mut ctx, predicted)?,
            (SocialTheoryPredictor::Balance { .. }, sim) => balance(&mut ctx, predicted, sim)?,
            (SocialTheoryPredictor::CollectiveAction { params, .. }, None) => {
                collective_action(&mut ctx, predicted, params)?
            }
            (SocialTheoryPredictor::CollectiveAction { params, .. }, Some(sim)) => {
                exogenous_collective_action(&mut ctx, predicted, params, sim)?
            }
            (SocialTheoryPredictor::Homophily(_), Some(sim)) => homophily(&mut ctx, predicted, sim)?,
            (SocialTheoryPredictor::ResourceDependence(_), Some(sim)) => {
                resource_dependence(&mut ctx, predicted, sim)?
            }
            (_, None) => {
                return Err(PredictError::Internal(format!(
                    "{} requires attribute similarity",
                    self.designation()
                )))
            }
        }
        tracing::debug!(
            predictor = self.designation(),
            category = %ctx.category,
            proposals = ctx.proposals,
            "social theory applied"
        );
        Ok(ctx.proposals)
    }
}

/// Brokers (lowest-constraint nodes of each community) are linked to the broker
/// of another community that lowers their constraint the most.
fn structural_holes(
    ctx: &mut Context<'_>,
    predicted: &mut HierarchicalGraph,
    percentile: f64,
) -> Result<(), PredictError> {
    let constraint = constraints(&ctx.adj);
    let communities = girvan_newman(&ctx.adj, 1);

    let brokers: Vec<Vec<usize>> = communities
        .iter()
        .map(|members| {
            let values: Vec<f64> = members.iter().map(|&m| constraint[m]).collect();
            match percentile_nearest(&values, percentile) {
                Some(cut) => members.iter().copied().filter(|&m| constraint[m] <= cut).collect(),
                None => Vec::new(),
            }
        })
        .collect();

    let mut work = ctx.adj.clone();
    let mut chosen = Vec::new();
    for (community, own) in brokers.iter().enumerate() {
        for &broker in own {
            let mut best: Option<(usize, f64)> = None;
            let counterparts = brokers
                .iter()
                .enumerate()
                .filter(|(c, _)| *c != community)
                .flat_map(|(_, b)| b.iter().copied());
            for candidate in counterparts {
                if work.has_edge(broker, candidate) {
                    continue;
                }
                work.add_edge(broker, candidate);
                let hypothetical: f64 = work
                    .neighbors(broker)
                    .iter()
                    .map(|&n| local_constraint(&work, broker, n))
                    .sum();
                work.remove_edge(broker, candidate);
                if best.map_or(true, |(_, c)| hypothetical < c) {
                    best = Some((candidate, hypothetical));
                }
            }
            if let Some((candidate, value)) = best {
                if value < constraint[broker] {
                    chosen.push((broker, candidate));
                }
            }
        }
    }
    for (broker, candidate) in chosen {
        ctx.propose(predicted, broker, candidate, "StructuralHoleTheory")?;
    }
    Ok(())
}

/// Reciprocates every one-directional edge.
fn social_exchange(ctx: &mut Context<'_>, predicted: &mut HierarchicalGraph) -> Result<(), PredictError> {
    let open: Vec<(usize, usize)> = ctx
        .adj
        .edges()
        .filter(|&(a, b)| !ctx.adj.has_edge(b, a))
        .collect();
    for (a, b) in open {
        ctx.propose(predicted, b, a, "SocialExchangeTheory")?;
    }
    Ok(())
}

/// Closes transitive chains inside unbalanced triads.
fn balance(
    ctx: &mut Context<'_>,
    predicted: &mut HierarchicalGraph,
    sim: Option<&(SimilarityModel, f64)>,
) -> Result<(), PredictError> {
    let wanted: BTreeSet<_> = BALANCE_TRIADS.iter().copied().collect();
    let census = enumerate_types(&ctx.adj, &wanted);
    let mut assessed: BTreeSet<[usize; 3]> = BTreeSet::new();
    for (triad, triples) in &census {
        let method = format!("BalanceTheory.{}", triad);
        for triple in triples {
            if !assessed.insert(*triple) {
                continue;
            }
            if let Some((model, threshold)) = sim {
                let [a, b, c] = *triple;
                let (na, nb, nc) = (ctx.node(a)?, ctx.node(b)?, ctx.node(c)?);
                let similar = model.similarity_or_zero(na, nb) > *threshold
                    && model.similarity_or_zero(nb, nc) > *threshold
                    && model.similarity_or_zero(na, nc) > *threshold;
                if !similar {
                    continue;
                }
            }
            for (s, t) in missing_balance_edges(&ctx.adj, *triple) {
                ctx.propose(predicted, s, t, &method)?;
            }
        }
    }
    Ok(())
}

/// Proposals from `hub` to the most central nodes at distance `2..=max_distance`.
fn distant_targets(
    adj: &Adjacency,
    hub: usize,
    centrality: &[f64],
    params: &CollectiveActionParams,
) -> Vec<usize> {
    let distances = bfs_distances(adj, hub);
    let distant: Vec<usize> = distances
        .iter()
        .enumerate()
        .filter(|(_, d)| matches!(d, Some(d) if *d > 1 && *d <= params.max_distance))
        .map(|(i, _)| i)
        .collect();
    let values: Vec<f64> = distant.iter().map(|&i| centrality[i]).collect();
    let Some(cut) = percentile_nearest(&values, params.percentile_distant_nodes) else {
        return Vec::new();
    };
    ascending(distant, centrality)
        .into_iter()
        .filter(|&i| centrality[i] >= cut)
        .collect()
}

/// Highly central nodes reach out to central nodes a few hops away.
fn collective_action(
    ctx: &mut Context<'_>,
    predicted: &mut HierarchicalGraph,
    params: &CollectiveActionParams,
) -> Result<(), PredictError> {
    let centrality = katz_centrality_exact(&ctx.adj, params.katz_alpha)?;
    let Some(cut) = percentile_nearest(&centrality, params.percentile_centrality) else {
        return Ok(());
    };
    let hubs: Vec<usize> = ascending(0..centrality.len(), &centrality)
        .into_iter()
        .filter(|&i| centrality[i] >= cut)
        .collect();
    let mut proposals = Vec::new();
    for hub in hubs {
        for target in distant_targets(&ctx.adj, hub, &centrality, params) {
            proposals.push((hub, target));
        }
    }
    for (hub, target) in proposals {
        ctx.propose(predicted, hub, target, "CollectiveActionTheory")?;
    }
    Ok(())
}

/// Collective action where each node only sees the nodes similar to it.
fn exogenous_collective_action(
    ctx: &mut Context<'_>,
    predicted: &mut HierarchicalGraph,
    params: &CollectiveActionParams,
    (model, threshold): &(SimilarityModel, f64),
) -> Result<(), PredictError> {
    let n = ctx.adj.node_count();
    // Per node: its similarity-restricted subgraph, the node's index in it and
    // the subgraph's centralities.
    let mut views: Vec<(Adjacency, usize, Vec<f64>)> = Vec::with_capacity(n);
    let mut own_centrality = Vec::with_capacity(n);
    for u in 0..n {
        let nu = ctx.node(u)?;
        let mut keep = Vec::new();
        for v in 0..n {
            if v == u || model.similarity_or_zero(nu, ctx.node(v)?) > *threshold {
                keep.push(v);
            }
        }
        let sub = ctx.adj.induced(&keep);
        let local = sub
            .index_of(ctx.adj.node_id(u))
            .ok_or_else(|| PredictError::Internal("ego node missing from its subgraph".into()))?;
        let centrality = katz_centrality(&sub, params.katz_alpha)?;
        own_centrality.push(centrality[local]);
        views.push((sub, local, centrality));
    }

    let Some(cut) = percentile_nearest(&own_centrality, params.percentile_centrality) else {
        return Ok(());
    };
    let hubs: Vec<usize> = ascending(0..n, &own_centrality)
        .into_iter()
        .filter(|&i| own_centrality[i] >= cut)
        .collect();
    let mut proposals = Vec::new();
    for hub in hubs {
        let (sub, local, centrality) = &views[hub];
        for target in distant_targets(sub, *local, centrality, params) {
            let id = sub.node_id(target);
            if let Some(global) = ctx.adj.index_of(id) {
                proposals.push((hub, global));
            }
        }
    }
    for (hub, target) in proposals {
        ctx.propose(predicted, hub, target, "CollectiveActionTheory")?;
    }
    Ok(())
}

/// Links every non-adjacent ordered pair whose similarity exceeds the threshold.
fn homophily(
    ctx: &mut Context<'_>,
    predicted: &mut HierarchicalGraph,
    (model, threshold): &(SimilarityModel, f64),
) -> Result<(), PredictError> {
    let n = ctx.adj.node_count();
    let mut proposals = Vec::new();
    for u in 0..n {
        let nu = ctx.node(u)?;
        for v in 0..n {
            if u == v || ctx.adj.has_edge(u, v) {
                continue;
            }
            if model.similarity_or_zero(nu, ctx.node(v)?) > *threshold {
                proposals.push((u, v));
            }
        }
    }
    for (u, v) in proposals {
        ctx.propose(predicted, u, v, "HomophilyTheories")?;
    }
    Ok(())
}

/// Reciprocates one-directional edges between similar nodes.
fn resource_dependence(
    ctx: &mut Context<'_>,
    predicted: &mut HierarchicalGraph,
    (model, threshold): &(SimilarityModel, f64),
) -> Result<(), PredictError> {
    let mut proposals = Vec::new();
    for (a, b) in ctx.adj.edges() {
        if ctx.adj.has_edge(b, a) {
            continue;
        }
        if model.similarity_or_zero(ctx.node(b)?, ctx.node(a)?) > *threshold {
            proposals.push((b, a));
        }
    }
    for (b, a) in proposals {
        ctx.propose(predicted, b, a, "ResourceDependenceTheory")?;
    }
    Ok(())
}

/// One 0/1 column per social-theory method applied to a predicted component of
/// any of `pairs`, named by method and sorted by name.
pub fn social_theory_features(predicted: &HierarchicalGraph, pairs: &[NodePair]) -> Vec<FeatureColumn> {
    let applied: Vec<BTreeSet<&str>> = pairs
        .iter()
        .map(|&(u, v)| {
            predicted
                .component(u, v)
                .filter(|c| c.predicted)
                .map(|c| {
                    c.methods()
                        .filter(|(category, _)| category.is_social_theory())
                        .map(|(_, method)| method)
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();
    let names: BTreeSet<&str> = applied.iter().flatten().copied().collect();
    names
        .into_iter()
        .map(|name| FeatureColumn {
            name: name.to_string(),
            values: applied
                .iter()
                .map(|methods| if methods.contains(name) { 1.0 } else { 0.0 })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::EdgeColor;
    use crate::storage::InMemoryStore;
    use std::collections::HashMap;

    fn graph(n: u32, edges: &[(u32, u32)]) -> HierarchicalGraph {
        let mut g = HierarchicalGraph::new();
        for i in 0..n {
            g.add_node(NodeId(i), HashMap::new());
        }
        for &(u, v) in edges {
            g.add_original_edge(NodeId(u), NodeId(v), None).unwrap();
        }
        g
    }

    fn with_attr(mut g: HierarchicalGraph, name: &str, values: &[&str]) -> HierarchicalGraph {
        let nodes: Vec<NodeData> = g.nodes().cloned().collect();
        for (node, value) in nodes.into_iter().zip(values) {
            g.insert_node(node.with_attr(name, value));
        }
        g
    }

    fn run(p: &SocialTheoryPredictor, g: &HierarchicalGraph) -> HierarchicalGraph {
        let mut predicted = g.clone();
        p.predict(g, &mut predicted, &InMemoryStore::new()).unwrap();
        predicted
    }

    fn predicted_edges(g: &HierarchicalGraph) -> Vec<(u32, u32)> {
        let mut out: Vec<(u32, u32)> = g
            .components()
            .filter(|c| c.predicted)
            .map(|c| (c.source.0, c.target.0))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn social_exchange_reciprocates_path() {
        let g = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        let p = run(&SocialTheoryPredictor::SocialExchange, &g);
        assert_eq!(predicted_edges(&p), vec![(1, 0), (2, 1), (3, 2)]);
        for pair in p.pairs() {
            assert_eq!(pair.color, EdgeColor::Mixed);
            assert!(!pair.component(pair.source, pair.target).unwrap().predicted);
        }
    }

    #[test]
    fn social_exchange_skips_reciprocated_edges() {
        let g = graph(2, &[(0, 1), (1, 0)]);
        assert!(predicted_edges(&run(&SocialTheoryPredictor::SocialExchange, &g)).is_empty());
    }

    #[test]
    fn balance_closes_chain() {
        let g = graph(3, &[(0, 1), (1, 2)]);
        let p = run(&SocialTheoryPredictor::Balance { exogenous: None }, &g);
        assert_eq!(predicted_edges(&p), vec![(0, 2)]);
        let c = p.component(NodeId(0), NodeId(2)).unwrap();
        assert_eq!(
            c.applied_methods[&MethodCategory::EndogenousSocialTheory],
            vec!["BalanceTheory.021C".to_string()]
        );
    }

    #[test]
    fn exogenous_balance_requires_similar_triad() {
        let base = graph(3, &[(0, 1), (1, 2)]);
        let predictor = SocialTheoryPredictor::Balance {
            exogenous: Some(ExogenousParams {
                weightings: AttributeWeightings::new(),
                threshold: Some(0.5),
            }),
        };
        let alike = with_attr(base.clone(), "gender", &["f", "f", "f"]);
        assert_eq!(predicted_edges(&run(&predictor, &alike)), vec![(0, 2)]);
        let mixed = with_attr(base, "gender", &["f", "m", "f"]);
        assert!(predicted_edges(&run(&predictor, &mixed)).is_empty());
    }

    #[test]
    fn homophily_links_identical_nodes() {
        let g = with_attr(
            graph(4, &[(0, 1), (1, 2), (2, 3)]),
            "gender",
            &["f", "f", "f", "f"],
        );
        let p = run(
            &SocialTheoryPredictor::Homophily(ExogenousParams {
                weightings: AttributeWeightings::new(),
                threshold: Some(0.4),
            }),
            &g,
        );
        assert_eq!(predicted_edges(&p).len(), 9);
    }

    #[test]
    fn homophily_threshold_defaults_to_edge_mean() {
        // Every edge joins identical nodes, so the threshold is 1 and nothing exceeds it.
        let g = with_attr(graph(3, &[(0, 1)]), "gender", &["f", "f", "f"]);
        let p = run(&SocialTheoryPredictor::Homophily(ExogenousParams::default()), &g);
        assert!(predicted_edges(&p).is_empty());
    }

    #[test]
    fn resource_dependence_reciprocates_similar_pairs() {
        let g = with_attr(graph(3, &[(0, 1), (1, 2)]), "gender", &["f", "f", "m"]);
        let p = run(
            &SocialTheoryPredictor::ResourceDependence(ExogenousParams {
                weightings: AttributeWeightings::new(),
                threshold: Some(0.5),
            }),
            &g,
        );
        assert_eq!(predicted_edges(&p), vec![(1, 0)]);
    }

    #[test]
    fn collective_action_bridges_distant_hubs() {
        // Star around 0 with a tail 3 - 4.
        let g = graph(5, &[(1, 0), (2, 0), (3, 0), (4, 3)]);
        let p = run(
            &SocialTheoryPredictor::CollectiveAction {
                params: CollectiveActionParams::default(),
                exogenous: None,
            },
            &g,
        );
        let proposals = predicted_edges(&p);
        assert!(!proposals.is_empty());
        for (s, t) in &proposals {
            assert!(!g.has_edge(NodeId(*s), NodeId(*t)));
        }
        assert!(proposals.iter().any(|&(s, _)| s == 0));
    }

    #[test]
    fn structural_holes_bridge_communities() {
        // Two triangles joined by a single bridge 2 -> 3.
        let g = graph(
            6,
            &[(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 3)],
        );
        let p = run(
            &SocialTheoryPredictor::StructuralHole {
                percentile_constraints: 10.0,
            },
            &g,
        );
        assert_eq!(predicted_edges(&p), vec![(3, 2)]);
    }

    #[test]
    fn collective_action_survives_dense_graphs() {
        // Complete digraph on 0..=11 (spectral radius above 1 / alpha) with a
        // pendant node 12 attached to 11.
        let mut edges: Vec<(u32, u32)> = (0..12)
            .flat_map(|u| (0..12).filter(move |&v| v != u).map(move |v| (u, v)))
            .collect();
        edges.push((12, 11));
        let g = graph(13, &edges);
        let p = run(
            &SocialTheoryPredictor::CollectiveAction {
                params: CollectiveActionParams::default(),
                exogenous: None,
            },
            &g,
        );
        let proposals = predicted_edges(&p);
        assert!(!proposals.is_empty());
        assert!(proposals.iter().all(|&(s, t)| s < 11 && t == 12));
    }

    #[test]
    fn features_mark_applied_methods() {
        let g = graph(3, &[(0, 1), (1, 2)]);
        let mut predicted = g.clone();
        let store = InMemoryStore::new();
        SocialTheoryPredictor::SocialExchange
            .predict(&g, &mut predicted, &store)
            .unwrap();
        SocialTheoryPredictor::Balance { exogenous: None }
            .predict(&g, &mut predicted, &store)
            .unwrap();
        let pairs = vec![(NodeId(1), NodeId(0)), (NodeId(0), NodeId(2)), (NodeId(2), NodeId(0))];
        let columns = social_theory_features(&predicted, &pairs);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["BalanceTheory.021C", "SocialExchangeTheory"]);
        assert_eq!(columns[0].values, vec![0.0, 1.0, 0.0]);
        assert_eq!(columns[1].values, vec![1.0, 0.0, 0.0]);
        assert!(social_theory_features(&predicted, &[(NodeId(0), NodeId(1))]).is_empty());
    }

    #[test]
    fn categories_follow_attribute_use() {
        assert_eq!(
            SocialTheoryPredictor::SocialExchange.category(),
            MethodCategory::EndogenousSocialTheory
        );
        assert_eq!(
            SocialTheoryPredictor::Homophily(ExogenousParams::default()).category(),
            MethodCategory::ExogenousSocialTheory
        );
    }
}
