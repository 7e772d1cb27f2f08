//! # Provenance Graph
//!
//! This module implements the directed social graph that every predictor reads
//! and the predicted graph that predictors write into.
//!
//! ## Key Components
//!
//! - **EdgeComponent**: one directed sub-edge `source → target` carrying its
//!   provenance (`predicted`, accumulated `score`, and the applied methods
//!   grouped by [`MethodCategory`])
//!
//! - **PairEdge**: the hierarchical edge, keyed by an *unordered* node pair and
//!   holding at most one component per direction plus an aggregate [`EdgeColor`]
//!
//! - **HierarchicalGraph** / **FlatGraph**: two lossless views of the same graph.
//!   The hierarchical view groups both directions of a pair; the flat view holds
//!   one record per realized direction with flattened provenance fields.
//!
//! ## Merge protocol
//!
//! [`HierarchicalGraph::upsert_prediction`] is the only way a prediction enters a
//! graph:
//! - a brand new pair becomes `Predicted` with a single predicted component
//! - a predicted component in the same direction accumulates score and methods
//! - an original component in the same direction is never touched
//! - a new direction appended next to an original (or absent) reverse makes the
//!   pair `Mixed`
//!
//! ## Example
//!
//! ```rust,ignore
//! use tiegraph_core::engine::graph::*;
//!
//! let mut graph = HierarchicalGraph::default();
//! graph.add_node(NodeId(1), Default::default());
//! graph.add_node(NodeId(2), Default::default());
//! graph.add_original_edge(NodeId(1), NodeId(2), None)?;
//! graph.upsert_prediction(NodeId(2), NodeId(1), MethodCategory::EndogenousSocialTheory,
//!     "SocialExchangeTheory", 1.0)?;
//! assert_eq!(graph.pair(NodeId(1), NodeId(2)).unwrap().color, EdgeColor::Mixed);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use smallvec::SmallVec;

use crate::engine::errors::PredictError;

/// A network-local node identifier.
///
/// NodeId implements Ord/PartialOrd for stable, deterministic iteration.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-side identifier of an original directed edge.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EdgeId(pub u32);

/// The family of methods a prediction originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MethodCategory {
    #[cfg_attr(feature = "serde", serde(rename = "Topology"))]
    Topology,
    #[cfg_attr(feature = "serde", serde(rename = "Endogenous Social Theory"))]
    EndogenousSocialTheory,
    #[cfg_attr(feature = "serde", serde(rename = "Exogenous Social Theory"))]
    ExogenousSocialTheory,
    #[cfg_attr(feature = "serde", serde(rename = "ML-Classification"))]
    Classification,
}

impl MethodCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodCategory::Topology => "Topology",
            MethodCategory::EndogenousSocialTheory => "Endogenous Social Theory",
            MethodCategory::ExogenousSocialTheory => "Exogenous Social Theory",
            MethodCategory::Classification => "ML-Classification",
        }
    }

    /// Whether methods of this category are social theories.
    pub fn is_social_theory(&self) -> bool {
        matches!(
            self,
            MethodCategory::EndogenousSocialTheory | MethodCategory::ExogenousSocialTheory
        )
    }
}

impl fmt::Display for MethodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applied methods of a component, grouped by category.
pub type AppliedMethods = BTreeMap<MethodCategory, Vec<String>>;

/// Aggregate provenance tag of a node pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum EdgeColor {
    /// Every component is part of the ground truth.
    Original,
    /// Every component is a prediction.
    Predicted,
    /// The pair mixes original and predicted components.
    Mixed,
}

impl EdgeColor {
    /// Display color used by the analyst front end.
    pub fn hex(&self) -> &'static str {
        match self {
            EdgeColor::Original => "#133F5C",
            EdgeColor::Predicted => "#EB5F5E",
            EdgeColor::Mixed => "#F3A533",
        }
    }
}

/// A node with its string-valued attributes. Immutable once imported.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeData {
    pub id: NodeId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attrs: HashMap<String, String>,
}

impl NodeData {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Returns the attribute value if present and non-empty.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// One directed sub-edge of a [`PairEdge`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeComponent {
    pub source: NodeId,
    pub target: NodeId,
    pub predicted: bool,
    /// Accumulated prediction score; `None` for original components.
    pub score: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub applied_methods: AppliedMethods,
}

impl EdgeComponent {
    /// A ground-truth component.
    pub fn original(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            predicted: false,
            score: None,
            applied_methods: AppliedMethods::new(),
        }
    }

    /// A fresh prediction carrying a single applied method.
    pub fn predicted(
        source: NodeId,
        target: NodeId,
        category: MethodCategory,
        method: &str,
        score: f64,
    ) -> Self {
        let mut applied_methods = AppliedMethods::new();
        applied_methods.insert(category, vec![method.to_string()]);
        Self {
            source,
            target,
            predicted: true,
            score: Some(score),
            applied_methods,
        }
    }

    pub fn is_direction(&self, source: NodeId, target: NodeId) -> bool {
        self.source == source && self.target == target
    }

    /// Iterates `(category, method)` for every applied method.
    pub fn methods(&self) -> impl Iterator<Item = (MethodCategory, &str)> + '_ {
        self.applied_methods
            .iter()
            .flat_map(|(cat, names)| names.iter().map(move |n| (*cat, n.as_str())))
    }
}

/// Unordered node pair, stored as `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct PairKey(NodeId, NodeId);

impl PairKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }

    pub fn nodes(&self) -> (NodeId, NodeId) {
        (self.0, self.1)
    }
}

/// Store identifiers of the two directions of a pair, relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeIdentifiers {
    /// Identifier of the `source → target` direction.
    pub forward: Option<EdgeId>,
    /// Identifier of the `target → source` direction.
    pub reverse: Option<EdgeId>,
}

/// Hierarchical edge: both directions of one unordered pair.
///
/// `source → target` is the anchor direction, i.e. the direction through which
/// the pair was first created. Components keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub components: SmallVec<[EdgeComponent; 2]>,
    pub color: EdgeColor,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ids: EdgeIdentifiers,
}

impl PairEdge {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.source, self.target)
    }

    pub fn component(&self, source: NodeId, target: NodeId) -> Option<&EdgeComponent> {
        self.components
            .iter()
            .find(|c| c.is_direction(source, target))
    }

    fn id_slot_mut(&mut self, source: NodeId) -> &mut Option<EdgeId> {
        if source == self.source {
            &mut self.ids.forward
        } else {
            &mut self.ids.reverse
        }
    }

    fn id_for(&self, source: NodeId) -> Option<EdgeId> {
        if source == self.source {
            self.ids.forward
        } else {
            self.ids.reverse
        }
    }
}

/// Per-graph counts, including how often each method was applied.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphSummary {
    pub node_count: usize,
    pub directed_edge_count: usize,
    pub undirected_edge_count: usize,
    pub methods_applied: BTreeMap<MethodCategory, BTreeMap<String, usize>>,
}

/// Directed graph with one entry per unordered node pair.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchicalGraph {
    nodes: BTreeMap<NodeId, NodeData>,
    #[cfg_attr(feature = "serde", serde(with = "serde_pairs"))]
    pairs: BTreeMap<PairKey, PairEdge>,
}

impl HierarchicalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a node.
    pub fn add_node(&mut self, id: NodeId, attrs: HashMap<String, String>) {
        self.nodes.insert(id, NodeData { id, attrs });
    }

    pub fn insert_node(&mut self, node: NodeData) {
        self.nodes.insert(node.id, node);
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeData> + '_ {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PairEdge> + '_ {
        self.pairs.values()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// The pair entry containing `a`/`b`, regardless of direction.
    pub fn pair(&self, a: NodeId, b: NodeId) -> Option<&PairEdge> {
        self.pairs.get(&PairKey::new(a, b))
    }

    /// The component for the directed edge `source → target`, if realized.
    pub fn component(&self, source: NodeId, target: NodeId) -> Option<&EdgeComponent> {
        self.pair(source, target)
            .and_then(|p| p.component(source, target))
    }

    /// Whether the directed edge `source → target` is realized (original or predicted).
    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.component(source, target).is_some()
    }

    /// Iterates every realized directed component.
    pub fn components(&self) -> impl Iterator<Item = &EdgeComponent> + '_ {
        self.pairs.values().flat_map(|p| p.components.iter())
    }

    /// Iterates the endpoints of every realized directed edge.
    pub fn directed_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.components().map(|c| (c.source, c.target))
    }

    pub fn edge_count(&self) -> usize {
        self.pairs.values().map(|p| p.components.len()).sum()
    }

    fn check_endpoints(&self, source: NodeId, target: NodeId) -> Result<(), PredictError> {
        if source == target {
            return Err(PredictError::InvalidParameter(format!(
                "self-loop {} -> {} is not supported",
                source, target
            )));
        }
        for n in [source, target] {
            if !self.nodes.contains_key(&n) {
                return Err(PredictError::missing_node(n));
            }
        }
        Ok(())
    }

    /// Adds a ground-truth edge. Adding an already realized original direction is a no-op.
    pub fn add_original_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        id: Option<EdgeId>,
    ) -> Result<(), PredictError> {
        self.check_endpoints(source, target)?;
        let key = PairKey::new(source, target);
        match self.pairs.get_mut(&key) {
            None => {
                let mut components = SmallVec::new();
                components.push(EdgeComponent::original(source, target));
                self.pairs.insert(
                    key,
                    PairEdge {
                        source,
                        target,
                        components,
                        color: EdgeColor::Original,
                        ids: EdgeIdentifiers {
                            forward: id,
                            reverse: None,
                        },
                    },
                );
            }
            Some(pair) => {
                if let Some(existing) = pair.component(source, target) {
                    if existing.predicted {
                        return Err(PredictError::InvalidParameter(format!(
                            "edge {} -> {} is already a prediction",
                            source, target
                        )));
                    }
                    return Ok(());
                }
                pair.components.push(EdgeComponent::original(source, target));
                *pair.id_slot_mut(source) = id;
                if pair.components.iter().any(|c| c.predicted) {
                    pair.color = EdgeColor::Mixed;
                }
            }
        }
        Ok(())
    }

    /// Records a prediction `source → target` following the merge protocol.
    ///
    /// Scores for the same directed pair are additive and methods accumulate
    /// under their category; original components are never modified.
    pub fn upsert_prediction(
        &mut self,
        source: NodeId,
        target: NodeId,
        category: MethodCategory,
        method: &str,
        score: f64,
    ) -> Result<(), PredictError> {
        self.check_endpoints(source, target)?;
        let key = PairKey::new(source, target);
        let Some(pair) = self.pairs.get_mut(&key) else {
            let mut components = SmallVec::new();
            components.push(EdgeComponent::predicted(
                source, target, category, method, score,
            ));
            self.pairs.insert(
                key,
                PairEdge {
                    source,
                    target,
                    components,
                    color: EdgeColor::Predicted,
                    ids: EdgeIdentifiers::default(),
                },
            );
            return Ok(());
        };

        let mut direction_exists = false;
        let mut reverse_predicted = false;
        for component in pair.components.iter_mut() {
            if component.is_direction(source, target) {
                if component.predicted {
                    *component.score.get_or_insert(0.0) += score;
                    component
                        .applied_methods
                        .entry(category)
                        .or_default()
                        .push(method.to_string());
                }
                direction_exists = true;
            } else if component.is_direction(target, source) && component.predicted {
                reverse_predicted = true;
            }
        }

        if !direction_exists {
            pair.components.push(EdgeComponent::predicted(
                source, target, category, method, score,
            ));
            if !reverse_predicted {
                pair.color = EdgeColor::Mixed;
            }
        }
        Ok(())
    }

    /// Drops predicted components scoring below `min_score`. Original components
    /// always stay; pairs left without components are removed.
    pub fn retain_predictions_above(&mut self, min_score: f64) {
        self.pairs.retain(|_, pair| {
            pair.components
                .retain(|c| !c.predicted || c.score.unwrap_or(0.0) >= min_score);
            if pair.components.is_empty() {
                return false;
            }
            let predicted = pair.components.iter().filter(|c| c.predicted).count();
            if predicted == 0 {
                pair.color = EdgeColor::Original;
            } else if predicted == pair.components.len() && pair.color != EdgeColor::Mixed {
                pair.color = EdgeColor::Predicted;
            }
            if pair.component(pair.source, pair.target).is_none() {
                // Re-anchor on the surviving direction.
                let (s, t) = (pair.target, pair.source);
                pair.source = s;
                pair.target = t;
                pair.ids = EdgeIdentifiers {
                    forward: pair.ids.reverse,
                    reverse: None,
                };
            }
            true
        });
    }

    /// Counts nodes, edges and applied methods.
    pub fn summary(&self) -> GraphSummary {
        let mut methods_applied: BTreeMap<MethodCategory, BTreeMap<String, usize>> =
            BTreeMap::new();
        for component in self.components().filter(|c| c.predicted) {
            for (category, method) in component.methods() {
                *methods_applied
                    .entry(category)
                    .or_default()
                    .entry(method.to_string())
                    .or_insert(0) += 1;
            }
        }
        GraphSummary {
            node_count: self.node_count(),
            directed_edge_count: self.edge_count(),
            undirected_edge_count: self.pair_count(),
            methods_applied,
        }
    }

    /// Expands every pair into one flat record per realized direction.
    pub fn to_flat(&self) -> FlatGraph {
        let mut edges = Vec::with_capacity(self.edge_count());
        for pair in self.pairs.values() {
            for component in &pair.components {
                edges.push(FlatEdge {
                    source: component.source,
                    target: component.target,
                    predicted: component.predicted,
                    prediction_score: if component.predicted {
                        component.score
                    } else {
                        None
                    },
                    applied_methods: if component.predicted {
                        Some(component.applied_methods.clone())
                    } else {
                        None
                    },
                    color: pair.color,
                    id: pair.id_for(component.source),
                });
            }
        }
        FlatGraph {
            nodes: self.nodes.clone(),
            edges,
        }
    }
}

/// One realized direction with flattened provenance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub predicted: bool,
    pub prediction_score: Option<f64>,
    pub applied_methods: Option<AppliedMethods>,
    /// Color of the pair this direction belongs to.
    pub color: EdgeColor,
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: Option<EdgeId>,
}

impl FlatEdge {
    pub fn original(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            predicted: false,
            prediction_score: None,
            applied_methods: None,
            color: EdgeColor::Original,
            id: None,
        }
    }
}

/// Directed graph with one record per realized direction.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatGraph {
    pub nodes: BTreeMap<NodeId, NodeData>,
    pub edges: Vec<FlatEdge>,
}

impl FlatGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: NodeData) {
        self.nodes.insert(node.id, node);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn directed_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edges.iter().map(|e| (e.source, e.target))
    }

    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    /// Folds `(u, v)` / `(v, u)` records back into pair entries.
    ///
    /// The first record of a pair becomes its anchor and supplies the pair
    /// color. A direction repeated later in the list is ignored.
    pub fn to_hierarchical(&self) -> HierarchicalGraph {
        let mut pairs: BTreeMap<PairKey, PairEdge> = BTreeMap::new();
        for edge in &self.edges {
            let component = EdgeComponent {
                source: edge.source,
                target: edge.target,
                predicted: edge.predicted,
                score: if edge.predicted {
                    edge.prediction_score
                } else {
                    None
                },
                applied_methods: if edge.predicted {
                    edge.applied_methods.clone().unwrap_or_default()
                } else {
                    AppliedMethods::new()
                },
            };
            let key = PairKey::new(edge.source, edge.target);
            match pairs.get_mut(&key) {
                None => {
                    let mut components = SmallVec::new();
                    components.push(component);
                    pairs.insert(
                        key,
                        PairEdge {
                            source: edge.source,
                            target: edge.target,
                            components,
                            color: edge.color,
                            ids: EdgeIdentifiers {
                                forward: edge.id,
                                reverse: None,
                            },
                        },
                    );
                }
                Some(pair) => {
                    if pair.component(edge.source, edge.target).is_some() {
                        continue;
                    }
                    pair.components.push(component);
                    *pair.id_slot_mut(edge.source) = edge.id;
                }
            }
        }
        HierarchicalGraph {
            nodes: self.nodes.clone(),
            pairs,
        }
    }
}

/// Serializes the pair map as a list of pair entries (JSON maps need string keys).
#[cfg(feature = "serde")]
mod serde_pairs {
    use super::{PairEdge, PairKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(pairs: &BTreeMap<PairKey, PairEdge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let list: Vec<&PairEdge> = pairs.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<PairKey, PairEdge>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<PairEdge>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|p| (p.key(), p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: u32) -> HierarchicalGraph {
        let mut g = HierarchicalGraph::new();
        for i in 0..n {
            g.add_node(NodeId(i), HashMap::new());
        }
        for i in 0..n.saturating_sub(1) {
            g.add_original_edge(NodeId(i), NodeId(i + 1), Some(EdgeId(i)))
                .unwrap();
        }
        g
    }

    // ============================================================================
    // Merge protocol
    // ============================================================================

    #[test]
    fn upsert_on_empty_pair_creates_predicted_pair() {
        let mut g = path_graph(3);
        g.upsert_prediction(NodeId(0), NodeId(2), MethodCategory::Topology, "Jaccard", 0.5)
            .unwrap();

        let pair = g.pair(NodeId(2), NodeId(0)).unwrap();
        assert_eq!(pair.color, EdgeColor::Predicted);
        assert_eq!(pair.components.len(), 1);
        let c = &pair.components[0];
        assert!(c.predicted);
        assert_eq!(c.score, Some(0.5));
        assert_eq!(
            c.applied_methods[&MethodCategory::Topology],
            vec!["Jaccard".to_string()]
        );
    }

    #[test]
    fn repeated_upsert_accumulates_score_and_methods() {
        let mut g = path_graph(3);
        g.upsert_prediction(NodeId(0), NodeId(2), MethodCategory::Topology, "Jaccard", 0.25)
            .unwrap();
        g.upsert_prediction(NodeId(0), NodeId(2), MethodCategory::Topology, "Jaccard", 0.5)
            .unwrap();

        let c = g.component(NodeId(0), NodeId(2)).unwrap();
        assert!((c.score.unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(c.applied_methods[&MethodCategory::Topology].len(), 2);
    }

    #[test]
    fn upsert_never_touches_original_component() {
        let mut g = path_graph(2);
        g.upsert_prediction(
            NodeId(0),
            NodeId(1),
            MethodCategory::EndogenousSocialTheory,
            "SocialExchangeTheory",
            1.0,
        )
        .unwrap();

        let pair = g.pair(NodeId(0), NodeId(1)).unwrap();
        assert_eq!(pair.components.len(), 1);
        assert!(!pair.components[0].predicted);
        assert_eq!(pair.components[0].score, None);
        assert_eq!(pair.color, EdgeColor::Original);
    }

    #[test]
    fn reverse_of_original_makes_pair_mixed() {
        let mut g = path_graph(2);
        g.upsert_prediction(
            NodeId(1),
            NodeId(0),
            MethodCategory::EndogenousSocialTheory,
            "SocialExchangeTheory",
            1.0,
        )
        .unwrap();

        let pair = g.pair(NodeId(0), NodeId(1)).unwrap();
        assert_eq!(pair.components.len(), 2);
        assert_eq!(pair.color, EdgeColor::Mixed);
        assert!(!pair.component(NodeId(0), NodeId(1)).unwrap().predicted);
        assert!(pair.component(NodeId(1), NodeId(0)).unwrap().predicted);
    }

    #[test]
    fn reverse_of_prediction_keeps_pair_predicted() {
        let mut g = path_graph(3);
        g.upsert_prediction(NodeId(0), NodeId(2), MethodCategory::Topology, "Salton", 1.0)
            .unwrap();
        g.upsert_prediction(NodeId(2), NodeId(0), MethodCategory::Topology, "Salton", 1.0)
            .unwrap();
        assert_eq!(
            g.pair(NodeId(0), NodeId(2)).unwrap().color,
            EdgeColor::Predicted
        );
    }

    #[test]
    fn upsert_rejects_unknown_nodes_and_self_loops() {
        let mut g = path_graph(2);
        assert!(matches!(
            g.upsert_prediction(NodeId(0), NodeId(9), MethodCategory::Topology, "x", 1.0),
            Err(PredictError::MissingData(_))
        ));
        assert!(matches!(
            g.upsert_prediction(NodeId(0), NodeId(0), MethodCategory::Topology, "x", 1.0),
            Err(PredictError::InvalidParameter(_))
        ));
    }

    #[test]
    fn original_reverse_edge_joins_existing_pair() {
        let mut g = path_graph(2);
        g.add_original_edge(NodeId(1), NodeId(0), Some(EdgeId(7))).unwrap();
        let pair = g.pair(NodeId(0), NodeId(1)).unwrap();
        assert_eq!(pair.components.len(), 2);
        assert_eq!(pair.color, EdgeColor::Original);
        assert_eq!(pair.ids.forward, Some(EdgeId(0)));
        assert_eq!(pair.ids.reverse, Some(EdgeId(7)));
    }

    // ============================================================================
    // Flat / hierarchical conversion
    // ============================================================================

    #[test]
    fn to_flat_emits_one_record_per_direction() {
        let mut g = path_graph(3);
        g.upsert_prediction(NodeId(1), NodeId(0), MethodCategory::Topology, "Jaccard", 0.3)
            .unwrap();
        let flat = g.to_flat();
        assert_eq!(flat.edge_count(), 3);

        let reverse = flat
            .edges
            .iter()
            .find(|e| e.source == NodeId(1) && e.target == NodeId(0))
            .unwrap();
        assert!(reverse.predicted);
        assert_eq!(reverse.prediction_score, Some(0.3));
        assert_eq!(reverse.color, EdgeColor::Mixed);

        let forward = flat
            .edges
            .iter()
            .find(|e| e.source == NodeId(0) && e.target == NodeId(1))
            .unwrap();
        assert_eq!(forward.prediction_score, None);
        assert_eq!(forward.applied_methods, None);
        assert_eq!(forward.id, Some(EdgeId(0)));
    }

    #[test]
    fn flat_round_trip_preserves_graph() {
        let mut g = path_graph(4);
        g.add_original_edge(NodeId(2), NodeId(1), Some(EdgeId(10))).unwrap();
        g.upsert_prediction(NodeId(0), NodeId(3), MethodCategory::Topology, "Jaccard", 0.1)
            .unwrap();
        g.upsert_prediction(NodeId(3), NodeId(2), MethodCategory::Classification, "GaussianNB", 0.9)
            .unwrap();

        let back = g.to_flat().to_hierarchical();
        assert_eq!(back, g);
        assert_eq!(back.to_flat(), g.to_flat());
    }

    #[test]
    fn retain_predictions_above_drops_weak_components_only() {
        let mut g = path_graph(3);
        g.upsert_prediction(NodeId(1), NodeId(0), MethodCategory::Topology, "Jaccard", 0.1)
            .unwrap();
        g.upsert_prediction(NodeId(0), NodeId(2), MethodCategory::Topology, "Jaccard", 0.9)
            .unwrap();
        g.retain_predictions_above(0.5);

        let pair = g.pair(NodeId(0), NodeId(1)).unwrap();
        assert_eq!(pair.components.len(), 1);
        assert_eq!(pair.color, EdgeColor::Original);
        assert!(g.has_edge(NodeId(0), NodeId(2)));
    }

    #[test]
    fn summary_counts_methods() {
        let mut g = path_graph(3);
        g.upsert_prediction(NodeId(1), NodeId(0), MethodCategory::EndogenousSocialTheory, "SocialExchangeTheory", 1.0)
            .unwrap();
        g.upsert_prediction(NodeId(2), NodeId(1), MethodCategory::EndogenousSocialTheory, "SocialExchangeTheory", 1.0)
            .unwrap();
        let s = g.summary();
        assert_eq!(s.node_count, 3);
        assert_eq!(s.directed_edge_count, 4);
        assert_eq!(s.undirected_edge_count, 2);
        assert_eq!(
            s.methods_applied[&MethodCategory::EndogenousSocialTheory]["SocialExchangeTheory"],
            2
        );
    }
}
