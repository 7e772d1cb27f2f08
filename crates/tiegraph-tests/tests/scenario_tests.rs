//! Worked scenarios on small graphs, driven through the library functions.

mod common;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tiegraph_core::engine::adjacency::Adjacency;
use tiegraph_core::engine::factory::{AttributeWeighting, Predictor};
use tiegraph_core::engine::graph::EdgeColor;
use tiegraph_core::engine::sampling::{assign_labels, find_all_missing_edges, sampling_by_percentage};
use tiegraph_core::engine::similarity::{TopologyIndex, TopologyPredictor};
use tiegraph_core::engine::triads::{triadic_enumeration, TriadType};
use tiegraph_core::{FeatureType, HierarchicalGraph, InMemoryStore, NodeId, PredictorDescriptor, PredictorFactory, PredictorParameters};

use common::{graph, path};

fn node(i: u32) -> NodeId {
    NodeId(i)
}

// ============================================================================
// Topology on the path A → B → C → D
// ============================================================================

#[test]
fn jaccard_on_full_sample_of_path() {
    let truth = path().to_flat();
    let visible = sampling_by_percentage(&truth, 1.0, &mut StdRng::seed_from_u64(1)).unwrap();
    assert_eq!(visible.edges, truth.edges);

    let pairs = find_all_missing_edges(&visible);
    assert_eq!(pairs.len(), 4 * 3 - 3);
    let scores = TopologyPredictor::new(TopologyIndex::Jaccard)
        .predict(&Adjacency::from_flat(&visible), &pairs)
        .unwrap();
    let score = |u, v| {
        let i = pairs.iter().position(|p| *p == (node(u), node(v))).unwrap();
        scores[i]
    };
    // A and C share B out of {B, D}; A and D share nothing.
    assert_eq!(score(0, 2), 0.5);
    assert_eq!(score(1, 3), 0.5);
    assert_eq!(score(0, 3), 0.0);
    assert_eq!(score(3, 0), 0.0);
    assert!(scores.iter().all(|s| s.is_finite()));
}

#[test]
fn missing_pairs_of_path_are_negatives() {
    let truth = path().to_flat();
    let dataset = assign_labels(find_all_missing_edges(&truth), &truth).unwrap();
    assert_eq!(dataset.len(), 9);
    assert_eq!(dataset.positives(), 0);
}

// ============================================================================
// Social theories
// ============================================================================

fn apply(descriptor: PredictorDescriptor, graph: &HierarchicalGraph, lookup: &InMemoryStore) -> HierarchicalGraph {
    let Predictor::SocialTheory(theory) = PredictorFactory::new(42).create(&descriptor).unwrap() else {
        panic!("{} is not a social theory", descriptor.designation);
    };
    let mut predicted = graph.clone();
    theory.predict(graph, &mut predicted, lookup).unwrap();
    predicted
}

#[test]
fn social_exchange_reciprocates_every_edge() {
    let g = path();
    let predicted = apply(
        PredictorDescriptor::new("SocialExchangeTheory", FeatureType::EndogenousSocialTheory),
        &g,
        &InMemoryStore::new(),
    );

    for (u, v) in [(1, 0), (2, 1), (3, 2)] {
        let component = predicted.component(node(u), node(v)).unwrap();
        assert!(component.predicted);
        assert!(component.applied_methods.contains_key(&tiegraph_core::MethodCategory::EndogenousSocialTheory));
    }
    for (u, v) in [(0, 1), (1, 2), (2, 3)] {
        let component = predicted.component(node(u), node(v)).unwrap();
        assert!(!component.predicted);
        assert_eq!(component.score, None);
        // Each pair now holds its original direction and a predicted reverse.
        assert_eq!(predicted.pair(node(u), node(v)).unwrap().color, EdgeColor::Mixed);
    }
    assert_eq!(predicted.edge_count(), 6);
}

#[test]
fn homophily_links_every_open_pair_of_identical_nodes() {
    let mut g = HierarchicalGraph::new();
    for i in 0..4 {
        g.add_node(node(i), HashMap::from([("gender".to_string(), "f".to_string())]));
    }
    for i in 0..3 {
        g.add_original_edge(node(i), node(i + 1), None).unwrap();
    }
    let descriptor = PredictorDescriptor::new("HomophilyTheories", FeatureType::ExogenousSocialTheory).with_parameters(
        PredictorParameters::new().with("threshold", 0.4).with(
            "attribute_weightings",
            vec![AttributeWeighting {
                attribute: "gender".into(),
                value: 1.0,
            }],
        ),
    );
    let predicted = apply(descriptor, &g, &InMemoryStore::new());

    let proposals: Vec<_> = predicted.components().filter(|c| c.predicted).collect();
    assert_eq!(proposals.len(), 9);
    assert!(proposals.iter().all(|c| c.applied_methods.contains_key(&tiegraph_core::MethodCategory::ExogenousSocialTheory)));
    for c in predicted.components().filter(|c| !c.predicted) {
        assert!(g.has_edge(c.source, c.target));
    }
}

// ============================================================================
// Triads
// ============================================================================

#[test]
fn reciprocal_triangle_is_only_type_300() {
    let g = graph(3, &[(0, 1), (1, 2), (2, 0), (0, 2), (2, 1), (1, 0)]);
    let adjacency = Adjacency::from_hierarchical(&g);
    let names: Vec<&str> = TriadType::ALL.iter().map(|t| t.name()).collect();
    let census = triadic_enumeration(&adjacency, &names).unwrap();
    for (ty, triples) in &census {
        if *ty == TriadType::T300 {
            assert_eq!(triples.len(), 1);
        } else {
            assert!(triples.is_empty(), "{} should be empty", ty);
        }
    }
}

#[test]
fn unknown_triad_name_is_rejected() {
    let adjacency = Adjacency::from_hierarchical(&path());
    assert!(triadic_enumeration(&adjacency, &["300", "999"]).is_none());
}
