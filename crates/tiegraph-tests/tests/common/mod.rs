//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tiegraph_core::engine::monitor::TaskStatus;
use tiegraph_core::{
    Backends, EvaluationConfig, HierarchicalGraph, InMemoryStore, NetworkId, NodeId, PredictionWorker,
    PredictorDescriptor, ProjectId, RetryPolicy, RunId, WorkerConfig,
};

pub const PROJECT: &str = "project";
pub const NETWORK: &str = "predicted";

/// Graph over nodes `0..n` with the given original edges.
pub fn graph(n: u32, edges: &[(u32, u32)]) -> HierarchicalGraph {
    let mut g = HierarchicalGraph::new();
    for i in 0..n {
        g.add_node(NodeId(i), HashMap::new());
    }
    for &(u, v) in edges {
        g.add_original_edge(NodeId(u), NodeId(v), None).unwrap();
    }
    g
}

/// The directed path `A → B → C → D` as nodes 0..4.
pub fn path() -> HierarchicalGraph {
    graph(4, &[(0, 1), (1, 2), (2, 3)])
}

/// Two dense communities joined by a single bridge.
pub fn communities() -> HierarchicalGraph {
    let mut edges = Vec::new();
    for block in [0u32, 6] {
        for i in 0..6 {
            for j in 0..6 {
                if i != j && (i + j) % 3 != 0 {
                    edges.push((block + i, block + j));
                }
            }
        }
    }
    edges.push((5, 6));
    graph(12, &edges)
}

pub fn project() -> ProjectId {
    ProjectId(PROJECT.into())
}

pub fn network() -> NetworkId {
    NetworkId(NETWORK.into())
}

pub fn store(
    ground_truth: HierarchicalGraph,
    predictors: Vec<PredictorDescriptor>,
    evaluation: EvaluationConfig,
) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_project(project(), network(), ground_truth, predictors, evaluation)
        .unwrap();
    store
}

/// Worker settings without retry delays.
pub fn config() -> WorkerConfig {
    WorkerConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        },
        ..WorkerConfig::default()
    }
}

pub fn worker(store: &Arc<InMemoryStore>, run: u64) -> PredictionWorker {
    PredictionWorker::new(Backends::shared(store.clone()), project(), RunId(run), config())
}

pub fn statuses(store: &InMemoryStore) -> Vec<(usize, String, TaskStatus)> {
    store
        .status_history(&project())
        .unwrap()
        .into_iter()
        .map(|r| (r.event.step_index, r.event.task_name, r.event.status))
        .collect()
}
