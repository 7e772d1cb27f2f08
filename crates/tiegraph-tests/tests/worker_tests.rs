//! Prediction runs end to end through the in-memory store.

mod common;

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use tiegraph_core::engine::attributes::OccupationRecord;
use tiegraph_core::engine::factory::{AttributeWeighting, PredictorParameters};
use tiegraph_core::engine::monitor::{task_names, TaskStatus, RUN_TASK};
use tiegraph_core::metrics::EvaluationResults;
use tiegraph_core::storage::{GraphStore, StatusSink};
use tiegraph_core::{
    spawn_prediction, Backends, EvaluationConfig, FeatureType, HierarchicalGraph, InMemoryStore,
    MethodCategory, NetworkId, NodeId, PredictError, PredictionWorker, PredictorDescriptor, ProjectId, RunId,
};

use common::{communities, config, graph, network, project, statuses, store, worker};

fn mixed_predictors() -> Vec<PredictorDescriptor> {
    vec![
        PredictorDescriptor::new("CommonNeighbors", FeatureType::Topology),
        PredictorDescriptor::new("Jaccard", FeatureType::Topology),
        PredictorDescriptor::new("SocialExchangeTheory", FeatureType::EndogenousSocialTheory),
        PredictorDescriptor::new("BalanceTheory", FeatureType::EndogenousSocialTheory),
        PredictorDescriptor::new("DecisionTree", FeatureType::Classifier)
            .with_parameters(PredictorParameters::new().with("max_depth", 4.0)),
        PredictorDescriptor::new("LogisticRegression", FeatureType::Classifier),
    ]
}

fn validation(seed: u64) -> EvaluationConfig {
    EvaluationConfig {
        with_validation: true,
        preprocessing: true,
        train_ratio: 0.8,
        test_ratio: 0.9,
        seed,
    }
}

// ============================================================================
// Successful runs
// ============================================================================

#[test]
fn validation_run_reports_every_task_in_order() {
    let predictors = mixed_predictors();
    let store = store(communities(), predictors.clone(), validation(3));
    worker(&store, 1).run().unwrap();

    let history = statuses(&store);
    assert_eq!(history.first().unwrap().2, TaskStatus::Waiting);
    assert_eq!(history.last().unwrap().1, RUN_TASK);
    assert_eq!(history.last().unwrap().2, TaskStatus::Finished);

    let stages: Vec<(String, TaskStatus)> = history[1..history.len() - 1]
        .iter()
        .map(|(_, name, status)| (name.clone(), *status))
        .collect();
    let expected: Vec<(String, TaskStatus)> = task_names(&predictors)
        .into_iter()
        .flat_map(|t| [(t.clone(), TaskStatus::Processing), (t, TaskStatus::Finished)])
        .collect();
    assert_eq!(stages, expected);
    assert!(history.windows(2).all(|w| w[0].0 <= w[1].0), "steps never go back");
}

#[test]
fn validation_run_persists_graph_and_both_result_sets() {
    let truth = communities();
    let store = store(truth.clone(), mixed_predictors(), validation(3));
    let outcome = worker(&store, 1).run().unwrap();

    let saved = store.predicted_graph(&network()).unwrap().unwrap();
    assert_eq!(saved, outcome.predicted);
    let results = store.get_evaluation_results(&project()).unwrap().unwrap();
    assert_eq!(results, outcome.results);

    let test = results.test_results.as_ref().unwrap();
    for name in ["CommonNeighbors", "Jaccard", "DecisionTree", "LogisticRegression"] {
        assert!(results.train_results.contains_key(name), "train lacks {}", name);
        assert!(test.contains_key(name), "test lacks {}", name);
    }
    for metrics in results.train_results.values().chain(test.values()) {
        assert_eq!(metrics.roc.fpr.len(), metrics.roc.tpr.len());
        if let Some(auc) = metrics.auc {
            assert!((0.0..=1.0).contains(&auc));
        }
    }

    for component in saved.components() {
        if component.predicted {
            assert!(!component.applied_methods.is_empty());
        } else {
            assert!(truth.has_edge(component.source, component.target));
        }
        if component.applied_methods.contains_key(&MethodCategory::Classification) {
            assert!(component.score.unwrap() >= 0.5);
        }
    }
}

#[test]
fn same_seed_gives_same_prediction() {
    let run = |seed| {
        let store = store(communities(), mixed_predictors(), validation(seed));
        worker(&store, 1).run().unwrap()
    };
    let (a, b) = (run(11), run(11));
    assert_eq!(a.predicted, b.predicted);
    assert_eq!(a.results.train_results, b.results.train_results);
    assert_eq!(a.results.test_results, b.results.test_results);
}

#[test]
fn occupations_drive_homophily() {
    let mut truth = HierarchicalGraph::new();
    for (i, job) in ["1001", "1001", "2002", "2002", "3003"].iter().enumerate() {
        truth.add_node(
            NodeId(i as u32),
            HashMap::from([("occupation".to_string(), job.to_string())]),
        );
    }
    for (u, v) in [(0, 2), (2, 4), (4, 1), (1, 3)] {
        truth.add_original_edge(NodeId(u), NodeId(v), None).unwrap();
    }
    let homophily = PredictorDescriptor::new("HomophilyTheories", FeatureType::ExogenousSocialTheory).with_parameters(
        PredictorParameters::new().with("threshold", 0.9).with(
            "attribute_weightings",
            vec![AttributeWeighting {
                attribute: "occupation".into(),
                value: 1.0,
            }],
        ),
    );
    let store = store(
        truth,
        vec![homophily],
        EvaluationConfig {
            train_ratio: 1.0,
            ..EvaluationConfig::default()
        },
    );
    for (job_id, field, subject) in [
        (1001, "Finance", "Controlling"),
        (2002, "Technology", "Software"),
        (3003, "Technology", "Media"),
    ] {
        store
            .add_occupation(OccupationRecord {
                job_id,
                job_title: String::new(),
                field_of_activity: field.into(),
                subject_area: subject.into(),
                competences: Vec::new(),
            })
            .unwrap();
    }

    let outcome = worker(&store, 1).run().unwrap();
    let mut proposed: Vec<(u32, u32)> = outcome
        .predicted
        .components()
        .filter(|c| c.predicted)
        .map(|c| (c.source.0, c.target.0))
        .collect();
    proposed.sort_unstable();
    assert_eq!(proposed, vec![(0, 1), (1, 0), (2, 3), (3, 2)]);
    assert!(outcome.results.train_results.contains_key("HomophilyTheories"));
}

// ============================================================================
// Failures
// ============================================================================

fn assert_failed_at(store: &InMemoryStore, err: &PredictError, task: &str) {
    match err {
        PredictError::PipelineFailure { stage, .. } => assert_eq!(stage, task),
        other => panic!("expected a pipeline failure, got {:?}", other),
    }
    let history = statuses(store);
    assert_eq!(history.last().unwrap().1, RUN_TASK);
    assert_eq!(history.last().unwrap().2, TaskStatus::Failed);
    assert!(history.iter().any(|(_, name, s)| name == task && *s == TaskStatus::Processing));
    assert!(!history.iter().any(|(_, name, s)| name == task && *s == TaskStatus::Finished));
    assert!(store.predicted_graph(&network()).unwrap().is_none());
    assert!(store.get_evaluation_results(&project()).unwrap().is_none());
}

#[test]
fn unreachable_pair_fails_shortest_path_stage() {
    // Node 3 is isolated.
    let store = store(
        graph(4, &[(0, 1), (1, 2)]),
        vec![PredictorDescriptor::new("ShortestPath", FeatureType::Topology)],
        EvaluationConfig {
            train_ratio: 1.0,
            ..EvaluationConfig::default()
        },
    );
    let err = worker(&store, 1).run().unwrap_err();
    assert_failed_at(&store, &err, "Calculate ShortestPath");
}

#[test]
fn unknown_occupation_fails_social_theory_stage() {
    let mut truth = graph(0, &[]);
    for i in 0..3 {
        truth.add_node(NodeId(i), HashMap::from([("occupation".to_string(), "9999".to_string())]));
    }
    truth.add_original_edge(NodeId(0), NodeId(1), None).unwrap();
    let store = store(
        truth,
        vec![PredictorDescriptor::new("HomophilyTheories", FeatureType::ExogenousSocialTheory)],
        EvaluationConfig::default(),
    );
    let err = worker(&store, 1).run().unwrap_err();
    assert_failed_at(&store, &err, "Calculate HomophilyTheories");
}

#[test]
fn missing_project_fails_while_loading() {
    let store = Arc::new(InMemoryStore::new());
    let err = worker(&store, 1).run().unwrap_err();
    assert!(matches!(
        &err,
        PredictError::PipelineFailure { stage, source } if stage == "Load project"
            && matches!(**source, PredictError::MissingData(_))
    ));
    assert_eq!(statuses(&store).last().unwrap().2, TaskStatus::Failed);
}

#[test]
fn invalid_ratio_is_rejected_before_any_stage() {
    let store = store(
        communities(),
        mixed_predictors(),
        EvaluationConfig {
            train_ratio: 1.5,
            ..EvaluationConfig::default()
        },
    );
    let err = worker(&store, 1).run().unwrap_err();
    assert!(matches!(
        &err,
        PredictError::PipelineFailure { source, .. } if matches!(**source, PredictError::InvalidParameter(_))
    ));
    let history = statuses(&store);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].2, TaskStatus::Failed);
}

#[test]
fn transient_save_failures_are_retried_on_spawned_run() {
    let store = store(communities(), mixed_predictors(), validation(5));
    store.fail_next_saves(2, true).unwrap();
    let outcome = spawn_prediction(worker(&store, 7)).unwrap().join().unwrap();
    assert_eq!(outcome.run_id, RunId(7));
    assert!(store.predicted_graph(&network()).unwrap().is_some());
    let latest = store.get_latest_status(&project()).unwrap().unwrap();
    assert_eq!(latest.run_id, RunId(7));
    assert_eq!(latest.event.status, TaskStatus::Finished);
}

// ============================================================================
// Cancellation
// ============================================================================

/// A store whose ground-truth read parks until the test releases it.
struct GatedStore {
    inner: Arc<InMemoryStore>,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GraphStore for GatedStore {
    fn get_ground_truth_graph(&self, project: &ProjectId) -> Result<HierarchicalGraph, PredictError> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        self.inner.get_ground_truth_graph(project)
    }

    fn predicted_network_id(&self, project: &ProjectId) -> Result<NetworkId, PredictError> {
        self.inner.predicted_network_id(project)
    }

    fn save_predicted_graph(&self, graph: &HierarchicalGraph, network: &NetworkId) -> Result<(), PredictError> {
        self.inner.save_predicted_graph(graph, network)
    }

    fn get_selected_predictors(&self, network: &NetworkId) -> Result<Vec<PredictorDescriptor>, PredictError> {
        self.inner.get_selected_predictors(network)
    }

    fn get_evaluation_config(&self, project: &ProjectId) -> Result<EvaluationConfig, PredictError> {
        self.inner.get_evaluation_config(project)
    }

    fn get_evaluation_results(&self, project: &ProjectId) -> Result<Option<EvaluationResults>, PredictError> {
        self.inner.get_evaluation_results(project)
    }

    fn set_evaluation_results(&self, project: &ProjectId, results: &EvaluationResults) -> Result<(), PredictError> {
        self.inner.set_evaluation_results(project, results)
    }
}

#[test]
fn cancelled_run_records_failed_and_writes_nothing() {
    let inner = store(communities(), mixed_predictors(), validation(3));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gated = Arc::new(GatedStore {
        inner: inner.clone(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let backends = Backends {
        graphs: gated,
        status: inner.clone(),
        lookup: inner.clone(),
    };
    let handle = spawn_prediction(PredictionWorker::new(backends, project(), RunId(9), config())).unwrap();

    entered_rx.recv().unwrap();
    assert!(handle.cancel().unwrap());
    assert!(!handle.cancel().unwrap(), "second cancel is a no-op");
    release_tx.send(()).unwrap();

    assert!(matches!(handle.join(), Err(PredictError::Cancelled)));
    let history = statuses(&inner);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].2, TaskStatus::Failed);
    assert!(inner.predicted_graph(&network()).unwrap().is_none());
    assert!(inner.get_evaluation_results(&project()).unwrap().is_none());
}

#[test]
fn cancel_after_finish_changes_nothing() {
    let store = store(communities(), mixed_predictors(), validation(3));
    let worker = worker(&store, 1);
    worker.run().unwrap();
    assert!(!worker.cancel().unwrap());
    assert_eq!(statuses(&store).last().unwrap().2, TaskStatus::Finished);
}
