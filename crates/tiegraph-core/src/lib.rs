//! # Tiegraph Core
//!
//! Link prediction for directed social networks.
//!
//! A prediction run samples a ground-truth graph, scores every missing edge with
//! topology indices, social theories, node attributes and trained classifiers,
//! promotes confident candidates into a provenance-tracked predicted graph and
//! evaluates each feature with ROC/AUC.

pub mod engine;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use engine::config::{EvaluationConfig, RetryPolicy, WorkerConfig};
pub use engine::errors::PredictError;
pub use engine::factory::{FeatureType, PredictorDescriptor, PredictorFactory, PredictorParameters};
pub use engine::graph::{FlatGraph, HierarchicalGraph, MethodCategory, NodeId};
pub use engine::monitor::{ProgressEvent, TaskStatus};
pub use engine::worker::{spawn_prediction, Backends, PredictionOutcome, PredictionWorker, RunHandle};
pub use metrics::EvaluationResults;
pub use storage::{InMemoryStore, NetworkId, ProjectId, RunId};
