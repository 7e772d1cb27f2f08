//! Error types for link prediction.

use thiserror::Error;

use crate::engine::graph::NodeId;

/// Errors that can occur while building graphs, running predictors, or
/// driving a prediction run.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// without breaking callers.
///
/// All public APIs return `Result<T, PredictError>`; library code never panics
/// on bad input. Division by zero inside topology formulas is *not* an error
/// and yields a score of 0.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PredictError {
    /// A caller-supplied parameter is invalid (unknown designation or category,
    /// ratio outside `[0, 1]`, unsupported shortest-path method, ...).
    /// Never retried.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An expected node, edge, attribute, or record lookup returned nothing.
    #[error("missing data: {0}")]
    MissingData(String),

    /// No path exists between the endpoints of a shortest-path query.
    #[error("no path between {from} and {to}")]
    NoPath { from: NodeId, to: NodeId },

    /// Numerical failure (non-converging iteration, non-finite value).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// The external store rejected or failed a call.
    #[error("storage error: {message}")]
    Storage { message: String, transient: bool },

    /// The run was cancelled through its [`RunHandle`](crate::engine::worker::RunHandle).
    #[error("prediction run cancelled")]
    Cancelled,

    /// A pipeline stage failed; the whole run is marked `Failed`.
    #[error("stage '{stage}' failed: {source}")]
    PipelineFailure {
        stage: String,
        #[source]
        source: Box<PredictError>,
    },

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PredictError {
    /// Wraps `self` as the failure of `stage`. Already-wrapped errors are kept as-is.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            err @ PredictError::PipelineFailure { .. } => err,
            err @ PredictError::Cancelled => err,
            other => PredictError::PipelineFailure {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Whether a store call failing with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PredictError::Storage {
                transient: true,
                ..
            }
        )
    }

    pub(crate) fn missing_node(node: NodeId) -> Self {
        PredictError::MissingData(format!("node {} is not part of the graph", node))
    }
}
