//! Run configuration: evaluation settings, worker knobs and the retry policy
//! applied to store calls.

use std::thread;
use std::time::Duration;

use super::errors::PredictError;

/// How a project's ground truth is split for training and evaluation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EvaluationConfig {
    /// Also build a held-out test set from a nested sample.
    pub with_validation: bool,
    /// Balance classifier training rows (only with validation).
    pub preprocessing: bool,
    /// Fraction of edges kept in the training graph.
    pub train_ratio: f64,
    /// Fraction of edges kept in the test graph.
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            with_validation: false,
            preprocessing: false,
            train_ratio: 0.8,
            test_ratio: 0.9,
            seed: 42,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), PredictError> {
        for (name, ratio) in [("train_ratio", self.train_ratio), ("test_ratio", self.test_ratio)] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(PredictError::InvalidParameter(format!(
                    "{} must be within [0, 1], got {}",
                    name, ratio
                )));
            }
        }
        Ok(())
    }

    /// Whether classifier training rows are class-balanced.
    pub fn balances_training(&self) -> bool {
        self.with_validation && self.preprocessing
    }
}

/// Retry policy for store calls. Only transient errors are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Runs `op`, retrying transient failures.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, PredictError>
    where
        F: FnMut() -> Result<T, PredictError>,
    {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts.max(1) => {
                    tracing::warn!(
                        operation = what,
                        attempt,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Worker knobs that are not part of a project's stored configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub retry: RetryPolicy,
    /// Classifier probability at or above which a pair is promoted.
    pub promotion_probability: f64,
    /// Score topology predictors over pairs in parallel (`parallel` feature).
    pub parallel_topology: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            promotion_probability: 0.5,
            parallel_topology: cfg!(feature = "parallel"),
        }
    }
}
