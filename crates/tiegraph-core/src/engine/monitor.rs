//! Progress tracking for a prediction run.
//!
//! [`ProgressMonitor`] is a pure state machine over the run's ordered task
//! list. Each transition returns the [`ProgressEvent`] to publish; the worker
//! forwards events to its status sink, so the monitor itself never does I/O.
//!
//! Step indices are 1-based and only move forward: a task advances the step
//! when it reports `Finished`.

use std::fmt;
use std::str::FromStr;

use super::errors::PredictError;
use super::factory::{FeatureType, PredictorDescriptor};

/// Task name used for run-level transitions.
pub const RUN_TASK: &str = "Prediction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskStatus {
    Waiting,
    Processing,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "Waiting",
            TaskStatus::Processing => "Processing",
            TaskStatus::Finished => "Finished",
            TaskStatus::Failed => "Failed",
        }
    }

    /// Whether no further transition follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Waiting" => Ok(TaskStatus::Waiting),
            "Processing" => Ok(TaskStatus::Processing),
            "Finished" => Ok(TaskStatus::Finished),
            "Failed" => Ok(TaskStatus::Failed),
            other => Err(PredictError::InvalidParameter(format!(
                "invalid task status '{}', must be one of Waiting, Processing, Finished, Failed",
                other
            ))),
        }
    }
}

/// One published progress transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressEvent {
    pub step_index: usize,
    pub max_steps: usize,
    pub task_name: String,
    pub status: TaskStatus,
}

/// Ordered task names of a run over the selected predictors.
///
/// Sampling and missing-edge enumeration come first, followed by one task per
/// topology or attribute predictor, one per social-theory predictor, one training and one
/// prediction task per classifier, then graph assembly and evaluation.
pub fn task_names(predictors: &[PredictorDescriptor]) -> Vec<String> {
    let mut tasks = vec!["Graph sampling".to_string(), "Get missing edges".to_string()];
    let of = |ty: fn(&FeatureType) -> bool| {
        predictors
            .iter()
            .filter(move |p| ty(&p.feature_type))
            .map(|p| p.designation.as_str())
    };
    tasks.extend(
        of(|t| matches!(t, FeatureType::Topology | FeatureType::Others))
            .map(|d| format!("Calculate {}", d)),
    );
    tasks.extend(of(FeatureType::is_social_theory).map(|d| format!("Calculate {}", d)));
    tasks.extend(of(|t| *t == FeatureType::Classifier).map(|d| format!("Train {}", d)));
    tasks.extend(of(|t| *t == FeatureType::Classifier).map(|d| format!("Predict {}", d)));
    tasks.push("Create predicted graph".to_string());
    tasks.push("Create evaluation results".to_string());
    tasks
}

/// Finite-state progress tracker of a single run.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    tasks: Vec<String>,
    step: usize,
    terminal: Option<TaskStatus>,
}

impl ProgressMonitor {
    pub fn new(tasks: Vec<String>) -> Self {
        Self {
            tasks,
            step: 1,
            terminal: None,
        }
    }

    pub fn for_predictors(predictors: &[PredictorDescriptor]) -> Self {
        Self::new(task_names(predictors))
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn max_steps(&self) -> usize {
        self.tasks.len()
    }

    pub fn current_task(&self) -> Option<&str> {
        self.tasks.get(self.step - 1).map(String::as_str)
    }

    /// Terminal run status, once reached.
    pub fn outcome(&self) -> Option<TaskStatus> {
        self.terminal
    }

    fn event(&self, task_name: &str, status: TaskStatus) -> ProgressEvent {
        ProgressEvent {
            step_index: self.step,
            max_steps: self.tasks.len(),
            task_name: task_name.to_string(),
            status,
        }
    }

    /// Run accepted and queued.
    pub fn pending(&self) -> ProgressEvent {
        self.event(RUN_TASK, TaskStatus::Waiting)
    }

    /// Reports `status` for the current task; `Finished` moves to the next one.
    pub fn notify(&mut self, status: TaskStatus) -> Result<ProgressEvent, PredictError> {
        if let Some(outcome) = self.terminal {
            return Err(PredictError::Internal(format!(
                "progress reported after the run already {}",
                outcome
            )));
        }
        let Some(name) = self.current_task() else {
            return Err(PredictError::Internal(format!(
                "progress reported past the last of {} tasks",
                self.tasks.len()
            )));
        };
        let event = self.event(name, status);
        if status == TaskStatus::Finished {
            self.step += 1;
        }
        Ok(event)
    }

    pub fn begin(&mut self) -> Result<ProgressEvent, PredictError> {
        self.notify(TaskStatus::Processing)
    }

    pub fn complete(&mut self) -> Result<ProgressEvent, PredictError> {
        self.notify(TaskStatus::Finished)
    }

    /// The whole run finished.
    pub fn finished(&mut self) -> ProgressEvent {
        self.terminal = Some(TaskStatus::Finished);
        self.event(RUN_TASK, TaskStatus::Finished)
    }

    /// The whole run failed at the current step.
    pub fn failed(&mut self) -> ProgressEvent {
        self.terminal = Some(TaskStatus::Failed);
        self.event(RUN_TASK, TaskStatus::Failed)
    }
}
