//! Store boundary of the prediction engine.
//!
//! The engine reads ground truth, predictor selections and evaluation settings
//! through [`GraphStore`], publishes progress through [`StatusSink`] and
//! resolves occupation values through [`AttributeLookup`]. Persistence itself
//! lives outside this crate; [`InMemoryStore`] implements all three traits for
//! tests and the command-line runner.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::engine::attributes::{OccupationKey, OccupationQuery, OccupationRecord};
use crate::engine::config::EvaluationConfig;
use crate::engine::errors::PredictError;
use crate::engine::factory::PredictorDescriptor;
use crate::engine::graph::HierarchicalGraph;
use crate::engine::monitor::ProgressEvent;
use crate::metrics::EvaluationResults;

/// Identifier of an analysis project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ProjectId(pub String);

/// Identifier of an original or predicted network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NetworkId(pub String);

/// Identifier of one prediction run.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of identifier a store lookup is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    OriginalNetwork,
    PredictedNetwork,
    Project,
}

impl IdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::OriginalNetwork => "original_network_id",
            IdKind::PredictedNetwork => "predicted_network_id",
            IdKind::Project => "project_id",
        }
    }
}

impl FromStr for IdKind {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original_network_id" => Ok(IdKind::OriginalNetwork),
            "predicted_network_id" => Ok(IdKind::PredictedNetwork),
            "project_id" => Ok(IdKind::Project),
            other => Err(PredictError::InvalidParameter(format!(
                "invalid identifier type '{}'",
                other
            ))),
        }
    }
}

/// A persisted progress transition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusRecord {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub event: ProgressEvent,
}

/// Graph and result persistence.
pub trait GraphStore: Send + Sync {
    fn get_ground_truth_graph(&self, project: &ProjectId) -> Result<HierarchicalGraph, PredictError>;

    /// The predicted network that receives a project's prediction.
    fn predicted_network_id(&self, project: &ProjectId) -> Result<NetworkId, PredictError>;

    /// Replaces the stored predicted graph of `network`.
    fn save_predicted_graph(&self, graph: &HierarchicalGraph, network: &NetworkId) -> Result<(), PredictError>;

    fn get_selected_predictors(&self, network: &NetworkId) -> Result<Vec<PredictorDescriptor>, PredictError>;

    fn get_evaluation_config(&self, project: &ProjectId) -> Result<EvaluationConfig, PredictError>;

    fn get_evaluation_results(&self, project: &ProjectId) -> Result<Option<EvaluationResults>, PredictError>;

    fn set_evaluation_results(&self, project: &ProjectId, results: &EvaluationResults) -> Result<(), PredictError>;
}

/// Sink for progress transitions.
pub trait StatusSink: Send + Sync {
    fn record_status(&self, run: RunId, event: &ProgressEvent, project: &ProjectId) -> Result<(), PredictError>;

    fn get_latest_status(&self, project: &ProjectId) -> Result<Option<StatusRecord>, PredictError>;
}

/// Occupational taxonomy lookup.
pub trait AttributeLookup: Send + Sync {
    /// All records matching `query`; empty when nothing matches.
    fn resolve(&self, query: &OccupationQuery) -> Result<Vec<OccupationRecord>, PredictError>;
}

#[derive(Debug, Default)]
struct ProjectEntry {
    ground_truth: HierarchicalGraph,
    predicted_network: Option<NetworkId>,
    config: EvaluationConfig,
    results: Option<EvaluationResults>,
}

#[derive(Debug, Default)]
struct StoreState {
    projects: HashMap<ProjectId, ProjectEntry>,
    predictors: HashMap<NetworkId, Vec<PredictorDescriptor>>,
    predicted: HashMap<NetworkId, HierarchicalGraph>,
    statuses: HashMap<ProjectId, Vec<StatusRecord>>,
    occupations: Vec<OccupationRecord>,
    /// Pending injected save failures: (remaining, transient).
    save_failures: Option<(u32, bool)>,
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

fn missing(what: &str, id: &dyn fmt::Display) -> PredictError {
    PredictError::MissingData(format!("{} '{}' not found", what, id))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, PredictError> {
        self.state
            .lock()
            .map_err(|_| PredictError::Internal("store lock poisoned".into()))
    }

    /// Registers a project with its ground truth, predicted network, selected
    /// predictors and evaluation settings.
    pub fn insert_project(
        &self,
        project: ProjectId,
        network: NetworkId,
        ground_truth: HierarchicalGraph,
        predictors: Vec<PredictorDescriptor>,
        config: EvaluationConfig,
    ) -> Result<(), PredictError> {
        let mut state = self.lock()?;
        state.predictors.insert(network.clone(), predictors);
        state.projects.insert(
            project,
            ProjectEntry {
                ground_truth,
                predicted_network: Some(network),
                config,
                results: None,
            },
        );
        Ok(())
    }

    pub fn add_occupation(&self, record: OccupationRecord) -> Result<(), PredictError> {
        self.lock()?.occupations.push(record);
        Ok(())
    }

    /// Makes the next `count` graph saves fail.
    pub fn fail_next_saves(&self, count: u32, transient: bool) -> Result<(), PredictError> {
        self.lock()?.save_failures = Some((count, transient));
        Ok(())
    }

    pub fn predicted_graph(&self, network: &NetworkId) -> Result<Option<HierarchicalGraph>, PredictError> {
        Ok(self.lock()?.predicted.get(network).cloned())
    }

    /// Every status recorded for `project`, oldest first.
    pub fn status_history(&self, project: &ProjectId) -> Result<Vec<StatusRecord>, PredictError> {
        Ok(self
            .lock()?
            .statuses
            .get(project)
            .cloned()
            .unwrap_or_default())
    }
}

impl GraphStore for InMemoryStore {
    fn get_ground_truth_graph(&self, project: &ProjectId) -> Result<HierarchicalGraph, PredictError> {
        let state = self.lock()?;
        state
            .projects
            .get(project)
            .map(|p| p.ground_truth.clone())
            .ok_or_else(|| missing("project", project))
    }

    fn predicted_network_id(&self, project: &ProjectId) -> Result<NetworkId, PredictError> {
        let state = self.lock()?;
        state
            .projects
            .get(project)
            .and_then(|p| p.predicted_network.clone())
            .ok_or_else(|| missing("predicted network of project", project))
    }

    fn save_predicted_graph(&self, graph: &HierarchicalGraph, network: &NetworkId) -> Result<(), PredictError> {
        let mut state = self.lock()?;
        if let Some((remaining, transient)) = state.save_failures {
            state.save_failures = (remaining > 1).then(|| (remaining - 1, transient));
            if remaining > 0 {
                return Err(PredictError::Storage {
                    message: format!("could not write predicted network '{}'", network),
                    transient,
                });
            }
        }
        state.predicted.insert(network.clone(), graph.clone());
        Ok(())
    }

    fn get_selected_predictors(&self, network: &NetworkId) -> Result<Vec<PredictorDescriptor>, PredictError> {
        let state = self.lock()?;
        state
            .predictors
            .get(network)
            .cloned()
            .ok_or_else(|| missing("network", network))
    }

    fn get_evaluation_config(&self, project: &ProjectId) -> Result<EvaluationConfig, PredictError> {
        let state = self.lock()?;
        state
            .projects
            .get(project)
            .map(|p| p.config.clone())
            .ok_or_else(|| missing("project", project))
    }

    fn get_evaluation_results(&self, project: &ProjectId) -> Result<Option<EvaluationResults>, PredictError> {
        let state = self.lock()?;
        state
            .projects
            .get(project)
            .map(|p| p.results.clone())
            .ok_or_else(|| missing("project", project))
    }

    fn set_evaluation_results(&self, project: &ProjectId, results: &EvaluationResults) -> Result<(), PredictError> {
        let mut state = self.lock()?;
        let entry = state
            .projects
            .get_mut(project)
            .ok_or_else(|| missing("project", project))?;
        entry.results = Some(results.clone());
        Ok(())
    }
}

impl StatusSink for InMemoryStore {
    fn record_status(&self, run: RunId, event: &ProgressEvent, project: &ProjectId) -> Result<(), PredictError> {
        let mut state = self.lock()?;
        state
            .statuses
            .entry(project.clone())
            .or_default()
            .push(StatusRecord {
                run_id: run,
                project_id: project.clone(),
                event: event.clone(),
            });
        Ok(())
    }

    fn get_latest_status(&self, project: &ProjectId) -> Result<Option<StatusRecord>, PredictError> {
        let state = self.lock()?;
        Ok(state
            .statuses
            .get(project)
            .and_then(|history| history.last().cloned()))
    }
}

impl AttributeLookup for InMemoryStore {
    fn resolve(&self, query: &OccupationQuery) -> Result<Vec<OccupationRecord>, PredictError> {
        let state = self.lock()?;
        let key_matches = |r: &OccupationRecord, key: &OccupationKey| match key {
            OccupationKey::JobId(id) => r.job_id == *id,
            OccupationKey::Title(title) => r.job_title == *title,
        };
        let found = match query {
            OccupationQuery::JobId(id) => state
                .occupations
                .iter()
                .filter(|r| r.job_id == *id)
                .cloned()
                .collect(),
            OccupationQuery::Title(title) => state
                .occupations
                .iter()
                .filter(|r| r.job_title == *title)
                .cloned()
                .collect(),
            OccupationQuery::Hierarchy {
                field_of_activity,
                subject_area,
                key,
            } => state
                .occupations
                .iter()
                .find(|r| {
                    r.field_of_activity == *field_of_activity
                        && r.subject_area == *subject_area
                        && key_matches(r, key)
                })
                .cloned()
                .into_iter()
                .collect(),
        };
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::monitor::TaskStatus;

    fn record(job_id: u32, title: &str, field: &str, subject: &str) -> OccupationRecord {
        OccupationRecord {
            job_id,
            job_title: title.into(),
            field_of_activity: field.into(),
            subject_area: subject.into(),
            competences: Vec::new(),
        }
    }

    #[test]
    fn id_kinds_parse_known_discriminators_only() {
        assert_eq!("project_id".parse::<IdKind>().unwrap(), IdKind::Project);
        assert_eq!(
            "predicted_network_id".parse::<IdKind>().unwrap(),
            IdKind::PredictedNetwork
        );
        assert_eq!(IdKind::OriginalNetwork.as_str(), "original_network_id");
        assert!(matches!(
            "node_id".parse::<IdKind>(),
            Err(PredictError::InvalidParameter(_))
        ));
    }

    #[test]
    fn latest_status_is_last_recorded() {
        let store = InMemoryStore::new();
        let project = ProjectId("p".into());
        assert!(store.get_latest_status(&project).unwrap().is_none());
        for status in [TaskStatus::Waiting, TaskStatus::Processing] {
            let event = ProgressEvent {
                step_index: 1,
                max_steps: 2,
                task_name: "Graph sampling".into(),
                status,
            };
            store.record_status(RunId(1), &event, &project).unwrap();
        }
        let latest = store.get_latest_status(&project).unwrap().unwrap();
        assert_eq!(latest.event.status, TaskStatus::Processing);
        assert_eq!(store.status_history(&project).unwrap().len(), 2);
    }

    #[test]
    fn unknown_project_is_missing_data() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get_ground_truth_graph(&ProjectId("nope".into())),
            Err(PredictError::MissingData(_))
        ));
    }

    #[test]
    fn occupation_queries_resolve() {
        let store = InMemoryStore::new();
        store.add_occupation(record(1, "Baker", "Food", "Bakery")).unwrap();
        store.add_occupation(record(2, "Baker", "Food", "Pastry")).unwrap();
        store.add_occupation(record(3, "Butcher", "Food", "Meat")).unwrap();

        assert_eq!(store.resolve(&OccupationQuery::JobId(3)).unwrap().len(), 1);
        assert_eq!(
            store.resolve(&OccupationQuery::Title("Baker".into())).unwrap().len(),
            2
        );
        let one = store
            .resolve(&OccupationQuery::parse("Food>Pastry>Baker").unwrap())
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].job_id, 2);
        assert!(store
            .resolve(&OccupationQuery::Title("Pilot".into()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn injected_save_failures_are_consumed() {
        let store = InMemoryStore::new();
        let network = NetworkId("n".into());
        store.fail_next_saves(2, true).unwrap();
        let graph = HierarchicalGraph::new();
        assert!(store.save_predicted_graph(&graph, &network).unwrap_err().is_transient());
        assert!(store.save_predicted_graph(&graph, &network).is_err());
        assert!(store.save_predicted_graph(&graph, &network).is_ok());
        assert!(store.predicted_graph(&network).unwrap().is_some());
    }
}
