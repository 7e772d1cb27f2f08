//! The prediction pipeline.
//!
//! A [`PredictionWorker`] runs one prediction for one project: it samples the
//! ground truth, scores the candidate pairs with every selected predictor,
//! trains the classifiers, promotes confident pairs into the predicted graph,
//! evaluates every feature column and finally persists the graph and the
//! results. Each stage reports through a [`ProgressMonitor`]; the first failing
//! stage marks the whole run `Failed` and nothing is persisted.
//!
//! Status writes and the final persistence share one lock with
//! [`RunHandle::cancel`], so once a cancellation has been recorded the run can
//! neither report progress nor write its graph or results.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::adjacency::Adjacency;
use super::classification::{Classifier, ClassifierModel};
use super::config::{EvaluationConfig, RetryPolicy, WorkerConfig};
use super::dataset::{Dataset, FeatureMatrix};
use super::errors::PredictError;
use super::factory::{AttributePredictor, Predictor, PredictorDescriptor, PredictorFactory};
use super::graph::{FlatGraph, HierarchicalGraph, MethodCategory};
use super::monitor::{ProgressEvent, ProgressMonitor, TaskStatus, RUN_TASK};
use super::sampling::{assign_labels, balance_classes, find_all_missing_edges, sampling_by_percentage};
use super::similarity::TopologyPredictor;
use super::social_theory::{social_theory_features, SocialTheoryPredictor};
use crate::metrics::{evaluate_dataset, EvaluationResults};
use crate::storage::{AttributeLookup, GraphStore, NetworkId, ProjectId, RunId, StatusSink};

/// Feature columns that are kept for evaluation but not fed to classifiers.
const UNTRAINED_FEATURE: &str = "BalanceTheory";

/// The external collaborators of a run.
#[derive(Clone)]
pub struct Backends {
    pub graphs: Arc<dyn GraphStore>,
    pub status: Arc<dyn StatusSink>,
    pub lookup: Arc<dyn AttributeLookup>,
}

impl Backends {
    /// All three roles served by one store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: GraphStore + StatusSink + AttributeLookup + 'static,
    {
        Self {
            graphs: store.clone(),
            status: store.clone(),
            lookup: store,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// What a successful run produced and persisted.
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub run_id: RunId,
    pub network: NetworkId,
    pub predicted: HierarchicalGraph,
    pub results: EvaluationResults,
}

#[derive(Debug, Default)]
struct RunControl {
    cancelled: bool,
    concluded: bool,
    step: usize,
    max_steps: usize,
}

/// Status publication of one run, serialised with cancellation.
struct RunChannel {
    run_id: RunId,
    project: ProjectId,
    status: Arc<dyn StatusSink>,
    retry: RetryPolicy,
    control: Mutex<RunControl>,
}

impl RunChannel {
    fn lock(&self) -> Result<MutexGuard<'_, RunControl>, PredictError> {
        self.control
            .lock()
            .map_err(|_| PredictError::Internal("run control lock poisoned".into()))
    }

    fn record(&self, control: &mut RunControl, event: &ProgressEvent) -> Result<(), PredictError> {
        self.retry.run("record_status", || {
            self.status.record_status(self.run_id, event, &self.project)
        })?;
        control.step = event.step_index;
        control.max_steps = event.max_steps;
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), PredictError> {
        if self.lock()?.cancelled {
            return Err(PredictError::Cancelled);
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.lock().map(|c| c.cancelled).unwrap_or(false)
    }

    fn publish(&self, event: ProgressEvent) -> Result<(), PredictError> {
        let mut control = self.lock()?;
        if control.cancelled {
            return Err(PredictError::Cancelled);
        }
        self.record(&mut control, &event)
    }

    /// Runs `persist` and records `events` unless the run was cancelled; the
    /// run is concluded afterwards.
    fn commit<F>(&self, persist: F, events: &[ProgressEvent]) -> Result<(), PredictError>
    where
        F: FnOnce() -> Result<(), PredictError>,
    {
        let mut control = self.lock()?;
        if control.cancelled {
            return Err(PredictError::Cancelled);
        }
        persist()?;
        for event in events {
            self.record(&mut control, event)?;
        }
        control.concluded = true;
        Ok(())
    }

    /// Records a terminal event; skipped once the run is cancelled or concluded.
    fn conclude(&self, event: &ProgressEvent) -> Result<(), PredictError> {
        let mut control = self.lock()?;
        if control.cancelled || control.concluded {
            return Ok(());
        }
        control.concluded = true;
        self.record(&mut control, event)
    }

    fn cancel(&self) -> Result<bool, PredictError> {
        let mut control = self.lock()?;
        if control.cancelled || control.concluded {
            return Ok(false);
        }
        control.cancelled = true;
        let event = ProgressEvent {
            step_index: control.step.max(1),
            max_steps: control.max_steps,
            task_name: RUN_TASK.to_string(),
            status: TaskStatus::Failed,
        };
        self.record(&mut control, &event)?;
        Ok(true)
    }
}

/// A per-pair feature predictor.
#[derive(Debug)]
enum FeaturePredictor {
    Topology(TopologyPredictor),
    Attribute(AttributePredictor),
}

impl FeaturePredictor {
    fn designation(&self) -> &'static str {
        match self {
            FeaturePredictor::Topology(p) => p.designation(),
            FeaturePredictor::Attribute(p) => p.designation(),
        }
    }

    fn scores(&self, split: &Split) -> Result<Vec<f64>, PredictError> {
        match self {
            FeaturePredictor::Topology(p) => p.predict(&split.adjacency, split.dataset.pairs()),
            FeaturePredictor::Attribute(p) => p.predict(&split.graph, split.dataset.pairs()),
        }
    }
}

/// Everything a run needs from the store, resolved before the first stage.
#[derive(Debug)]
struct RunPlan {
    network: NetworkId,
    evaluation: EvaluationConfig,
    descriptors: Vec<PredictorDescriptor>,
    features: Vec<FeaturePredictor>,
    theories: Vec<SocialTheoryPredictor>,
    classifiers: Vec<ClassifierModel>,
    ground_truth: HierarchicalGraph,
}

/// One evaluated graph: its visible edges, its labelled candidate pairs and
/// the predicted graph growing from it.
struct Split {
    name: &'static str,
    graph: HierarchicalGraph,
    adjacency: Adjacency,
    predicted: HierarchicalGraph,
    dataset: Dataset,
    matrix: FeatureMatrix,
}

impl Split {
    /// Candidates are the non-edges of `visible`, labelled against `truth`.
    fn new(name: &'static str, visible: &FlatGraph, truth: &FlatGraph) -> Result<Self, PredictError> {
        let dataset = assign_labels(find_all_missing_edges(visible), truth)?;
        let graph = visible.to_hierarchical();
        tracing::debug!(
            split = name,
            candidates = dataset.len(),
            positives = dataset.positives(),
            "candidate pairs labelled"
        );
        Ok(Self {
            name,
            adjacency: Adjacency::from_flat(visible),
            predicted: graph.clone(),
            graph,
            dataset,
            matrix: FeatureMatrix::default(),
        })
    }

    /// Promotes pairs scoring above the highest negative score of `name`.
    fn promote_topology(&mut self, name: &str) -> Result<usize, PredictError> {
        let Some(column) = self.dataset.column(name) else {
            return Ok(0);
        };
        let threshold = column
            .values
            .iter()
            .zip(self.dataset.labels())
            .filter(|(_, label)| **label == 0)
            .map(|(v, _)| *v)
            .reduce(f64::max);
        let Some(threshold) = threshold else {
            return Ok(0);
        };
        let mut promoted = 0;
        for (&(u, v), &score) in self.dataset.pairs().iter().zip(&column.values) {
            if score > threshold {
                self.predicted
                    .upsert_prediction(u, v, MethodCategory::Topology, name, score)?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Promotes pairs whose probability under classifier `name` reaches `min_probability`.
    fn promote_classifier(&mut self, name: &str, min_probability: f64) -> Result<usize, PredictError> {
        let Some(column) = self.dataset.column(name) else {
            return Ok(0);
        };
        let mut promoted = 0;
        for (&(u, v), &p) in self.dataset.pairs().iter().zip(&column.values) {
            if p >= min_probability {
                self.predicted
                    .upsert_prediction(u, v, MethodCategory::Classification, name, p)?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }
}

/// Runs predictions for one project.
pub struct PredictionWorker {
    backends: Backends,
    project: ProjectId,
    run_id: RunId,
    config: WorkerConfig,
    channel: Arc<RunChannel>,
}

impl fmt::Debug for PredictionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionWorker")
            .field("project", &self.project)
            .field("run_id", &self.run_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PredictionWorker {
    pub fn new(backends: Backends, project: ProjectId, run_id: RunId, config: WorkerConfig) -> Self {
        let channel = Arc::new(RunChannel {
            run_id,
            project: project.clone(),
            status: backends.status.clone(),
            retry: config.retry.clone(),
            control: Mutex::new(RunControl::default()),
        });
        Self {
            backends,
            project,
            run_id,
            config,
            channel,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Records `Failed` and stops the run at its next stage boundary. Returns
    /// `false` when the run had already concluded or been cancelled.
    ///
    /// The stage in progress is not interrupted: it runs to completion on the
    /// worker thread before the run unwinds, but its results are discarded and
    /// nothing is persisted.
    pub fn cancel(&self) -> Result<bool, PredictError> {
        self.channel.cancel()
    }

    fn retry<T, F>(&self, what: &str, op: F) -> Result<T, PredictError>
    where
        F: FnMut() -> Result<T, PredictError>,
    {
        self.config.retry.run(what, op)
    }

    /// Runs the whole pipeline. Failures are recorded as a `Failed` status and
    /// returned as `PipelineFailure`; a cancelled run returns `Cancelled`.
    #[tracing::instrument(skip(self), fields(run_id = %self.run_id, project = %self.project))]
    pub fn run(&self) -> Result<PredictionOutcome, PredictError> {
        let plan = match self.load() {
            Ok(plan) => plan,
            Err(err) => {
                let mut monitor = ProgressMonitor::for_predictors(&[]);
                return Err(self.fail(&mut monitor, err.in_stage("Load project")));
            }
        };
        let mut monitor = ProgressMonitor::for_predictors(&plan.descriptors);
        match self.execute(plan, &mut monitor) {
            Ok(outcome) => {
                let summary = outcome.predicted.summary();
                tracing::info!(
                    nodes = summary.node_count,
                    edges = summary.directed_edge_count,
                    pairs = summary.undirected_edge_count,
                    features = outcome.results.train_results.len(),
                    "prediction run finished"
                );
                Ok(outcome)
            }
            Err(err) => Err(self.fail(&mut monitor, err)),
        }
    }

    fn fail(&self, monitor: &mut ProgressMonitor, err: PredictError) -> PredictError {
        if matches!(err, PredictError::Cancelled) || self.channel.is_cancelled() {
            tracing::warn!(step = monitor.step(), "prediction run cancelled");
            return PredictError::Cancelled;
        }
        let stage = match &err {
            PredictError::PipelineFailure { stage, .. } => stage.clone(),
            _ => monitor.current_task().unwrap_or(RUN_TASK).to_string(),
        };
        tracing::error!(stage = %stage, step = monitor.step(), error = %err, "prediction run failed");
        let event = monitor.failed();
        if let Err(status_err) = self.channel.conclude(&event) {
            tracing::error!(error = %status_err, "could not record failed run status");
        }
        err.in_stage(&stage)
    }

    fn load(&self) -> Result<RunPlan, PredictError> {
        let evaluation = self.retry("get_evaluation_config", || {
            self.backends.graphs.get_evaluation_config(&self.project)
        })?;
        evaluation.validate()?;
        let network = self.retry("predicted_network_id", || {
            self.backends.graphs.predicted_network_id(&self.project)
        })?;
        let descriptors = self.retry("get_selected_predictors", || {
            self.backends.graphs.get_selected_predictors(&network)
        })?;
        let ground_truth = self.retry("get_ground_truth_graph", || {
            self.backends.graphs.get_ground_truth_graph(&self.project)
        })?;

        let factory = PredictorFactory {
            seed: evaluation.seed,
            parallel: self.config.parallel_topology,
        };
        let mut features = Vec::new();
        let mut theories = Vec::new();
        let mut classifiers = Vec::new();
        for descriptor in &descriptors {
            match factory.create(descriptor)? {
                Predictor::Topology(p) => features.push(FeaturePredictor::Topology(p)),
                Predictor::Attribute(p) => features.push(FeaturePredictor::Attribute(p)),
                Predictor::SocialTheory(p) => theories.push(p),
                Predictor::Classifier(c) => classifiers.push(c),
            }
        }
        tracing::info!(
            network = %network,
            nodes = ground_truth.node_count(),
            edges = ground_truth.edge_count(),
            predictors = descriptors.len(),
            validation = evaluation.with_validation,
            "prediction run loaded"
        );
        Ok(RunPlan {
            network,
            evaluation,
            descriptors,
            features,
            theories,
            classifiers,
            ground_truth,
        })
    }

    fn begin(&self, monitor: &mut ProgressMonitor) -> Result<(), PredictError> {
        let event = monitor.begin()?;
        tracing::info!(step = event.step_index, max_steps = event.max_steps, stage = %event.task_name, "stage started");
        self.channel.publish(event)
    }

    fn complete(&self, monitor: &mut ProgressMonitor) -> Result<(), PredictError> {
        let event = monitor.complete()?;
        tracing::debug!(step = event.step_index, stage = %event.task_name, "stage finished");
        self.channel.publish(event)
    }

    fn execute(&self, plan: RunPlan, monitor: &mut ProgressMonitor) -> Result<PredictionOutcome, PredictError> {
        let RunPlan {
            network,
            evaluation,
            features,
            theories,
            mut classifiers,
            ground_truth,
            ..
        } = plan;
        self.channel.publish(monitor.pending())?;
        let mut rng = StdRng::seed_from_u64(evaluation.seed);

        // Sampling: train is nested inside test when validating.
        self.begin(monitor)?;
        let truth = ground_truth.to_flat();
        let (train_graph, test_graph) = if evaluation.with_validation {
            let test = sampling_by_percentage(&truth, evaluation.test_ratio, &mut rng)?;
            let train = sampling_by_percentage(&test, evaluation.train_ratio, &mut rng)?;
            (train, Some(test))
        } else {
            (sampling_by_percentage(&truth, evaluation.train_ratio, &mut rng)?, None)
        };
        tracing::debug!(
            train_edges = train_graph.edge_count(),
            test_edges = test_graph.as_ref().map(FlatGraph::edge_count),
            "graphs sampled"
        );
        self.complete(monitor)?;

        self.begin(monitor)?;
        let mut splits = match &test_graph {
            Some(test) => vec![
                Split::new("train", &train_graph, test)?,
                Split::new("test", test, &truth)?,
            ],
            None => vec![Split::new("train", &train_graph, &truth)?],
        };
        self.complete(monitor)?;

        for predictor in &features {
            self.begin(monitor)?;
            for split in splits.iter_mut() {
                self.channel.checkpoint()?;
                let scores = predictor.scores(split)?;
                split.dataset.push_column(predictor.designation(), scores)?;
            }
            self.complete(monitor)?;
        }

        for theory in &theories {
            self.begin(monitor)?;
            for split in splits.iter_mut() {
                self.channel.checkpoint()?;
                let proposals = theory.predict(&split.graph, &mut split.predicted, self.backends.lookup.as_ref())?;
                tracing::debug!(predictor = theory.designation(), split = split.name, proposals, "social theory applied");
            }
            self.complete(monitor)?;
        }
        for split in splits.iter_mut() {
            for column in social_theory_features(&split.predicted, split.dataset.pairs()) {
                split.dataset.push_column(&column.name, column.values)?;
            }
        }

        // Classifiers see every feature computed so far except balance theory.
        let trainable = |name: &str| !name.contains(UNTRAINED_FEATURE);
        for split in splits.iter_mut() {
            split.matrix = split.dataset.feature_matrix(trainable);
        }
        let (train_rows, train_labels) = if evaluation.balances_training() {
            let balanced = balance_classes(&splits[0].dataset, &mut rng);
            tracing::debug!(rows = balanced.len(), positives = balanced.positives(), "training rows balanced");
            (balanced.feature_matrix(trainable).rows, balanced.labels().to_vec())
        } else {
            (splits[0].matrix.rows.clone(), splits[0].dataset.labels().to_vec())
        };
        for classifier in classifiers.iter_mut() {
            self.begin(monitor)?;
            classifier.fit(&train_rows, &train_labels)?;
            self.complete(monitor)?;
        }
        for classifier in &classifiers {
            self.begin(monitor)?;
            for split in splits.iter_mut() {
                self.channel.checkpoint()?;
                let probabilities = classifier.predict_proba(&split.matrix.rows)?;
                split.dataset.push_column(classifier.designation(), probabilities)?;
            }
            self.complete(monitor)?;
        }

        // The last split is the one evaluated: test under validation, else train.
        self.begin(monitor)?;
        let evaluated = splits
            .last_mut()
            .ok_or_else(|| PredictError::Internal("no evaluated split".into()))?;
        for predictor in &features {
            if let FeaturePredictor::Topology(p) = predictor {
                let promoted = evaluated.promote_topology(p.designation())?;
                tracing::debug!(predictor = p.designation(), promoted, "topology promotions");
            }
        }
        for classifier in &classifiers {
            let promoted = evaluated.promote_classifier(classifier.designation(), self.config.promotion_probability)?;
            tracing::debug!(predictor = classifier.designation(), promoted, "classifier promotions");
        }
        self.complete(monitor)?;

        self.begin(monitor)?;
        let train_results = evaluate_dataset(&splits[0].dataset)?;
        let test_results = if evaluation.with_validation {
            Some(evaluate_dataset(&splits[splits.len() - 1].dataset)?)
        } else {
            None
        };
        let results = EvaluationResults::new(train_results, test_results);
        let previous = self.retry("get_evaluation_results", || {
            self.backends.graphs.get_evaluation_results(&self.project)
        })?;
        if previous.is_some() {
            tracing::debug!("replacing previous evaluation results");
        }
        let predicted = splits
            .pop()
            .map(|split| split.predicted)
            .ok_or_else(|| PredictError::Internal("no evaluated split".into()))?;

        let stage_done = monitor.complete()?;
        let run_done = monitor.finished();
        self.channel
            .commit(
                || {
                    self.retry("save_predicted_graph", || {
                        self.backends.graphs.save_predicted_graph(&predicted, &network)
                    })?;
                    self.retry("set_evaluation_results", || {
                        self.backends.graphs.set_evaluation_results(&self.project, &results)
                    })
                },
                &[stage_done, run_done],
            )
            .map_err(|err| err.in_stage("Create evaluation results"))?;

        Ok(PredictionOutcome {
            run_id: self.run_id,
            network,
            predicted,
            results,
        })
    }
}

/// A prediction running on its own thread.
pub struct RunHandle {
    run_id: RunId,
    channel: Arc<RunChannel>,
    thread: JoinHandle<Result<PredictionOutcome, PredictError>>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Records `Failed` right away; the run writes nothing afterwards.
    ///
    /// The worker thread keeps computing until the current stage ends, so
    /// [`join`](Self::join) may block for up to one stage after cancelling.
    pub fn cancel(&self) -> Result<bool, PredictError> {
        self.channel.cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<PredictionOutcome, PredictError> {
        self.thread
            .join()
            .map_err(|_| PredictError::Internal(format!("prediction run {} panicked", self.run_id)))?
    }
}

/// Starts `worker` on a dedicated thread.
pub fn spawn_prediction(worker: PredictionWorker) -> Result<RunHandle, PredictError> {
    let run_id = worker.run_id;
    let channel = worker.channel.clone();
    let thread = thread::Builder::new()
        .name(format!("prediction-{}", run_id))
        .spawn(move || worker.run())
        .map_err(|e| PredictError::Internal(format!("could not start prediction run: {}", e)))?;
    Ok(RunHandle {
        run_id,
        channel,
        thread,
    })
}
