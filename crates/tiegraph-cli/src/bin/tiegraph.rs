//! Tiegraph CLI - run one link prediction over a JSON project file
//!
//! Usage:
//!   tiegraph <project.json>                  # Predict and print a summary
//!   tiegraph <project.json> --validation     # Also evaluate on a held-out test graph
//!   tiegraph <project.json> -o json          # Print the predicted graph and results as JSON
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use std::collections::{BTreeMap, HashMap};
use std::process;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tiegraph_core::engine::attributes::OccupationRecord;
use tiegraph_core::engine::graph::NodeData;
use tiegraph_core::{
    spawn_prediction, Backends, EvaluationConfig, HierarchicalGraph, InMemoryStore, NetworkId, NodeId,
    PredictError, PredictionOutcome, PredictionWorker, PredictorDescriptor, ProjectId, RunId, WorkerConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Parser)]
#[command(name = "tiegraph")]
#[command(version)]
#[command(about = "Tiegraph - link prediction for directed social networks")]
#[command(
    long_about = "Sample a ground-truth network, score its missing edges with topology, social-theory \
                  and classifier predictors, and report the predicted graph with ROC/AUC per feature"
)]
struct Cli {
    /// Project file (JSON)
    #[arg(value_name = "PROJECT")]
    file: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary", value_name = "FORMAT")]
    output: OutputFormat,

    /// Evaluate on a held-out test graph
    #[arg(long)]
    validation: bool,

    /// Seed for sampling and classifiers (overrides the project file)
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Score topology predictors in parallel
    #[arg(long)]
    parallel: bool,
}

#[derive(Debug, Deserialize)]
struct EdgeEntry {
    source: NodeId,
    target: NodeId,
}

/// The project file layout.
#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(default = "default_project")]
    project: String,
    nodes: Vec<NodeData>,
    edges: Vec<EdgeEntry>,
    predictors: Vec<PredictorDescriptor>,
    #[serde(default)]
    evaluation: EvaluationConfig,
    #[serde(default)]
    occupations: Vec<OccupationRecord>,
}

fn default_project() -> String {
    "project".to_string()
}

impl ProjectFile {
    fn ground_truth(&self) -> Result<HierarchicalGraph, PredictError> {
        let mut graph = HierarchicalGraph::new();
        for node in &self.nodes {
            graph.insert_node(node.clone());
        }
        for edge in &self.edges {
            graph.add_original_edge(edge.source, edge.target, None)?;
        }
        Ok(graph)
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let source = match std::fs::read_to_string(&cli.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", cli.file, e);
            process::exit(1);
        }
    };
    let mut project: ProjectFile = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error parsing project '{}': {}", cli.file, e);
            process::exit(1);
        }
    };
    if cli.validation {
        project.evaluation.with_validation = true;
    }
    if let Some(seed) = cli.seed {
        project.evaluation.seed = seed;
    }

    let outcome = match run(project, cli.parallel) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Prediction failed: {}", e);
            process::exit(1);
        }
    };

    match cli.output {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "network": outcome.network.0,
                "graph": outcome.predicted.to_flat(),
                "summary": outcome.predicted.summary(),
                "results": outcome.results,
            });
            match serde_json::to_string_pretty(&value) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error serializing to JSON: {}", e);
                    process::exit(1);
                }
            }
        }
        OutputFormat::Summary => print_summary(&outcome),
    }
}

fn run(project: ProjectFile, parallel: bool) -> Result<PredictionOutcome, PredictError> {
    let store = Arc::new(InMemoryStore::new());
    let project_id = ProjectId(project.project.clone());
    let network = NetworkId(format!("{}-predicted", project.project));
    let ground_truth = project.ground_truth()?;
    for record in project.occupations {
        store.add_occupation(record)?;
    }
    store.insert_project(
        project_id.clone(),
        network,
        ground_truth,
        project.predictors,
        project.evaluation,
    )?;

    let config = WorkerConfig {
        parallel_topology: parallel,
        ..WorkerConfig::default()
    };
    let worker = PredictionWorker::new(Backends::shared(store), project_id, RunId(1), config);
    spawn_prediction(worker)?.join()
}

fn print_summary(outcome: &PredictionOutcome) {
    let summary = outcome.predicted.summary();
    println!("✓ Prediction run {} finished\n", outcome.run_id);
    println!(
        "Predicted graph '{}': {} nodes, {} directed edges, {} pairs",
        outcome.network, summary.node_count, summary.directed_edge_count, summary.undirected_edge_count
    );

    let mut colors: HashMap<String, usize> = HashMap::new();
    for pair in outcome.predicted.pairs() {
        *colors.entry(format!("{:?}", pair.color)).or_default() += 1;
    }
    let colors: BTreeMap<_, _> = colors.into_iter().collect();
    for (color, count) in &colors {
        println!("  {}: {}", color, count);
    }

    if !summary.methods_applied.is_empty() {
        println!("\nMethods applied:");
        for (category, methods) in &summary.methods_applied {
            for (method, count) in methods {
                println!("  [{}] {}: {}", category, method, count);
            }
        }
    }

    let mut sections = vec![("Train", &outcome.results.train_results)];
    if let Some(test) = &outcome.results.test_results {
        sections.push(("Test", test));
    }
    for (name, results) in sections {
        println!("\n{} AUC ({}):", name, results.len());
        for (feature, metrics) in results {
            match metrics.auc {
                Some(auc) => println!("  {} = {:.6}", feature, auc),
                None => println!("  {} = n/a (single class)", feature),
            }
        }
    }
}
