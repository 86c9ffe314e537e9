//! ragcheck - evaluation engine CLI
//!
//! Scores retrieval and generation quality offline.
//!
//! ## Commands
//!
//! - `score`: Score one answer (and optionally one retrieval) with every metric
//! - `run`: Evaluate a dataset file against recorded agent outputs

mod recorded;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{info, Level};

use ragcheck_core::{
    EngineConfig, EvaluationService, MetricInput, MetricSet, NewDataset, RunTarget,
    RunnerRegistry, COUNTERS,
};
use ragcheck_state::{MemoryEvalStore, TaskStatus, TenantId};

use crate::recorded::RecordedRunner;

/// Tenant used for offline runs.
const LOCAL_TENANT: &str = "local";

#[derive(Parser)]
#[command(name = "ragcheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluation engine for retrieval-augmented agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one generated answer with every metric and print the scores as JSON
    Score {
        /// Generated answer text
        #[arg(long)]
        generated: String,

        /// Expected (reference) answer text
        #[arg(long)]
        expected: String,

        /// Retrieved document ids in rank order (comma separated)
        #[arg(long, value_delimiter = ',')]
        retrieved: Vec<String>,

        /// Relevant document ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        relevant: Vec<String>,

        /// Highest BLEU n-gram order
        #[arg(long, default_value_t = 4)]
        bleu_order: usize,
    },

    /// Evaluate a dataset file against recorded agent outputs
    Run {
        /// Dataset JSON: {"name", "description", "items": [{"query", "relevant_ids", "expected_answer"}]}
        #[arg(short, long)]
        dataset: PathBuf,

        /// Recorded outputs JSON keyed by query
        #[arg(long)]
        outputs: PathBuf,

        /// Engine config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum concurrent runner calls
        #[arg(long, env = "RAGCHECK_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Per-item runner timeout in milliseconds
        #[arg(long, env = "RAGCHECK_ITEM_TIMEOUT_MS")]
        item_timeout_ms: Option<u64>,

        /// Whole-run deadline in milliseconds
        #[arg(long, env = "RAGCHECK_DEADLINE_MS")]
        deadline_ms: Option<u64>,

        /// Agent id recorded on the task
        #[arg(long, default_value = "recorded")]
        agent: String,

        /// Knowledge bases to scope retrieval to (comma separated)
        #[arg(long, value_delimiter = ',')]
        scope: Vec<String>,

        /// Write dataset, task and per-item results to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ragcheck_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Score {
            generated,
            expected,
            retrieved,
            relevant,
            bleu_order,
        } => cmd_score(generated, expected, retrieved, relevant, bleu_order),
        Commands::Run {
            dataset,
            outputs,
            config,
            concurrency,
            item_timeout_ms,
            deadline_ms,
            agent,
            scope,
            output,
        } => {
            let mut engine = match config.as_deref() {
                Some(path) => EngineConfig::load(path)
                    .with_context(|| format!("Failed to load engine config: {:?}", path))?,
                None => EngineConfig::default(),
            };
            if let Some(n) = concurrency {
                engine = engine.with_max_concurrency(n);
            }
            if item_timeout_ms.is_some() {
                engine.item_timeout_ms = item_timeout_ms;
            }
            if deadline_ms.is_some() {
                engine.run_deadline_ms = deadline_ms;
            }
            let target = RunTarget::agent(agent).with_knowledge_scope(scope);
            cmd_run(&dataset, &outputs, engine, target, output.as_deref()).await
        }
    }
}

/// Score a single answer
fn cmd_score(
    generated: String,
    expected: String,
    retrieved: Vec<String>,
    relevant: Vec<String>,
    bleu_order: usize,
) -> Result<()> {
    let input = MetricInput::new(retrieved, relevant, generated, expected);
    let scores = MetricSet::standard(bleu_order).score(&input);
    println!("{}", serde_json::to_string_pretty(&scores)?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what}: {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("{what} is not valid JSON: {:?}", path))
}

/// Evaluate a dataset against recorded outputs using the in-memory store
async fn cmd_run(
    dataset_path: &Path,
    outputs_path: &Path,
    config: EngineConfig,
    target: RunTarget,
    output: Option<&Path>,
) -> Result<()> {
    let new_dataset: NewDataset = read_json(dataset_path, "dataset")?;
    let runner = RecordedRunner::load(outputs_path)?;
    info!(queries = runner.len(), "loaded recorded outputs");

    let registry = RunnerRegistry::fixed();
    registry
        .insert(target.agent_id.clone(), Arc::new(runner))
        .await;
    let service = EvaluationService::new(
        Arc::new(MemoryEvalStore::new()),
        Arc::new(registry),
        config,
    )
    .context("Invalid engine configuration")?;

    let tenant = TenantId::new(LOCAL_TENANT);
    let dataset = service
        .create_dataset(&tenant, new_dataset)
        .await
        .context("Dataset rejected")?;
    let task = service
        .run_evaluation(&tenant, &dataset.id, target)
        .await
        .context("Failed to start evaluation")?;
    let task = service.wait_for_task(&tenant, &task.id).await?;

    if let Some(path) = output {
        let positions: HashMap<_, _> = service
            .get_dataset_items(&tenant, &dataset.id)
            .await?
            .into_iter()
            .map(|item| (item.id, item.position))
            .collect();
        let mut results = service.get_task_results(&tenant, &task.id).await?;
        results.sort_by_key(|r| positions.get(&r.item_id).copied().unwrap_or(usize::MAX));

        let artifact = serde_json::json!({
            "dataset": dataset,
            "task": task,
            "results": results,
            "counters": COUNTERS.snapshot(),
        });
        std::fs::write(path, serde_json::to_string_pretty(&artifact)?)
            .with_context(|| format!("Failed to write results to {:?}", path))?;
        info!(path = ?path, results = results.len(), "results written");
    }

    println!("{}", serde_json::to_string_pretty(&task)?);
    COUNTERS.flush();

    if task.status == TaskStatus::Failed {
        anyhow::bail!(
            "Evaluation failed: {}",
            task.error_summary.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
