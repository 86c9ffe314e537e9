//! ragcheck Core Library
//!
//! Evaluation engine for retrieval-augmented agents: the metric library, the
//! runner contract, the bounded single-writer executor and the service that
//! exposes dataset and task operations.

pub mod config;
pub mod counters;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod runner;
pub mod service;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig};
pub use error::{EvalError, Result};
pub use executor::{execute, running_progress, RunContext};
pub use metrics::{
    Bleu, Metric, MetricError, MetricInput, MetricSet, Mrr, Precision, Recall, RougeL, RougeN, F1,
};
pub use registry::RunnerRegistry;
pub use runner::{RunTarget, Runner, RunnerError, RunnerFactory, RunnerOutput};
pub use service::{EvaluationService, NewDataset, NewDatasetItem};

pub use counters::{Counter, CounterSnapshot, Counters, COUNTERS};
pub use obs::{
    emit_item_failed, emit_item_scored, emit_task_finished, emit_task_persist_error,
    emit_task_started, task_span,
};
pub use telemetry::init_tracing;

pub use ragcheck_state;

/// ragcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
