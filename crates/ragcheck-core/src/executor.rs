//! Evaluation executor.
//!
//! Drives one task from `running` to a terminal state. At most
//! `max_concurrency` workers are spawned into a [`JoinSet`]; each pulls the
//! next item index from a shared cursor until the dataset is exhausted.
//! Workers never touch the task record: they send each finished
//! [`ResultRecord`] over a bounded mpsc channel to the aggregator, which is
//! the run future itself and the task's only writer.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ragcheck_state::{
    DatasetItemRecord, EvalStore, ItemError, ItemErrorKind, ItemId, MetricScores, ResultId,
    ResultRecord, StorageError, TaskId, TaskRecord, TaskStatus, TenantId,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn, Instrument};

use crate::config::EngineConfig;
use crate::counters::{Counter, COUNTERS};
use crate::metrics::{MetricInput, MetricSet};
use crate::obs;
use crate::runner::{Runner, RunnerError, RunnerOutput};

/// Prefix of the error summary when the run deadline cut items off.
pub const DEADLINE_SUMMARY: &str = "run cancelled: deadline exceeded";

/// Collaborators and limits for one run.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<dyn EvalStore>,
    pub runner: Arc<dyn Runner>,
    pub metrics: Arc<MetricSet>,
    pub config: EngineConfig,
}

/// Progress reported while the task is running.
///
/// Rounded half up and capped at 99: only the terminal write reports 100.
pub fn running_progress(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (processed * 100 + total / 2) / total;
    pct.min(99) as u8
}

fn worker_count(max_concurrency: usize, items: usize) -> usize {
    max_concurrency.min(items)
}

/// Run `task` over `items` until it reaches a terminal state.
///
/// Never returns an error: every failure after acceptance ends up on the
/// returned (and persisted) task's status and error summary.
pub async fn execute(
    ctx: RunContext,
    task: TaskRecord,
    items: Arc<[DatasetItemRecord]>,
) -> TaskRecord {
    let started = Instant::now();
    let deadline = ctx.config.run_deadline().map(|budget| started + budget);

    let mut running = task.clone();
    if let Err(e) = running.transition(TaskStatus::Running) {
        warn!(task_id = %task.id, error = %e, "task is not runnable");
        return task;
    }
    COUNTERS.incr(Counter::TasksStarted);
    running.total_items = items.len();
    running.progress = 0;
    if let Err(e) = persist_task(&ctx, &running).await {
        return abort(&ctx, task, &e, started).await;
    }
    let task = running;
    obs::emit_task_started(task.id.as_str(), &task.agent_id, items.len());

    let unit = Arc::new(Unit {
        tenant_id: task.tenant_id.clone(),
        task_id: task.id.clone(),
        knowledge_scope: task.knowledge_scope.clone(),
        runner: Arc::clone(&ctx.runner),
        metrics: Arc::clone(&ctx.metrics),
        item_timeout: ctx.config.item_timeout(),
        deadline,
    });
    let mut agg = Aggregator::new(&ctx, task);

    let (tx, mut rx) = mpsc::channel::<ResultRecord>(ctx.config.channel_capacity);
    let cursor = Arc::new(AtomicUsize::new(0));
    let mut workers = JoinSet::new();
    for _ in 0..worker_count(ctx.config.max_concurrency, items.len()) {
        let unit = Arc::clone(&unit);
        let items = Arc::clone(&items);
        let cursor = Arc::clone(&cursor);
        let tx = tx.clone();
        workers.spawn(
            async move {
                while let Some(item) = items.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                    let result = unit.evaluate(item).await;
                    // Closed only when the aggregator aborted the run.
                    if tx.send(result).await.is_err() {
                        break;
                    }
                }
            }
            .in_current_span(),
        );
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        if let Err(e) = agg.record(result).await {
            workers.abort_all();
            while workers.join_next().await.is_some() {}
            return abort(&ctx, agg.task, &e, started).await;
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(task_id = %agg.task.id, error = %e, "evaluation worker ended abnormally");
        }
    }

    // A worker that panicked lost the item it was holding; items no worker
    // claimed are lost too when every worker panicked.
    for item in items.iter() {
        if agg.has_seen(&item.id) {
            continue;
        }
        let error = ItemError {
            kind: ItemErrorKind::Aborted,
            message: "evaluation worker ended without reporting".to_string(),
        };
        if let Err(e) = agg.record(unit.failed_result(item, Vec::new(), error)).await {
            return abort(&ctx, agg.task, &e, started).await;
        }
    }

    agg.finish(started).await
}

/// Write the task row, retrying with linear backoff.
async fn persist_task(ctx: &RunContext, task: &TaskRecord) -> Result<(), StorageError> {
    let mut attempt = 0u32;
    loop {
        match ctx.store.upsert_task(task).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                obs::emit_task_persist_error(task.id.as_str(), attempt, &e);
                if attempt > ctx.config.task_write_retries {
                    return Err(e);
                }
                tokio::time::sleep(ctx.config.retry_backoff() * attempt).await;
            }
        }
    }
}

/// Terminal path for a run whose task row could not be written.
async fn abort(
    ctx: &RunContext,
    mut task: TaskRecord,
    err: &StorageError,
    started: Instant,
) -> TaskRecord {
    if let Err(e) = task.transition(TaskStatus::Failed) {
        warn!(task_id = %task.id, error = %e, "task already terminal");
        return task;
    }
    task.error_summary = Some(format!("task persistence failed: {err}"));

    if let Err(e) = ctx.store.upsert_task(&task).await {
        warn!(task_id = %task.id, error = %e, "final task write failed");
    }

    COUNTERS.incr(Counter::TasksFailed);
    obs::emit_task_finished(
        task.id.as_str(),
        task.status,
        task.succeeded_items,
        task.failed_items,
        started.elapsed().as_millis() as u64,
    );
    task
}

// ---------------------------------------------------------------------------
// Item units
// ---------------------------------------------------------------------------

struct Unit {
    tenant_id: TenantId,
    task_id: TaskId,
    knowledge_scope: Vec<String>,
    runner: Arc<dyn Runner>,
    metrics: Arc<MetricSet>,
    item_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl Unit {
    async fn evaluate(&self, item: &DatasetItemRecord) -> ResultRecord {
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return self.failed_result(item, Vec::new(), deadline_error());
        }

        match self.call_runner(&item.query).await {
            Ok(output) => self.scored_result(item, output),
            Err((retrieved_ids, error)) => self.failed_result(item, retrieved_ids, error),
        }
    }

    async fn call_runner(&self, query: &str) -> Result<RunnerOutput, (Vec<String>, ItemError)> {
        let call = self.runner.run(query, &self.knowledge_scope);
        let item_deadline = self.item_timeout.map(|t| Instant::now() + t);
        let limit = match (item_deadline, self.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let outcome = match limit {
            Some(at) => match timeout_at(at, call).await {
                Ok(outcome) => outcome,
                Err(_) if self.deadline.is_some_and(|d| at >= d) => {
                    return Err((Vec::new(), deadline_error()));
                }
                Err(_) => {
                    let ms = self.item_timeout.map_or(0, |t| t.as_millis());
                    return Err((
                        Vec::new(),
                        ItemError {
                            kind: ItemErrorKind::Timeout,
                            message: format!("runner call exceeded {ms}ms"),
                        },
                    ));
                }
            },
            None => call.await,
        };

        outcome.map_err(|e| {
            let error = ItemError {
                kind: e.kind(),
                message: e.to_string(),
            };
            match e {
                RunnerError::Generation { retrieved_ids, .. } => (retrieved_ids, error),
                _ => (Vec::new(), error),
            }
        })
    }

    fn scored_result(&self, item: &DatasetItemRecord, output: RunnerOutput) -> ResultRecord {
        let input = MetricInput::new(
            output.retrieved_ids.clone(),
            item.relevant_ids.clone(),
            output.generated_text.clone(),
            item.expected_answer.clone(),
        );
        let scores = self.metrics.score(&input);
        debug!(item_id = %item.id, metrics = scores.len(), "item scored");

        ResultRecord {
            id: ResultId::new(),
            tenant_id: self.tenant_id.clone(),
            task_id: self.task_id.clone(),
            item_id: item.id.clone(),
            retrieved_ids: output.retrieved_ids,
            generated_text: output.generated_text,
            scores,
            retrieval_success: true,
            generation_success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    fn failed_result(
        &self,
        item: &DatasetItemRecord,
        retrieved_ids: Vec<String>,
        error: ItemError,
    ) -> ResultRecord {
        ResultRecord {
            id: ResultId::new(),
            tenant_id: self.tenant_id.clone(),
            task_id: self.task_id.clone(),
            item_id: item.id.clone(),
            retrieval_success: error.kind == ItemErrorKind::Generation,
            retrieved_ids,
            generated_text: String::new(),
            scores: MetricScores::new(),
            generation_success: false,
            error: Some(error),
            created_at: Utc::now(),
        }
    }
}

fn deadline_error() -> ItemError {
    ItemError {
        kind: ItemErrorKind::Cancelled,
        message: "run deadline exceeded".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Sole owner of the task record while the run is live.
struct Aggregator<'a> {
    ctx: &'a RunContext,
    task: TaskRecord,
    seen: HashSet<ItemId>,
    /// metric name -> (sum, count) over successful results
    sums: BTreeMap<String, (f64, usize)>,
    cancelled: usize,
}

impl<'a> Aggregator<'a> {
    fn new(ctx: &'a RunContext, task: TaskRecord) -> Self {
        Self {
            ctx,
            task,
            seen: HashSet::new(),
            sums: BTreeMap::new(),
            cancelled: 0,
        }
    }

    fn has_seen(&self, item_id: &ItemId) -> bool {
        self.seen.contains(item_id)
    }

    /// Fold one item outcome into the task. Errors only when the task row
    /// itself cannot be written.
    async fn record(&mut self, result: ResultRecord) -> Result<(), StorageError> {
        if !self.seen.insert(result.item_id.clone()) {
            warn!(item_id = %result.item_id, "duplicate outcome ignored");
            return Ok(());
        }

        let mut failure = result.error.clone();
        if let Err(e) = self.ctx.store.insert_result(&result).await {
            failure = Some(ItemError {
                kind: ItemErrorKind::Persistence,
                message: format!("result write failed: {e}"),
            });
        }

        self.task.processed_items += 1;
        match &failure {
            None => {
                self.task.succeeded_items += 1;
                for (name, score) in &result.scores {
                    let entry = self.sums.entry(name.clone()).or_insert((0.0, 0));
                    entry.0 += score;
                    entry.1 += 1;
                }
                COUNTERS.incr(Counter::ItemsScored);
            }
            Some(error) => {
                self.task.failed_items += 1;
                if error.kind == ItemErrorKind::Cancelled {
                    self.cancelled += 1;
                }
                COUNTERS.incr(Counter::ItemsFailed);
                obs::emit_item_failed(
                    self.task.id.as_str(),
                    result.item_id.as_str(),
                    error.kind,
                    &error.message,
                );
            }
        }

        if self.task.processed_items < self.task.total_items {
            self.task.progress =
                running_progress(self.task.processed_items, self.task.total_items);
            persist_task(self.ctx, &self.task).await?;
        }
        if failure.is_none() {
            obs::emit_item_scored(
                self.task.id.as_str(),
                result.item_id.as_str(),
                self.task.progress,
            );
        }
        Ok(())
    }

    fn averages(&self) -> MetricScores {
        self.ctx
            .metrics
            .names()
            .into_iter()
            .map(|name| {
                let avg = match self.sums.get(name) {
                    Some((sum, count)) if *count > 0 => sum / *count as f64,
                    _ => 0.0,
                };
                (name.to_string(), avg)
            })
            .collect()
    }

    async fn finish(mut self, started: Instant) -> TaskRecord {
        self.task.avg_metrics = self.averages();
        let ctx = self.ctx;
        let mut done = self.task.clone();
        let status = if done.failed_items == 0 {
            done.error_summary = None;
            TaskStatus::Completed
        } else {
            let summary = format!("{} items failed", done.failed_items);
            done.error_summary = Some(if self.cancelled > 0 {
                format!("{DEADLINE_SUMMARY}; {summary}")
            } else {
                summary
            });
            TaskStatus::Failed
        };
        if let Err(e) = done.transition(status) {
            warn!(task_id = %done.id, error = %e, "task left running state early");
            return self.task;
        }

        // The stored row is still running if the terminal write fails.
        if let Err(e) = persist_task(ctx, &done).await {
            return abort(ctx, self.task, &e, started).await;
        }

        if done.status == TaskStatus::Failed {
            COUNTERS.incr(Counter::TasksFailed);
        }
        obs::emit_task_finished(
            done.id.as_str(),
            done.status,
            done.succeeded_items,
            done.failed_items,
            started.elapsed().as_millis() as u64,
        );
        done
    }
}
