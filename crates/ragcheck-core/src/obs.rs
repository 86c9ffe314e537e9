//! Structured observability hooks for evaluation task lifecycle events.
//!
//! This module provides:
//! - A task-scoped tracing span to instrument the detached run future with
//! - Emission functions for key lifecycle events: start, item scored/failed, finish
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `json = true` to [`init_tracing`](crate::init_tracing).

use ragcheck_state::{ItemErrorKind, TaskStatus};
use tracing::{info, warn};

/// Span tagged with the task id. Attach it with `Instrument::instrument` so
/// every event of the run carries `task_id`.
pub fn task_span(task_id: &str) -> tracing::Span {
    tracing::info_span!("ragcheck.task", task_id = %task_id)
}

/// Emit event: task started running.
pub fn emit_task_started(task_id: &str, agent_id: &str, total_items: usize) {
    info!(
        event = "task.started",
        task_id = %task_id,
        agent_id = %agent_id,
        total_items = total_items,
    );
}

/// Emit event: one item scored.
pub fn emit_item_scored(task_id: &str, item_id: &str, progress: u8) {
    info!(
        event = "item.scored",
        task_id = %task_id,
        item_id = %item_id,
        progress = progress,
    );
}

/// Emit event: one item failed (warning level).
pub fn emit_item_failed(task_id: &str, item_id: &str, kind: ItemErrorKind, error: &str) {
    warn!(
        event = "item.failed",
        task_id = %task_id,
        item_id = %item_id,
        kind = ?kind,
        error = %error,
    );
}

/// Emit event: task reached a terminal state.
pub fn emit_task_finished(
    task_id: &str,
    status: TaskStatus,
    succeeded: usize,
    failed: usize,
    duration_ms: u64,
) {
    info!(
        event = "task.finished",
        task_id = %task_id,
        status = %status,
        succeeded = succeeded,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: the task row could not be written (warning level).
pub fn emit_task_persist_error(task_id: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "task.persist_error",
        task_id = %task_id,
        attempt = attempt,
        error = %error,
    );
}
