//! # Logging subscriber.
//!
//! [`LogWriter`] forwards execution events to `tracing`, mapping alerts to
//! `warn!` and everything else to `info!`/`debug!`. Useful as-is for most
//! deployments; implement a custom [`Subscribe`] to page an on-call rotation
//! or bridge into an external alerting system.
//!
//! ## Output format
//! ```text
//! [phase] uuid=b7c1 phase=InterBroker
//! [submitted] uuid=b7c1 count=12
//! [dead] uuid=b7c1 id=42 detail="target leader is down"
//! [alert] uuid=b7c1 detail="Slow tasks are detected: ..."
//! [finished] uuid=b7c1
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Subscriber that writes every event to the `tracing` log.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let uuid = e.uuid.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ProposingStarted => {
                tracing::info!(uuid, "[proposing] reserved for proposal generation");
            }
            EventKind::ProposingAbandoned => {
                tracing::info!(uuid, "[proposing-abandoned]");
            }
            EventKind::ExecutionStarting => {
                tracing::info!(uuid, detail = ?e.detail, "[starting] execution starts");
            }
            EventKind::PhaseEntered => {
                tracing::info!(uuid, phase = ?e.phase, "[phase]");
            }
            EventKind::TasksSubmitted => {
                tracing::info!(uuid, count = ?e.count, "[submitted]");
            }
            EventKind::TaskCompleted => {
                tracing::debug!(uuid, id = ?e.execution_id, partition = ?e.partition, "[completed]");
            }
            EventKind::TaskAborted => {
                tracing::info!(uuid, id = ?e.execution_id, partition = ?e.partition, "[aborted]");
            }
            EventKind::TaskDead => {
                tracing::warn!(uuid, id = ?e.execution_id, detail = ?e.detail, "[dead]");
            }
            EventKind::SlowTasksDetected => {
                tracing::warn!(uuid, count = ?e.count, "[slow-tasks]");
            }
            EventKind::RollbackSubmitted => {
                tracing::warn!(uuid, count = ?e.count, "[rollback]");
            }
            EventKind::TasksResubmitted => {
                tracing::info!(uuid, count = ?e.count, "[resubmitted]");
            }
            EventKind::ExecutionFinished => {
                tracing::info!(uuid, detail = ?e.detail, "[finished]");
            }
            EventKind::ExecutionStopped => {
                tracing::warn!(uuid, detail = ?e.detail, "[stopped]");
            }
            EventKind::ExecutionInterrupted => {
                tracing::error!(uuid, detail = ?e.detail, "[interrupted]");
            }
            EventKind::Notification => {
                tracing::info!(uuid, detail = ?e.detail, "[notification]");
            }
            EventKind::Alert => {
                tracing::warn!(uuid, detail = ?e.detail, "[alert]");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(detail = ?e.detail, "[subscriber-issue]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
