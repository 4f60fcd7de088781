//! # ExecutionWorker: drives one admitted batch to termination.
//!
//! Exactly one worker exists per admitted batch. It owns the task tracker,
//! walks the three phases in order, and unconditionally cleans up on the way
//! out, whether the batch finished, was stopped, or died on an error.
//!
//! ## Rules
//! - Phase order is strict: inter-broker moves, then intra-broker moves, then
//!   leadership transfers. A phase begins only after the previous one has
//!   zero in-flight tasks.
//! - A graceful stop skips the phases not yet entered; within the
//!   inter-broker phase it kills and rolls back in-flight work, within the
//!   intra-broker and leadership phases work keeps draining to completion.
//! - A forced stop kills everything and, after the phases, evicts in-flight
//!   reassignments from the cluster via the coordination store.
//! - Cleanup (tracker, session flags, `NoTask` status, sampling mode) runs on
//!   every exit path, followed by exactly one terminal notification.

use std::sync::Arc;

use tokio::sync::watch;

use crate::cluster::{
    ClusterClients, DirMoveRequest, LoadMonitor, ReassignmentRequest, SamplingMode,
    SubmissionReceipt, UserTaskManager,
};
use crate::config::ExecutorConfig;
use crate::controller::Session;
use crate::events::{Bus, Event, EventKind};
use crate::history::BrokerHistory;
use crate::metrics::ExecutorMetrics;
use crate::snapshot::{ExecutorStatus, Phase, StopSignal};
use crate::tasks::{MoveTask, Proposal, TaskType};
use crate::time::Clock;
use crate::tracker::{ConcurrencyCaps, TaskTracker};

pub(crate) struct ExecutionWorker {
    pub(crate) cfg: ExecutorConfig,
    pub(crate) clients: ClusterClients,
    pub(crate) monitor: Arc<dyn LoadMonitor>,
    pub(crate) session: Arc<Session>,
    pub(crate) caps: Arc<ConcurrencyCaps>,
    pub(crate) tracker: TaskTracker,
    pub(crate) history: Arc<BrokerHistory>,
    pub(crate) metrics: Arc<ExecutorMetrics>,
    pub(crate) bus: Bus,
    pub(crate) status_tx: watch::Sender<Arc<ExecutorStatus>>,
    pub(crate) user_tasks: Option<Arc<dyn UserTaskManager>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) uuid: String,
    pub(crate) triggered_by_user: bool,
    pub(crate) phase: Phase,
    pub(crate) last_slow_report_ms: i64,
    pub(crate) last_receipt: Option<Box<dyn SubmissionReceipt>>,
    pub(crate) execution_error: Option<String>,
}

impl ExecutionWorker {
    /// Runs the batch to termination. Consumes the worker.
    pub async fn run(mut self) {
        tracing::info!(uuid = %self.uuid, "starting executing rebalance proposals");
        self.init_execution();
        let outcome = self.drive_phases().await;
        if let Err(err) = outcome {
            tracing::error!(uuid = %self.uuid, error = ?err, "executor got exception during execution");
            self.execution_error = Some(format!("{err:#}"));
        }
        self.notify_finished();
        self.clear_completed_execution();
        tracing::info!(uuid = %self.uuid, "execution finished");
    }

    fn init_execution(&mut self) {
        if self.triggered_by_user {
            if let Some(user_tasks) = &self.user_tasks {
                user_tasks.mark_began(&self.uuid);
            }
        }
        let reason = self.session.reason().unwrap_or_default();
        tracing::info!(uuid = %self.uuid, reason = %reason, "task execution starts");
        self.bus.publish(
            Event::now(EventKind::ExecutionStarting)
                .with_uuid(&self.uuid)
                .with_detail(reason),
        );
        self.enter_phase(Phase::Starting);
    }

    async fn drive_phases(&mut self) -> anyhow::Result<()> {
        // Narrow sampling before moving anything, so partition metrics are
        // not polluted by the movements themselves.
        self.adjust_sampling_mode_before_execution().await;

        self.enter_phase(Phase::InterBroker);
        self.inter_broker_move_replicas().await;
        self.update_ongoing_state();

        if self.session.stop_signal() == StopSignal::None {
            self.enter_phase(Phase::IntraBroker);
            self.intra_broker_move_replicas().await;
            self.update_ongoing_state();
        }

        if self.session.stop_signal() == StopSignal::None {
            self.enter_phase(Phase::Leader);
            self.move_leaderships().await;
            self.update_ongoing_state();
        }

        if self.session.stop_signal() == StopSignal::Forced {
            tracing::warn!(
                uuid = %self.uuid,
                "force-stop: deleting reassignment markers to make the cluster controller abandon in-flight work"
            );
            self.clients.coordination.delete_reassignment_markers().await?;
        }
        Ok(())
    }

    /// Pause sampling, narrow it to broker metrics, resume. The monitor may
    /// refuse to pause while mid-transition; retry at the progress cadence.
    async fn adjust_sampling_mode_before_execution(&self) {
        while self.monitor.sampling_mode() != SamplingMode::BrokerMetricsOnly {
            match self
                .monitor
                .pause_sampling("paused-before-starting-execution", true)
            {
                Ok(()) => {
                    self.monitor.set_sampling_mode(SamplingMode::BrokerMetricsOnly);
                    break;
                }
                Err(err) => {
                    tracing::debug!(error = ?err, "waiting for the load monitor before adjusting sampling mode");
                    tokio::time::sleep(self.session.progress_interval()).await;
                }
            }
        }
        self.monitor
            .resume_sampling("resumed-before-starting-execution");
    }

    // ---------------------------
    // Phase 1: inter-broker moves
    // ---------------------------

    async fn inter_broker_move_replicas(&mut self) {
        let task_type = TaskType::InterBrokerReplica;
        let total = self.tracker.remaining(task_type);
        let total_mb = self.tracker.remaining_data_mb(task_type);
        tracing::info!(movements = total, mb = total_mb, "starting inter-broker partition movements");

        while (self.tracker.remaining(task_type) > 0
            || self.tracker.in_execution_count(task_type) > 0)
            && self.session.stop_signal() == StopSignal::None
        {
            let batch = self.tracker.next_inter_broker_batch();
            tracing::info!(count = batch.len(), "executor will submit inter-broker task(s)");
            if !batch.is_empty() {
                let proposals = proposals_of(&batch);
                if let Err(err) = self.clients.throttle.set_throttles(&proposals).await {
                    tracing::warn!(error = ?err, "failed to set replication throttles");
                }
                self.submit_inter_broker(&batch).await;
            }
            let completed = self.wait_for_progress().await;
            self.log_replica_progress(task_type, total, total_mb);
            self.clear_throttles(&completed).await;
        }

        // Drain what is still in flight. On a stop the poll cycle marks
        // in-flight inter-broker tasks dead, so this converges either way.
        loop {
            let in_flight = self.tracker.in_execution_tasks(Some(&[task_type]));
            if in_flight.is_empty() {
                break;
            }
            tracing::info!(
                tasks = in_flight.len(),
                mb = self.tracker.in_execution_data_mb(task_type),
                "waiting for in-flight inter-broker tasks to finish"
            );
            let completed = self.wait_for_progress().await;
            self.clear_throttles(&completed).await;
        }

        if self.session.stop_signal() == StopSignal::None {
            tracing::info!("inter-broker partition movements finished");
        } else {
            self.log_stop_summary(task_type);
        }
    }

    async fn submit_inter_broker(&mut self, batch: &[MoveTask]) {
        let requests: Vec<ReassignmentRequest> = batch
            .iter()
            .map(|t| ReassignmentRequest {
                partition: t.proposal().partition().clone(),
                target_replicas: t.proposal().new_brokers(),
            })
            .collect();
        match self
            .clients
            .admin
            .submit_replica_reassignments(&requests)
            .await
        {
            Ok(receipt) => {
                self.last_receipt = Some(receipt);
                self.bus.publish(
                    Event::now(EventKind::TasksSubmitted)
                        .with_uuid(&self.uuid)
                        .with_count(batch.len() as u64),
                );
            }
            Err(err) => {
                // Tasks stay in-flight; the dropped-task pass re-submits them.
                tracing::warn!(error = ?err, "failed to submit replica reassignments");
            }
        }
    }

    async fn clear_throttles(&self, completed: &[MoveTask]) {
        let completed: Vec<Arc<Proposal>> = completed
            .iter()
            .filter(|t| t.task_type() == TaskType::InterBrokerReplica)
            .map(|t| Arc::clone(t.proposal()))
            .collect();
        if completed.is_empty() {
            return;
        }
        let still_in_progress = proposals_of(
            &self
                .tracker
                .in_execution_tasks(Some(&[TaskType::InterBrokerReplica])),
        );
        if let Err(err) = self
            .clients
            .throttle
            .clear_throttles(&completed, &still_in_progress)
            .await
        {
            tracing::warn!(error = ?err, "failed to clear replication throttles");
        }
    }

    // ---------------------------
    // Phase 2: intra-broker moves
    // ---------------------------

    async fn intra_broker_move_replicas(&mut self) {
        let task_type = TaskType::IntraBrokerReplica;
        let total = self.tracker.remaining(task_type);
        let total_mb = self.tracker.remaining_data_mb(task_type);
        tracing::info!(movements = total, mb = total_mb, "starting intra-broker partition movements");

        while (self.tracker.remaining(task_type) > 0
            || self.tracker.in_execution_count(task_type) > 0)
            && self.session.stop_signal() != StopSignal::Forced
        {
            let batch = self.tracker.next_intra_broker_batch();
            tracing::info!(count = batch.len(), "executor will submit intra-broker task(s)");
            if !batch.is_empty() {
                self.submit_intra_broker(&batch).await;
            }
            self.wait_for_progress().await;
            self.log_replica_progress(task_type, total, total_mb);
        }

        while !self
            .tracker
            .in_execution_tasks(Some(&[task_type]))
            .is_empty()
        {
            tracing::info!(
                mb = self.tracker.in_execution_data_mb(task_type),
                "waiting for in-flight intra-broker tasks to finish"
            );
            self.wait_for_progress().await;
        }

        if self.session.stop_signal() == StopSignal::None {
            tracing::info!("intra-broker partition movements finished");
        } else {
            self.log_stop_summary(task_type);
        }
    }

    async fn submit_intra_broker(&mut self, batch: &[MoveTask]) {
        let moves = dir_move_requests(batch);
        match self.clients.admin.alter_replica_dirs(&moves).await {
            Ok(()) => {
                self.bus.publish(
                    Event::now(EventKind::TasksSubmitted)
                        .with_uuid(&self.uuid)
                        .with_count(batch.len() as u64),
                );
            }
            Err(err) => {
                tracing::warn!(error = ?err, "failed to submit intra-broker directory moves");
            }
        }
    }

    // ---------------------------
    // Phase 3: leadership transfers
    // ---------------------------

    async fn move_leaderships(&mut self) {
        let task_type = TaskType::Leader;
        let total = self.tracker.remaining(task_type);
        tracing::info!(movements = total, "starting leadership movements");

        let mut finished = 0usize;
        while self.tracker.remaining(task_type) > 0
            && self.session.stop_signal() != StopSignal::Forced
        {
            self.update_ongoing_state();
            finished += self.move_leadership_batch().await;
            if total > 0 {
                tracing::info!(
                    finished,
                    total,
                    pct = finished * 100 / total,
                    "leadership movements completed"
                );
            }
        }

        while !self
            .tracker
            .in_execution_tasks(Some(&[task_type]))
            .is_empty()
        {
            self.wait_for_progress().await;
        }

        if self.session.stop_signal() == StopSignal::None {
            tracing::info!("leadership movements finished");
        } else {
            self.log_stop_summary(task_type);
        }
    }

    async fn move_leadership_batch(&mut self) -> usize {
        // A foreign preferred-leader election blocks ours; wait it out.
        loop {
            match self
                .clients
                .coordination
                .ongoing_preferred_leader_elections()
                .await
            {
                Ok(ongoing) if ongoing.is_empty() => break,
                Ok(_) => {
                    tracing::error!(
                        "waiting for the pending preferred-leader election to clear; \
                         is another admin tool triggering elections?"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "failed to check ongoing preferred-leader elections");
                }
            }
            tokio::time::sleep(self.session.progress_interval()).await;
            if self.session.stop_signal() == StopSignal::Forced {
                return 0;
            }
        }

        let batch = self.tracker.next_leader_batch();
        if batch.is_empty() {
            return 0;
        }
        let partitions: Vec<_> = batch
            .iter()
            .map(|t| t.proposal().partition().clone())
            .collect();
        tracing::debug!(count = batch.len(), "executing leadership movements in a batch");
        match self
            .clients
            .coordination
            .trigger_preferred_leader_election(&partitions)
            .await
        {
            Ok(()) => {
                self.bus.publish(
                    Event::now(EventKind::TasksSubmitted)
                        .with_uuid(&self.uuid)
                        .with_count(batch.len() as u64),
                );
            }
            Err(err) => {
                tracing::warn!(error = ?err, "failed to trigger preferred-leader election");
            }
        }

        while !self.tracker.in_execution_tasks(None).is_empty()
            && self.session.stop_signal() != StopSignal::Forced
        {
            self.wait_for_progress().await;
        }
        batch.len()
    }

    // ---------------------------
    // Status & notifications
    // ---------------------------

    pub(super) fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.bus.publish(
            Event::now(EventKind::PhaseEntered)
                .with_uuid(&self.uuid)
                .with_phase(phase),
        );
        self.update_ongoing_state();
    }

    /// Re-publishes the status snapshot; any pending stop signal shows the
    /// phase as `Stopping`.
    pub(super) fn update_ongoing_state(&self) {
        let phase = if self.session.stop_signal() == StopSignal::None {
            self.phase
        } else {
            Phase::Stopping
        };
        let status = ExecutorStatus {
            phase,
            uuid: Some(self.uuid.clone()),
            reason: self.session.reason(),
            triggered_by_user: self.triggered_by_user,
            inter_broker_cap: self.caps.inter_broker(),
            intra_broker_cap: self.caps.intra_broker(),
            leader_cap: self.caps.leader(),
            inter_broker: self.tracker.counts(TaskType::InterBrokerReplica),
            intra_broker: self.tracker.counts(TaskType::IntraBrokerReplica),
            leader: self.tracker.counts(TaskType::Leader),
            recently_demoted: self.history.demotion.brokers(),
            recently_removed: self.history.removal.brokers(),
        };
        self.status_tx.send_replace(Arc::new(status));
    }

    /// Stops the execution from inside the worker (dead tasks), bumping the
    /// stop counter but not the by-user one.
    pub(super) fn self_stop(&self) {
        if self.session.escalate_stop(false) {
            self.metrics.incr_stopped();
        }
    }

    pub(super) fn send_notification(&self, message: String) {
        self.bus.publish(
            Event::now(EventKind::Notification)
                .with_uuid(&self.uuid)
                .with_detail(message),
        );
    }

    pub(super) fn send_alert(&self, message: String) {
        self.bus.publish(
            Event::now(EventKind::Alert)
                .with_uuid(&self.uuid)
                .with_detail(message),
        );
    }

    fn log_replica_progress(&self, task_type: TaskType, total: usize, total_mb: u64) {
        let finished = self.tracker.finished(task_type);
        let finished_mb = self.tracker.finished_data_mb(task_type);
        let pct = if total == 0 {
            100.0
        } else {
            finished as f64 * 100.0 / total as f64
        };
        let mb_pct = if total_mb == 0 {
            100.0
        } else {
            finished_mb as f64 * 100.0 / total_mb as f64
        };
        tracing::info!(
            kind = task_type.as_label(),
            progress = %format!("{finished}/{total} ({pct:.2}%)"),
            data = %format!("{finished_mb}/{total_mb} MB ({mb_pct:.2}%)"),
            "partition movements completed"
        );
    }

    /// One-shot tally when a phase ends with a stop signal pending. Pending
    /// tasks of this and later phases will never run and count as cancelled.
    fn log_stop_summary(&self, task_type: TaskType) {
        let counts = self.tracker.counts(task_type);
        let downstream_cancelled: usize = TaskType::ALL
            .iter()
            .skip_while(|t| **t != task_type)
            .skip(1)
            .map(|t| self.tracker.counts(*t).pending)
            .sum();
        tracing::info!(
            kind = task_type.as_label(),
            cancelled = counts.cancelled(),
            in_progress = counts.in_progress,
            aborting = counts.aborting,
            aborted = counts.aborted,
            dead = counts.dead,
            completed = counts.completed,
            remaining_mb = counts.remaining_data_mb,
            downstream_cancelled,
            "movements stopped"
        );
    }

    fn notify_finished(&mut self) {
        let stopped = self.session.stop_signal() != StopSignal::None;
        let prefix = format!(
            "Task [{}] {} execution is ",
            self.uuid,
            if self.triggered_by_user { "user" } else { "self-healing" }
        );

        if stopped {
            let by = if self.session.stopped_by_user() { "user" } else { "self" };
            self.bus.publish(
                Event::now(EventKind::ExecutionStopped)
                    .with_uuid(&self.uuid)
                    .with_detail(format!("stopped by {by}")),
            );
            self.send_alert(format!("{prefix}stopped by {by}."));
        } else if let Some(err) = self.execution_error.clone() {
            self.bus.publish(
                Event::now(EventKind::ExecutionInterrupted)
                    .with_uuid(&self.uuid)
                    .with_detail(err.clone()),
            );
            self.send_alert(format!("{prefix}interrupted with exception {err}."));
        } else {
            self.bus.publish(
                Event::now(EventKind::ExecutionFinished).with_uuid(&self.uuid),
            );
            self.send_notification(format!("{prefix}finished."));
        }

        let errored = stopped || self.execution_error.is_some();
        if self.triggered_by_user {
            if let Some(user_tasks) = &self.user_tasks {
                user_tasks.mark_finished(&self.uuid, errored);
            }
        } else {
            self.clients.anomaly.mark_self_healing_finished(&self.uuid);
        }
    }

    /// Unconditional cleanup on loop exit.
    fn clear_completed_execution(&mut self) {
        self.tracker.clear();
        self.session.clear_batch();
        let status = ExecutorStatus::no_task(
            self.history.demotion.brokers(),
            self.history.removal.brokers(),
            self.caps.as_tuple(),
        );
        self.status_tx.send_replace(Arc::new(status));
        self.session.set_has_ongoing(false);
        self.session.reset_stop();
        self.session.set_stopped_by_user(false);
        self.monitor.set_sampling_mode(SamplingMode::All);
    }
}

/// Proposals behind a set of tasks.
pub(super) fn proposals_of(tasks: &[MoveTask]) -> Vec<Arc<Proposal>> {
    tasks.iter().map(|t| Arc::clone(t.proposal())).collect()
}

/// Directory-move requests for a batch of intra-broker tasks.
pub(super) fn dir_move_requests(tasks: &[MoveTask]) -> Vec<DirMoveRequest> {
    tasks
        .iter()
        .filter_map(|t| {
            let broker = t.broker()?;
            let target_dir = t.proposal().dir_moves().get(&broker).cloned()?;
            Some(DirMoveRequest {
                partition: t.proposal().partition().clone(),
                broker,
                target_dir,
            })
        })
        .collect()
}
