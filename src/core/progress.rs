//! # Progress polling.
//!
//! `wait_for_progress` is the core observer: once per progress interval it
//! re-submits dropped tasks, refreshes metadata and log-dir info, and settles
//! every in-flight task (completed, aborted, or dead) until at least one
//! task reaches a terminal state or nothing is in flight anymore.
//!
//! ## Per-task evaluation order
//! 1. stop dispatch (forced kills everything; graceful kills inter-broker)
//! 2. partition vanished (topic deleted) → aborting → aborted
//! 3. goal reached → completed
//! 4. dead condition → dead (inter-broker deaths feed the rollback)
//! 5. otherwise still running; maybe flagged slow

use std::collections::{HashMap, HashSet};

use crate::config::SLOW_TASK_ALERT_BACKOFF;
use crate::cluster::{LogDirReport, ReassignmentRequest};
use crate::events::{Event, EventKind};
use crate::snapshot::StopSignal;
use crate::tasks::{BrokerId, MoveTask, PartitionId, TaskState, TaskType};

use super::predicates;
use super::worker::{dir_move_requests, ExecutionWorker};

impl ExecutionWorker {
    /// One observation round: blocks until at least one in-flight task
    /// settles, and returns the tasks that reached a terminal state.
    /// Returns immediately-ish (one tick) when nothing is in flight.
    pub(super) async fn wait_for_progress(&mut self) -> Vec<MoveTask> {
        let mut finished: Vec<MoveTask> = Vec::new();

        loop {
            tokio::time::sleep(self.session.progress_interval()).await;
            self.maybe_reexecute_tasks().await;

            let cluster = match self.clients.metadata.refresh().await {
                Ok(view) => view,
                Err(err) => {
                    tracing::warn!(error = ?err, "failed to refresh cluster metadata; retrying next tick");
                    if self.tracker.in_execution_tasks(None).is_empty() {
                        break;
                    }
                    continue;
                }
            };
            let logdirs = self.fetch_logdirs_for_intra().await;

            let in_flight = self.tracker.in_execution_tasks(None);
            tracing::debug!(count = in_flight.len(), "tasks in execution");
            let mut dead_inter: Vec<MoveTask> = Vec::new();
            let mut stopped_inter: Vec<MoveTask> = Vec::new();
            let no_logdirs: HashMap<BrokerId, LogDirReport> = HashMap::new();

            for task in in_flight {
                let id = task.execution_id();
                let stop = self.session.stop_signal();
                let graceful_kill = stop == StopSignal::Graceful
                    && task.task_type() == TaskType::InterBrokerReplica;

                if stop == StopSignal::Forced || graceful_kill {
                    // A forced stop kills every in-flight task (the markers
                    // are cleaned up after the phases); a graceful stop kills
                    // inter-broker tasks and queues them for rollback.
                    tracing::debug!(task = %task, "task marked dead to stop the execution");
                    self.tracker.mark_dead(id);
                    let settled = self.settled(id, &task);
                    self.publish_task_event(
                        EventKind::TaskDead,
                        &settled,
                        Some(if stop == StopSignal::Forced {
                            "force-stop"
                        } else {
                            "graceful stop"
                        }),
                    );
                    if graceful_kill {
                        stopped_inter.push(settled.clone());
                    }
                    finished.push(settled);
                    continue;
                }

                if cluster.partition(task.proposal().partition()).is_none() {
                    tracing::debug!(task = %task, "task finished because its topic was deleted");
                    self.tracker.mark_aborting(id);
                    self.tracker.mark_done(id);
                    let settled = self.settled(id, &task);
                    self.publish_task_event(EventKind::TaskAborted, &settled, None);
                    finished.push(settled);
                    continue;
                }

                // Without fresh log-dir info an intra-broker task can be
                // neither completed nor declared dead; skip it this tick.
                let logdirs = match logdirs.as_ref() {
                    Some(map) => map,
                    None if task.task_type() == TaskType::IntraBrokerReplica => continue,
                    None => &no_logdirs,
                };

                if predicates::is_task_done(&cluster, logdirs, &task) {
                    self.tracker.mark_done(id);
                    let settled = self.settled(id, &task);
                    self.publish_task_event(EventKind::TaskCompleted, &settled, None);
                    finished.push(settled);
                    continue;
                }

                let reason = predicates::dead_reason(
                    &cluster,
                    logdirs,
                    &task,
                    self.last_receipt.as_deref(),
                    self.cfg.leader_movement_timeout.as_millis() as i64,
                    self.clock.now_ms(),
                )
                .await;
                if let Some(reason) = reason {
                    tracing::warn!(task = %task, reason = %reason, "killing execution for task");
                    self.tracker.mark_dead(id);
                    let settled = self.settled(id, &task);
                    self.publish_task_event(EventKind::TaskDead, &settled, Some(&reason));
                    if task.task_type() == TaskType::InterBrokerReplica {
                        dead_inter.push(settled.clone());
                    }
                    finished.push(settled);
                }
            }

            self.report_slow_tasks();
            self.handle_dead_or_stopped_inter_tasks(dead_inter, stopped_inter)
                .await;
            self.update_ongoing_state();

            if self.tracker.in_execution_tasks(None).is_empty() || !finished.is_empty() {
                break;
            }
        }

        if !finished.is_empty() {
            tracing::info!(count = finished.len(), "finished tasks");
        }
        finished
    }

    /// Latest tracker state of a task, falling back to the pre-transition
    /// clone.
    fn settled(&self, id: u64, fallback: &MoveTask) -> MoveTask {
        self.tracker.get(id).cloned().unwrap_or_else(|| fallback.clone())
    }

    /// Log-dir inventory of brokers hosting in-flight intra-broker moves.
    /// `None` when the admin call failed (skip intra evaluation this tick).
    async fn fetch_logdirs_for_intra(&self) -> Option<HashMap<BrokerId, LogDirReport>> {
        let mut brokers: Vec<BrokerId> = self
            .tracker
            .in_execution_tasks(Some(&[TaskType::IntraBrokerReplica]))
            .iter()
            .filter_map(|t| t.broker())
            .collect();
        brokers.sort_unstable();
        brokers.dedup();
        if brokers.is_empty() {
            return Some(HashMap::new());
        }
        match self.clients.admin.describe_log_dirs(&brokers).await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(error = ?err, "failed to describe log dirs; retrying next tick");
                None
            }
        }
    }

    /// Re-submits tasks the cluster controller dropped in a race: the
    /// tracker's in-flight set must stay a subset of the cluster's active
    /// set. Leadership re-submission runs only when no replica moves are
    /// pending and no election is in flight.
    async fn maybe_reexecute_tasks(&mut self) {
        let inter = self
            .tracker
            .in_execution_tasks(Some(&[TaskType::InterBrokerReplica]));
        let has_inter = !inter.is_empty();
        if has_inter && self.cfg.reexecute_inter_broker_enabled {
            match self.clients.admin.ongoing_reassignments().await {
                Ok(active) => {
                    let missing: Vec<&MoveTask> = inter
                        .iter()
                        .filter(|t| !active.contains(t.proposal().partition()))
                        .collect();
                    if !missing.is_empty() {
                        tracing::info!(
                            count = missing.len(),
                            "re-submitting inter-broker tasks dropped by the cluster controller"
                        );
                        let requests: Vec<ReassignmentRequest> = missing
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
                                self.publish_resubmitted(requests.len());
                            }
                            Err(err) => {
                                tracing::warn!(error = ?err, "failed to re-submit inter-broker tasks");
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        error = ?err,
                        "failed to list ongoing reassignments; skipping re-execution check"
                    );
                }
            }
        }

        let intra = self
            .tracker
            .in_execution_tasks(Some(&[TaskType::IntraBrokerReplica]));
        let has_intra = !intra.is_empty();
        if has_intra {
            if let Some(logdirs) = self.fetch_logdirs_for_intra().await {
                let to_reexecute: Vec<MoveTask> = intra
                    .into_iter()
                    .filter(|t| {
                        let Some(broker) = t.broker() else { return false };
                        let Some(target) = t.proposal().dir_moves().get(&broker).cloned() else {
                            return false;
                        };
                        match logdirs
                            .get(&broker)
                            .and_then(|r| r.replicas.get(t.proposal().partition()))
                        {
                            // Neither arrived nor moving: the move was dropped.
                            Some(state) => {
                                state.current_dir != target
                                    && state.future_dir.as_deref() != Some(target.as_str())
                            }
                            // Unreachable broker/dir is the dead check's call.
                            None => false,
                        }
                    })
                    .collect();
                if !to_reexecute.is_empty() {
                    tracing::info!(
                        count = to_reexecute.len(),
                        "re-submitting intra-broker directory moves dropped by the broker"
                    );
                    if let Err(err) = self
                        .clients
                        .admin
                        .alter_replica_dirs(&dir_move_requests(&to_reexecute))
                        .await
                    {
                        tracing::warn!(error = ?err, "failed to re-submit intra-broker moves");
                    } else {
                        self.publish_resubmitted(to_reexecute.len());
                    }
                }
            }
        }

        if !has_inter && !has_intra {
            let leaders = self.tracker.in_execution_tasks(Some(&[TaskType::Leader]));
            if !leaders.is_empty() {
                match self
                    .clients
                    .coordination
                    .ongoing_preferred_leader_elections()
                    .await
                {
                    Ok(ongoing) if ongoing.is_empty() => {
                        tracing::info!(count = leaders.len(), "re-submitting leadership tasks");
                        let partitions: Vec<PartitionId> = leaders
                            .iter()
                            .map(|t| t.proposal().partition().clone())
                            .collect();
                        if let Err(err) = self
                            .clients
                            .coordination
                            .trigger_preferred_leader_election(&partitions)
                            .await
                        {
                            tracing::warn!(error = ?err, "failed to re-submit leadership tasks");
                        } else {
                            self.publish_resubmitted(partitions.len());
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = ?err, "failed to check ongoing preferred-leader elections");
                    }
                }
            }
        }
    }

    /// Rolls back dead or gracefully-stopped inter-broker tasks by reverting
    /// each partition to its pre-execution placement, and stops the batch if
    /// nobody requested a stop yet.
    ///
    /// When every cancelled task came from a graceful stop, the rollback is
    /// awaited; with real dead tasks involved this would risk blocking on a
    /// stuck reassignment, so the next execution's preflight is left to
    /// observe any residue instead.
    async fn handle_dead_or_stopped_inter_tasks(
        &mut self,
        dead: Vec<MoveTask>,
        stopped: Vec<MoveTask>,
    ) {
        let to_cancel: Vec<MoveTask> = dead.iter().chain(stopped.iter()).cloned().collect();
        if to_cancel.is_empty() {
            return;
        }
        debug_assert!(to_cancel.iter().all(|t| t.state() == TaskState::Dead));

        let requests: Vec<ReassignmentRequest> = to_cancel
            .iter()
            .map(|t| ReassignmentRequest {
                partition: t.proposal().partition().clone(),
                target_replicas: t.proposal().old_brokers(),
            })
            .collect();
        if let Err(err) = self
            .clients
            .admin
            .submit_replica_reassignments(&requests)
            .await
        {
            tracing::warn!(error = ?err, "failed to submit rollback reassignments");
        }
        self.bus.publish(
            Event::now(EventKind::RollbackSubmitted)
                .with_uuid(&self.uuid)
                .with_count(to_cancel.len() as u64),
        );

        if self.session.stop_signal() == StopSignal::None {
            tracing::info!(count = to_cancel.len(), "stopping the execution due to dead tasks");
            self.self_stop();
        }

        if dead.is_empty() {
            let being_cancelled: HashSet<PartitionId> = to_cancel
                .iter()
                .map(|t| t.proposal().partition().clone())
                .collect();
            loop {
                match self.clients.admin.ongoing_reassignments().await {
                    Ok(active) => {
                        if active.intersection(&being_cancelled).next().is_none() {
                            break;
                        }
                        tracing::info!(
                            "waiting for the rollback of ongoing inter-broker reassignments"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(error = ?err, "failed to list ongoing reassignments during rollback");
                    }
                }
                tokio::time::sleep(self.session.progress_interval()).await;
            }
        }
    }

    /// Alerts on slow in-flight tasks, at most once per backoff window and at
    /// most once per task.
    fn report_slow_tasks(&mut self) {
        let now_ms = self.clock.now_ms();
        if now_ms - self.last_slow_report_ms <= SLOW_TASK_ALERT_BACKOFF.as_millis() as i64 {
            return;
        }
        let threshold_ms = self.cfg.slow_task_alerting_threshold.as_millis() as i64;
        let slow = self.tracker.collect_slow_tasks(threshold_ms);
        if slow.is_empty() {
            return;
        }

        let mut message = String::from("Slow tasks are detected:\n");
        for task in &slow {
            message.push_str(&format!(
                "\tid: {}\tstart_ms: {}\tdetail: {}\n",
                task.execution_id(),
                task.started_at_ms().unwrap_or(-1),
                task
            ));
        }
        self.bus.publish(
            Event::now(EventKind::SlowTasksDetected)
                .with_uuid(&self.uuid)
                .with_count(slow.len() as u64),
        );
        self.send_alert(message);
        self.last_slow_report_ms = now_ms;
    }

    fn publish_task_event(&self, kind: EventKind, task: &MoveTask, detail: Option<&str>) {
        let mut event = Event::now(kind)
            .with_uuid(&self.uuid)
            .with_execution_id(task.execution_id())
            .with_partition(task.proposal().partition().to_string());
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.bus.publish(event);
    }

    fn publish_resubmitted(&self, count: usize) {
        self.bus.publish(
            Event::now(EventKind::TasksResubmitted)
                .with_uuid(&self.uuid)
                .with_count(count as u64),
        );
    }
}
