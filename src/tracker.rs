//! # Task tracker.
//!
//! Owns every task of one batch: materializes tasks from proposals, hands out
//! batches of runnable tasks under the concurrency caps, and drives per-task
//! state transitions.
//!
//! ## Rules
//! - Emission order is fixed at materialization time by the
//!   [`OrderingStrategy`] and never re-sorted afterwards.
//! - A batch is the **largest prefix** of the pending order that fits under
//!   the caps: admission stops at the first task that does not fit, even if a
//!   later one would. This keeps emission deterministic.
//! - Inter-broker tasks count against the cap of every source **and**
//!   destination broker; intra-broker tasks against their broker; leadership
//!   tasks against one global cap. Brokers in the exempt set skip cap checks.
//! - Tasks move to `InProgress` only when handed out here, and their
//!   `started_at_ms` is stamped at that moment.
//!
//! The tracker itself is single-writer: after admission it is owned by the
//! supervision worker. Only the cap cells ([`ConcurrencyCaps`]) are shared,
//! so cap changes from any thread are observed on the next batch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cluster::ClusterView;
use crate::snapshot::TaskCounts;
use crate::tasks::{
    BrokerId, MoveTask, OrderingStrategy, PartitionId, Proposal, TaskState, TaskType,
};
use crate::time::Clock;

/// Shared, atomically updated concurrency caps.
///
/// Setters may be called from any thread while an execution runs; the tracker
/// reads the cells when assembling the next batch.
#[derive(Debug)]
pub(crate) struct ConcurrencyCaps {
    inter_broker: AtomicUsize,
    intra_broker: AtomicUsize,
    leader: AtomicUsize,
}

impl ConcurrencyCaps {
    pub fn new(inter_broker: usize, intra_broker: usize, leader: usize) -> Self {
        Self {
            inter_broker: AtomicUsize::new(inter_broker),
            intra_broker: AtomicUsize::new(intra_broker),
            leader: AtomicUsize::new(leader),
        }
    }

    pub fn inter_broker(&self) -> usize {
        self.inter_broker.load(Ordering::Relaxed)
    }

    pub fn intra_broker(&self) -> usize {
        self.intra_broker.load(Ordering::Relaxed)
    }

    pub fn leader(&self) -> usize {
        self.leader.load(Ordering::Relaxed)
    }

    pub fn set_inter_broker(&self, cap: usize) {
        self.inter_broker.store(cap, Ordering::Relaxed);
    }

    pub fn set_intra_broker(&self, cap: usize) {
        self.intra_broker.store(cap, Ordering::Relaxed);
    }

    pub fn set_leader(&self, cap: usize) {
        self.leader.store(cap, Ordering::Relaxed);
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.inter_broker(), self.intra_broker(), self.leader())
    }
}

/// Lifecycle owner of all tasks in one batch.
pub(crate) struct TaskTracker {
    clock: Arc<dyn Clock>,
    caps: Arc<ConcurrencyCaps>,
    next_execution_id: u64,
    tasks: HashMap<u64, MoveTask>,
    /// Pending execution ids per type, in emission order.
    pending: HashMap<TaskType, Vec<u64>>,
    /// Ids in `InProgress` or `Aborting`.
    in_execution: HashSet<u64>,
    /// In-flight inter-broker tasks per source/destination broker.
    inter_by_broker: HashMap<BrokerId, usize>,
    /// In-flight intra-broker tasks per broker.
    intra_by_broker: HashMap<BrokerId, usize>,
    /// Partitions with any task currently in flight.
    partitions_in_flight: HashSet<PartitionId>,
    /// Brokers exempt from cap checks for this batch.
    exempt: HashSet<BrokerId>,
}

impl TaskTracker {
    pub fn new(caps: Arc<ConcurrencyCaps>, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            caps,
            next_execution_id: 0,
            tasks: HashMap::new(),
            pending: HashMap::new(),
            in_execution: HashSet::new(),
            inter_by_broker: HashMap::new(),
            intra_by_broker: HashMap::new(),
            partitions_in_flight: HashSet::new(),
            exempt: HashSet::new(),
        }
    }

    /// Materializes tasks from proposals and fixes their emission order.
    ///
    /// Per proposal:
    /// - one inter-broker task if any replica is added or removed,
    /// - one intra-broker task per broker whose log directory changes,
    /// - one leadership task if the broker list is unchanged and the current
    ///   leader (live metadata, falling back to the proposal) differs from
    ///   the target preferred leader.
    pub fn add_proposals(
        &mut self,
        proposals: &[Proposal],
        exempt: HashSet<BrokerId>,
        cluster: &ClusterView,
        strategy: &dyn OrderingStrategy,
    ) {
        self.exempt = exempt;
        for proposal in proposals {
            let proposal = Arc::new(proposal.clone());

            if proposal.has_replica_action() {
                self.push_task(TaskType::InterBrokerReplica, Arc::clone(&proposal), None);
            }
            for (broker, _dir) in proposal.dir_moves() {
                self.push_task(
                    TaskType::IntraBrokerReplica,
                    Arc::clone(&proposal),
                    Some(broker),
                );
            }

            let current_leader = cluster
                .partition(proposal.partition())
                .and_then(|state| state.leader)
                .or_else(|| proposal.old_leader());
            if proposal.old_brokers() == proposal.new_brokers()
                && current_leader != proposal.new_leader()
            {
                self.push_task(TaskType::Leader, proposal, None);
            }
        }

        for ids in self.pending.values_mut() {
            let tasks = &self.tasks;
            ids.sort_by(|a, b| strategy.compare(&tasks[a], &tasks[b], cluster));
        }
    }

    fn push_task(&mut self, task_type: TaskType, proposal: Arc<Proposal>, broker: Option<BrokerId>) {
        let id = self.next_execution_id;
        self.next_execution_id += 1;
        self.tasks
            .insert(id, MoveTask::new(id, task_type, proposal, broker));
        self.pending.entry(task_type).or_default().push(id);
    }

    // ---------------------------
    // Batch emission
    // ---------------------------

    /// Largest admissible prefix of pending inter-broker tasks. Emitted tasks
    /// are marked `InProgress`.
    pub fn next_inter_broker_batch(&mut self) -> Vec<MoveTask> {
        let cap = self.caps.inter_broker();
        self.emit_prefix(TaskType::InterBrokerReplica, |tracker, task| {
            let proposal = task.proposal();
            let mut brokers = proposal.replicas_to_remove();
            brokers.extend(proposal.replicas_to_add());
            brokers
                .iter()
                .all(|b| tracker.exempt.contains(b) || tracker.inter_count(*b) < cap)
        })
    }

    /// Largest admissible prefix of pending intra-broker tasks. Emitted tasks
    /// are marked `InProgress`.
    pub fn next_intra_broker_batch(&mut self) -> Vec<MoveTask> {
        let cap = self.caps.intra_broker();
        self.emit_prefix(TaskType::IntraBrokerReplica, |tracker, task| {
            match task.broker() {
                Some(b) => tracker.exempt.contains(&b) || tracker.intra_count(b) < cap,
                None => false,
            }
        })
    }

    /// Largest admissible prefix of pending leadership tasks under the global
    /// cap. Emitted tasks are marked `InProgress`.
    pub fn next_leader_batch(&mut self) -> Vec<MoveTask> {
        let cap = self.caps.leader();
        self.emit_prefix(TaskType::Leader, |tracker, _task| {
            tracker.in_execution_count(TaskType::Leader) < cap
        })
    }

    /// Emits the longest prefix of the pending order for which `admissible`
    /// holds and no in-flight task touches the same partition. Stops at the
    /// first rejection.
    fn emit_prefix(
        &mut self,
        task_type: TaskType,
        admissible: impl Fn(&Self, &MoveTask) -> bool,
    ) -> Vec<MoveTask> {
        let mut batch = Vec::new();
        let now_ms = self.clock.now_ms();

        loop {
            let Some(&id) = self.pending.get(&task_type).and_then(|ids| ids.first()) else {
                break;
            };
            let task = &self.tasks[&id];
            let collides = self.partitions_in_flight.contains(task.proposal().partition());
            if collides || !admissible(self, task) {
                break;
            }

            self.pending.get_mut(&task_type).expect("pending list").remove(0);
            let task = self.tasks.get_mut(&id).expect("task by id");
            task.mark_in_progress(now_ms)
                .expect("pending task accepts in-progress");
            let task = task.clone();
            self.index_in_flight(&task);
            batch.push(task);
        }
        batch
    }

    fn index_in_flight(&mut self, task: &MoveTask) {
        self.in_execution.insert(task.execution_id());
        self.partitions_in_flight
            .insert(task.proposal().partition().clone());
        match task.task_type() {
            TaskType::InterBrokerReplica => {
                let proposal = task.proposal();
                for b in proposal
                    .replicas_to_remove()
                    .into_iter()
                    .chain(proposal.replicas_to_add())
                {
                    *self.inter_by_broker.entry(b).or_default() += 1;
                }
            }
            TaskType::IntraBrokerReplica => {
                if let Some(b) = task.broker() {
                    *self.intra_by_broker.entry(b).or_default() += 1;
                }
            }
            TaskType::Leader => {}
        }
    }

    fn unindex_in_flight(&mut self, id: u64) {
        if !self.in_execution.remove(&id) {
            return;
        }
        let task = self.tasks[&id].clone();
        self.partitions_in_flight.remove(task.proposal().partition());
        match task.task_type() {
            TaskType::InterBrokerReplica => {
                let proposal = task.proposal();
                for b in proposal
                    .replicas_to_remove()
                    .into_iter()
                    .chain(proposal.replicas_to_add())
                {
                    if let Some(count) = self.inter_by_broker.get_mut(&b) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            TaskType::IntraBrokerReplica => {
                if let Some(b) = task.broker() {
                    if let Some(count) = self.intra_by_broker.get_mut(&b) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            TaskType::Leader => {}
        }
    }

    fn inter_count(&self, broker: BrokerId) -> usize {
        self.inter_by_broker.get(&broker).copied().unwrap_or(0)
    }

    fn intra_count(&self, broker: BrokerId) -> usize {
        self.intra_by_broker.get(&broker).copied().unwrap_or(0)
    }

    // ---------------------------
    // State transitions
    // ---------------------------

    /// Settles a task: `InProgress → Completed` or `Aborting → Aborted`.
    pub fn mark_done(&mut self, id: u64) {
        if let Some(task) = self.tasks.get_mut(&id) {
            match task.mark_done() {
                Ok(()) => self.unindex_in_flight(id),
                Err(e) => tracing::warn!(id, error = %e, "ignored mark_done"),
            }
        }
    }

    /// Begins cancellation of an in-flight task (partition vanished).
    pub fn mark_aborting(&mut self, id: u64) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if let Err(e) = task.mark_aborting() {
                tracing::warn!(id, error = %e, "ignored mark_aborting");
            }
        }
    }

    /// Declares a task dead.
    pub fn mark_dead(&mut self, id: u64) {
        if let Some(task) = self.tasks.get_mut(&id) {
            match task.mark_dead() {
                Ok(()) => self.unindex_in_flight(id),
                Err(e) => tracing::warn!(id, error = %e, "ignored mark_dead"),
            }
        }
    }

    // ---------------------------
    // Observability
    // ---------------------------

    pub fn get(&self, id: u64) -> Option<&MoveTask> {
        self.tasks.get(&id)
    }

    /// Tasks in `InProgress` or `Aborting`, optionally filtered by type.
    pub fn in_execution_tasks(&self, types: Option<&[TaskType]>) -> Vec<MoveTask> {
        let mut tasks: Vec<MoveTask> = self
            .in_execution
            .iter()
            .map(|id| self.tasks[id].clone())
            .filter(|t| types.map_or(true, |set| set.contains(&t.task_type())))
            .collect();
        tasks.sort_by_key(|t| t.execution_id());
        tasks
    }

    pub fn in_execution_count(&self, task_type: TaskType) -> usize {
        self.in_execution
            .iter()
            .filter(|id| self.tasks[id].task_type() == task_type)
            .count()
    }

    /// Tasks of the type not yet handed out.
    pub fn remaining(&self, task_type: TaskType) -> usize {
        self.pending.get(&task_type).map_or(0, Vec::len)
    }

    /// Tasks of the type that reached a terminal state.
    pub fn finished(&self, task_type: TaskType) -> usize {
        self.tasks
            .values()
            .filter(|t| t.task_type() == task_type && t.state().is_terminal())
            .count()
    }

    /// Data still to move (pending + in-flight tasks), in MB.
    pub fn remaining_data_mb(&self, task_type: TaskType) -> u64 {
        self.tasks
            .values()
            .filter(|t| t.task_type() == task_type && !t.state().is_terminal())
            .map(|t| t.proposal().data_size_mb())
            .sum()
    }

    /// Data moved by completed tasks, in MB.
    pub fn finished_data_mb(&self, task_type: TaskType) -> u64 {
        self.tasks
            .values()
            .filter(|t| t.task_type() == task_type && t.state() == TaskState::Completed)
            .map(|t| t.proposal().data_size_mb())
            .sum()
    }

    /// Data carried by in-flight tasks, in MB.
    pub fn in_execution_data_mb(&self, task_type: TaskType) -> u64 {
        self.in_execution
            .iter()
            .map(|id| &self.tasks[id])
            .filter(|t| t.task_type() == task_type)
            .map(|t| t.proposal().data_size_mb())
            .sum()
    }

    /// Per-state tally of one task type.
    pub fn counts(&self, task_type: TaskType) -> TaskCounts {
        let mut counts = TaskCounts {
            remaining_data_mb: self.remaining_data_mb(task_type),
            ..TaskCounts::default()
        };
        for task in self.tasks.values().filter(|t| t.task_type() == task_type) {
            match task.state() {
                TaskState::Pending => counts.pending += 1,
                TaskState::InProgress => counts.in_progress += 1,
                TaskState::Aborting => counts.aborting += 1,
                TaskState::Aborted => counts.aborted += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Dead => counts.dead += 1,
            }
        }
        counts
    }

    /// Collects in-flight tasks that crossed the slow threshold and were not
    /// reported before, stamping them reported.
    pub fn collect_slow_tasks(&mut self, threshold_ms: i64) -> Vec<MoveTask> {
        let now_ms = self.clock.now_ms();
        let mut slow = Vec::new();
        let ids: Vec<u64> = self.in_execution.iter().copied().collect();
        for id in ids {
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.maybe_report_slow(now_ms, threshold_ms) {
                    slow.push(task.clone());
                }
            }
        }
        slow.sort_by_key(|t| t.execution_id());
        slow
    }

    /// Drops all tasks. Called once when the batch terminates.
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.pending.clear();
        self.in_execution.clear();
        self.inter_by_broker.clear();
        self.intra_by_broker.clear();
        self.partitions_in_flight.clear();
        self.exempt.clear();
    }
}
