//! # Executor status snapshot.
//!
//! [`ExecutorStatus`] is the immutable value the supervision worker publishes
//! after every state change. Readers always see a coherent point-in-time view;
//! there is no partially updated status.

use crate::tasks::BrokerId;

/// Top-level state of the executor (distinct from per-task state).
///
/// For any run, the published sequence is a prefix of
/// `Proposing, Starting, InterBroker, IntraBroker, Leader, NoTask`,
/// with `Stopping` possibly replacing any suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Idle; a new batch may be proposed.
    NoTask,
    /// Reserved while an external optimizer generates proposals.
    Proposing,
    /// Batch admitted; worker is preparing execution.
    Starting,
    /// Inter-broker replica movements in progress.
    InterBroker,
    /// Intra-broker directory movements in progress.
    IntraBroker,
    /// Leadership movements in progress.
    Leader,
    /// A stop signal is set; draining what remains.
    Stopping,
}

impl Phase {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Phase::NoTask => "no_task",
            Phase::Proposing => "proposing",
            Phase::Starting => "starting",
            Phase::InterBroker => "inter_broker",
            Phase::IntraBroker => "intra_broker",
            Phase::Leader => "leader",
            Phase::Stopping => "stopping",
        }
    }
}

/// Stop request ladder. Values only escalate: `None < Graceful < Forced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopSignal {
    /// No stop requested.
    None,
    /// Finish intra-broker and leadership work; kill and roll back
    /// inter-broker work.
    Graceful,
    /// Kill everything and evict in-flight reassignments from the cluster.
    Forced,
}

impl StopSignal {
    pub(crate) fn from_u8(v: u8) -> StopSignal {
        match v {
            2 => StopSignal::Forced,
            1 => StopSignal::Graceful,
            _ => StopSignal::None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            StopSignal::None => 0,
            StopSignal::Graceful => 1,
            StopSignal::Forced => 2,
        }
    }
}

/// Per-state tally of one task type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub aborting: usize,
    pub aborted: usize,
    pub completed: usize,
    pub dead: usize,
    /// Data still to move for remaining (pending + in-flight) tasks, in MB.
    pub remaining_data_mb: u64,
}

impl TaskCounts {
    /// Tasks that will never run because the batch terminated early.
    /// Meaningful once the executor left the corresponding phase.
    pub fn cancelled(&self) -> usize {
        self.pending
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.aborting + self.aborted + self.completed + self.dead
    }
}

/// Immutable description of the executor at one point in time.
#[derive(Debug, Clone)]
pub struct ExecutorStatus {
    pub phase: Phase,
    /// Uuid of the current batch, if one is past `begin_proposing`.
    pub uuid: Option<String>,
    /// Human-readable reason of the current batch.
    pub reason: Option<String>,
    /// Whether the current batch came from a user request.
    pub triggered_by_user: bool,
    /// Live concurrency caps.
    pub inter_broker_cap: usize,
    pub intra_broker_cap: usize,
    pub leader_cap: usize,
    /// Per-type task tallies of the current batch.
    pub inter_broker: TaskCounts,
    pub intra_broker: TaskCounts,
    pub leader: TaskCounts,
    /// Brokers recently demoted (history store contents).
    pub recently_demoted: Vec<BrokerId>,
    /// Brokers recently removed (history store contents).
    pub recently_removed: Vec<BrokerId>,
}

impl ExecutorStatus {
    /// Idle status with the given history and caps.
    pub(crate) fn no_task(
        recently_demoted: Vec<BrokerId>,
        recently_removed: Vec<BrokerId>,
        caps: (usize, usize, usize),
    ) -> Self {
        Self {
            phase: Phase::NoTask,
            uuid: None,
            reason: None,
            triggered_by_user: false,
            inter_broker_cap: caps.0,
            intra_broker_cap: caps.1,
            leader_cap: caps.2,
            inter_broker: TaskCounts::default(),
            intra_broker: TaskCounts::default(),
            leader: TaskCounts::default(),
            recently_demoted,
            recently_removed,
        }
    }
}
