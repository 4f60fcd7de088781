//! # Events emitted by the execution controller.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Batch lifecycle**: proposing, starting, phase changes, terminal outcomes
//! - **Task lifecycle**: submission batches, completions, deaths, rollbacks
//! - **Operator messages**: notifications and alerts (the notifier surface)
//! - **Subscriber plumbing**: overflow and panic reports from the fan-out
//!
//! The [`Event`] struct carries optional metadata such as the batch uuid,
//! execution id, partition, and a free-form detail message.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.
//!
//! ## Example
//! ```rust
//! use movevisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::TaskDead)
//!     .with_uuid("b7c1")
//!     .with_execution_id(42)
//!     .with_detail("target leader is down");
//!
//! assert_eq!(ev.kind, EventKind::TaskDead);
//! assert_eq!(ev.execution_id, Some(42));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::snapshot::Phase;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Batch lifecycle events ===
    /// The controller was reserved while an optimizer generates proposals.
    ProposingStarted,
    /// Proposal generation was abandoned; the controller is free again.
    ProposingAbandoned,
    /// A batch was admitted and the supervision worker is starting.
    ExecutionStarting,
    /// The supervision worker entered a new phase.
    PhaseEntered,
    /// The batch ran to completion.
    ExecutionFinished,
    /// The batch was stopped (gracefully or forcefully).
    ExecutionStopped,
    /// The batch terminated on an unexpected error.
    ExecutionInterrupted,

    // === Task lifecycle events ===
    /// A batch of tasks was handed to the cluster.
    TasksSubmitted,
    /// A task reached its goal state.
    TaskCompleted,
    /// A task settled after its partition vanished mid-flight.
    TaskAborted,
    /// A task was declared dead.
    TaskDead,
    /// In-progress tasks exceeded the slow-task threshold.
    SlowTasksDetected,
    /// Cancel reassignments were submitted for dead/stopped inter-broker tasks.
    RollbackSubmitted,
    /// Tasks dropped by the cluster controller were submitted again.
    TasksResubmitted,

    // === Operator messages ===
    /// Informational message for the operator.
    Notification,
    /// Warning-level message for the operator.
    Alert,
}

/// Execution event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number for ordering (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: event classification
/// - `uuid`, `phase`, `execution_id`, `partition`, `count`, `detail`: optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Uuid of the batch this event belongs to.
    pub uuid: Option<String>,
    /// Supervisor phase, for `PhaseEntered`.
    pub phase: Option<Phase>,
    /// Execution id of the task, if the event concerns a single task.
    pub execution_id: Option<u64>,
    /// Partition the event concerns, rendered as `topic-index`.
    pub partition: Option<String>,
    /// Number of tasks, for batch-level events.
    pub count: Option<u64>,
    /// Free-form message (operator text, error description).
    pub detail: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            uuid: None,
            phase: None,
            execution_id: None,
            partition: None,
            count: None,
            detail: None,
        }
    }

    /// Attaches the batch uuid.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Attaches the supervisor phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Attaches a task execution id.
    pub fn with_execution_id(mut self, id: u64) -> Self {
        self.execution_id = Some(id);
        self
    }

    /// Attaches a partition name.
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Attaches a task count.
    pub fn with_count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a free-form detail message.
    pub fn with_detail(mut self, msg: impl Into<String>) -> Self {
        self.detail = Some(msg.into());
        self
    }

    /// Creates a subscriber overflow event.
    ///
    /// Emitted when a subscriber's queue is full and an event is dropped.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_detail(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_detail(format!("subscriber={subscriber} panic={info}"))
    }
}
