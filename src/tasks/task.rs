//! # Movement tasks and their lifecycle.
//!
//! One [`MoveTask`] is one executable unit derived from a [`Proposal`]. Its
//! state follows a strict machine:
//!
//! ```text
//! Pending ──► InProgress ──► Completed
//!                 │
//!                 ├──► Aborting ──► Aborted
//!                 │        └─────► Dead
//!                 └──► Dead
//! ```
//!
//! ## Rules
//! - Every edge goes through [`TaskState::advance`]; anything else is an
//!   [`InvalidTransition`].
//! - Terminal states are sticky.
//! - `Pending` tasks that are never handed out stay `Pending`; summaries
//!   report them as cancelled when a batch stops early.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::proposal::{BrokerId, Proposal};

/// The three kinds of movement a proposal can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    /// Move a replica from one broker to another.
    InterBrokerReplica,
    /// Move a replica between log directories of one broker.
    IntraBrokerReplica,
    /// Transfer leadership to the target preferred leader.
    Leader,
}

impl TaskType {
    /// All task types, in phase order.
    pub const ALL: [TaskType; 3] = [
        TaskType::InterBrokerReplica,
        TaskType::IntraBrokerReplica,
        TaskType::Leader,
    ];

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskType::InterBrokerReplica => "inter_broker_replica",
            TaskType::IntraBrokerReplica => "intra_broker_replica",
            TaskType::Leader => "leader",
        }
    }
}

/// Lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Materialized, not yet handed out for submission.
    Pending,
    /// Submitted to the cluster; the supervision loop is watching it.
    InProgress,
    /// Cancellation initiated while in flight (partition vanished).
    Aborting,
    /// Observed settled after the abort request.
    Aborted,
    /// The cluster reached the task's goal state.
    Completed,
    /// Fatal condition; the task will never complete.
    Dead,
}

impl TaskState {
    /// All states, in lifecycle order.
    pub const ALL: [TaskState; 6] = [
        TaskState::Pending,
        TaskState::InProgress,
        TaskState::Aborting,
        TaskState::Aborted,
        TaskState::Completed,
        TaskState::Dead,
    ];

    /// True for states no further transition may leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Aborted | TaskState::Completed | TaskState::Dead
        )
    }

    /// Returns the state after taking the edge to `to`, or the disallowed
    /// edge. This is the single authority on the task state machine.
    pub fn advance(self, to: TaskState) -> Result<TaskState, InvalidTransition> {
        use TaskState::*;
        let allowed = matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Aborting)
                | (InProgress, Dead)
                | (Aborting, Aborted)
                | (Aborting, Dead)
        );
        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Aborting => "aborting",
            TaskState::Aborted => "aborted",
            TaskState::Completed => "completed",
            TaskState::Dead => "dead",
        }
    }
}

/// A task was asked to take an edge its state machine does not have.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("disallowed task transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// One executable unit of work derived from a [`Proposal`].
#[derive(Debug, Clone)]
pub struct MoveTask {
    execution_id: u64,
    task_type: TaskType,
    proposal: Arc<Proposal>,
    /// Destination broker for intra-broker moves; irrelevant otherwise.
    broker: Option<BrokerId>,
    state: TaskState,
    started_at_ms: Option<i64>,
    slow_alerted_at_ms: Option<i64>,
}

impl MoveTask {
    pub(crate) fn new(
        execution_id: u64,
        task_type: TaskType,
        proposal: Arc<Proposal>,
        broker: Option<BrokerId>,
    ) -> Self {
        Self {
            execution_id,
            task_type,
            proposal,
            broker,
            state: TaskState::Pending,
            started_at_ms: None,
            slow_alerted_at_ms: None,
        }
    }

    /// Batch-unique, monotonically assigned id.
    pub fn execution_id(&self) -> u64 {
        self.execution_id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn proposal(&self) -> &Arc<Proposal> {
        &self.proposal
    }

    /// Destination broker of an intra-broker move.
    pub fn broker(&self) -> Option<BrokerId> {
        self.broker
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// When the task left `Pending`, if it has.
    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    /// True while the cluster may still be acting on the task.
    pub fn in_execution(&self) -> bool {
        matches!(self.state, TaskState::InProgress | TaskState::Aborting)
    }

    /// Hands the task out for submission, stamping its start time.
    pub(crate) fn mark_in_progress(&mut self, now_ms: i64) -> Result<(), InvalidTransition> {
        self.state = self.state.advance(TaskState::InProgress)?;
        self.started_at_ms = Some(now_ms);
        Ok(())
    }

    /// Begins cancellation of an in-flight task.
    pub(crate) fn mark_aborting(&mut self) -> Result<(), InvalidTransition> {
        self.state = self.state.advance(TaskState::Aborting)?;
        Ok(())
    }

    /// Settles the task: `InProgress → Completed` or `Aborting → Aborted`.
    pub(crate) fn mark_done(&mut self) -> Result<(), InvalidTransition> {
        let to = match self.state {
            TaskState::Aborting => TaskState::Aborted,
            _ => TaskState::Completed,
        };
        self.state = self.state.advance(to)?;
        Ok(())
    }

    /// Declares the task dead.
    pub(crate) fn mark_dead(&mut self) -> Result<(), InvalidTransition> {
        self.state = self.state.advance(TaskState::Dead)?;
        Ok(())
    }

    /// Reports the task as slow at most once: true if it has been in flight
    /// longer than `threshold_ms` and was not reported before.
    pub(crate) fn maybe_report_slow(&mut self, now_ms: i64, threshold_ms: i64) -> bool {
        if !self.in_execution() || self.slow_alerted_at_ms.is_some() {
            return false;
        }
        match self.started_at_ms {
            Some(started) if now_ms - started > threshold_ms => {
                self.slow_alerted_at_ms = Some(now_ms);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for MoveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} [{}] {} ({:?})",
            self.execution_id,
            self.task_type.as_label(),
            self.proposal.partition(),
            self.state
        )?;
        if let Some(broker) = self.broker {
            write!(f, " on broker {broker}")?;
        }
        Ok(())
    }
}
