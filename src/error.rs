//! # Error types used by the movevisor controller.
//!
//! This module defines the error enum surfaced by the public facade:
//!
//! - [`ExecutionError`] errors raised while admitting or controlling a batch.
//!
//! Disallowed task-state edges are reported separately via
//! [`InvalidTransition`](crate::tasks::InvalidTransition), close to the state
//! machine that produces them.
//!
//! The type provides an `as_label` helper for metrics and log tagging.

use thiserror::Error;

/// # Errors produced when admitting or controlling an execution batch.
///
/// Errors inside the running supervision loop are not surfaced through this
/// type: transient cluster-client failures are logged and retried on the next
/// poll tick, and anything fatal terminates the batch with an alert.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A batch is already past admission, or an external agent is moving
    /// partitions on the cluster. The caller must wait for the cluster to
    /// settle before retrying.
    #[error("ongoing execution: {reason}")]
    OngoingExecution {
        /// What exactly is still in flight.
        reason: String,
    },

    /// A caller-supplied argument failed validation (missing load monitor,
    /// progress interval below the floor, empty uuid).
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The facade was asked for a transition its current state does not allow
    /// (e.g. `execute` with a uuid that differs from the proposing one).
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    /// A cluster client failed during preflight. This usually indicates
    /// transient network issues; the batch was not admitted and no state
    /// changed.
    #[error("preflight call failed: {source}")]
    Preflight {
        #[source]
        source: anyhow::Error,
    },
}

impl ExecutionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecutionError::OngoingExecution { .. } => "ongoing_execution",
            ExecutionError::InvalidArgument { .. } => "invalid_argument",
            ExecutionError::IllegalState { .. } => "illegal_state",
            ExecutionError::Preflight { .. } => "preflight_failed",
        }
    }

    /// True if the caller may succeed by simply retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::OngoingExecution { .. } | ExecutionError::Preflight { .. }
        )
    }

    pub(crate) fn ongoing(reason: impl Into<String>) -> Self {
        ExecutionError::OngoingExecution {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ExecutionError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal(reason: impl Into<String>) -> Self {
        ExecutionError::IllegalState {
            reason: reason.into(),
        }
    }
}
