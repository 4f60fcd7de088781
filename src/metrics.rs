//! # Monotone execution counters.
//!
//! Registered once at controller construction and shared with the worker;
//! values only grow. Cap gauges are not kept here: they are read live from
//! the shared cap cells via the controller.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone counters describing executor activity since process start.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    executions_stopped: AtomicU64,
    executions_stopped_by_user: AtomicU64,
    started_in_assigner_mode: AtomicU64,
    started_in_non_assigner_mode: AtomicU64,
}

impl ExecutorMetrics {
    /// Executions that received any stop signal.
    pub fn executions_stopped(&self) -> u64 {
        self.executions_stopped.load(Ordering::Relaxed)
    }

    /// Executions stopped by an explicit user request.
    pub fn executions_stopped_by_user(&self) -> u64 {
        self.executions_stopped_by_user.load(Ordering::Relaxed)
    }

    /// Executions started in full-assigner mode.
    pub fn started_in_assigner_mode(&self) -> u64 {
        self.started_in_assigner_mode.load(Ordering::Relaxed)
    }

    /// Executions started in balancing-only mode.
    pub fn started_in_non_assigner_mode(&self) -> u64 {
        self.started_in_non_assigner_mode.load(Ordering::Relaxed)
    }

    pub(crate) fn incr_stopped(&self) {
        self.executions_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_stopped_by_user(&self) {
        self.executions_stopped_by_user.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_started(&self, assigner_mode: bool) {
        if assigner_mode {
            self.started_in_assigner_mode.fetch_add(1, Ordering::Relaxed);
        } else {
            self.started_in_non_assigner_mode
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}
