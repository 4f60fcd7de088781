//! # Execution start/finish hooks.
//!
//! A batch is triggered either by a user request or by an anomaly detector's
//! self-healing action. The matching collaborator is notified when the batch
//! starts and when it terminates.

/// Hooks into the anomaly detector that triggers self-healing executions.
pub trait AnomalyDetector: Send + Sync + 'static {
    /// An execution is starting: drop the ongoing-detection timestamp.
    fn clear_ongoing_detection_time(&self);

    /// An execution is starting: previously unfixable goals may become
    /// fixable once the cluster changes.
    fn reset_unfixable_goals(&self);

    /// A self-healing execution with the given uuid terminated.
    fn mark_self_healing_finished(&self, uuid: &str);
}

/// Hooks into the user-request bookkeeping of the embedding application.
///
/// Wired via [`Controller::set_user_task_manager`](crate::Controller::set_user_task_manager);
/// required before any user-triggered execution is admitted.
pub trait UserTaskManager: Send + Sync + 'static {
    /// The user-triggered execution with the given uuid began running.
    fn mark_began(&self, uuid: &str);

    /// The user-triggered execution terminated. `stopped_or_errored` is true
    /// when it was stopped or died on an exception rather than finishing.
    fn mark_finished(&self, uuid: &str, stopped_or_errored: bool);
}
