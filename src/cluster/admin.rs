//! # Admin API contract.
//!
//! Covers the three cluster-side operations the supervision loop performs:
//! submitting partition reassignments, initiating on-broker directory moves,
//! and inspecting log directories.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::tasks::{BrokerId, PartitionId};

/// One partition reassignment: replace the replica set with `target_replicas`.
///
/// Rollbacks are expressed the same way, with the original replicas as the
/// target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassignmentRequest {
    pub partition: PartitionId,
    /// Replicas after the reassignment, preferred leader first.
    pub target_replicas: Vec<BrokerId>,
}

/// One on-broker directory move: relocate the replica of `partition` hosted
/// on `broker` to `target_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirMoveRequest {
    pub partition: PartitionId,
    pub broker: BrokerId,
    pub target_dir: String,
}

/// Terminal classification of a rejected reassignment submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The cluster rejected the target replica set (a target broker is gone).
    InvalidReplicaAssignment,
    /// Any other terminal rejection.
    Other(String),
}

/// Handle to the per-partition outcomes of one reassignment submission.
///
/// The cluster answers each partition asynchronously; the supervision loop
/// probes the receipt while tasks from the submission are still in flight.
#[async_trait]
pub trait SubmissionReceipt: Send + Sync {
    /// Resolves the outcome for one partition, waiting at most `timeout`.
    ///
    /// Returns `None` when the submission is still pending after `timeout`,
    /// when the partition was not part of this submission, or when the
    /// partition was accepted.
    async fn error_for(
        &self,
        partition: &PartitionId,
        timeout: Duration,
    ) -> Option<SubmissionError>;
}

/// Log-dir placement of one replica on one broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaDirState {
    /// Directory currently hosting the replica.
    pub current_dir: String,
    /// Destination directory of an in-flight move, if any.
    pub future_dir: Option<String>,
}

/// Per-broker log-dir inventory.
#[derive(Debug, Clone, Default)]
pub struct LogDirReport {
    /// Online log directories on the broker.
    pub dirs: Vec<String>,
    /// Per-partition replica placement on the broker.
    pub replicas: HashMap<PartitionId, ReplicaDirState>,
}

/// Cluster admin operations used by the supervision loop.
#[async_trait]
pub trait AdminApi: Send + Sync + 'static {
    /// Submits a batch of partition reassignments. Returns a receipt carrying
    /// the per-partition outcomes.
    async fn submit_replica_reassignments(
        &self,
        requests: &[ReassignmentRequest],
    ) -> anyhow::Result<Box<dyn SubmissionReceipt>>;

    /// Partitions with a reassignment currently in flight on the cluster.
    async fn ongoing_reassignments(&self) -> anyhow::Result<HashSet<PartitionId>>;

    /// Initiates on-broker directory moves.
    async fn alter_replica_dirs(&self, moves: &[DirMoveRequest]) -> anyhow::Result<()>;

    /// Log-dir inventory of the given brokers. Brokers whose disks are
    /// unreachable are absent from the result.
    async fn describe_log_dirs(
        &self,
        brokers: &[BrokerId],
    ) -> anyhow::Result<HashMap<BrokerId, LogDirReport>>;

    /// Releases client resources. Called once from `Controller::shutdown`.
    async fn close(&self) {}
}
