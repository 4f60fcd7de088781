//! # Coordination-store contract.
//!
//! Preferred-leader elections and the force-stop intervention both go through
//! the cluster's coordination store rather than the admin API.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::tasks::PartitionId;

/// Coordination-store operations used by the supervision loop.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Partitions with a preferred-leader election currently pending.
    async fn ongoing_preferred_leader_elections(&self) -> anyhow::Result<HashSet<PartitionId>>;

    /// Requests a preferred-leader election for the given partitions.
    async fn trigger_preferred_leader_election(
        &self,
        partitions: &[PartitionId],
    ) -> anyhow::Result<()>;

    /// Force-stop path: removes the pending-reassignment markers and bounces
    /// the cluster controller so it abandons everything still in flight.
    /// This is the only operation that can revert uncommitted reassignments.
    async fn delete_reassignment_markers(&self) -> anyhow::Result<()>;

    /// Releases client resources. Called once from `Controller::shutdown`.
    async fn close(&self) {}
}
