//! # Replication-throttle contract.
//!
//! Inter-broker replica moves are bandwidth-capped per topic while they run.
//! The helper owns the throttle rate; the controller only tells it which
//! proposals are starting and which have settled.

use std::sync::Arc;

use async_trait::async_trait;

use crate::tasks::Proposal;

/// Per-topic replication bandwidth-cap management.
#[async_trait]
pub trait ThrottleHelper: Send + Sync + 'static {
    /// Applies throttles for proposals about to be submitted.
    async fn set_throttles(&self, proposals: &[Arc<Proposal>]) -> anyhow::Result<()>;

    /// Removes throttles for settled proposals, keeping those still in
    /// progress untouched.
    async fn clear_throttles(
        &self,
        completed: &[Arc<Proposal>],
        still_in_progress: &[Arc<Proposal>],
    ) -> anyhow::Result<()>;
}
