//! # Metadata client contract.

use async_trait::async_trait;

use super::view::ClusterView;

/// Source of refreshed cluster metadata.
#[async_trait]
pub trait MetadataClient: Send + Sync + 'static {
    /// Fetches a fresh view of brokers, partitions, replicas, and leaders.
    async fn refresh(&self) -> anyhow::Result<ClusterView>;

    /// Releases client resources. Called once from `Controller::shutdown`.
    async fn close(&self) {}
}
