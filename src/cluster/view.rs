//! # Point-in-time view of cluster metadata.

use std::collections::{BTreeSet, HashMap};

use crate::tasks::{BrokerId, PartitionId};

/// State of one partition as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionState {
    /// Assigned replicas, in broker order.
    pub replicas: Vec<BrokerId>,
    /// In-sync subset of the replicas.
    pub isr: Vec<BrokerId>,
    /// Current leader, if one is elected.
    pub leader: Option<BrokerId>,
}

/// Snapshot of cluster metadata: live brokers and per-partition state.
///
/// Produced by [`MetadataClient::refresh`](super::MetadataClient::refresh);
/// the supervision loop takes a fresh view on every poll tick.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    /// Brokers currently alive in the cluster.
    pub brokers: BTreeSet<BrokerId>,
    /// Known partitions and their replica/leader state.
    pub partitions: HashMap<PartitionId, PartitionState>,
}

impl ClusterView {
    /// Looks up the state of one partition, `None` if the topic is gone.
    pub fn partition(&self, id: &PartitionId) -> Option<&PartitionState> {
        self.partitions.get(id)
    }

    /// True if the broker is alive in this view.
    pub fn has_broker(&self, id: BrokerId) -> bool {
        self.brokers.contains(&id)
    }

    /// True if any replica of the partition is assigned but not in sync,
    /// restricted to the given brokers.
    pub fn has_out_of_sync_replica_on(&self, id: &PartitionId, brokers: &[BrokerId]) -> bool {
        match self.partition(id) {
            Some(state) => brokers
                .iter()
                .any(|b| state.replicas.contains(b) && !state.isr.contains(b)),
            None => false,
        }
    }
}
