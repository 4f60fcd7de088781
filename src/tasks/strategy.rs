//! # Emission-order strategies.
//!
//! The tracker emits pending tasks in a deterministic order fixed at
//! materialization time. The default strategy front-loads partitions that are
//! already degraded, so healing work is not stuck behind routine balancing.

use std::cmp::Ordering;

use crate::cluster::ClusterView;

use super::task::MoveTask;

/// Total order over the tasks of one type; batch emission follows it.
///
/// Implementations must be deterministic for identical input: ties must be
/// broken by a stable key (the default falls through to partition id and
/// execution id).
pub trait OrderingStrategy: Send + Sync + 'static {
    /// Compares two tasks of the same type against the cluster view taken at
    /// materialization time.
    fn compare(&self, a: &MoveTask, b: &MoveTask, cluster: &ClusterView) -> Ordering;

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Default strategy: partitions with dead or out-of-sync replicas first, then
/// smaller partitions, then partition id.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFirst;

impl OfflineFirst {
    fn is_degraded(task: &MoveTask, cluster: &ClusterView) -> bool {
        match cluster.partition(task.proposal().partition()) {
            Some(state) => {
                state
                    .replicas
                    .iter()
                    .any(|b| !cluster.has_broker(*b) || !state.isr.contains(b))
                    || state.leader.is_none()
            }
            // Unknown to the cluster: treat as degraded so it surfaces early.
            None => true,
        }
    }
}

impl OrderingStrategy for OfflineFirst {
    fn compare(&self, a: &MoveTask, b: &MoveTask, cluster: &ClusterView) -> Ordering {
        let degraded_a = Self::is_degraded(a, cluster);
        let degraded_b = Self::is_degraded(b, cluster);
        degraded_b
            .cmp(&degraded_a)
            .then_with(|| a.proposal().data_size_mb().cmp(&b.proposal().data_size_mb()))
            .then_with(|| a.proposal().partition().cmp(b.proposal().partition()))
            .then_with(|| a.execution_id().cmp(&b.execution_id()))
    }

    fn name(&self) -> &'static str {
        "offline-first"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cluster::PartitionState;
    use crate::tasks::{PartitionId, Proposal, ReplicaPlacement, TaskType};

    fn view_with(healthy: &[PartitionId], degraded: &PartitionId) -> ClusterView {
        let mut view = ClusterView::default();
        view.brokers.extend([1, 2, 3]);
        for p in healthy {
            view.partitions.insert(
                p.clone(),
                PartitionState {
                    replicas: vec![1, 2],
                    isr: vec![1, 2],
                    leader: Some(1),
                },
            );
        }
        view.partitions.insert(
            degraded.clone(),
            PartitionState {
                replicas: vec![1, 9],
                isr: vec![1],
                leader: Some(1),
            },
        );
        view
    }

    fn task(id: u64, partition: (&str, i32), size_mb: u64) -> MoveTask {
        let proposal = Arc::new(Proposal::new(
            partition,
            vec![ReplicaPlacement::on(1), ReplicaPlacement::on(2)],
            vec![ReplicaPlacement::on(1), ReplicaPlacement::on(3)],
            size_mb,
        ));
        MoveTask::new(id, TaskType::InterBrokerReplica, proposal, None)
    }

    #[test]
    fn degraded_partitions_sort_first_then_size() {
        let healthy = [PartitionId::new("t", 0), PartitionId::new("t", 2)];
        let degraded = PartitionId::new("t", 1);
        let view = view_with(&healthy, &degraded);

        let mut tasks = vec![task(0, ("t", 0), 10), task(1, ("t", 1), 900)];
        tasks.sort_by(|a, b| OfflineFirst.compare(a, b, &view));
        assert_eq!(tasks[0].proposal().partition(), &degraded);

        // Among healthy partitions, smaller data moves first.
        let mut tasks = vec![task(0, ("t", 0), 500), task(1, ("t", 2), 5)];
        tasks.sort_by(|a, b| OfflineFirst.compare(a, b, &view));
        assert_eq!(tasks[1].proposal().partition().partition, 0);
    }
}
