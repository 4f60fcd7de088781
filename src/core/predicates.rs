//! # Goal and dead checks.
//!
//! The per-type predicates the poll cycle evaluates for every in-flight task.
//! These are the only places where task types behave differently; everything
//! else in the loop is type-agnostic.

use std::collections::HashMap;

use crate::cluster::{ClusterView, LogDirReport, SubmissionError, SubmissionReceipt};
use crate::config::FUTURE_ERROR_VERIFICATION_TIMEOUT;
use crate::tasks::{BrokerId, MoveTask, TaskType};

/// True if the cluster reached the task's goal state.
///
/// - Inter-broker: the replica broker set equals the target set and no
///   out-of-sync replica from the removed set remains.
/// - Intra-broker: the replica sits in the target directory with no pending
///   future directory.
/// - Leader: the partition's leader is the target preferred leader.
pub(crate) fn is_task_done(
    cluster: &ClusterView,
    logdirs: &HashMap<BrokerId, LogDirReport>,
    task: &MoveTask,
) -> bool {
    let proposal = task.proposal();
    let partition = proposal.partition();
    match task.task_type() {
        TaskType::InterBrokerReplica => match cluster.partition(partition) {
            Some(state) => {
                let mut current = state.replicas.clone();
                let mut target = proposal.new_brokers();
                current.sort_unstable();
                target.sort_unstable();
                current == target
                    && !cluster.has_out_of_sync_replica_on(partition, &proposal.replicas_to_remove())
            }
            None => false,
        },
        TaskType::IntraBrokerReplica => {
            let Some(broker) = task.broker() else {
                return false;
            };
            let Some(target_dir) = proposal.dir_moves().get(&broker).cloned() else {
                return false;
            };
            logdirs
                .get(&broker)
                .and_then(|report| report.replicas.get(partition))
                .map(|replica| {
                    replica.current_dir == target_dir && replica.future_dir.is_none()
                })
                .unwrap_or(false)
        }
        TaskType::Leader => match cluster.partition(partition) {
            Some(state) => state.leader.is_some() && state.leader == proposal.new_leader(),
            None => false,
        },
    }
}

/// Returns why the task must be declared dead, or `None` if it may still
/// finish. Only `InProgress`/`Aborting` tasks are evaluated.
///
/// - Leader: the target leader's broker left the cluster, or the transfer
///   outlived `leader_timeout_ms`.
/// - Inter-broker: a target replica's broker left the cluster, or the
///   submission was rejected with an invalid-replica-assignment error.
/// - Intra-broker: the target directory vanished from the broker's reported
///   log dirs.
pub(crate) async fn dead_reason(
    cluster: &ClusterView,
    logdirs: &HashMap<BrokerId, LogDirReport>,
    task: &MoveTask,
    receipt: Option<&dyn SubmissionReceipt>,
    leader_timeout_ms: i64,
    now_ms: i64,
) -> Option<String> {
    if !task.in_execution() {
        return None;
    }
    let proposal = task.proposal();
    match task.task_type() {
        TaskType::Leader => {
            if let Some(leader) = proposal.new_leader() {
                if !cluster.has_broker(leader) {
                    return Some(format!("target leader {leader} is down"));
                }
            }
            match task.started_at_ms() {
                Some(started) if now_ms - started > leader_timeout_ms => Some(format!(
                    "leadership transfer took longer than {leader_timeout_ms} ms"
                )),
                _ => None,
            }
        }
        TaskType::InterBrokerReplica => {
            for broker in proposal.new_brokers() {
                if !cluster.has_broker(broker) {
                    return Some(format!("new replica {broker} is down"));
                }
            }
            if let Some(receipt) = receipt {
                let error = receipt
                    .error_for(proposal.partition(), FUTURE_ERROR_VERIFICATION_TIMEOUT)
                    .await;
                if matches!(error, Some(SubmissionError::InvalidReplicaAssignment)) {
                    return Some("reassignment rejected: invalid replica assignment".to_string());
                }
            }
            None
        }
        TaskType::IntraBrokerReplica => {
            let broker = task.broker()?;
            let target_dir = proposal.dir_moves().get(&broker).cloned()?;
            let dir_alive = logdirs
                .get(&broker)
                .map(|report| report.dirs.iter().any(|d| *d == target_dir))
                .unwrap_or(false);
            if dir_alive {
                None
            } else {
                Some(format!("destination dir {target_dir} on broker {broker} is down"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cluster::{PartitionState, ReplicaDirState};
    use crate::tasks::{PartitionId, Proposal, ReplicaPlacement};

    fn inter_task(old: Vec<BrokerId>, new: Vec<BrokerId>) -> MoveTask {
        let proposal = Arc::new(Proposal::new(
            ("t", 0),
            old.into_iter().map(ReplicaPlacement::on).collect(),
            new.into_iter().map(ReplicaPlacement::on).collect(),
            10,
        ));
        let mut task = MoveTask::new(1, TaskType::InterBrokerReplica, proposal, None);
        task.mark_in_progress(0).unwrap();
        task
    }

    fn view(replicas: Vec<BrokerId>, isr: Vec<BrokerId>, leader: BrokerId) -> ClusterView {
        let mut view = ClusterView::default();
        view.brokers.extend(replicas.iter().copied());
        view.partitions.insert(
            PartitionId::new("t", 0),
            PartitionState {
                replicas,
                isr,
                leader: Some(leader),
            },
        );
        view
    }

    #[test]
    fn inter_done_ignores_replica_order() {
        let task = inter_task(vec![1, 2, 3], vec![1, 2, 4]);
        let done = view(vec![4, 2, 1], vec![4, 2, 1], 1);
        assert!(is_task_done(&done, &HashMap::new(), &task));

        let not_done = view(vec![1, 2, 3], vec![1, 2, 3], 1);
        assert!(!is_task_done(&not_done, &HashMap::new(), &task));
    }

    #[test]
    fn intra_done_requires_target_dir_and_no_future_move() {
        let proposal = Arc::new(Proposal::new(
            ("t", 0),
            vec![ReplicaPlacement::in_dir(1, "/a")],
            vec![ReplicaPlacement::in_dir(1, "/b")],
            10,
        ));
        let mut task = MoveTask::new(2, TaskType::IntraBrokerReplica, proposal, Some(1));
        task.mark_in_progress(0).unwrap();

        let mut report = LogDirReport {
            dirs: vec!["/a".into(), "/b".into()],
            replicas: HashMap::new(),
        };
        report.replicas.insert(
            PartitionId::new("t", 0),
            ReplicaDirState {
                current_dir: "/b".into(),
                future_dir: None,
            },
        );
        let logdirs = HashMap::from([(1, report.clone())]);
        assert!(is_task_done(&ClusterView::default(), &logdirs, &task));

        report
            .replicas
            .get_mut(&PartitionId::new("t", 0))
            .unwrap()
            .future_dir = Some("/c".into());
        let logdirs = HashMap::from([(1, report)]);
        assert!(!is_task_done(&ClusterView::default(), &logdirs, &task));
    }

    #[tokio::test]
    async fn inter_task_dies_when_new_replica_broker_leaves() {
        let task = inter_task(vec![1, 2, 3], vec![1, 2, 4]);
        let mut cluster = view(vec![1, 2, 3], vec![1, 2, 3], 1);
        cluster.brokers.remove(&4);

        let reason = dead_reason(&cluster, &HashMap::new(), &task, None, 60_000, 1_000).await;
        assert!(reason.unwrap().contains("new replica 4"));
    }

    #[tokio::test]
    async fn leader_task_dies_on_timeout() {
        let proposal = Arc::new(Proposal::new(
            ("t", 0),
            vec![ReplicaPlacement::on(1), ReplicaPlacement::on(2)],
            vec![ReplicaPlacement::on(2), ReplicaPlacement::on(1)],
            10,
        ));
        let mut task = MoveTask::new(3, TaskType::Leader, proposal, None);
        task.mark_in_progress(0).unwrap();
        let cluster = view(vec![1, 2], vec![1, 2], 1);

        let alive = dead_reason(&cluster, &HashMap::new(), &task, None, 60_000, 60_000).await;
        assert!(alive.is_none());
        let expired = dead_reason(&cluster, &HashMap::new(), &task, None, 60_000, 60_001).await;
        assert!(expired.unwrap().contains("longer than"));
    }
}
