//! # Execution proposals.
//!
//! A proposal is the immutable input unit: the current and target replica
//! placement of one partition, plus an estimate of the data involved. The
//! derived facts the tracker and the supervision loop need (brokers added,
//! brokers removed, directory moves) are computed here from the two
//! placement lists.

use std::collections::HashMap;
use std::fmt;

/// Broker identifier as assigned by the cluster.
pub type BrokerId = i32;

/// Identity of one partition: `(topic, index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId {
    pub topic: String,
    pub partition: i32,
}

impl PartitionId {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

impl From<(&str, i32)> for PartitionId {
    fn from((topic, partition): (&str, i32)) -> Self {
        PartitionId::new(topic, partition)
    }
}

/// Placement of one replica: a broker, and optionally a log directory on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaPlacement {
    pub broker: BrokerId,
    /// Target log directory; `None` leaves the directory to the broker.
    pub log_dir: Option<String>,
}

impl ReplicaPlacement {
    /// Placement on a broker with no directory preference.
    pub fn on(broker: BrokerId) -> Self {
        Self {
            broker,
            log_dir: None,
        }
    }

    /// Placement pinned to a specific log directory.
    pub fn in_dir(broker: BrokerId, dir: impl Into<String>) -> Self {
        Self {
            broker,
            log_dir: Some(dir.into()),
        }
    }
}

/// Desired placement and leadership for one partition.
///
/// Replica lists are ordered: the first entry of `old_replicas` is the
/// partition's leader at proposal time, the first entry of `new_replicas` is
/// the target preferred leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    partition: PartitionId,
    old_replicas: Vec<ReplicaPlacement>,
    new_replicas: Vec<ReplicaPlacement>,
    data_size_mb: u64,
}

impl Proposal {
    pub fn new(
        partition: impl Into<PartitionId>,
        old_replicas: Vec<ReplicaPlacement>,
        new_replicas: Vec<ReplicaPlacement>,
        data_size_mb: u64,
    ) -> Self {
        Self {
            partition: partition.into(),
            old_replicas,
            new_replicas,
            data_size_mb,
        }
    }

    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    pub fn old_replicas(&self) -> &[ReplicaPlacement] {
        &self.old_replicas
    }

    pub fn new_replicas(&self) -> &[ReplicaPlacement] {
        &self.new_replicas
    }

    /// Estimated amount of data the partition carries, in MB.
    pub fn data_size_mb(&self) -> u64 {
        self.data_size_mb
    }

    /// Leader at proposal time (first old replica).
    pub fn old_leader(&self) -> Option<BrokerId> {
        self.old_replicas.first().map(|r| r.broker)
    }

    /// Target preferred leader (first new replica).
    pub fn new_leader(&self) -> Option<BrokerId> {
        self.new_replicas.first().map(|r| r.broker)
    }

    /// Brokers hosting the partition before execution, in placement order.
    pub fn old_brokers(&self) -> Vec<BrokerId> {
        self.old_replicas.iter().map(|r| r.broker).collect()
    }

    /// Brokers hosting the partition after execution, in placement order.
    pub fn new_brokers(&self) -> Vec<BrokerId> {
        self.new_replicas.iter().map(|r| r.broker).collect()
    }

    /// Brokers that gain a replica (`new − old`).
    pub fn replicas_to_add(&self) -> Vec<BrokerId> {
        self.new_replicas
            .iter()
            .map(|r| r.broker)
            .filter(|b| !self.old_replicas.iter().any(|o| o.broker == *b))
            .collect()
    }

    /// Brokers that lose their replica (`old − new`).
    pub fn replicas_to_remove(&self) -> Vec<BrokerId> {
        self.old_replicas
            .iter()
            .map(|r| r.broker)
            .filter(|b| !self.new_replicas.iter().any(|n| n.broker == *b))
            .collect()
    }

    /// True if any replica is added or removed across brokers.
    ///
    /// Leadership is judged against live metadata at task-materialization
    /// time, so there is no proposal-level leader-action predicate here.
    pub fn has_replica_action(&self) -> bool {
        !self.replicas_to_add().is_empty() || !self.replicas_to_remove().is_empty()
    }

    /// Directory moves on brokers that keep their replica: `broker → target
    /// dir`, for every placement whose target directory is set and differs
    /// from the current one.
    pub fn dir_moves(&self) -> HashMap<BrokerId, String> {
        let mut moves = HashMap::new();
        for new in &self.new_replicas {
            let Some(target_dir) = new.log_dir.as_deref() else {
                continue;
            };
            let Some(old) = self.old_replicas.iter().find(|o| o.broker == new.broker) else {
                continue;
            };
            if old.log_dir.as_deref() != Some(target_dir) {
                moves.insert(new.broker, target_dir.to_string());
            }
        }
        moves
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:?} -> {:?} ({} MB)",
            self.partition,
            self.old_brokers(),
            self.new_brokers(),
            self.data_size_mb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(old: Vec<BrokerId>, new: Vec<BrokerId>) -> Proposal {
        Proposal::new(
            ("t", 0),
            old.into_iter().map(ReplicaPlacement::on).collect(),
            new.into_iter().map(ReplicaPlacement::on).collect(),
            100,
        )
    }

    #[test]
    fn replica_deltas_are_broker_set_differences() {
        let p = proposal(vec![1, 2, 3], vec![1, 2, 4]);
        assert_eq!(p.replicas_to_add(), vec![4]);
        assert_eq!(p.replicas_to_remove(), vec![3]);
        assert!(p.has_replica_action());
    }

    #[test]
    fn identical_broker_lists_have_no_replica_action() {
        let p = proposal(vec![2, 1, 3], vec![2, 1, 3]);
        assert!(!p.has_replica_action());
        assert_eq!(p.old_leader(), Some(2));
    }

    #[test]
    fn dir_moves_cover_only_brokers_kept_in_both_placements() {
        let p = Proposal::new(
            ("t", 1),
            vec![
                ReplicaPlacement::in_dir(1, "/d1"),
                ReplicaPlacement::on(2),
                ReplicaPlacement::on(3),
            ],
            vec![
                ReplicaPlacement::in_dir(1, "/d2"),
                ReplicaPlacement::in_dir(4, "/d9"),
                ReplicaPlacement::on(3),
            ],
            100,
        );
        let moves = p.dir_moves();
        // Broker 4 is newly added: its directory is set by the reassignment,
        // not by an intra-broker move.
        assert_eq!(moves.len(), 1);
        assert_eq!(moves.get(&1).map(String::as_str), Some("/d2"));
    }
}
