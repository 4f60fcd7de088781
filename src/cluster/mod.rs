//! # Cluster access contracts.
//!
//! The controller never talks wire protocols itself; it drives the cluster
//! through a small set of traits that an embedding application implements
//! against its admin client, metadata client, and coordination store. Tests
//! implement them against an in-memory cluster.
//!
//! | Trait | Concern |
//! |---|---|
//! | [`AdminApi`] | replica reassignments, directory moves, log-dir inspection |
//! | [`MetadataClient`] | refreshed view of brokers, partitions, replicas, leaders |
//! | [`CoordinationStore`] | preferred-leader elections, force-stop intervention |
//! | [`LoadMonitor`] | live broker load and sampling-mode control |
//! | [`ThrottleHelper`] | per-topic replication bandwidth caps |
//! | [`AnomalyDetector`] / [`UserTaskManager`] | start/finish hooks |

mod admin;
mod coordination;
mod hooks;
mod metadata;
mod monitor;
mod throttle;
mod view;

use std::sync::Arc;

pub use admin::{
    AdminApi, DirMoveRequest, LogDirReport, ReassignmentRequest, ReplicaDirState, SubmissionError,
    SubmissionReceipt,
};
pub use coordination::CoordinationStore;
pub use hooks::{AnomalyDetector, UserTaskManager};
pub use metadata::MetadataClient;
pub use monitor::{BrokerLoad, LoadMonitor, SamplingMode};
pub use throttle::ThrottleHelper;
pub use view::{ClusterView, PartitionState};

/// Bundle of the cluster-side collaborators handed to the controller at
/// construction.
#[derive(Clone)]
pub struct ClusterClients {
    /// Admin API for replica reassignments and log-dir operations.
    pub admin: Arc<dyn AdminApi>,
    /// Source of refreshed cluster views.
    pub metadata: Arc<dyn MetadataClient>,
    /// Coordination store for leader elections and the force-stop path.
    pub coordination: Arc<dyn CoordinationStore>,
    /// Replication throttle manager for inter-broker moves.
    pub throttle: Arc<dyn ThrottleHelper>,
    /// Anomaly-detector hooks for self-healing executions.
    pub anomaly: Arc<dyn AnomalyDetector>,
}
