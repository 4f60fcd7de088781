//! # movevisor
//!
//! **Movevisor** is the execution controller of a cluster-rebalancing tool
//! for partitioned, replicated log clusters.
//!
//! Given a batch of [`Proposal`]s, each describing the desired replica
//! placement and/or preferred leader of one partition, the controller drives
//! the cluster from its current state to the target state: it issues partition
//! reassignments, on-broker directory moves, and leadership transfers, while
//! enforcing per-broker concurrency caps, detecting stalled or impossible
//! tasks, and supporting cooperative or forced cancellation.
//!
//! ## Features
//!
//! | Area               | Description                                                             | Key types / traits                          |
//! |--------------------|-------------------------------------------------------------------------|---------------------------------------------|
//! | **Facade**         | Thread-safe batch lifecycle: propose, execute, stop, shutdown.           | [`Controller`], [`BatchSpec`]               |
//! | **Supervision**    | Three-phase execution loop with progress polling and rollback.           | [`Phase`], [`ExecutorStatus`]               |
//! | **Tasks**          | Immutable proposals and the per-task state machine.                      | [`Proposal`], [`TaskType`], [`TaskState`]   |
//! | **Concurrency**    | Per-broker/global caps plus an AIMD adjuster fed by broker metrics.      | [`Watermarks`], [`recommended_concurrency`] |
//! | **History**        | Recently demoted/removed brokers with retention and permanent markers.   | [`BrokerHistory`]                           |
//! | **Cluster access** | Contracts for the admin API, metadata, coordination store, load monitor. | [`AdminApi`], [`MetadataClient`], [`LoadMonitor`] |
//! | **Observability**  | Lifecycle events fanned out to pluggable subscribers.                    | [`Subscribe`], [`Event`], [`EventKind`]     |
//!
//! ```
//! use movevisor::{BatchSpec, ExecutorConfig, Proposal, ReplicaPlacement};
//!
//! let mut cfg = ExecutorConfig::default();
//! cfg.inter_broker_cap = 5;
//!
//! // Move partition t-0 from brokers [1, 2, 3] to [1, 2, 4].
//! let proposal = Proposal::new(
//!     ("t", 0),
//!     vec![ReplicaPlacement::on(1), ReplicaPlacement::on(2), ReplicaPlacement::on(3)],
//!     vec![ReplicaPlacement::on(1), ReplicaPlacement::on(2), ReplicaPlacement::on(4)],
//!     1024,
//! );
//!
//! let spec = BatchSpec::new(vec![proposal]);
//! assert_eq!(spec.proposals.len(), 1);
//! ```
//!
//! A batch runs through the facade in two steps: `begin_proposing(uuid, …)`
//! reserves the controller while an external optimizer produces proposals,
//! then `execute(spec, monitor, uuid)` admits the batch and hands it to the
//! supervision worker. See [`Controller`] for the full lifecycle.
//!
//! ---

mod adjuster;
mod cluster;
mod config;
mod controller;
mod core;
mod error;
mod events;
mod history;
mod metrics;
mod snapshot;
mod subscribers;
mod tasks;
mod time;
mod tracker;

// ---- Public re-exports ----

pub use adjuster::{recommended_concurrency, Watermarks};
pub use cluster::{
    AdminApi, AnomalyDetector, BrokerLoad, ClusterClients, ClusterView, CoordinationStore,
    DirMoveRequest, LoadMonitor, LogDirReport, MetadataClient, PartitionState,
    ReassignmentRequest, ReplicaDirState, SamplingMode, SubmissionError, SubmissionReceipt,
    ThrottleHelper, UserTaskManager,
};
pub use config::{
    ExecutorConfig, FUTURE_ERROR_VERIFICATION_TIMEOUT, MIN_PROGRESS_CHECK_INTERVAL,
    SLOW_TASK_ALERT_BACKOFF,
};
pub use controller::{BatchSpec, Controller, ReasonProvider};
pub use error::ExecutionError;
pub use events::{Event, EventKind};
pub use history::BrokerHistory;
pub use metrics::ExecutorMetrics;
pub use snapshot::{ExecutorStatus, Phase, StopSignal, TaskCounts};
pub use subscribers::{LogWriter, Subscribe};
pub use tasks::{
    BrokerId, InvalidTransition, MoveTask, OfflineFirst, OrderingStrategy, PartitionId, Proposal,
    ReplicaPlacement, TaskState, TaskType,
};
pub use time::{Clock, ManualClock, SystemClock};
