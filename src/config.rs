//! # Executor configuration.
//!
//! [`ExecutorConfig`] centralizes the tunables of the execution controller:
//! poll cadence, task deadlines, default concurrency caps, history retention,
//! and the adaptive-concurrency (AIMD) settings.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use movevisor::ExecutorConfig;
//!
//! let mut cfg = ExecutorConfig::default();
//! cfg.progress_check_interval = Duration::from_secs(10);
//! cfg.inter_broker_cap = 5;
//!
//! assert_eq!(cfg.inter_broker_cap, 5);
//! ```

use std::time::Duration;

use crate::adjuster::Watermarks;

/// Hard floor for the progress-check interval. Setters reject anything lower.
pub const MIN_PROGRESS_CHECK_INTERVAL: Duration = Duration::from_millis(5_000);

/// Minimum gap between two slow-task alerts from one executor.
pub const SLOW_TASK_ALERT_BACKOFF: Duration = Duration::from_millis(60_000);

/// How long a submission-receipt probe may block while classifying a
/// rejected reassignment.
pub const FUTURE_ERROR_VERIFICATION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration for the execution controller.
///
/// Controls poll cadence, deadlines, default concurrency caps, broker-history
/// retention, and AIMD behavior.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Interval between progress checks of an initiated execution.
    /// Clamped from below by [`MIN_PROGRESS_CHECK_INTERVAL`].
    pub progress_check_interval: Duration,
    /// A leadership transfer still unfinished after this long is declared dead.
    pub leader_movement_timeout: Duration,
    /// How long a broker stays in the recently-demoted set.
    pub demotion_history_retention: Duration,
    /// How long a broker stays in the recently-removed set.
    pub removal_history_retention: Duration,
    /// Cadence of the background history sweeper.
    pub history_sweep_interval: Duration,
    /// Default number of concurrent inter-broker replica movements per broker.
    pub inter_broker_cap: usize,
    /// Default number of concurrent intra-broker replica movements per broker.
    pub intra_broker_cap: usize,
    /// Default number of concurrent leadership movements (global).
    pub leader_cap: usize,
    /// Whether the inter-broker concurrency adjuster starts enabled.
    pub concurrency_adjuster_enabled: bool,
    /// Cadence of the concurrency adjuster.
    pub concurrency_adjuster_interval: Duration,
    /// Hard ceiling for the adjuster's additive increase.
    pub max_inter_broker_moves_per_broker: usize,
    /// Broker-load watermarks driving AIMD decisions.
    pub watermarks: Watermarks,
    /// An in-progress task older than this is reported as slow.
    pub slow_task_alerting_threshold: Duration,
    /// Re-submit inter-broker reassignments the cluster controller dropped in
    /// a race. May be unnecessary on newer brokers; keep on unless verified.
    pub reexecute_inter_broker_enabled: bool,
    /// Whether the coordination store connection uses authenticated ACLs.
    pub zookeeper_security_enabled: bool,
}

impl Default for ExecutorConfig {
    /// Provides a default configuration:
    /// - `progress_check_interval = 10s`
    /// - `leader_movement_timeout = 180s`
    /// - `demotion/removal_history_retention = 14 days`
    /// - `history_sweep_interval = 5s`
    /// - caps: inter `5` per broker, intra `2` per broker, leader `1000` global
    /// - adjuster: disabled, `30s` interval, ceiling `12` moves per broker
    /// - `slow_task_alerting_threshold = 90s`
    fn default() -> Self {
        Self {
            progress_check_interval: Duration::from_secs(10),
            leader_movement_timeout: Duration::from_secs(180),
            demotion_history_retention: Duration::from_secs(14 * 24 * 3600),
            removal_history_retention: Duration::from_secs(14 * 24 * 3600),
            history_sweep_interval: Duration::from_secs(5),
            inter_broker_cap: 5,
            intra_broker_cap: 2,
            leader_cap: 1000,
            concurrency_adjuster_enabled: false,
            concurrency_adjuster_interval: Duration::from_secs(30),
            max_inter_broker_moves_per_broker: 12,
            watermarks: Watermarks::default(),
            slow_task_alerting_threshold: Duration::from_secs(90),
            reexecute_inter_broker_enabled: true,
            zookeeper_security_enabled: false,
        }
    }
}
