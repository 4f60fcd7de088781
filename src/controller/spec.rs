//! # Batch specification.
//!
//! [`BatchSpec`] bundles everything one execution batch needs besides the
//! uuid and the load monitor: the proposals themselves, per-batch cap and
//! interval overrides, the emission-order strategy, and the admission flags.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::tasks::{BrokerId, OfflineFirst, OrderingStrategy, Proposal};

/// Specification of one execution batch.
#[derive(Clone)]
pub struct BatchSpec {
    /// Proposals to execute.
    pub proposals: Vec<Proposal>,
    /// Brokers exempt from concurrency-cap checks for this batch.
    pub exempt_brokers: HashSet<BrokerId>,
    /// Brokers being removed by this batch; stamped into removal history.
    pub removed_brokers: Vec<BrokerId>,
    /// Inter-broker cap override (`None` uses the configured default).
    pub inter_broker_cap: Option<usize>,
    /// Intra-broker cap override (`None` uses the configured default).
    pub intra_broker_cap: Option<usize>,
    /// Leadership cap override (`None` uses the configured default).
    pub leader_cap: Option<usize>,
    /// Progress-interval override (`None` uses the configured default).
    /// Subject to the 5 s floor.
    pub progress_check_interval: Option<Duration>,
    /// Emission-order strategy for materialized tasks.
    pub strategy: Arc<dyn OrderingStrategy>,
    /// Whether the batch comes from a user request (vs. self-healing).
    pub triggered_by_user: bool,
    /// Full-assigner mode; informational, reported via metrics.
    pub assigner_mode: bool,
    /// Opt out of automatic concurrency adjustment for this batch.
    pub skip_auto_concurrency: bool,
}

impl BatchSpec {
    /// Spec with defaults: no overrides, [`OfflineFirst`] ordering,
    /// self-healing trigger.
    pub fn new(proposals: Vec<Proposal>) -> Self {
        Self {
            proposals,
            exempt_brokers: HashSet::new(),
            removed_brokers: Vec::new(),
            inter_broker_cap: None,
            intra_broker_cap: None,
            leader_cap: None,
            progress_check_interval: None,
            strategy: Arc::new(OfflineFirst),
            triggered_by_user: false,
            assigner_mode: false,
            skip_auto_concurrency: false,
        }
    }

    /// Exempts brokers from cap checks.
    pub fn with_exempt_brokers(mut self, brokers: impl IntoIterator<Item = BrokerId>) -> Self {
        self.exempt_brokers = brokers.into_iter().collect();
        self
    }

    /// Declares brokers removed by this batch.
    pub fn with_removed_brokers(mut self, brokers: impl IntoIterator<Item = BrokerId>) -> Self {
        self.removed_brokers = brokers.into_iter().collect();
        self
    }

    /// Overrides the inter-broker movement cap.
    pub fn with_inter_broker_cap(mut self, cap: usize) -> Self {
        self.inter_broker_cap = Some(cap);
        self
    }

    /// Overrides the intra-broker movement cap.
    pub fn with_intra_broker_cap(mut self, cap: usize) -> Self {
        self.intra_broker_cap = Some(cap);
        self
    }

    /// Overrides the global leadership movement cap.
    pub fn with_leader_cap(mut self, cap: usize) -> Self {
        self.leader_cap = Some(cap);
        self
    }

    /// Overrides the progress-check interval for this batch.
    pub fn with_progress_check_interval(mut self, interval: Duration) -> Self {
        self.progress_check_interval = Some(interval);
        self
    }

    /// Replaces the emission-order strategy.
    pub fn with_strategy(mut self, strategy: Arc<dyn OrderingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Marks the batch as user-triggered.
    pub fn by_user(mut self) -> Self {
        self.triggered_by_user = true;
        self
    }

    /// Marks the batch as running in full-assigner mode.
    pub fn in_assigner_mode(mut self) -> Self {
        self.assigner_mode = true;
        self
    }
}
