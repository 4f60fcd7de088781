//! # Load-monitor contract.
//!
//! The load monitor samples cluster metrics on its own schedule. The
//! controller interacts with it in two ways: it narrows sampling to broker
//! metrics for the duration of an execution (partition metrics would be
//! skewed by the movements), and the concurrency adjuster reads live broker
//! loads from it.

use std::collections::HashMap;

use crate::tasks::BrokerId;

/// What the load monitor samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Partition and broker metrics (steady-state mode).
    All,
    /// Broker metrics only (while an execution is in progress).
    BrokerMetricsOnly,
}

/// Most recent load sample for one broker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrokerLoad {
    /// CPU utilization in percent of total capacity.
    pub cpu_utilization_pct: f64,
    /// Mean request-queue wait time in milliseconds.
    pub request_queue_time_ms: f64,
}

/// Load-monitor operations used by the controller.
pub trait LoadMonitor: Send + Sync + 'static {
    /// Latest load sample per live broker.
    fn current_broker_loads(&self) -> HashMap<BrokerId, BrokerLoad>;

    /// Current sampling mode.
    fn sampling_mode(&self) -> SamplingMode;

    /// Switches what the monitor samples.
    fn set_sampling_mode(&self, mode: SamplingMode);

    /// Pauses sampling. Fails while the monitor is mid-transition; callers
    /// retry at the progress-check cadence.
    fn pause_sampling(&self, reason: &str, force: bool) -> anyhow::Result<()>;

    /// Resumes a paused monitor.
    fn resume_sampling(&self, reason: &str);
}
