//! # Adaptive inter-broker concurrency (AIMD).
//!
//! A periodic feedback controller tunes the inter-broker movement cap from
//! live broker metrics: halve the cap as soon as **any** broker crosses a
//! high watermark, add one when **all** brokers sit below the low watermarks,
//! otherwise leave it alone. Classic additive-increase/multiplicative-decrease
//! with a hard ceiling.
//!
//! The adjuster only acts while the executor is in the inter-broker phase,
//! never for demote operations (they disable auto-adjustment for the batch),
//! and only once a load monitor was handed over at admission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cluster::{BrokerLoad, LoadMonitor};
use crate::snapshot::{ExecutorStatus, Phase};
use crate::tasks::BrokerId;
use crate::tracker::ConcurrencyCaps;

/// Broker-load thresholds driving AIMD decisions.
///
/// Operator tunables: crossing any `*_high` value on any broker halves the
/// cap; staying below every `*_low` value on all brokers raises it by one.
/// Keep a comfortable band between low and high, or the cap will oscillate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Watermarks {
    /// CPU utilization above which a broker is considered overloaded (%).
    pub cpu_high_pct: f64,
    /// CPU utilization below which a broker has headroom (%).
    pub cpu_low_pct: f64,
    /// Request-queue time above which a broker is considered overloaded (ms).
    pub queue_high_ms: f64,
    /// Request-queue time below which a broker has headroom (ms).
    pub queue_low_ms: f64,
}

impl Default for Watermarks {
    /// Defaults: CPU 90% / 40%, request-queue time 1000 ms / 100 ms.
    fn default() -> Self {
        Self {
            cpu_high_pct: 90.0,
            cpu_low_pct: 40.0,
            queue_high_ms: 1_000.0,
            queue_low_ms: 100.0,
        }
    }
}

/// Computes the recommended inter-broker cap from live broker loads.
///
/// - **Multiplicative decrease**: any broker over a high watermark →
///   `max(1, current / 2)`.
/// - **Additive increase**: all brokers under every low watermark →
///   `min(max_per_broker, current + 1)`.
/// - Otherwise, or when nothing would change: `None` (no recommendation).
pub fn recommended_concurrency(
    loads: &HashMap<BrokerId, BrokerLoad>,
    current: usize,
    max_per_broker: usize,
    watermarks: &Watermarks,
) -> Option<usize> {
    if loads.is_empty() {
        return None;
    }

    let any_high = loads.values().any(|l| {
        l.cpu_utilization_pct > watermarks.cpu_high_pct
            || l.request_queue_time_ms > watermarks.queue_high_ms
    });
    let recommended = if any_high {
        (current / 2).max(1)
    } else {
        let all_low = loads.values().all(|l| {
            l.cpu_utilization_pct < watermarks.cpu_low_pct
                && l.request_queue_time_ms < watermarks.queue_low_ms
        });
        if !all_low {
            return None;
        }
        (current + 1).min(max_per_broker)
    };

    (recommended != current).then_some(recommended)
}

/// Periodic AIMD controller for the inter-broker movement cap.
pub(crate) struct ConcurrencyAdjuster {
    caps: Arc<ConcurrencyCaps>,
    watermarks: Watermarks,
    max_per_broker: usize,
    enabled: AtomicBool,
    /// Set for batches that opt out (demote operations).
    skip_auto: Arc<AtomicBool>,
    monitor: RwLock<Option<Arc<dyn LoadMonitor>>>,
    status_rx: watch::Receiver<Arc<ExecutorStatus>>,
}

impl ConcurrencyAdjuster {
    pub fn new(
        caps: Arc<ConcurrencyCaps>,
        watermarks: Watermarks,
        max_per_broker: usize,
        enabled: bool,
        skip_auto: Arc<AtomicBool>,
        status_rx: watch::Receiver<Arc<ExecutorStatus>>,
    ) -> Self {
        Self {
            caps,
            watermarks,
            max_per_broker,
            enabled: AtomicBool::new(enabled),
            skip_auto,
            monitor: RwLock::new(None),
            status_rx,
        }
    }

    /// Hands over the load monitor and the initially requested cap at batch
    /// admission.
    pub fn init_adjustment(&self, monitor: Arc<dyn LoadMonitor>, requested_cap: Option<usize>) {
        *self.monitor.write().expect("monitor lock") = Some(monitor);
        if let Some(cap) = requested_cap {
            self.caps.set_inter_broker(cap);
        }
    }

    /// Enables or disables the adjuster; returns the previous setting.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::Relaxed)
    }

    fn can_refresh(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
            && !self.skip_auto.load(Ordering::Relaxed)
            && self.status_rx.borrow().phase == Phase::InterBroker
            && self.monitor.read().expect("monitor lock").is_some()
    }

    fn refresh(&self) {
        if !self.can_refresh() {
            return;
        }
        let monitor = {
            let guard = self.monitor.read().expect("monitor lock");
            guard.as_ref().cloned()
        };
        let Some(monitor) = monitor else { return };

        let loads = monitor.current_broker_loads();
        let current = self.caps.inter_broker();
        if let Some(cap) =
            recommended_concurrency(&loads, current, self.max_per_broker, &self.watermarks)
        {
            tracing::info!(from = current, to = cap, "adjusting inter-broker movement cap");
            self.caps.set_inter_broker(cap);
        }
    }

    /// Spawns the periodic adjustment loop.
    pub fn spawn(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.refresh(),
                }
            }
        });
    }
}
