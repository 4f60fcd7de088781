//! # Broker demotion/removal history.
//!
//! Two maps of `broker id → operation start time`, one for demotions and one
//! for removals. Entries expire after a configured retention, swept by a
//! background task; the sentinel start time `0` marks an entry permanent so
//! the sweeper never drops it.
//!
//! History is in-memory only and resets on restart.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::tasks::BrokerId;
use crate::time::Clock;

/// Start-time sentinel: the entry never expires.
const PERMANENT_TIMESTAMP: i64 = 0;

/// One retention-bounded map of `broker id → operation start time`.
pub struct HistoryMap {
    entries: DashMap<BrokerId, i64>,
    retention_ms: i64,
    clock: Arc<dyn Clock>,
}

impl HistoryMap {
    fn new(retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            retention_ms: retention.as_millis() as i64,
            clock,
        }
    }

    /// Stamps the operation start for a broker, unless the broker is already
    /// marked permanent (permanence is never overwritten).
    pub fn note_start(&self, broker: BrokerId) {
        let now_ms = self.clock.now_ms();
        self.entries
            .entry(broker)
            .and_modify(|start| {
                if *start != PERMANENT_TIMESTAMP {
                    *start = now_ms;
                }
            })
            .or_insert(now_ms);
    }

    /// Marks brokers permanent: they stay until explicitly dropped.
    pub fn mark_permanent(&self, brokers: &[BrokerId]) {
        for broker in brokers {
            self.entries.insert(*broker, PERMANENT_TIMESTAMP);
        }
    }

    /// Removes brokers. Returns true if any entry was removed.
    pub fn drop_brokers(&self, brokers: &[BrokerId]) -> bool {
        let mut removed = false;
        for broker in brokers {
            removed |= self.entries.remove(broker).is_some();
        }
        removed
    }

    /// Sorted ids currently in the map.
    pub fn brokers(&self) -> Vec<BrokerId> {
        let mut ids: Vec<BrokerId> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Removes entries older than the retention, keeping permanent ones.
    pub fn sweep(&self) {
        let now_ms = self.clock.now_ms();
        self.entries
            .retain(|_, start| *start == PERMANENT_TIMESTAMP || *start + self.retention_ms >= now_ms);
    }
}

/// Demotion and removal history of the cluster's brokers.
pub struct BrokerHistory {
    /// Brokers for which a demotion was started.
    pub demotion: HistoryMap,
    /// Brokers for which a removal was started.
    pub removal: HistoryMap,
}

impl BrokerHistory {
    pub(crate) fn new(
        demotion_retention: Duration,
        removal_retention: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            demotion: HistoryMap::new(demotion_retention, Arc::clone(&clock)),
            removal: HistoryMap::new(removal_retention, clock),
        }
    }

    /// Spawns the periodic sweeper for both maps.
    pub(crate) fn spawn_sweeper(self: &Arc<Self>, interval: Duration, token: CancellationToken) {
        let history = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::debug!("sweeping expired broker history");
                        history.demotion.sweep();
                        history.removal.sweep();
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn map(retention_ms: i64, clock: &ManualClock) -> HistoryMap {
        HistoryMap::new(
            Duration::from_millis(retention_ms as u64),
            Arc::new(clock.clone()),
        )
    }

    #[test]
    fn sweep_honors_retention_boundary() {
        let clock = ManualClock::at(10_000);
        let map = map(1_000, &clock);
        map.note_start(1);

        // Exactly at the boundary the entry survives; one past it it expires.
        clock.advance_ms(1_000);
        map.sweep();
        assert_eq!(map.brokers(), vec![1]);

        clock.advance_ms(1);
        map.sweep();
        assert!(map.brokers().is_empty());
    }

    #[test]
    fn permanent_entries_survive_sweep_and_restamp() {
        let clock = ManualClock::at(10_000);
        let map = map(1_000, &clock);
        map.mark_permanent(&[7]);

        // note_start must not demote a permanent entry to an expiring one.
        map.note_start(7);
        clock.advance_ms(1_000_000);
        map.sweep();
        assert_eq!(map.brokers(), vec![7]);

        assert!(map.drop_brokers(&[7]));
        assert!(map.brokers().is_empty());
    }

    #[test]
    fn note_start_refreshes_existing_entry() {
        let clock = ManualClock::at(5_000);
        let map = map(1_000, &clock);
        map.note_start(3);
        clock.advance_ms(900);
        map.note_start(3);

        // The refreshed stamp keeps the broker past the original expiry.
        clock.advance_ms(900);
        map.sweep();
        assert_eq!(map.brokers(), vec![3]);
    }
}
