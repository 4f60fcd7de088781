//! # Shared session flags.
//!
//! The facade and the supervision worker communicate through this small set
//! of atomics: the stop ladder, the ongoing-execution flag, the execution
//! mode, and the requested progress interval. Everything here is single-word
//! state; task state never lives in the session.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::config::MIN_PROGRESS_CHECK_INTERVAL;
use crate::error::ExecutionError;
use crate::snapshot::StopSignal;

/// Callable producing a fresh human-readable reason for the current batch.
pub type ReasonProvider = Arc<dyn Fn() -> String + Send + Sync>;

struct BatchIdentity {
    uuid: String,
    reason: ReasonProvider,
    triggered_by_user: bool,
}

/// Process-wide execution session state.
pub(crate) struct Session {
    default_progress_interval: Duration,
    stop_signal: AtomicU8,
    has_ongoing: AtomicBool,
    stopped_by_user: AtomicBool,
    assigner_mode: AtomicBool,
    /// Shared with the concurrency adjuster; set for demote batches.
    skip_auto_concurrency: Arc<AtomicBool>,
    requested_progress_interval: RwLock<Option<Duration>>,
    batch: Mutex<Option<BatchIdentity>>,
}

impl Session {
    pub fn new(default_progress_interval: Duration) -> Self {
        Self {
            default_progress_interval,
            stop_signal: AtomicU8::new(StopSignal::None.as_u8()),
            has_ongoing: AtomicBool::new(false),
            stopped_by_user: AtomicBool::new(false),
            assigner_mode: AtomicBool::new(false),
            skip_auto_concurrency: Arc::new(AtomicBool::new(false)),
            requested_progress_interval: RwLock::new(None),
            batch: Mutex::new(None),
        }
    }

    // ---------------------------
    // Stop ladder
    // ---------------------------

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal::from_u8(self.stop_signal.load(Ordering::Acquire))
    }

    /// Escalates the stop signal. `NONE < GRACEFUL < FORCED`; never
    /// downgrades. Returns true if the signal changed.
    pub fn escalate_stop(&self, forced: bool) -> bool {
        let target = if forced {
            StopSignal::Forced
        } else {
            StopSignal::Graceful
        };
        loop {
            let current = StopSignal::from_u8(self.stop_signal.load(Ordering::Acquire));
            if current >= target {
                return false;
            }
            if self
                .stop_signal
                .compare_exchange(
                    current.as_u8(),
                    target.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn reset_stop(&self) {
        self.stop_signal
            .store(StopSignal::None.as_u8(), Ordering::Release);
    }

    // ---------------------------
    // Flags
    // ---------------------------

    pub fn has_ongoing(&self) -> bool {
        self.has_ongoing.load(Ordering::Acquire)
    }

    pub fn set_has_ongoing(&self, ongoing: bool) {
        self.has_ongoing.store(ongoing, Ordering::Release);
    }

    pub fn stopped_by_user(&self) -> bool {
        self.stopped_by_user.load(Ordering::Acquire)
    }

    pub fn set_stopped_by_user(&self, stopped: bool) {
        self.stopped_by_user.store(stopped, Ordering::Release);
    }

    pub fn set_assigner_mode(&self, assigner: bool) {
        self.assigner_mode.store(assigner, Ordering::Release);
    }

    pub fn assigner_mode(&self) -> bool {
        self.assigner_mode.load(Ordering::Acquire)
    }

    /// Handle shared with the adjuster: true disables auto-concurrency for
    /// the current batch.
    pub fn skip_auto_concurrency(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.skip_auto_concurrency)
    }

    pub fn set_skip_auto_concurrency(&self, skip: bool) {
        self.skip_auto_concurrency.store(skip, Ordering::Release);
    }

    // ---------------------------
    // Progress interval
    // ---------------------------

    /// Effective interval between progress checks.
    pub fn progress_interval(&self) -> Duration {
        self.requested_progress_interval
            .read()
            .expect("interval lock")
            .unwrap_or(self.default_progress_interval)
    }

    /// Sets the requested interval; `None` falls back to the default.
    /// Rejects values below [`MIN_PROGRESS_CHECK_INTERVAL`].
    pub fn set_requested_progress_interval(
        &self,
        interval: Option<Duration>,
    ) -> Result<(), ExecutionError> {
        if let Some(value) = interval {
            if value < MIN_PROGRESS_CHECK_INTERVAL {
                return Err(ExecutionError::invalid(format!(
                    "progress check interval {value:?} is below the {MIN_PROGRESS_CHECK_INTERVAL:?} floor"
                )));
            }
        }
        *self
            .requested_progress_interval
            .write()
            .expect("interval lock") = interval;
        Ok(())
    }

    // ---------------------------
    // Batch identity
    // ---------------------------

    pub fn set_batch(&self, uuid: String, reason: ReasonProvider, triggered_by_user: bool) {
        *self.batch.lock().expect("batch lock") = Some(BatchIdentity {
            uuid,
            reason,
            triggered_by_user,
        });
    }

    pub fn clear_batch(&self) {
        *self.batch.lock().expect("batch lock") = None;
    }

    pub fn uuid(&self) -> Option<String> {
        self.batch
            .lock()
            .expect("batch lock")
            .as_ref()
            .map(|b| b.uuid.clone())
    }

    /// Evaluates the reason provider of the current batch.
    pub fn reason(&self) -> Option<String> {
        let provider = self
            .batch
            .lock()
            .expect("batch lock")
            .as_ref()
            .map(|b| Arc::clone(&b.reason));
        provider.map(|r| r())
    }

    pub fn triggered_by_user(&self) -> bool {
        self.batch
            .lock()
            .expect("batch lock")
            .as_ref()
            .map(|b| b.triggered_by_user)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_only_escalates() {
        let session = Session::new(Duration::from_secs(10));
        assert_eq!(session.stop_signal(), StopSignal::None);

        assert!(session.escalate_stop(false));
        assert_eq!(session.stop_signal(), StopSignal::Graceful);
        // Repeating the same request changes nothing.
        assert!(!session.escalate_stop(false));

        assert!(session.escalate_stop(true));
        assert_eq!(session.stop_signal(), StopSignal::Forced);
        // No downgrade from forced.
        assert!(!session.escalate_stop(false));
        assert_eq!(session.stop_signal(), StopSignal::Forced);
    }

    #[test]
    fn interval_floor_is_enforced() {
        let session = Session::new(Duration::from_secs(10));
        assert!(session
            .set_requested_progress_interval(Some(Duration::from_millis(1_000)))
            .is_err());
        assert_eq!(session.progress_interval(), Duration::from_secs(10));

        session
            .set_requested_progress_interval(Some(Duration::from_millis(5_000)))
            .unwrap();
        assert_eq!(session.progress_interval(), Duration::from_millis(5_000));

        session.set_requested_progress_interval(None).unwrap();
        assert_eq!(session.progress_interval(), Duration::from_secs(10));
    }
}
