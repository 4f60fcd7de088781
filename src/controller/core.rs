//! # Controller facade.
//!
//! [`Controller`] is the thread-safe public surface of the execution
//! controller. It owns the session flags, the history store, the AIMD
//! adjuster, the event fan-out, and the single supervision worker of the
//! currently admitted batch.
//!
//! ## Lifecycle
//! ```text
//! NoTask ──begin_proposing──► Proposing ──execute──► Starting → phases → NoTask
//!            └─fail_proposing──┘
//! any in-flight ──stop_execution(force?)──► Stopping ──drain──► NoTask
//! ```
//!
//! ## Rules
//! - Lifecycle transitions are mutually exclusive (one at a time); cap and
//!   interval setters are allowed concurrently with a running execution.
//! - At most one batch is past `Starting` at any time.
//! - `stop_execution` only escalates; a forced stop overrides a graceful one.
//! - `shutdown` stops accepting batches, awaits the worker, then closes the
//!   cluster clients and cancels the periodic helpers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adjuster::ConcurrencyAdjuster;
use crate::cluster::{ClusterClients, LoadMonitor, UserTaskManager};
use crate::config::ExecutorConfig;
use crate::core::ExecutionWorker;
use crate::error::ExecutionError;
use crate::events::{Bus, Event, EventKind};
use crate::history::BrokerHistory;
use crate::metrics::ExecutorMetrics;
use crate::snapshot::{ExecutorStatus, Phase, StopSignal};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{BrokerId, TaskType};
use crate::time::{Clock, SystemClock};
use crate::tracker::{ConcurrencyCaps, TaskTracker};

use super::session::{ReasonProvider, Session};
use super::spec::BatchSpec;

const BUS_CAPACITY: usize = 1024;

/// Thread-safe facade over the execution controller.
pub struct Controller {
    cfg: ExecutorConfig,
    clients: ClusterClients,
    clock: Arc<dyn Clock>,
    session: Arc<Session>,
    caps: Arc<ConcurrencyCaps>,
    history: Arc<BrokerHistory>,
    metrics: Arc<ExecutorMetrics>,
    bus: Bus,
    adjuster: Arc<ConcurrencyAdjuster>,
    status_tx: watch::Sender<Arc<ExecutorStatus>>,
    status_rx: watch::Receiver<Arc<ExecutorStatus>>,
    user_tasks: std::sync::RwLock<Option<Arc<dyn UserTaskManager>>>,
    /// Serializes lifecycle transitions (single-writer discipline).
    transitions: Mutex<()>,
    /// Join handle of the current batch's worker.
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Stops the periodic helpers (sweeper, adjuster, fan-out listener).
    shutdown_token: CancellationToken,
    accepting: AtomicBool,
}

impl Controller {
    /// Creates the controller and spawns its periodic helpers. Must be called
    /// within a tokio runtime.
    pub fn new(
        cfg: ExecutorConfig,
        clients: ClusterClients,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Arc<Self> {
        Self::with_clock(cfg, clients, subscribers, Arc::new(SystemClock))
    }

    /// Same as [`Controller::new`] with an injected clock.
    pub fn with_clock(
        cfg: ExecutorConfig,
        clients: ClusterClients,
        subscribers: Vec<Arc<dyn Subscribe>>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let caps = Arc::new(ConcurrencyCaps::new(
            cfg.inter_broker_cap,
            cfg.intra_broker_cap,
            cfg.leader_cap,
        ));
        let history = Arc::new(BrokerHistory::new(
            cfg.demotion_history_retention,
            cfg.removal_history_retention,
            Arc::clone(&clock),
        ));
        let session = Arc::new(Session::new(cfg.progress_check_interval));
        let (status_tx, status_rx) = watch::channel(Arc::new(ExecutorStatus::no_task(
            Vec::new(),
            Vec::new(),
            caps.as_tuple(),
        )));
        let bus = Bus::new(BUS_CAPACITY);
        let shutdown_token = CancellationToken::new();

        let adjuster = Arc::new(ConcurrencyAdjuster::new(
            Arc::clone(&caps),
            cfg.watermarks,
            cfg.max_inter_broker_moves_per_broker,
            cfg.concurrency_adjuster_enabled,
            session.skip_auto_concurrency(),
            status_rx.clone(),
        ));

        Self::spawn_subscriber_listener(&bus, subscribers, shutdown_token.clone());
        history.spawn_sweeper(cfg.history_sweep_interval, shutdown_token.clone());
        Arc::clone(&adjuster).spawn(cfg.concurrency_adjuster_interval, shutdown_token.clone());

        Arc::new(Self {
            cfg,
            clients,
            clock,
            session,
            caps,
            history,
            metrics: Arc::new(ExecutorMetrics::default()),
            bus,
            adjuster,
            status_tx,
            status_rx,
            user_tasks: std::sync::RwLock::new(None),
            transitions: Mutex::new(()),
            worker: Mutex::new(None),
            shutdown_token,
            accepting: AtomicBool::new(true),
        })
    }

    /// Fans bus events out to the subscribers without blocking publishers.
    fn spawn_subscriber_listener(
        bus: &Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
        token: CancellationToken,
    ) {
        let set = SubscriberSet::new(subscribers);
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
            set.shutdown().await;
        });
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Reserves the controller while an external optimizer generates
    /// proposals for the batch identified by `uuid`.
    pub async fn begin_proposing(
        &self,
        uuid: &str,
        reason: ReasonProvider,
        triggered_by_user: bool,
    ) -> Result<(), ExecutionError> {
        let _guard = self.transitions.lock().await;
        self.ensure_accepting()?;
        let phase = self.status_rx.borrow().phase;
        if phase != Phase::NoTask {
            return Err(ExecutionError::ongoing(format!(
                "cannot generate proposals while the executor is in {} state",
                phase.as_label()
            )));
        }
        if uuid.is_empty() {
            return Err(ExecutionError::invalid("uuid cannot be empty"));
        }

        self.session
            .set_batch(uuid.to_string(), reason, triggered_by_user);
        self.publish_facade_status(Phase::Proposing);
        self.bus
            .publish(Event::now(EventKind::ProposingStarted).with_uuid(uuid));
        Ok(())
    }

    /// Reports that proposal generation for `uuid` failed. No-op unless the
    /// controller is proposing; a uuid mismatch logs a warning and changes
    /// nothing.
    pub async fn fail_proposing(&self, uuid: &str) {
        let _guard = self.transitions.lock().await;
        if self.status_rx.borrow().phase != Phase::Proposing {
            return;
        }
        match self.session.uuid() {
            Some(current) if current == uuid => {
                tracing::info!(uuid, "failed to generate proposals for execution");
                self.session.clear_batch();
                self.publish_facade_status(Phase::NoTask);
                self.bus
                    .publish(Event::now(EventKind::ProposingAbandoned).with_uuid(uuid));
            }
            current => {
                tracing::warn!(
                    received = uuid,
                    expected = ?current,
                    "uuid mismatch in attempt to report proposal-generation failure"
                );
            }
        }
    }

    /// Admits the batch and hands it to the supervision worker.
    ///
    /// Requires a prior [`begin_proposing`](Self::begin_proposing) with the
    /// same uuid, a load monitor, and a cluster with no foreign movements in
    /// flight.
    pub async fn execute(
        &self,
        spec: BatchSpec,
        monitor: Option<Arc<dyn LoadMonitor>>,
        uuid: &str,
    ) -> Result<(), ExecutionError> {
        self.session.set_assigner_mode(spec.assigner_mode);
        self.execute_internal(spec, None, monitor, uuid).await
    }

    /// Admits a demotion batch: like [`execute`](Self::execute), but stamps
    /// demotion history, forbids intra-broker movement, and disables
    /// automatic concurrency adjustment.
    pub async fn execute_demote(
        &self,
        mut spec: BatchSpec,
        demoted_brokers: Vec<BrokerId>,
        monitor: Option<Arc<dyn LoadMonitor>>,
        uuid: &str,
    ) -> Result<(), ExecutionError> {
        self.session.set_assigner_mode(false);
        spec.intra_broker_cap = Some(0);
        spec.skip_auto_concurrency = true;
        self.execute_internal(spec, Some(demoted_brokers), monitor, uuid)
            .await
    }

    async fn execute_internal(
        &self,
        spec: BatchSpec,
        demoted_brokers: Option<Vec<BrokerId>>,
        monitor: Option<Arc<dyn LoadMonitor>>,
        uuid: &str,
    ) -> Result<(), ExecutionError> {
        let _guard = self.transitions.lock().await;
        self.ensure_accepting()?;
        if self.session.has_ongoing() {
            return Err(ExecutionError::ongoing(
                "cannot execute new proposals while there is an ongoing execution",
            ));
        }
        let Some(monitor) = monitor else {
            return Err(ExecutionError::invalid("load monitor cannot be null"));
        };
        let phase = self.status_rx.borrow().phase;
        if phase != Phase::Proposing {
            return Err(ExecutionError::illegal(format!(
                "unexpected executor state {}: initializing an execution requires generating proposals",
                phase.as_label()
            )));
        }
        match self.session.uuid() {
            Some(ref current) if current == uuid => {}
            current => {
                return Err(ExecutionError::illegal(format!(
                    "uuid {uuid} differs from the uuid used for generating proposals {current:?}"
                )));
            }
        }
        if spec.triggered_by_user && self.user_tasks.read().expect("user tasks lock").is_none() {
            self.process_execute_failure();
            return Err(ExecutionError::illegal(
                "user task manager must be set before user-triggered executions",
            ));
        }
        self.session
            .set_skip_auto_concurrency(spec.skip_auto_concurrency);

        let result = self
            .init_and_start(spec, demoted_brokers, monitor, uuid)
            .await;
        if result.is_err() {
            self.process_execute_failure();
        }
        result
    }

    async fn init_and_start(
        &self,
        spec: BatchSpec,
        demoted_brokers: Option<Vec<BrokerId>>,
        monitor: Arc<dyn LoadMonitor>,
        uuid: &str,
    ) -> Result<(), ExecutionError> {
        // Materialize tasks against a fresh view.
        let cluster = self
            .clients
            .metadata
            .refresh()
            .await
            .map_err(|source| ExecutionError::Preflight { source })?;
        let mut tracker = TaskTracker::new(Arc::clone(&self.caps), Arc::clone(&self.clock));
        tracker.add_proposals(
            &spec.proposals,
            spec.exempt_brokers.clone(),
            &cluster,
            spec.strategy.as_ref(),
        );

        // Per-batch overrides; `None` resets to the configured defaults.
        self.caps
            .set_inter_broker(spec.inter_broker_cap.unwrap_or(self.cfg.inter_broker_cap));
        self.caps
            .set_intra_broker(spec.intra_broker_cap.unwrap_or(self.cfg.intra_broker_cap));
        self.caps
            .set_leader(spec.leader_cap.unwrap_or(self.cfg.leader_cap));
        self.session
            .set_requested_progress_interval(spec.progress_check_interval)?;
        self.adjuster.init_adjustment(Arc::clone(&monitor), None);

        // Preflight: refuse to start while an external agent moves the
        // cluster. Raises without side effects.
        self.session.set_stopped_by_user(false);
        self.preflight_no_foreign_movement().await?;

        self.session.set_has_ongoing(true);
        self.clients.anomaly.clear_ongoing_detection_time();
        self.clients.anomaly.reset_unfixable_goals();
        self.session.reset_stop();
        self.metrics.incr_started(self.session.assigner_mode());

        // Demote/removal bookkeeping; permanence is never overwritten.
        if let Some(demoted) = &demoted_brokers {
            for broker in demoted {
                self.history.demotion.note_start(*broker);
            }
        }
        for broker in &spec.removed_brokers {
            self.history.removal.note_start(*broker);
        }

        let worker = ExecutionWorker {
            cfg: self.cfg.clone(),
            clients: self.clients.clone(),
            monitor,
            session: Arc::clone(&self.session),
            caps: Arc::clone(&self.caps),
            tracker,
            history: Arc::clone(&self.history),
            metrics: Arc::clone(&self.metrics),
            bus: self.bus.clone(),
            status_tx: self.status_tx.clone(),
            user_tasks: self.user_tasks.read().expect("user tasks lock").clone(),
            clock: Arc::clone(&self.clock),
            uuid: uuid.to_string(),
            triggered_by_user: spec.triggered_by_user,
            phase: Phase::Starting,
            last_slow_report_ms: i64::MIN / 2,
            last_receipt: None,
            execution_error: None,
        };
        *self.worker.lock().await = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Checks that nothing outside this controller is moving the cluster:
    /// no partition reassignment, no intra-broker move, no leader election.
    async fn preflight_no_foreign_movement(&self) -> Result<(), ExecutionError> {
        let preflight = |source| ExecutionError::Preflight { source };

        let reassignments = self
            .clients
            .admin
            .ongoing_reassignments()
            .await
            .map_err(preflight)?;
        if !reassignments.is_empty() {
            return Err(ExecutionError::ongoing(
                "there are ongoing inter-broker partition movements",
            ));
        }

        let cluster = self.clients.metadata.refresh().await.map_err(preflight)?;
        let brokers: Vec<BrokerId> = cluster.brokers.iter().copied().collect();
        let reports = self
            .clients
            .admin
            .describe_log_dirs(&brokers)
            .await
            .map_err(preflight)?;
        let has_intra_moves = reports
            .values()
            .any(|report| report.replicas.values().any(|r| r.future_dir.is_some()));
        if has_intra_moves {
            return Err(ExecutionError::ongoing(
                "there are ongoing intra-broker partition movements",
            ));
        }

        let elections = self
            .clients
            .coordination
            .ongoing_preferred_leader_elections()
            .await
            .map_err(preflight)?;
        if !elections.is_empty() {
            return Err(ExecutionError::ongoing(
                "there are ongoing leadership movements",
            ));
        }
        Ok(())
    }

    fn process_execute_failure(&self) {
        self.session.clear_batch();
        self.publish_facade_status(Phase::NoTask);
    }

    /// Requests a stop of the ongoing execution on behalf of the user.
    ///
    /// Returns false when an equal-or-harder stop is already pending.
    pub fn stop_execution(&self, force: bool) -> bool {
        if self.session.escalate_stop(force) {
            tracing::info!(force, "user requested to stop the ongoing proposal execution");
            self.metrics.incr_stopped();
            self.metrics.incr_stopped_by_user();
            self.session.set_stopped_by_user(true);
            true
        } else {
            false
        }
    }

    /// Drains the worker and closes the cluster clients. New batches are
    /// refused from the moment this is called.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down executor");
        self.accepting.store(false, Ordering::Release);
        if self.session.has_ongoing() {
            tracing::warn!("shutdown may take long because an execution is still in progress");
        }
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.clients.metadata.close().await;
        self.clients.admin.close().await;
        self.clients.coordination.close().await;
        self.shutdown_token.cancel();
        tracing::info!("executor shutdown completed");
    }

    fn ensure_accepting(&self) -> Result<(), ExecutionError> {
        if self.accepting.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ExecutionError::illegal("executor is shutting down"))
        }
    }

    // ---------------------------
    // Queries & setters
    // ---------------------------

    /// Latest status snapshot.
    pub fn status(&self) -> Arc<ExecutorStatus> {
        self.status_rx.borrow().clone()
    }

    /// True while a batch is past admission.
    pub fn has_ongoing_execution(&self) -> bool {
        self.session.has_ongoing()
    }

    /// Current stop signal.
    pub fn stop_signal(&self) -> StopSignal {
        self.session.stop_signal()
    }

    /// Monotone execution counters.
    pub fn metrics(&self) -> Arc<ExecutorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Effective interval between progress checks.
    pub fn progress_check_interval(&self) -> Duration {
        self.session.progress_interval()
    }

    /// Sets the requested progress-check interval; `None` falls back to the
    /// configured default. Rejects values below the 5 s floor.
    pub fn set_requested_progress_check_interval(
        &self,
        interval: Option<Duration>,
    ) -> Result<(), ExecutionError> {
        self.session.set_requested_progress_interval(interval)
    }

    /// Live inter-broker movement cap (per broker).
    pub fn inter_broker_cap(&self) -> usize {
        self.caps.inter_broker()
    }

    /// Live intra-broker movement cap (per broker).
    pub fn intra_broker_cap(&self) -> usize {
        self.caps.intra_broker()
    }

    /// Live leadership movement cap (global).
    pub fn leader_cap(&self) -> usize {
        self.caps.leader()
    }

    /// Sets the inter-broker movement cap; `None` resets to the configured
    /// default. Observed by the tracker on the next batch.
    pub fn set_requested_inter_broker_cap(&self, cap: Option<usize>) {
        self.caps
            .set_inter_broker(cap.unwrap_or(self.cfg.inter_broker_cap));
    }

    /// Sets the intra-broker movement cap; `None` resets to the configured
    /// default.
    pub fn set_requested_intra_broker_cap(&self, cap: Option<usize>) {
        self.caps
            .set_intra_broker(cap.unwrap_or(self.cfg.intra_broker_cap));
    }

    /// Sets the global leadership movement cap; `None` resets to the
    /// configured default.
    pub fn set_requested_leader_cap(&self, cap: Option<usize>) {
        self.caps.set_leader(cap.unwrap_or(self.cfg.leader_cap));
    }

    /// Enables or disables the concurrency adjuster for a task type. Only
    /// inter-broker movements are supported; returns the previous setting.
    pub fn set_concurrency_adjuster(
        &self,
        task_type: TaskType,
        enabled: bool,
    ) -> Result<bool, ExecutionError> {
        if task_type != TaskType::InterBrokerReplica {
            return Err(ExecutionError::invalid(format!(
                "concurrency adjuster for {} is not yet supported",
                task_type.as_label()
            )));
        }
        Ok(self.adjuster.set_enabled(enabled))
    }

    /// Wires the user-task bookkeeping; required before user-triggered
    /// executions.
    pub fn set_user_task_manager(&self, manager: Arc<dyn UserTaskManager>) {
        *self.user_tasks.write().expect("user tasks lock") = Some(manager);
    }

    // ---------------------------
    // Broker history
    // ---------------------------

    /// Brokers demoted within the retention window (or marked permanent).
    pub fn recently_demoted_brokers(&self) -> Vec<BrokerId> {
        self.history.demotion.brokers()
    }

    /// Brokers removed within the retention window (or marked permanent).
    pub fn recently_removed_brokers(&self) -> Vec<BrokerId> {
        self.history.removal.brokers()
    }

    /// Marks brokers as permanently demoted until explicitly dropped.
    pub fn add_recently_demoted_brokers(&self, brokers: &[BrokerId]) {
        self.history.demotion.mark_permanent(brokers);
    }

    /// Marks brokers as permanently removed until explicitly dropped.
    pub fn add_recently_removed_brokers(&self, brokers: &[BrokerId]) {
        self.history.removal.mark_permanent(brokers);
    }

    /// Drops brokers from the demotion history. True if anything was removed.
    pub fn drop_recently_demoted_brokers(&self, brokers: &[BrokerId]) -> bool {
        self.history.demotion.drop_brokers(brokers)
    }

    /// Drops brokers from the removal history. True if anything was removed.
    pub fn drop_recently_removed_brokers(&self, brokers: &[BrokerId]) -> bool {
        self.history.removal.drop_brokers(brokers)
    }

    /// Publishes a facade-side status (proposing and idle states; everything
    /// else is published by the worker).
    fn publish_facade_status(&self, phase: Phase) {
        let mut status = ExecutorStatus::no_task(
            self.history.demotion.brokers(),
            self.history.removal.brokers(),
            self.caps.as_tuple(),
        );
        status.phase = phase;
        status.uuid = self.session.uuid();
        status.reason = self.session.reason();
        status.triggered_by_user = self.session.triggered_by_user();
        self.status_tx.send_replace(Arc::new(status));
    }
}
