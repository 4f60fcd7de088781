//! Shared in-memory cluster harness for controller integration tests.
//!
//! One `MockState` behind a mutex backs every client trait; tests mutate it
//! directly to simulate broker deaths, dropped reassignments, or a cluster
//! that settles work instantly.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use movevisor::{
    AdminApi, AnomalyDetector, BrokerId, BrokerLoad, ClusterClients, ClusterView,
    CoordinationStore, DirMoveRequest, Event, LoadMonitor, LogDirReport, MetadataClient,
    PartitionId, PartitionState, ReassignmentRequest, SamplingMode, Subscribe, SubmissionError,
    SubmissionReceipt, ThrottleHelper, UserTaskManager,
};

#[derive(Default)]
pub struct MockState {
    pub view: ClusterView,
    pub ongoing_reassignments: HashSet<PartitionId>,
    pub ongoing_elections: HashSet<PartitionId>,
    pub logdirs: HashMap<BrokerId, LogDirReport>,
    /// Apply submitted reassignments to the view immediately.
    pub apply_reassignments_on_submit: bool,
    /// Track submitted reassignments in the ongoing set.
    pub record_ongoing_on_submit: bool,
    /// Apply triggered elections (leader := first assigned replica).
    pub apply_elections_on_trigger: bool,
    /// Apply directory moves to the log-dir report immediately.
    pub apply_dir_moves_on_submit: bool,
    pub submission_errors: HashMap<PartitionId, SubmissionError>,
    pub submissions: Vec<Vec<ReassignmentRequest>>,
    pub dir_move_submissions: Vec<Vec<DirMoveRequest>>,
    pub election_triggers: Vec<Vec<PartitionId>>,
    pub markers_deleted: usize,
}

pub type SharedState = Arc<Mutex<MockState>>;

/// Cluster where every submitted operation settles instantly.
pub fn instant_cluster(view: ClusterView) -> SharedState {
    Arc::new(Mutex::new(MockState {
        view,
        apply_reassignments_on_submit: true,
        record_ongoing_on_submit: false,
        apply_elections_on_trigger: true,
        apply_dir_moves_on_submit: true,
        ..MockState::default()
    }))
}

/// Cluster that accepts submissions but never makes progress on its own.
pub fn stalled_cluster(view: ClusterView) -> SharedState {
    Arc::new(Mutex::new(MockState {
        view,
        apply_reassignments_on_submit: false,
        record_ongoing_on_submit: true,
        apply_elections_on_trigger: false,
        apply_dir_moves_on_submit: false,
        ..MockState::default()
    }))
}

pub fn view(brokers: &[BrokerId], partitions: &[(&str, i32, Vec<BrokerId>, BrokerId)]) -> ClusterView {
    let mut view = ClusterView::default();
    view.brokers.extend(brokers.iter().copied());
    for (topic, partition, replicas, leader) in partitions {
        view.partitions.insert(
            PartitionId::new(*topic, *partition),
            PartitionState {
                replicas: replicas.clone(),
                isr: replicas.clone(),
                leader: Some(*leader),
            },
        );
    }
    view
}

fn apply_reassignment(view: &mut ClusterView, request: &ReassignmentRequest) {
    let state = view
        .partitions
        .entry(request.partition.clone())
        .or_insert_with(|| PartitionState {
            replicas: Vec::new(),
            isr: Vec::new(),
            leader: None,
        });
    state.replicas = request.target_replicas.clone();
    state.isr = request.target_replicas.clone();
    let leader_alive = state
        .leader
        .map(|l| state.replicas.contains(&l))
        .unwrap_or(false);
    if !leader_alive {
        state.leader = state.replicas.first().copied();
    }
}

// ---------------------------
// Client implementations
// ---------------------------

pub struct MockReceipt {
    errors: HashMap<PartitionId, SubmissionError>,
}

#[async_trait]
impl SubmissionReceipt for MockReceipt {
    async fn error_for(
        &self,
        partition: &PartitionId,
        _timeout: Duration,
    ) -> Option<SubmissionError> {
        self.errors.get(partition).cloned()
    }
}

#[derive(Clone)]
pub struct MockAdmin {
    pub state: SharedState,
}

#[async_trait]
impl AdminApi for MockAdmin {
    async fn submit_replica_reassignments(
        &self,
        requests: &[ReassignmentRequest],
    ) -> anyhow::Result<Box<dyn SubmissionReceipt>> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push(requests.to_vec());
        if state.record_ongoing_on_submit {
            for request in requests {
                state.ongoing_reassignments.insert(request.partition.clone());
            }
        }
        if state.apply_reassignments_on_submit {
            for request in requests {
                let request = request.clone();
                apply_reassignment(&mut state.view, &request);
                state.ongoing_reassignments.remove(&request.partition);
            }
        }
        Ok(Box::new(MockReceipt {
            errors: state.submission_errors.clone(),
        }))
    }

    async fn ongoing_reassignments(&self) -> anyhow::Result<HashSet<PartitionId>> {
        Ok(self.state.lock().unwrap().ongoing_reassignments.clone())
    }

    async fn alter_replica_dirs(&self, moves: &[DirMoveRequest]) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.dir_move_submissions.push(moves.to_vec());
        if state.apply_dir_moves_on_submit {
            for mv in moves {
                if let Some(report) = state.logdirs.get_mut(&mv.broker) {
                    if let Some(replica) = report.replicas.get_mut(&mv.partition) {
                        replica.current_dir = mv.target_dir.clone();
                        replica.future_dir = None;
                    }
                }
            }
        }
        Ok(())
    }

    async fn describe_log_dirs(
        &self,
        brokers: &[BrokerId],
    ) -> anyhow::Result<HashMap<BrokerId, LogDirReport>> {
        let state = self.state.lock().unwrap();
        Ok(brokers
            .iter()
            .filter_map(|b| state.logdirs.get(b).map(|r| (*b, r.clone())))
            .collect())
    }
}

#[derive(Clone)]
pub struct MockMetadata {
    pub state: SharedState,
}

#[async_trait]
impl MetadataClient for MockMetadata {
    async fn refresh(&self) -> anyhow::Result<ClusterView> {
        Ok(self.state.lock().unwrap().view.clone())
    }
}

#[derive(Clone)]
pub struct MockCoordination {
    pub state: SharedState,
}

#[async_trait]
impl CoordinationStore for MockCoordination {
    async fn ongoing_preferred_leader_elections(&self) -> anyhow::Result<HashSet<PartitionId>> {
        Ok(self.state.lock().unwrap().ongoing_elections.clone())
    }

    async fn trigger_preferred_leader_election(
        &self,
        partitions: &[PartitionId],
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.election_triggers.push(partitions.to_vec());
        if state.apply_elections_on_trigger {
            for partition in partitions {
                if let Some(p) = state.view.partitions.get_mut(partition) {
                    p.leader = p.replicas.first().copied();
                }
            }
        } else {
            state.ongoing_elections.extend(partitions.iter().cloned());
        }
        Ok(())
    }

    async fn delete_reassignment_markers(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.markers_deleted += 1;
        state.ongoing_reassignments.clear();
        Ok(())
    }
}

pub struct MockThrottle {
    pub set_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
}

impl MockThrottle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            set_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ThrottleHelper for MockThrottle {
    async fn set_throttles(
        &self,
        _proposals: &[Arc<movevisor::Proposal>],
    ) -> anyhow::Result<()> {
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn clear_throttles(
        &self,
        _completed: &[Arc<movevisor::Proposal>],
        _still_in_progress: &[Arc<movevisor::Proposal>],
    ) -> anyhow::Result<()> {
        self.clear_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAnomaly {
    pub cleared: AtomicUsize,
    pub resets: AtomicUsize,
    pub finished: Mutex<Vec<String>>,
}

impl AnomalyDetector for MockAnomaly {
    fn clear_ongoing_detection_time(&self) {
        self.cleared.fetch_add(1, Ordering::Relaxed);
    }

    fn reset_unfixable_goals(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn mark_self_healing_finished(&self, uuid: &str) {
        self.finished.lock().unwrap().push(uuid.to_string());
    }
}

#[derive(Default)]
pub struct MockUserTasks {
    pub began: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<(String, bool)>>,
}

impl UserTaskManager for MockUserTasks {
    fn mark_began(&self, uuid: &str) {
        self.began.lock().unwrap().push(uuid.to_string());
    }

    fn mark_finished(&self, uuid: &str, stopped_or_errored: bool) {
        self.finished
            .lock()
            .unwrap()
            .push((uuid.to_string(), stopped_or_errored));
    }
}

pub struct MockMonitor {
    pub mode: Mutex<SamplingMode>,
    pub loads: Mutex<HashMap<BrokerId, BrokerLoad>>,
}

impl MockMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(SamplingMode::All),
            loads: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_loads(&self, loads: HashMap<BrokerId, BrokerLoad>) {
        *self.loads.lock().unwrap() = loads;
    }
}

impl LoadMonitor for MockMonitor {
    fn current_broker_loads(&self) -> HashMap<BrokerId, BrokerLoad> {
        self.loads.lock().unwrap().clone()
    }

    fn sampling_mode(&self) -> SamplingMode {
        *self.mode.lock().unwrap()
    }

    fn set_sampling_mode(&self, mode: SamplingMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn pause_sampling(&self, _reason: &str, _force: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn resume_sampling(&self, _reason: &str) {}
}

/// Subscriber that records every event for later assertions.
#[derive(Default)]
pub struct CaptureSubscriber {
    pub events: Mutex<Vec<Event>>,
}

#[async_trait]
impl Subscribe for CaptureSubscriber {
    async fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}

impl CaptureSubscriber {
    pub fn details_of(&self, kind: movevisor::EventKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.detail.clone())
            .collect()
    }

    pub fn count_of(&self, kind: movevisor::EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

/// Bundles the mock clients for controller construction.
pub fn clients(state: &SharedState, anomaly: &Arc<MockAnomaly>) -> ClusterClients {
    ClusterClients {
        admin: Arc::new(MockAdmin {
            state: Arc::clone(state),
        }),
        metadata: Arc::new(MockMetadata {
            state: Arc::clone(state),
        }),
        coordination: Arc::new(MockCoordination {
            state: Arc::clone(state),
        }),
        throttle: MockThrottle::new(),
        anomaly: Arc::clone(anomaly) as Arc<dyn AnomalyDetector>,
    }
}

/// Polls `condition` until it holds; panics after a generous number of
/// virtual-time rounds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("timed out waiting for: {what}");
}
