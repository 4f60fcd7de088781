//! End-to-end controller scenarios against the in-memory cluster.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use movevisor::{
    BatchSpec, BrokerId, BrokerLoad, Controller, EventKind, ExecutionError, ExecutorConfig,
    LogDirReport, PartitionId, Phase, Proposal, ReasonProvider, ReplicaDirState,
    ReplicaPlacement, StopSignal,
};

use common::*;

fn test_config() -> ExecutorConfig {
    let mut cfg = ExecutorConfig::default();
    cfg.progress_check_interval = Duration::from_secs(5);
    cfg.history_sweep_interval = Duration::from_secs(1);
    cfg.concurrency_adjuster_interval = Duration::from_secs(1);
    cfg
}

fn reason() -> ReasonProvider {
    Arc::new(|| "rebalance disk usage".to_string())
}

fn move_proposal(topic: &str, p: i32, old: Vec<BrokerId>, new: Vec<BrokerId>) -> Proposal {
    Proposal::new(
        (topic, p),
        old.into_iter().map(ReplicaPlacement::on).collect(),
        new.into_iter().map(ReplicaPlacement::on).collect(),
        100,
    )
}

struct Harness {
    state: SharedState,
    anomaly: Arc<MockAnomaly>,
    capture: Arc<CaptureSubscriber>,
    controller: Arc<Controller>,
    monitor: Arc<MockMonitor>,
}

fn harness(cfg: ExecutorConfig, state: SharedState) -> Harness {
    let anomaly = Arc::new(MockAnomaly::default());
    let capture = Arc::new(CaptureSubscriber::default());
    let controller = Controller::new(cfg, clients(&state, &anomaly), vec![capture.clone()]);
    Harness {
        state,
        anomaly,
        capture,
        controller,
        monitor: MockMonitor::new(),
    }
}

impl Harness {
    async fn run_batch(&self, uuid: &str, spec: BatchSpec) {
        self.controller
            .begin_proposing(uuid, reason(), spec.triggered_by_user)
            .await
            .unwrap();
        self.controller
            .execute(spec, Some(self.monitor.clone()), uuid)
            .await
            .unwrap();
    }

    async fn wait_idle(&self) {
        let controller = Arc::clone(&self.controller);
        wait_until("execution terminates", move || {
            !controller.has_ongoing_execution() && controller.status().phase == Phase::NoTask
        })
        .await;
    }
}

#[tokio::test(start_paused = true)]
async fn single_partition_inter_broker_move_completes() {
    let state = instant_cluster(view(&[1, 2, 3, 4], &[("t", 0, vec![1, 2, 3], 1)]));
    let h = harness(test_config(), state);

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2, 3], vec![1, 2, 4])])
        .with_inter_broker_cap(1)
        .with_intra_broker_cap(1)
        .with_leader_cap(1);
    h.run_batch("b1", spec).await;
    h.wait_idle().await;

    {
        let state = h.state.lock().unwrap();
        let partition = &state.view.partitions[&PartitionId::new("t", 0)];
        assert_eq!(partition.replicas, vec![1, 2, 4]);
        // The current leader already matched the target: no election ran, and
        // no directory moves were requested.
        assert!(state.election_triggers.is_empty());
        assert!(state.dir_move_submissions.is_empty());
    }

    let capture = Arc::clone(&h.capture);
    wait_until("finished notification", move || {
        capture
            .details_of(EventKind::Notification)
            .iter()
            .any(|d| d.contains("finished"))
    })
    .await;
    assert_eq!(h.anomaly.finished.lock().unwrap().as_slice(), ["b1"]);
}

#[tokio::test(start_paused = true)]
async fn leader_only_batch_skips_replica_phases() {
    let state = instant_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2, 3], 2)]));
    let h = harness(test_config(), state);

    // Same replicas, target preferred leader 1, current leader 2.
    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2, 3], vec![1, 2, 3])]);
    h.run_batch("b2", spec).await;
    h.wait_idle().await;

    let state = h.state.lock().unwrap();
    assert!(state.submissions.is_empty(), "no replica reassignment expected");
    assert!(!state.election_triggers.is_empty());
    assert_eq!(
        state.view.partitions[&PartitionId::new("t", 0)].leader,
        Some(1)
    );
}

#[tokio::test(start_paused = true)]
async fn dead_destination_rolls_back_and_self_stops() {
    // Broker 4 is gone before the move starts acting.
    let state = stalled_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2, 3], 1)]));
    let h = harness(test_config(), state);

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2, 3], vec![1, 2, 4])]);
    h.run_batch("b3", spec).await;
    h.wait_idle().await;

    {
        let state = h.state.lock().unwrap();
        assert!(state.submissions.len() >= 2, "expected rollback submission");
        let rollback = state.submissions.last().unwrap();
        assert_eq!(rollback[0].target_replicas, vec![1, 2, 3]);
        assert_eq!(state.markers_deleted, 0);
    }
    let capture = Arc::clone(&h.capture);
    wait_until("task-dead event", move || {
        capture.count_of(EventKind::TaskDead) == 1
    })
    .await;

    let capture = Arc::clone(&h.capture);
    wait_until("stopped-by-self alert", move || {
        capture
            .details_of(EventKind::Alert)
            .iter()
            .any(|d| d.contains("stopped by self"))
    })
    .await;
    assert_eq!(h.controller.metrics().executions_stopped(), 1);
    assert_eq!(h.controller.metrics().executions_stopped_by_user(), 0);
}

#[tokio::test(start_paused = true)]
async fn forced_stop_kills_in_flight_and_intervenes_once() {
    let partitions: Vec<(&str, i32, Vec<BrokerId>, BrokerId)> =
        (0..10).map(|p| ("t", p, vec![1, 2], 1)).collect();
    let state = stalled_cluster(view(&[1, 2, 3], &partitions));
    let h = harness(test_config(), state);

    // Every move drains broker 2 onto broker 3: cap 1 admits exactly one.
    let proposals: Vec<Proposal> = (0..10)
        .map(|p| move_proposal("t", p, vec![1, 2], vec![1, 3]))
        .collect();
    let spec = BatchSpec::new(proposals).with_inter_broker_cap(1);
    h.run_batch("b4", spec).await;

    let controller = Arc::clone(&h.controller);
    wait_until("one task in flight", move || {
        controller.status().inter_broker.in_progress == 1
    })
    .await;

    assert!(h.controller.stop_execution(true));
    assert_eq!(h.controller.stop_signal(), StopSignal::Forced);
    // No downgrade once forced.
    assert!(!h.controller.stop_execution(false));
    h.wait_idle().await;

    {
        let state = h.state.lock().unwrap();
        assert_eq!(state.markers_deleted, 1);
        // The one in-flight task was killed; no rollback was submitted.
        assert_eq!(state.submissions.len(), 1);
    }
    let capture = Arc::clone(&h.capture);
    wait_until("task-dead event", move || {
        capture.count_of(EventKind::TaskDead) == 1
    })
    .await;

    let capture = Arc::clone(&h.capture);
    wait_until("stopped-by-user alert", move || {
        capture
            .details_of(EventKind::Alert)
            .iter()
            .any(|d| d.contains("stopped by user"))
    })
    .await;
    assert_eq!(h.controller.metrics().executions_stopped_by_user(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_is_blocked_without_disturbing_the_batch() {
    let state = stalled_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2], 1)]));
    let h = harness(test_config(), state);

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 3])]);
    h.run_batch("b5", spec).await;

    let err = h
        .controller
        .begin_proposing("b6", reason(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::OngoingExecution { .. }));

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 3])]);
    let err = h
        .controller
        .execute(spec, Some(h.monitor.clone()), "b5")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::OngoingExecution { .. }));

    // The original batch is unaffected.
    assert_eq!(h.controller.status().uuid.as_deref(), Some("b5"));
    assert!(h.controller.has_ongoing_execution());

    h.controller.stop_execution(true);
    h.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn progress_interval_setter_enforces_floor_and_default() {
    let state = instant_cluster(view(&[1], &[]));
    let h = harness(test_config(), state);

    let err = h
        .controller
        .set_requested_progress_check_interval(Some(Duration::from_millis(1_000)))
        .unwrap_err();
    assert!(matches!(err, ExecutionError::InvalidArgument { .. }));
    assert_eq!(h.controller.progress_check_interval(), Duration::from_secs(5));

    h.controller
        .set_requested_progress_check_interval(Some(Duration::from_millis(5_000)))
        .unwrap();
    assert_eq!(
        h.controller.progress_check_interval(),
        Duration::from_millis(5_000)
    );

    h.controller
        .set_requested_progress_check_interval(None)
        .unwrap();
    assert_eq!(h.controller.progress_check_interval(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn dropped_tasks_are_resubmitted_until_the_cluster_acts() {
    // The cluster accepts submissions but forgets them immediately: the
    // ongoing set stays empty, so the tracker's in-flight set is never a
    // subset of it.
    let state = Arc::new(std::sync::Mutex::new(MockState {
        view: view(&[1, 2, 3], &[("t", 0, vec![1, 2], 1)]),
        ..MockState::default()
    }));
    let h = harness(test_config(), Arc::clone(&state));

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 3])]);
    h.run_batch("b7", spec).await;

    let state_probe = Arc::clone(&state);
    wait_until("re-submissions happen", move || {
        state_probe.lock().unwrap().submissions.len() >= 3
    })
    .await;
    let capture = Arc::clone(&h.capture);
    wait_until("re-submission events", move || {
        capture.count_of(EventKind::TasksResubmitted) >= 1
    })
    .await;

    // Let the cluster finally apply the move.
    {
        let mut state = state.lock().unwrap();
        let partition = state
            .view
            .partitions
            .get_mut(&PartitionId::new("t", 0))
            .unwrap();
        partition.replicas = vec![1, 3];
        partition.isr = vec![1, 3];
    }
    h.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn intra_broker_directory_move_completes() {
    let state = instant_cluster(view(&[1, 2], &[("t", 0, vec![1, 2], 1)]));
    {
        let mut locked = state.lock().unwrap();
        let mut report = LogDirReport {
            dirs: vec!["/a".into(), "/b".into()],
            replicas: HashMap::new(),
        };
        report.replicas.insert(
            PartitionId::new("t", 0),
            ReplicaDirState {
                current_dir: "/a".into(),
                future_dir: None,
            },
        );
        locked.logdirs.insert(1, report);
    }
    let h = harness(test_config(), state);

    let proposal = Proposal::new(
        ("t", 0),
        vec![ReplicaPlacement::in_dir(1, "/a"), ReplicaPlacement::on(2)],
        vec![ReplicaPlacement::in_dir(1, "/b"), ReplicaPlacement::on(2)],
        100,
    );
    h.run_batch("b8", BatchSpec::new(vec![proposal])).await;
    h.wait_idle().await;

    let state = h.state.lock().unwrap();
    assert!(state.submissions.is_empty());
    assert_eq!(state.dir_move_submissions.len(), 1);
    let replica = &state.logdirs[&1].replicas[&PartitionId::new("t", 0)];
    assert_eq!(replica.current_dir, "/b");
}

#[tokio::test(start_paused = true)]
async fn graceful_stop_rolls_back_and_waits_for_the_rollback() {
    let state = stalled_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2], 1)]));
    let h = harness(test_config(), Arc::clone(&state));

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 3])]);
    h.run_batch("b9", spec).await;

    let controller = Arc::clone(&h.controller);
    wait_until("task in flight", move || {
        controller.status().inter_broker.in_progress == 1
    })
    .await;
    assert!(h.controller.stop_execution(false));

    let state_probe = Arc::clone(&state);
    wait_until("rollback submitted", move || {
        state_probe.lock().unwrap().submissions.len() >= 2
    })
    .await;
    // The worker blocks until the cancelled partitions leave the cluster's
    // active set.
    assert!(h.controller.has_ongoing_execution());
    state.lock().unwrap().ongoing_reassignments.clear();

    h.wait_idle().await;
    let capture = Arc::clone(&h.capture);
    wait_until("stopped-by-user alert", move || {
        capture
            .details_of(EventKind::Alert)
            .iter()
            .any(|d| d.contains("stopped by user"))
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn adjuster_raises_the_cap_while_brokers_are_cold() {
    let mut cfg = test_config();
    cfg.concurrency_adjuster_enabled = true;
    let state = stalled_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2], 1)]));
    let h = harness(cfg, state);
    h.monitor.set_loads(HashMap::from([
        (
            1,
            BrokerLoad {
                cpu_utilization_pct: 10.0,
                request_queue_time_ms: 5.0,
            },
        ),
        (
            2,
            BrokerLoad {
                cpu_utilization_pct: 15.0,
                request_queue_time_ms: 8.0,
            },
        ),
    ]));

    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 3])])
        .with_inter_broker_cap(1);
    h.run_batch("b10", spec).await;

    let controller = Arc::clone(&h.controller);
    wait_until("cap rises", move || controller.inter_broker_cap() >= 2).await;

    h.controller.stop_execution(true);
    h.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn demote_disables_auto_concurrency_and_stamps_history() {
    let mut cfg = test_config();
    cfg.concurrency_adjuster_enabled = true;
    let state = stalled_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2], 2)]));
    let h = harness(cfg, state);
    h.monitor.set_loads(HashMap::from([(
        1,
        BrokerLoad {
            cpu_utilization_pct: 10.0,
            request_queue_time_ms: 5.0,
        },
    )]));

    // Demote broker 2: leadership moves away from it to the preferred leader.
    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 2])])
        .with_inter_broker_cap(1);
    h.controller
        .begin_proposing("b11", reason(), false)
        .await
        .unwrap();
    h.controller
        .execute_demote(spec, vec![2], Some(h.monitor.clone()), "b11")
        .await
        .unwrap();

    assert_eq!(h.controller.recently_demoted_brokers(), vec![2]);
    assert_eq!(h.controller.intra_broker_cap(), 0);

    // Give the adjuster a few ticks: the cap must not move for demotes.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.inter_broker_cap(), 1);

    h.controller.stop_execution(true);
    h.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn user_triggered_batches_report_to_the_user_task_manager() {
    let state = instant_cluster(view(&[1, 2, 3], &[("t", 0, vec![1, 2], 1)]));
    let h = harness(test_config(), state);

    // Without a user-task manager a user-triggered batch is refused.
    h.controller
        .begin_proposing("b12", reason(), true)
        .await
        .unwrap();
    let spec = BatchSpec::new(vec![move_proposal("t", 0, vec![1, 2], vec![1, 3])]).by_user();
    let err = h
        .controller
        .execute(spec.clone(), Some(h.monitor.clone()), "b12")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::IllegalState { .. }));

    let user_tasks = Arc::new(MockUserTasks::default());
    h.controller.set_user_task_manager(user_tasks.clone());
    h.controller
        .begin_proposing("b13", reason(), true)
        .await
        .unwrap();
    h.controller
        .execute(spec, Some(h.monitor.clone()), "b13")
        .await
        .unwrap();
    h.wait_idle().await;

    assert_eq!(user_tasks.began.lock().unwrap().as_slice(), ["b13"]);
    assert_eq!(
        user_tasks.finished.lock().unwrap().as_slice(),
        [("b13".to_string(), false)]
    );
    // Self-healing hooks stay untouched for user batches.
    assert!(h.anomaly.finished.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn permanent_history_marks_survive_sweeps_and_drop() {
    let mut cfg = test_config();
    cfg.removal_history_retention = Duration::from_secs(10);
    let state = instant_cluster(view(&[1, 2], &[]));
    let anomaly = Arc::new(MockAnomaly::default());
    let clock = movevisor::ManualClock::at(1_000);
    let controller = Controller::with_clock(
        cfg,
        clients(&state, &anomaly),
        Vec::new(),
        Arc::new(clock.clone()),
    );

    controller.add_recently_removed_brokers(&[9]);
    // Jump far past the retention and let several sweeps run: the permanent
    // entry stays.
    clock.advance_ms(1_000_000);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(controller.recently_removed_brokers(), vec![9]);

    assert!(controller.drop_recently_removed_brokers(&[9]));
    assert!(controller.recently_removed_brokers().is_empty());
}
