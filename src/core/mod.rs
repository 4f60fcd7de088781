//! Supervision core: the three-phase execution loop.
//!
//! This module contains the embedded implementation of the execution worker.
//! Nothing here is public API; the worker is spawned by the
//! [`Controller`](crate::Controller) facade, exactly one per admitted batch.
//!
//! ## Files & responsibilities
//! - **worker.rs**: owns the tracker for one batch; adjusts the load-monitor
//!   sampling mode, drives the three phases in order, performs the force-stop
//!   intervention, and runs the unconditional cleanup + completion
//!   notification.
//! - **progress.rs**: the poll cycle (`wait_for_progress`): sleep, re-submit
//!   dropped tasks, refresh metadata and log dirs, settle or kill each
//!   in-flight task, report slow tasks, roll back dead/stopped inter-broker
//!   work.
//! - **predicates.rs**: the only type-dependent pieces, the per-type goal and
//!   dead checks against a cluster view.
//!
//! ## Phase flow
//! ```text
//! Controller::execute()
//!   └─ spawn ExecutionWorker::run()
//!        ├─ mark began (user tasks / anomaly detector reset at admission)
//!        ├─ sampling → BrokerMetricsOnly (pause / set / resume, retried)
//!        ├─ Phase InterBroker  ─ submit batches ─ poll ─ throttle set/clear
//!        ├─ Phase IntraBroker  ─ submit batches ─ poll
//!        ├─ Phase Leader       ─ elections (waits out foreign elections)
//!        ├─ if force-stopped: delete reassignment markers (controller bounce)
//!        └─ finally: notify outcome, clear tracker/session, publish NoTask,
//!           sampling → All
//! ```
//!
//! ## Rules
//! - Phase N+1 never starts while phase N has in-flight tasks.
//! - The loop is preemptible only via the stop ladder, checked at the top of
//!   every poll iteration; sleeps absorb interrupts.
//! - Transient client errors inside the loop are logged and retried on the
//!   next tick; anything else terminates the batch through the cleanup path.

mod predicates;
mod progress;
mod worker;

pub(crate) use worker::ExecutionWorker;
