//! # Proposals and movement tasks.
//!
//! A [`Proposal`] declares the desired placement and leadership of one
//! partition. The tracker materializes it into up to three kinds of
//! [`MoveTask`] (inter-broker replica moves, intra-broker directory moves,
//! and leadership transfers), each owning a small, strict lifecycle state
//! machine ([`TaskState`]).
//!
//! ## Rules
//! - A partition yields at most one inter-broker task and at most one leader
//!   task per batch; it may yield one intra-broker task per broker that
//!   changes its local directory.
//! - Terminal states (`Completed`, `Aborted`, `Dead`) are sticky.
//! - `started_at_ms` is stamped exactly once, on `Pending → InProgress`.

mod proposal;
mod strategy;
mod task;

pub use proposal::{BrokerId, PartitionId, Proposal, ReplicaPlacement};
pub use strategy::{OfflineFirst, OrderingStrategy};
pub use task::{InvalidTransition, MoveTask, TaskState, TaskType};
