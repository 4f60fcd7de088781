//! # Public controller surface.
//!
//! The [`Controller`] facade owns the batch lifecycle; [`BatchSpec`] carries
//! per-batch inputs; [`ReasonProvider`] supplies the human-readable reason
//! attached to status snapshots and notifications.

mod core;
mod session;
mod spec;

pub use self::core::Controller;
pub use session::ReasonProvider;
pub use spec::BatchSpec;

pub(crate) use session::Session;
