//! hy-coordinator: The single owner of a hydra run
//!
//! The coordinator holds the work queue, boots every configured agent,
//! hands out items as agents ask for them, retries transient failures,
//! and collects a [`RunSummary`]. It is the only component that mutates
//! run state; every agent link feeds events into its one loop.

pub mod coordinator;
pub mod heuristic;
pub mod launcher;
pub mod listener;
pub mod queue;
pub mod retry;
pub mod summary;
pub mod sync;

pub use coordinator::Coordinator;
pub use heuristic::{DurationReport, TimingRecord};
pub use launcher::ProcessAgentLauncher;
pub use listener::{Listener, MinimalOutput, ReportGenerator};
pub use queue::WorkQueue;
pub use retry::RetryPolicy;
pub use summary::{ItemResult, Outcome, RunSummary};
