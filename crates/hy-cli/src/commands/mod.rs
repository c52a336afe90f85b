//! CLI command implementations

mod config;
mod role;
mod run;
mod sync;

pub use config::load_run_config;
pub use role::{agent_role, executor_role};
pub use run::{expand_patterns, run_command, OutputMode};
pub use sync::sync_command;
