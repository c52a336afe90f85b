//! hy-agent: Per-machine roles of hydra
//!
//! An agent runs on each machine taking part in a run. It boots a fixed
//! number of executors, relays their work requests and results to the
//! coordinator, and hands each assigned item to an idle executor. An
//! executor runs one item at a time through a [`WorkRunner`].

pub mod agent;
pub mod executor;
pub mod health;
pub mod launcher;
pub mod pool;
pub mod runner;

pub use agent::{Agent, AgentOptions};
pub use executor::Executor;
pub use launcher::{InProcessAgentLauncher, InProcessExecutorLauncher, ProcessExecutorLauncher};
pub use runner::{CommandRunner, WorkRunner};
