//! hy-cli: Command-line interface for hydra
//!
//! Provides the `hydra` binary: the coordinator-side `run` and `sync`
//! commands and the hidden `agent` and `executor` roles that the
//! coordinator starts on each machine.

pub mod commands;
pub mod output;
