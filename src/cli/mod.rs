//! Command-line interface for swe-harbor.
//!
//! Provides commands for inspecting the agent environment, listing tasks,
//! provisioning sandboxes and running tasks locally.

mod commands;

pub use commands::{parse_cli, parse_key_val, run, run_with_cli, Cli, Commands, HarborArgs};
