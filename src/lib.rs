//! swe-harbor: sandbox provisioning and a bounded tool-using coding agent.
//!
//! The host side ([`harbor`], [`sandbox`], [`cli`]) prepares a sandbox for one
//! benchmark task. The sandbox side ([`scaffold`], [`llm`]) is the agent
//! loop that the `harbor-agent` binary runs inside it.

pub mod cli;
pub mod error;
pub mod harbor;
pub mod llm;
pub mod sandbox;
pub mod scaffold;

// Re-export commonly used error types
pub use error::{LlmError, ProvisionError, SandboxError, TaskError};
