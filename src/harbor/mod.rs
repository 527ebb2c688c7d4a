//! Host-side harness: task loading, environment resolution and sandbox
//! provisioning.

pub mod config;
pub mod env;
pub mod provision;
pub mod task;

pub use config::{HarborConfig, DEFAULT_INSTALL_COMMAND};
pub use env::{resolve_environment, EnvDefaults, EnvironmentConfig, TaskState};
pub use provision::{AgentAsset, Provisioner, AGENT_BINARY_NAME};
pub use task::{discover_tasks, TaskInstance};
