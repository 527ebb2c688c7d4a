//! Environment passed to the agent process.
//!
//! The surrounding infra may already have injected an endpoint, credential
//! and model into the task state. Those values win; only keys that are
//! absent receive a fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scaffold::agent_loop::{ENV_API_KEY, ENV_BASE_URL, ENV_MODEL};

/// Public router endpoint used when the infra did not set one.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Host variable that supplies the fallback credential.
pub const HOST_API_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Credential used when the host has none either.
pub const PLACEHOLDER_API_KEY: &str = "sk-placeholder";

/// Per-task state shared with the surrounding infra.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Sandbox the task runs in.
    pub sandbox_id: String,
    /// Variables injected before provisioning.
    pub env_vars: BTreeMap<String, String>,
}

impl TaskState {
    /// State for `sandbox_id` with nothing injected.
    pub fn new(sandbox_id: impl Into<String>) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            env_vars: BTreeMap::new(),
        }
    }

    /// Inject `key=value`, replacing an earlier value for `key`.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }
}

/// Fallback values, captured once so resolution stays pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDefaults {
    pub base_url: String,
    pub api_key: String,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
        }
    }
}

impl EnvDefaults {
    /// Read the fallback credential from the host environment.
    pub fn from_host() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults from `lookup`; an empty `OPENROUTER_API_KEY` counts as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(HOST_API_KEY_VAR)
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string());
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }
}

/// Resolved variables for the agent process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentConfig {
    vars: BTreeMap<String, String>,
}

impl EnvironmentConfig {
    /// Value of `key`, if resolved.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.get(ENV_BASE_URL)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get(ENV_API_KEY)
    }

    pub fn model(&self) -> Option<&str> {
        self.get(ENV_MODEL)
    }

    /// Number of resolved variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables as owned pairs, sorted by key.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Merge infra-injected variables with the fallbacks.
///
/// Every key in `state.env_vars` is carried over unchanged, including
/// empty values. The endpoint and credential are filled only when absent.
pub fn resolve_environment(state: &TaskState, defaults: &EnvDefaults) -> EnvironmentConfig {
    let mut vars = state.env_vars.clone();
    vars.entry(ENV_BASE_URL.to_string())
        .or_insert_with(|| defaults.base_url.clone());
    vars.entry(ENV_API_KEY.to_string())
        .or_insert_with(|| defaults.api_key.clone());
    EnvironmentConfig { vars }
}
