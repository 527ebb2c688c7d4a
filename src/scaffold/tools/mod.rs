//! Tool definitions and dispatch for the agent loop.
//!
//! The agent exposes exactly four tools. Dispatch is a fixed match over
//! [`ToolKind`]; every call produces result text, never an error, so a
//! broken tool call becomes conversation content for the next turn.

pub mod bash;
pub mod file;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::llm::ToolDefinition;

pub use bash::{format_output, run_command, BashParams, BASH_TIMEOUT_SECS};
pub use file::{
    read_file, str_replace, write_file, ReadFileParams, StrReplaceParams, WriteFileParams,
};

/// Failures a tool body can raise past its own handled I/O errors.
///
/// These are rendered by the dispatcher as `Error executing <name>: <cause>`.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not match the tool's parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The shell command exceeded its timeout.
    #[error("Command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Spawn, wait, or write failure.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// The four tools the agent can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Bash,
    ReadFile,
    WriteFile,
    StrReplace,
}

impl ToolKind {
    /// All tools, in declaration order.
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Bash,
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::StrReplace,
    ];

    /// Wire name of the tool.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::StrReplace => "str_replace",
        }
    }

    /// Look a tool up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Bash => "Execute a shell command and return stdout, stderr, and exit code.",
            Self::ReadFile => "Read and return the contents of a file.",
            Self::WriteFile => {
                "Create or overwrite a file with the given content. Creates parent directories as needed."
            }
            Self::StrReplace => {
                "Replace exactly one occurrence of a string in a file. Fails if the string appears zero or more than one time."
            }
        }
    }

    /// JSON schema for the tool's parameters.
    pub fn parameters_schema(self) -> Value {
        let path = serde_json::json!({
            "type": "string",
            "description": "Absolute path to the file."
        });

        match self {
            Self::Bash => serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to run."
                    }
                },
                "required": ["command"]
            }),
            Self::ReadFile => serde_json::json!({
                "type": "object",
                "properties": { "path": path },
                "required": ["path"]
            }),
            Self::WriteFile => serde_json::json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "content": {
                        "type": "string",
                        "description": "The content to write."
                    }
                },
                "required": ["path", "content"]
            }),
            Self::StrReplace => serde_json::json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "old_str": {
                        "type": "string",
                        "description": "The exact string to find (must appear exactly once)."
                    },
                    "new_str": {
                        "type": "string",
                        "description": "The replacement string."
                    }
                },
                "required": ["path", "old_str", "new_str"]
            }),
        }
    }

    /// Declaration sent to the chat endpoint.
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters_schema())
    }
}

/// Declarations for all four tools.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolKind::ALL.into_iter().map(ToolKind::definition).collect()
}

/// Decode a serialized argument payload.
///
/// Anything that is not a JSON object yields an empty object, so a malformed
/// payload surfaces as a missing-field error from the tool's parameters.
pub fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            tracing::debug!("Tool arguments are not an object, using empty set");
            Value::Object(Map::new())
        }
        Err(e) => {
            tracing::debug!(error = %e, "Malformed tool arguments, using empty set");
            Value::Object(Map::new())
        }
    }
}

/// Deserialize a tool's typed parameters.
fn parse_params<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// Runs tool calls and renders every outcome as text.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    bash_timeout: Duration,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(BASH_TIMEOUT_SECS))
    }
}

impl ToolDispatcher {
    /// Dispatcher whose bash calls time out after `bash_timeout`.
    pub fn new(bash_timeout: Duration) -> Self {
        Self { bash_timeout }
    }

    /// Execute one tool call. Total: always returns result text.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> String {
        let Some(kind) = ToolKind::from_name(name) else {
            tracing::warn!(tool = name, "Model requested unknown tool");
            return format!("Unknown tool: {}", name);
        };

        let args = parse_arguments(raw_arguments);
        match self.execute(kind, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "Tool execution failed");
                format!("Error executing {}: {}", name, e)
            }
        }
    }

    async fn execute(&self, kind: ToolKind, args: Value) -> Result<String, ToolError> {
        match kind {
            ToolKind::Bash => {
                let params: BashParams = parse_params(args)?;
                run_command(&params.command, self.bash_timeout).await
            }
            ToolKind::ReadFile => {
                let params: ReadFileParams = parse_params(args)?;
                Ok(read_file(&params.path).await)
            }
            ToolKind::WriteFile => {
                let params: WriteFileParams = parse_params(args)?;
                Ok(write_file(&params.path, &params.content).await)
            }
            ToolKind::StrReplace => {
                let params: StrReplaceParams = parse_params(args)?;
                str_replace(&params.path, &params.old_str, &params.new_str).await
            }
        }
    }
}
