//! Error types for swe-harbor operations.
//!
//! Defines error types for the major subsystems:
//! - Chat-completion API interactions
//! - Sandbox backend operations (exec, upload, lifecycle)
//! - Sandbox provisioning
//! - Task directory loading

use thiserror::Error;

/// Errors that can occur during chat-completion operations.
///
/// Every variant is fatal for an agent run: the loop does not retry.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: OPENAI_BASE_URL environment variable not set")]
    MissingApiBase,

    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse chat response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Chat response contained no choices")]
    EmptyResponse,
}

/// Errors that can occur while talking to a sandbox backend.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Sandbox '{id}' not found")]
    NotFound { id: String },

    #[error("Command execution failed: {0}")]
    ExecFailed(String),

    #[error("Command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to upload '{path}': {reason}")]
    UploadFailed { path: String, reason: String },

    #[error("Failed to create sandbox: {0}")]
    CreateFailed(String),

    #[error("Failed to remove sandbox: {0}")]
    RemoveFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while provisioning a sandbox.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Agent executable not found at '{0}'")]
    AgentAssetMissing(String),

    #[error("Agent executable at '{path}' cannot run in a Linux sandbox: {reason}")]
    AgentAssetInvalid { path: String, reason: String },

    #[error("Failed to stage agent executable: {0}")]
    Staging(#[source] std::io::Error),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Errors that can occur while loading task directories.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task directory '{0}' not found")]
    NotFound(String),

    #[error("Task '{task}' is missing its instruction document at '{path}'")]
    MissingInstruction { task: String, path: String },

    #[error("No tasks matched the requested names: {0}")]
    NoMatchingTasks(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
