//! Agent scaffold: the conversation-and-tool loop that runs inside the sandbox.
//!
//! The scaffold provides tools to the model and manages the loop:
//! 1. Query the chat endpoint with the conversation so far
//! 2. Append the assistant message verbatim
//! 3. Execute each requested tool call in order
//! 4. Append one tool result per call
//! 5. Stop when the model calls no tools or the turn budget is spent
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swe_harbor::llm::OpenAiClient;
//! use swe_harbor::scaffold::{AgentConfig, AgentLoop};
//!
//! let config = AgentConfig::from_env()?;
//! let chat = Arc::new(OpenAiClient::new(&config.base_url, &config.api_key)?);
//! let run = AgentLoop::new(chat, config).run().await?;
//! ```

pub mod agent_loop;
pub mod conversation;
pub mod prompts;
pub mod tools;

pub use agent_loop::{
    on_model_message, AgentConfig, AgentLoop, AgentOutcome, AgentRun, LoopState, DEFAULT_MODEL,
    MAX_TURNS,
};
pub use conversation::Conversation;
pub use prompts::{BUDGET_EXHAUSTED_MESSAGE, DEFAULT_INSTRUCTION_PATH};
pub use tools::{parse_arguments, tool_definitions, ToolDispatcher, ToolError, ToolKind};
