//! Chat-completion integration for the agent.
//!
//! Provides the OpenAI-compatible wire types (messages, tool calls, tool
//! declarations), the [`ChatProvider`] seam the agent loop depends on, and
//! the HTTP-backed [`OpenAiClient`].

pub mod client;

pub use client::{
    ChatProvider, ChatRequest, ChatResponse, Choice, FunctionCall, FunctionDefinition, Message,
    OpenAiClient, ToolCall, ToolDefinition, Usage,
};
