//! Agent execution loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! AwaitingModel --tool calls--> ExecutingTools --results appended--> AwaitingModel
//! AwaitingModel --no tool calls--> Done
//! AwaitingModel --turn budget spent--> BudgetExhausted
//! ```
//!
//! `Done` and `BudgetExhausted` are terminal. A failed chat request ends the
//! run with an error; a failed tool never does.

use std::sync::Arc;
use std::time::Duration;

use super::conversation::Conversation;
use super::prompts::{
    build_system_prompt, build_user_prompt, BUDGET_EXHAUSTED_MESSAGE, DEFAULT_INSTRUCTION_PATH,
};
use super::tools::{tool_definitions, ToolDispatcher, BASH_TIMEOUT_SECS};
use crate::error::LlmError;
use crate::llm::{ChatProvider, ChatRequest, Message, ToolCall, ToolDefinition};

/// Turn budget for one run.
pub const MAX_TURNS: usize = 50;

/// Model used when `OPENAI_MODEL` is unset (OpenRouter naming).
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Environment variable names the agent reads.
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "OPENAI_MODEL";

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Chat-completion endpoint base URL.
    pub base_url: String,
    /// Bearer credential for the endpoint.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Maximum number of model queries.
    pub max_turns: usize,
    /// Timeout for each bash tool call.
    pub bash_timeout: Duration,
    /// Instruction document named in the seed prompts.
    pub instruction_path: String,
}

impl AgentConfig {
    /// Create a configuration with the default model and budget.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_turns: MAX_TURNS,
            bash_timeout: Duration::from_secs(BASH_TIMEOUT_SECS),
            instruction_path: DEFAULT_INSTRUCTION_PATH.to_string(),
        }
    }

    /// Build a configuration from a variable lookup.
    ///
    /// The binary passes `std::env::var`; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL).ok_or(LlmError::MissingApiBase)?;
        let api_key = lookup(ENV_API_KEY).ok_or(LlmError::MissingApiKey)?;
        let mut config = Self::new(base_url, api_key);
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.is_empty()) {
            config.model = model;
        }
        Ok(config)
    }

    /// Read `OPENAI_BASE_URL`, `OPENAI_API_KEY` and `OPENAI_MODEL`.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the maximum number of turns.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the bash tool timeout.
    pub fn with_bash_timeout(mut self, timeout: Duration) -> Self {
        self.bash_timeout = timeout;
        self
    }

    /// Set the instruction document path.
    pub fn with_instruction_path(mut self, path: impl Into<String>) -> Self {
        self.instruction_path = path.into();
        self
    }
}

/// States of the turn loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Waiting for the next model response.
    AwaitingModel,
    /// Running the tool calls of the latest assistant turn, in order.
    ExecutingTools(Vec<ToolCall>),
    /// The model stopped calling tools; carries its non-empty text, if any.
    Done(Option<String>),
    /// The turn budget ran out first.
    BudgetExhausted,
}

impl LoopState {
    /// Whether the loop stops in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::BudgetExhausted)
    }
}

/// Apply one model response to the conversation and pick the next state.
///
/// The assistant message is appended verbatim in both cases.
pub fn on_model_message(conversation: &mut Conversation, message: Message) -> LoopState {
    let calls = message.requested_tool_calls().to_vec();
    let text = message.text().map(str::to_string);
    conversation.push(message);

    if calls.is_empty() {
        LoopState::Done(text)
    } else {
        LoopState::ExecutingTools(calls)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    /// The model finished; carries its final text, if any.
    Completed { final_output: Option<String> },
    /// The turn budget was exhausted.
    BudgetExhausted,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: AgentOutcome,
    /// Number of model queries made.
    pub turns: usize,
    /// Full conversation, for inspection in tests.
    pub conversation: Conversation,
}

impl AgentRun {
    /// Line the process prints on stdout, if any.
    pub fn report(&self) -> Option<&str> {
        match &self.outcome {
            AgentOutcome::Completed { final_output } => final_output.as_deref(),
            AgentOutcome::BudgetExhausted => Some(BUDGET_EXHAUSTED_MESSAGE),
        }
    }
}

/// Main agent execution loop.
pub struct AgentLoop {
    chat: Arc<dyn ChatProvider>,
    dispatcher: ToolDispatcher,
    tools: Vec<ToolDefinition>,
    config: AgentConfig,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(chat: Arc<dyn ChatProvider>, config: AgentConfig) -> Self {
        Self {
            chat,
            dispatcher: ToolDispatcher::new(config.bash_timeout),
            tools: tool_definitions(),
            config,
        }
    }

    /// Run until the model stops calling tools or the budget is spent.
    pub async fn run(&self) -> Result<AgentRun, LlmError> {
        let mut conversation = Conversation::seeded(
            build_system_prompt(&self.config.instruction_path),
            build_user_prompt(&self.config.instruction_path),
        );
        let mut state = LoopState::AwaitingModel;
        let mut turns = 0;

        tracing::info!(
            model = %self.config.model,
            max_turns = self.config.max_turns,
            "Starting agent loop"
        );

        loop {
            state = match state {
                LoopState::AwaitingModel if turns >= self.config.max_turns => {
                    LoopState::BudgetExhausted
                }
                LoopState::AwaitingModel => {
                    turns += 1;
                    let message = self.query_model(&conversation, turns).await?;
                    on_model_message(&mut conversation, message)
                }
                LoopState::ExecutingTools(calls) => {
                    self.execute_tools(&mut conversation, &calls, turns).await;
                    LoopState::AwaitingModel
                }
                LoopState::Done(final_output) => {
                    tracing::info!(turns, "Agent finished");
                    return Ok(AgentRun {
                        outcome: AgentOutcome::Completed { final_output },
                        turns,
                        conversation,
                    });
                }
                LoopState::BudgetExhausted => {
                    tracing::warn!(turns, "Turn budget exhausted");
                    return Ok(AgentRun {
                        outcome: AgentOutcome::BudgetExhausted,
                        turns,
                        conversation,
                    });
                }
            };
        }
    }

    async fn query_model(
        &self,
        conversation: &Conversation,
        turn: usize,
    ) -> Result<Message, LlmError> {
        let request = ChatRequest::new(self.config.model.clone(), conversation.messages().to_vec())
            .with_tools(self.tools.clone());

        let response = self.chat.complete(request).await.map_err(|e| {
            tracing::error!(turn, error = %e, "Chat completion failed");
            e
        })?;
        response.into_first_message()
    }

    /// Dispatch calls strictly in issue order, appending each result.
    async fn execute_tools(&self, conversation: &mut Conversation, calls: &[ToolCall], turn: usize) {
        for call in calls {
            tracing::info!(turn, tool = %call.function.name, call_id = %call.id, "Executing tool");
            let result = self
                .dispatcher
                .dispatch(&call.function.name, &call.function.arguments)
                .await;
            conversation.push(Message::tool_result(&call.id, result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::new("http://proxy", "key");
        assert_eq!(config.max_turns, 50);
        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.bash_timeout, Duration::from_secs(120));
        assert_eq!(config.instruction_path, "/task/instruction.md");
    }

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::new("http://proxy", "key")
            .with_model("gpt-4")
            .with_max_turns(3)
            .with_bash_timeout(Duration::from_secs(5))
            .with_instruction_path("/tmp/instr.md");

        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.bash_timeout, Duration::from_secs(5));
        assert_eq!(config.instruction_path, "/tmp/instr.md");
    }

    #[test]
    fn test_agent_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_URL, "http://proxy/v1"),
            (ENV_API_KEY, "secret"),
            (ENV_MODEL, "served-model"),
        ]
        .into_iter()
        .collect();

        let config = AgentConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "http://proxy/v1");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.model, "served-model");
    }

    #[test]
    fn test_agent_config_from_lookup_defaults_model() {
        let config = AgentConfig::from_lookup(|k| match k {
            ENV_BASE_URL => Some("http://proxy".to_string()),
            ENV_API_KEY => Some("k".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_agent_config_from_lookup_requires_endpoint() {
        let result = AgentConfig::from_lookup(|_| None);
        assert!(matches!(result, Err(LlmError::MissingApiBase)));
    }

    #[test]
    fn test_on_model_message_with_tool_calls() {
        let mut conversation = Conversation::seeded("s", "u");
        let calls = vec![ToolCall::function("c1", "bash", r#"{"command":"ls"}"#)];
        let message = Message::assistant_with_tool_calls(Some("looking".into()), calls.clone());

        let state = on_model_message(&mut conversation, message.clone());
        assert_eq!(state, LoopState::ExecutingTools(calls));
        assert_eq!(conversation.last(), Some(&message));
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_on_model_message_without_tool_calls() {
        let mut conversation = Conversation::seeded("s", "u");
        let state = on_model_message(&mut conversation, Message::assistant("done"));
        assert_eq!(state, LoopState::Done(Some("done".to_string())));
        assert!(state.is_terminal());
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_on_model_message_empty_tool_list_is_done() {
        let mut conversation = Conversation::seeded("s", "u");
        let state = on_model_message(
            &mut conversation,
            Message::assistant_with_tool_calls(Some(String::new()), vec![]),
        );
        assert_eq!(state, LoopState::Done(None));
    }

    #[test]
    fn test_report_for_budget_exhaustion() {
        let run = AgentRun {
            outcome: AgentOutcome::BudgetExhausted,
            turns: 50,
            conversation: Conversation::default(),
        };
        assert_eq!(run.report(), Some("Agent reached maximum number of turns."));
    }
}
