//! OpenAI-compatible chat-completion client with native tool calling.
//!
//! The agent talks to whatever endpoint `OPENAI_BASE_URL` names: an
//! interception proxy on managed infra, or OpenRouter for local runs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::LlmError;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 600;

/// A message in a chat conversation.
///
/// Fields the client does not model explicitly are kept in `extra` so an
/// assistant message can be sent back to the endpoint exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant", "tool").
    pub role: String,
    /// Text content. Assistant turns that only call tools may carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Identifier of the call a tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Provider-specific fields, round-tripped untouched.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Message {
    fn with_role(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content.into())
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content.into())
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            extra: Map::new(),
        }
    }

    /// Tool calls carried by this message, empty when there are none.
    pub fn requested_tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// Non-empty text content, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// A tool call emitted by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier echoed back in the matching tool result.
    pub id: String,
    /// Call type, always "function" for this protocol.
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    /// Function name and serialized arguments.
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Create a function tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus its JSON-encoded argument payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as the model serialized them; may be malformed.
    #[serde(default)]
    pub arguments: String,
}

/// A tool declaration sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Name, description and JSON schema of a declared function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Declare a function tool.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    /// Create a new chat request.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
        }
    }

    /// Attach tool declarations.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Response from a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Take the first choice's message, failing if there is none.
    pub fn into_first_message(self) -> Result<Message, LlmError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// A single generated choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Anything that can answer a chat-completion request.
///
/// The agent loop only depends on this trait, so tests drive it with
/// scripted responses instead of a live endpoint.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send one request and wait for the full response.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    http_client: Client,
}

impl OpenAiClient {
    /// Create a client for `base_url` (e.g. "https://openrouter.ai/api/v1").
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http_client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = self.completions_url();
        tracing::debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(_) => error_text,
            };

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let body = http_response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        if let Some(ref usage) = response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Chat completion usage"
            );
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content.as_deref(), Some("You are helpful."));

        let tool = Message::tool_result("call_1", "ok");
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_message_serialization_omits_absent_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_assistant_message_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "role": "assistant",
            "content": null,
            "refusal": null,
            "reasoning": "thinking",
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "bash", "arguments": "{\"command\":\"ls\"}"}
            }]
        });

        let message: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(message.requested_tool_calls().len(), 1);
        assert_eq!(message.extra.get("reasoning"), Some(&Value::from("thinking")));

        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["reasoning"], "thinking");
        assert_eq!(back["tool_calls"][0]["function"]["name"], "bash");
        assert!(back.get("content").is_none());
    }

    #[test]
    fn test_text_ignores_empty_content() {
        assert_eq!(Message::assistant("").text(), None);
        assert_eq!(Message::assistant("done").text(), Some("done"));
    }

    #[test]
    fn test_request_serialization_skips_empty_tools() {
        let request = ChatRequest::new("openai/gpt-4o", vec![Message::user("test")]);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"openai/gpt-4o\""));
        assert!(!json.contains("tools"));
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let response = ChatResponse {
            id: None,
            model: None,
            choices: vec![],
            usage: None,
        };
        assert!(matches!(
            response.into_first_message(),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let client = OpenAiClient::new("https://openrouter.ai/api/v1/", "key").unwrap();
        assert_eq!(
            client.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_complete_connection_error() {
        let client = OpenAiClient::new("http://localhost:65535", "key").unwrap();
        let request = ChatRequest::new("gpt-4", vec![Message::user("test")]);

        let result = client.complete(request).await;
        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
    }

    /// Serve a single canned HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_complete_parses_tool_calls() {
        let body = r#"{"id":"r1","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":null,"tool_calls":[{"id":"call_1","type":"function","function":{"name":"read_file","arguments":"{\"path\":\"/task/instruction.md\"}"}}]},"finish_reason":"tool_calls"}]}"#;
        let base = serve_once("HTTP/1.1 200 OK", body).await;
        let client = OpenAiClient::new(base, "key").unwrap();

        let response = client
            .complete(ChatRequest::new("m", vec![Message::user("go")]))
            .await
            .unwrap();
        let message = response.into_first_message().unwrap();
        assert_eq!(message.requested_tool_calls()[0].function.name, "read_file");
    }

    #[tokio::test]
    async fn test_complete_maps_rate_limit() {
        let body = r#"{"error":{"message":"slow down"}}"#;
        let base = serve_once("HTTP/1.1 429 Too Many Requests", body).await;
        let client = OpenAiClient::new(base, "key").unwrap();

        let result = client
            .complete(ChatRequest::new("m", vec![Message::user("go")]))
            .await;
        assert!(matches!(result, Err(LlmError::RateLimited(ref m)) if m == "slow down"));
    }
}
