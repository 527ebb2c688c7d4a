//! Append-only conversation log owned by one agent run.

use crate::llm::Message;

/// Ordered message history. Messages are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation with one system and one user message.
    pub fn seeded(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
        }
    }

    /// Append a message at the end.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Ids of tool calls that are not immediately followed by their results.
    ///
    /// Each assistant message with N tool calls must be followed by exactly
    /// N tool messages answering those calls in issue order.
    pub fn unpaired_tool_calls(&self) -> Vec<String> {
        let mut unpaired = Vec::new();
        for (i, message) in self.messages.iter().enumerate() {
            for (offset, call) in message.requested_tool_calls().iter().enumerate() {
                let answered = self
                    .messages
                    .get(i + 1 + offset)
                    .map(|m| m.role == "tool" && m.tool_call_id.as_deref() == Some(call.id.as_str()))
                    .unwrap_or(false);
                if !answered {
                    unpaired.push(call.id.clone());
                }
            }
        }
        unpaired
    }
}
