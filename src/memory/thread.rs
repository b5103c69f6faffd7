//! Conversation thread storage
//!
//! Append-only log of one agent's conversation. Every tool message must
//! answer a call announced by the assistant request right before it, and no
//! further user or assistant turn is accepted while calls are unanswered.

use crate::error::OrchestrationError;
use crate::models::MessageRole;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message in the thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Calls requested by this assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_ids: Vec<String>,
    /// Call answered by this tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ThreadMessage {
    fn new(role: MessageRole, content: String) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            tool_call_ids: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// One requested call as recorded in the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall<'a> {
    pub call_id: &'a str,
    /// Tool name as the model sent it
    pub tool: &'a str,
    pub input: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationThread {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: Vec<ThreadMessage>,
    /// Calls announced but not yet answered, in request order
    pending: Vec<String>,
}

impl ConversationThread {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn push_user(&mut self, content: &str) -> Result<&ThreadMessage> {
        self.ensure_no_pending("user")?;
        Ok(self.append(ThreadMessage::new(MessageRole::User, content.to_string())))
    }

    /// Record an assistant turn that asks for tool calls.
    pub fn push_tool_request(&mut self, calls: &[RecordedCall<'_>]) -> Result<&ThreadMessage> {
        self.ensure_no_pending("assistant")?;
        if calls.is_empty() {
            return Err(OrchestrationError::ThreadInvariant(
                "a tool request must name at least one call".to_string(),
            ));
        }

        let content = calls
            .iter()
            .map(|c| format!("{}({:?})", c.tool, c.input))
            .collect::<Vec<_>>()
            .join("; ");

        let mut message = ThreadMessage::new(MessageRole::Assistant, content);
        message.tool_call_ids = calls.iter().map(|c| c.call_id.to_string()).collect();
        self.pending = message.tool_call_ids.clone();

        Ok(self.append(message))
    }

    /// Record the output for one pending call.
    pub fn push_tool_output(&mut self, call_id: &str, output: &str) -> Result<&ThreadMessage> {
        let Some(index) = self.pending.iter().position(|id| id == call_id) else {
            return Err(OrchestrationError::ThreadInvariant(format!(
                "tool output for {} does not answer a pending call",
                call_id
            )));
        };
        self.pending.remove(index);

        let mut message = ThreadMessage::new(MessageRole::Tool, output.to_string());
        message.tool_call_id = Some(call_id.to_string());
        Ok(self.append(message))
    }

    pub fn push_assistant(&mut self, content: &str) -> Result<&ThreadMessage> {
        self.ensure_no_pending("assistant")?;
        Ok(self.append(ThreadMessage::new(MessageRole::Assistant, content.to_string())))
    }

    // =============================
    // Iterators (ZERO ALLOCATION)
    // =============================

    pub fn messages(&self) -> impl Iterator<Item = &ThreadMessage> {
        self.messages.iter()
    }

    pub fn pending_tool_calls(&self) -> &[String] {
        &self.pending
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn ensure_no_pending(&self, role: &str) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::ThreadInvariant(format!(
                "{} message rejected while tool calls {:?} are unanswered",
                role, self.pending
            )))
        }
    }

    fn append(&mut self, message: ThreadMessage) -> &ThreadMessage {
        self.messages.push(message);
        self.updated_at = Utc::now();
        &self.messages[self.messages.len() - 1]
    }
}

impl Default for ConversationThread {
    fn default() -> Self {
        Self::new()
    }
}
