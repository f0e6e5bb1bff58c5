pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::persona::Persona;
use crate::core::tools::ToolCallRequest;
use crate::core::transcript::{Attachment, SearchLink};

/// One reply from the chat backend: either plain text, or a batch of tool
/// calls in the order the backend issued them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Result of a tool call, reported back to the session that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAck {
    pub call_id: String,
    pub tool_name: String,
    pub result: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub summary: String,
    pub links: Vec<SearchLink>,
}

/// A stateful upstream conversation. Turns must be issued in order, and every
/// tool call in a reply has to be acknowledged before the session advances;
/// a batch left unacknowledged is dropped by the next `send`.
#[async_trait]
pub trait ChatSession: Send {
    async fn send(&mut self, prompt: &str, attachments: &[Attachment]) -> Result<ChatReply>;

    async fn acknowledge(&mut self, ack: ToolAck) -> Result<()>;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a fresh conversation configured for the given persona.
    fn open_session(&self, persona: Persona) -> Box<dyn ChatSession>;

    /// Returns a `data:` URI, or an empty string when no image came back.
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> String;

    async fn search(&self, query: &str) -> Result<SearchOutcome>;
}
