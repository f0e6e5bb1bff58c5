use std::path::Path;

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const GREETING: &str = "I am The Machine. Modular framework loaded. Capable of multi-modal \
                        generation and complex task execution. Awaiting prioritized commands.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Model,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Svg,
    Code,
    Table,
    SearchResult,
    Document,
    AppBuild,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Rendering payload of a transcript entry. The variant decides the entry's
/// content type, so a message can never carry metadata of the wrong shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum Metadata {
    Image {
        src: String,
    },
    Svg {
        code: String,
        description: String,
    },
    Code {
        language: String,
        code: String,
        filename: Option<String>,
        kind: Option<String>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        title: Option<String>,
    },
    SearchResult {
        summary: String,
        links: Vec<SearchLink>,
    },
}

impl Metadata {
    pub fn content_type(&self) -> ContentType {
        match self {
            Metadata::Image { .. } => ContentType::Image,
            Metadata::Svg { .. } => ContentType::Svg,
            Metadata::Code { .. } => ContentType::Code,
            Metadata::Table { .. } => ContentType::Table,
            Metadata::SearchResult { .. } => ContentType::SearchResult,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload, without a `data:` prefix.
    pub data: String,
}

impl Attachment {
    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read attachment {:?}: {}", path, e))?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            mime_type,
            data: BASE64.encode(bytes),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub text_content: String,
    pub content_type: ContentType,
    pub metadata: Option<Metadata>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub is_pending: bool,
}

impl Message {
    /// The user's side of a task. Shares its id with the task.
    pub fn user(id: Uuid, text: &str, attachments: Vec<Attachment>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            text_content: text.to_string(),
            content_type: ContentType::Text,
            metadata: None,
            attachments,
            created_at: Utc::now(),
            is_pending: false,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::Model,
            text_content: text.into(),
            content_type: ContentType::Text,
            metadata: None,
            attachments: Vec::new(),
            created_at: Utc::now(),
            is_pending: false,
        }
    }

    pub fn model_rich(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content_type: metadata.content_type(),
            metadata: Some(metadata),
            ..Self::model_text(text)
        }
    }
}

/// Ordered, append-only conversation log.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript opened with the machine's introduction.
    pub fn with_greeting() -> Self {
        let mut transcript = Self::new();
        transcript.append(Message::model_text(GREETING));
        transcript
    }

    pub fn append(&mut self, message: Message) -> &Message {
        self.entries.push(message);
        &self.entries[self.entries.len() - 1]
    }

    pub fn find(&self, id: Uuid) -> Option<&Message> {
        self.entries.iter().find(|m| m.id == id)
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }
}
