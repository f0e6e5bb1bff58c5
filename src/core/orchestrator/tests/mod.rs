mod tool_batches;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Semaphore;
use serde_json::json;

use crate::core::llm::{ChatReply, ChatSession, LlmProvider, SearchOutcome, ToolAck};
use crate::core::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::core::persona::Persona;
use crate::core::tools::ToolCallRequest;
use crate::core::transcript::Attachment;

/// Everything the fake backend saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Seen {
    Sent {
        persona: Persona,
        prompt: String,
        attachments: usize,
    },
    Acked(ToolAck),
    ImageRequested {
        prompt: String,
        aspect_ratio: String,
    },
    Searched(String),
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<ChatReply, String>>,
    seen: Vec<Seen>,
    failing_ack: Option<String>,
    sessions_opened: usize,
    /// When set, every `send` waits for a permit before replying.
    gate: Option<Arc<Semaphore>>,
}

/// Fake backend driven by a queue of canned replies.
#[derive(Clone)]
pub(super) struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
    image: String,
}

impl ScriptedProvider {
    pub(super) fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            image: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        }
    }

    pub(super) fn without_images() -> Self {
        Self {
            image: String::new(),
            ..Self::new()
        }
    }

    pub(super) fn reply_text(&self, text: &str) -> &Self {
        self.push(Ok(ChatReply {
            text: text.to_string(),
            tool_calls: Vec::new(),
        }))
    }

    pub(super) fn reply_calls(&self, calls: Vec<ToolCallRequest>) -> &Self {
        self.push(Ok(ChatReply {
            text: String::new(),
            tool_calls: calls,
        }))
    }

    pub(super) fn reply_error(&self, message: &str) -> &Self {
        self.push(Err(message.to_string()))
    }

    /// Hold every reply until the returned semaphore gets a permit.
    pub(super) fn hold_replies(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.script.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub(super) fn fail_ack_for(&self, call_id: &str) {
        self.script.lock().unwrap().failing_ack = Some(call_id.to_string());
    }

    pub(super) fn seen(&self) -> Vec<Seen> {
        self.script.lock().unwrap().seen.clone()
    }

    pub(super) fn acks(&self) -> Vec<ToolAck> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Acked(ack) => Some(ack),
                _ => None,
            })
            .collect()
    }

    pub(super) fn prompts(&self) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Sent { prompt, .. } => Some(prompt),
                _ => None,
            })
            .collect()
    }

    pub(super) fn sessions_opened(&self) -> usize {
        self.script.lock().unwrap().sessions_opened
    }

    fn push(&self, reply: Result<ChatReply, String>) -> &Self {
        self.script.lock().unwrap().replies.push_back(reply);
        self
    }

    fn record(&self, seen: Seen) {
        self.script.lock().unwrap().seen.push(seen);
    }
}

struct ScriptedSession {
    persona: Persona,
    provider: ScriptedProvider,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send(&mut self, prompt: &str, attachments: &[Attachment]) -> Result<ChatReply> {
        self.provider.record(Seen::Sent {
            persona: self.persona,
            prompt: prompt.to_string(),
            attachments: attachments.len(),
        });
        let gate = self.provider.script.lock().unwrap().gate.clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        let next = self.provider.script.lock().unwrap().replies.pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(ChatReply::default()),
        }
    }

    async fn acknowledge(&mut self, ack: ToolAck) -> Result<()> {
        let failing = self.provider.script.lock().unwrap().failing_ack.clone();
        if failing.as_deref() == Some(ack.call_id.as_str()) {
            return Err(anyhow!("connection reset while acknowledging {}", ack.call_id));
        }
        self.provider.record(Seen::Acked(ack));
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open_session(&self, persona: Persona) -> Box<dyn ChatSession> {
        self.script.lock().unwrap().sessions_opened += 1;
        Box::new(ScriptedSession {
            persona,
            provider: self.clone(),
        })
    }

    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> String {
        self.record(Seen::ImageRequested {
            prompt: prompt.to_string(),
            aspect_ratio: aspect_ratio.to_string(),
        });
        self.image.clone()
    }

    async fn search(&self, query: &str) -> Result<SearchOutcome> {
        self.record(Seen::Searched(query.to_string()));
        Ok(SearchOutcome {
            summary: format!("3 hits for {}", query),
            links: Vec::new(),
        })
    }
}

pub(super) fn orchestrator(provider: &ScriptedProvider) -> Orchestrator {
    Orchestrator::new(Arc::new(provider.clone()), OrchestratorSettings::default())
}

pub(super) fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        name: name.to_string(),
        arguments,
        call_id: id.to_string(),
    }
}

pub(super) fn svg_call(id: &str) -> ToolCallRequest {
    call(
        id,
        "render_svg",
        json!({"code": "<svg/>", "description": "dot"}),
    )
}
