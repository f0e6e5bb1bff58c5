use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::config::GeminiConfig;
use crate::core::llm::{ChatReply, ChatSession, LlmProvider, SearchOutcome, ToolAck};
use crate::core::persona::Persona;
use crate::core::tools::{self, ToolCallRequest, ToolDeclaration};
use crate::core::transcript::{Attachment, SearchLink};

const SEARCH_FAILED: &str = "Search failed. Please try again.";
const NO_RESULTS: &str = "No results found.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    /// Opaque token the API wants echoed back with the model turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    function_declarations: Option<Vec<ToolDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<GoogleSearch>,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl GenerateResponse {
    fn first_content(&self) -> Option<&Content> {
        self.candidates.first().and_then(|c| c.content.as_ref())
    }

    /// Visible text of the first candidate, thoughts excluded.
    fn text(&self) -> String {
        self.first_content()
            .map(visible_text)
            .unwrap_or_default()
    }

    fn first_inline_data(&self) -> Option<&InlineData> {
        self.first_content()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }

    fn grounding_links(&self) -> Vec<SearchLink> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .map(|web| SearchLink {
                        title: web.title.clone().unwrap_or_default(),
                        url: web.uri.clone().unwrap_or_default(),
                        snippet: "Source link".to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn visible_text(content: &Content) -> String {
    content
        .parts
        .iter()
        .filter(|p| !p.is_thought())
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

/// Shared HTTP plumbing for the provider and its sessions.
#[derive(Clone)]
struct GeminiApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiApi {
    async fn generate(&self, model: &str, req: &GenerateRequest<'_>) -> Result<GenerateResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            model,
            self.api_key
        );
        debug!("POST generateContent model={}", model);
        let res = self.client.post(&url).json(req).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(anyhow!(
                "Google Gemini API Error ({}): {}",
                status,
                res.text().await.unwrap_or_default()
            ));
        }
        Ok(res.json().await?)
    }
}

pub struct GoogleProvider {
    api: GeminiApi,
    chat_model: String,
    image_model: String,
    search_model: String,
    thinking_budget: u32,
}

impl GoogleProvider {
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            api: GeminiApi {
                client,
                base_url: config.base_url.clone(),
                api_key,
            },
            chat_model: config.chat_model.clone(),
            image_model: config.image_model.clone(),
            search_model: config.search_model.clone(),
            thinking_budget: config.thinking_budget,
        })
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn open_session(&self, persona: Persona) -> Box<dyn ChatSession> {
        info!("Opening Gemini session (model={}, persona={})", self.chat_model, persona);
        Box::new(GeminiSession {
            api: self.api.clone(),
            model: self.chat_model.clone(),
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(persona.system_instruction())],
            },
            declarations: tools::declarations(),
            thinking_budget: self.thinking_budget,
            history: Vec::new(),
            outstanding: Vec::new(),
            responses: Vec::new(),
        })
    }

    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> String {
        let contents = [Content::user(vec![Part::text(prompt)])];
        let req = GenerateRequest {
            contents: &contents,
            system_instruction: None,
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
                ..GenerationConfig::default()
            }),
        };
        match self.api.generate(&self.image_model, &req).await {
            Ok(res) => match res.first_inline_data() {
                Some(img) => format!("data:{};base64,{}", img.mime_type, img.data),
                None => {
                    warn!("Image generation failed: no image data returned");
                    String::new()
                }
            },
            Err(e) => {
                warn!("Image generation failed: {}", e);
                String::new()
            }
        }
    }

    async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let contents = [Content::user(vec![Part::text(query)])];
        let req = GenerateRequest {
            contents: &contents,
            system_instruction: None,
            tools: vec![ToolSet {
                google_search: Some(GoogleSearch {}),
                ..ToolSet::default()
            }],
            generation_config: None,
        };
        match self.api.generate(&self.search_model, &req).await {
            Ok(res) => {
                let text = res.text();
                Ok(SearchOutcome {
                    summary: if text.trim().is_empty() {
                        NO_RESULTS.to_string()
                    } else {
                        text
                    },
                    links: res.grounding_links(),
                })
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                Ok(SearchOutcome {
                    summary: SEARCH_FAILED.to_string(),
                    links: Vec::new(),
                })
            }
        }
    }
}

/// One multi-turn conversation. History is replayed on every request.
pub struct GeminiSession {
    api: GeminiApi,
    model: String,
    system_instruction: Content,
    declarations: Vec<ToolDeclaration>,
    thinking_budget: u32,
    history: Vec<Content>,
    /// Calls of the current batch still waiting for an ack: (local id, upstream id).
    outstanding: Vec<(String, Option<String>)>,
    responses: Vec<Part>,
}

impl GeminiSession {
    async fn request(&self) -> Result<GenerateResponse> {
        let req = GenerateRequest {
            contents: &self.history,
            system_instruction: Some(&self.system_instruction),
            tools: vec![ToolSet {
                function_declarations: Some(self.declarations.clone()),
                ..ToolSet::default()
            }],
            generation_config: Some(GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: self.thinking_budget,
                }),
                ..GenerationConfig::default()
            }),
        };
        self.api.generate(&self.model, &req).await
    }

    /// Send every buffered function response upstream as one turn.
    async fn flush_responses(&mut self) -> Result<()> {
        let parts = std::mem::take(&mut self.responses);
        debug!("Flushing {} function response(s)", parts.len());
        self.history.push(Content::user(parts));
        let res = match self.request().await {
            Ok(res) => res,
            Err(e) => {
                self.rewind_batch();
                return Err(e);
            }
        };

        // The follow-up only narrates what the tools already showed. Keep its
        // text for context; calls in it are never answered, so drop them.
        if let Some(content) = res.first_content() {
            let parts: Vec<Part> = content
                .parts
                .iter()
                .filter(|p| p.function_call.is_none())
                .cloned()
                .collect();
            if parts.len() != content.parts.len() {
                debug!("Ignoring tool calls in the acknowledgment reply");
            }
            if !parts.is_empty() {
                self.history.push(Content {
                    role: Some("model".to_string()),
                    parts,
                });
            }
        }
        Ok(())
    }

    /// Forget an unfinished tool batch along with the prompt that started it.
    /// The API rejects histories with unanswered calls.
    fn rewind_batch(&mut self) {
        self.outstanding.clear();
        self.responses.clear();
        if any_part(self.history.last(), |p| p.function_response.is_some()) {
            self.history.pop();
        }
        if any_part(self.history.last(), |p| p.function_call.is_some()) {
            self.history.pop();
            if self.history.last().is_some_and(|c| c.role.as_deref() == Some("user")) {
                self.history.pop();
            }
        }
    }
}

fn any_part(content: Option<&Content>, pred: impl Fn(&Part) -> bool) -> bool {
    content.is_some_and(|c| c.parts.iter().any(pred))
}

/// Split a model turn into visible text and tool calls. Calls without an
/// upstream id get a local one.
fn parse_reply(content: &Content) -> (ChatReply, Vec<(String, Option<String>)>) {
    let mut ids = Vec::new();
    let tool_calls = content
        .parts
        .iter()
        .filter_map(|p| p.function_call.as_ref())
        .map(|fc| {
            let call_id = fc
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            ids.push((call_id.clone(), fc.id.clone()));
            ToolCallRequest {
                name: fc.name.clone(),
                arguments: fc.args.clone(),
                call_id,
            }
        })
        .collect();
    (
        ChatReply {
            text: visible_text(content),
            tool_calls,
        },
        ids,
    )
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(&mut self, prompt: &str, attachments: &[Attachment]) -> Result<ChatReply> {
        if !self.outstanding.is_empty() {
            warn!(
                "Discarding {} unacknowledged tool call(s) from an abandoned turn",
                self.outstanding.len()
            );
            self.rewind_batch();
        }

        let mut parts = Vec::with_capacity(attachments.len() + 1);
        if !prompt.is_empty() || attachments.is_empty() {
            parts.push(Part::text(prompt));
        }
        parts.extend(attachments.iter().map(|att| Part {
            inline_data: Some(InlineData {
                mime_type: att.mime_type.clone(),
                data: att.data.clone(),
            }),
            ..Part::default()
        }));
        self.history.push(Content::user(parts));

        let res = match self.request().await {
            Ok(res) => res,
            Err(e) => {
                // Leave history as it was so the session stays usable.
                self.history.pop();
                return Err(e);
            }
        };

        let Some(mut content) = res.first_content().cloned() else {
            warn!("Gemini returned no candidates");
            self.history.pop();
            return Ok(ChatReply::default());
        };
        content.role = Some("model".to_string());
        let (reply, ids) = parse_reply(&content);
        info!(
            "Gemini replied: {} chars, {} tool call(s)",
            reply.text.len(),
            reply.tool_calls.len()
        );
        self.outstanding = ids;
        self.history.push(content);
        Ok(reply)
    }

    async fn acknowledge(&mut self, ack: ToolAck) -> Result<()> {
        let pos = self
            .outstanding
            .iter()
            .position(|(local, _)| *local == ack.call_id)
            .ok_or_else(|| anyhow!("No pending tool call with id {}", ack.call_id))?;
        let (_, upstream_id) = self.outstanding.remove(pos);
        self.responses.push(Part {
            function_response: Some(FunctionResponse {
                id: upstream_id,
                name: ack.tool_name,
                response: json!({ "result": ack.result }),
            }),
            ..Part::default()
        });

        if self.outstanding.is_empty() {
            self.flush_responses().await?;
        }
        Ok(())
    }
}
