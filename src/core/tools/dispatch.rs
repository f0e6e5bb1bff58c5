use anyhow::Result;
use tracing::{info, warn};

use crate::core::integrations::IntegrationRegistry;
use crate::core::llm::LlmProvider;
use crate::core::tools::{
    CreateTableArgs, GenerateAppArgs, GenerateImageArgs, IntegrationArgs, ManageSkillsArgs,
    ToolCall,
};
use crate::core::transcript::{Message, Metadata};

const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// What a handler needs from the outside world.
pub struct DispatchContext<'a> {
    pub provider: &'a dyn LlmProvider,
    pub integrations: &'a IntegrationRegistry,
}

/// Result of one handled tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Transcript entry to append, if the tool produced one.
    pub entry: Option<Message>,
    /// Short machine-readable result for the upstream acknowledgment.
    pub ack: String,
    /// The tool reported its own failure. The batch goes on, but the task
    /// cannot finish as completed.
    pub failed: bool,
}

impl ToolOutcome {
    fn ok(entry: Message, ack: impl Into<String>) -> Self {
        Self {
            entry: Some(entry),
            ack: ack.into(),
            failed: false,
        }
    }
}

/// Run one decoded call to completion. Errors are remote failures the caller
/// must treat as a failed task.
pub async fn dispatch(call: &ToolCall, ctx: &DispatchContext<'_>) -> Result<ToolOutcome> {
    info!("Dispatching tool [{}]", call.name());
    match call {
        ToolCall::GenerateImage(args) => generate_image(args, ctx).await,
        ToolCall::RenderSvg(args) => Ok(ToolOutcome::ok(
            Message::model_rich(
                "Vector Render",
                Metadata::Svg {
                    code: args.code.clone(),
                    description: args.description.clone(),
                },
            ),
            "SVG rendered",
        )),
        ToolCall::CreateTable(args) => Ok(create_table(args)),
        ToolCall::PerformSearch(args) => {
            let found = ctx.provider.search(&args.query).await?;
            let ack = format!("Search found: {}", found.summary);
            Ok(ToolOutcome::ok(
                Message::model_rich(
                    "Search Data",
                    Metadata::SearchResult {
                        summary: found.summary,
                        links: found.links,
                    },
                ),
                ack,
            ))
        }
        ToolCall::GenerateApp(args) => Ok(generate_app(args)),
        ToolCall::UseIntegrationService(args) => Ok(use_integration(args, ctx.integrations)),
        ToolCall::ManageSkills(args) => Ok(manage_skills(args)),
    }
}

async fn generate_image(args: &GenerateImageArgs, ctx: &DispatchContext<'_>) -> Result<ToolOutcome> {
    let ratio = args
        .aspect_ratio
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(DEFAULT_ASPECT_RATIO);
    let src = ctx.provider.generate_image(&args.prompt, ratio).await;
    if src.is_empty() {
        warn!("Image generation returned no data for prompt: {}", args.prompt);
        return Ok(ToolOutcome {
            entry: Some(Message::model_text(format!(
                "Image generation failed: no image data returned for \"{}\".",
                args.prompt
            ))),
            ack: "Failed: Image generation returned no data.".to_string(),
            failed: true,
        });
    }
    Ok(ToolOutcome::ok(
        Message::model_rich(args.prompt.clone(), Metadata::Image { src }),
        "Image created",
    ))
}

fn create_table(args: &CreateTableArgs) -> ToolOutcome {
    ToolOutcome::ok(
        Message::model_rich(
            "Data Grid",
            Metadata::Table {
                headers: args.headers.clone(),
                rows: args.rows.clone(),
                title: args.title.clone(),
            },
        ),
        "Table displayed",
    )
}

fn generate_app(args: &GenerateAppArgs) -> ToolOutcome {
    let text = args
        .instructions
        .clone()
        .filter(|i| !i.trim().is_empty())
        .unwrap_or_else(|| "App Module Generated".to_string());
    ToolOutcome::ok(
        Message::model_rich(
            text,
            Metadata::Code {
                language: args.language.clone(),
                code: args.code.clone(),
                filename: args.filename.clone(),
                kind: args.kind.clone(),
            },
        ),
        "App code displayed",
    )
}

/// A disconnected service is an expected answer, not a fault: the task still
/// completes and the user is told how to fix it.
fn use_integration(args: &IntegrationArgs, integrations: &IntegrationRegistry) -> ToolOutcome {
    let service = args.service.to_uppercase();
    if integrations.is_connected(&args.service) {
        let payload = args.payload.as_deref().unwrap_or("(none)");
        ToolOutcome::ok(
            Message::model_text(format!(
                "Executing '{}' on {}...\nPayload: {}",
                args.action, service, payload
            )),
            "Action executed successfully via MCP.",
        )
    } else {
        info!("Integration {} requested while disconnected", args.service);
        ToolOutcome::ok(
            Message::model_text(format!(
                "Error: Service {} is not connected. Please connect it in the Integration Bus.",
                service
            )),
            "Failed: Service disconnected.",
        )
    }
}

fn manage_skills(args: &ManageSkillsArgs) -> ToolOutcome {
    ToolOutcome::ok(
        Message::model_text(format!(
            "Skill System Update: {} -> {}",
            args.action.to_uppercase(),
            args.skill
        )),
        "Skill database updated.",
    )
}
