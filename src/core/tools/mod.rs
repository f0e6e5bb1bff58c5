//! Tools the chat backend may call, their advertised schemas, and the
//! closed set of decoded calls the dispatcher understands.

mod dispatch;
mod schema;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::queue::TaskKind;

pub use dispatch::{DispatchContext, dispatch};
pub use schema::{ToolDeclaration, declarations};

/// A raw call as produced by the backend, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
    pub call_id: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageArgs {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderSvgArgs {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateTableArgs {
    #[serde(default)]
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PerformSearchArgs {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateAppArgs {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntegrationArgs {
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManageSkillsArgs {
    pub action: String,
    pub skill: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Every tool the dispatcher can run. Adding a tool means adding a variant,
/// a schema entry and a handler arm.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    GenerateImage(GenerateImageArgs),
    RenderSvg(RenderSvgArgs),
    CreateTable(CreateTableArgs),
    PerformSearch(PerformSearchArgs),
    GenerateApp(GenerateAppArgs),
    UseIntegrationService(IntegrationArgs),
    ManageSkills(ManageSkillsArgs),
}

pub const TOOL_NAMES: [&str; 7] = [
    "generate_image",
    "render_svg",
    "create_table",
    "perform_search",
    "generate_app",
    "use_integration_service",
    "manage_skills",
];

impl ToolCall {
    pub fn decode(request: &ToolCallRequest) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&request.name.as_str()) {
            return Err(ToolError::UnknownTool(request.name.clone()));
        }
        // A missing argument object decodes like an empty one.
        let arguments = if request.arguments.is_null() {
            serde_json::json!({})
        } else {
            request.arguments.clone()
        };
        serde_json::from_value(serde_json::json!({
            "name": request.name,
            "arguments": arguments,
        }))
        .map_err(|source| ToolError::InvalidArguments {
            tool: request.name.clone(),
            source,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GenerateImage(_) => "generate_image",
            ToolCall::RenderSvg(_) => "render_svg",
            ToolCall::CreateTable(_) => "create_table",
            ToolCall::PerformSearch(_) => "perform_search",
            ToolCall::GenerateApp(_) => "generate_app",
            ToolCall::UseIntegrationService(_) => "use_integration_service",
            ToolCall::ManageSkills(_) => "manage_skills",
        }
    }
}

/// Task classification implied by a tool name. Unknown names fall into the
/// generic bucket so a task can be reclassified before decoding fails.
pub fn task_kind_for(tool_name: &str) -> TaskKind {
    match tool_name {
        "generate_image" => TaskKind::ImageGeneration,
        "generate_app" => TaskKind::CodeSynthesis,
        "use_integration_service" => TaskKind::IntegrationBus,
        _ => TaskKind::ToolExecution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str, arguments: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            name: name.to_string(),
            arguments,
            call_id: "call-1".to_string(),
        }
    }

    #[test]
    fn decodes_image_call_with_camel_case_ratio() {
        let call = ToolCall::decode(&request(
            "generate_image",
            json!({"prompt": "a cat", "aspectRatio": "16:9"}),
        ))
        .unwrap();
        assert_eq!(
            call,
            ToolCall::GenerateImage(GenerateImageArgs {
                prompt: "a cat".into(),
                aspect_ratio: Some("16:9".into()),
            })
        );
    }

    #[test]
    fn decodes_nested_table_rows() {
        let call = ToolCall::decode(&request(
            "create_table",
            json!({"headers": ["a", "b"], "rows": [["1", "2"], ["3", "4"]]}),
        ))
        .unwrap();
        let ToolCall::CreateTable(args) = call else {
            panic!("expected table call");
        };
        assert_eq!(args.rows.len(), 2);
        assert!(args.title.is_none());
    }

    #[test]
    fn app_type_field_maps_to_kind() {
        let call = ToolCall::decode(&request(
            "generate_app",
            json!({"language": "rust", "code": "fn main() {}", "type": "cli"}),
        ))
        .unwrap();
        let ToolCall::GenerateApp(args) = call else {
            panic!("expected app call");
        };
        assert_eq!(args.kind.as_deref(), Some("cli"));
    }

    #[test]
    fn missing_required_argument_is_invalid() {
        let err = ToolCall::decode(&request("perform_search", json!({}))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == "perform_search"));
    }

    #[test]
    fn null_arguments_are_invalid_for_tools_with_required_params() {
        let err = ToolCall::decode(&request("manage_skills", serde_json::Value::Null)).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = ToolCall::decode(&request("format_disk", json!({}))).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "format_disk"));
    }

    #[test]
    fn decoded_name_round_trips() {
        let call = ToolCall::decode(&request(
            "use_integration_service",
            json!({"service": "github", "action": "fetch_issues"}),
        ))
        .unwrap();
        assert_eq!(call.name(), "use_integration_service");
    }

    #[test]
    fn task_kind_follows_tool_family() {
        assert_eq!(task_kind_for("generate_image"), TaskKind::ImageGeneration);
        assert_eq!(task_kind_for("generate_app"), TaskKind::CodeSynthesis);
        assert_eq!(
            task_kind_for("use_integration_service"),
            TaskKind::IntegrationBus
        );
        assert_eq!(task_kind_for("render_svg"), TaskKind::ToolExecution);
        assert_eq!(task_kind_for("nonsense"), TaskKind::ToolExecution);
    }
}
