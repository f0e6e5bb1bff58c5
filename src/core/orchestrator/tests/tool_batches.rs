use serde_json::json;

use super::{ScriptedProvider, Seen, call, orchestrator, svg_call};
use crate::core::queue::{TaskKind, TaskPriority, TaskStatus};
use crate::core::transcript::{ContentType, Metadata, MessageRole};

#[tokio::test]
async fn text_reply_appends_exactly_one_model_entry() {
    let provider = ScriptedProvider::new();
    provider.reply_text("Hello, operator.");
    let mut orch = orchestrator(&provider);
    orch.submit_task("hi", Vec::new(), TaskPriority::Medium)
        .unwrap();
    let before = orch.messages().len();

    let outcome = orch.run_next().await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    let new = &orch.messages()[before..];
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].role, MessageRole::Model);
    assert_eq!(new[0].content_type, ContentType::Text);
    assert_eq!(new[0].text_content, "Hello, operator.");
    assert_eq!(orch.tasks()[0].progress, 100);
}

#[tokio::test]
async fn empty_reply_is_a_silent_completed_turn() {
    let provider = ScriptedProvider::new();
    provider.reply_text("");
    let mut orch = orchestrator(&provider);
    orch.submit_task("say nothing", Vec::new(), TaskPriority::Low)
        .unwrap();
    let before = orch.messages().len();

    let outcome = orch.run_next().await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(orch.messages().len(), before);
}

#[tokio::test]
async fn every_call_is_acknowledged_once_in_order() {
    let provider = ScriptedProvider::new();
    provider.reply_calls(vec![
        svg_call("c1"),
        call(
            "c2",
            "create_table",
            json!({"headers": ["k", "v"], "rows": [["a", "1"]], "title": "T"}),
        ),
        call("c3", "perform_search", json!({"query": "tokio"})),
    ]);
    let mut orch = orchestrator(&provider);
    orch.submit_task("do three things", Vec::new(), TaskPriority::High)
        .unwrap();
    let before = orch.messages().len();

    let outcome = orch.run_next().await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Completed);

    let acks = provider.acks();
    let ids: Vec<&str> = acks.iter().map(|a| a.call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert_eq!(acks[0].result, "SVG rendered");
    assert_eq!(acks[1].result, "Table displayed");
    assert_eq!(acks[2].result, "Search found: 3 hits for tokio");
    assert_eq!(acks[2].tool_name, "perform_search");

    let types: Vec<ContentType> = orch.messages()[before..]
        .iter()
        .map(|m| m.content_type)
        .collect();
    assert_eq!(
        types,
        vec![
            ContentType::Svg,
            ContentType::Table,
            ContentType::SearchResult
        ]
    );
}

#[tokio::test]
async fn search_runs_before_its_ack_and_before_the_next_call() {
    let provider = ScriptedProvider::new();
    provider.reply_calls(vec![
        call("s1", "perform_search", json!({"query": "first"})),
        call("s2", "perform_search", json!({"query": "second"})),
    ]);
    let mut orch = orchestrator(&provider);
    orch.submit_task("search twice", Vec::new(), TaskPriority::Low)
        .unwrap();
    orch.run_next().await.unwrap();

    let order: Vec<String> = provider
        .seen()
        .into_iter()
        .filter_map(|s| match s {
            Seen::Searched(q) => Some(format!("search:{}", q)),
            Seen::Acked(a) => Some(format!("ack:{}", a.call_id)),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec!["search:first", "ack:s1", "search:second", "ack:s2"]
    );
}

#[tokio::test]
async fn task_kind_follows_the_last_tool_family() {
    let provider = ScriptedProvider::new();
    provider.reply_calls(vec![call(
        "img",
        "generate_image",
        json!({"prompt": "a cat in space"}),
    )]);
    provider.reply_calls(vec![call(
        "app",
        "generate_app",
        json!({"language": "rust", "code": "fn main() {}", "filename": "main.rs"}),
    )]);
    provider.reply_calls(vec![svg_call("svg")]);
    let mut orch = orchestrator(&provider);
    let image = orch
        .submit_task("Draw a cat", Vec::new(), TaskPriority::High)
        .unwrap();
    let app = orch
        .submit_task("Build an app", Vec::new(), TaskPriority::Medium)
        .unwrap();
    let svg = orch
        .submit_task("Draw a logo", Vec::new(), TaskPriority::Low)
        .unwrap();
    orch.drain().await;

    let kind = |id| orch.tasks().iter().find(|t| t.id == id).unwrap().kind;
    assert_eq!(kind(image), TaskKind::ImageGeneration);
    assert_eq!(kind(app), TaskKind::CodeSynthesis);
    assert_eq!(kind(svg), TaskKind::ToolExecution);
}

#[tokio::test]
async fn image_call_uses_default_ratio_and_appends_image_entry() {
    let provider = ScriptedProvider::new();
    provider.reply_calls(vec![call(
        "img",
        "generate_image",
        json!({"prompt": "neon city"}),
    )]);
    let mut orch = orchestrator(&provider);
    orch.submit_task("city", Vec::new(), TaskPriority::Low)
        .unwrap();
    orch.run_next().await.unwrap();

    assert!(provider.seen().contains(&Seen::ImageRequested {
        prompt: "neon city".into(),
        aspect_ratio: "1:1".into(),
    }));
    let last = orch.messages().last().unwrap();
    assert_eq!(last.text_content, "neon city");
    assert!(matches!(last.metadata, Some(Metadata::Image { ref src }) if src.starts_with("data:image/png")));
    assert_eq!(provider.acks()[0].result, "Image created");
}

#[tokio::test]
async fn disconnected_integration_still_completes() {
    let provider = ScriptedProvider::new();
    provider.reply_calls(vec![call(
        "gh",
        "use_integration_service",
        json!({"service": "github", "action": "fetch_issues"}),
    )]);
    let mut orch = orchestrator(&provider);
    let id = orch
        .submit_task("show my issues", Vec::new(), TaskPriority::Medium)
        .unwrap();

    let outcome = orch.run_next().await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    let last = orch.messages().last().unwrap();
    assert_eq!(last.content_type, ContentType::Text);
    assert!(last.text_content.contains("not connected"));
    assert_eq!(provider.acks()[0].result, "Failed: Service disconnected.");
    let task = orch.tasks().iter().find(|t| t.id == id).unwrap();
    assert_eq!(task.kind, TaskKind::IntegrationBus);
}

#[tokio::test]
async fn connected_integration_reports_execution() {
    let provider = ScriptedProvider::new();
    provider.reply_calls(vec![call(
        "gh",
        "use_integration_service",
        json!({"service": "github", "action": "fetch_issues", "payload": "{}"}),
    )]);
    let mut orch = orchestrator(&provider);
    assert_eq!(orch.toggle_service("github"), Some(true));
    orch.submit_task("show my issues", Vec::new(), TaskPriority::Medium)
        .unwrap();
    orch.run_next().await.unwrap();

    assert_eq!(
        orch.messages().last().unwrap().text_content,
        "Executing 'fetch_issues' on GITHUB...\nPayload: {}"
    );
    assert_eq!(
        provider.acks()[0].result,
        "Action executed successfully via MCP."
    );
}

#[tokio::test]
async fn empty_image_result_fails_the_task_with_a_reason() {
    let provider = ScriptedProvider::without_images();
    provider.reply_calls(vec![
        call("img", "generate_image", json!({"prompt": "a cat"})),
        svg_call("after"),
    ]);
    let mut orch = orchestrator(&provider);
    orch.submit_task("cat", Vec::new(), TaskPriority::High)
        .unwrap();
    let before = orch.messages().len();

    let outcome = orch.run_next().await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(orch.tasks()[0].progress, 0);
    // The batch went on: both calls were acknowledged.
    assert_eq!(provider.acks().len(), 2);
    let new = &orch.messages()[before..];
    assert_eq!(new.len(), 2);
    assert!(new[0].text_content.starts_with("Image generation failed"));
    assert_eq!(new[1].content_type, ContentType::Svg);
}

#[tokio::test]
async fn attachments_reach_the_backend_with_full_prompt() {
    use crate::core::transcript::Attachment;

    let provider = ScriptedProvider::new();
    provider.reply_text("nice picture");
    let mut orch = orchestrator(&provider);
    let long_prompt = "Describe this photo in great detail please, every pixel";
    let id = orch
        .submit_task(
            long_prompt,
            vec![Attachment {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            }],
            TaskPriority::Low,
        )
        .unwrap();
    orch.run_next().await.unwrap();

    assert!(orch.tasks().iter().find(|t| t.id == id).unwrap().title.ends_with("..."));
    assert!(provider.seen().contains(&Seen::Sent {
        persona: crate::core::persona::Persona::General,
        prompt: long_prompt.to_string(),
        attachments: 1,
    }));
}
