mod session;

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};
use crate::core::tools;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("console", "Start the interactive console (default)")
        .command("run", "Run a single prompt and print the result")
        .command("tools", "Print the tool declarations sent upstream")
        .print();

    GuideSection::new("Options")
        .text("--prompt, -p <text>      Task text (run)")
        .text("--priority <p>           high | medium | low")
        .text("--persona <name>         general | frontend | backend | mobile | data_analyst")
        .text("--attach, -f <path>      Attach a file (repeatable)")
        .text("--config, -c <path>      Use this config.toml instead of the default")
        .blank()
        .text("Set GEMINI_API_KEY (or API_KEY) before starting.")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("machina").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SessionArgs {
    pub prompt: String,
    pub priority: Option<String>,
    pub persona: Option<String>,
    pub attachments: Vec<PathBuf>,
    pub config: Option<PathBuf>,
}

pub(crate) fn parse_session_args(args: &[String], start: usize) -> SessionArgs {
    let mut parsed = SessionArgs::default();
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--prompt" | "-p", Some(v)) => {
                parsed.prompt = v;
                i += 2;
            }
            ("--priority", Some(v)) => {
                parsed.priority = Some(v);
                i += 2;
            }
            ("--persona", Some(v)) => {
                parsed.persona = Some(v);
                i += 2;
            }
            ("--attach" | "-f", Some(v)) => {
                parsed.attachments.push(PathBuf::from(v));
                i += 2;
            }
            ("--config" | "-c", Some(v)) => {
                parsed.config = Some(PathBuf::from(v));
                i += 2;
            }
            _ => i += 1,
        }
    }
    parsed
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("console");

    match cmd {
        "run" => {
            let parsed = parse_session_args(&args, 2);
            if parsed.prompt.trim().is_empty() && parsed.attachments.is_empty() {
                print_error("Error: --prompt (or --attach) is required for run mode.");
                print_help();
                return Ok(());
            }
            session::run_prompt(parsed).await
        }
        "console" => session::run_console(parse_session_args(&args, 2)).await,
        // Options without a command start the console.
        flag if flag.starts_with('-') && !matches!(flag, "-h" | "--help") => {
            session::run_console(parse_session_args(&args, 1)).await
        }
        "tools" => {
            println!("{}", serde_json::to_string_pretty(&tools::declarations())?);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
