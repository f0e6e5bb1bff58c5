use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::SessionArgs;
use crate::core::config::AppConfig;
use crate::core::llm::providers::GoogleProvider;
use crate::core::orchestrator::{
    self, Orchestrator, OrchestratorEvent, OrchestratorHandle, OrchestratorSettings,
};
use crate::core::queue::{TaskPriority, TaskStatus};
use crate::core::terminal;
use crate::core::transcript::Attachment;
use crate::interfaces::console::Console;
use crate::logging::{self, LogBuffer};

/// A running orchestrator plus everything needed to stop it.
struct Session {
    config: AppConfig,
    handle: OrchestratorHandle,
    join: JoinHandle<()>,
    shutdown: CancellationToken,
    logs: LogBuffer,
}

impl Session {
    async fn start(args: &SessionArgs, interactive: bool) -> Result<Self> {
        let config = AppConfig::load(args.config.as_deref()).await?;
        // The console owns the terminal, so its logs only go to the buffer.
        let logs = logging::init(config.log_level(), !interactive);
        config.log_summary();

        let api_key = config.api_key().ok_or_else(|| {
            anyhow!(
                "No Gemini API key found. Set {} (or API_KEY).",
                config.gemini.api_key_env
            )
        })?;
        let provider = GoogleProvider::new(&config.gemini, api_key)?;

        let persona = match &args.persona {
            Some(name) => name.parse()?,
            None => config.persona(),
        };
        let orchestrator = Orchestrator::new(
            Arc::new(provider),
            OrchestratorSettings {
                persona,
                eviction_delay: config.eviction_delay(),
            },
        );

        let shutdown = CancellationToken::new();
        let (handle, join) =
            orchestrator::spawn(orchestrator, config.sweep_interval(), shutdown.clone());
        info!("Session started (interactive={})", interactive);

        Ok(Self {
            config,
            handle,
            join,
            shutdown,
            logs,
        })
    }

    fn priority(&self, args: &SessionArgs) -> Result<TaskPriority> {
        match &args.priority {
            Some(p) => p.parse(),
            None => Ok(self.config.default_priority()),
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!("Orchestrator loop ended abnormally: {}", e);
        }
    }
}

async fn load_attachments(args: &SessionArgs) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(args.attachments.len());
    for path in &args.attachments {
        attachments.push(Attachment::from_path(path).await?);
    }
    Ok(attachments)
}

async fn wait_for_terminal(
    handle: &OrchestratorHandle,
    events: &mut broadcast::Receiver<OrchestratorEvent>,
    id: Uuid,
) -> Result<TaskStatus> {
    loop {
        match events.recv().await {
            Ok(OrchestratorEvent::TaskUpdated(task)) if task.id == id && task.status.is_terminal() => {
                return Ok(task.status);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // The terminal update may have been dropped; ask directly.
                let snapshot = handle.snapshot().await?;
                if let Some(task) = snapshot.tasks.iter().find(|t| t.id == id)
                    && task.status.is_terminal()
                {
                    return Ok(task.status);
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(anyhow!("Orchestrator stopped before the task finished"));
            }
        }
    }
}

/// Submit one task, wait for it, print what it produced.
pub(super) async fn run_prompt(args: SessionArgs) -> Result<()> {
    let session = Session::start(&args, false).await?;
    let priority = session.priority(&args)?;
    let attachments = load_attachments(&args).await?;

    let mut events = session.handle.subscribe();
    let id = session
        .handle
        .submit_task(&args.prompt, attachments, priority)
        .await?;
    let status = wait_for_terminal(&session.handle, &mut events, id).await?;

    let snapshot = session.handle.snapshot().await?;
    let start = snapshot
        .messages
        .iter()
        .position(|m| m.id == id)
        .map_or(snapshot.messages.len(), |i| i + 1);
    for msg in &snapshot.messages[start..] {
        println!("{}\n", terminal::render_message(msg));
    }

    session.stop().await;
    if status == TaskStatus::Failed {
        return Err(anyhow!("Task {} failed", id));
    }
    Ok(())
}

pub(super) async fn run_console(args: SessionArgs) -> Result<()> {
    let session = Session::start(&args, true).await?;
    let priority = session.priority(&args)?;

    terminal::print_banner();
    let mut console = Console::new(session.handle.clone(), priority, session.logs.clone());
    let result = console.run().await;

    session.stop().await;
    terminal::print_goodbye();
    result
}
