//! Interactive line console over a running orchestrator.

mod commands;
mod events;

use anyhow::{Result, anyhow};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::core::orchestrator::OrchestratorHandle;
use crate::core::persona::Persona;
use crate::core::queue::{SubmitError, TaskPriority};
use crate::core::terminal::{self, print_error, print_info, print_success, print_warn};
use crate::core::transcript::{Attachment, Message};
use crate::logging::LogBuffer;

use commands::{ConsoleCommand, parse_input};

struct CommandInfo {
    name: &'static str,
    description: &'static str,
}

const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "<text>",
        description: "Submit a task at the default priority",
    },
    CommandInfo {
        name: "/high <text>",
        description: "Submit a HIGH priority task (also /medium, /low)",
    },
    CommandInfo {
        name: "/attach <path>",
        description: "Stage a file for the next submission",
    },
    CommandInfo {
        name: "/persona [name]",
        description: "Switch persona (picker when no name is given)",
    },
    CommandInfo {
        name: "/services",
        description: "List integration services",
    },
    CommandInfo {
        name: "/connect <id>",
        description: "Toggle an integration service",
    },
    CommandInfo {
        name: "/tasks",
        description: "Show the task board",
    },
    CommandInfo {
        name: "/logs [n]",
        description: "Show the most recent log lines",
    },
    CommandInfo {
        name: "/help",
        description: "Show all available commands",
    },
    CommandInfo {
        name: "/quit",
        description: "Exit the console",
    },
];

pub struct Console {
    handle: OrchestratorHandle,
    default_priority: TaskPriority,
    staged: Vec<Attachment>,
    logs: LogBuffer,
}

impl Console {
    pub fn new(handle: OrchestratorHandle, default_priority: TaskPriority, logs: LogBuffer) -> Self {
        Self {
            handle,
            default_priority,
            staged: Vec::new(),
            logs,
        }
    }

    /// Read commands from stdin until `/quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        let snapshot = self.handle.snapshot().await?;
        for msg in &snapshot.messages {
            print_message(msg);
        }
        print_info(&format!(
            "Persona: {}. Default priority: {}. Type /help for commands.",
            snapshot.persona,
            self.default_priority.as_str()
        ));

        let printer = events::spawn_printer(self.handle.subscribe());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let keep_going = self.handle_command(parse_input(&line)).await?;
            if !keep_going {
                break;
            }
        }

        printer.abort();
        info!("Console closed");
        Ok(())
    }

    /// Returns false when the console should exit.
    async fn handle_command(&mut self, command: ConsoleCommand) -> Result<bool> {
        match command {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Submit { text, priority } => {
                let priority = priority.unwrap_or(self.default_priority);
                let attachments = std::mem::take(&mut self.staged);
                match self.handle.submit_task(&text, attachments, priority).await {
                    Ok(_) => {}
                    Err(e) if e.downcast_ref::<SubmitError>().is_some() => {
                        print_warn(&e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
            ConsoleCommand::Attach(path) => match Attachment::from_path(&path).await {
                Ok(att) => {
                    print_success(&format!(
                        "Staged {} ({}). It goes with your next task.",
                        path.display(),
                        att.mime_type
                    ));
                    self.staged.push(att);
                }
                Err(e) => print_error(&e.to_string()),
            },
            ConsoleCommand::Persona(name) => {
                let persona = match name {
                    Some(name) => match name.parse::<Persona>() {
                        Ok(p) => Some(p),
                        Err(e) => {
                            print_error(&e.to_string());
                            None
                        }
                    },
                    None => pick_persona().await?,
                };
                if let Some(persona) = persona {
                    self.handle.switch_persona(persona).await?;
                }
            }
            ConsoleCommand::Services => {
                let snapshot = self.handle.snapshot().await?;
                println!("{}", style("Integration Bus").bold().underlined());
                for service in &snapshot.services {
                    println!("  {}", terminal::render_service(service));
                }
            }
            ConsoleCommand::Connect(id) => match self.handle.toggle_service(&id).await? {
                Some(true) => print_success(&format!("{} connected.", id)),
                Some(false) => print_info(&format!("{} disconnected.", id)),
                None => print_error(&format!("Unknown service: {}", id)),
            },
            ConsoleCommand::Tasks => {
                let snapshot = self.handle.snapshot().await?;
                if snapshot.tasks.is_empty() {
                    print_info("No tasks.");
                }
                for task in &snapshot.tasks {
                    println!("  {}", terminal::render_task(task));
                }
            }
            ConsoleCommand::Logs(n) => {
                for line in self.logs.recent(n) {
                    println!("{}", style(line).dim());
                }
            }
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => return Ok(false),
            ConsoleCommand::Usage(usage) => print_warn(&format!("Usage: {}", usage)),
            ConsoleCommand::Unknown(cmd) => {
                print_error(&format!("Unknown command: {}. Type /help.", cmd));
            }
        }
        Ok(true)
    }
}

fn print_message(msg: &Message) {
    println!("{}\n", terminal::render_message(msg));
}

fn print_help() {
    println!("{}", style("Commands").bold().underlined());
    for cmd in COMMANDS {
        println!("  {:<18} {}", style(cmd.name).green(), cmd.description);
    }
}

/// Interactive persona picker. None when the user cancels.
async fn pick_persona() -> Result<Option<Persona>> {
    let choice = tokio::task::spawn_blocking(|| {
        inquire::Select::new("Select persona:", Persona::ALL.to_vec()).prompt()
    })
    .await
    .map_err(|e| anyhow!("Persona picker crashed: {}", e))?;
    match choice {
        Ok(persona) => Ok(Some(persona)),
        Err(
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted,
        ) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
