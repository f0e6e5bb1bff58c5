use std::path::PathBuf;

use crate::core::queue::TaskPriority;

const DEFAULT_LOG_LINES: usize = 20;

/// One line of console input, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ConsoleCommand {
    Submit {
        text: String,
        /// None means the console's default priority.
        priority: Option<TaskPriority>,
    },
    Attach(PathBuf),
    Persona(Option<String>),
    Services,
    Connect(String),
    Tasks,
    Logs(usize),
    Help,
    Quit,
    Empty,
    Usage(&'static str),
    Unknown(String),
}

pub(super) fn parse_input(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    if !line.starts_with('/') {
        return ConsoleCommand::Submit {
            text: line.to_string(),
            priority: None,
        };
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd.to_lowercase().as_str() {
        "/high" | "/medium" | "/low" => {
            if rest.is_empty() {
                return ConsoleCommand::Usage("/high | /medium | /low <task text>");
            }
            // The command name is one of the three literals above.
            let priority = cmd[1..].parse().unwrap_or(TaskPriority::Medium);
            ConsoleCommand::Submit {
                text: rest.to_string(),
                priority: Some(priority),
            }
        }
        "/attach" => {
            if rest.is_empty() {
                ConsoleCommand::Usage("/attach <path>")
            } else {
                ConsoleCommand::Attach(PathBuf::from(rest))
            }
        }
        "/persona" => ConsoleCommand::Persona((!rest.is_empty()).then(|| rest.to_string())),
        "/services" => ConsoleCommand::Services,
        "/connect" | "/disconnect" => {
            if rest.is_empty() {
                ConsoleCommand::Usage("/connect <service id>")
            } else {
                ConsoleCommand::Connect(rest.to_string())
            }
        }
        "/tasks" => ConsoleCommand::Tasks,
        "/logs" => ConsoleCommand::Logs(rest.parse().unwrap_or(DEFAULT_LOG_LINES)),
        "/help" => ConsoleCommand::Help,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        other => ConsoleCommand::Unknown(other.to_string()),
    }
}
