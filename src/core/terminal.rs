use console::{Emoji, style};

use crate::core::integrations::IntegrationService;
use crate::core::queue::{Task, TaskPriority, TaskStatus};
use crate::core::transcript::{Message, MessageRole, Metadata};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static PICTURE: Emoji<'_, '_> = Emoji("🖼️  ", "[img] ");
pub static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "[search] ");

const PROGRESS_WIDTH: usize = 10;
const DATA_URI_PREVIEW: usize = 48;

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "                                        ",
        " _ __ ___   __ _  ___| |__ (_)_ __   __ _ ",
        "| '_ ` _ \\ / _` |/ __| '_ \\| | '_ \\ / _` |",
        "| | | | | | (_| | (__| | | | | | | | (_| |",
        "|_| |_| |_|\\__,_|\\___|_| |_|_|_| |_|\\__,_|",
    ];

    // Gradient: #f59e0b → #ef4444 → #a855f7 (left → right)
    let stops: [(u8, u8, u8); 3] = [(245, 158, 11), (239, 68, 68), (168, 85, 247)];
    let max_w = 42u32;

    println!();
    for line in lines {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let d = ((x as u32) * 1000 / max_w).min(1000);
            let (r, g, b) = if d <= 500 {
                lerp_color(stops[0], stops[1], d * 2)
            } else {
                lerp_color(stops[1], stops[2], (d - 500) * 2)
            };
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!("\x1b[38;2;168;85;247mPrioritized tasks. One at a time. Every tool call answered.\x1b[0m\n");
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("The Machine is powering down. Goodbye.").bold().cyan()
    );
}

/// A titled block of help text.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.lines
            .push(format!("  {:<22} {}", style(name).green().bold(), about));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(format!("  {}", text));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn print(self) {
        println!("{}", style(self.title).bold().underlined());
        for line in self.lines {
            println!("{}", line);
        }
        println!();
    }
}

fn priority_label(priority: TaskPriority) -> String {
    let label = format!("{:<6}", priority.as_str().to_uppercase());
    match priority {
        TaskPriority::High => style(label).red().bold().to_string(),
        TaskPriority::Medium => style(label).yellow().to_string(),
        TaskPriority::Low => style(label).dim().to_string(),
    }
}

fn progress_bar(progress: u8) -> String {
    let filled = (progress as usize * PROGRESS_WIDTH) / 100;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(PROGRESS_WIDTH - filled)
    )
}

/// One line per task: priority, status, progress and title.
pub fn render_task(task: &Task) -> String {
    let status = format!("{:<10}", task.status.as_str());
    let status = match task.status {
        TaskStatus::Queued => style(status).dim(),
        TaskStatus::Processing => style(status).cyan(),
        TaskStatus::Completed => style(status).green(),
        TaskStatus::Failed => style(status).red(),
    };
    format!(
        "{} {} {} {:>3}%  {} ({})",
        priority_label(task.priority),
        status,
        progress_bar(task.progress),
        task.progress,
        task.title,
        task.kind.as_str()
    )
}

fn shorten_data_uri(src: &str) -> String {
    if src.len() <= DATA_URI_PREVIEW {
        return src.to_string();
    }
    let head: String = src.chars().take(DATA_URI_PREVIEW).collect();
    format!("{}... ({} bytes)", head, src.len())
}

/// Plain-text rendering of a transcript entry for the terminal.
pub fn render_message(message: &Message) -> String {
    let speaker = match message.role {
        MessageRole::User => style("YOU").bold().green().to_string(),
        MessageRole::Model => style("MACHINE").bold().magenta().to_string(),
        MessageRole::System => style("SYSTEM").bold().dim().to_string(),
    };

    let mut out = format!("[{}] ", speaker);
    match &message.metadata {
        None => {
            out.push_str(&message.text_content);
            if !message.attachments.is_empty() {
                out.push_str(&format!(
                    " {}",
                    style(format!("(+{} attachment(s))", message.attachments.len())).dim()
                ));
            }
        }
        Some(Metadata::Image { src }) => {
            out.push_str(&format!("{}{}\n  {}", PICTURE, message.text_content, shorten_data_uri(src)));
        }
        Some(Metadata::Svg { code, description }) => {
            out.push_str(&format!("{} - {}\n{}", message.text_content, description, code));
        }
        Some(Metadata::Code {
            language,
            code,
            filename,
            ..
        }) => {
            let name = filename.as_deref().unwrap_or("untitled");
            out.push_str(&format!(
                "{}\n--- {} ({}) ---\n{}\n---",
                message.text_content, name, language, code
            ));
        }
        Some(Metadata::Table {
            headers,
            rows,
            title,
        }) => {
            out.push_str(title.as_deref().unwrap_or(&message.text_content));
            out.push('\n');
            out.push_str(&render_table(headers, rows));
        }
        Some(Metadata::SearchResult { summary, links }) => {
            out.push_str(&format!("{}{}\n{}", LOOKING_GLASS, message.text_content, summary));
            for link in links {
                out.push_str(&format!("\n  - {} <{}>", link.title, link.url));
            }
        }
    }
    out
}

fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let columns = headers
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0usize; columns];
    for row in std::iter::once(headers).chain(rows.iter().map(Vec::as_slice)) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let format_row = |row: &[String]| {
        widths
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{:<w$}", row.get(i).map(String::as_str).unwrap_or(""), w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(headers)];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(rows.iter().map(|r| format_row(r)));
    lines.join("\n")
}

pub fn render_service(service: &IntegrationService) -> String {
    let state = if service.connected {
        style("connected").green().to_string()
    } else {
        style("disconnected").dim().to_string()
    };
    format!(
        "{:<10} {:<16} {:<14} {}",
        service.id, service.name, state, service.description
    )
}
