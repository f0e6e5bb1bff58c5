use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

const LOG_CHANNEL_CAPACITY: usize = 500;
const LOG_BUFFER_LINES: usize = 200;

/// Sends every formatted log line to a broadcast channel, and to stderr
/// unless the interactive console owns the terminal.
#[derive(Clone)]
pub(crate) struct LogMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub echo_stderr: bool,
}

impl<'a> MakeWriter<'a> for LogMakeWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            sender: self.sender.clone(),
            echo_stderr: self.echo_stderr,
        }
    }
}

pub(crate) struct LogWriter {
    sender: broadcast::Sender<String>,
    echo_stderr: bool,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        if self.echo_stderr {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.echo_stderr {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

/// The most recent log lines, kept for the console's `/logs` command.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == LOG_BUFFER_LINES {
                lines.pop_front();
            }
            lines.push_back(line.trim_end().to_string());
        }
    }

    pub fn recent(&self, n: usize) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.iter().skip(lines.len().saturating_sub(n)).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Feed the buffer from a log channel until the channel closes.
    pub fn collect_from(&self, mut rx: broadcast::Receiver<String>) {
        let buffer = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(line) => buffer.push(line),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Install the global subscriber. Must run inside the tokio runtime.
pub fn init(level: Level, echo_stderr: bool) -> LogBuffer {
    let (log_tx, log_rx) = broadcast::channel::<String>(LOG_CHANNEL_CAPACITY);
    let buffer = LogBuffer::default();
    buffer.collect_from(log_rx);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(echo_stderr)
        .with_writer(LogMakeWriter {
            sender: log_tx,
            echo_stderr,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Already set in tests

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_only_the_newest_lines() {
        let buffer = LogBuffer::default();
        for i in 0..(LOG_BUFFER_LINES + 5) {
            buffer.push(format!("line {}\n", i));
        }
        let recent = buffer.recent(3);
        assert_eq!(
            recent,
            vec![
                format!("line {}", LOG_BUFFER_LINES + 2),
                format!("line {}", LOG_BUFFER_LINES + 3),
                format!("line {}", LOG_BUFFER_LINES + 4),
            ]
        );
        assert_eq!(buffer.recent(usize::MAX).len(), LOG_BUFFER_LINES);
    }

    #[test]
    fn writer_forwards_lines_to_the_channel() {
        let (tx, mut rx) = broadcast::channel(8);
        let make = LogMakeWriter {
            sender: tx,
            echo_stderr: false,
        };
        let mut writer = make.make_writer();
        writer.write_all(b"INFO hello\n").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "INFO hello\n");
    }

    #[tokio::test]
    async fn collector_drains_the_channel() {
        let (tx, rx) = broadcast::channel(8);
        let buffer = LogBuffer::default();
        buffer.collect_from(rx);
        tx.send("WARN first\n".to_string()).unwrap();
        drop(tx);

        for _ in 0..50 {
            if !buffer.recent(1).is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(buffer.recent(5), vec!["WARN first".to_string()]);
    }
}
