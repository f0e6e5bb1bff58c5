use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::core::orchestrator::OrchestratorEvent;
use crate::core::orchestrator::PROGRESS_CLAIMED;
use crate::core::queue::TaskStatus;
use crate::core::terminal::{self, print_info, print_success, print_warn};
use crate::core::transcript::MessageRole;

/// Print orchestrator activity as it happens. Stops when the channel closes.
pub(super) fn spawn_printer(mut rx: broadcast::Receiver<OrchestratorEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    print_warn(&format!("Display fell behind; {} update(s) skipped.", n));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &OrchestratorEvent) {
    match event {
        // The user already sees what they typed.
        OrchestratorEvent::MessageAppended(msg) if msg.role == MessageRole::User => {}
        OrchestratorEvent::MessageAppended(msg) => {
            println!("{}\n", terminal::render_message(msg));
        }
        OrchestratorEvent::TaskUpdated(task) => match task.status {
            TaskStatus::Queued => {
                print_info(&format!("Queued [{}] {}", task.priority.as_str(), task.title));
            }
            TaskStatus::Processing if task.progress == PROGRESS_CLAIMED => {
                print_info(&format!("Processing: {}", task.title));
            }
            TaskStatus::Processing => {}
            TaskStatus::Completed => print_success(&format!("Completed: {}", task.title)),
            TaskStatus::Failed => print_warn(&format!("Failed: {}", task.title)),
        },
        OrchestratorEvent::TaskEvicted(_)
        | OrchestratorEvent::BusyChanged(_)
        | OrchestratorEvent::PersonaSwitched(_)
        | OrchestratorEvent::ServiceToggled { .. } => {}
    }
}
