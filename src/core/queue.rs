use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::transcript::{Attachment, Message, Transcript};

const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    /// Selection rank: lower runs first.
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "l" => Ok(TaskPriority::Low),
            "medium" | "med" | "m" => Ok(TaskPriority::Medium),
            "high" | "h" => Ok(TaskPriority::High),
            other => Err(anyhow::anyhow!("Unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// What kind of work a task turned out to be. Starts as a general query and is
/// refined once the backend asks for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GeneralQuery,
    ImageGeneration,
    CodeSynthesis,
    IntegrationBus,
    ToolExecution,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::GeneralQuery => "general_query",
            TaskKind::ImageGeneration => "image_generation",
            TaskKind::CodeSynthesis => "code_synthesis",
            TaskKind::IntegrationBus => "integration_bus",
            TaskKind::ToolExecution => "tool_execution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Submission order, used to keep equal-priority tasks FIFO.
    #[serde(skip)]
    seq: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("nothing to submit: text is empty and there are no attachments")]
    EmptySubmission,
}

/// Display title: the first 30 characters, with an ellipsis when cut.
pub fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Priority-ordered worklist. Not a FIFO: selection picks the best-ranked
/// queued task, oldest first within a rank.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queued task and its paired user entry under one id.
    pub fn submit(
        &mut self,
        transcript: &mut Transcript,
        text: &str,
        attachments: Vec<Attachment>,
        priority: TaskPriority,
    ) -> Result<Uuid, SubmitError> {
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(SubmitError::EmptySubmission);
        }

        let id = Uuid::new_v4();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.tasks.push(Task {
            id,
            title: derive_title(text),
            priority,
            status: TaskStatus::Queued,
            progress: 0,
            kind: TaskKind::GeneralQuery,
            submitted_at: Utc::now(),
            finished_at: None,
            seq,
        });
        transcript.append(Message::user(id, text, attachments));

        info!("Queued task {} [{}]", id, priority.as_str());
        Ok(id)
    }

    pub fn select_next(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Queued)
            .min_by_key(|t| (t.priority.rank(), t.seq))
    }

    /// Set status and progress. Absent ids are ignored; a terminal task is
    /// never moved again, and progress does not go backwards while processing.
    pub fn update_status(&mut self, id: Uuid, status: TaskStatus, progress: u8) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("Status update for unknown task {}", id);
            return;
        };
        if task.status.is_terminal() {
            if task.status != status {
                warn!(
                    "Ignoring {} -> {} for finished task {}",
                    task.status.as_str(),
                    status.as_str(),
                    id
                );
            }
            return;
        }

        let progress = progress.min(100);
        task.progress = if status == TaskStatus::Processing && task.status == TaskStatus::Processing
        {
            task.progress.max(progress)
        } else {
            progress
        };
        task.status = status;
        if status.is_terminal() {
            task.finished_at = Some(Utc::now());
        }
    }

    pub fn set_kind(&mut self, id: Uuid, kind: TaskKind) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.kind = kind;
        }
    }

    /// Drop tasks that finished more than `max_age` before `now`.
    pub fn sweep_completed(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) -> Vec<Uuid> {
        let mut evicted = Vec::new();
        self.tasks.retain(|t| match t.finished_at {
            Some(done) if now - done >= max_age => {
                evicted.push(t.id);
                false
            }
            _ => true,
        });
        if !evicted.is_empty() {
            debug!("Evicted {} finished task(s)", evicted.len());
        }
        evicted
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[cfg(test)]
    pub fn processing_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Processing)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit(q: &mut TaskQueue, t: &mut Transcript, text: &str, p: TaskPriority) -> Uuid {
        q.submit(t, text, Vec::new(), p).unwrap()
    }

    #[test]
    fn high_priority_is_selected_before_older_low() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let low = submit(&mut q, &mut t, "List files", TaskPriority::Low);
        let high = submit(&mut q, &mut t, "Draw a cat", TaskPriority::High);

        assert_eq!(q.select_next().unwrap().id, high);
        q.update_status(high, TaskStatus::Completed, 100);
        assert_eq!(q.select_next().unwrap().id, low);
    }

    #[test]
    fn equal_priority_keeps_submission_order() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let ids: Vec<Uuid> = (0..5)
            .map(|i| submit(&mut q, &mut t, &format!("task {}", i), TaskPriority::Medium))
            .collect();

        for id in ids {
            let next = q.select_next().unwrap().id;
            assert_eq!(next, id);
            q.update_status(next, TaskStatus::Completed, 100);
        }
        assert!(q.select_next().is_none());
    }

    #[test]
    fn empty_submission_is_rejected_without_side_effects() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let err = q.submit(&mut t, "   ", Vec::new(), TaskPriority::Low);
        assert_eq!(err, Err(SubmitError::EmptySubmission));
        assert!(q.tasks().is_empty());
        assert!(t.entries().is_empty());
    }

    #[test]
    fn attachment_alone_is_a_valid_submission() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let att = Attachment {
            mime_type: "image/png".into(),
            data: "AAAA".into(),
        };
        let id = q.submit(&mut t, "", vec![att], TaskPriority::Low).unwrap();
        assert_eq!(q.tasks().len(), 1);
        assert_eq!(t.find(id).unwrap().attachments.len(), 1);
    }

    #[test]
    fn title_truncates_after_thirty_chars() {
        assert_eq!(derive_title("short"), "short");
        let exact = "a".repeat(30);
        assert_eq!(derive_title(&exact), exact);
        let long = "abcdefghijklmnopqrstuvwxyz0123456789";
        assert_eq!(derive_title(long), "abcdefghijklmnopqrstuvwxyz0123...");
    }

    #[test]
    fn title_truncation_respects_multibyte_chars() {
        let arabic = "مرحبا ".repeat(10);
        let title = derive_title(&arabic);
        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn update_on_missing_task_is_a_noop() {
        let mut q = TaskQueue::new();
        q.update_status(Uuid::new_v4(), TaskStatus::Completed, 100);
        assert!(q.tasks().is_empty());
    }

    #[test]
    fn progress_never_decreases_while_processing() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let id = submit(&mut q, &mut t, "x", TaskPriority::Low);
        q.update_status(id, TaskStatus::Processing, 30);
        q.update_status(id, TaskStatus::Processing, 10);
        assert_eq!(q.get(id).unwrap().progress, 30);
    }

    #[test]
    fn terminal_state_is_reached_once() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let id = submit(&mut q, &mut t, "x", TaskPriority::Low);
        q.update_status(id, TaskStatus::Failed, 0);
        q.update_status(id, TaskStatus::Completed, 100);
        let task = q.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.progress, 0);
    }

    #[test]
    fn sweep_evicts_only_old_terminal_tasks() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let done = submit(&mut q, &mut t, "done", TaskPriority::Low);
        let waiting = submit(&mut q, &mut t, "waiting", TaskPriority::Low);
        q.update_status(done, TaskStatus::Completed, 100);

        let window = chrono::Duration::seconds(5);
        assert!(q.sweep_completed(Utc::now(), window).is_empty());

        let later = Utc::now() + chrono::Duration::seconds(6);
        assert_eq!(q.sweep_completed(later, window), vec![done]);
        assert_eq!(q.tasks().len(), 1);
        assert_eq!(q.tasks()[0].id, waiting);
    }

    #[test]
    fn selection_skips_processing_tasks() {
        let mut q = TaskQueue::new();
        let mut t = Transcript::new();
        let first = submit(&mut q, &mut t, "a", TaskPriority::High);
        let second = submit(&mut q, &mut t, "b", TaskPriority::Low);
        q.update_status(first, TaskStatus::Processing, 10);
        assert_eq!(q.processing_count(), 1);
        assert_eq!(q.select_next().unwrap().id, second);
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<TaskPriority>().unwrap(), TaskPriority::High);
        assert_eq!("m".parse::<TaskPriority>().unwrap(), TaskPriority::Medium);
        assert!("urgent".parse::<TaskPriority>().is_err());
    }
}
