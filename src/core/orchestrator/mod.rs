//! Task orchestration: claims one queued task at a time, runs it against the
//! upstream session, dispatches any tool calls, and records the outcome.
//!
//! The orchestrator owns its queue, transcript and session outright and is
//! driven by [`runtime::spawn`], which serializes every mutation through a
//! command channel and keeps serving it while a task waits on the network.

mod runtime;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::integrations::{IntegrationRegistry, IntegrationService};
use crate::core::llm::{ChatSession, LlmProvider, ToolAck};
use crate::core::persona::Persona;
use crate::core::queue::{SubmitError, Task, TaskPriority, TaskQueue, TaskStatus};
use crate::core::tools::{self, DispatchContext, ToolCall};
use crate::core::transcript::{Attachment, Message, Transcript};

pub use runtime::{OrchestratorHandle, spawn};
use runtime::Inbox;

const FAILURE_NOTICE: &str = "System Critical: Task Execution Failed or Connection Error.";
const EVENT_CAPACITY: usize = 256;

pub const PROGRESS_CLAIMED: u8 = 10;
pub const PROGRESS_SENT: u8 = 30;
pub const PROGRESS_REPLIED: u8 = 60;
pub const PROGRESS_DONE: u8 = 100;

/// Notifications for observers. Emitted after every state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    TaskUpdated(Task),
    TaskEvicted(Uuid),
    MessageAppended(Message),
    BusyChanged(bool),
    PersonaSwitched(Persona),
    ServiceToggled { id: String, connected: bool },
}

/// Snapshot of everything a UI needs to draw.
#[derive(Debug, Clone, Serialize)]
pub struct ReadModel {
    pub tasks: Vec<Task>,
    pub messages: Vec<Message>,
    pub services: Vec<IntegrationService>,
    pub persona: Persona,
    pub is_busy: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub persona: Persona,
    /// How long a finished task stays visible before eviction.
    pub eviction_delay: chrono::Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            persona: Persona::General,
            eviction_delay: chrono::Duration::seconds(5),
        }
    }
}

/// How one task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Everything commands may touch while a task is in flight. Remote calls never
/// borrow it, so the runtime keeps serving submissions and sweeps mid-task.
struct Board {
    queue: TaskQueue,
    transcript: Transcript,
    integrations: IntegrationRegistry,
    persona: Persona,
    busy: bool,
    eviction_delay: chrono::Duration,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl Board {
    fn read_model(&self) -> ReadModel {
        ReadModel {
            tasks: self.queue.tasks().to_vec(),
            messages: self.transcript.entries().to_vec(),
            services: self.integrations.services().to_vec(),
            persona: self.persona,
            is_busy: self.busy,
        }
    }

    fn submit_task(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        priority: TaskPriority,
    ) -> Result<Uuid, SubmitError> {
        let id = self
            .queue
            .submit(&mut self.transcript, text, attachments, priority)?;
        if let Some(entry) = self.transcript.find(id).cloned() {
            self.emit(OrchestratorEvent::MessageAppended(entry));
        }
        self.emit_task(id);
        Ok(id)
    }

    fn toggle_service(&mut self, id: &str) -> Option<bool> {
        let connected = self.integrations.toggle(id)?;
        self.emit(OrchestratorEvent::ServiceToggled {
            id: id.trim().to_lowercase(),
            connected,
        });
        Some(connected)
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let evicted = self.queue.sweep_completed(now, self.eviction_delay);
        for id in &evicted {
            self.emit(OrchestratorEvent::TaskEvicted(*id));
        }
        evicted.len()
    }

    fn append(&mut self, message: Message) {
        let entry = self.transcript.append(message).clone();
        self.emit(OrchestratorEvent::MessageAppended(entry));
    }

    fn set_status(&mut self, task_id: Uuid, status: TaskStatus, progress: u8) {
        self.queue.update_status(task_id, status, progress);
        self.emit_task(task_id);
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        self.emit(OrchestratorEvent::BusyChanged(busy));
    }

    fn emit_task(&self, task_id: Uuid) {
        if let Some(task) = self.queue.get(task_id) {
            self.emit(OrchestratorEvent::TaskUpdated(task.clone()));
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Await a remote call. Under the runtime, commands and sweeps keep being
/// served until it resolves.
async fn serving<F: Future>(board: &mut Board, inbox: Option<&mut Inbox>, call: F) -> F::Output {
    match inbox {
        Some(inbox) => inbox.serve_during(board, call).await,
        None => call.await,
    }
}

pub struct Orchestrator {
    board: Board,
    provider: Arc<dyn LlmProvider>,
    session: Box<dyn ChatSession>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: OrchestratorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = provider.open_session(settings.persona);
        info!(
            "Orchestrator ready (provider={}, persona={})",
            provider.name(),
            settings.persona
        );
        Self {
            board: Board {
                queue: TaskQueue::new(),
                transcript: Transcript::with_greeting(),
                integrations: IntegrationRegistry::default(),
                persona: settings.persona,
                busy: false,
                eviction_delay: settings.eviction_delay,
                events,
            },
            provider,
            session,
        }
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<OrchestratorEvent> {
        self.board.events.clone()
    }

    /// Replace the upstream session with one configured for `persona`. Only
    /// tasks claimed after this call see the new session.
    pub fn switch_persona(&mut self, persona: Persona) {
        info!("Switching persona {} -> {}", self.board.persona, persona);
        self.session = self.provider.open_session(persona);
        self.board.persona = persona;
        self.board.append(Message::model_text(format!(
            "Agent Persona Switched: {} Mode Active.",
            persona.as_str().to_uppercase()
        )));
        self.board.emit(OrchestratorEvent::PersonaSwitched(persona));
    }

    /// Evict tasks whose observability window has passed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.board.sweep(now)
    }

    /// Claim and run the next eligible task. Returns None when idle.
    async fn run_next_serving(&mut self, inbox: Option<&mut Inbox>) -> Option<TaskOutcome> {
        if self.board.busy {
            return None;
        }
        let task_id = self.board.queue.select_next()?.id;
        Some(self.execute(task_id, inbox).await)
    }

    async fn execute(&mut self, task_id: Uuid, inbox: Option<&mut Inbox>) -> TaskOutcome {
        self.board.set_busy(true);
        self.board
            .set_status(task_id, TaskStatus::Processing, PROGRESS_CLAIMED);

        // The task only keeps a display title; the full prompt lives on the
        // paired user entry.
        let (prompt, attachments) = match self.board.transcript.find(task_id) {
            Some(entry) => (entry.text_content.clone(), entry.attachments.clone()),
            None => (
                self.board
                    .queue
                    .get(task_id)
                    .map(|t| t.title.clone())
                    .unwrap_or_default(),
                Vec::new(),
            ),
        };

        let status = match self.run_turn(task_id, &prompt, &attachments, inbox).await {
            Ok(TurnResult::Completed) => {
                self.board
                    .set_status(task_id, TaskStatus::Completed, PROGRESS_DONE);
                TaskStatus::Completed
            }
            Ok(TurnResult::ToolFailed) => {
                self.board.set_status(task_id, TaskStatus::Failed, 0);
                TaskStatus::Failed
            }
            Err(e) => {
                warn!("Task {} failed: {:#}", task_id, e);
                self.board.append(Message::model_text(FAILURE_NOTICE));
                self.board.set_status(task_id, TaskStatus::Failed, 0);
                TaskStatus::Failed
            }
        };

        self.board.set_busy(false);
        TaskOutcome { task_id, status }
    }

    /// One conversational turn. Entries appended before an error stay in the
    /// transcript; a batch is not atomic.
    async fn run_turn(
        &mut self,
        task_id: Uuid,
        prompt: &str,
        attachments: &[Attachment],
        mut inbox: Option<&mut Inbox>,
    ) -> Result<TurnResult> {
        self.board
            .set_status(task_id, TaskStatus::Processing, PROGRESS_SENT);
        let reply = serving(
            &mut self.board,
            inbox.as_deref_mut(),
            self.session.send(prompt, attachments),
        )
        .await?;
        self.board
            .set_status(task_id, TaskStatus::Processing, PROGRESS_REPLIED);

        if reply.tool_calls.is_empty() {
            if reply.text.trim().is_empty() {
                debug!("Task {} produced a silent turn", task_id);
            } else {
                self.board.append(Message::model_text(reply.text));
            }
            return Ok(TurnResult::Completed);
        }

        let mut tool_failed = false;
        for request in reply.tool_calls {
            self.board
                .queue
                .set_kind(task_id, tools::task_kind_for(&request.name));
            self.board.emit_task(task_id);

            let call = ToolCall::decode(&request)?;
            // Toggles applied so far are visible; later ones affect later calls.
            let integrations = self.board.integrations.clone();
            let ctx = DispatchContext {
                provider: self.provider.as_ref(),
                integrations: &integrations,
            };
            let outcome = serving(
                &mut self.board,
                inbox.as_deref_mut(),
                tools::dispatch(&call, &ctx),
            )
            .await?;
            if let Some(entry) = outcome.entry {
                self.board.append(entry);
            }
            tool_failed |= outcome.failed;

            debug!("Acknowledging {} ({})", request.call_id, call.name());
            let ack = ToolAck {
                call_id: request.call_id,
                tool_name: call.name().to_string(),
                result: outcome.ack,
            };
            serving(
                &mut self.board,
                inbox.as_deref_mut(),
                self.session.acknowledge(ack),
            )
            .await?;
        }

        Ok(if tool_failed {
            TurnResult::ToolFailed
        } else {
            TurnResult::Completed
        })
    }
}

/// Direct driving without the runtime, for tests.
#[cfg(test)]
impl Orchestrator {
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.board.events.subscribe()
    }

    pub fn read_model(&self) -> ReadModel {
        self.board.read_model()
    }

    pub fn is_busy(&self) -> bool {
        self.board.busy
    }

    pub fn persona(&self) -> Persona {
        self.board.persona
    }

    pub fn tasks(&self) -> &[Task] {
        self.board.queue.tasks()
    }

    pub fn messages(&self) -> &[Message] {
        self.board.transcript.entries()
    }

    pub fn submit_task(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        priority: TaskPriority,
    ) -> Result<Uuid, SubmitError> {
        self.board.submit_task(text, attachments, priority)
    }

    pub fn toggle_service(&mut self, id: &str) -> Option<bool> {
        self.board.toggle_service(id)
    }

    pub async fn run_next(&mut self) -> Option<TaskOutcome> {
        self.run_next_serving(None).await
    }

    /// Run tasks until nothing is queued.
    pub async fn drain(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

enum TurnResult {
    Completed,
    /// A handler reported its own failure after narrating it.
    ToolFailed,
}

#[cfg(test)]
mod tests;
