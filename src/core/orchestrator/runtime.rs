use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Board, Orchestrator, OrchestratorEvent, ReadModel};
use crate::core::persona::Persona;
use crate::core::queue::{SubmitError, TaskPriority};
use crate::core::transcript::Attachment;

const COMMAND_CAPACITY: usize = 64;

enum Command {
    Submit {
        text: String,
        attachments: Vec<Attachment>,
        priority: TaskPriority,
        reply: oneshot::Sender<Result<Uuid, SubmitError>>,
    },
    SwitchPersona(Persona),
    ToggleService {
        id: String,
        reply: oneshot::Sender<Option<bool>>,
    },
    Snapshot(oneshot::Sender<ReadModel>),
}

/// Cloneable front door to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl OrchestratorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub async fn submit_task(
        &self,
        text: &str,
        attachments: Vec<Attachment>,
        priority: TaskPriority,
    ) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            text: text.to_string(),
            attachments,
            priority,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| anyhow!("Orchestrator dropped the submission"))??)
    }

    /// Takes effect before the next task is claimed; a running task keeps
    /// its session.
    pub async fn switch_persona(&self, persona: Persona) -> Result<()> {
        self.send(Command::SwitchPersona(persona)).await
    }

    pub async fn toggle_service(&self, id: &str) -> Result<Option<bool>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ToggleService {
            id: id.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| anyhow!("Orchestrator dropped the toggle request"))
    }

    /// Answered immediately, including while a task is running.
    pub async fn snapshot(&self) -> Result<ReadModel> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await
            .map_err(|_| anyhow!("Orchestrator dropped the snapshot request"))
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow!("Orchestrator is not running"))
    }
}

/// Commands and the sweep clock. Served between tasks and also while a task
/// waits on a remote call.
pub(super) struct Inbox {
    rx: mpsc::Receiver<Command>,
    sweep: Interval,
    /// Persona switches received mid-task, applied once the task ends.
    deferred: Vec<Persona>,
    /// Every handle is gone.
    closed: bool,
}

impl Inbox {
    /// Drive `call` to completion, applying submissions, toggles, snapshots
    /// and sweeps as they come in.
    pub(super) async fn serve_during<F: Future>(&mut self, board: &mut Board, call: F) -> F::Output {
        tokio::pin!(call);
        loop {
            tokio::select! {
                biased;
                out = &mut call => return out,
                cmd = self.rx.recv(), if !self.closed => match cmd {
                    Some(cmd) => {
                        if let Some(persona) = serve(board, cmd) {
                            debug!("Persona switch to {} waits for the running task", persona);
                            self.deferred.push(persona);
                        }
                    }
                    None => self.closed = true,
                },
                _ = self.sweep.tick() => {
                    board.sweep(Utc::now());
                }
            }
        }
    }
}

/// Move the orchestrator onto its own task. It runs one task at a time and
/// keeps accepting commands while that task is in flight; persona switches
/// take effect before the next task is claimed. Finished tasks are evicted on
/// every sweep tick until `shutdown` fires or every handle is dropped.
pub fn spawn(
    orchestrator: Orchestrator,
    sweep_interval: Duration,
    shutdown: CancellationToken,
) -> (OrchestratorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = OrchestratorHandle {
        tx,
        events: orchestrator.event_sender(),
    };
    let mut sweep = tokio::time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let inbox = Inbox {
        rx,
        sweep,
        deferred: Vec::new(),
        closed: false,
    };
    let join = tokio::spawn(run_loop(orchestrator, inbox, shutdown));
    (handle, join)
}

async fn run_loop(mut orchestrator: Orchestrator, mut inbox: Inbox, shutdown: CancellationToken) {
    info!("Orchestrator loop started");

    loop {
        for persona in std::mem::take(&mut inbox.deferred) {
            orchestrator.switch_persona(persona);
        }
        while let Ok(cmd) = inbox.rx.try_recv() {
            apply(&mut orchestrator, cmd);
        }
        if shutdown.is_cancelled() {
            break;
        }
        if let Some(outcome) = orchestrator.run_next_serving(Some(&mut inbox)).await {
            info!("Task {} finished: {}", outcome.task_id, outcome.status.as_str());
            // A backlog must not postpone eviction of what just finished.
            orchestrator.sweep(Utc::now());
            continue;
        }
        if inbox.closed {
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            cmd = inbox.rx.recv() => match cmd {
                Some(cmd) => apply(&mut orchestrator, cmd),
                None => break,
            },
            _ = inbox.sweep.tick() => {
                orchestrator.sweep(Utc::now());
            }
        }
    }

    info!("Orchestrator loop stopped");
}

/// Apply a command between tasks.
fn apply(orchestrator: &mut Orchestrator, cmd: Command) {
    if let Some(persona) = serve(&mut orchestrator.board, cmd) {
        orchestrator.switch_persona(persona);
    }
}

/// Apply everything that only touches the board. A persona switch needs the
/// session, so it is handed back to the caller.
fn serve(board: &mut Board, cmd: Command) -> Option<Persona> {
    match cmd {
        Command::Submit {
            text,
            attachments,
            priority,
            reply,
        } => {
            let result = board.submit_task(&text, attachments, priority);
            if let Err(e) = &result {
                warn!("Rejected submission: {}", e);
            }
            let _ = reply.send(result);
            None
        }
        Command::SwitchPersona(persona) => Some(persona),
        Command::ToggleService { id, reply } => {
            let _ = reply.send(board.toggle_service(&id));
            None
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(board.read_model());
            None
        }
    }
}
