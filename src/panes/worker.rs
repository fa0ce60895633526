//! Serial pane worker
//!
//! All pane mutations run on one background task, in submission order, so a
//! join can never interleave with the break that precedes it. Each job sends
//! exactly one completion [`Message`] back to the UI loop. An attach that has
//! to launch an agent announces it with `LoadingStarted` first.

use super::{BreakOptions, JoinOutcome, PaneEngine, Ticket};
use crate::message::Message;
use crate::model::{LayoutBaseline, PaneBinding, Task, WindowRef};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedSender};
use uuid::Uuid;

#[derive(Debug)]
pub enum PaneJob {
    /// Resolve the task's window (optionally starting one) and join its panes
    Attach {
        task_id: Uuid,
        ticket: Ticket,
        start: bool,
        focus_agent: bool,
    },
    Detach {
        task_id: Uuid,
        binding: PaneBinding,
        baseline: Option<LayoutBaseline>,
        options: BreakOptions,
    },
    /// Undo a join whose completion arrived after the view moved on
    ParkStale { task_id: Uuid, generation: u64 },
    HideShell { task_id: Uuid, binding: PaneBinding },
    ShowShell { task_id: Uuid, binding: PaneBinding },
    /// Check that a joined agent pane still exists
    Probe { task_id: Uuid, agent_pane: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    /// A newer request replaced this one before it ran
    Superseded,
    /// Nothing to join and starting was not requested
    NoWindow,
    /// The agent could not be launched
    Start(String),
    /// The window was found but its panes could not be joined
    Join(String),
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::Superseded => write!(f, "superseded by a newer request"),
            AttachError::NoWindow => write!(f, "no agent window"),
            AttachError::Start(reason) => write!(f, "failed to start agent: {}", reason),
            AttachError::Join(reason) => write!(f, "failed to join panes: {}", reason),
        }
    }
}

/// Handle for submitting jobs to the worker
#[derive(Clone)]
pub struct PaneQueue {
    tx: UnboundedSender<PaneJob>,
}

impl PaneQueue {
    pub fn submit(&self, job: PaneJob) {
        if self.tx.send(job).is_err() {
            tracing::error!("pane worker has stopped, dropping job");
        }
    }
}

/// The panes the worker last put into the foreground
struct Foreground {
    generation: u64,
    task_id: Uuid,
    binding: PaneBinding,
    baseline: LayoutBaseline,
}

struct PaneWorker {
    engine: PaneEngine,
    messages: UnboundedSender<Message>,
    foreground: Option<Foreground>,
}

/// Spawn the worker on the current runtime
pub fn spawn(engine: PaneEngine, messages: UnboundedSender<Message>) -> PaneQueue {
    let (tx, mut rx) = mpsc::unbounded_channel::<PaneJob>();
    let mut worker = PaneWorker {
        engine,
        messages,
        foreground: None,
    };

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let message = worker.run(job).await;
            if worker.messages.send(message).is_err() {
                break;
            }
        }
        tracing::debug!("pane worker stopped");
    });

    PaneQueue { tx }
}

impl PaneWorker {
    async fn run(&mut self, job: PaneJob) -> Message {
        match job {
            PaneJob::Attach {
                task_id,
                ticket,
                start,
                focus_agent,
            } => {
                let result = self.attach(task_id, &ticket, start).await;
                if let Ok(ref outcome) = result {
                    self.foreground = Some(Foreground {
                        generation: ticket.generation,
                        task_id,
                        binding: outcome.binding.clone(),
                        baseline: outcome.baseline,
                    });
                }
                Message::JoinCompleted {
                    task_id,
                    generation: ticket.generation,
                    focus_agent,
                    result,
                }
            }
            PaneJob::Detach {
                task_id,
                binding,
                baseline,
                options,
            } => {
                if self
                    .foreground
                    .as_ref()
                    .map_or(false, |f| f.binding.agent_pane == binding.agent_pane)
                {
                    self.foreground = None;
                }
                self.detach(task_id, &binding, baseline, options).await
            }
            PaneJob::ParkStale {
                task_id,
                generation,
            } => match self.foreground.take() {
                Some(f) if f.generation == generation => {
                    tracing::info!(task_id = %f.task_id, "parking panes of a superseded join");
                    let options = BreakOptions {
                        save_height: false,
                        resize_control_pane: true,
                    };
                    self.detach(f.task_id, &f.binding, Some(f.baseline), options)
                        .await
                }
                other => {
                    self.foreground = other;
                    Message::DetachCompleted {
                        task_id,
                        report: Default::default(),
                    }
                }
            },
            PaneJob::HideShell { task_id, binding } => {
                let result = match self.engine.load_task(task_id) {
                    Ok(task) => self.engine.hide_shell(&task, &binding).await,
                    Err(e) => Err(e),
                };
                self.shell_toggled(task_id, result.map_err(|e| e.to_string()))
            }
            PaneJob::ShowShell { task_id, binding } => {
                let result = match self.engine.load_task(task_id) {
                    Ok(task) => self.engine.show_shell(&task, &binding).await,
                    Err(e) => Err(e),
                };
                self.shell_toggled(task_id, result.map_err(|e| e.to_string()))
            }
            PaneJob::Probe {
                task_id,
                agent_pane,
            } => {
                let alive = self.engine.pane_alive(&agent_pane).await;
                Message::ProbeCompleted {
                    task_id,
                    agent_pane,
                    alive,
                }
            }
        }
    }

    async fn attach(
        &self,
        task_id: Uuid,
        ticket: &Ticket,
        start: bool,
    ) -> Result<JoinOutcome, AttachError> {
        if ticket.is_cancelled() {
            return Err(AttachError::Superseded);
        }
        let task = self
            .engine
            .load_task(task_id)
            .map_err(|e| AttachError::Join(e.to_string()))?;

        let window = match self.locate(&task).await {
            Ok(Some(window)) => window,
            Ok(None) if start => {
                let _ = self.messages.send(Message::LoadingStarted {
                    task_id,
                    generation: ticket.generation,
                });
                self.engine
                    .start(&task)
                    .await
                    .map_err(|e| AttachError::Start(e.to_string()))?
            }
            Ok(None) => return Err(AttachError::NoWindow),
            Err(e) if start => return Err(AttachError::Start(e.to_string())),
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "window lookup failed");
                return Err(AttachError::NoWindow);
            }
        };

        // A started agent keeps running in the background if the view moved on
        if ticket.is_cancelled() {
            return Err(AttachError::Superseded);
        }

        // Starting records fresh pane ids
        let task = self.engine.load_task(task_id).unwrap_or(task);
        self.engine
            .join(&task, &window)
            .await
            .map_err(|e| AttachError::Join(e.to_string()))
    }

    /// The task's canonical window, or its running agent pane rehomed into one
    async fn locate(&self, task: &Task) -> super::Result<Option<WindowRef>> {
        if let Some(window) = self.engine.resolve(task).await? {
            return Ok(Some(window));
        }
        self.engine.recover_agent(task).await
    }

    async fn detach(
        &self,
        task_id: Uuid,
        binding: &PaneBinding,
        baseline: Option<LayoutBaseline>,
        options: BreakOptions,
    ) -> Message {
        let report = match self.engine.load_task(task_id) {
            Ok(task) => {
                self.engine
                    .break_panes(&task, binding, baseline, options)
                    .await
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "cannot detach panes of unknown task");
                Default::default()
            }
        };
        Message::DetachCompleted { task_id, report }
    }

    fn shell_toggled(&mut self, task_id: Uuid, result: Result<PaneBinding, String>) -> Message {
        if let (Ok(binding), Some(f)) = (&result, self.foreground.as_mut()) {
            if f.binding.agent_pane == binding.agent_pane {
                f.binding = binding.clone();
            }
        }
        Message::ShellToggled { task_id, result }
    }
}
