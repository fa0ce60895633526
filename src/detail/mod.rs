//! Detail view controller
//!
//! Owns the single open [`ViewInstance`] and turns user actions and timer
//! ticks into pane jobs. Completions come back as messages and are applied
//! here, guarded by the request tracker so a superseded start or join can
//! never overwrite newer state.

use crate::message::Message;
use crate::model::{LogKind, PaneBinding, Task, ViewInstance, ViewPhase};
use crate::panes::{
    AttachError, BreakOptions, JoinOutcome, LayoutPrefs, PaneEngine, PaneJob, PaneQueue,
    RequestTracker,
};
use crate::store;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct DetailView {
    engine: PaneEngine,
    queue: PaneQueue,
    messages: UnboundedSender<Message>,
    requests: RequestTracker<Uuid>,
    view: Option<ViewInstance>,
    probe_in_flight: bool,
    focus_in_flight: bool,
    shell_in_flight: bool,
    /// Detach jobs submitted but not yet completed
    pending_detaches: usize,
}

impl DetailView {
    pub fn new(engine: PaneEngine, queue: PaneQueue, messages: UnboundedSender<Message>) -> Self {
        Self {
            engine,
            queue,
            messages,
            requests: RequestTracker::new(),
            view: None,
            probe_in_flight: false,
            focus_in_flight: false,
            shell_in_flight: false,
            pending_detaches: 0,
        }
    }

    pub fn view(&self) -> Option<&ViewInstance> {
        self.view.as_ref()
    }

    pub fn open_task_id(&self) -> Option<Uuid> {
        self.view.as_ref().map(|v| v.task_id)
    }

    pub fn spinner(&self) -> Option<&'static str> {
        self.view
            .as_ref()
            .filter(|v| v.loading)
            .map(|v| SPINNER_FRAMES[v.spinner_frame % SPINNER_FRAMES.len()])
    }

    /// No pane work is outstanding
    pub fn is_idle(&self) -> bool {
        self.pending_detaches == 0
    }

    /// Open a task: join its running window, or start one when its status allows.
    /// Replaces whatever view was open before. The window is looked up by the
    /// pane worker, after any earlier pane job has settled.
    pub fn open(&mut self, task: &Task, focus_agent: bool) {
        if let Some(view) = self.view.as_mut().filter(|v| v.task_id == task.id) {
            if view.phase == ViewPhase::Joined {
                let agent = view.binding.as_ref().map(|b| b.agent_pane.clone());
                if let (true, Some(agent)) = (focus_agent, agent) {
                    self.focus_pane(agent);
                }
                return;
            }
            if self.requests.in_flight(&task.id) {
                // Already on its way; reissuing would race the pending join
                view.focus_agent_on_join |= focus_agent;
                return;
            }
        }
        self.close(false);

        let start = task.status.allows_auto_start();
        tracing::info!(task_id = %task.id, start, "opening detail view");
        let mut view = ViewInstance::new(task.id, focus_agent);
        view.phase = ViewPhase::Joining;
        let ticket = self.requests.issue(task.id);
        self.queue.submit(PaneJob::Attach {
            task_id: task.id,
            ticket,
            start,
            focus_agent,
        });
        self.view = Some(view);
    }

    pub fn loading_started(&mut self, task_id: Uuid, generation: u64) {
        if !self.requests.is_current(&task_id, generation) {
            return;
        }
        if let Some(view) = self.view.as_mut().filter(|v| v.task_id == task_id) {
            view.loading = true;
            view.spinner_frame = 0;
        }
    }

    /// Close the view, returning its panes to the background.
    /// Returns whether a detach was queued.
    pub fn close(&mut self, resize_control_pane: bool) -> bool {
        let Some(view) = self.view.take() else {
            return false;
        };
        self.requests.cancel(&view.task_id);
        self.shell_in_flight = false;

        let Some(binding) = view.binding else {
            return false;
        };
        tracing::info!(task_id = %view.task_id, "closing detail view");
        self.submit_detach(PaneJob::Detach {
            task_id: view.task_id,
            binding,
            baseline: view.baseline,
            options: BreakOptions {
                save_height: false,
                resize_control_pane,
            },
        });
        true
    }

    /// Shut down: cancel outstanding requests and detach. Returns whether
    /// the caller has to wait for a detach to complete.
    pub fn quit(&mut self) -> bool {
        self.requests.cancel_all();
        self.close(true);
        !self.is_idle()
    }

    fn submit_detach(&mut self, job: PaneJob) {
        self.pending_detaches += 1;
        self.queue.submit(job);
    }

    pub fn detach_completed(&mut self) {
        self.pending_detaches = self.pending_detaches.saturating_sub(1);
    }

    /// Apply a join completion. Returns `false` when it was stale and dropped.
    pub fn apply_join(
        &mut self,
        task_id: Uuid,
        generation: u64,
        focus_agent: bool,
        result: Result<JoinOutcome, AttachError>,
    ) -> bool {
        let current = self.requests.complete(&task_id, generation)
            && self.open_task_id() == Some(task_id);
        if !current {
            tracing::debug!(task_id = %task_id, generation, "discarding stale join completion");
            if result.is_ok() {
                self.submit_detach(PaneJob::ParkStale {
                    task_id,
                    generation,
                });
            }
            return false;
        }

        let Some(view) = self.view.as_mut() else {
            return false;
        };
        view.loading = false;
        match result {
            Ok(outcome) => {
                tracing::info!(task_id = %task_id, agent_pane = %outcome.binding.agent_pane, "detail view joined");
                view.phase = ViewPhase::Joined;
                view.error = None;
                view.focused = true;
                let agent = outcome.binding.agent_pane.clone();
                view.binding = Some(outcome.binding);
                view.baseline = Some(outcome.baseline);
                let focus = focus_agent || view.focus_agent_on_join;
                view.focus_agent_on_join = false;
                if focus {
                    self.focus_pane(agent);
                }
            }
            Err(AttachError::Superseded) | Err(AttachError::NoWindow) => {
                view.phase = ViewPhase::Detached;
            }
            Err(AttachError::Start(reason)) => {
                tracing::warn!(task_id = %task_id, reason = %reason, "agent start failed");
                view.phase = ViewPhase::Detached;
                view.error = Some(reason.clone());
                store::audit(
                    self.engine.store.as_ref(),
                    task_id,
                    LogKind::Error,
                    &format!("Failed to start agent: {}", reason),
                );
            }
            Err(AttachError::Join(reason)) => {
                tracing::warn!(task_id = %task_id, reason = %reason, "join failed");
                view.mark_failed(reason.clone());
                store::audit(
                    self.engine.store.as_ref(),
                    task_id,
                    LogKind::Error,
                    &format!("Failed to attach agent panes: {}", reason),
                );
            }
        }
        true
    }

    /// Periodic reconciliation: check a joined agent is still alive, or
    /// opportunistically join a window that appeared in the background.
    pub fn refresh(&mut self) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        if view.is_failed() || view.loading || self.requests.in_flight(&view.task_id) {
            return;
        }

        match view.binding.as_ref() {
            Some(binding) => {
                if !self.probe_in_flight {
                    self.probe_in_flight = true;
                    self.queue.submit(PaneJob::Probe {
                        task_id: view.task_id,
                        agent_pane: binding.agent_pane.clone(),
                    });
                }
            }
            None if view.can_join() => {
                view.phase = ViewPhase::Joining;
                let ticket = self.requests.issue(view.task_id);
                self.queue.submit(PaneJob::Attach {
                    task_id: view.task_id,
                    ticket,
                    start: false,
                    focus_agent: false,
                });
            }
            None => {}
        }
    }

    pub fn apply_probe(&mut self, task_id: Uuid, agent_pane: &str, alive: bool) {
        self.probe_in_flight = false;
        if alive {
            return;
        }
        let Some(view) = self.view.as_mut().filter(|v| v.task_id == task_id) else {
            return;
        };
        if view.binding.as_ref().map(|b| b.agent_pane.as_str()) != Some(agent_pane) {
            return;
        }

        tracing::info!(task_id = %task_id, agent_pane, "agent pane exited");
        let binding = view.binding.take();
        let baseline = view.baseline.take();
        view.phase = ViewPhase::Detached;
        view.focused = true;
        store::audit(
            self.engine.store.as_ref(),
            task_id,
            LogKind::System,
            "Agent exited",
        );
        if let Some(binding) = binding {
            self.submit_detach(PaneJob::Detach {
                task_id,
                binding,
                baseline,
                options: BreakOptions {
                    save_height: false,
                    resize_control_pane: true,
                },
            });
        }
    }

    pub fn toggle_shell(&mut self) {
        let joined = self
            .view
            .as_ref()
            .and_then(|v| v.binding.clone().map(|b| (v.task_id, b)));
        match joined {
            Some((task_id, binding)) => {
                if self.shell_in_flight {
                    return;
                }
                self.shell_in_flight = true;
                let job = if binding.shell_hidden {
                    PaneJob::ShowShell { task_id, binding }
                } else {
                    PaneJob::HideShell { task_id, binding }
                };
                self.queue.submit(job);
            }
            None => {
                // Nothing joined; only the preference changes
                let hidden = self.engine.prefs().shell_hidden;
                LayoutPrefs::save_shell_hidden(self.engine.store.as_ref(), !hidden);
            }
        }
    }

    /// Returns an error to surface in the status bar, if any
    pub fn apply_shell(
        &mut self,
        task_id: Uuid,
        result: Result<PaneBinding, String>,
    ) -> Option<String> {
        self.shell_in_flight = false;
        match result {
            Ok(binding) => {
                if let Some(view) = self.view.as_mut().filter(|v| v.task_id == task_id) {
                    if view.binding.as_ref().map(|b| &b.agent_pane) == Some(&binding.agent_pane) {
                        view.binding = Some(binding);
                    }
                }
                None
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "shell toggle failed");
                Some(format!("Shell toggle failed: {}", e))
            }
        }
    }

    /// Ask tmux which pane has focus, at most one query at a time
    pub fn poll_focus(&mut self) {
        let joined = self.view.as_ref().map_or(false, |v| v.binding.is_some());
        if !joined || self.focus_in_flight {
            return;
        }
        self.focus_in_flight = true;

        let mux = self.engine.mux.clone();
        let session = self.engine.ui.session.clone();
        let tx = self.messages.clone();
        tokio::spawn(async move {
            let active_pane = match mux.active_pane(&session).await {
                Ok(pane) => Some(pane),
                Err(e) => {
                    tracing::debug!(error = %e, "focus poll failed");
                    None
                }
            };
            let _ = tx.send(Message::FocusPolled { active_pane });
        });
    }

    pub fn apply_focus(&mut self, active_pane: Option<&str>, polled: bool) {
        if polled {
            self.focus_in_flight = false;
        }
        let control = &self.engine.ui.control_pane;
        if let (Some(view), Some(active)) = (self.view.as_mut(), active_pane) {
            view.focused = view.binding.is_none() || active == control;
        }
    }

    fn focus_pane(&self, pane: String) {
        let mux = self.engine.mux.clone();
        let tx = self.messages.clone();
        tokio::spawn(async move {
            match mux.select_pane(&pane).await {
                Ok(()) => {
                    let _ = tx.send(Message::FocusChanged { active_pane: pane });
                }
                Err(e) => tracing::warn!(pane = %pane, error = %e, "failed to focus agent pane"),
            }
        });
    }

    /// Advance the loading spinner
    pub fn tick(&mut self) {
        if let Some(view) = self.view.as_mut().filter(|v| v.loading) {
            view.spinner_frame = view.spinner_frame.wrapping_add(1);
        }
    }
}
