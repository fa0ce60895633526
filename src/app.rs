use crate::detail::DetailView;
use crate::message::Message;
use crate::model::{Task, TaskStatus};
use crate::panes::AttachError;
use crate::store::TaskStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct App {
    pub tasks: Vec<Task>,
    pub selected: usize,
    pub detail: DetailView,
    pub status_message: Option<String>,
    pub should_quit: bool,
    store: Arc<dyn TaskStore>,
    /// Waiting for the last detach before exiting
    quitting: bool,
}

impl App {
    pub fn new(store: Arc<dyn TaskStore>, detail: DetailView) -> Self {
        let mut app = Self {
            tasks: Vec::new(),
            selected: 0,
            detail,
            status_message: None,
            should_quit: false,
            store,
            quitting: false,
        };
        app.reload_tasks();
        app
    }

    /// Re-read tasks from the store, keeping the selection on the same task
    pub fn reload_tasks(&mut self) {
        let selected_id = self.selected_task().map(|t| t.id);
        match self.store.list_tasks() {
            Ok(mut tasks) => {
                let order = |status: TaskStatus| {
                    TaskStatus::all()
                        .iter()
                        .position(|s| *s == status)
                        .unwrap_or(usize::MAX)
                };
                tasks.sort_by(|a, b| {
                    order(a.status)
                        .cmp(&order(b.status))
                        .then(a.created_at.cmp(&b.created_at))
                });
                self.tasks = tasks;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load tasks");
                self.status_message = Some(format!("Failed to load tasks: {}", e));
                return;
            }
        }
        self.selected = selected_id
            .and_then(|id| self.tasks.iter().position(|t| t.id == id))
            .unwrap_or_else(|| self.selected.min(self.tasks.len().saturating_sub(1)));
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.tasks.get(self.selected)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Task shown in the detail view, if one is open
    pub fn detail_task(&self) -> Option<&Task> {
        self.detail.open_task_id().and_then(|id| self.task(id))
    }

    fn open_selected(&mut self, focus_agent: bool) {
        let Some(task) = self.selected_task().cloned() else {
            return;
        };
        self.status_message = None;
        self.detail.open(&task, focus_agent);
    }

    pub fn update(&mut self, msg: Message) -> Vec<Message> {
        let commands = Vec::new();

        match msg {
            Message::SelectNext => {
                if self.selected + 1 < self.tasks.len() {
                    self.selected += 1;
                }
            }
            Message::SelectPrev => {
                self.selected = self.selected.saturating_sub(1);
            }
            Message::OpenSelected { focus_agent } => {
                self.open_selected(focus_agent);
            }
            Message::JumpTask(delta) => {
                if self.tasks.is_empty() {
                    return commands;
                }
                let last = self.tasks.len() as i64 - 1;
                let target = (self.selected as i64 + delta as i64).clamp(0, last) as usize;
                if target != self.selected || self.detail.open_task_id().is_none() {
                    self.selected = target;
                    self.open_selected(true);
                }
            }
            Message::CloseDetail => {
                self.detail.close(true);
            }
            Message::ToggleShell => {
                self.detail.toggle_shell();
            }
            Message::Refresh | Message::ReconcileTick => {
                self.reload_tasks();
                self.detail.refresh();
            }
            Message::Quit => {
                if self.detail.quit() {
                    self.quitting = true;
                    self.status_message = Some("Returning panes to the background...".to_string());
                } else {
                    self.should_quit = true;
                }
            }

            Message::Tick => {
                self.detail.tick();
            }
            Message::FocusTick => {
                self.detail.poll_focus();
            }

            Message::LoadingStarted {
                task_id,
                generation,
            } => {
                self.detail.loading_started(task_id, generation);
            }
            Message::JoinCompleted {
                task_id,
                generation,
                focus_agent,
                result,
            } => {
                let error = match &result {
                    Err(AttachError::Start(reason)) | Err(AttachError::Join(reason)) => {
                        Some(reason.clone())
                    }
                    _ => None,
                };
                if self.detail.apply_join(task_id, generation, focus_agent, result) {
                    if let Some(reason) = error {
                        self.status_message = Some(reason);
                    }
                }
                self.reload_tasks();
            }
            Message::DetachCompleted { task_id, report } => {
                self.detail.detach_completed();
                if report.window.is_none() && report.agent_pane.is_some() {
                    let title = self.task(task_id).map(|t| t.title.clone()).unwrap_or_default();
                    self.status_message =
                        Some(format!("Agent pane for '{}' was left in place", title));
                }
                self.reload_tasks();
                if self.quitting && self.detail.is_idle() {
                    self.should_quit = true;
                }
            }
            Message::ShellToggled { task_id, result } => {
                if let Some(error) = self.detail.apply_shell(task_id, result) {
                    self.status_message = Some(error);
                }
            }
            Message::ProbeCompleted {
                task_id,
                agent_pane,
                alive,
            } => {
                self.detail.apply_probe(task_id, &agent_pane, alive);
                if !alive {
                    self.reload_tasks();
                }
            }
            Message::FocusPolled { active_pane } => {
                self.detail.apply_focus(active_pane.as_deref(), true);
            }
            Message::FocusChanged { active_pane } => {
                self.detail.apply_focus(Some(&active_pane), false);
            }
            Message::SetStatusMessage(message) => {
                self.status_message = message;
            }
        }

        commands
    }
}
