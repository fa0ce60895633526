use super::layout::{percent_of, shell_width_percent, LayoutChanges, LayoutPrefs, MeasuredLayout};
use super::{PaneEngine, ReconcileError, Result, SHELL_TITLE};
use crate::executor::executor_for;
use crate::model::{LayoutBaseline, LogKind, PaneBinding, Task, WindowRef};
use crate::tmux::{Dimension, MuxError, PaneInfo, SplitDirection, SplitRequest};

/// Foreground state produced by a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub binding: PaneBinding,
    pub baseline: LayoutBaseline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakOptions {
    /// Persist the measured dashboard height even if it did not drift
    pub save_height: bool,
    /// Give the dashboard pane the full window again afterwards
    pub resize_control_pane: bool,
}

/// Where a break left things
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakReport {
    /// Canonical window now holding the agent; `None` if it stayed in the foreground
    pub window: Option<WindowRef>,
    /// `None` once the agent pane no longer exists
    pub agent_pane: Option<String>,
    pub shell_pane: Option<String>,
    pub saved: LayoutChanges,
}

fn vanished(e: MuxError, window: &WindowRef) -> ReconcileError {
    if e.is_missing_target() {
        ReconcileError::WindowVanished(window.to_string())
    } else {
        e.into()
    }
}

/// Pick the agent and shell panes of a canonical window. Persisted ids win;
/// otherwise the first pane is taken to be the agent.
fn identify_panes(task: &Task, panes: &[PaneInfo]) -> Option<(String, Option<String>)> {
    let present = |id: &Option<String>| {
        id.as_ref()
            .filter(|id| panes.iter().any(|p| &p.id == *id))
            .cloned()
    };

    let agent = present(&task.agent_pane_id).or_else(|| panes.first().map(|p| p.id.clone()))?;
    let shell = present(&task.shell_pane_id)
        .filter(|s| *s != agent)
        .or_else(|| panes.iter().find(|p| p.id != agent).map(|p| p.id.clone()));
    Some((agent, shell))
}

impl PaneEngine {
    /// Move a task's panes from its canonical window into the dashboard's window.
    ///
    /// Fails only when the agent pane cannot be brought over; every later
    /// step degrades to a log line so the agent is never left half-joined.
    pub async fn join(&self, task: &Task, window: &WindowRef) -> Result<JoinOutcome> {
        let control = self.ui.control_pane.clone();
        self.clear_foreground().await;

        let panes = self
            .mux
            .list_panes(&window.window_id)
            .await
            .map_err(|e| vanished(e, window))?;
        let (agent, shell_in_window) = identify_panes(task, &panes)
            .ok_or_else(|| ReconcileError::NoAgentPane(window.to_string()))?;

        let prefs = self.prefs();
        self.mux
            .join_pane(
                &agent,
                &control,
                SplitDirection::Vertical,
                Some(prefs.agent_height_percent()),
            )
            .await
            .map_err(|e| vanished(e, window))?;
        tracing::info!(task_id = %task.id, window = %window, agent_pane = %agent, "joined agent pane");
        self.title_agent(task, &agent).await;

        let shell = self
            .attach_shell(task, &agent, shell_in_window, &prefs)
            .await;

        if let Err(e) = self
            .mux
            .resize_pane(&control, Dimension::Height, prefs.height_percent)
            .await
        {
            tracing::warn!(error = %e, "failed to size dashboard pane");
        }

        self.install_bindings().await;

        if let Err(e) = self
            .store
            .update_task_pane_ids(task.id, Some(&agent), shell.as_deref())
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist pane ids");
        }

        Ok(JoinOutcome {
            binding: PaneBinding {
                control_pane: control,
                agent_pane: agent,
                shell_pane: shell,
                shell_hidden: prefs.shell_hidden,
            },
            baseline: prefs.baseline(),
        })
    }

    /// Move joined panes back into the task's canonical window.
    ///
    /// Never kills a pane: when neither the canonical window nor a fresh
    /// window can take the agent, it stays in the foreground.
    pub async fn break_panes(
        &self,
        task: &Task,
        binding: &PaneBinding,
        baseline: Option<LayoutBaseline>,
        options: BreakOptions,
    ) -> BreakReport {
        let measured = self.measure(binding).await;
        let saved = measured.changes(
            baseline,
            self.config.layout.drift_tolerance_percent,
            options.save_height,
        );
        LayoutPrefs::save(self.store.as_ref(), saved);

        self.remove_bindings().await;

        let agent_alive = self.pane_alive(&binding.agent_pane).await;
        let window = if agent_alive {
            self.park_agent(task, &binding.agent_pane).await
        } else {
            tracing::info!(task_id = %task.id, agent_pane = %binding.agent_pane, "agent pane already gone");
            None
        };

        let shell = match binding.shell_pane.as_deref() {
            Some(shell) if self.pane_alive(shell).await => {
                if !binding.shell_hidden {
                    if window.is_some() {
                        self.park_shell(task, shell, &binding.agent_pane).await;
                    } else if !agent_alive {
                        // Nothing left to sit next to; park it like a hidden shell
                        if let Err(e) = self
                            .break_into_daemon(shell, &task.hidden_shell_window_name())
                            .await
                        {
                            tracing::warn!(task_id = %task.id, error = %e, "leaving shell pane in place");
                        }
                    }
                }
                Some(shell.to_string())
            }
            _ => None,
        };

        let agent = agent_alive.then(|| binding.agent_pane.clone());
        if let Err(e) = self
            .store
            .update_task_pane_ids(task.id, agent.as_deref(), shell.as_deref())
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist pane ids");
        }

        if options.resize_control_pane {
            if let Err(e) = self
                .mux
                .resize_pane(&binding.control_pane, Dimension::Height, 100)
                .await
            {
                tracing::debug!(error = %e, "failed to restore dashboard pane");
            }
        }

        BreakReport {
            window,
            agent_pane: agent,
            shell_pane: shell,
            saved,
        }
    }

    /// Kill dead panes and relocate live strangers left next to the dashboard
    async fn clear_foreground(&self) {
        let control = &self.ui.control_pane;
        let panes = match self.mux.list_panes(control).await {
            Ok(panes) => panes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list dashboard panes");
                return;
            }
        };
        let leftovers: Vec<PaneInfo> = panes.into_iter().filter(|p| &p.id != control).collect();
        if leftovers.is_empty() {
            return;
        }

        let tasks = self.store.list_tasks().unwrap_or_default();
        for pane in leftovers {
            if pane.dead {
                tracing::info!(pane = %pane.id, "removing dead leftover pane");
                if let Err(e) = self.mux.kill_pane(&pane.id).await {
                    tracing::warn!(pane = %pane.id, error = %e, "failed to remove dead pane");
                }
                continue;
            }

            let agent_owner = tasks
                .iter()
                .find(|t| t.agent_pane_id.as_deref() == Some(pane.id.as_str()));
            let shell_owner = tasks
                .iter()
                .find(|t| t.shell_pane_id.as_deref() == Some(pane.id.as_str()));
            let name = match (agent_owner, shell_owner) {
                (Some(task), _) => task.canonical_window_name(),
                (None, Some(task)) => task.hidden_shell_window_name(),
                (None, None) => format!("orphan-{}", pane.id.trim_start_matches('%')),
            };

            match self.break_into_daemon(&pane.id, &name).await {
                Ok(window) => {
                    tracing::info!(pane = %pane.id, window = %window, "relocated leftover pane");
                    if let Some(task) = agent_owner {
                        if let Err(e) = self.store.update_task_window_id(task.id, &window) {
                            tracing::warn!(task_id = %task.id, error = %e, "failed to persist window id");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(pane = %pane.id, error = %e, "failed to relocate leftover pane, leaving it")
                }
            }
        }
    }

    async fn attach_shell(
        &self,
        task: &Task,
        agent: &str,
        in_window: Option<String>,
        prefs: &LayoutPrefs,
    ) -> Option<String> {
        // A hidden shell lives in its own window, outside the canonical one
        let known = match in_window {
            Some(shell) => Some(shell),
            None => match task.shell_pane_id.as_deref() {
                Some(id) if id != agent && self.pane_alive(id).await => Some(id.to_string()),
                _ => None,
            },
        };
        if prefs.shell_hidden {
            return known;
        }

        if let Some(shell) = known {
            match self
                .mux
                .join_pane(
                    &shell,
                    agent,
                    SplitDirection::Horizontal,
                    Some(prefs.shell_width_percent),
                )
                .await
            {
                Ok(()) => return Some(shell),
                Err(e) => {
                    tracing::warn!(task_id = %task.id, shell_pane = %shell, error = %e, "failed to attach shell, starting a new one")
                }
            }
        }

        match self.spawn_shell(task, agent, prefs.shell_width_percent).await {
            Ok(shell) => Some(shell),
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to create shell pane");
                self.audit(task.id, LogKind::Error, &format!("Could not open shell: {}", e));
                None
            }
        }
    }

    /// Split a fresh shell to the right of the agent pane
    pub(super) async fn spawn_shell(&self, task: &Task, agent: &str, width: u8) -> Result<String> {
        let shell = self
            .mux
            .split_pane(SplitRequest {
                target: agent.to_string(),
                direction: SplitDirection::Horizontal,
                size_percent: Some(width),
                cwd: Some(task.workspace.clone()),
                command: Some(self.config.shell.clone()),
                env: self.task_env(task),
            })
            .await?;
        if let Err(e) = self.mux.set_pane_title(&shell, SHELL_TITLE).await {
            tracing::debug!(error = %e, "failed to title shell pane");
        }
        if let Err(e) = self.mux.send_keys(&shell, &["clear", "Enter"]).await {
            tracing::debug!(error = %e, "failed to clear shell pane");
        }
        tracing::info!(task_id = %task.id, shell_pane = %shell, "created shell pane");
        Ok(shell)
    }

    async fn title_agent(&self, task: &Task, agent: &str) {
        let name = executor_for(task.agent).name();
        let title = match self.mux.pane_memory_kb(agent).await {
            Some(kb) => format!("{} ({} MB)", name, kb / 1024),
            None => name.to_string(),
        };
        if let Err(e) = self.mux.set_pane_title(agent, &title).await {
            tracing::debug!(error = %e, "failed to title agent pane");
        }
    }

    async fn measure(&self, binding: &PaneBinding) -> MeasuredLayout {
        let control = &binding.control_pane;
        let height_percent = match (
            self.query_u32(control, "pane_height").await,
            self.query_u32(control, "window_height").await,
        ) {
            (Some(height), Some(total)) => Some(percent_of(height, total)),
            _ => None,
        };

        let shell_width_percent = match binding.shell_pane.as_deref() {
            Some(shell) if !binding.shell_hidden && self.same_window(shell, &binding.agent_pane).await => {
                match (
                    self.query_u32(shell, "pane_width").await,
                    self.query_u32(&binding.agent_pane, "pane_width").await,
                ) {
                    (Some(shell), Some(agent)) => Some(shell_width_percent(shell, agent)),
                    _ => None,
                }
            }
            _ => None,
        };

        MeasuredLayout {
            height_percent,
            shell_width_percent,
        }
    }

    async fn same_window(&self, a: &str, b: &str) -> bool {
        match (
            self.mux.query_pane(a, "window_id").await,
            self.mux.query_pane(b, "window_id").await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Put the agent pane back into its canonical window, or into a new
    /// window of its own when that fails. `None` means it was left in place.
    async fn park_agent(&self, task: &Task, agent: &str) -> Option<WindowRef> {
        let name = task.canonical_window_name();

        let primary = match self.resolve(task).await {
            Ok(Some(window)) => self.join_window(agent, &window).await.map(|_| window),
            Ok(None) => self.break_into_daemon(agent, &name).await,
            Err(e) => Err(e),
        };
        let window = match primary {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to return agent pane, retrying in a new window");
                match self.break_into_daemon(agent, &name).await {
                    Ok(window) => {
                        self.audit(
                            task.id,
                            LogKind::System,
                            &format!("Agent pane moved to a new window after: {}", e),
                        );
                        window
                    }
                    Err(e) => {
                        tracing::error!(task_id = %task.id, error = %e, "could not park agent pane, leaving it in place");
                        self.audit(
                            task.id,
                            LogKind::Error,
                            &format!("Agent pane left in the dashboard window: {}", e),
                        );
                        return None;
                    }
                }
            }
        };

        if let Err(e) = self.store.update_task_window_id(task.id, &window) {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist window id");
        }
        tracing::info!(task_id = %task.id, window = %window, "parked agent pane");
        Some(window)
    }

    async fn park_shell(&self, task: &Task, shell: &str, agent: &str) {
        let width = self.prefs().shell_width_percent;
        match self
            .mux
            .join_pane(shell, agent, SplitDirection::Horizontal, Some(width))
            .await
        {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to return shell pane");
                if let Err(e) = self
                    .break_into_daemon(shell, &task.hidden_shell_window_name())
                    .await
                {
                    tracing::warn!(task_id = %task.id, error = %e, "leaving shell pane in place");
                }
            }
        }
    }

    async fn join_window(&self, pane: &str, window: &WindowRef) -> Result<()> {
        let target = self
            .mux
            .list_panes(&window.window_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ReconcileError::WindowVanished(window.to_string()))?;
        self.mux
            .join_pane(pane, &target.id, SplitDirection::Horizontal, None)
            .await
            .map_err(|e| vanished(e, window))
    }

    /// Detach a pane into a new daemon window, recreating the daemon session if needed
    pub(super) async fn break_into_daemon(&self, pane: &str, window_name: &str) -> Result<WindowRef> {
        let session = self.ensure_daemon_session().await?;
        let window = self.mux.break_pane(pane, &session, window_name).await?;
        Ok(window.to_ref())
    }
}
