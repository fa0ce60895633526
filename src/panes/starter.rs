use super::{PaneEngine, ReconcileError, Result, PLACEHOLDER_WINDOW, SHELL_TITLE};
use crate::executor::{executor_for, task_prompt};
use crate::model::{LogKind, Task, TaskStatus, WindowRef};
use crate::tmux::{NewWindow, SplitDirection, SplitRequest};

impl PaneEngine {
    /// Name of an existing daemon session, creating one when none is running
    pub async fn ensure_daemon_session(&self) -> Result<String> {
        let prefix = &self.config.daemon_session_prefix;
        if let Some(session) = self.find_daemon_session().await? {
            return Ok(session);
        }

        let name = format!("{}-{}", prefix, std::process::id());
        tracing::info!(session = %name, "creating daemon session");
        match self
            .mux
            .new_session(&name, PLACEHOLDER_WINDOW, &self.config.placeholder_command)
            .await
        {
            Ok(()) => Ok(name),
            Err(e) => {
                // Lost a race with another dashboard instance
                if let Some(session) = self.find_daemon_session().await? {
                    return Ok(session);
                }
                Err(e.into())
            }
        }
    }

    async fn find_daemon_session(&self) -> Result<Option<String>> {
        let prefix = &self.config.daemon_session_prefix;
        Ok(self
            .mux
            .list_sessions()
            .await?
            .into_iter()
            .find(|s| s.starts_with(prefix.as_str())))
    }

    /// Rehome the task's agent pane into a canonical window when its process
    /// still runs outside one, e.g. docked by an earlier join. `None` when the
    /// task has no running agent pane.
    pub async fn recover_agent(&self, task: &Task) -> Result<Option<WindowRef>> {
        let Some(agent) = task.agent_pane_id.as_deref() else {
            return Ok(None);
        };
        if agent == self.ui.control_pane || !self.process_running(agent).await {
            return Ok(None);
        }

        let window = self
            .break_into_daemon(agent, &task.canonical_window_name())
            .await?;
        self.store.update_task_window_id(task.id, &window)?;
        tracing::info!(task_id = %task.id, agent_pane = agent, window = %window, "recovered running agent pane");
        self.audit(task.id, LogKind::System, "Recovered running agent pane");
        Ok(Some(window))
    }

    /// Launch the task's agent in a new canonical window with a shell beside it.
    ///
    /// Idempotent: an existing canonical window is returned as is, and an
    /// agent pane whose process still runs is rehomed instead of replaced.
    pub async fn start(&self, task: &Task) -> Result<WindowRef> {
        let session = self.ensure_daemon_session().await?;
        if let Some(window) = self.resolve(task).await? {
            tracing::info!(task_id = %task.id, window = %window, "agent window already running");
            return Ok(window);
        }
        if let Some(window) = self.recover_agent(task).await? {
            return Ok(window);
        }

        let executor = executor_for(task.agent);
        let command = match task.continuation_token.as_deref() {
            Some(token) => {
                self.audit(
                    task.id,
                    LogKind::System,
                    &format!("Reconnecting to {} session", executor.name()),
                );
                executor.build_command(task, Some(token), "")
            }
            None => {
                self.audit(
                    task.id,
                    LogKind::System,
                    &format!("Starting {} session", executor.name()),
                );
                executor.build_command(task, None, &task_prompt(task))
            }
        };
        tracing::info!(task_id = %task.id, agent = executor.name(), "starting agent");

        let created = self
            .mux
            .create_window(NewWindow {
                session,
                name: task.canonical_window_name(),
                cwd: Some(task.workspace.clone()),
                command: Some(command),
            })
            .await?;
        let window = created.window.to_ref();
        self.store.update_task_window_id(task.id, &window)?;

        let prefs = self.prefs();
        let shell = self
            .mux
            .split_pane(SplitRequest {
                target: created.pane_id.clone(),
                direction: SplitDirection::Horizontal,
                size_percent: Some(prefs.shell_width_percent),
                cwd: Some(task.workspace.clone()),
                command: Some(self.config.shell.clone()),
                env: self.task_env(task),
            })
            .await
            .map_err(|e| {
                // The agent pane closes with its process; a missing target
                // means the command exited straight away
                if e.is_missing_target() {
                    ReconcileError::AgentExited
                } else {
                    e.into()
                }
            })?;

        if let Err(e) = self.mux.set_pane_title(&created.pane_id, executor.name()).await {
            tracing::debug!(error = %e, "failed to title agent pane");
        }
        if let Err(e) = self.mux.set_pane_title(&shell, SHELL_TITLE).await {
            tracing::debug!(error = %e, "failed to title shell pane");
        }

        self.store
            .update_task_pane_ids(task.id, Some(&created.pane_id), Some(&shell))?;
        if task.status == TaskStatus::Queued {
            self.store.update_task_status(task.id, TaskStatus::Processing)?;
        }

        tracing::info!(task_id = %task.id, window = %window, agent_pane = %created.pane_id, "agent started");
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{LogKind, TaskStatus};
    use crate::panes::testing::{add_task, engine};
    use crate::panes::{ReconcileError, PLACEHOLDER_WINDOW, SHELL_TITLE};
    use crate::store::TaskStore;
    use crate::tmux::{Multiplexer, SplitDirection};

    #[tokio::test]
    async fn test_daemon_session_is_created_once() {
        let (engine, mux, _) = engine();
        let first = engine.ensure_daemon_session().await.unwrap();
        assert!(first.starts_with("kanmux-daemon-"));
        assert_eq!(mux.windows(&first)[0].name, PLACEHOLDER_WINDOW);

        let second = engine.ensure_daemon_session().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            mux.session_names()
                .iter()
                .filter(|s| s.starts_with("kanmux-daemon"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_existing_daemon_session_is_reused() {
        let (engine, mux, _) = engine();
        mux.add_session("kanmux-daemon-77", "_placeholder");
        assert_eq!(engine.ensure_daemon_session().await.unwrap(), "kanmux-daemon-77");
    }

    #[tokio::test]
    async fn test_start_creates_window_with_shell() {
        let (engine, mux, store) = engine();
        let task = add_task(&store, "Fix login");

        let window = engine.start(&task).await.unwrap();
        let stored = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.window_id.as_deref(), Some(window.window_id.as_str()));
        assert_eq!(stored.status, TaskStatus::Processing);

        let panes = mux.panes_in_window(&window.window_id);
        assert_eq!(panes.len(), 2);
        let agent = mux.pane(&panes[0]).unwrap();
        let shell = mux.pane(&panes[1]).unwrap();
        assert_eq!(stored.agent_pane_id.as_deref(), Some(agent.id.as_str()));
        assert_eq!(stored.shell_pane_id.as_deref(), Some(shell.id.as_str()));
        assert!(agent.command.unwrap().starts_with("claude "));
        assert_eq!(agent.title, "Claude");
        assert_eq!(shell.title, SHELL_TITLE);
        assert!(shell
            .env
            .iter()
            .any(|(k, v)| k == "KANMUX_TASK_ID" && v == &task.id.to_string()));

        // Audit line written before the window exists
        assert_eq!(stored.logs[0].kind, LogKind::System);
        assert_eq!(stored.logs[0].text, "Starting Claude session");
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (engine, mux, store) = engine();
        let task = add_task(&store, "Fix login");
        let first = engine.start(&task).await.unwrap();
        let second = engine.start(&task).await.unwrap();
        assert_eq!(first, second);
        let daemon = first.session.clone();
        let canonical: Vec<_> = mux
            .windows(&daemon)
            .into_iter()
            .filter(|w| w.name == task.canonical_window_name())
            .collect();
        assert_eq!(canonical.len(), 1);
    }

    #[tokio::test]
    async fn test_start_rehomes_running_agent_instead_of_launching() {
        let (engine, mux, store) = engine();
        let task = add_task(&store, "Fix login");
        let window = engine.start(&task).await.unwrap();
        let task = store.get_task(task.id).unwrap().unwrap();
        let agent = task.agent_pane_id.clone().unwrap();

        let shell = task.shell_pane_id.clone().unwrap();

        // Both panes docked next to the dashboard; the canonical window closed
        mux.join_pane(&agent, &engine.ui.control_pane, SplitDirection::Vertical, Some(50))
            .await
            .unwrap();
        mux.join_pane(&shell, &agent, SplitDirection::Horizontal, Some(30))
            .await
            .unwrap();
        assert!(mux.panes_in_window(&window.window_id).is_empty());

        let recovered = engine.start(&task).await.unwrap();
        assert_eq!(mux.panes_in_window(&recovered.window_id), vec![agent.clone()]);
        assert_eq!(recovered.name, task.canonical_window_name());
        let stored = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.agent_pane_id.as_deref(), Some(agent.as_str()));
        assert_eq!(stored.window_id.as_deref(), Some(recovered.window_id.as_str()));
        assert_eq!(stored.logs.last().unwrap().text, "Recovered running agent pane");
    }

    #[tokio::test]
    async fn test_exited_agent_is_not_recovered() {
        let (engine, mux, store) = engine();
        let task = add_task(&store, "Fix login");
        engine.start(&task).await.unwrap();
        let task = store.get_task(task.id).unwrap().unwrap();
        let agent = task.agent_pane_id.clone().unwrap();
        mux.mark_dead(&agent);
        mux.join_pane(&agent, &engine.ui.control_pane, SplitDirection::Vertical, Some(50))
            .await
            .unwrap();

        assert!(engine.recover_agent(&task).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_continuation_token_resumes() {
        let (engine, mux, store) = engine();
        let task = crate::model::Task::new("Resume me", "/work".into())
            .with_continuation_token("sess-9")
            .with_status(TaskStatus::Blocked);
        store.add_task(task.clone()).unwrap();

        let window = engine.start(&task).await.unwrap();
        let agent = mux.panes_in_window(&window.window_id)[0].clone();
        assert_eq!(mux.pane(&agent).unwrap().command.unwrap(), "claude --resume sess-9");

        let stored = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Blocked);
        assert_eq!(stored.logs[0].text, "Reconnecting to Claude session");
    }

    #[tokio::test]
    async fn test_window_creation_failure_is_reported() {
        let (engine, mux, store) = engine();
        let task = add_task(&store, "Fix login");
        mux.fail_next("new-window", 1);

        let err = engine.start(&task).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Mux(_)));
        let stored = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Queued);
        assert!(stored.window_id.is_none());
    }
}
