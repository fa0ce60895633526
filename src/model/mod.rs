use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// A unit of work executed by an AI coding agent inside a tmux window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub agent: AgentKind,
    /// Token from a previous agent run; present means "resume" instead of "start fresh"
    #[serde(default)]
    pub continuation_token: Option<String>,
    pub workspace: PathBuf,
    /// Launch the agent with its permission prompts disabled
    #[serde(default)]
    pub dangerous_mode: bool,
    pub created_at: DateTime<Utc>,

    // === Reconciliation identifiers ===
    // Persisted so a restart or reopen can reattach deterministically.

    /// Daemon session that hosted the canonical window when it was last seen
    #[serde(default)]
    pub daemon_session: Option<String>,
    /// tmux window id (`@N`) of the canonical window
    #[serde(default)]
    pub window_id: Option<String>,
    /// tmux pane id (`%N`) of the agent pane
    #[serde(default)]
    pub agent_pane_id: Option<String>,
    /// tmux pane id (`%N`) of the companion shell pane
    #[serde(default)]
    pub shell_pane_id: Option<String>,

    /// Audit log shown in the dashboard
    #[serde(default)]
    pub logs: Vec<TaskLog>,
}

impl Task {
    pub fn new(title: impl Into<String>, workspace: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            body: String::new(),
            status: TaskStatus::Queued,
            agent: AgentKind::default(),
            continuation_token: None,
            workspace,
            dangerous_mode: false,
            created_at: Utc::now(),
            daemon_session: None,
            window_id: None,
            agent_pane_id: None,
            shell_pane_id: None,
            logs: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_agent(mut self, agent: AgentKind) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    /// Name of the daemon window hosting this task's agent.
    /// Fallback identity when the stored window id has gone stale.
    pub fn canonical_window_name(&self) -> String {
        format!("task-{}", self.id.simple())
    }

    /// Name of the daemon window that parks the shell pane while it is hidden
    pub fn hidden_shell_window_name(&self) -> String {
        format!("task-{}-shell", self.id.simple())
    }

    /// Most recent error entry, if any
    pub fn last_error(&self) -> Option<&TaskLog> {
        self.logs.iter().rev().find(|l| l.kind == LogKind::Error)
    }
}

/// Task lifecycle status. Transitions are owned by the surrounding dashboard;
/// the pane engine only reads it (and promotes Queued to Processing on start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    #[default]
    Queued,
    Processing,
    Blocked,
    Done,
    Archived,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::Queued => "Queued",
            TaskStatus::Processing => "Processing",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Done => "Done",
            TaskStatus::Archived => "Archived",
        }
    }

    pub fn all() -> [TaskStatus; 6] {
        [
            TaskStatus::Backlog,
            TaskStatus::Queued,
            TaskStatus::Processing,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Archived,
        ]
    }

    /// Whether opening the task may launch an agent automatically.
    /// Not-yet-queued, finished and archived tasks never do.
    pub fn allows_auto_start(&self) -> bool {
        !matches!(
            self,
            TaskStatus::Backlog | TaskStatus::Done | TaskStatus::Archived
        )
    }
}

/// Which agent CLI runs a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
    Gemini,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Gemini => "gemini",
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(AgentKind::Claude),
            "codex" => Ok(AgentKind::Codex),
            "gemini" => Ok(AgentKind::Gemini),
            other => Err(format!("unknown agent kind: {}", other)),
        }
    }
}

/// Kind of an audit log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    System,
    Error,
    Output,
}

impl LogKind {
    pub fn label(&self) -> &'static str {
        match self {
            LogKind::System => "system",
            LogKind::Error => "error",
            LogKind::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub at: DateTime<Utc>,
    pub kind: LogKind,
    pub text: String,
}

/// A live tmux window hosting a task's agent. Recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRef {
    pub session: String,
    pub window_id: String,
}

impl fmt::Display for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.window_id)
    }
}

/// The foreground layout while a task is joined. Lives for one join→break cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneBinding {
    pub control_pane: String,
    pub agent_pane: String,
    /// Shell pane id, kept even while the pane is parked in its hidden window
    pub shell_pane: Option<String>,
    pub shell_hidden: bool,
}

/// Layout percentages applied at join time; break compares against them
/// to tell a manual resize apart from rounding noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBaseline {
    pub height_percent: u8,
    pub shell_width_percent: u8,
}

/// Join state of a detail view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewPhase {
    #[default]
    Detached,
    Joining,
    Joined,
    /// Terminal for this view instance; only a fresh open resets it
    Failed,
}

/// Transient state of one open detail view
#[derive(Debug, Clone)]
pub struct ViewInstance {
    pub task_id: Uuid,
    pub phase: ViewPhase,
    /// An agent session is being started in the background
    pub loading: bool,
    /// The dashboard pane holds tmux input focus
    pub focused: bool,
    /// Move tmux focus to the agent pane once the join completes
    pub focus_agent_on_join: bool,
    pub baseline: Option<LayoutBaseline>,
    pub binding: Option<PaneBinding>,
    /// Inline badge text; cleared by the next successful join
    pub error: Option<String>,
    pub spinner_frame: usize,
}

impl ViewInstance {
    pub fn new(task_id: Uuid, focus_agent_on_join: bool) -> Self {
        Self {
            task_id,
            phase: ViewPhase::Detached,
            loading: false,
            focused: true,
            focus_agent_on_join,
            baseline: None,
            binding: None,
            error: None,
            spinner_frame: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == ViewPhase::Failed
    }

    /// Whether an opportunistic join may be attempted
    pub fn can_join(&self) -> bool {
        self.phase == ViewPhase::Detached && !self.loading && self.binding.is_none()
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.phase = ViewPhase::Failed;
        self.loading = false;
        self.error = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names_are_deterministic() {
        let task = Task::new("Fix login", PathBuf::from("/tmp"));
        assert_eq!(task.canonical_window_name(), task.canonical_window_name());
        assert!(task.canonical_window_name().starts_with("task-"));
        assert_ne!(task.canonical_window_name(), task.hidden_shell_window_name());
        assert!(task
            .hidden_shell_window_name()
            .starts_with(&task.canonical_window_name()));
    }

    #[test]
    fn test_auto_start_gating() {
        assert!(!TaskStatus::Backlog.allows_auto_start());
        assert!(!TaskStatus::Done.allows_auto_start());
        assert!(!TaskStatus::Archived.allows_auto_start());
        assert!(TaskStatus::Queued.allows_auto_start());
        assert!(TaskStatus::Processing.allows_auto_start());
        assert!(TaskStatus::Blocked.allows_auto_start());
    }

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!("Codex".parse::<AgentKind>(), Ok(AgentKind::Codex));
        assert!("vim".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_failed_view_never_joins() {
        let mut view = ViewInstance::new(Uuid::new_v4(), false);
        assert!(view.can_join());
        view.mark_failed("window vanished");
        assert!(view.is_failed());
        assert!(!view.can_join());
        assert_eq!(view.error.as_deref(), Some("window vanished"));
    }

    #[test]
    fn test_task_round_trips_through_json_with_defaults() {
        let json = r#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "title": "Old task",
            "workspace": "/work",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.agent, AgentKind::Claude);
        assert!(task.window_id.is_none());
        assert!(task.logs.is_empty());
    }
}
