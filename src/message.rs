use crate::model::PaneBinding;
use crate::panes::{AttachError, BreakReport, JoinOutcome};
use uuid::Uuid;

/// Messages that can be dispatched to update application state (TEA pattern)
#[derive(Debug, Clone)]
pub enum Message {
    // Board navigation
    SelectNext,
    SelectPrev,
    /// Open the selected task's detail view, optionally focusing its agent pane
    OpenSelected { focus_agent: bool },
    /// Open the task `delta` rows away and focus its agent pane
    JumpTask(i32),
    CloseDetail,
    /// Hide or show the companion shell pane
    ToggleShell,
    /// Reload tasks and reconcile the open view now
    Refresh,
    Quit,

    // Timers
    /// Spinner animation
    Tick,
    FocusTick,
    ReconcileTick,

    // Pane engine completions
    /// An agent session is being launched for the task
    LoadingStarted { task_id: Uuid, generation: u64 },
    JoinCompleted {
        task_id: Uuid,
        generation: u64,
        focus_agent: bool,
        result: Result<JoinOutcome, AttachError>,
    },
    DetachCompleted { task_id: Uuid, report: BreakReport },
    ShellToggled {
        task_id: Uuid,
        result: Result<PaneBinding, String>,
    },
    ProbeCompleted {
        task_id: Uuid,
        agent_pane: String,
        alive: bool,
    },
    /// Result of a periodic focus poll
    FocusPolled { active_pane: Option<String> },
    /// Focus was moved programmatically
    FocusChanged { active_pane: String },

    SetStatusMessage(Option<String>),
}
