//! Session/pane reconciliation engine
//!
//! Keeps each task's agent window in a background daemon session and moves
//! its panes into the dashboard's tmux session while the task is open:
//!
//! - [`locator`] resolves a task to a live window (stored id first, then name)
//! - [`starter`] finds or creates the daemon session and launches the agent
//! - [`reconciler`] joins panes into the foreground and breaks them back out
//! - [`shell`] hides and shows the companion shell pane
//! - [`worker`] runs all pane mutations serially, one completion message per job
//!
//! Running processes are never killed as a side effect: panes that cannot be
//! put back where they belong are left where they are.

mod bindings;
pub mod layout;
mod locator;
mod reconciler;
pub mod request;
mod shell;
mod starter;
pub mod worker;

pub use layout::LayoutPrefs;
pub use reconciler::{BreakOptions, BreakReport, JoinOutcome};
pub use request::{RequestTracker, Ticket};
pub use worker::{AttachError, PaneJob, PaneQueue};

use crate::config::Config;
use crate::model::{LogKind, Task};
use crate::store::{self, StoreError, TaskStore};
use crate::tmux::{MuxError, Multiplexer};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Name of the window that keeps a fresh daemon session alive
pub const PLACEHOLDER_WINDOW: &str = "_placeholder";
/// Title of the companion shell pane
pub const SHELL_TITLE: &str = "Shell";

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("window {0} vanished")]
    WindowVanished(String),
    #[error("no agent pane in window {0}")]
    NoAgentPane(String),
    #[error("agent exited before its window was ready")]
    AgentExited,
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// The dashboard's own place in tmux
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiTarget {
    /// Foreground session the user is looking at
    pub session: String,
    /// Pane running the dashboard itself
    pub control_pane: String,
}

/// Shared handles for every pane operation; cheap to clone into background units
#[derive(Clone)]
pub struct PaneEngine {
    pub mux: Arc<dyn Multiplexer>,
    pub store: Arc<dyn TaskStore>,
    pub config: Arc<Config>,
    pub ui: UiTarget,
}

impl PaneEngine {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        store: Arc<dyn TaskStore>,
        config: Arc<Config>,
        ui: UiTarget,
    ) -> Self {
        Self {
            mux,
            store,
            config,
            ui,
        }
    }

    /// Current copy of a task from the store
    pub fn load_task(&self, id: Uuid) -> Result<Task> {
        self.store
            .get_task(id)?
            .ok_or(ReconcileError::TaskNotFound(id))
    }

    pub fn prefs(&self) -> LayoutPrefs {
        LayoutPrefs::load(self.store.as_ref(), &self.config.layout)
    }

    fn audit(&self, id: Uuid, kind: LogKind, text: &str) {
        store::audit(self.store.as_ref(), id, kind, text);
    }

    /// Environment exported into fresh shell panes
    fn task_env(&self, task: &Task) -> Vec<(String, String)> {
        vec![
            ("KANMUX_TASK_ID".to_string(), task.id.to_string()),
            ("KANMUX_TASK_TITLE".to_string(), task.title.clone()),
            (
                "KANMUX_WORKSPACE".to_string(),
                task.workspace.to_string_lossy().to_string(),
            ),
        ]
    }

    /// Parse a numeric format variable, `None` if the target is gone
    async fn query_u32(&self, target: &str, field: &str) -> Option<u32> {
        self.mux
            .query_pane(target, field)
            .await
            .ok()
            .and_then(|v| v.trim().parse().ok())
    }

    /// Whether a pane still answers a live query
    pub async fn pane_alive(&self, pane_id: &str) -> bool {
        matches!(self.mux.query_pane(pane_id, "pane_id").await, Ok(ref id) if id == pane_id)
    }

    /// Whether a pane exists and its process has not exited
    pub async fn process_running(&self, pane_id: &str) -> bool {
        matches!(self.mux.query_pane(pane_id, "pane_dead").await, Ok(ref dead) if dead.trim() == "0")
    }
}
