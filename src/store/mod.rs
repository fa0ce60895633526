//! Persistent task store consumed by the pane engine

mod json;

pub use json::JsonStore;

use crate::model::{LogKind, Task, TaskStatus, WindowRef};
use thiserror::Error;
use uuid::Uuid;

/// Settings key: dashboard pane height percentage while joined
pub const SETTING_DETAIL_HEIGHT: &str = "detail_pane_height";
/// Settings key: shell pane width percentage of the agent row
pub const SETTING_SHELL_WIDTH: &str = "shell_pane_width";
/// Settings key: whether the shell pane is hidden ("true"/"false")
pub const SETTING_SHELL_HIDDEN: &str = "shell_pane_hidden";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid state file: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Task persistence. Shared between the UI loop and background units.
pub trait TaskStore: Send + Sync {
    fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>>;

    fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    fn add_task(&self, task: Task) -> StoreResult<()>;

    /// Persist the canonical window (and the daemon session hosting it)
    fn update_task_window_id(&self, id: Uuid, window: &WindowRef) -> StoreResult<()>;

    fn update_task_pane_ids(
        &self,
        id: Uuid,
        agent_pane: Option<&str>,
        shell_pane: Option<&str>,
    ) -> StoreResult<()>;

    fn update_task_status(&self, id: Uuid, status: TaskStatus) -> StoreResult<()>;

    fn append_task_log(&self, id: Uuid, kind: LogKind, text: &str) -> StoreResult<()>;

    fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;

    fn set_setting(&self, key: &str, value: &str) -> StoreResult<()>;
}

/// Append to a task's audit log, logging instead of failing when the store is unavailable
pub fn audit(store: &dyn TaskStore, id: Uuid, kind: LogKind, text: &str) {
    if let Err(e) = store.append_task_log(id, kind, text) {
        tracing::warn!(task_id = %id, error = %e, "failed to append task log");
    }
}
