use super::{PaneEngine, Result};
use crate::model::{Task, WindowRef};

impl PaneEngine {
    /// Find the live window hosting a task's agent.
    ///
    /// The stored window id wins when it still answers, even if the window
    /// was renamed since. Otherwise the canonical name is searched across
    /// daemon sessions and a hit is written back to the store.
    pub async fn resolve(&self, task: &Task) -> Result<Option<WindowRef>> {
        if let Some(ref window_id) = task.window_id {
            match self.mux.find_window(window_id).await {
                Ok(Some(window)) if window.session != self.ui.session => {
                    return Ok(Some(window.to_ref()));
                }
                Ok(_) => {
                    tracing::debug!(task_id = %task.id, window_id, "stored window id is stale");
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.id, window_id, error = %e, "window lookup failed, searching by name");
                }
            }
        }

        let name = task.canonical_window_name();
        let windows = self
            .mux
            .list_windows(&self.config.daemon_session_prefix)
            .await?;
        let Some(window) = windows.into_iter().find(|w| w.name == name) else {
            return Ok(None);
        };

        let window = window.to_ref();
        if task.window_id.as_deref() != Some(window.window_id.as_str()) {
            tracing::info!(task_id = %task.id, window = %window, "re-linked task to window by name");
            if let Err(e) = self.store.update_task_window_id(task.id, &window) {
                tracing::warn!(task_id = %task.id, error = %e, "failed to persist window id");
            }
        }
        Ok(Some(window))
    }
}
