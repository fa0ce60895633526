//! Session-scoped key bindings and border styling while a task is joined

use super::PaneEngine;

/// Cycle focus between the dashboard, agent and shell panes
const PANE_CYCLE_KEYS: [(&str, &str); 2] = [
    ("M-Tab", "select-pane -t :.+"),
    ("M-BTab", "select-pane -t :.-"),
];

/// Previous/next task; forwarded to the dashboard so they work from any pane
pub const TASK_JUMP_KEYS: [&str; 2] = ["M-k", "M-j"];

const BORDER_OPTIONS: [(&str, &str); 2] = [
    ("pane-border-status", "top"),
    ("pane-border-format", " #{pane_title} "),
];

impl PaneEngine {
    pub(super) async fn install_bindings(&self) {
        let session = &self.ui.session;
        for (key, action) in PANE_CYCLE_KEYS {
            if let Err(e) = self.mux.bind_key(session, key, action).await {
                tracing::warn!(key, error = %e, "failed to bind key");
            }
        }
        for key in TASK_JUMP_KEYS {
            let action = format!("send-keys -t {} {}", self.ui.control_pane, key);
            if let Err(e) = self.mux.bind_key(session, key, &action).await {
                tracing::warn!(key, error = %e, "failed to bind key");
            }
        }
        for (option, value) in BORDER_OPTIONS {
            if let Err(e) = self.mux.set_session_option(session, option, value).await {
                tracing::debug!(option, error = %e, "failed to style pane borders");
            }
        }
    }

    pub(super) async fn remove_bindings(&self) {
        let keys = PANE_CYCLE_KEYS
            .iter()
            .map(|(key, _)| *key)
            .chain(TASK_JUMP_KEYS);
        for key in keys {
            if let Err(e) = self.mux.unbind_key(key).await {
                tracing::debug!(key, error = %e, "failed to unbind key");
            }
        }
        for (option, _) in BORDER_OPTIONS {
            if let Err(e) = self.mux.unset_session_option(&self.ui.session, option).await {
                tracing::debug!(option, error = %e, "failed to reset pane borders");
            }
        }
    }
}
