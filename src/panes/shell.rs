use super::layout::{shell_width_percent, LayoutChanges, LayoutPrefs};
use super::{PaneEngine, Result};
use crate::model::{PaneBinding, Task};
use crate::tmux::SplitDirection;

impl PaneEngine {
    /// Park the shell pane in its own daemon window and remember it as hidden
    pub async fn hide_shell(&self, task: &Task, binding: &PaneBinding) -> Result<PaneBinding> {
        let Some(shell) = binding.shell_pane.as_deref().filter(|_| !binding.shell_hidden) else {
            LayoutPrefs::save_shell_hidden(self.store.as_ref(), true);
            return Ok(PaneBinding {
                shell_hidden: true,
                ..binding.clone()
            });
        };

        if let (Some(s), Some(a)) = (
            self.query_u32(shell, "pane_width").await,
            self.query_u32(&binding.agent_pane, "pane_width").await,
        ) {
            let width = shell_width_percent(s, a);
            if width != self.prefs().shell_width_percent {
                LayoutPrefs::save(
                    self.store.as_ref(),
                    LayoutChanges {
                        height_percent: None,
                        shell_width_percent: Some(width),
                    },
                );
            }
        }

        self.break_into_daemon(shell, &task.hidden_shell_window_name())
            .await?;
        LayoutPrefs::save_shell_hidden(self.store.as_ref(), true);
        tracing::info!(task_id = %task.id, shell_pane = %shell, "hid shell pane");

        Ok(PaneBinding {
            shell_hidden: true,
            ..binding.clone()
        })
    }

    /// Bring the hidden shell back next to the agent, creating one if it is gone
    pub async fn show_shell(&self, task: &Task, binding: &PaneBinding) -> Result<PaneBinding> {
        LayoutPrefs::save_shell_hidden(self.store.as_ref(), false);
        let width = self.prefs().shell_width_percent;

        let rejoined = match binding.shell_pane.as_deref() {
            Some(shell) if self.pane_alive(shell).await => {
                match self
                    .mux
                    .join_pane(shell, &binding.agent_pane, SplitDirection::Horizontal, Some(width))
                    .await
                {
                    Ok(()) => Some(shell.to_string()),
                    Err(e) => {
                        tracing::warn!(task_id = %task.id, error = %e, "failed to rejoin hidden shell");
                        None
                    }
                }
            }
            _ => None,
        };
        let shell = match rejoined {
            Some(shell) => shell,
            None => self.spawn_shell(task, &binding.agent_pane, width).await?,
        };

        if let Err(e) = self
            .store
            .update_task_pane_ids(task.id, Some(&binding.agent_pane), Some(&shell))
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist pane ids");
        }
        tracing::info!(task_id = %task.id, shell_pane = %shell, "showed shell pane");

        Ok(PaneBinding {
            shell_pane: Some(shell),
            shell_hidden: false,
            ..binding.clone()
        })
    }
}
