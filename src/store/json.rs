use super::{StoreError, StoreResult, TaskStore};
use crate::model::{LogKind, Task, TaskLog, TaskStatus, WindowRef};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Audit entries kept per task; older ones are dropped first
const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    settings: BTreeMap<String, String>,
}

/// Task store persisted as a single JSON file, rewritten on every mutation
pub struct JsonStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl JsonStore {
    /// Default location: `<data_local_dir>/kanmux/state.json`
    pub fn default_path() -> PathBuf {
        crate::data_dir().join("state.json")
    }

    /// Open (or create on first write) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            StoreState::default()
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn save(&self, state: &StoreState) -> StoreResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn mutate_task(&self, id: Uuid, f: impl FnOnce(&mut Task)) -> StoreResult<()> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::TaskNotFound(id))?;
        f(task);
        self.save(&state)
    }
}

impl TaskStore for JsonStore {
    fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.state.lock().tasks.iter().find(|t| t.id == id).cloned())
    }

    fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.state.lock().tasks.clone())
    }

    fn add_task(&self, task: Task) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.tasks.push(task);
        self.save(&state)
    }

    fn update_task_window_id(&self, id: Uuid, window: &WindowRef) -> StoreResult<()> {
        self.mutate_task(id, |task| {
            task.daemon_session = Some(window.session.clone());
            task.window_id = Some(window.window_id.clone());
        })
    }

    fn update_task_pane_ids(
        &self,
        id: Uuid,
        agent_pane: Option<&str>,
        shell_pane: Option<&str>,
    ) -> StoreResult<()> {
        self.mutate_task(id, |task| {
            task.agent_pane_id = agent_pane.map(str::to_string);
            task.shell_pane_id = shell_pane.map(str::to_string);
        })
    }

    fn update_task_status(&self, id: Uuid, status: TaskStatus) -> StoreResult<()> {
        self.mutate_task(id, |task| task.status = status)
    }

    fn append_task_log(&self, id: Uuid, kind: LogKind, text: &str) -> StoreResult<()> {
        self.mutate_task(id, |task| {
            task.logs.push(TaskLog {
                at: Utc::now(),
                kind,
                text: text.to_string(),
            });
            if task.logs.len() > MAX_LOG_ENTRIES {
                let excess = task.logs.len() - MAX_LOG_ENTRIES;
                task.logs.drain(..excess);
            }
        })
    }

    fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.state.lock().settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.settings.insert(key.to_string(), value.to_string());
        self.save(&state)
    }
}
