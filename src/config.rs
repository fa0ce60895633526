//! Dashboard configuration loaded from `<config_dir>/kanmux/config.json`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon sessions are any session whose name starts with this prefix
    pub daemon_session_prefix: String,
    /// Foreground session hosting the dashboard; detected from `$TMUX` when unset
    pub ui_session: Option<String>,
    pub tmux_binary: String,
    pub timeouts: Timeouts,
    pub intervals: Intervals,
    pub layout: LayoutDefaults,
    /// Shell launched in fresh companion panes
    pub shell: String,
    /// Long-lived process keeping an otherwise empty daemon session alive
    pub placeholder_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_session_prefix: "kanmux-daemon".to_string(),
            ui_session: None,
            tmux_binary: "tmux".to_string(),
            timeouts: Timeouts::default(),
            intervals: Intervals::default(),
            layout: LayoutDefaults::default(),
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            placeholder_command: "tail -f /dev/null".to_string(),
        }
    }
}

/// Per-call limits for tmux subprocesses (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub query_ms: u64,
    /// Hot path: focus polling runs several times a second
    pub focus_ms: u64,
    /// Session and window creation
    pub create_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            query_ms: 2500,
            focus_ms: 200,
            create_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn query(&self) -> Duration {
        Duration::from_millis(self.query_ms)
    }

    pub fn focus(&self) -> Duration {
        Duration::from_millis(self.focus_ms)
    }

    pub fn create(&self) -> Duration {
        Duration::from_millis(self.create_ms)
    }
}

/// Timer periods for the event loop (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervals {
    pub spinner_ms: u64,
    pub focus_ms: u64,
    pub reconcile_ms: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            spinner_ms: 100,
            focus_ms: 300,
            reconcile_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutDefaults {
    /// Dashboard pane height while a task is joined
    pub default_height_percent: u8,
    /// Shell pane share of the agent row
    pub default_shell_width_percent: u8,
    /// Differences up to this many points are not treated as a manual resize
    pub drift_tolerance_percent: u8,
}

impl Default for LayoutDefaults {
    fn default() -> Self {
        Self {
            default_height_percent: 20,
            default_shell_width_percent: 50,
            drift_tolerance_percent: 2,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kanmux")
            .join("config.json")
    }

    /// Load the config file, falling back to defaults when it is missing or invalid
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str::<Config>(&content).map_err(Into::into))
        {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }
}
