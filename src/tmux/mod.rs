mod client;
#[cfg(test)]
pub mod fake;

pub use client::TmuxCli;

use crate::model::WindowRef;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("failed to run tmux {op}: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("tmux {op} failed: {stderr}")]
    Command { op: &'static str, stderr: String },
    #[error("tmux {op} timed out after {}ms", .after.as_millis())]
    Timeout { op: &'static str, after: Duration },
    #[error("unexpected tmux {op} output: {output:?}")]
    Parse { op: &'static str, output: String },
}

impl MuxError {
    /// The command ran but its target (session, window, pane) does not exist
    pub fn is_missing_target(&self) -> bool {
        match self {
            MuxError::Command { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                stderr.contains("can't find")
                    || stderr.contains("no such")
                    || stderr.contains("not found")
            }
            _ => false,
        }
    }
}

pub type MuxResult<T> = std::result::Result<T, MuxError>;

/// A window as reported by `list-windows`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub session: String,
    pub window_id: String,
    pub name: String,
}

impl WindowInfo {
    pub fn to_ref(&self) -> WindowRef {
        WindowRef {
            session: self.session.clone(),
            window_id: self.window_id.clone(),
        }
    }
}

/// A pane as reported by `list-panes`, in window order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub id: String,
    pub index: u32,
    pub width: u16,
    pub height: u16,
    /// The pane's process has exited (remain-on-exit)
    pub dead: bool,
    pub title: String,
}

/// Window created by `new-window`, with its first pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWindow {
    pub window: WindowInfo,
    pub pane_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// Stacked top/bottom (`-v`)
    Vertical,
    /// Side by side (`-h`)
    Horizontal,
}

impl SplitDirection {
    fn flag(&self) -> &'static str {
        match self {
            SplitDirection::Vertical => "-v",
            SplitDirection::Horizontal => "-h",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Height,
    Width,
}

#[derive(Debug, Clone, Default)]
pub struct NewWindow {
    pub session: String,
    pub name: String,
    pub cwd: Option<PathBuf>,
    pub command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub target: String,
    pub direction: SplitDirection,
    /// Size of the new pane as a percentage of the target
    pub size_percent: Option<u8>,
    pub cwd: Option<PathBuf>,
    pub command: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Control surface of the terminal multiplexer.
///
/// Every call is a subprocess with its own timeout, so implementations must
/// be driven from background units rather than the UI loop.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn list_sessions(&self) -> MuxResult<Vec<String>>;

    /// Create a detached session whose first window runs `command`
    async fn new_session(&self, name: &str, window_name: &str, command: &str) -> MuxResult<()>;

    /// Windows of every session whose name starts with `session_prefix`
    async fn list_windows(&self, session_prefix: &str) -> MuxResult<Vec<WindowInfo>>;

    /// Look a window up by id; `None` when it no longer exists
    async fn find_window(&self, window_id: &str) -> MuxResult<Option<WindowInfo>>;

    async fn create_window(&self, spec: NewWindow) -> MuxResult<CreatedWindow>;

    /// Panes of the window containing `target` (a pane or window id)
    async fn list_panes(&self, target: &str) -> MuxResult<Vec<PaneInfo>>;

    /// Returns the new pane id
    async fn split_pane(&self, request: SplitRequest) -> MuxResult<String>;

    /// Move `source` next to `target`; `size_percent` applies to the moved pane
    async fn join_pane(
        &self,
        source: &str,
        target: &str,
        direction: SplitDirection,
        size_percent: Option<u8>,
    ) -> MuxResult<()>;

    /// Detach `source` into a new window of `session`
    async fn break_pane(&self, source: &str, session: &str, window_name: &str)
        -> MuxResult<WindowInfo>;

    async fn kill_pane(&self, pane_id: &str) -> MuxResult<()>;

    async fn resize_pane(&self, pane_id: &str, dimension: Dimension, percent: u8)
        -> MuxResult<()>;

    /// Expand a single format variable (e.g. `pane_height`) against `target`
    async fn query_pane(&self, target: &str, field: &str) -> MuxResult<String>;

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> MuxResult<()>;

    async fn select_pane(&self, pane_id: &str) -> MuxResult<()>;

    /// Root-table binding that only fires while `session` is the client's session
    async fn bind_key(&self, session: &str, key: &str, action: &str) -> MuxResult<()>;

    async fn unbind_key(&self, key: &str) -> MuxResult<()>;

    async fn send_keys(&self, pane_id: &str, keys: &[&str]) -> MuxResult<()>;

    async fn set_session_option(&self, session: &str, option: &str, value: &str)
        -> MuxResult<()>;

    async fn unset_session_option(&self, session: &str, option: &str) -> MuxResult<()>;

    /// Pane holding input focus in `session`; uses the short focus timeout
    async fn active_pane(&self, session: &str) -> MuxResult<String>;

    /// Resident memory of the pane's process, when it can be inspected
    async fn pane_memory_kb(&self, _pane_id: &str) -> Option<u64> {
        None
    }
}

/// Parse `#{session_name}\t#{window_id}\t#{window_name}`
fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let mut parts = line.splitn(3, '\t');
    let session = parts.next()?.to_string();
    let window_id = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    if session.is_empty() || !window_id.starts_with('@') {
        return None;
    }
    Some(WindowInfo {
        session,
        window_id,
        name,
    })
}

/// Parse `#{pane_id}\t#{pane_index}\t#{pane_width}\t#{pane_height}\t#{pane_dead}\t#{pane_title}`
fn parse_pane_line(line: &str) -> Option<PaneInfo> {
    let parts: Vec<&str> = line.splitn(6, '\t').collect();
    if parts.len() < 5 || !parts[0].starts_with('%') {
        return None;
    }
    Some(PaneInfo {
        id: parts[0].to_string(),
        index: parts[1].parse().ok()?,
        width: parts[2].parse().ok()?,
        height: parts[3].parse().ok()?,
        dead: parts[4] == "1",
        title: parts.get(5).map(|s| s.to_string()).unwrap_or_default(),
    })
}
