//! In-memory multiplexer for tests

use super::{
    CreatedWindow, Dimension, MuxError, MuxResult, Multiplexer, NewWindow, PaneInfo,
    SplitDirection, SplitRequest, WindowInfo,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

pub const WINDOW_WIDTH: u16 = 200;
pub const WINDOW_HEIGHT: u16 = 50;

#[derive(Debug, Clone)]
pub struct FakePane {
    pub id: String,
    pub title: String,
    pub width: u16,
    pub height: u16,
    pub alive: bool,
    pub command: Option<String>,
    pub env: Vec<(String, String)>,
    pub memory_kb: Option<u64>,
    pub sent: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub id: String,
    pub name: String,
    pub panes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub name: String,
    pub windows: Vec<FakeWindow>,
    pub options: BTreeMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<FakeSession>,
    panes: HashMap<String, FakePane>,
    next_window: u32,
    next_pane: u32,
    killed: Vec<String>,
    bindings: BTreeMap<String, String>,
    active: HashMap<String, String>,
    fail_next: HashMap<&'static str, u32>,
}

fn missing(op: &'static str, what: &str) -> MuxError {
    MuxError::Command {
        op,
        stderr: format!("can't find {}", what),
    }
}

impl FakeState {
    fn new_pane(&mut self, command: Option<String>) -> String {
        let id = format!("%{}", self.next_pane);
        self.next_pane += 1;
        self.panes.insert(
            id.clone(),
            FakePane {
                id: id.clone(),
                title: String::new(),
                width: WINDOW_WIDTH,
                height: WINDOW_HEIGHT,
                alive: true,
                command,
                env: Vec::new(),
                memory_kb: None,
                sent: Vec::new(),
            },
        );
        id
    }

    fn new_window_id(&mut self) -> String {
        let id = format!("@{}", self.next_window);
        self.next_window += 1;
        id
    }

    fn session_mut(&mut self, name: &str) -> Option<&mut FakeSession> {
        self.sessions.iter_mut().find(|s| s.name == name)
    }

    /// (session index, window index) of the window holding `pane_id`
    fn locate_pane(&self, pane_id: &str) -> Option<(usize, usize)> {
        for (si, session) in self.sessions.iter().enumerate() {
            for (wi, window) in session.windows.iter().enumerate() {
                if window.panes.iter().any(|p| p == pane_id) {
                    return Some((si, wi));
                }
            }
        }
        None
    }

    fn locate_window(&self, window_id: &str) -> Option<(usize, usize)> {
        for (si, session) in self.sessions.iter().enumerate() {
            if let Some(wi) = session.windows.iter().position(|w| w.id == window_id) {
                return Some((si, wi));
            }
        }
        None
    }

    /// Resolve a pane or window id to its window
    fn locate_target(&self, target: &str) -> Option<(usize, usize)> {
        if target.starts_with('%') {
            self.locate_pane(target)
        } else {
            self.locate_window(target)
        }
    }

    /// Take a pane out of its window, closing empty windows and sessions the way tmux does
    fn detach_pane(&mut self, pane_id: &str) {
        let Some((si, wi)) = self.locate_pane(pane_id) else {
            return;
        };
        self.sessions[si].windows[wi].panes.retain(|p| p != pane_id);
        if self.sessions[si].windows[wi].panes.is_empty() {
            self.sessions[si].windows.remove(wi);
        }
        if self.sessions[si].windows.is_empty() {
            let name = self.sessions.remove(si).name;
            self.active.remove(&name);
        }
    }

    /// Insert `pane_id` after `target` and split the target's space
    fn place_next_to(
        &mut self,
        pane_id: &str,
        target: &str,
        direction: SplitDirection,
        size_percent: Option<u8>,
    ) -> MuxResult<()> {
        let (si, wi) = self.locate_pane(target).ok_or_else(|| missing("join-pane", target))?;
        let window = &mut self.sessions[si].windows[wi];
        let pos = window.panes.iter().position(|p| p == target).unwrap_or(0);
        window.panes.insert(pos + 1, pane_id.to_string());

        let (tw, th) = {
            let t = &self.panes[target];
            (t.width, t.height)
        };
        let percent = size_percent.unwrap_or(50) as u32;
        match direction {
            SplitDirection::Vertical => {
                let new_h = (th as u32 * percent / 100) as u16;
                if let Some(p) = self.panes.get_mut(pane_id) {
                    p.height = new_h;
                    p.width = tw;
                }
                if let Some(t) = self.panes.get_mut(target) {
                    t.height = th.saturating_sub(new_h + 1);
                }
            }
            SplitDirection::Horizontal => {
                let new_w = (tw as u32 * percent / 100) as u16;
                if let Some(p) = self.panes.get_mut(pane_id) {
                    p.width = new_w;
                    p.height = th;
                }
                if let Some(t) = self.panes.get_mut(target) {
                    t.width = tw.saturating_sub(new_w + 1);
                }
            }
        }
        Ok(())
    }

    fn check_failure(&mut self, op: &'static str) -> MuxResult<()> {
        if let Some(count) = self.fail_next.get_mut(op) {
            if *count > 0 {
                *count -= 1;
                return Err(MuxError::Command {
                    op,
                    stderr: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn window_info(&self, si: usize, wi: usize) -> WindowInfo {
        let session = &self.sessions[si];
        WindowInfo {
            session: session.name.clone(),
            window_id: session.windows[wi].id.clone(),
            name: session.windows[wi].name.clone(),
        }
    }
}

/// Multiplexer double with tmux-like semantics: windows close when their last
/// pane leaves, sessions close with their last window.
#[derive(Default)]
pub struct FakeMux {
    state: Mutex<FakeState>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with one window; returns (window id, pane id)
    pub fn add_session(&self, name: &str, window_name: &str) -> (String, String) {
        let mut state = self.state.lock();
        let pane = state.new_pane(None);
        let window = state.new_window_id();
        state.sessions.push(FakeSession {
            name: name.to_string(),
            windows: vec![FakeWindow {
                id: window.clone(),
                name: window_name.to_string(),
                panes: vec![pane.clone()],
            }],
            options: BTreeMap::new(),
        });
        (window, pane)
    }

    /// Add a window to an existing session; returns (window id, pane id)
    pub fn add_window(&self, session: &str, window_name: &str) -> (String, String) {
        let mut state = self.state.lock();
        let pane = state.new_pane(None);
        let window = state.new_window_id();
        if let Some(s) = state.session_mut(session) {
            s.windows.push(FakeWindow {
                id: window.clone(),
                name: window_name.to_string(),
                panes: vec![pane.clone()],
            });
        }
        (window, pane)
    }

    /// Split an extra pane into an existing window
    pub fn add_pane(&self, window_id: &str) -> String {
        let mut state = self.state.lock();
        let pane = state.new_pane(None);
        if let Some((si, wi)) = state.locate_window(window_id) {
            state.sessions[si].windows[wi].panes.push(pane.clone());
        }
        pane
    }

    pub fn pane(&self, pane_id: &str) -> Option<FakePane> {
        self.state.lock().panes.get(pane_id).cloned()
    }

    /// (session, window id) currently holding the pane
    pub fn window_of(&self, pane_id: &str) -> Option<(String, String)> {
        let state = self.state.lock();
        state.locate_pane(pane_id).map(|(si, wi)| {
            (
                state.sessions[si].name.clone(),
                state.sessions[si].windows[wi].id.clone(),
            )
        })
    }

    pub fn panes_in_window(&self, window_id: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .locate_window(window_id)
            .map(|(si, wi)| state.sessions[si].windows[wi].panes.clone())
            .unwrap_or_default()
    }

    pub fn windows(&self, session: &str) -> Vec<FakeWindow> {
        let state = self.state.lock();
        state
            .sessions
            .iter()
            .find(|s| s.name == session)
            .map(|s| s.windows.clone())
            .unwrap_or_default()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.state.lock().sessions.iter().map(|s| s.name.clone()).collect()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().killed.clone()
    }

    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.state.lock().bindings.clone()
    }

    pub fn option(&self, session: &str, option: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .sessions
            .iter()
            .find(|s| s.name == session)
            .and_then(|s| s.options.get(option).cloned())
    }

    pub fn rename_window(&self, window_id: &str, name: &str) {
        let mut state = self.state.lock();
        if let Some((si, wi)) = state.locate_window(window_id) {
            state.sessions[si].windows[wi].name = name.to_string();
        }
    }

    /// Drop a session without recording kills, as an external `kill-session` would look
    pub fn remove_session(&self, name: &str) {
        let mut state = self.state.lock();
        let Some(pos) = state.sessions.iter().position(|s| s.name == name) else {
            return;
        };
        let session = state.sessions.remove(pos);
        for window in session.windows {
            for pane in window.panes {
                state.panes.remove(&pane);
            }
        }
    }

    pub fn set_pane_width(&self, pane_id: &str, width: u16) {
        if let Some(p) = self.state.lock().panes.get_mut(pane_id) {
            p.width = width;
        }
    }

    pub fn set_pane_height(&self, pane_id: &str, height: u16) {
        if let Some(p) = self.state.lock().panes.get_mut(pane_id) {
            p.height = height;
        }
    }

    pub fn mark_dead(&self, pane_id: &str) {
        if let Some(p) = self.state.lock().panes.get_mut(pane_id) {
            p.alive = false;
        }
    }

    pub fn set_memory_kb(&self, pane_id: &str, kb: u64) {
        if let Some(p) = self.state.lock().panes.get_mut(pane_id) {
            p.memory_kb = Some(kb);
        }
    }

    pub fn set_active(&self, session: &str, pane_id: &str) {
        self.state
            .lock()
            .active
            .insert(session.to_string(), pane_id.to_string());
    }

    /// Make the next `times` calls of `op` fail
    pub fn fail_next(&self, op: &'static str, times: u32) {
        self.state.lock().fail_next.insert(op, times);
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    async fn list_sessions(&self) -> MuxResult<Vec<String>> {
        Ok(self.session_names())
    }

    async fn new_session(&self, name: &str, window_name: &str, command: &str) -> MuxResult<()> {
        let mut state = self.state.lock();
        state.check_failure("new-session")?;
        if state.sessions.iter().any(|s| s.name == name) {
            return Err(MuxError::Command {
                op: "new-session",
                stderr: format!("duplicate session: {}", name),
            });
        }
        let pane = state.new_pane(Some(command.to_string()));
        let window = state.new_window_id();
        state.sessions.push(FakeSession {
            name: name.to_string(),
            windows: vec![FakeWindow {
                id: window,
                name: window_name.to_string(),
                panes: vec![pane],
            }],
            options: BTreeMap::new(),
        });
        Ok(())
    }

    async fn list_windows(&self, session_prefix: &str) -> MuxResult<Vec<WindowInfo>> {
        let mut state = self.state.lock();
        state.check_failure("list-windows")?;
        let mut out = Vec::new();
        for (si, session) in state.sessions.iter().enumerate() {
            if !session.name.starts_with(session_prefix) {
                continue;
            }
            for wi in 0..session.windows.len() {
                out.push(state.window_info(si, wi));
            }
        }
        Ok(out)
    }

    async fn find_window(&self, window_id: &str) -> MuxResult<Option<WindowInfo>> {
        let state = self.state.lock();
        Ok(state
            .locate_window(window_id)
            .map(|(si, wi)| state.window_info(si, wi)))
    }

    async fn create_window(&self, spec: NewWindow) -> MuxResult<CreatedWindow> {
        let mut state = self.state.lock();
        state.check_failure("new-window")?;
        if !state.sessions.iter().any(|s| s.name == spec.session) {
            return Err(missing("new-window", &format!("session: {}", spec.session)));
        }
        let pane = state.new_pane(spec.command.clone());
        let window = state.new_window_id();
        if let Some(s) = state.session_mut(&spec.session) {
            s.windows.push(FakeWindow {
                id: window.clone(),
                name: spec.name.clone(),
                panes: vec![pane.clone()],
            });
        }
        Ok(CreatedWindow {
            window: WindowInfo {
                session: spec.session,
                window_id: window,
                name: spec.name,
            },
            pane_id: pane,
        })
    }

    async fn list_panes(&self, target: &str) -> MuxResult<Vec<PaneInfo>> {
        let mut state = self.state.lock();
        state.check_failure("list-panes")?;
        let (si, wi) = state
            .locate_target(target)
            .ok_or_else(|| missing("list-panes", target))?;
        Ok(state.sessions[si].windows[wi]
            .panes
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                state.panes.get(id).map(|p| PaneInfo {
                    id: p.id.clone(),
                    index: index as u32,
                    width: p.width,
                    height: p.height,
                    dead: !p.alive,
                    title: p.title.clone(),
                })
            })
            .collect())
    }

    async fn split_pane(&self, request: SplitRequest) -> MuxResult<String> {
        let mut state = self.state.lock();
        state.check_failure("split-window")?;
        if state.locate_pane(&request.target).is_none() {
            return Err(missing("split-window", &request.target));
        }
        let pane = state.new_pane(request.command.clone());
        if let Some(p) = state.panes.get_mut(&pane) {
            p.env = request.env.clone();
        }
        state.place_next_to(&pane, &request.target, request.direction, request.size_percent)?;
        Ok(pane)
    }

    async fn join_pane(
        &self,
        source: &str,
        target: &str,
        direction: SplitDirection,
        size_percent: Option<u8>,
    ) -> MuxResult<()> {
        let mut state = self.state.lock();
        state.check_failure("join-pane")?;
        if state.locate_pane(source).is_none() {
            return Err(missing("join-pane", source));
        }
        if state.locate_pane(target).is_none() {
            return Err(missing("join-pane", target));
        }
        state.detach_pane(source);
        state.place_next_to(source, target, direction, size_percent)
    }

    async fn break_pane(
        &self,
        source: &str,
        session: &str,
        window_name: &str,
    ) -> MuxResult<WindowInfo> {
        let mut state = self.state.lock();
        state.check_failure("break-pane")?;
        if state.locate_pane(source).is_none() {
            return Err(missing("break-pane", source));
        }
        if !state.sessions.iter().any(|s| s.name == session) {
            return Err(missing("break-pane", &format!("session: {}", session)));
        }
        state.detach_pane(source);
        // The target session may have closed if `source` was its last pane
        if !state.sessions.iter().any(|s| s.name == session) {
            state.sessions.push(FakeSession {
                name: session.to_string(),
                ..FakeSession::default()
            });
        }
        let window = state.new_window_id();
        if let Some(p) = state.panes.get_mut(source) {
            p.width = WINDOW_WIDTH;
            p.height = WINDOW_HEIGHT;
        }
        if let Some(s) = state.session_mut(session) {
            s.windows.push(FakeWindow {
                id: window.clone(),
                name: window_name.to_string(),
                panes: vec![source.to_string()],
            });
        }
        Ok(WindowInfo {
            session: session.to_string(),
            window_id: window,
            name: window_name.to_string(),
        })
    }

    async fn kill_pane(&self, pane_id: &str) -> MuxResult<()> {
        let mut state = self.state.lock();
        state.check_failure("kill-pane")?;
        if state.locate_pane(pane_id).is_none() {
            return Err(missing("kill-pane", pane_id));
        }
        state.killed.push(pane_id.to_string());
        state.detach_pane(pane_id);
        state.panes.remove(pane_id);
        Ok(())
    }

    async fn resize_pane(
        &self,
        pane_id: &str,
        dimension: Dimension,
        percent: u8,
    ) -> MuxResult<()> {
        let mut state = self.state.lock();
        state.check_failure("resize-pane")?;
        let (si, wi) = state
            .locate_pane(pane_id)
            .ok_or_else(|| missing("resize-pane", pane_id))?;
        let others: Vec<String> = state.sessions[si].windows[wi]
            .panes
            .iter()
            .filter(|p| p.as_str() != pane_id)
            .cloned()
            .collect();
        let percent = percent.min(100) as u32;
        match dimension {
            Dimension::Height => {
                let height = if others.is_empty() {
                    WINDOW_HEIGHT
                } else {
                    (WINDOW_HEIGHT as u32 * percent / 100) as u16
                };
                if let Some(p) = state.panes.get_mut(pane_id) {
                    p.height = height;
                }
                // Everything else sits in the region below the resized pane
                for other in others {
                    if let Some(p) = state.panes.get_mut(&other) {
                        p.height = WINDOW_HEIGHT.saturating_sub(height + 1);
                    }
                }
            }
            Dimension::Width => {
                let width = (WINDOW_WIDTH as u32 * percent / 100) as u16;
                if let Some(p) = state.panes.get_mut(pane_id) {
                    p.width = width;
                }
            }
        }
        Ok(())
    }

    async fn query_pane(&self, target: &str, field: &str) -> MuxResult<String> {
        let mut state = self.state.lock();
        state.check_failure("display-message")?;
        let (si, wi) = state
            .locate_target(target)
            .ok_or_else(|| missing("display-message", target))?;
        let pane_id = if target.starts_with('%') {
            target.to_string()
        } else {
            state.sessions[si].windows[wi].panes[0].clone()
        };
        let pane = state
            .panes
            .get(&pane_id)
            .ok_or_else(|| missing("display-message", &pane_id))?;
        let value = match field {
            "pane_id" => pane.id.clone(),
            "pane_pid" => "4242".to_string(),
            "pane_dead" => if pane.alive { "0" } else { "1" }.to_string(),
            "pane_width" => pane.width.to_string(),
            "pane_height" => pane.height.to_string(),
            "pane_title" => pane.title.clone(),
            "window_width" => WINDOW_WIDTH.to_string(),
            "window_height" => WINDOW_HEIGHT.to_string(),
            "window_id" => state.sessions[si].windows[wi].id.clone(),
            "window_name" => state.sessions[si].windows[wi].name.clone(),
            "session_name" => state.sessions[si].name.clone(),
            _ => String::new(),
        };
        Ok(value)
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> MuxResult<()> {
        let mut state = self.state.lock();
        let pane = state
            .panes
            .get_mut(pane_id)
            .ok_or_else(|| missing("select-pane", pane_id))?;
        pane.title = title.to_string();
        Ok(())
    }

    async fn select_pane(&self, pane_id: &str) -> MuxResult<()> {
        let mut state = self.state.lock();
        let (si, _) = state
            .locate_pane(pane_id)
            .ok_or_else(|| missing("select-pane", pane_id))?;
        let session = state.sessions[si].name.clone();
        state.active.insert(session, pane_id.to_string());
        Ok(())
    }

    async fn bind_key(&self, _session: &str, key: &str, action: &str) -> MuxResult<()> {
        self.state
            .lock()
            .bindings
            .insert(key.to_string(), action.to_string());
        Ok(())
    }

    async fn unbind_key(&self, key: &str) -> MuxResult<()> {
        self.state.lock().bindings.remove(key);
        Ok(())
    }

    async fn send_keys(&self, pane_id: &str, keys: &[&str]) -> MuxResult<()> {
        let mut state = self.state.lock();
        let pane = state
            .panes
            .get_mut(pane_id)
            .ok_or_else(|| missing("send-keys", pane_id))?;
        pane.sent.push(keys.join(" "));
        Ok(())
    }

    async fn set_session_option(
        &self,
        session: &str,
        option: &str,
        value: &str,
    ) -> MuxResult<()> {
        let mut state = self.state.lock();
        let s = state
            .session_mut(session)
            .ok_or_else(|| missing("set-option", session))?;
        s.options.insert(option.to_string(), value.to_string());
        Ok(())
    }

    async fn unset_session_option(&self, session: &str, option: &str) -> MuxResult<()> {
        let mut state = self.state.lock();
        if let Some(s) = state.session_mut(session) {
            s.options.remove(option);
        }
        Ok(())
    }

    async fn active_pane(&self, session: &str) -> MuxResult<String> {
        let mut state = self.state.lock();
        state.check_failure("active-pane")?;
        if let Some(pane) = state.active.get(session) {
            if state.panes.contains_key(pane) {
                return Ok(pane.clone());
            }
        }
        state
            .sessions
            .iter()
            .find(|s| s.name == session)
            .and_then(|s| s.windows.first())
            .and_then(|w| w.panes.first())
            .cloned()
            .ok_or_else(|| missing("display-message", session))
    }

    async fn pane_memory_kb(&self, pane_id: &str) -> Option<u64> {
        self.state.lock().panes.get(pane_id).and_then(|p| p.memory_kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_closes_with_last_pane() {
        let mux = FakeMux::new();
        mux.add_session("ui", "dash");
        let (_, control) = mux.add_session("ui2", "dash");
        mux.add_session("daemon", "_placeholder");
        let (window, pane) = mux.add_window("daemon", "task-1");

        mux.join_pane(&pane, &control, SplitDirection::Vertical, Some(80))
            .await
            .unwrap();

        assert!(mux.find_window(&window).await.unwrap().is_none());
        assert_eq!(mux.window_of(&pane).unwrap().0, "ui2");
        assert_eq!(mux.pane(&pane).unwrap().height, 40);
        assert_eq!(mux.pane(&control).unwrap().height, 9);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let mux = FakeMux::new();
        let (_, pane) = mux.add_session("ui", "dash");
        mux.fail_next("kill-pane", 1);
        assert!(mux.kill_pane(&pane).await.is_err());
        assert!(mux.kill_pane(&pane).await.is_ok());
        assert_eq!(mux.killed(), vec![pane]);
    }
}
