use super::{
    parse_pane_line, parse_window_line, CreatedWindow, Dimension, MuxError, MuxResult,
    Multiplexer, NewWindow, PaneInfo, SplitDirection, SplitRequest, WindowInfo,
};
use crate::config::{Config, Timeouts};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const WINDOW_FORMAT: &str = "#{session_name}\t#{window_id}\t#{window_name}";
const PANE_FORMAT: &str =
    "#{pane_id}\t#{pane_index}\t#{pane_width}\t#{pane_height}\t#{pane_dead}\t#{pane_title}";

/// [`Multiplexer`] backed by the tmux CLI
pub struct TmuxCli {
    binary: String,
    timeouts: Timeouts,
}

impl TmuxCli {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.tmux_binary.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Run a tmux command, returning trimmed stdout
    async fn run(&self, op: &'static str, args: &[&str], limit: Duration) -> MuxResult<String> {
        tracing::debug!(op, ?args, "tmux");

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = timeout(limit, output)
            .await
            .map_err(|_| MuxError::Timeout { op, after: limit })?
            .map_err(|source| MuxError::Spawn { op, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(op, stderr = %stderr, "tmux command failed");
            return Err(MuxError::Command { op, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    async fn query(&self, op: &'static str, args: &[&str]) -> MuxResult<String> {
        self.run(op, args, self.timeouts.query()).await
    }

    /// Session of the client running this process, if inside tmux
    pub async fn current_session(&self) -> MuxResult<String> {
        self.query("display-message", &["display-message", "-p", "#{session_name}"])
            .await
            .map(|s| s.trim().to_string())
    }
}

fn size_arg(percent: u8) -> String {
    format!("{}%", percent.clamp(1, 99))
}

#[async_trait]
impl Multiplexer for TmuxCli {
    async fn list_sessions(&self) -> MuxResult<Vec<String>> {
        match self
            .query("list-sessions", &["list-sessions", "-F", "#{session_name}"])
            .await
        {
            Ok(out) => Ok(out.lines().map(|l| l.trim().to_string()).collect()),
            // A server with no sessions reports an error rather than an empty list
            Err(MuxError::Command { stderr, .. })
                if stderr.contains("no server running") || stderr.contains("no sessions") =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn new_session(&self, name: &str, window_name: &str, command: &str) -> MuxResult<()> {
        self.run(
            "new-session",
            &["new-session", "-d", "-s", name, "-n", window_name, command],
            self.timeouts.create(),
        )
        .await
        .map(|_| ())
    }

    async fn list_windows(&self, session_prefix: &str) -> MuxResult<Vec<WindowInfo>> {
        let out = match self
            .query("list-windows", &["list-windows", "-a", "-F", WINDOW_FORMAT])
            .await
        {
            Ok(out) => out,
            Err(MuxError::Command { stderr, .. }) if stderr.contains("no server running") => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };

        Ok(out
            .lines()
            .filter_map(parse_window_line)
            .filter(|w| w.session.starts_with(session_prefix))
            .collect())
    }

    async fn find_window(&self, window_id: &str) -> MuxResult<Option<WindowInfo>> {
        match self
            .query(
                "display-message",
                &["display-message", "-p", "-t", window_id, WINDOW_FORMAT],
            )
            .await
        {
            // tmux resolves an unknown id to the current window on some versions,
            // so the returned id has to match
            Ok(out) => Ok(parse_window_line(out.trim()).filter(|w| w.window_id == window_id)),
            Err(e) if e.is_missing_target() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_window(&self, spec: NewWindow) -> MuxResult<CreatedWindow> {
        let target = format!("{}:", spec.session);
        let format = format!("{}\t#{{pane_id}}", WINDOW_FORMAT);
        let cwd = spec.cwd.as_ref().map(|p| p.to_string_lossy().to_string());

        let mut args = vec![
            "new-window",
            "-d",
            "-P",
            "-F",
            format.as_str(),
            "-t",
            target.as_str(),
            "-n",
            spec.name.as_str(),
        ];
        if let Some(ref cwd) = cwd {
            args.extend(["-c", cwd.as_str()]);
        }
        if let Some(ref command) = spec.command {
            args.push(command.as_str());
        }

        let out = self.run("new-window", &args, self.timeouts.create()).await?;
        let line = out.trim();
        let (window_part, pane_id) = line.rsplit_once('\t').ok_or_else(|| MuxError::Parse {
            op: "new-window",
            output: line.to_string(),
        })?;
        let window = parse_window_line(window_part).ok_or_else(|| MuxError::Parse {
            op: "new-window",
            output: line.to_string(),
        })?;

        Ok(CreatedWindow {
            window,
            pane_id: pane_id.to_string(),
        })
    }

    async fn list_panes(&self, target: &str) -> MuxResult<Vec<PaneInfo>> {
        let out = self
            .query("list-panes", &["list-panes", "-t", target, "-F", PANE_FORMAT])
            .await?;
        Ok(out.lines().filter_map(parse_pane_line).collect())
    }

    async fn split_pane(&self, request: SplitRequest) -> MuxResult<String> {
        let size = request.size_percent.map(size_arg);
        let cwd = request.cwd.as_ref().map(|p| p.to_string_lossy().to_string());
        let env: Vec<String> = request
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut args = vec![
            "split-window",
            "-d",
            "-P",
            "-F",
            "#{pane_id}",
            "-t",
            request.target.as_str(),
            request.direction.flag(),
        ];
        if let Some(ref size) = size {
            args.extend(["-l", size.as_str()]);
        }
        if let Some(ref cwd) = cwd {
            args.extend(["-c", cwd.as_str()]);
        }
        for var in &env {
            args.extend(["-e", var.as_str()]);
        }
        if let Some(ref command) = request.command {
            args.push(command.as_str());
        }

        let out = self.run("split-window", &args, self.timeouts.create()).await?;
        let pane_id = out.trim();
        if !pane_id.starts_with('%') {
            return Err(MuxError::Parse {
                op: "split-window",
                output: out,
            });
        }
        Ok(pane_id.to_string())
    }

    async fn join_pane(
        &self,
        source: &str,
        target: &str,
        direction: SplitDirection,
        size_percent: Option<u8>,
    ) -> MuxResult<()> {
        let size = size_percent.map(size_arg);
        let mut args = vec!["join-pane", "-d", "-s", source, "-t", target, direction.flag()];
        if let Some(ref size) = size {
            args.extend(["-l", size.as_str()]);
        }
        self.query("join-pane", &args).await.map(|_| ())
    }

    async fn break_pane(
        &self,
        source: &str,
        session: &str,
        window_name: &str,
    ) -> MuxResult<WindowInfo> {
        let target = format!("{}:", session);
        let out = self
            .query(
                "break-pane",
                &[
                    "break-pane", "-d", "-P", "-F", WINDOW_FORMAT, "-s", source, "-t", &target,
                    "-n", window_name,
                ],
            )
            .await?;
        parse_window_line(out.trim()).ok_or(MuxError::Parse {
            op: "break-pane",
            output: out,
        })
    }

    async fn kill_pane(&self, pane_id: &str) -> MuxResult<()> {
        self.query("kill-pane", &["kill-pane", "-t", pane_id])
            .await
            .map(|_| ())
    }

    async fn resize_pane(
        &self,
        pane_id: &str,
        dimension: Dimension,
        percent: u8,
    ) -> MuxResult<()> {
        let flag = match dimension {
            Dimension::Height => "-y",
            Dimension::Width => "-x",
        };
        let size = format!("{}%", percent.min(100));
        self.query("resize-pane", &["resize-pane", "-t", pane_id, flag, &size])
            .await
            .map(|_| ())
    }

    async fn query_pane(&self, target: &str, field: &str) -> MuxResult<String> {
        let format = format!("#{{{}}}", field);
        self.query("display-message", &["display-message", "-p", "-t", target, &format])
            .await
            .map(|s| s.trim().to_string())
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> MuxResult<()> {
        self.query("select-pane", &["select-pane", "-t", pane_id, "-T", title])
            .await
            .map(|_| ())
    }

    async fn select_pane(&self, pane_id: &str) -> MuxResult<()> {
        self.query("select-pane", &["select-pane", "-t", pane_id])
            .await
            .map(|_| ())
    }

    async fn bind_key(&self, session: &str, key: &str, action: &str) -> MuxResult<()> {
        let condition = format!("#{{==:#{{session_name}},{}}}", session);
        // Outside the dashboard session the key passes through untouched
        let fallback = format!("send-keys {}", key);
        self.query(
            "bind-key",
            &["bind-key", "-n", key, "if-shell", "-F", &condition, action, &fallback],
        )
        .await
        .map(|_| ())
    }

    async fn unbind_key(&self, key: &str) -> MuxResult<()> {
        self.query("unbind-key", &["unbind-key", "-n", key])
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, pane_id: &str, keys: &[&str]) -> MuxResult<()> {
        let mut args = vec!["send-keys", "-t", pane_id];
        args.extend_from_slice(keys);
        self.query("send-keys", &args).await.map(|_| ())
    }

    async fn set_session_option(
        &self,
        session: &str,
        option: &str,
        value: &str,
    ) -> MuxResult<()> {
        self.query("set-option", &["set-option", "-t", session, option, value])
            .await
            .map(|_| ())
    }

    async fn unset_session_option(&self, session: &str, option: &str) -> MuxResult<()> {
        self.query("set-option", &["set-option", "-u", "-t", session, option])
            .await
            .map(|_| ())
    }

    async fn active_pane(&self, session: &str) -> MuxResult<String> {
        self.run(
            "display-message",
            &["display-message", "-p", "-t", session, "#{pane_id}"],
            self.timeouts.focus(),
        )
        .await
        .map(|s| s.trim().to_string())
    }

    async fn pane_memory_kb(&self, pane_id: &str) -> Option<u64> {
        let pid = self.query_pane(pane_id, "pane_pid").await.ok()?;
        let output = timeout(
            self.timeouts.focus(),
            Command::new("ps")
                .args(["-o", "rss=", "-p", pid.trim()])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .ok()?
        .ok()?;
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_arg_is_clamped() {
        assert_eq!(size_arg(0), "1%");
        assert_eq!(size_arg(35), "35%");
        assert_eq!(size_arg(100), "99%");
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let config = Config {
            tmux_binary: "/nonexistent/kanmux-tmux".to_string(),
            ..Config::default()
        };
        let tmux = TmuxCli::new(&config);
        let err = tmux.list_panes("%0").await.unwrap_err();
        assert!(matches!(err, MuxError::Spawn { op: "list-panes", .. }));
    }
}
