//! Agent launch commands
//!
//! Each agent CLI gets its own [`Executor`]; the kind stored on a task is
//! resolved to an implementation once, via [`executor_for`].

use crate::model::{AgentKind, Task};

/// Builds the shell command that runs an agent inside a tmux pane
pub trait Executor: Send + Sync {
    /// Display name, used as the agent pane title
    fn name(&self) -> &'static str;

    /// Command for a task: resumes `continuation` when given, otherwise starts on `prompt`
    fn build_command(&self, task: &Task, continuation: Option<&str>, prompt: &str) -> String;
}

pub fn executor_for(kind: AgentKind) -> Box<dyn Executor> {
    match kind {
        AgentKind::Claude => Box::new(ClaudeExecutor),
        AgentKind::Codex => Box::new(CodexExecutor),
        AgentKind::Gemini => Box::new(GeminiExecutor),
    }
}

/// Prompt for a fresh agent run, synthesized from the task title and body
pub fn task_prompt(task: &Task) -> String {
    let body = task.body.trim();
    if body.is_empty() {
        format!("Task: {}", task.title.trim())
    } else {
        format!("Task: {}\n\n{}", task.title.trim(), body)
    }
}

/// Quote one argument for `sh -c`
fn quote(arg: &str) -> String {
    match shlex::try_quote(arg) {
        Ok(quoted) => quoted.into_owned(),
        // Only fails on NUL bytes, which a terminal cannot carry anyway
        Err(_) => shlex::try_quote(&arg.replace('\0', ""))
            .map(|q| q.into_owned())
            .unwrap_or_default(),
    }
}

fn join_command(parts: Vec<String>) -> String {
    parts.join(" ")
}

pub struct ClaudeExecutor;

impl Executor for ClaudeExecutor {
    fn name(&self) -> &'static str {
        "Claude"
    }

    fn build_command(&self, task: &Task, continuation: Option<&str>, prompt: &str) -> String {
        let mut parts = vec!["claude".to_string()];
        if task.dangerous_mode {
            parts.push("--dangerously-skip-permissions".to_string());
        }
        match continuation {
            Some(token) => {
                parts.push("--resume".to_string());
                parts.push(quote(token));
            }
            None => parts.push(quote(prompt)),
        }
        join_command(parts)
    }
}

pub struct CodexExecutor;

impl Executor for CodexExecutor {
    fn name(&self) -> &'static str {
        "Codex"
    }

    fn build_command(&self, task: &Task, continuation: Option<&str>, prompt: &str) -> String {
        let mut parts = vec!["codex".to_string()];
        if task.dangerous_mode {
            parts.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        }
        match continuation {
            Some(token) => {
                parts.push("resume".to_string());
                parts.push(quote(token));
            }
            None => parts.push(quote(prompt)),
        }
        join_command(parts)
    }
}

pub struct GeminiExecutor;

impl Executor for GeminiExecutor {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn build_command(&self, task: &Task, continuation: Option<&str>, prompt: &str) -> String {
        let mut parts = vec!["gemini".to_string()];
        if task.dangerous_mode {
            parts.push("--yolo".to_string());
        }
        match continuation {
            Some(token) => {
                parts.push("--resume".to_string());
                parts.push(quote(token));
            }
            None => {
                parts.push("--prompt-interactive".to_string());
                parts.push(quote(prompt));
            }
        }
        join_command(parts)
    }
}
