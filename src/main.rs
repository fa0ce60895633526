mod app;
mod config;
mod detail;
mod executor;
mod message;
mod model;
mod panes;
mod store;
mod tmux;
mod ui;

use anyhow::{bail, Context};
use app::App;
use config::Config;
use detail::DetailView;
use message::Message;
use model::{AgentKind, Task};
use panes::{PaneEngine, UiTarget};
use ratatui::{
    crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    DefaultTerminal,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{JsonStore, TaskStore};
use tmux::TmuxCli;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};

const USAGE: &str = "\
Usage:
  kanmux                     Run the dashboard (inside tmux)
  kanmux add <title> [--body <text>] [--agent claude|codex|gemini] [--dir <path>] [--dangerous]
  kanmux list                List tasks and their tmux identifiers";

/// Where state and logs live: `<data_local_dir>/kanmux`
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kanmux")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => {}
        Some("add") => return handle_add_command(&args[2..]),
        Some("list") => return handle_list_command(),
        Some("help") | Some("-h") | Some("--help") => {
            println!("{}", USAGE);
            return Ok(());
        }
        Some(other) => bail!("unknown command: {}\n\n{}", other, USAGE),
    }

    init_logging()?;
    let config = Arc::new(Config::load());

    // The dashboard docks panes next to itself, so it has to know where it runs
    let control_pane =
        std::env::var("TMUX_PANE").context("kanmux must be run inside a tmux pane")?;
    let tmux = TmuxCli::new(&config);
    let session = match config.ui_session.clone() {
        Some(session) => session,
        None => tmux
            .current_session()
            .await
            .context("failed to detect the current tmux session")?,
    };
    tracing::info!(session = %session, control_pane = %control_pane, "starting dashboard");

    let store: Arc<dyn TaskStore> = Arc::new(
        JsonStore::open(JsonStore::default_path()).context("failed to open task store")?,
    );
    let engine = PaneEngine::new(
        Arc::new(tmux),
        store.clone(),
        config.clone(),
        UiTarget {
            session,
            control_pane,
        },
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let queue = panes::worker::spawn(engine.clone(), tx.clone());
    let mut app = App::new(store, DetailView::new(engine, queue, tx));

    let mut terminal = ratatui::try_init().context("failed to set up terminal")?;
    let result = run_app(&mut terminal, &mut app, &config, rx).await;
    ratatui::restore();

    tracing::info!("dashboard stopped");
    result
}

fn init_logging() -> anyhow::Result<()> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("kanmux.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    config: &Config,
    mut messages: UnboundedReceiver<Message>,
) -> anyhow::Result<()> {
    let (input_tx, mut input) = mpsc::unbounded_channel();
    spawn_input_reader(input_tx);

    let timer = |ms: u64| {
        let mut timer = interval(Duration::from_millis(ms.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    };
    let mut spinner = timer(config.intervals.spinner_ms);
    let mut focus = timer(config.intervals.focus_ms);
    let mut reconcile = timer(config.intervals.reconcile_ms);

    loop {
        terminal.draw(|frame| ui::view(frame, app))?;

        let batch = tokio::select! {
            Some(event) = input.recv() => match event {
                // Only handle Press events, ignore Release and Repeat
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key_event(key, app),
                // Resizes just redraw
                _ => Vec::new(),
            },
            Some(msg) = messages.recv() => vec![msg],
            _ = spinner.tick() => vec![Message::Tick],
            _ = focus.tick() => vec![Message::FocusTick],
            _ = reconcile.tick() => vec![Message::ReconcileTick],
        };
        dispatch(app, batch);

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Apply messages in order, including any follow-ups they produce
fn dispatch(app: &mut App, batch: Vec<Message>) {
    let mut pending: VecDeque<Message> = batch.into();
    while let Some(msg) = pending.pop_front() {
        pending.extend(app.update(msg));
    }
}

/// Terminal input is blocking, so it gets its own thread
fn spawn_input_reader(tx: UnboundedSender<Event>) {
    std::thread::spawn(move || loop {
        match event::poll(Duration::from_millis(250)) {
            Ok(true) => match event::read() {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read terminal input");
                    break;
                }
            },
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to poll terminal input");
                break;
            }
        }
    });
}

fn handle_key_event(key: KeyEvent, app: &App) -> Vec<Message> {
    let mut messages = Vec::new();

    // Clear status message on any key press
    if app.status_message.is_some() {
        messages.push(Message::SetStatusMessage(None));
    }

    let detail_open = app.detail.view().is_some();
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    let msg = match key.code {
        // Also delivered by the tmux bindings installed while a task is joined
        KeyCode::Char('k') if alt => Some(Message::JumpTask(-1)),
        KeyCode::Char('j') if alt => Some(Message::JumpTask(1)),

        KeyCode::Char('j') | KeyCode::Down if !detail_open => Some(Message::SelectNext),
        KeyCode::Char('k') | KeyCode::Up if !detail_open => Some(Message::SelectPrev),
        KeyCode::Enter => Some(Message::OpenSelected { focus_agent: false }),
        KeyCode::Char('o') => Some(Message::OpenSelected { focus_agent: true }),
        KeyCode::Esc if detail_open => Some(Message::CloseDetail),
        KeyCode::Char('\\') => Some(Message::ToggleShell),
        KeyCode::Char('r') => Some(Message::Refresh),
        KeyCode::Char('q') => Some(Message::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Message::Quit)
        }
        _ => None,
    };

    messages.extend(msg);
    messages
}

fn handle_add_command(args: &[String]) -> anyhow::Result<()> {
    let mut title_words = Vec::new();
    let mut body = None;
    let mut agent = AgentKind::default();
    let mut dir = None;
    let mut dangerous = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--body" => body = Some(iter.next().context("--body needs a value")?.clone()),
            "--agent" => {
                agent = iter
                    .next()
                    .context("--agent needs a value")?
                    .parse()
                    .map_err(anyhow::Error::msg)?
            }
            "--dir" => dir = Some(PathBuf::from(iter.next().context("--dir needs a value")?)),
            "--dangerous" => dangerous = true,
            other if other.starts_with("--") => bail!("unknown option: {}\n\n{}", other, USAGE),
            word => title_words.push(word.to_string()),
        }
    }
    if title_words.is_empty() {
        bail!("missing task title\n\n{}", USAGE);
    }

    let workspace = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let mut task = Task::new(title_words.join(" "), workspace).with_agent(agent);
    if let Some(body) = body {
        task = task.with_body(body);
    }
    task.dangerous_mode = dangerous;

    let store = JsonStore::open(JsonStore::default_path()).context("failed to open task store")?;
    let id = task.id;
    store.add_task(task)?;
    println!("Added task {}", id.simple());
    Ok(())
}

fn handle_list_command() -> anyhow::Result<()> {
    let store = JsonStore::open(JsonStore::default_path()).context("failed to open task store")?;
    let none = || "-".to_string();
    for task in store.list_tasks()? {
        println!(
            "{}  {:<10}  {:<7}  window={} agent={} shell={}  {}",
            &task.id.simple().to_string()[..8],
            task.status.label(),
            task.agent.as_str(),
            task.window_id.clone().unwrap_or_else(none),
            task.agent_pane_id.clone().unwrap_or_else(none),
            task.shell_pane_id.clone().unwrap_or_else(none),
            task.title,
        );
    }
    Ok(())
}
