mod detail;
mod kanban;
mod status_bar;

use crate::app::App;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::Paragraph,
    Frame,
};

pub use detail::render_detail;
pub use kanban::render_kanban;
pub use status_bar::render_status_bar;

/// Main view function - renders the entire UI.
/// While a task is joined its agent and shell run in real tmux panes below
/// us, so the dashboard only renders into its own (shrunken) pane.
pub fn view(frame: &mut Frame, app: &App) {
    // Guard against extremely small terminals to prevent panics
    if frame.area().width < 20 || frame.area().height < 3 {
        let msg = Paragraph::new("Terminal too small").style(Style::default().fg(Color::Red));
        frame.render_widget(msg, frame.area());
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(frame.area());

    let focused = is_focused(app);
    if app.detail.view().is_some() {
        render_detail(frame, chunks[0], app, focused);
    } else {
        render_kanban(frame, chunks[0], app, focused);
    }
    render_status_bar(frame, chunks[1], app);
}

/// The dashboard pane holds tmux focus (always true while nothing is joined)
pub fn is_focused(app: &App) -> bool {
    app.detail.view().map_or(true, |v| v.focused)
}

/// Accent style that fades while another pane has focus
fn accent(color: Color, focused: bool) -> Style {
    if focused {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

/// Truncate to `max` terminal columns, marking the cut with "..."
fn truncate(text: &str, max: usize) -> String {
    use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

    if text.width() <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(3);
    let mut width = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push_str("...");
    out
}
