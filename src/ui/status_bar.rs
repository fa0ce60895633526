use crate::app::App;
use crate::model::TaskStatus;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Render the status bar: a pending message, otherwise key hints and a summary
pub fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    if let Some(ref msg) = app.status_message {
        let status = Paragraph::new(Span::styled(
            format!(" {} ", msg),
            Style::default().fg(Color::White).bg(Color::Blue),
        ));
        frame.render_widget(status, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(24)])
        .split(area);

    frame.render_widget(Paragraph::new(Line::from(hints(app))), chunks[0]);
    frame.render_widget(
        Paragraph::new(Span::styled(summary(app), Style::default().fg(Color::DarkGray)))
            .alignment(ratatui::layout::Alignment::Right),
        chunks[1],
    );
}

fn hints(app: &App) -> Vec<Span<'static>> {
    let keys: &[(&str, &str)] = if app.detail.view().is_some() {
        &[
            ("Esc", "back"),
            ("\\", "shell"),
            ("M-j/k", "next/prev"),
            ("M-Tab", "panes"),
            ("q", "quit"),
        ]
    } else {
        &[
            ("j/k", "move"),
            ("Enter", "open"),
            ("o", "open+focus"),
            ("r", "refresh"),
            ("q", "quit"),
        ]
    };

    let mut spans = vec![Span::raw(" ")];
    for (key, action) in keys {
        spans.push(Span::styled(key.to_string(), Style::default().fg(Color::Cyan)));
        spans.push(Span::styled(
            format!(" {}  ", action),
            Style::default().fg(Color::Gray),
        ));
    }
    spans
}

fn summary(app: &App) -> String {
    let running = app
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Processing)
        .count();
    format!("{} tasks, {} running ", app.tasks.len(), running)
}
