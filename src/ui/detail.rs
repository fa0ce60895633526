use super::kanban::status_colors;
use super::{accent, truncate};
use crate::app::App;
use crate::model::{LogKind, ViewInstance, ViewPhase};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn phase_label(view: &ViewInstance) -> (&'static str, Color) {
    match view.phase {
        ViewPhase::Detached | ViewPhase::Joining if view.loading => ("starting", Color::Yellow),
        ViewPhase::Detached => ("not running", Color::DarkGray),
        ViewPhase::Joining => ("attaching", Color::Yellow),
        ViewPhase::Joined if view.binding.as_ref().map_or(false, |b| b.shell_hidden) => {
            ("attached, shell hidden", Color::Green)
        }
        ViewPhase::Joined => ("attached", Color::Green),
        ViewPhase::Failed => ("detached", Color::Red),
    }
}

/// Render the open task: header line, error badge and the tail of its audit log
pub fn render_detail(frame: &mut Frame, area: Rect, app: &App, focused: bool) {
    let (Some(view), Some(task)) = (app.detail.view(), app.detail_task()) else {
        return;
    };
    let (color, _) = status_colors(task.status);

    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", truncate(&task.title, area.width.saturating_sub(4) as usize)),
            accent(Color::Cyan, focused),
        ))
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(color)
        } else {
            Style::default().fg(Color::DarkGray)
        });
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let badge_height = if view.error.is_some() { 1 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(badge_height),
            Constraint::Min(0),
        ])
        .split(inner);

    let dim = |style: Style| {
        if focused {
            style
        } else {
            style.add_modifier(Modifier::DIM)
        }
    };

    let (phase, phase_color) = phase_label(view);
    let mut header = vec![
        Span::styled(format!(" {} ", task.status.label()), dim(Style::default().fg(color))),
        Span::styled(format!("{} ", task.agent.as_str()), dim(Style::default().fg(Color::Gray))),
        Span::styled(phase.to_string(), dim(Style::default().fg(phase_color))),
    ];
    if let Some(frame_symbol) = app.detail.spinner() {
        header.push(Span::styled(
            format!(" {}", frame_symbol),
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(header)), chunks[0]);

    if let Some(ref error) = view.error {
        let badge = Paragraph::new(Span::styled(
            format!(" ! {} ", truncate(error, inner.width.saturating_sub(4) as usize)),
            Style::default().fg(Color::White).bg(Color::Red),
        ));
        frame.render_widget(badge, chunks[1]);
    }

    // Newest entries at the bottom, as many as fit
    let room = chunks[2].height as usize;
    let start = task.logs.len().saturating_sub(room);
    let lines: Vec<Line> = task.logs[start..]
        .iter()
        .map(|log| {
            let style = match log.kind {
                LogKind::Error => Style::default().fg(Color::Red),
                LogKind::System => Style::default().fg(Color::Gray),
                LogKind::Output => Style::default().fg(Color::White),
            };
            Line::from(vec![
                Span::styled(
                    format!(" {} ", log.at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(log.text.clone(), dim(style)),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), chunks[2]);
}
