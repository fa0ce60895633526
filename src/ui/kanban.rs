use super::{accent, truncate};
use crate::app::App;
use crate::model::{Task, TaskStatus};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

/// (background color, contrasting foreground for selected rows)
pub(super) fn status_colors(status: TaskStatus) -> (Color, Color) {
    match status {
        TaskStatus::Backlog => (Color::Blue, Color::White),
        TaskStatus::Queued => (Color::Cyan, Color::Black),
        TaskStatus::Processing => (Color::Yellow, Color::Black),
        TaskStatus::Blocked => (Color::Red, Color::White),
        TaskStatus::Done => (Color::Green, Color::Black),
        TaskStatus::Archived => (Color::DarkGray, Color::White),
    }
}

/// Render the task board: one row per task, grouped by status
pub fn render_kanban(frame: &mut Frame, area: Rect, app: &App, focused: bool) {
    let block = Block::default()
        .title(Span::styled(" Tasks ", accent(Color::Cyan, focused)))
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        });

    if app.tasks.is_empty() {
        let hint = Paragraph::new(Span::styled(
            " No tasks yet. Add one with `kanmux add <title>`",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let width = block.inner(area).width as usize;
    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .enumerate()
        .map(|(idx, task)| task_row(task, idx == app.selected, width))
        .collect();

    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(List::new(items).block(block), area, &mut state);
}

fn task_row(task: &Task, selected: bool, width: usize) -> ListItem<'static> {
    let (color, contrast_fg) = status_colors(task.status);
    let badge = format!(" {:<10} ", task.status.label());

    let (badge_style, title_style, meta_style) = if selected {
        let base = Style::default().bg(color);
        (
            base.fg(contrast_fg).add_modifier(Modifier::BOLD),
            base.fg(contrast_fg).add_modifier(Modifier::BOLD),
            base.fg(contrast_fg).add_modifier(Modifier::DIM),
        )
    } else {
        (
            Style::default().fg(color),
            Style::default().fg(Color::White),
            Style::default().fg(Color::DarkGray),
        )
    };

    // "[xxxx] " prefix matches the daemon window naming
    let short_id = format!("[{}] ", &task.id.simple().to_string()[..4]);
    let agent = format!(" {}", task.agent.as_str());
    let room = width.saturating_sub(badge.len() + short_id.len() + agent.len());

    ListItem::new(Line::from(vec![
        Span::styled(badge, badge_style),
        Span::styled(short_id, meta_style),
        Span::styled(truncate(&task.title, room), title_style),
        Span::styled(agent, meta_style),
    ]))
}
