//! Conversation view widget

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::Role;
use crate::llm::COLLEGE_NAME;

use super::{styles, RenderState};

/// How far the view can scroll back from the bottom
pub fn max_scroll(total_lines: usize, visible_height: usize) -> usize {
    total_lines.saturating_sub(visible_height)
}

/// Scroll back by `step` lines without passing the top
pub fn scroll_up(offset: usize, step: usize, max: usize) -> usize {
    offset.saturating_add(step).min(max)
}

/// Draw the conversation area, returning the maximum scroll offset
pub fn draw_conversation(frame: &mut Frame, area: Rect, state: &RenderState) -> usize {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style())
        .title(format!(" {} Assistant ", COLLEGE_NAME));

    let inner = block.inner(area);

    let mut lines: Vec<Line> = Vec::new();

    for entry in state.messages {
        let (prefix, style) = match entry.role {
            Role::User => ("You", styles::user_style()),
            Role::Assistant => ("Assistant", styles::assistant_style()),
            Role::System => ("System", styles::system_style()),
        };

        lines.push(Line::from(vec![
            Span::styled(format!("{} ", prefix), style),
            Span::styled(entry.timestamp.format("%H:%M").to_string(), styles::timestamp_style()),
        ]));
        let body_style = match entry.role {
            Role::System => styles::system_style(),
            _ => Style::default().fg(styles::TEXT),
        };
        for line in entry.text.lines() {
            lines.push(Line::from(Span::styled(line.to_string(), body_style)));
        }
        lines.push(Line::from(""));
    }

    if state.waiting {
        lines.push(Line::from(Span::styled("Assistant is typing...", styles::busy_style())));
    }

    // Calculate scroll
    let visible_height = inner.height as usize;
    let max = max_scroll(lines.len(), visible_height);
    let scroll = max.saturating_sub(state.scroll_offset);

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0));

    frame.render_widget(paragraph, area);

    max
}
