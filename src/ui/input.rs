//! Input field widget

use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::input_utils::display_column;

use super::{styles, RenderState};

/// Draw the input area
pub fn draw_input(frame: &mut Frame, area: Rect, state: &RenderState) {
    let (title, border_style) = if state.voice.is_opening {
        (" Requesting microphone... (Esc to cancel) ", styles::busy_style())
    } else if state.voice.is_recording {
        (" Recording... (Ctrl+R to stop, Esc to cancel) ", styles::recording_style())
    } else if state.voice.is_processing {
        (" Transcribing... ", styles::busy_style())
    } else if state.waiting {
        (" Message (waiting for reply) ", styles::border_style())
    } else {
        (" Message ", styles::border_style())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title);

    let input = state.input;
    let cursor_pos = state.cursor_position.min(input.len());
    let (before_cursor, after_cursor) = input.split_at(cursor_pos);

    let line = if input.is_empty() && !state.voice.is_recording {
        Line::from(vec![
            Span::styled("  ", styles::input_style()),
            Span::styled("│", styles::cursor_style()),
            Span::styled("Ask about admissions, courses, fees...", styles::placeholder_style()),
        ])
    } else {
        Line::from(vec![
            Span::styled("  ", styles::input_style()), // Left padding
            Span::styled(before_cursor, styles::input_style()),
            Span::styled("│", styles::cursor_style()),
            Span::styled(after_cursor, styles::input_style()),
        ])
    };

    let paragraph = Paragraph::new(line).block(block);

    frame.render_widget(paragraph, area);

    // +1 border, +2 padding
    let column = display_column(input, cursor_pos) as u16;
    let x = area.x + 1 + 2 + column;
    let y = area.y + 1;
    if x < area.x + area.width.saturating_sub(1) {
        frame.set_cursor_position((x, y));
    }
}
