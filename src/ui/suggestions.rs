//! Suggested questions panel

use ratatui::{
    layout::Rect,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::chat::SUGGESTED_QUESTIONS;

use super::styles;

/// Two questions per row, each tagged with its Alt shortcut
pub fn draw_suggestions(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style())
        .title(" Suggested questions (Alt+1..8) ");

    let column_width = (area.width.saturating_sub(2) / 2) as usize;

    let lines: Vec<Line> = SUGGESTED_QUESTIONS
        .chunks(2)
        .enumerate()
        .map(|(row, pair)| {
            let mut spans = Vec::new();
            for (col, question) in pair.iter().enumerate() {
                let number = row * 2 + col + 1;
                let label = format!(". {}", question);
                spans.push(Span::styled(format!(" {}", number), styles::shortcut_style()));
                spans.push(Span::styled(
                    format!("{:<width$}", label, width = column_width.saturating_sub(2)),
                    styles::suggestion_style(),
                ));
            }
            Line::from(spans)
        })
        .collect();

    let paragraph = Paragraph::new(Text::from(lines)).block(block);
    frame.render_widget(paragraph, area);
}
