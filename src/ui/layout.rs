//! Layout definitions

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Height of the suggested-questions panel when shown
const SUGGESTIONS_HEIGHT: u16 = 6;

/// Split into conversation, suggestions, input and status areas.
///
/// The suggestions area collapses to zero height once the conversation
/// has started, so callers can always index four chunks.
pub fn create_layout(area: Rect, show_suggestions: bool) -> Vec<Rect> {
    let suggestions = if show_suggestions { SUGGESTIONS_HEIGHT } else { 0 };
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),              // Conversation (expandable)
            Constraint::Length(suggestions), // Suggested questions
            Constraint::Length(3),           // Input (fixed height)
            Constraint::Length(1),           // Status bar
        ])
        .split(area)
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestions_collapse() {
        let area = Rect::new(0, 0, 80, 30);
        let shown = create_layout(area, true);
        let hidden = create_layout(area, false);
        assert_eq!(shown.len(), 4);
        assert_eq!(shown[1].height, SUGGESTIONS_HEIGHT);
        assert_eq!(hidden[1].height, 0);
        assert_eq!(hidden[2].height, 3);
        assert_eq!(hidden[3].height, 1);
    }
}
