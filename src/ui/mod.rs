//! UI components using ratatui

mod conversation;
mod input;
mod layout;
mod status;
mod styles;
mod suggestions;

pub use conversation::*;
pub use input::*;
pub use layout::*;
pub use status::*;
pub use suggestions::*;

use ratatui::Frame;

use crate::app::ConversationEntry;
use crate::voice::ControllerStatus;

/// State needed for rendering (borrowed references)
pub struct RenderState<'a> {
    pub messages: &'a [ConversationEntry],
    pub input: &'a str,
    pub cursor_position: usize,
    pub voice: &'a ControllerStatus,
    pub waiting: bool,
    pub scroll_offset: usize,
    pub status_message: Option<&'a str>,
    pub server_url: &'a str,
    pub backend_label: &'a str,
    pub show_suggestions: bool,
}

/// Main draw function. Returns the conversation's maximum scroll offset.
pub fn draw(frame: &mut Frame, state: &RenderState) -> usize {
    let chunks = create_layout(frame.area(), state.show_suggestions);

    let max_scroll = draw_conversation(frame, chunks[0], state);

    if state.show_suggestions {
        draw_suggestions(frame, chunks[1]);
    }

    draw_input(frame, chunks[2], state);

    draw_status(frame, chunks[3], state);

    max_scroll
}
