//! Status bar widget

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::voice::ControllerStatus;

use super::{styles, RenderState};

/// Voice indicator text, most pressing state first
pub fn voice_indicator(voice: &ControllerStatus, waiting: bool) -> (&'static str, Style) {
    if !voice.is_supported {
        ("Voice off", styles::error_style())
    } else if voice.is_opening {
        ("Opening mic...", styles::busy_style())
    } else if voice.is_recording {
        ("● REC", styles::recording_style())
    } else if voice.is_processing {
        ("Transcribing...", styles::busy_style())
    } else if waiting {
        ("Waiting...", styles::busy_style())
    } else if voice.error.is_some() {
        ("Voice error", styles::error_style())
    } else {
        ("Ready", styles::ready_style())
    }
}

/// Draw the status bar
pub fn draw_status(frame: &mut Frame, area: Rect, state: &RenderState) {
    let mut spans = vec![];

    spans.push(Span::styled(format!(" {} ", state.server_url), styles::server_style()));
    spans.push(Span::styled(" | ", styles::status_style()));

    let (indicator, style) = voice_indicator(state.voice, state.waiting);
    spans.push(Span::styled(indicator, style));

    // Status message
    if let Some(msg) = state.status_message {
        spans.push(Span::styled(" | ", styles::status_style()));
        spans.push(Span::styled(msg, styles::status_style()));
    }

    let hint = format!("voice: {}  Ctrl+R talk  /help ", state.backend_label);

    // Calculate padding to right-align
    let left_len: usize = spans.iter().map(|s| s.content.chars().count()).sum();
    let padding = (area.width as usize).saturating_sub(left_len + hint.len());
    if padding > 0 {
        spans.push(Span::raw(" ".repeat(padding)));
    }
    spans.push(Span::styled(hint, styles::hint_style()));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceError;

    fn idle() -> ControllerStatus {
        ControllerStatus {
            is_opening: false,
            is_recording: false,
            is_processing: false,
            is_supported: true,
            transcript: String::new(),
            error: None,
        }
    }

    #[test]
    fn test_idle_is_ready() {
        assert_eq!(voice_indicator(&idle(), false).0, "Ready");
        assert_eq!(voice_indicator(&idle(), true).0, "Waiting...");
    }

    #[test]
    fn test_error_shown_when_nothing_else_active() {
        let status = ControllerStatus {
            error: Some(VoiceError::InvalidPayload),
            ..idle()
        };
        let (text, style) = voice_indicator(&status, false);
        assert_eq!(text, "Voice error");
        assert_eq!(style, styles::error_style());

        // Activity wins over a stale error
        let recording = ControllerStatus {
            is_recording: true,
            ..status.clone()
        };
        assert_eq!(voice_indicator(&recording, false).0, "● REC");
        assert_eq!(voice_indicator(&status, true).0, "Waiting...");
    }

    #[test]
    fn test_opening_microphone() {
        let status = ControllerStatus {
            is_opening: true,
            ..idle()
        };
        assert_eq!(voice_indicator(&status, false).0, "Opening mic...");
    }
}
