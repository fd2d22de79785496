//! Composed-message editing helpers
//! Extracted for testability

/// Fold a transcript into the message being composed.
///
/// Appends with a single separating space unless the transcript is already
/// somewhere in the message. Returns `None` when nothing changes. This only
/// catches repeated deliveries of the same text, not every duplicate.
pub fn merge_transcript(message: &str, transcript: &str) -> Option<String> {
    let transcript = transcript.trim();
    if transcript.is_empty() || message.contains(transcript) {
        return None;
    }
    if message.is_empty() {
        Some(transcript.to_string())
    } else if message.ends_with(' ') {
        Some(format!("{}{}", message, transcript))
    } else {
        Some(format!("{} {}", message, transcript))
    }
}

/// Byte index of the char boundary before `cursor`
pub fn prev_boundary(input: &str, cursor: usize) -> usize {
    input[..cursor.min(input.len())]
        .char_indices()
        .next_back()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Byte index of the char boundary after `cursor`
pub fn next_boundary(input: &str, cursor: usize) -> usize {
    let cursor = cursor.min(input.len());
    input[cursor..]
        .chars()
        .next()
        .map(|c| cursor + c.len_utf8())
        .unwrap_or(cursor)
}

/// Number of chars before `cursor`, for placing the terminal cursor
pub fn display_column(input: &str, cursor: usize) -> usize {
    input[..cursor.min(input.len())].chars().count()
}
