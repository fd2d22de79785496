//! Chat widget state and event loop

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    chat::{self, ChatError, ChatSession, SUGGESTED_QUESTIONS},
    input_utils::{merge_transcript, next_boundary, prev_boundary},
    ui::{self, RenderState},
    voice::{VoiceEvent, VoiceInputController, VoiceState},
};

/// Messages delivered to the app from background tasks
#[derive(Debug)]
pub enum AppMessage {
    /// The relay answered (or failed to)
    ChatReply(Result<String, ChatError>),
}

/// A single entry in the conversation
#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl ConversationEntry {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: chrono::Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Application state
pub struct App {
    /// Terminal handle
    terminal: Terminal<CrosstermBackend<Stdout>>,
    /// Conversation history for display
    messages: Vec<ConversationEntry>,
    /// Message being composed
    input: String,
    /// Byte offset of the cursor in `input`
    cursor_position: usize,
    /// Relay client
    chat: ChatSession,
    /// Voice input
    voice: VoiceInputController,
    voice_rx: mpsc::Receiver<VoiceEvent>,
    message_rx: mpsc::Receiver<AppMessage>,
    message_tx: mpsc::Sender<AppMessage>,
    /// Waiting on the assistant
    waiting: bool,
    /// Scroll offset for conversation view
    scroll_offset: usize,
    /// Largest useful offset, as of the last draw
    max_scroll: usize,
    should_quit: bool,
    status_message: Option<String>,
    /// Shown in the status bar
    server_url: String,
    backend_label: String,
}

impl App {
    pub fn new(
        chat: ChatSession,
        voice: VoiceInputController,
        voice_rx: mpsc::Receiver<VoiceEvent>,
        server_url: String,
        backend_label: String,
    ) -> Result<Self> {
        // Set up terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let (message_tx, message_rx) = mpsc::channel(32);

        let status_message = if voice.is_supported() {
            None
        } else {
            voice.error().map(|e| e.user_message())
        };

        Ok(Self {
            terminal,
            messages: vec![ConversationEntry::new(Role::Assistant, chat::welcome_message())],
            input: String::new(),
            cursor_position: 0,
            chat,
            voice,
            voice_rx,
            message_rx,
            message_tx,
            waiting: false,
            scroll_offset: 0,
            max_scroll: 0,
            should_quit: false,
            status_message,
            server_url,
            backend_label,
        })
    }

    /// Main event loop
    pub async fn run(&mut self) -> Result<()> {
        let result = self.event_loop().await;
        // Release the microphone before leaving, whatever happened
        self.voice.cancel();
        self.cleanup()?;
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            self.draw()?;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(16)) => {
                    if event::poll(Duration::from_millis(0))? {
                        if let Event::Key(key) = event::read()? {
                            if key.kind == KeyEventKind::Press {
                                self.handle_key_event(key).await;
                            }
                        }
                    }
                }

                Some(msg) = self.message_rx.recv() => {
                    self.handle_app_message(msg);
                }

                Some(event) = self.voice_rx.recv() => {
                    self.handle_voice_event(event);
                }
            }

            if self.should_quit {
                return Ok(());
            }
        }
    }

    fn draw(&mut self) -> Result<()> {
        let voice = self.voice.status();
        let state = RenderState {
            messages: &self.messages,
            input: &self.input,
            cursor_position: self.cursor_position,
            voice: &voice,
            waiting: self.waiting,
            scroll_offset: self.scroll_offset,
            status_message: self.status_message.as_deref(),
            server_url: &self.server_url,
            backend_label: &self.backend_label,
            show_suggestions: self.messages.len() <= 1,
        };

        let mut max_scroll = self.max_scroll;
        self.terminal.draw(|frame| {
            max_scroll = ui::draw(frame, &state);
        })?;
        self.max_scroll = max_scroll;
        self.scroll_offset = self.scroll_offset.min(max_scroll);
        Ok(())
    }

    async fn handle_key_event(&mut self, key: KeyEvent) {
        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('q')) => {
                self.should_quit = true;
            }
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                self.input.clear();
                self.cursor_position = 0;
            }
            (KeyModifiers::CONTROL, KeyCode::Char('r')) => {
                self.toggle_voice().await;
            }
            (_, KeyCode::Esc) => {
                let opening = self.voice.is_opening();
                if self.voice.cancel() {
                    let status = if opening {
                        "Microphone request cancelled"
                    } else {
                        "Recording cancelled"
                    };
                    self.status_message = Some(status.to_string());
                }
            }
            (KeyModifiers::ALT, KeyCode::Char(c @ '1'..='8')) => {
                let index = c as usize - '1' as usize;
                if let Some(question) = SUGGESTED_QUESTIONS.get(index) {
                    self.send_message(question.to_string());
                }
            }
            (_, KeyCode::Enter) => {
                self.submit_input().await;
            }
            (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
                self.input.insert(self.cursor_position, c);
                self.cursor_position += c.len_utf8();
            }
            (_, KeyCode::Backspace) => {
                if self.cursor_position > 0 {
                    let start = prev_boundary(&self.input, self.cursor_position);
                    self.input.replace_range(start..self.cursor_position, "");
                    self.cursor_position = start;
                }
            }
            (_, KeyCode::Delete) => {
                let end = next_boundary(&self.input, self.cursor_position);
                self.input.replace_range(self.cursor_position..end, "");
            }
            (_, KeyCode::Left) => {
                self.cursor_position = prev_boundary(&self.input, self.cursor_position);
            }
            (_, KeyCode::Right) => {
                self.cursor_position = next_boundary(&self.input, self.cursor_position);
            }
            (_, KeyCode::Home) => {
                self.cursor_position = 0;
            }
            (_, KeyCode::End) => {
                self.cursor_position = self.input.len();
            }
            (_, KeyCode::PageUp) => {
                self.scroll_offset = ui::scroll_up(self.scroll_offset, 10, self.max_scroll);
            }
            (_, KeyCode::PageDown) => {
                self.scroll_offset = self.scroll_offset.saturating_sub(10);
            }
            _ => {}
        }
    }

    async fn toggle_voice(&mut self) {
        let result = match self.voice.state() {
            VoiceState::Idle => self.voice.start().map(|_| "Requesting microphone..."),
            VoiceState::Capturing if self.voice.is_opening() => {
                self.voice.cancel();
                self.status_message = Some("Microphone request cancelled".to_string());
                return;
            }
            VoiceState::Capturing => self.voice.stop().await.map(|_| "Transcribing..."),
            VoiceState::Processing => {
                self.status_message = Some("Still transcribing the last recording".to_string());
                return;
            }
            VoiceState::Unsupported => {
                self.status_message = self.voice.error().map(|e| e.user_message());
                return;
            }
        };

        self.status_message = Some(match result {
            Ok(status) => status.to_string(),
            Err(e) => format!("Voice error: {}", e.user_message()),
        });
    }

    async fn submit_input(&mut self) {
        // Finish any recording first; its transcript lands in the next message.
        // A microphone that has not opened yet has nothing to give.
        if self.voice.is_opening() {
            self.voice.cancel();
        } else if self.voice.state() == VoiceState::Capturing {
            if let Err(e) = self.voice.stop().await {
                self.status_message = Some(format!("Voice error: {}", e.user_message()));
            }
        }

        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }

        if let Some(command) = text.strip_prefix('/') {
            self.input.clear();
            self.cursor_position = 0;
            self.handle_slash_command(command);
            return;
        }

        if self.send_message(text) {
            self.input.clear();
            self.cursor_position = 0;
        }
    }

    fn handle_slash_command(&mut self, command: &str) {
        match command.trim() {
            "quit" | "q" => {
                self.should_quit = true;
            }
            "clear" => {
                self.messages = vec![ConversationEntry::new(Role::Assistant, chat::welcome_message())];
                self.scroll_offset = 0;
            }
            "help" => {
                let help = r#"Commands:
  /clear         Start over
  /quit          Exit
  Ctrl+R         Start/stop voice input
  Esc            Cancel recording or microphone request
  Alt+1..8       Ask a suggested question
  PgUp/PgDn      Scroll
  Ctrl+Q         Quit"#;
                self.messages.push(ConversationEntry::new(Role::System, help));
            }
            other => {
                self.status_message = Some(format!("Unknown command: /{}", other));
            }
        }
    }

    /// Returns false when the message could not be sent yet
    fn send_message(&mut self, text: String) -> bool {
        if self.waiting {
            self.status_message = Some("Waiting for the assistant...".to_string());
            return false;
        }

        self.messages.push(ConversationEntry::new(Role::User, text.clone()));
        self.waiting = true;
        self.scroll_offset = 0;

        let chat = self.chat.clone();
        let tx = self.message_tx.clone();
        tokio::spawn(async move {
            let reply = chat.send_user_text(&text).await;
            let _ = tx.send(AppMessage::ChatReply(reply)).await;
        });
        true
    }

    fn handle_app_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::ChatReply(reply) => {
                self.waiting = false;
                let text = match reply {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Chat request failed: {}", e);
                        e.user_message()
                    }
                };
                self.messages.push(ConversationEntry::new(Role::Assistant, text));
                self.scroll_offset = 0;
            }
        }
    }

    fn handle_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::Started => {
                self.status_message = Some("Recording... speak now".to_string());
            }
            VoiceEvent::StartFailed(err) => {
                self.status_message = Some(format!("Voice error: {}", err.user_message()));
            }
            VoiceEvent::Transcribed(_) => {
                let transcript = self.voice.transcript();
                if let Some(merged) = merge_transcript(&self.input, &transcript) {
                    self.input = merged;
                    self.cursor_position = self.input.len();
                }
                self.voice.reset();
                self.status_message = Some("Transcription complete".to_string());
            }
            VoiceEvent::Failed(err) => {
                self.status_message = Some(format!("Voice error: {}", err.user_message()));
            }
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}
