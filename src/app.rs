use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::deepseek::DeepSeekClient;
use crate::provider::ChatMessage;
use crate::session::ChatSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

type Session = ChatSession<DeepSeekClient>;
type ExchangeTask = JoinHandle<(Session, anyhow::Result<String>)>;

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input line state
    pub input: String,
    pub cursor: usize, // cursor position in chars, not bytes

    // Transcript (projection of the conversation log)
    pub messages: Vec<ChatMessage>,
    pub chat_scroll: u16,
    pub chat_height: u16, // set during render, for scroll calculations
    pub chat_width: u16,  // set during render, for wrap calculations

    // In-flight exchange. The session moves into the task while a request
    // is out, so a second submission cannot race on the conversation store.
    session: Option<Session>,
    pending: Option<ExchangeTask>,
    fragments: Option<mpsc::UnboundedReceiver<String>>,
    pub pending_user: Option<String>,
    pub partial_reply: String,
    pub animation_frame: u8,

    pub status: Option<String>,
    pub bot_name: String,
    pub model: String,
}

impl App {
    pub fn new(session: Session, config: &Config, api_key_present: bool) -> Self {
        let messages = session.projection();
        let status = if api_key_present {
            None
        } else {
            Some("DEEPSEEK_API_KEY is not set; requests will fail".to_string())
        };

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,

            input: String::new(),
            cursor: 0,

            messages,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            session: Some(session),
            pending: None,
            fragments: None,
            pending_user: None,
            partial_reply: String::new(),
            animation_frame: 0,

            status,
            bot_name: config.bot_name.clone(),
            model: config.model.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Submit the current input line as one exchange. Empty input and
    /// overlapping submissions are rejected.
    pub fn submit(&mut self) {
        if self.input.is_empty() {
            return;
        }
        if self.is_busy() {
            self.status = Some("still waiting for the current reply".to_string());
            return;
        }
        let Some(mut session) = self.session.take() else {
            self.status = Some("session unavailable, restart to recover".to_string());
            return;
        };

        let user_text = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.status = None;
        self.pending_user = Some(user_text.clone());
        self.partial_reply.clear();

        let (tx, rx) = mpsc::unbounded_channel();
        self.fragments = Some(rx);
        self.pending = Some(tokio::spawn(async move {
            let result = session.send_message_streamed(&user_text, tx).await;
            (session, result)
        }));

        self.scroll_to_bottom();
    }

    /// Pull any reply fragments that arrived since the last tick into the
    /// typewriter buffer.
    pub fn drain_fragments(&mut self) {
        let mut received = false;
        if let Some(rx) = &mut self.fragments {
            while let Ok(fragment) = rx.try_recv() {
                self.partial_reply.push_str(&fragment);
                received = true;
            }
        }
        if received {
            self.scroll_to_bottom();
        }
    }

    /// Finish the in-flight exchange if its task has completed, putting the
    /// session back and refreshing the transcript.
    pub async fn poll_exchange(&mut self) {
        let finished = matches!(&self.pending, Some(task) if task.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.pending.take() else {
            return;
        };
        self.fragments = None;
        self.partial_reply.clear();
        self.pending_user = None;

        match task.await {
            Ok((session, result)) => {
                self.session = Some(session);
                match result {
                    Ok(_) => self.refresh_messages(),
                    Err(err) => {
                        // Failed exchanges leave no trace in the log
                        tracing::error!(%err, "exchange failed");
                        self.status = Some(format!("error: {err:#}"));
                    }
                }
            }
            Err(err) => {
                tracing::error!(%err, "exchange task aborted");
                self.status = Some("exchange task aborted, restart to recover".to_string());
            }
        }

        self.scroll_to_bottom();
    }

    /// Clear the conversation and purge the memory file.
    pub fn clear_conversation(&mut self) {
        if self.is_busy() {
            self.status = Some("still waiting for the current reply".to_string());
            return;
        }
        if let Some(session) = &mut self.session {
            let purged = session.clear(true);
            self.status = Some(if purged {
                "conversation cleared, memory file removed".to_string()
            } else {
                "conversation cleared, no memory file to remove".to_string()
            });
            self.refresh_messages();
            self.chat_scroll = 0;
        }
    }

    fn refresh_messages(&mut self) {
        if let Some(session) = &self.session {
            self.messages = session.projection();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Transcript scrolling
    pub fn scroll_down(&mut self) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.chat_height);
        if self.chat_scroll < max_scroll {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        let total = self.total_chat_lines();
        let visible = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = total.saturating_sub(visible);
    }

    /// Rendered height of the transcript, counting wrapped lines the same
    /// way the draw code lays them out.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: u16 = 0;
        for msg in &self.messages {
            total += Self::message_lines(&msg.content, wrap_width);
        }
        if let Some(pending) = &self.pending_user {
            total += Self::message_lines(pending, wrap_width);
        }
        if self.is_busy() {
            // Role line plus either the partial reply or "Thinking..."
            if self.partial_reply.is_empty() {
                total += 2;
            } else {
                total += Self::message_lines(&self.partial_reply, wrap_width);
            }
        }
        total
    }

    fn message_lines(content: &str, wrap_width: usize) -> u16 {
        let mut lines: u16 = 1; // role line
        for line in content.lines() {
            // Character count, not byte length, for proper UTF-8 handling
            let char_count = line.chars().count();
            if char_count == 0 {
                lines += 1;
            } else {
                lines += char_count.div_ceil(wrap_width) as u16;
            }
        }
        lines + 1 // blank line after the message
    }
}
