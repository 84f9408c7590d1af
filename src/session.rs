use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedSender;

use crate::memory::{AgentIdentity, ConversationStore, Role, Turn};
use crate::provider::{ChatMessage, CompletionClient};

/// Orchestrates one exchange cycle: assemble the outbound context, delegate
/// to the completion backend, and record the completed exchange.
///
/// Each `send_message` call is atomic with respect to the log: either both
/// turns (user then assistant) are appended, or neither is. The session
/// carries no other per-call state.
pub struct ChatSession<C: CompletionClient> {
    identity: AgentIdentity,
    store: ConversationStore,
    client: C,
    model: String,
}

impl<C: CompletionClient> ChatSession<C> {
    pub fn new(identity: AgentIdentity, store: ConversationStore, client: C, model: String) -> Self {
        Self {
            identity,
            store,
            client,
            model,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn projection(&self) -> Vec<ChatMessage> {
        self.store.projection()
    }

    /// Empty the conversation, optionally purging the durable file.
    /// Returns whether the durable copy was removed.
    pub fn clear(&mut self, purge_file: bool) -> bool {
        self.store.clear(purge_file)
    }

    /// Full outbound context: persona as the system message, then every
    /// stored turn in order, then the new user message. The whole history
    /// is sent on every call; context length grows with the conversation,
    /// a known scaling limit of this design.
    pub fn build_context(&self, user_text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.store.len() + 2);
        messages.push(ChatMessage::system(&self.identity.persona));
        messages.extend(self.store.projection());
        messages.push(ChatMessage::user(user_text));
        messages
    }

    /// Send one user message and return the bot's reply.
    pub async fn send_message(&mut self, user_text: &str) -> Result<String> {
        let context = self.build_context(user_text);
        let reply = self
            .client
            .complete(&self.model, &context)
            .await
            .context("completion request failed")?;
        self.record_exchange(user_text, &reply)?;
        Ok(reply)
    }

    /// Streaming variant of `send_message`: reply fragments are forwarded
    /// into `tx` for incremental display; only the final concatenated text
    /// is recorded.
    pub async fn send_message_streamed(
        &mut self,
        user_text: &str,
        tx: UnboundedSender<String>,
    ) -> Result<String> {
        let context = self.build_context(user_text);
        let reply = self
            .client
            .complete_stream(&self.model, &context, tx)
            .await
            .context("completion request failed")?;
        self.record_exchange(user_text, &reply)?;
        Ok(reply)
    }

    // Both turns land in the log only after the backend succeeded, so a
    // failed call leaves no trace. A persist failure keeps the in-memory
    // turns; the durable copy is stale until the next successful save.
    fn record_exchange(&mut self, user_text: &str, reply: &str) -> Result<()> {
        self.store.append(Turn::now(Role::User, user_text));
        self.store.append(Turn::now(Role::Assistant, reply));
        self.store.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tempfile::tempdir;

    /// Backend stub: returns a canned reply (or fails) and records the
    /// message list it was called with.
    struct StubClient {
        reply: Option<String>,
        seen: Arc<Mutex<Vec<ChatMessage>>>,
    }

    impl StubClient {
        fn replying(reply: &str) -> (Self, Arc<Mutex<Vec<ChatMessage>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let client = Self {
                reply: Some(reply.to_string()),
                seen: seen.clone(),
            };
            (client, seen)
        }

        fn failing() -> Self {
            Self {
                reply: None,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String> {
            *self.seen.lock().unwrap() = messages.to_vec();
            self.reply
                .clone()
                .ok_or_else(|| anyhow!("provider unavailable"))
        }
    }

    fn session_in(
        dir: &std::path::Path,
        client: StubClient,
    ) -> ChatSession<StubClient> {
        let identity = AgentIdentity::new("bot", "You are bot.");
        let store = ConversationStore::load(dir, "bot");
        ChatSession::new(identity, store, client, "test-model".to_string())
    }

    #[tokio::test]
    async fn successful_exchange_appends_two_turns() {
        let dir = tempdir().unwrap();
        let (client, _) = StubClient::replying("hi!");
        let mut session = session_in(dir.path(), client);

        let reply = session.send_message("hello").await.unwrap();
        assert_eq!(reply, "hi!");

        let log = session.projection();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, "user");
        assert_eq!(log[0].content, "hello");
        assert_eq!(log[1].role, "assistant");
        assert_eq!(log[1].content, "hi!");
    }

    #[tokio::test]
    async fn successful_exchange_persists_to_disk() {
        let dir = tempdir().unwrap();
        let (client, _) = StubClient::replying("hi!");
        let mut session = session_in(dir.path(), client);
        session.send_message("hello").await.unwrap();

        let reloaded = ConversationStore::load(dir.path(), "bot");
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn failed_exchange_leaves_log_unchanged() {
        let dir = tempdir().unwrap();
        let mut session = session_in(dir.path(), StubClient::failing());
        session.send_message("first").await.unwrap_err();

        assert!(session.projection().is_empty());
        // Nothing reached disk either
        let reloaded = ConversationStore::load(dir.path(), "bot");
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn context_is_persona_then_history_then_input() {
        let dir = tempdir().unwrap();
        let (client, seen) = StubClient::replying("B");
        let mut session = session_in(dir.path(), client);

        session.send_message("A").await.unwrap();
        session.send_message("X").await.unwrap();

        let sent = seen.lock().unwrap().clone();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], ChatMessage::system("You are bot."));
        assert_eq!(sent[1], ChatMessage::user("A"));
        assert_eq!(sent[2], ChatMessage::assistant("B"));
        assert_eq!(sent[3], ChatMessage::user("X"));
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_to_recorded_reply() {
        let dir = tempdir().unwrap();
        let (client, _) = StubClient::replying("streamed reply");
        let mut session = session_in(dir.path(), client);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reply = session.send_message_streamed("hello", tx).await.unwrap();
        assert_eq!(reply, "streamed reply");

        // Default streaming falls back to one fragment carrying the full text
        let mut collected = String::new();
        while let Ok(fragment) = rx.try_recv() {
            collected.push_str(&fragment);
        }
        assert_eq!(collected, reply);
        assert_eq!(session.projection().last().unwrap().content, reply);
    }

    #[tokio::test]
    async fn clear_empties_log_for_next_exchange() {
        let dir = tempdir().unwrap();
        let (client, seen) = StubClient::replying("ok");
        let mut session = session_in(dir.path(), client);

        session.send_message("remember this").await.unwrap();
        session.clear(true);
        assert!(session.projection().is_empty());

        session.send_message("fresh start").await.unwrap();
        // History was gone, so only persona + new input went out
        let sent = seen.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
    }
}
