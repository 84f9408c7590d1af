use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Wire-format message for the chat-completions API: a role string
/// ("system", "user" or "assistant") plus the text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A completion backend: turns an ordered message list into a reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request one full reply for the given context.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Streaming variant: forwards reply fragments into `tx` as they arrive
    /// and returns the full concatenated reply. Backends without streaming
    /// support deliver the whole reply as a single fragment.
    async fn complete_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tx: UnboundedSender<String>,
    ) -> Result<String> {
        let reply = self.complete(model, messages).await?;
        // The receiver may already be gone; the reply is still the result
        let _ = tx.send(reply.clone());
        Ok(reply)
    }
}
