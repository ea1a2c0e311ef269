//! services/bot/src/web/transport.rs
//!
//! A `ChatTransport` that collects the replies of one HTTP interaction so they
//! can be returned in the response body.

use async_trait::async_trait;
use originality_core::ports::{ChatTransport, PortError, PortResult};
use originality_core::{MessageId, OutboundMessage};
use std::sync::Mutex;

#[derive(Default)]
pub struct BufferedTransport {
    inner: Mutex<Buffer>,
}

#[derive(Default)]
struct Buffer {
    next_id: u64,
    messages: Vec<(MessageId, OutboundMessage)>,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages still visible, in the order they were sent.
    pub fn into_messages(self) -> Vec<OutboundMessage> {
        let buffer = self
            .inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buffer.messages.into_iter().map(|(_, m)| m).collect()
    }
}

fn poisoned() -> PortError {
    PortError::Unexpected("reply buffer lock poisoned".to_string())
}

#[async_trait]
impl ChatTransport for BufferedTransport {
    async fn send(&self, _conversation_id: &str, message: OutboundMessage) -> PortResult<MessageId> {
        let mut buffer = self.inner.lock().map_err(|_| poisoned())?;
        buffer.next_id += 1;
        let id = MessageId(buffer.next_id);
        buffer.messages.push((id, message));
        Ok(id)
    }

    /// Transient notices are dropped from the response.
    async fn delete(&self, _conversation_id: &str, message_id: MessageId) -> PortResult<()> {
        let mut buffer = self.inner.lock().map_err(|_| poisoned())?;
        let before = buffer.messages.len();
        buffer.messages.retain(|(id, _)| *id != message_id);
        if buffer.messages.len() == before {
            return Err(PortError::NotFound(format!("message {}", message_id.0)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleted_notices_are_not_returned() {
        let transport = BufferedTransport::new();
        let notice = transport
            .send("chat-1", OutboundMessage::text("working"))
            .await
            .unwrap();
        transport
            .send("chat-1", OutboundMessage::text("done"))
            .await
            .unwrap();
        transport.delete("chat-1", notice).await.unwrap();
        assert!(transport.delete("chat-1", notice).await.is_err());

        let messages = transport.into_messages();
        assert_eq!(messages, vec![OutboundMessage::text("done")]);
    }
}
