//! services/bot/src/web/state.rs
//!
//! Defines the application's shared state.

use originality_core::ports::DatabaseService;
use originality_core::Workflow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub db: Arc<dyn DatabaseService>,
    pub conversation_locks: ConversationLocks,
}

impl AppState {
    pub fn new(workflow: Arc<Workflow>, db: Arc<dyn DatabaseService>) -> Self {
        Self {
            workflow,
            db,
            conversation_locks: ConversationLocks::default(),
        }
    }
}

/// One async mutex per conversation, so that interactions in the same
/// conversation run one at a time while different conversations proceed
/// concurrently.
#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    /// Returns the lock for `conversation_id`, dropping entries nobody holds.
    pub async fn get(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|id, lock| id == conversation_id || Arc::strong_count(lock) > 1);
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_conversation_shares_a_lock() {
        let locks = ConversationLocks::default();
        let first = locks.get("chat-1").await;
        let second = locks.get("chat-1").await;
        assert!(Arc::ptr_eq(&first, &second));

        let _held = first.lock().await;
        assert!(second.try_lock().is_err());

        let other = locks.get("chat-2").await;
        assert!(other.try_lock().is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let locks = ConversationLocks::default();
        drop(locks.get("chat-1").await);
        let _kept = locks.get("chat-2").await;
        assert_eq!(locks.len().await, 1);
    }
}
