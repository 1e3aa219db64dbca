//! In-memory per-client conversation history.
//!
//! Each client id has its own FIFO of [`Turn`]s capped at a configurable
//! length; once full, the oldest turn is dropped. History outlives
//! connections, so a client that reconnects with the same id continues the
//! same conversation.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

/// Default maximum number of turns kept per client.
const DEFAULT_MAX_TURNS: usize = 50;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Text the client sent.
    User,
    /// Reply the server produced.
    Assistant,
}

/// One entry in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Who produced it.
    pub role: Role,
    /// The full text.
    pub text: String,
}

/// Conversation history for all clients.
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, VecDeque<Turn>>>,
    max_turns: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Creates an empty store with the default per-client limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_turns(DEFAULT_MAX_TURNS)
    }

    /// Creates an empty store keeping at most `max_turns` per client.
    #[must_use]
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    /// Appends a turn for `client_id`, returning the conversation length.
    pub async fn append(&self, client_id: &str, role: Role, text: &str) -> usize {
        let mut conversations = self.conversations.write().await;
        let turns = conversations.entry(client_id.to_string()).or_default();
        turns.push_back(Turn {
            role,
            text: text.to_string(),
        });
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
        turns.len()
    }

    /// Returns a copy of the conversation for `client_id`, oldest first.
    pub async fn turns(&self, client_id: &str) -> Vec<Turn> {
        let conversations = self.conversations.read().await;
        conversations
            .get(client_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forgets the conversation for `client_id`.
    pub async fn clear(&self, client_id: &str) {
        self.conversations.write().await.remove(client_id);
    }
}
