use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::models::ChatMessage;

pub const DEFAULT_SESSION: &str = "default_session";

/// Ordered chat turns of one session.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    messages: Mutex<Vec<ChatMessage>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.lock().clone()
    }

    /// Appends one user question and the answer given to it.
    pub fn record_turn(&self, query: &str, answer: &str) {
        let mut messages = self.messages.lock();
        messages.push(ChatMessage::user(query));
        messages.push(ChatMessage::assistant(answer));
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

/// In-process session id → memory map. Sessions live until restart.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<ConversationMemory>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory for `session_id`, or the shared default session when absent.
    pub fn get_or_create(&self, session_id: Option<&str>) -> Arc<ConversationMemory> {
        let id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_SESSION);

        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(ConversationMemory::new()))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
