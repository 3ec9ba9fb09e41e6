//! Message persistence
//!
//! The relay only talks to storage through [`MessageStore`]. [`MemoryStore`] keeps
//! everything in process and is what the server runs with by default.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{MessageId, RoomName, StoredMessage, User};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("Username cannot be empty")]
    EmptyUsername,
}

/// Persistence collaborator used by the command protocol
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every stored message across all rooms, in creation order
    async fn list_all_messages(&self) -> StoreResult<Vec<StoredMessage>>;

    /// One page of a room's history, oldest first.
    ///
    /// Returns the newest `limit` messages of `room` whose id is below `before`.
    async fn list_room_messages(
        &self,
        room: &RoomName,
        before: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<StoredMessage>>;

    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<User>>;

    async fn create_user(&self, username: &str) -> StoreResult<User>;

    /// Persist a message; the timestamp is assigned here
    async fn create_message(
        &self,
        room: &RoomName,
        author: &User,
        content: String,
    ) -> StoreResult<StoredMessage>;
}

#[derive(Default)]
struct Inner {
    messages: Vec<StoredMessage>,
    users: HashMap<String, User>,
    next_id: MessageId,
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn list_all_messages(&self) -> StoreResult<Vec<StoredMessage>> {
        Ok(self.inner.read().await.messages.clone())
    }

    async fn list_room_messages(
        &self,
        room: &RoomName,
        before: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        let mut page: Vec<StoredMessage> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| &m.room == room)
            .filter(|m| before.map_or(true, |cursor| m.id < cursor))
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        Ok(page)
    }

    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(name).cloned())
    }

    async fn create_user(&self, username: &str) -> StoreResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::EmptyUsername);
        }

        let mut inner = self.inner.write().await;
        if inner.users.contains_key(username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }

        let user = User {
            id: ulid::Ulid::new().to_string(),
            username: username.to_string(),
        };
        inner.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn create_message(
        &self,
        room: &RoomName,
        author: &User,
        content: String,
    ) -> StoreResult<StoredMessage> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;

        let message = StoredMessage {
            id: inner.next_id,
            room: room.clone(),
            author: author.username.clone(),
            content,
            timestamp: chrono::Utc::now(),
        };
        inner.messages.push(message.clone());
        Ok(message)
    }
}
