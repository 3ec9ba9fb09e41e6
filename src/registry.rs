//! Room registry
//!
//! Tracks which sessions belong to which group and fans relay events out to them.
//! [`LocalRegistry`] keeps membership in process memory; anything implementing
//! [`RoomRegistry`] (e.g. a shared pub/sub backend) can stand in for it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerMessage;
use crate::types::{GroupKey, SessionId};

/// Notification delivered to every member of a group on publish
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Plain text that each session wraps in its own envelope
    ChatMessage { message: String },
    /// A fully formed envelope passed through untouched
    Envelope { message: ServerMessage },
}

/// Address of a session inside the registry
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub sender: mpsc::UnboundedSender<RelayEvent>,
}

impl SessionHandle {
    /// Create a handle together with the queue its relay events land in
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            id: ulid::Ulid::new().to_string(),
            sender,
        };
        (handle, receiver)
    }
}

/// Outcome of a publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[async_trait]
pub trait RoomRegistry: Send + Sync {
    /// Add a session to a group, creating the group if needed.
    ///
    /// A session belongs to at most one group; joining moves it out of any previous one.
    async fn join(&self, group: &GroupKey, handle: SessionHandle);

    /// Remove a session from a group. Unknown groups or sessions are ignored.
    async fn leave(&self, group: &GroupKey, session: &SessionId);

    /// Deliver an event to every current member of a group
    async fn publish(&self, group: &GroupKey, event: RelayEvent) -> Delivery;

    /// Groups with at least one member, and their sizes
    async fn groups(&self) -> Vec<(GroupKey, usize)>;
}

#[derive(Default)]
struct Membership {
    groups: HashMap<GroupKey, HashMap<SessionId, mpsc::UnboundedSender<RelayEvent>>>,
    /// Reverse index enforcing single-group membership
    session_group: HashMap<SessionId, GroupKey>,
}

impl Membership {
    fn remove(&mut self, group: &GroupKey, session: &SessionId) -> bool {
        let Some(members) = self.groups.get_mut(group) else {
            return false;
        };
        let removed = members.remove(session).is_some();
        if members.is_empty() {
            self.groups.remove(group);
        }
        if removed {
            self.session_group.remove(session);
        }
        removed
    }
}

/// Single-process registry
#[derive(Default)]
pub struct LocalRegistry {
    inner: RwLock<Membership>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn member_count(&self, group: &GroupKey) -> usize {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl RoomRegistry for LocalRegistry {
    async fn join(&self, group: &GroupKey, handle: SessionHandle) {
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.session_group.get(&handle.id).cloned() {
            if &previous != group {
                tracing::debug!(
                    "Session {} moved from {} to {}",
                    handle.id,
                    previous,
                    group
                );
                inner.remove(&previous, &handle.id);
            }
        }

        inner
            .session_group
            .insert(handle.id.clone(), group.clone());
        inner
            .groups
            .entry(group.clone())
            .or_default()
            .insert(handle.id, handle.sender);
    }

    async fn leave(&self, group: &GroupKey, session: &SessionId) {
        let removed = self.inner.write().await.remove(group, session);
        if !removed {
            tracing::debug!("Session {} was not a member of {}", session, group);
        }
    }

    async fn publish(&self, group: &GroupKey, event: RelayEvent) -> Delivery {
        let inner = self.inner.read().await;
        let mut delivery = Delivery::default();

        let Some(members) = inner.groups.get(group) else {
            return delivery;
        };

        for (session, sender) in members {
            // A closed queue means the session is gone but has not left yet
            if sender.send(event.clone()).is_ok() {
                delivery.delivered += 1;
            } else {
                tracing::debug!("Dropping event for closed session {}", session);
                delivery.failed += 1;
            }
        }

        delivery
    }

    async fn groups(&self) -> Vec<(GroupKey, usize)> {
        let inner = self.inner.read().await;
        let mut groups: Vec<_> = inner
            .groups
            .iter()
            .map(|(key, members)| (key.clone(), members.len()))
            .collect();
        groups.sort();
        groups
    }
}
