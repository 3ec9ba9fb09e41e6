//! Connection session
//!
//! One [`ChatSession`] per WebSocket, registered before the upgrade is accepted.
//! It owns the connection's room membership and turns frames and relay events
//! into outbound envelopes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{RelayError, RelayResult};
use crate::protocol::{self, ServerMessage};
use crate::registry::{RelayEvent, SessionHandle};
use crate::state::AppState;
use crate::types::{GroupKey, Protocol, RoomName, SessionId};

use super::handlers;

/// Route parameter carrying the room identifier
pub const ROOM_PARAM: &str = "room_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Closed,
}

/// Extract and validate the room identifier from route parameters
pub fn room_from_route(params: &HashMap<String, String>) -> RelayResult<RoomName> {
    let raw = params
        .get(ROOM_PARAM)
        .ok_or(RelayError::MissingRouteParameter(ROOM_PARAM))?;
    RoomName::parse(raw)
}

pub struct ChatSession {
    id: SessionId,
    room: RoomName,
    group: GroupKey,
    status: SessionStatus,
    state: Arc<AppState>,
}

impl ChatSession {
    /// Join the room's group and return the session with its relay event queue
    pub async fn connect(
        state: Arc<AppState>,
        room: RoomName,
    ) -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (handle, events) = SessionHandle::channel();
        let group = room.group_key();
        let id = handle.id.clone();

        state.registry.join(&group, handle).await;
        tracing::info!("Session {} joined {}", id, group);

        let session = Self {
            id,
            room,
            group,
            status: SessionStatus::Open,
            state,
        };
        (session, events)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn protocol(&self) -> Protocol {
        self.state.config.protocol
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Leave the room's group. Safe to call more than once.
    pub async fn disconnect(&mut self, close_code: Option<u16>) {
        if self.status == SessionStatus::Closed {
            return;
        }
        self.status = SessionStatus::Closed;
        self.state.registry.leave(&self.group, &self.id).await;
        tracing::info!(
            "Session {} left {} (close code: {:?})",
            self.id,
            self.group,
            close_code
        );
    }

    /// Handle one text frame from the client.
    ///
    /// Returns the reply meant for this client only, if any. Room broadcasts come
    /// back through the relay event queue like everyone else's.
    pub async fn receive(&self, text: &str) -> RelayResult<Option<ServerMessage>> {
        if self.status == SessionStatus::Closed {
            tracing::debug!("Ignoring frame for closed session {}", self.id);
            return Ok(None);
        }

        let envelope = protocol::decode(text, self.protocol())?;
        handlers::handle_envelope(self, envelope).await
    }

    /// Turn a relay event into the envelope this client expects
    pub fn relay_event(&self, event: RelayEvent) -> Option<ServerMessage> {
        if self.status == SessionStatus::Closed {
            return None;
        }

        match event {
            RelayEvent::ChatMessage { message } => Some(ServerMessage::Chat { message }),
            RelayEvent::Envelope { message } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    fn simple_state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(RelayConfig {
            protocol: Protocol::Simple,
            ..RelayConfig::default()
        }))
    }

    fn params(room: &str) -> HashMap<String, String> {
        HashMap::from([(ROOM_PARAM.to_string(), room.to_string())])
    }

    #[test]
    fn test_room_from_route() {
        assert_eq!(room_from_route(&params("lobby")).unwrap().as_str(), "lobby");
        assert!(matches!(
            room_from_route(&HashMap::new()),
            Err(RelayError::MissingRouteParameter(ROOM_PARAM))
        ));
        assert!(matches!(
            room_from_route(&params("no spaces")),
            Err(RelayError::RoomIdentifierInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_update_membership() {
        let state = simple_state();
        let room = RoomName::parse("lobby").unwrap();

        let (mut session, _events) = ChatSession::connect(state.clone(), room.clone()).await;
        assert_eq!(session.status(), SessionStatus::Open);
        assert_eq!(state.registry.groups().await, vec![(room.group_key(), 1)]);

        session.disconnect(Some(1000)).await;
        session.disconnect(None).await;
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(state.registry.groups().await.is_empty());
    }

    #[tokio::test]
    async fn test_relay_event_shapes() {
        let state = simple_state();
        let (mut session, _events) =
            ChatSession::connect(state, RoomName::parse("lobby").unwrap()).await;

        let chat = session.relay_event(RelayEvent::ChatMessage {
            message: "hi".to_string(),
        });
        assert_eq!(
            chat,
            Some(ServerMessage::Chat {
                message: "hi".to_string()
            })
        );

        let passthrough = ServerMessage::Messages {
            messages: vec![],
            next_before: None,
        };
        let relayed = session.relay_event(RelayEvent::Envelope {
            message: passthrough.clone(),
        });
        assert_eq!(relayed, Some(passthrough));

        session.disconnect(None).await;
        assert!(session
            .relay_event(RelayEvent::ChatMessage {
                message: "late".to_string()
            })
            .is_none());
    }

    #[tokio::test]
    async fn test_closed_session_ignores_frames() {
        let state = simple_state();
        let (mut session, mut events) =
            ChatSession::connect(state, RoomName::parse("lobby").unwrap()).await;
        session.disconnect(None).await;

        let reply = session.receive(r#"{"message":"hi"}"#).await.unwrap();
        assert!(reply.is_none());
        assert!(events.try_recv().is_err());
    }
}
