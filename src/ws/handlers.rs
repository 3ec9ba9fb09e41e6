//! Frame dispatch
//!
//! Routes decoded client envelopes to the matching handler.

use std::sync::Arc;

use crate::broadcast;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{ClientEnvelope, Command, ServerMessage};
use crate::state::AppState;
use crate::types::{MessageId, RoomName};

use super::session::ChatSession;

/// Handle a decoded envelope and return the reply for the sender, if any
pub async fn handle_envelope(
    session: &ChatSession,
    envelope: ClientEnvelope,
) -> RelayResult<Option<ServerMessage>> {
    let state = session.state();
    let room = session.room();

    match envelope {
        ClientEnvelope::Chat { message } => {
            handle_chat_message(state, room, message).await;
            Ok(None)
        }

        ClientEnvelope::Command(command) => handle_command(state, room, command).await,
    }
}

async fn handle_command(
    state: &Arc<AppState>,
    room: &RoomName,
    command: Command,
) -> RelayResult<Option<ServerMessage>> {
    tracing::debug!("Command {} in {}", command.name(), room);

    match command {
        Command::FetchMessages { before } => {
            handle_fetch_messages(state, room, before).await.map(Some)
        }

        Command::NewMessage { from, message } => {
            handle_new_message(state, room, from, message).await?;
            Ok(None)
        }
    }
}

/// Forward a plain message to the whole room
pub async fn handle_chat_message(state: &Arc<AppState>, room: &RoomName, message: String) {
    tracing::debug!("Chat message in {}: {}", room, message);
    broadcast::broadcast_chat(state.registry.as_ref(), room, message).await;
}

/// Load one page of the room's history for the requester, with the cursor
/// for the next older page when there is one
pub async fn handle_fetch_messages(
    state: &Arc<AppState>,
    room: &RoomName,
    before: Option<MessageId>,
) -> RelayResult<ServerMessage> {
    let limit = state.config.history_page_size;
    // One extra row tells us whether an older page exists
    let mut messages = state
        .store
        .list_room_messages(room, before, limit.saturating_add(1))
        .await?;
    let has_older = messages.len() > limit;
    if has_older {
        messages.remove(0);
    }
    let next_before = if has_older {
        messages.first().map(|m| m.id)
    } else {
        None
    };

    tracing::debug!(
        "Fetched {} messages for {} (before: {:?}, next: {:?})",
        messages.len(),
        room,
        before,
        next_before
    );
    Ok(ServerMessage::history(&messages, next_before))
}

/// Persist a message from a known user and broadcast it to the room
pub async fn handle_new_message(
    state: &Arc<AppState>,
    room: &RoomName,
    from: String,
    content: String,
) -> RelayResult<()> {
    let author = state
        .store
        .find_user_by_name(&from)
        .await?
        .ok_or(RelayError::UserNotFound(from))?;

    let stored = state.store.create_message(room, &author, content).await?;
    tracing::info!(
        "Message {} from {} stored in {}",
        stored.id,
        stored.author,
        room
    );

    broadcast::broadcast_envelope(
        state.registry.as_ref(),
        room,
        ServerMessage::new_message(&stored),
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::registry::RelayEvent;
    use crate::types::Protocol;

    async fn command_state() -> Arc<AppState> {
        let state = Arc::new(AppState::in_memory(RelayConfig {
            protocol: Protocol::Command,
            history_page_size: 3,
            ..RelayConfig::default()
        }));
        state.store.create_user("alice").await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_new_message_requires_known_user() {
        let state = command_state().await;
        let room = RoomName::parse("lobby").unwrap();

        let err = handle_new_message(&state, &room, "mallory".to_string(), "hi".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UserNotFound(ref name) if name == "mallory"));
        assert!(state.store.list_all_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_message_is_stored_and_broadcast() {
        let state = command_state().await;
        let room = RoomName::parse("lobby").unwrap();
        let (session, mut events) = ChatSession::connect(state.clone(), room.clone()).await;

        handle_new_message(&state, &room, "alice".to_string(), "hello".to_string())
            .await
            .unwrap();

        let stored = state.store.list_all_messages().await.unwrap();
        assert_eq!(stored.len(), 1);

        match session.relay_event(events.try_recv().unwrap()) {
            Some(ServerMessage::NewMessage { message, .. }) => {
                assert_eq!(message.author, "alice");
                assert_eq!(message.content, "hello");
                assert_eq!(message.timestamp, stored[0].timestamp.to_rfc3339());
            }
            other => panic!("Expected NewMessage, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_messages_is_paged() {
        let state = command_state().await;
        let room = RoomName::parse("lobby").unwrap();

        for i in 0..5 {
            handle_new_message(&state, &room, "alice".to_string(), format!("m{}", i))
                .await
                .unwrap();
        }

        let reply = handle_fetch_messages(&state, &room, None).await.unwrap();
        match reply {
            ServerMessage::Messages { messages, .. } => {
                let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
                assert_eq!(contents, vec!["m2", "m3", "m4"]);
            }
            other => panic!("Expected Messages, got {:?}", other),
        }
    }

    fn page(reply: ServerMessage) -> (Vec<String>, Option<MessageId>) {
        match reply {
            ServerMessage::Messages {
                messages,
                next_before,
            } => (
                messages.into_iter().map(|m| m.content).collect(),
                next_before,
            ),
            other => panic!("Expected Messages, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_messages_cursor_reaches_older_pages() {
        let state = command_state().await;
        let room = RoomName::parse("lobby").unwrap();

        for i in 0..7 {
            handle_new_message(&state, &room, "alice".to_string(), format!("m{}", i))
                .await
                .unwrap();
        }

        let (newest, cursor) = page(handle_fetch_messages(&state, &room, None).await.unwrap());
        assert_eq!(newest, vec!["m4", "m5", "m6"]);
        assert!(cursor.is_some());

        let (middle, cursor) = page(handle_fetch_messages(&state, &room, cursor).await.unwrap());
        assert_eq!(middle, vec!["m1", "m2", "m3"]);
        assert!(cursor.is_some());

        let (oldest, cursor) = page(handle_fetch_messages(&state, &room, cursor).await.unwrap());
        assert_eq!(oldest, vec!["m0"]);
        assert_eq!(cursor, None);
    }

    #[tokio::test]
    async fn test_fetch_messages_full_last_page_has_no_cursor() {
        let state = command_state().await;
        let room = RoomName::parse("lobby").unwrap();

        for i in 0..3 {
            handle_new_message(&state, &room, "alice".to_string(), format!("m{}", i))
                .await
                .unwrap();
        }

        let (messages, cursor) = page(handle_fetch_messages(&state, &room, None).await.unwrap());
        assert_eq!(messages, vec!["m0", "m1", "m2"]);
        assert_eq!(cursor, None);
    }

    #[tokio::test]
    async fn test_chat_message_reaches_room() {
        let state = command_state().await;
        let room = RoomName::parse("lobby").unwrap();
        let (_session, mut events) = ChatSession::connect(state.clone(), room.clone()).await;

        handle_chat_message(&state, &room, "hi".to_string()).await;
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::ChatMessage {
                message: "hi".to_string()
            }
        );
    }
}
