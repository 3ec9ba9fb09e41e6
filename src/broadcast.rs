use crate::protocol::ServerMessage;
use crate::registry::{Delivery, RelayEvent, RoomRegistry};
use crate::types::RoomName;

/// Relay a plain chat message to everyone in the room, sender included
pub async fn broadcast_chat(
    registry: &dyn RoomRegistry,
    room: &RoomName,
    message: String,
) -> Delivery {
    publish(registry, room, RelayEvent::ChatMessage { message }).await
}

/// Relay a ready-made envelope to everyone in the room
pub async fn broadcast_envelope(
    registry: &dyn RoomRegistry,
    room: &RoomName,
    message: ServerMessage,
) -> Delivery {
    publish(registry, room, RelayEvent::Envelope { message }).await
}

async fn publish(registry: &dyn RoomRegistry, room: &RoomName, event: RelayEvent) -> Delivery {
    let delivery = registry.publish(&room.group_key(), event).await;

    if delivery.failed > 0 {
        tracing::warn!(
            room = %room,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Some room members could not be reached"
        );
    } else {
        tracing::debug!(room = %room, delivered = delivery.delivered, "Relayed event");
    }

    delivery
}
