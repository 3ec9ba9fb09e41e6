use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RelayError;

/// Opaque ID types for type safety
pub type SessionId = String;
pub type UserId = String;
pub type MessageId = u64;

/// Prefix joined with the room name to form its group key
pub const GROUP_KEY_PREFIX: &str = "chat_";

/// Group keys must stay below this many characters
const MAX_GROUP_KEY_LEN: usize = 100;

/// Longest room name that still yields a valid group key
pub const MAX_ROOM_NAME_LEN: usize = MAX_GROUP_KEY_LEN - GROUP_KEY_PREFIX.len() - 1;

/// A validated room identifier.
///
/// Only ASCII letters, digits, hyphens, underscores and periods are allowed, so the
/// derived group key never needs escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        if raw.is_empty() || raw.len() > MAX_ROOM_NAME_LEN {
            return Err(RelayError::RoomIdentifierInvalid(raw.to_string()));
        }
        if !raw.chars().all(is_group_char) {
            return Err(RelayError::RoomIdentifierInvalid(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey(format!("{}{}", GROUP_KEY_PREFIX, self.0))
    }
}

fn is_group_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl TryFrom<String> for RoomName {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomName> for String {
    fn from(room: RoomName) -> Self {
        room.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry-internal identifier of a room's membership set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the room a group key was derived from
    pub fn room(&self) -> Option<&str> {
        self.0.strip_prefix(GROUP_KEY_PREFIX)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Plain `{"message": ...}` relay with no persistence
    Simple,
    /// `fetch_messages` / `new_message` commands backed by the message store
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub room: RoomName,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_accepts_group_safe_names() {
        for name in ["lobby", "room-1", "a.b_c", "X"] {
            assert!(RoomName::parse(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_room_name_rejects_unsafe_names() {
        for name in ["", "with space", "slash/room", "ümlaut", "semi;colon"] {
            let err = RoomName::parse(name).unwrap_err();
            assert!(matches!(err, RelayError::RoomIdentifierInvalid(_)));
        }
    }

    #[test]
    fn test_room_name_length_limit() {
        let longest = "a".repeat(MAX_ROOM_NAME_LEN);
        let room = RoomName::parse(&longest).unwrap();
        assert!(room.group_key().as_str().len() < MAX_GROUP_KEY_LEN);

        let too_long = "a".repeat(MAX_ROOM_NAME_LEN + 1);
        assert!(RoomName::parse(&too_long).is_err());
    }

    #[test]
    fn test_group_key_is_prefixed() {
        let room = RoomName::parse("lobby").unwrap();
        let key = room.group_key();
        assert_eq!(key.as_str(), "chat_lobby");
        assert_eq!(key.room(), Some("lobby"));
    }

    #[test]
    fn test_room_name_deserialize_validates() {
        assert!(serde_json::from_str::<RoomName>("\"lobby\"").is_ok());
        assert!(serde_json::from_str::<RoomName>("\"bad room\"").is_err());
    }
}
