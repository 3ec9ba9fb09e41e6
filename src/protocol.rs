//! Wire codec
//!
//! Converts between WebSocket text frames and the envelopes exchanged with clients.
//! Inbound frames are decoded by hand so that each failure maps onto a precise
//! [`RelayError`]; outbound frames are plain serde.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelayError, RelayResult};
use crate::types::{MessageId, Protocol, StoredMessage};

/// Envelope sent by a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClientEnvelope {
    /// Simple protocol: `{"message": ...}`
    Chat { message: String },
    /// Command protocol: `{"command": ..., ...}`
    Command(Command),
}

/// Commands understood by the command protocol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    FetchMessages {
        /// Only return messages older than this id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<MessageId>,
    },
    NewMessage {
        from: String,
        message: String,
    },
}

impl Command {
    pub const FETCH_MESSAGES: &'static str = "fetch_messages";
    pub const NEW_MESSAGE: &'static str = "new_message";

    pub fn name(&self) -> &'static str {
        match self {
            Command::FetchMessages { .. } => Self::FETCH_MESSAGES,
            Command::NewMessage { .. } => Self::NEW_MESSAGE,
        }
    }
}

/// Marker serialized as `"command": "new_message"` on broadcasts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastCommand {
    NewMessage,
}

/// Wire view of a stored message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub author: String,
    pub content: String,
    pub timestamp: String,
}

impl From<&StoredMessage> for MessageView {
    fn from(message: &StoredMessage) -> Self {
        Self {
            author: message.author.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

/// Envelope sent to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Room broadcast of a freshly stored message
    NewMessage {
        command: BroadcastCommand,
        message: MessageView,
    },
    /// History reply, sent to the requester only.
    ///
    /// `next_before` is the cursor for the next older page, absent once the
    /// history is exhausted.
    Messages {
        messages: Vec<MessageView>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_before: Option<MessageId>,
    },
    /// Simple protocol broadcast
    Chat { message: String },
    /// Per-frame failure, sent to the requester only
    Error { error: ErrorBody },
}

impl ServerMessage {
    pub fn new_message(message: &StoredMessage) -> Self {
        ServerMessage::NewMessage {
            command: BroadcastCommand::NewMessage,
            message: message.into(),
        }
    }

    pub fn history(messages: &[StoredMessage], next_before: Option<MessageId>) -> Self {
        ServerMessage::Messages {
            messages: messages.iter().map(MessageView::from).collect(),
            next_before,
        }
    }

    pub fn error(err: &RelayError) -> Self {
        ServerMessage::Error {
            error: ErrorBody {
                code: err.code().to_string(),
                msg: err.to_string(),
            },
        }
    }
}

/// Decode a client frame according to the protocol the server speaks
pub fn decode(text: &str, protocol: Protocol) -> RelayResult<ClientEnvelope> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RelayError::MalformedPayload(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(RelayError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    };

    match protocol {
        Protocol::Simple => Ok(ClientEnvelope::Chat {
            message: required_str(&fields, "message")?,
        }),
        Protocol::Command => decode_command(&fields).map(ClientEnvelope::Command),
    }
}

fn decode_command(fields: &Map<String, Value>) -> RelayResult<Command> {
    let name = required_str(fields, "command")?;
    match name.as_str() {
        Command::FETCH_MESSAGES => {
            let before = match fields.get("before") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_u64().ok_or_else(|| {
                    RelayError::MalformedPayload("field `before` must be a message id".to_string())
                })?),
            };
            Ok(Command::FetchMessages { before })
        }
        Command::NEW_MESSAGE => Ok(Command::NewMessage {
            from: required_str(fields, "from")?,
            message: required_str(fields, "message")?,
        }),
        _ => Err(RelayError::UnknownCommand(name)),
    }
}

fn required_str(fields: &Map<String, Value>, key: &'static str) -> RelayResult<String> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(RelayError::MissingField(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RelayError::MalformedPayload(format!(
            "field `{}` must be a string",
            key
        ))),
    }
}

/// Encode any envelope as a text frame
pub fn encode<T: Serialize>(envelope: &T) -> serde_json::Result<String> {
    serde_json::to_string(envelope)
}

/// Decode a server frame (used by clients and tests)
pub fn decode_server(text: &str) -> RelayResult<ServerMessage> {
    serde_json::from_str(text).map_err(|e| RelayError::MalformedPayload(e.to_string()))
}
