//! Wire message types exchanged with the protocol client.
//!
//! Message bodies stay opaque JSON: only the fields the session layer routes
//! on (key, media presence, delivery status) are typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Addressing information of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Chat the message belongs to
    pub remote_jid: Option<String>,
    /// Whether this process's account sent the message
    #[serde(default)]
    pub from_me: bool,
    /// Message identifier
    pub id: Option<String>,
    /// Sender inside a group chat
    pub participant: Option<String>,
}

/// A message as delivered by a messages-upsert event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message addressing
    pub key: MessageKey,
    /// Display name of the sender
    pub push_name: Option<String>,
    /// Unix timestamp (seconds)
    pub message_timestamp: Option<i64>,
    /// Opaque message content, keyed by content type (`imageMessage`, ...)
    pub message: Option<Value>,
}

impl WireMessage {
    /// Check whether the content carries media of the given kind.
    pub fn has_media(&self, kind: MediaKind) -> bool {
        self.message
            .as_ref()
            .and_then(|content| content.get(kind.content_field()))
            .is_some_and(|media| !media.is_null())
    }
}

/// Status payload of a message update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFields {
    /// Numeric delivery status code
    pub status: Option<i32>,
}

/// A message update as delivered by a messages-update event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessageUpdate {
    /// Key of the updated message
    pub key: MessageKey,
    /// Changed fields
    pub update: UpdateFields,
}

/// Media kinds a received message can be saved as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Image attachment
    Image,
    /// Video attachment
    Video,
    /// Document attachment
    Document,
}

impl MediaKind {
    /// Field of the message content that holds this media.
    pub fn content_field(self) -> &'static str {
        match self {
            MediaKind::Image => "imageMessage",
            MediaKind::Video => "videoMessage",
            MediaKind::Document => "documentMessage",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        };
        f.write_str(name)
    }
}

/// Human-readable delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Delivery failed, or the status code is unknown
    Error,
    /// Not yet acknowledged by the server
    Pending,
    /// Acknowledged by the server
    Server,
    /// Delivered to the recipient device
    Delivered,
    /// Read by the recipient
    Read,
    /// Voice or video note played by the recipient
    Played,
}

impl MessageStatus {
    /// Map a numeric status code to its readable form.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MessageStatus::Pending,
            2 => MessageStatus::Server,
            3 => MessageStatus::Delivered,
            4 => MessageStatus::Read,
            5 => MessageStatus::Played,
            _ => MessageStatus::Error,
        }
    }

    /// Lowercase name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Error => "error",
            MessageStatus::Pending => "pending",
            MessageStatus::Server => "server",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Played => "played",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
