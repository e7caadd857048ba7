//! Session events delivered to listeners.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::message::{MediaKind, MessageKey, MessageStatus, WireMessage, WireMessageUpdate};
use crate::protocol::Connection;
use crate::{Error, Result, SessionId};

/// Kinds of events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A new QR payload is ready to be scanned
    QrUpdated,
    /// A connection attempt started
    Connecting,
    /// The connection opened
    Connected,
    /// The session ended for good
    Disconnected,
    /// A message arrived
    MessageReceived,
    /// A message changed delivery status
    MessageUpdated,
    /// A pairing code was issued
    PairingCode,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 7] = [
        EventKind::QrUpdated,
        EventKind::Connecting,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::MessageReceived,
        EventKind::MessageUpdated,
        EventKind::PairingCode,
    ];
}

/// QR payload emitted for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrUpdate {
    /// Session the QR belongs to
    pub session_id: SessionId,
    /// QR payload
    pub qr: String,
}

/// Pairing code issued for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    /// Session the code belongs to
    pub session_id: SessionId,
    /// Code to enter on the phone
    pub code: String,
}

/// A received message tagged with its session.
///
/// Carries the connection that received it so media can be saved lazily.
#[derive(Clone)]
pub struct ReceivedMessage {
    /// Session the message arrived on
    pub session_id: SessionId,
    /// The message itself
    pub message: WireMessage,
    connection: Arc<dyn Connection>,
}

impl ReceivedMessage {
    /// Tag a message with its session and the connection that received it.
    pub fn new(session_id: SessionId, message: WireMessage, connection: Arc<dyn Connection>) -> Self {
        Self {
            session_id,
            message,
            connection,
        }
    }

    /// Save the attached image to `path`.
    pub async fn save_image(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_media(MediaKind::Image, path.as_ref()).await
    }

    /// Save the attached video to `path`.
    pub async fn save_video(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_media(MediaKind::Video, path.as_ref()).await
    }

    /// Save the attached document to `path`.
    pub async fn save_document(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_media(MediaKind::Document, path.as_ref()).await
    }

    async fn save_media(&self, kind: MediaKind, path: &Path) -> Result<()> {
        if !self.message.has_media(kind) {
            return Err(Error::MediaNotFound { kind });
        }

        let bytes = self.connection.download_media(&self.message).await?;
        debug!(
            session_id = %self.session_id,
            "Saving {} ({} bytes) to {}",
            kind,
            bytes.len(),
            path.display()
        );
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("session_id", &self.session_id)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A message status update enriched with its session and readable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdated {
    /// Session the update arrived on
    pub session_id: SessionId,
    /// Readable delivery status
    pub message_status: MessageStatus,
    /// Key of the updated message
    pub key: MessageKey,
    /// Raw numeric status, if the update carried one
    pub status_code: Option<i32>,
}

impl MessageUpdated {
    /// Enrich a wire update. A missing status code reads as an error status.
    pub fn new(session_id: SessionId, update: WireMessageUpdate) -> Self {
        let status_code = update.update.status;
        Self {
            session_id,
            message_status: MessageStatus::from_code(status_code.unwrap_or_default()),
            key: update.key,
            status_code,
        }
    }
}

/// An event as seen by listeners.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// New QR payload
    QrUpdated(QrUpdate),
    /// Connection attempt started
    Connecting(SessionId),
    /// Connection opened
    Connected(SessionId),
    /// Session ended for good
    Disconnected(SessionId),
    /// Message arrived
    MessageReceived(ReceivedMessage),
    /// Message status changed
    MessageUpdated(MessageUpdated),
    /// Pairing code issued
    PairingCode(PairingCode),
}

impl SessionEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::QrUpdated(_) => EventKind::QrUpdated,
            SessionEvent::Connecting(_) => EventKind::Connecting,
            SessionEvent::Connected(_) => EventKind::Connected,
            SessionEvent::Disconnected(_) => EventKind::Disconnected,
            SessionEvent::MessageReceived(_) => EventKind::MessageReceived,
            SessionEvent::MessageUpdated(_) => EventKind::MessageUpdated,
            SessionEvent::PairingCode(_) => EventKind::PairingCode,
        }
    }

    /// Session that produced this event.
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::QrUpdated(qr) => &qr.session_id,
            SessionEvent::Connecting(id)
            | SessionEvent::Connected(id)
            | SessionEvent::Disconnected(id) => id,
            SessionEvent::MessageReceived(msg) => &msg.session_id,
            SessionEvent::MessageUpdated(update) => &update.session_id,
            SessionEvent::PairingCode(code) => &code.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UpdateFields;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug)]
    struct StubConnection;

    #[async_trait]
    impl Connection for StubConnection {
        async fn request_pairing_code(&self, _phone_number: &str) -> Result<String> {
            Ok("ABCD1234".to_string())
        }

        async fn logout(&self) -> Result<()> {
            Ok(())
        }

        fn end(&self) {}

        async fn download_media(&self, _message: &WireMessage) -> Result<Vec<u8>> {
            Ok(b"media-bytes".to_vec())
        }
    }

    fn alice() -> SessionId {
        SessionId::new("alice").unwrap()
    }

    fn image_message() -> ReceivedMessage {
        let message = WireMessage {
            message: Some(json!({ "imageMessage": { "mimetype": "image/jpeg" } })),
            ..Default::default()
        };
        ReceivedMessage::new(alice(), message, Arc::new(StubConnection))
    }

    #[tokio::test]
    async fn test_save_image_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");

        image_message().save_image(&path).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"media-bytes");
    }

    #[tokio::test]
    async fn test_save_video_without_video_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");

        let result = image_message().save_video(&path).await;

        assert!(matches!(
            result,
            Err(Error::MediaNotFound {
                kind: MediaKind::Video
            })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_message_updated_enrichment() {
        let update = WireMessageUpdate {
            key: MessageKey {
                id: Some("ABC".to_string()),
                ..Default::default()
            },
            update: UpdateFields { status: Some(3) },
        };

        let enriched = MessageUpdated::new(alice(), update);
        assert_eq!(enriched.message_status, MessageStatus::Delivered);
        assert_eq!(enriched.status_code, Some(3));
        assert_eq!(enriched.key.id.as_deref(), Some("ABC"));

        let json = serde_json::to_value(&enriched).unwrap();
        assert_eq!(json["sessionId"], "alice");
        assert_eq!(json["messageStatus"], "delivered");
    }

    #[test]
    fn test_message_updated_without_status() {
        let enriched = MessageUpdated::new(alice(), WireMessageUpdate::default());
        assert_eq!(enriched.message_status, MessageStatus::Error);
        assert_eq!(enriched.status_code, None);
    }

    #[test]
    fn test_event_kind_and_session() {
        let event = SessionEvent::QrUpdated(QrUpdate {
            session_id: alice(),
            qr: "2@abc".to_string(),
        });
        assert_eq!(event.kind(), EventKind::QrUpdated);
        assert_eq!(event.session_id().as_str(), "alice");

        let event = SessionEvent::Disconnected(alice());
        assert_eq!(event.kind(), EventKind::Disconnected);
    }

    #[test]
    fn test_event_kinds_are_distinct() {
        let kinds: std::collections::HashSet<_> = EventKind::ALL.iter().collect();
        assert_eq!(kinds.len(), EventKind::ALL.len());
    }
}
