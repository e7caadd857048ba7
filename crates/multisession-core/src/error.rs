//! Error types for multisession.

use thiserror::Error;

use crate::message::MediaKind;
use crate::SessionId;

/// Main error type for multisession operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A live session with fully loaded credentials already uses this id
    #[error("Session already exists: {0}")]
    SessionAlreadyExists(SessionId),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session id cannot be mapped to a credential directory
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Proxy URL could not be parsed
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    /// Failure reported by the protocol client collaborator
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message does not carry the requested media
    #[error("Message does not contain {kind}")]
    MediaNotFound {
        /// Media kind that was requested
        kind: MediaKind,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SessionId {
        SessionId::new("alice").unwrap()
    }

    #[test]
    fn test_session_already_exists_error() {
        let err = Error::SessionAlreadyExists(alice());
        assert_eq!(err.to_string(), "Session already exists: alice");
    }

    #[test]
    fn test_session_not_found_error() {
        let err = Error::SessionNotFound(alice());
        assert_eq!(err.to_string(), "Session not found: alice");
    }

    #[test]
    fn test_invalid_session_id_error() {
        let err = Error::InvalidSessionId("a_b".to_string());
        assert_eq!(err.to_string(), "Invalid session id: a_b");
    }

    #[test]
    fn test_media_not_found_error() {
        let err = Error::MediaNotFound {
            kind: MediaKind::Video,
        };
        assert_eq!(err.to_string(), "Message does not contain video");
    }

    #[test]
    fn test_protocol_error() {
        let err = Error::Protocol("stream errored".to_string());
        assert_eq!(err.to_string(), "Protocol error: stream errored");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
