//! Protocol client collaborator seam.
//!
//! The messaging protocol (handshake, encryption, wire codec) lives outside this
//! workspace. These traits describe exactly what the session layer needs from
//! it: a way to open connections, the event stream each connection produces,
//! and the few operations a live connection supports.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message::{WireMessage, WireMessageUpdate};
use crate::{ProxyAgent, Result};

/// Protocol version negotiated with the service, e.g. `[2, 3000, 1015901307]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion(pub [u32; 3]);

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [major, minor, patch] = self.0;
        write!(f, "{major}.{minor}.{patch}")
    }
}

/// Reasons the service gives when it closes a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Connection closed by the service
    ConnectionClosed,
    /// Connection lost or timed out
    ConnectionLost,
    /// Another client opened a connection for the same account
    ConnectionReplaced,
    /// Credentials were revoked; the session cannot be resumed
    LoggedOut,
    /// Credential state is corrupt
    BadSession,
    /// Service asked the client to restart
    RestartRequired,
    /// Device list out of sync
    MultideviceMismatch,
    /// Access refused
    Forbidden,
    /// Service unavailable
    UnavailableService,
    /// Any code not listed above
    Unknown(u16),
}

impl DisconnectReason {
    /// Close code the service sends when the account logged this device out.
    pub const LOGGED_OUT_CODE: u16 = 401;

    /// Timeouts share code 408 with a lost connection.
    pub const TIMED_OUT: Self = DisconnectReason::ConnectionLost;

    /// Classify a numeric close code.
    pub fn from_code(code: u16) -> Self {
        match code {
            428 => DisconnectReason::ConnectionClosed,
            408 => DisconnectReason::ConnectionLost,
            440 => DisconnectReason::ConnectionReplaced,
            401 => DisconnectReason::LoggedOut,
            500 => DisconnectReason::BadSession,
            515 => DisconnectReason::RestartRequired,
            411 => DisconnectReason::MultideviceMismatch,
            403 => DisconnectReason::Forbidden,
            503 => DisconnectReason::UnavailableService,
            other => DisconnectReason::Unknown(other),
        }
    }

    /// Numeric close code of this reason.
    pub fn code(self) -> u16 {
        match self {
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionLost => 408,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::LoggedOut => Self::LOGGED_OUT_CODE,
            DisconnectReason::BadSession => 500,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::MultideviceMismatch => 411,
            DisconnectReason::Forbidden => 403,
            DisconnectReason::UnavailableService => 503,
            DisconnectReason::Unknown(code) => code,
        }
    }
}

/// Events produced by one connection, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Connection is being established
    Connecting,
    /// A new QR payload is available for pairing
    Qr(String),
    /// Connection is open
    Open,
    /// Connection closed; `code` is absent when the close carried no status
    Close {
        /// Numeric disconnect code
        code: Option<u16>,
    },
    /// Credential state changed and should be persisted
    CredsUpdate,
    /// New messages arrived
    MessagesUpsert(Vec<WireMessage>),
    /// Existing messages changed status
    MessagesUpdate(Vec<WireMessageUpdate>),
}

/// Stream of events for one connection.
pub type EventStream = mpsc::UnboundedReceiver<ProtocolEvent>;

/// Credential state loaded from a credential directory.
#[async_trait]
pub trait AuthState: Send + Sync {
    /// Whether the credentials are already paired with an account.
    fn is_registered(&self) -> bool;

    /// Write the current credential state back to its directory.
    ///
    /// Idempotent; safe to call after every credential change.
    async fn persist(&self) -> Result<()>;
}

/// Everything the protocol client needs to open a connection.
#[derive(Clone)]
pub struct ConnectConfig {
    /// Protocol version to speak
    pub version: ProtocolVersion,
    /// Credential state for the session
    pub auth: Arc<dyn AuthState>,
    /// Outbound proxy, passed through unchanged
    pub agent: Option<ProxyAgent>,
    /// Render QR payloads on the terminal
    pub print_qr_in_terminal: bool,
    /// Announce presence as soon as the connection opens
    pub mark_online_on_connect: bool,
    /// Client identity triple (os, browser, version)
    pub browser: [String; 3],
}

impl std::fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("version", &self.version)
            .field("registered", &self.auth.is_registered())
            .field("agent", &self.agent)
            .field("print_qr_in_terminal", &self.print_qr_in_terminal)
            .field("mark_online_on_connect", &self.mark_online_on_connect)
            .field("browser", &self.browser)
            .finish()
    }
}

/// A live connection handle.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Ask the service for a pairing code linking this connection to a phone number.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String>;

    /// Log the account out, revoking the credentials.
    async fn logout(&self) -> Result<()>;

    /// Close the connection without touching the credentials.
    fn end(&self);

    /// Download the media attached to a message received on this connection.
    async fn download_media(&self, message: &WireMessage) -> Result<Vec<u8>>;
}

/// Factory for connections.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Fetch the latest protocol version the service supports.
    async fn fetch_latest_version(&self) -> Result<ProtocolVersion>;

    /// Create a connection and its event stream.
    ///
    /// Construction does not wait for the connection to open; progress is
    /// reported through the returned stream.
    fn open(&self, config: ConnectConfig) -> (Arc<dyn Connection>, EventStream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_codes() {
        assert_eq!(DisconnectReason::from_code(401), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::from_code(408), DisconnectReason::ConnectionLost);
        assert_eq!(DisconnectReason::from_code(515), DisconnectReason::RestartRequired);
        assert_eq!(DisconnectReason::from_code(999), DisconnectReason::Unknown(999));
    }

    #[test]
    fn test_disconnect_reason_round_trip() {
        for code in [428, 408, 440, 401, 500, 515, 411, 403, 503, 777] {
            assert_eq!(DisconnectReason::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_timed_out_is_connection_lost() {
        assert_eq!(DisconnectReason::TIMED_OUT.code(), 408);
        assert_eq!(DisconnectReason::from_code(408), DisconnectReason::TIMED_OUT);
    }

    #[test]
    fn test_logged_out_code() {
        assert_eq!(DisconnectReason::LoggedOut.code(), 401);
    }

    #[test]
    fn test_protocol_version_display() {
        let version = ProtocolVersion([2, 3000, 1015901307]);
        assert_eq!(version.to_string(), "2.3000.1015901307");
    }
}
