//! # multisession-core
//!
//! Core types for multisession.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other multisession crates. It provides:
//!
//! - Session identifiers and their validation rules
//! - Session events delivered to listeners, and their payloads
//! - The protocol collaborator seam (client, connection, credential state)
//! - Wire message types and delivery status mapping
//! - Outbound proxy agents
//! - Configuration and logging setup
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other multisession crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod message;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use agent::ProxyAgent;
pub use config::{ClientSettings, LoggingSettings, ManagerConfig, SessionSettings, StorageSettings};
pub use error::{Error, Result};
pub use event::{
    EventKind, MessageUpdated, PairingCode, QrUpdate, ReceivedMessage, SessionEvent,
};
pub use message::{MediaKind, MessageKey, MessageStatus, WireMessage, WireMessageUpdate};
pub use protocol::{
    AuthState, ConnectConfig, Connection, DisconnectReason, EventStream, ProtocolClient,
    ProtocolEvent, ProtocolVersion,
};
pub use session::{SessionId, SessionInfo, DEFAULT_SESSION_ID, ID_SEPARATOR};
