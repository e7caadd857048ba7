//! # multisession
//!
//! Session lifecycle management for multiplexed messaging sessions.
//!
//! This crate provides:
//! - Session start, stop and delete, with credentials persisted per session
//! - Supervised reconnects with a bounded retry budget
//! - Callback dispatch for session events, global and per session
//! - Bulk restore of persisted sessions at startup
//! - Test doubles for the protocol and credential collaborators
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on multisession-core
//! and multisession-storage to manage messaging session lifecycles.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callbacks;
pub mod manager;
pub mod options;
pub mod registry;
pub mod retry;
pub mod testing;

mod restore;
mod supervisor;

// Re-export commonly used types
pub use callbacks::{CallbackRegistry, Listener};
pub use manager::{SessionManager, LOGOUT_TIMEOUT};
pub use options::{Hook, PairingCodeOptions, PayloadHook, QrHook, StartOptions};
pub use registry::{SessionEntry, SessionRegistry};
pub use retry::{decide, RetryCounter, RetryDecision, TerminationReason, MAX_RETRY_ATTEMPTS};

pub use multisession_core::{
    Connection, Error, EventKind, ManagerConfig, MessageStatus, MessageUpdated, PairingCode,
    ProtocolClient, ProxyAgent, QrUpdate, ReceivedMessage, Result, SessionEvent, SessionId,
    SessionInfo,
};
pub use multisession_storage::{CredentialLayout, CredentialStore};
