//! # multisession-storage
//!
//! Credential storage for multisession.
//!
//! This crate provides:
//! - The on-disk layout of credential directories (one per session)
//! - Discovery of persisted sessions from directory names
//! - The credential store seam used to load credential state
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on multisession-core only.
//! Reading and writing the credential files themselves belongs to the
//! [`CredentialStore`] implementation supplied by the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod layout;
pub mod store;

// Re-export commonly used types
pub use layout::CredentialLayout;
pub use store::CredentialStore;
