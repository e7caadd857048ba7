//! Session identifiers and session information.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier used when the caller does not name a session.
pub const DEFAULT_SESSION_ID: &str = "mysession";

/// Separator between the session id and the rest of a credential directory name.
pub const ID_SEPARATOR: char = '_';

/// Caller-supplied identifier of a messaging session.
///
/// An id always round-trips through its credential directory name, so it may
/// not be empty and may not contain [`ID_SEPARATOR`] or path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id, validating it.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::InvalidSessionId("session id cannot be empty".to_string()));
        }
        if id.contains(ID_SEPARATOR) {
            return Err(Error::InvalidSessionId(format!(
                "'{id}' contains the reserved separator '{ID_SEPARATOR}'"
            )));
        }
        if id.contains(|c: char| c == '/' || c == '\\') || id == "." || id == ".." {
            return Err(Error::InvalidSessionId(format!(
                "'{id}' is not a valid directory name"
            )));
        }
        Ok(())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(DEFAULT_SESSION_ID.to_string())
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Consecutive reconnect attempts so far, `None` if the session never failed
    pub retry_count: Option<u32>,
    /// Whether the session connects through an outbound proxy
    pub has_proxy: bool,
    /// Credential directory backing the session
    pub credentials_dir: PathBuf,
}
