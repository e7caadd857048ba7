//! Configuration types for multisession.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::session::{SessionId, DEFAULT_SESSION_ID, ID_SEPARATOR};
use crate::{Error, Result};

/// Manager configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// Credential storage settings
    pub storage: StorageSettings,
    /// Session lifecycle settings
    pub session: SessionSettings,
    /// Identity presented to the protocol client
    pub client: ClientSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl ManagerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ManagerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.credentials_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "storage.credentials_dir cannot be empty".to_string(),
            ));
        }

        let suffix = &self.storage.directory_suffix;
        if !suffix.starts_with(ID_SEPARATOR) {
            return Err(Error::Config(format!(
                "storage.directory_suffix must start with '{ID_SEPARATOR}', got '{suffix}'"
            )));
        }
        if suffix.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::Config(format!(
                "storage.directory_suffix cannot contain path separators: '{suffix}'"
            )));
        }

        SessionId::new(self.session.default_session_id.clone()).map_err(|e| {
            Error::Config(format!("session.default_session_id: {e}"))
        })?;

        Ok(())
    }

    /// Session id used when the caller does not name one.
    pub fn default_session_id(&self) -> SessionId {
        SessionId::new(self.session.default_session_id.clone()).unwrap_or_default()
    }
}

/// Credential storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory holding one credential directory per session
    pub credentials_dir: PathBuf,
    /// Suffix appended to the session id to name its credential directory
    pub directory_suffix: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            credentials_dir: PathBuf::from("wa_credentials"),
            directory_suffix: "_session".to_string(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session id used when the caller does not name one
    pub default_session_id: String,
    /// Remove the credential directory when the account logs this device out
    pub purge_credentials_on_logout: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_session_id: DEFAULT_SESSION_ID.to_string(),
            purge_credentials_on_logout: true,
        }
    }
}

/// Identity presented to the protocol client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Client identity triple (os, browser, version)
    pub browser: [String; 3],
    /// Announce presence as soon as a connection opens
    pub mark_online_on_connect: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            browser: [
                "Ubuntu".to_string(),
                "Chrome".to_string(),
                "22.04.4".to_string(),
            ],
            mark_online_on_connect: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
