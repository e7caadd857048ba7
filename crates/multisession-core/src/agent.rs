//! Outbound network agents.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Outbound proxy a session connects through.
///
/// The agent is handed to the protocol client untouched; it is fixed for the
/// lifetime of a session, including across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyAgent {
    url: Url,
}

impl ProxyAgent {
    /// Parse a proxy URL such as `http://proxy:8080`.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidProxy(format!("'{raw}': {e}")))?;

        match url.scheme() {
            "http" | "https" | "socks5" | "socks5h" => {}
            other => {
                return Err(Error::InvalidProxy(format!(
                    "'{raw}': unsupported scheme '{other}'"
                )))
            }
        }

        if url.host_str().is_none() {
            return Err(Error::InvalidProxy(format!("'{raw}': missing host")));
        }

        Ok(Self { url })
    }

    /// Full proxy URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Proxy host.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Proxy port, falling back to the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// Proxy URL with any credentials removed, safe to log.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        // Only fails for cannot-be-a-base URLs, which `parse` already rejected.
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.to_string()
    }
}

impl TryFrom<String> for ProxyAgent {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ProxyAgent> for String {
    fn from(agent: ProxyAgent) -> Self {
        agent.url.into()
    }
}

impl std::fmt::Display for ProxyAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}
