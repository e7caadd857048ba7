//! Bulk restore of persisted sessions.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use multisession_core::{ProxyAgent, Result, SessionId};

use crate::manager::SessionManager;
use crate::options::StartOptions;

impl SessionManager {
    /// Start every session that has persisted credentials but is not running.
    ///
    /// `agents` maps session ids to proxy URLs. Sessions start silently (no
    /// QR printing). An invalid proxy URL or a failed start skips that session
    /// only. Returns the ids that were started.
    pub async fn load_sessions_from_storage(
        &self,
        agents: &HashMap<String, String>,
    ) -> Result<Vec<SessionId>> {
        let mut started = Vec::new();

        for (id, dir) in self.layout().session_dirs()? {
            if self.shared.sessions.contains(&id) {
                debug!(session_id = %id, "Already running, not restoring");
                continue;
            }
            // Any directory can name the id, but only the session's own
            // directory holds the credentials the store will load.
            if !self.layout().has_credentials(&id) {
                debug!(session_id = %id, "No stored credentials for {}", dir.display());
                continue;
            }

            let agent = match agents.get(id.as_str()) {
                Some(raw) => match ProxyAgent::parse(raw) {
                    Ok(agent) => Some(agent),
                    Err(e) => {
                        warn!(session_id = %id, "Skipping session with invalid proxy: {}", e);
                        continue;
                    }
                },
                None => None,
            };

            match self
                .start_session(id.clone(), StartOptions::silent(), agent)
                .await
            {
                Ok(_) => started.push(id),
                Err(e) => warn!(session_id = %id, "Failed to restore session: {}", e),
            }
        }

        info!(count = started.len(), "Restored sessions from storage");
        Ok(started)
    }
}
