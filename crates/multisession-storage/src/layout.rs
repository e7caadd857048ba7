//! On-disk layout of credential directories.
//!
//! Every session owns one directory under a single root, named
//! `<session id><suffix>`. A directory that exists and is non-empty is the
//! only signal that a session has persisted credentials.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use multisession_core::{Result, SessionId, StorageSettings, ID_SEPARATOR};

/// Maps session ids to credential directories and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialLayout {
    root: PathBuf,
    suffix: String,
}

impl CredentialLayout {
    /// Create a layout rooted at `root`, naming directories `<id><suffix>`.
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    /// Create a layout from storage settings.
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(
            settings.credentials_dir.clone(),
            settings.directory_suffix.clone(),
        )
    }

    /// Root directory holding every credential directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name suffix.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Credential directory of a session.
    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{}{}", id, self.suffix))
    }

    /// Recover the session id from a directory name.
    ///
    /// The id is the part before the first separator.
    pub fn session_id_from_dir_name(name: &str) -> Option<SessionId> {
        let prefix = name.split(ID_SEPARATOR).next()?;
        SessionId::new(prefix).ok()
    }

    /// Create the root directory if it does not exist.
    pub fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            info!("Creating credentials root: {}", self.root.display());
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }

    /// Enumerate credential directories, with the session id each one maps to.
    ///
    /// Entries whose name yields no valid session id are skipped.
    pub fn session_dirs(&self) -> Result<Vec<(SessionId, PathBuf)>> {
        self.ensure_root()?;

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            match Self::session_id_from_dir_name(&name) {
                Some(id) => dirs.push((id, entry.path())),
                None => debug!("Skipping credential entry without session id: {}", name),
            }
        }

        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(dirs)
    }

    /// Ids of every session with a credential directory on disk.
    pub fn stored_session_ids(&self) -> Result<BTreeSet<SessionId>> {
        Ok(self.session_dirs()?.into_iter().map(|(id, _)| id).collect())
    }

    /// Whether the session's credential directory exists and is non-empty.
    pub fn has_credentials(&self, id: &SessionId) -> bool {
        Self::is_non_empty_dir(&self.session_dir(id))
    }

    /// Whether `dir` exists and has at least one entry.
    pub fn is_non_empty_dir(dir: &Path) -> bool {
        fs::read_dir(dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Recursively delete the session's credential directory.
    ///
    /// Returns whether a directory was removed.
    pub fn remove_session_dir(&self, id: &SessionId) -> Result<bool> {
        let dir = self.session_dir(id);
        if !dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&dir)?;
        info!(session_id = %id, "Removed credential directory {}", dir.display());
        Ok(true)
    }
}
