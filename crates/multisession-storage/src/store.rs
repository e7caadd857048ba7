//! Credential store seam.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use multisession_core::{AuthState, Result};

/// Loads credential state from a credential directory.
///
/// Implementations create the directory when it does not exist yet and return
/// fresh, unregistered state in that case. The returned state persists itself
/// back to the same directory through [`AuthState::persist`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load (or initialize) the credential state stored in `dir`.
    async fn load(&self, dir: &Path) -> Result<Arc<dyn AuthState>>;
}
