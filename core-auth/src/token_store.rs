//! Token Cache
//!
//! Persists the Drive OAuth tokens between runs in the app's private data
//! directory (`<app data>/google_tokens/`). Signing out deletes the whole
//! directory.
//!
//! ## Security
//!
//! - Token values are never logged
//! - The directory sits under the per-user app data root
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{OAuthTokens, TokenStore};
//! # async fn example() -> core_auth::Result<()> {
//! let store = TokenStore::in_app_data("/home/me/.anitail");
//! store.store_tokens(&OAuthTokens::new("at".into(), Some("rt".into()), 3600)).await?;
//! let cached = store.retrieve_tokens().await?;
//! store.clear().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name under the app data root.
pub const TOKEN_STORE_DIR: &str = "google_tokens";

const TOKEN_FILE_NAME: &str = "desktop_user.json";

/// On-disk shape; expiry as epoch seconds.
#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
}

/// File cache for one desktop user's tokens.
#[derive(Debug, Clone)]
pub struct TokenStore {
    directory: PathBuf,
}

impl TokenStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn in_app_data(app_data_dir: impl AsRef<Path>) -> Self {
        Self::new(app_data_dir.as_ref().join(TOKEN_STORE_DIR))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn token_file(&self) -> PathBuf {
        self.directory.join(TOKEN_FILE_NAME)
    }

    pub async fn store_tokens(&self, tokens: &OAuthTokens) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let stored = StoredTokens {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at.timestamp(),
        };
        let payload = serde_json::to_vec(&stored)?;

        let target = self.token_file();
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &target).await?;

        debug!("Stored OAuth tokens");
        Ok(())
    }

    /// Cached tokens, or `None` when nothing usable is stored.
    ///
    /// A corrupt cache file is treated as absent.
    pub async fn retrieve_tokens(&self) -> Result<Option<OAuthTokens>> {
        let raw = match tokio::fs::read(self.token_file()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::Io(e)),
        };

        let stored: StoredTokens = match serde_json::from_slice(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable token cache");
                return Ok(None);
            }
        };

        let Some(expires_at) = chrono::DateTime::from_timestamp(stored.expires_at, 0) else {
            warn!("Ignoring token cache with invalid expiry");
            return Ok(None);
        };

        Ok(Some(OAuthTokens {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at,
        }))
    }

    /// Delete the cache directory and everything in it.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.directory).await {
            Ok(()) => {
                info!("Cleared OAuth token cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Io(e)),
        }
    }
}
