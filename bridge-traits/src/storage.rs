//! Storage Abstractions
//!
//! Contracts for the host-owned state the backup engine reads and writes:
//! typed preferences, account credentials, canonical on-disk locations, and a
//! remote blob store for cloud backups.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;

/// Key-value application preferences.
///
/// Backed by a file on desktop. The engine copies that file during restore
/// and then calls [`PreferencesStore::load`] so the in-memory cache reflects
/// what is on disk again.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::PreferencesStore;
///
/// async fn enable_auto_backup(store: &dyn PreferencesStore) -> Result<()> {
///     store.set_bool("autoBackupEnabled", true).await?;
///     store.set_i64("autoBackupKeepCount", 5).await
/// }
/// ```
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Re-read persisted preferences, replacing the in-memory cache.
    async fn load(&self) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;
}

/// Account and integration credentials owned by the host.
///
/// Values are plain strings; an empty string means "not set".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountCredentials {
    pub inner_tube_cookie: String,
    pub visitor_data: String,
    pub data_sync_id: String,
    pub account_name: String,
    pub account_email: String,
    pub account_channel_handle: String,
    pub account_image_url: String,
    pub last_fm_session_key: String,
    pub last_fm_username: String,
    pub last_fm_enabled: bool,
    pub discord_token: String,
    pub discord_username: String,
    pub discord_name: String,
    pub discord_avatar_url: String,
    pub spotify_access_token: String,
    pub spotify_refresh_token: String,
    pub proxy_enabled: bool,
    pub proxy_url: String,
    pub proxy_username: String,
    pub proxy_password: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_name", &self.account_name)
            .field("has_inner_tube_cookie", &!self.inner_tube_cookie.is_empty())
            .field("last_fm_enabled", &self.last_fm_enabled)
            .field("has_discord_token", &!self.discord_token.is_empty())
            .field("has_spotify_token", &!self.spotify_access_token.is_empty())
            .field("proxy_enabled", &self.proxy_enabled)
            .finish_non_exhaustive()
    }
}

/// Credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Re-read persisted credentials, replacing the in-memory copy.
    async fn load_credentials(&self) -> Result<()>;

    /// Current in-memory credentials.
    async fn credentials(&self) -> Result<AccountCredentials>;

    /// Replace and persist the credentials.
    async fn save_credentials(&self, credentials: AccountCredentials) -> Result<()>;
}

/// Canonical locations of every file and directory the engine touches.
pub trait PathResolver: Send + Sync {
    /// Root of the application's private data.
    fn app_data_dir(&self) -> PathBuf;

    /// Directory holding the live database's own files.
    fn database_dir(&self) -> PathBuf;

    fn preferences_file(&self) -> PathBuf;

    fn credentials_file(&self) -> PathBuf;

    fn lyrics_overrides_file(&self) -> PathBuf;

    /// JSON queue of scrobbles not yet submitted.
    fn pending_scrobbles_file(&self) -> PathBuf;

    /// Opaque settings blob carried through from other platforms untouched.
    fn passthrough_settings_file(&self) -> PathBuf;

    /// Legacy XML wrapper around the pending-scrobble queue.
    fn legacy_scrobbles_file(&self) -> PathBuf;

    /// Default target directory for scheduled backups.
    fn auto_backup_dir(&self) -> PathBuf;
}

/// Metadata of a blob held by a [`RemoteBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlob {
    pub id: String,
    pub name: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// A downloaded blob together with its metadata.
#[derive(Debug, Clone)]
pub struct DownloadedBlob {
    pub blob: RemoteBlob,
    pub data: Bytes,
}

/// Remote folder of named backup blobs.
///
/// # Errors
///
/// [`RemoteBlobStore::download_latest`] reports an empty folder with
/// [`BridgeError::NotFound`](crate::error::BridgeError::NotFound); callers
/// treat that as "no remote backup yet", not as a failure.
#[async_trait]
pub trait RemoteBlobStore: Send + Sync {
    /// Upload `data` under `name`, updating the existing blob with that name
    /// in place when there is one. Returns the blob id.
    async fn upload_replacing_by_name(&self, name: &str, data: Bytes) -> Result<String>;

    /// Download the most recently modified backup blob.
    async fn download_latest(&self) -> Result<DownloadedBlob>;

    /// Most recently modified backup blobs first.
    async fn list_backups(&self, limit: u32) -> Result<Vec<RemoteBlob>>;
}
