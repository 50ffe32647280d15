//! # Core Configuration Module
//!
//! Builder-based configuration for the backup engine.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries the injected host bridges together with the
//! settings every backup, restore and cloud-sync operation needs: where the
//! relational schema descriptor lives, which remote folder holds cloud
//! backups and which reserved blob names the two upload flows use.
//! `build()` validates eagerly so misconfiguration surfaces at startup
//! instead of halfway through a restore.
//!
//! ## Required Dependencies
//!
//! - `PreferencesStore` - application preferences (`preferences.json`)
//! - `CredentialStore` - account credentials (`credentials.json`)
//! - `PathResolver` - canonical locations of every file the engine touches
//!
//! With the `desktop-shims` feature enabled, missing bridges fall back to the
//! `bridge-desktop` implementations rooted at `~/.anitail`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .schema_dir("/opt/anitail/schemas")
//!     .preferences(Arc::new(my_preferences))
//!     .credentials(Arc::new(my_credentials))
//!     .paths(Arc::new(my_paths))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, CredentialStore, HttpClient, PathResolver, PreferencesStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Default schema descriptor, relative to the working directory.
pub const DEFAULT_SCHEMA_PATH: &str = "schemas/26.json";

/// Directory scanned for the newest descriptor when the default file is absent.
pub const DEFAULT_SCHEMA_DIR: &str = "schemas";

/// Remote folder dedicated to backups.
pub const DEFAULT_REMOTE_FOLDER: &str = "AniTail Backups";

/// Blob written by the smart-merge cloud sync.
pub const CLOUD_SYNC_BLOB_NAME: &str = "AniTail_Desktop_CloudSync.backup";

/// Blob written by the manual "upload a backup" flow.
pub const MANUAL_BACKUP_BLOB_NAME: &str = "AniTail_Desktop_Backup.backup";

/// Remote folder and reserved blob names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    pub folder_name: String,
    pub cloud_sync_blob_name: String,
    pub manual_backup_blob_name: String,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            folder_name: DEFAULT_REMOTE_FOLDER.to_string(),
            cloud_sync_blob_name: CLOUD_SYNC_BLOB_NAME.to_string(),
            manual_backup_blob_name: MANUAL_BACKUP_BLOB_NAME.to_string(),
        }
    }
}

impl RemoteStoreConfig {
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("Remote folder name", &self.folder_name),
            ("Cloud sync blob name", &self.cloud_sync_blob_name),
            ("Manual backup blob name", &self.manual_backup_blob_name),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} cannot be blank", label)));
            }
        }

        if self.cloud_sync_blob_name == self.manual_backup_blob_name {
            return Err(Error::Config(
                "Cloud sync and manual backup must use different blob names".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the backup engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Preferred schema descriptor file
    pub schema_path: PathBuf,

    /// Fallback directory searched for the newest descriptor
    pub schema_dir: PathBuf,

    /// Parent for scratch directories; the system temp dir when `None`
    pub temp_dir: Option<PathBuf>,

    pub remote: RemoteStoreConfig,

    /// HTTP client for the remote store (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    pub preferences: Arc<dyn PreferencesStore>,

    pub credentials: Arc<dyn CredentialStore>,

    pub paths: Arc<dyn PathResolver>,

    /// Wall clock used for backup file names
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("schema_path", &self.schema_path)
            .field("schema_dir", &self.schema_dir)
            .field("temp_dir", &self.temp_dir)
            .field("remote", &self.remote)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("app_data_dir", &self.paths.app_data_dir())
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.schema_path.as_os_str().is_empty() && self.schema_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Either a schema descriptor path or a schema directory is required".to_string(),
            ));
        }

        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.as_os_str().is_empty() {
                return Err(Error::Config("Temp directory cannot be empty".to_string()));
            }
        }

        self.remote.validate()
    }

    /// Scratch parent for temp files and directories.
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the bridge-desktop default. \
             Other hosts: inject a platform implementation through CoreConfig::builder().",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_paths() -> Result<Arc<dyn PathResolver>> {
    let paths = bridge_desktop::DesktopPaths::from_home().map_err(|e| Error::CapabilityMissing {
        capability: "PathResolver".to_string(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(paths))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_paths() -> Result<Arc<dyn PathResolver>> {
    Err(capability_missing("PathResolver", "locating backup inputs"))
}

/// Run an async constructor to completion from synchronous `build()`.
///
/// A dedicated thread keeps this usable from inside a Tokio runtime.
#[cfg(feature = "desktop-shims")]
fn block_on_fresh_runtime<T, F, Fut>(make: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = bridge_traits::error::Result<T>>,
{
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create Tokio runtime: {}", e)))?;
        runtime
            .block_on(make())
            .map_err(|e| Error::Internal(format!("Failed to open desktop store: {}", e)))
    })
    .join()
    .map_err(|_| Error::Internal("Desktop store initialization thread panicked".to_string()))?
}

#[cfg(feature = "desktop-shims")]
fn provide_default_preferences(paths: &dyn PathResolver) -> Result<Arc<dyn PreferencesStore>> {
    let file = paths.preferences_file();
    let store = block_on_fresh_runtime(move || bridge_desktop::JsonPreferencesStore::open(file))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_preferences(_paths: &dyn PathResolver) -> Result<Arc<dyn PreferencesStore>> {
    Err(capability_missing("PreferencesStore", "backing up preferences"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_credentials(paths: &dyn PathResolver) -> Result<Arc<dyn CredentialStore>> {
    let file = paths.credentials_file();
    let store = block_on_fresh_runtime(move || bridge_desktop::JsonCredentialStore::open(file))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_credentials(_paths: &dyn PathResolver) -> Result<Arc<dyn CredentialStore>> {
    Err(capability_missing("CredentialStore", "backing up account credentials"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    match bridge_desktop::ReqwestHttpClient::new() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "Desktop HTTP client unavailable; cloud sync disabled");
            None
        }
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    schema_path: Option<PathBuf>,
    schema_dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    remote: RemoteStoreConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    preferences: Option<Arc<dyn PreferencesStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    paths: Option<Arc<dyn PathResolver>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Preferred schema descriptor file.
    ///
    /// Default: `schemas/26.json`
    pub fn schema_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Directory searched for the newest `*.json` descriptor.
    ///
    /// Default: `schemas`
    pub fn schema_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.schema_dir = Some(path.into());
        self
    }

    /// Parent directory for scratch files.
    pub fn temp_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Remote folder holding backups.
    ///
    /// Default: `AniTail Backups`
    pub fn remote_folder_name(mut self, name: impl Into<String>) -> Self {
        self.remote.folder_name = name.into();
        self
    }

    /// Reserved blob names for the smart-merge and manual upload flows.
    pub fn reserved_blob_names(
        mut self,
        cloud_sync: impl Into<String>,
        manual_backup: impl Into<String>,
    ) -> Self {
        self.remote.cloud_sync_blob_name = cloud_sync.into();
        self.remote.manual_backup_blob_name = manual_backup.into();
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the preferences store (required).
    pub fn preferences(mut self, store: Arc<dyn PreferencesStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    /// Sets the credential store (required).
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Sets the path resolver (required).
    pub fn paths(mut self, paths: Arc<dyn PathResolver>) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Overrides the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge is missing and no
    ///   desktop default is available
    /// - [`Error::Config`] for invalid values
    pub fn build(self) -> Result<CoreConfig> {
        let paths = match self.paths {
            Some(paths) => paths,
            None => provide_default_paths()?,
        };

        let preferences = match self.preferences {
            Some(store) => store,
            None => provide_default_preferences(paths.as_ref())?,
        };

        let credentials = match self.credentials {
            Some(store) => store,
            None => provide_default_credentials(paths.as_ref())?,
        };

        let config = CoreConfig {
            schema_path: self
                .schema_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH)),
            schema_dir: self
                .schema_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_DIR)),
            temp_dir: self.temp_dir,
            remote: self.remote,
            http_client: self.http_client.or_else(provide_default_http_client),
            preferences,
            credentials,
            paths,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
