//! # Cloud Sync
//!
//! Reconciles the local library with the newest backup in the remote store.
//!
//! ## Smart merge
//!
//! 1. Capture the local snapshot.
//! 2. Download the newest remote backup. An empty remote folder skips to 4.
//! 3. Restore it (the live database now holds the remote state), capture
//!    that as the remote snapshot, merge both and replace the live state
//!    with the result.
//! 4. Package the current state and upload it under the reserved sync name.
//!
//! Every failure after step 1 puts the local snapshot back before the error
//! is returned. The whole flow holds the packager's operation gate.

use bridge_traits::storage::{RemoteBlob, RemoteBlobStore};
use bytes::Bytes;
use core_auth::AccessTokenProvider;
use core_library::LibrarySnapshot;
use core_runtime::{CoreConfig, RemoteStoreConfig};
use provider_google_drive::GoogleDriveBackupStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::{ArchivePackager, OperationGuard, RestoreReport};
use crate::error::{Result, SyncError};
use crate::merge::merge_snapshots;

pub use provider_google_drive::DEFAULT_LIST_LIMIT;

const DOWNLOAD_FILE: &str = "remote.backup";
const UPLOAD_FILE: &str = "upload.backup";

/// Outcome of [`CloudSyncCoordinator::sync_with_remote_smart_merge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudSyncReport {
    pub had_remote_backup: bool,
    pub uploaded_file_id: String,
    pub warnings: Vec<String>,
}

pub struct CloudSyncCoordinator {
    packager: Arc<ArchivePackager>,
    remote: Arc<dyn RemoteBlobStore>,
    config: RemoteStoreConfig,
}

impl CloudSyncCoordinator {
    pub fn new(
        packager: Arc<ArchivePackager>,
        remote: Arc<dyn RemoteBlobStore>,
        config: RemoteStoreConfig,
    ) -> Self {
        Self {
            packager,
            remote,
            config,
        }
    }

    /// Coordinator backed by Google Drive, using the configured HTTP client.
    pub fn google_drive(
        packager: Arc<ArchivePackager>,
        config: &CoreConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        let http_client = config.http_client.clone().ok_or_else(|| {
            core_runtime::Error::CapabilityMissing {
                capability: "http_client".to_string(),
                message: "Google Drive sync needs an HTTP client".to_string(),
            }
        })?;
        let store = GoogleDriveBackupStore::new(http_client, tokens, config.remote.folder_name.clone());
        Ok(Self::new(packager, Arc::new(store), config.remote.clone()))
    }

    pub fn packager(&self) -> &Arc<ArchivePackager> {
        &self.packager
    }

    #[instrument(skip(self))]
    pub async fn sync_with_remote_smart_merge(&self) -> Result<CloudSyncReport> {
        let guard = self.packager.lock().await;
        let live = self.packager.live();
        let local = live.snapshot().await?;
        info!(counts = ?local.counts(), "Starting smart merge sync");

        match self.merge_and_upload(&guard, &local).await {
            Ok(report) => {
                info!(
                    had_remote_backup = report.had_remote_backup,
                    file_id = %report.uploaded_file_id,
                    "Smart merge sync complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Smart merge sync failed; restoring local state");
                if let Err(rollback) = live.replace_all(local).await {
                    error!(error = %rollback, "Rollback after failed sync also failed");
                }
                Err(e)
            }
        }
    }

    async fn merge_and_upload(
        &self,
        guard: &OperationGuard<'_>,
        local: &LibrarySnapshot,
    ) -> Result<CloudSyncReport> {
        let mut warnings = Vec::new();
        let had_remote_backup = match self.remote.download_latest().await {
            Ok(downloaded) => {
                debug!(
                    blob = %downloaded.blob.name,
                    size = downloaded.data.len(),
                    "Downloaded remote backup"
                );
                let restored = self.restore_bytes(guard, downloaded.data).await?;
                warnings.extend(restored.warnings);

                let live = self.packager.live();
                let remote = live.snapshot().await?;
                let merged = merge_snapshots(local, &remote, live.as_ref());
                debug!(counts = ?merged.counts(), "Merged local and remote snapshots");
                live.replace_all(merged).await?;
                true
            }
            Err(e) if e.is_not_found() => {
                info!("No remote backup yet; uploading local state");
                false
            }
            Err(e) => return Err(e.into()),
        };

        let uploaded_file_id = self
            .package_and_upload(guard, &self.config.cloud_sync_blob_name)
            .await?;
        Ok(CloudSyncReport {
            had_remote_backup,
            uploaded_file_id,
            warnings,
        })
    }

    /// Package the current state and upload it under the manual backup name.
    #[instrument(skip(self))]
    pub async fn upload_manual_backup(&self) -> Result<String> {
        let guard = self.packager.lock().await;
        let file_id = self
            .package_and_upload(&guard, &self.config.manual_backup_blob_name)
            .await?;
        info!(file_id = %file_id, "Uploaded manual backup");
        Ok(file_id)
    }

    /// Replace local state with the newest remote backup.
    ///
    /// # Errors
    ///
    /// A [`SyncError::Bridge`] not-found error when the remote folder holds no
    /// backup (see [`SyncError::is_remote_not_found`]).
    #[instrument(skip(self))]
    pub async fn restore_latest(&self) -> Result<RestoreReport> {
        let guard = self.packager.lock().await;
        let downloaded = self.remote.download_latest().await?;
        info!(blob = %downloaded.blob.name, "Restoring newest remote backup");
        self.restore_bytes(&guard, downloaded.data).await
    }

    #[instrument(skip(self))]
    pub async fn list_backups(&self, limit: u32) -> Result<Vec<RemoteBlob>> {
        Ok(self.remote.list_backups(limit).await?)
    }

    async fn restore_bytes(&self, guard: &OperationGuard<'_>, data: Bytes) -> Result<RestoreReport> {
        let scratch = self.packager.scratch("anitail_cloud_download_")?;
        let archive = scratch.path().join(DOWNLOAD_FILE);
        tokio::fs::write(&archive, &data).await?;
        self.packager.restore_from_locked(guard, &archive).await
    }

    async fn package_and_upload(&self, guard: &OperationGuard<'_>, name: &str) -> Result<String> {
        let scratch = self.packager.scratch("anitail_cloud_upload_")?;
        let archive = scratch.path().join(UPLOAD_FILE);
        self.packager.backup_to_locked(guard, &archive).await?;

        let data = tokio::fs::read(&archive).await?;
        let file_id = self
            .remote
            .upload_replacing_by_name(name, Bytes::from(data))
            .await
            .map_err(SyncError::from)?;
        debug!(name, file_id = %file_id, "Uploaded backup");
        Ok(file_id)
    }
}
