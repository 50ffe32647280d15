//! Google Drive backup store
//!
//! Implements [`RemoteBlobStore`] over the Drive v3 REST API. All blobs live
//! in one dedicated folder, resolved (or created) on first use and cached for
//! the store's lifetime.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{DownloadedBlob, RemoteBlob, RemoteBlobStore};
use bytes::{BufMut, Bytes, BytesMut};
use core_auth::AccessTokenProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::{GoogleDriveError, Result};
use crate::types::{DriveFile, FilesListResponse, NewFileMetadata};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive upload endpoint
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const BLOB_MIME_TYPE: &str = "application/octet-stream";

/// Fields requested for listed backups
const BACKUP_FIELDS: &str = "files(id,name,modifiedTime,createdTime,size)";

const MULTIPART_BOUNDARY: &str = "anitail_backup_part";

const API_TIMEOUT: Duration = Duration::from_secs(30);

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// Default page size for [`RemoteBlobStore::list_backups`] callers.
pub const DEFAULT_LIST_LIMIT: u32 = 20;

/// Drive-backed store for backup archives.
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveBackupStore;
/// use bridge_traits::storage::RemoteBlobStore;
///
/// let store = GoogleDriveBackupStore::new(http_client, session, "AniTail Backups");
/// let id = store.upload_replacing_by_name("AniTail_Desktop_Backup.backup", archive).await?;
/// ```
pub struct GoogleDriveBackupStore {
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenProvider>,
    folder_name: String,
    folder_id: OnceCell<String>,
    retry: RetryPolicy,
}

impl GoogleDriveBackupStore {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        tokens: Arc<dyn AccessTokenProvider>,
        folder_name: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            tokens,
            folder_name: folder_name.into(),
            folder_id: OnceCell::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Id of the backup folder, creating the folder when it does not exist.
    #[instrument(skip(self), fields(folder = %self.folder_name))]
    pub async fn folder_id(&self) -> Result<String> {
        self.folder_id
            .get_or_try_init(|| self.resolve_folder())
            .await
            .cloned()
    }

    async fn resolve_folder(&self) -> Result<String> {
        let query = format!(
            "mimeType = '{}' and name = '{}' and trashed = false",
            FOLDER_MIME_TYPE,
            escape_query_value(&self.folder_name)
        );
        let url = format!(
            "{}/files?q={}&spaces=drive&fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            urlencoding::encode("files(id,name)")
        );
        let listed: FilesListResponse = self.get_json(url).await?;

        if let Some(folder) = listed.files.into_iter().next() {
            debug!(folder_id = %folder.id, "Found backup folder");
            return Ok(folder.id);
        }

        let metadata = NewFileMetadata {
            name: &self.folder_name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: Vec::new(),
        };
        let request = HttpRequest::new(HttpMethod::Post, format!("{}/files?fields=id", DRIVE_API_BASE))
            .json(&metadata)?;
        let created: DriveFile = parse(&self.send(request, API_TIMEOUT).await?)?;

        info!(folder_id = %created.id, "Created backup folder");
        Ok(created.id)
    }

    async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            folder_id,
            escape_query_value(name)
        );
        let url = format!(
            "{}/files?q={}&pageSize=1&fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            urlencoding::encode("files(id)")
        );
        let listed: FilesListResponse = self.get_json(url).await?;
        Ok(listed.files.into_iter().next().map(|f| f.id))
    }

    async fn update_content(&self, file_id: &str, data: Bytes) -> Result<String> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields=id",
            DRIVE_UPLOAD_BASE, file_id
        );
        let request =
            HttpRequest::new(HttpMethod::Patch, url).body_with_type(data, BLOB_MIME_TYPE);
        let updated: DriveFile = parse(&self.send(request, TRANSFER_TIMEOUT).await?)?;
        Ok(updated.id)
    }

    async fn create_in_folder(&self, folder_id: &str, name: &str, data: Bytes) -> Result<String> {
        let metadata = NewFileMetadata {
            name,
            mime_type: None,
            parents: vec![folder_id],
        };
        let metadata = serde_json::to_vec(&metadata)
            .map_err(|e| GoogleDriveError::ParseError(e.to_string()))?;
        let body = multipart_related(&metadata, &data);
        let url = format!(
            "{}/files?uploadType=multipart&fields={}",
            DRIVE_UPLOAD_BASE,
            urlencoding::encode("id,name")
        );
        let request = HttpRequest::new(HttpMethod::Post, url).body_with_type(
            body,
            format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
        );
        let created: DriveFile = parse(&self.send(request, TRANSFER_TIMEOUT).await?)?;
        Ok(created.id)
    }

    async fn list_in_folder(&self, query: String, limit: u32) -> Result<Vec<DriveFile>> {
        let url = format!(
            "{}/files?q={}&orderBy={}&pageSize={}&fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            urlencoding::encode("modifiedTime desc"),
            limit.max(1),
            urlencoding::encode(BACKUP_FIELDS)
        );
        let listed: FilesListResponse = self.get_json(url).await?;
        Ok(listed.files)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, url);
        parse(&self.send(request, API_TIMEOUT).await?)
    }

    /// Authorize and execute `request`, mapping non-2xx statuses to errors.
    async fn send(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse> {
        let token = self.tokens.access_token().await?;
        let request = request.bearer_token(token).timeout(timeout);
        let method = request.method;

        let response = self
            .http_client
            .execute_with_retry(request, self.retry.clone())
            .await?;

        if response.is_success() {
            return Ok(response);
        }

        let message = String::from_utf8_lossy(&response.body).to_string();
        warn!(status = response.status, ?method, "Drive request failed");
        if response.status == 401 {
            return Err(GoogleDriveError::AuthenticationFailed(message));
        }
        Err(GoogleDriveError::ApiError {
            status_code: response.status,
            message,
        })
    }
}

#[async_trait]
impl RemoteBlobStore for GoogleDriveBackupStore {
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_replacing_by_name(&self, name: &str, data: Bytes) -> BridgeResult<String> {
        let folder_id = self.folder_id().await?;

        let id = match self.find_by_name(&folder_id, name).await? {
            Some(existing) => {
                debug!(file_id = %existing, "Updating existing backup in place");
                self.update_content(&existing, data).await?
            }
            None => self.create_in_folder(&folder_id, name, data).await?,
        };

        info!(file_id = %id, name, "Uploaded backup");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn download_latest(&self) -> BridgeResult<DownloadedBlob> {
        let folder_id = self.folder_id().await?;
        let query = format!(
            "'{}' in parents and trashed = false and (name contains '.backup' or name contains '.zip')",
            folder_id
        );

        let latest = self
            .list_in_folder(query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GoogleDriveError::NoBackupsFound {
                folder: self.folder_name.clone(),
            })?;

        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, latest.id);
        let request = HttpRequest::new(HttpMethod::Get, url);
        let response = self.send(request, TRANSFER_TIMEOUT).await?;

        info!(file_id = %latest.id, bytes = response.body.len(), "Downloaded latest backup");
        Ok(DownloadedBlob {
            blob: latest.into_remote_blob(),
            data: response.body,
        })
    }

    #[instrument(skip(self))]
    async fn list_backups(&self, limit: u32) -> BridgeResult<Vec<RemoteBlob>> {
        let folder_id = self.folder_id().await?;
        let query = format!("'{}' in parents and trashed = false", folder_id);

        let files = self.list_in_folder(query, limit).await?;
        debug!(count = files.len(), "Listed remote backups");
        Ok(files.into_iter().map(DriveFile::into_remote_blob).collect())
    }
}

fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body)
        .map_err(|e| GoogleDriveError::ParseError(e.to_string()))
}

/// Escape a literal for use inside a single-quoted Drive query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(metadata: &[u8], media: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(metadata.len() + media.len() + 256);
    body.put_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(metadata);
    body.put_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.put_slice(format!("Content-Type: {}\r\n\r\n", BLOB_MIME_TYPE).as_bytes());
    body.put_slice(media);
    body.put_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.freeze()
}
