//! Credential Storage using a JSON file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{AccountCredentials, CredentialStore},
};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::preferences::write_json_atomically;

/// JSON-file-backed credential store
///
/// The file lives in the application's private data directory. Values are
/// never logged; only presence flags appear in `Debug` output.
pub struct JsonCredentialStore {
    path: PathBuf,
    current: RwLock<AccountCredentials>,
}

impl JsonCredentialStore {
    /// Open the store, reading `path` if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = read_credentials(&path).await?;
        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn load_credentials(&self) -> Result<()> {
        let fresh = read_credentials(&self.path).await?;
        *self.current.write().await = fresh;
        debug!("Reloaded credentials from disk");
        Ok(())
    }

    async fn credentials(&self) -> Result<AccountCredentials> {
        Ok(self.current.read().await.clone())
    }

    async fn save_credentials(&self, credentials: AccountCredentials) -> Result<()> {
        let value = serde_json::to_value(&credentials)?;
        write_json_atomically(&self.path, &value).await?;
        *self.current.write().await = credentials;
        debug!("Stored credentials");
        Ok(())
    }
}

async fn read_credentials(path: &Path) -> Result<AccountCredentials> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
            error!(error = %e, "Failed to decode credentials file");
            BridgeError::OperationFailed(format!("Failed to decode credentials: {}", e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AccountCredentials::default()),
        Err(e) => Err(BridgeError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_empty_credentials() {
        let dir = TempDir::new().unwrap();
        let store = JsonCredentialStore::open(dir.path().join("credentials.json"))
            .await
            .unwrap();

        assert_eq!(
            store.credentials().await.unwrap(),
            AccountCredentials::default()
        );
    }

    #[tokio::test]
    async fn test_save_then_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        let store = JsonCredentialStore::open(&path).await.unwrap();

        let credentials = AccountCredentials {
            account_name: "listener".to_string(),
            last_fm_session_key: "sk".to_string(),
            last_fm_enabled: true,
            ..Default::default()
        };
        store.save_credentials(credentials.clone()).await.unwrap();

        let reopened = JsonCredentialStore::open(&path).await.unwrap();
        assert_eq!(reopened.credentials().await.unwrap(), credentials);
    }

    #[tokio::test]
    async fn test_load_credentials_replaces_memory_copy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        let store = JsonCredentialStore::open(&path).await.unwrap();

        tokio::fs::write(&path, br#"{"accountEmail":"a@example.com"}"#)
            .await
            .unwrap();
        store.load_credentials().await.unwrap();

        assert_eq!(
            store.credentials().await.unwrap().account_email,
            "a@example.com"
        );
    }
}
