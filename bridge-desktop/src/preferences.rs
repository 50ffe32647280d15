//! Preferences Storage using a JSON file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::PreferencesStore,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// JSON-file-backed preferences store
///
/// Keeps every preference in memory and rewrites the whole file on each
/// change. The file is replaced atomically (write to a sibling temp file,
/// then rename) so a crash never leaves half-written JSON behind.
pub struct JsonPreferencesStore {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonPreferencesStore {
    /// Open the store, reading `path` if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = read_map(&path).await?;
        debug!(path = %path.display(), keys = values.len(), "Opened preferences store");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value);
        write_json_atomically(&self.path, &Value::Object(values.clone())).await?;
        debug!(key = key, "Stored preference");
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }
}

#[async_trait]
impl PreferencesStore for JsonPreferencesStore {
    async fn load(&self) -> Result<()> {
        let fresh = read_map(&self.path).await?;
        *self.values.write().await = fresh;
        debug!(path = %self.path.display(), "Reloaded preferences");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.get_value(key).await {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, Value::String(value.to_string())).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(match self.get_value(key).await {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        })
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, Value::Bool(value)).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(match self.get_value(key).await {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        })
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, Value::from(value)).await
    }
}

async fn read_map(path: &Path) -> Result<Map<String, Value>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(BridgeError::Io(e)),
    };

    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            warn!(path = %path.display(), "Preferences file is not a JSON object; ignoring");
            Ok(Map::new())
        }
        Err(e) => Err(BridgeError::OperationFailed(format!(
            "Corrupt preferences file {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Serialize `value` to `path` through a temp file and a rename.
pub(crate) async fn write_json_atomically(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, payload).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
