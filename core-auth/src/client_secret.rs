//! Google OAuth client secret discovery
//!
//! Desktop builds do not ship with a fixed client id; the user (or the
//! packager) drops Google's downloaded `client_secret*.json` somewhere the
//! app can find it. [`ClientSecretLocator::resolve`] checks, in order:
//!
//! 1. the path in `ANITAIL_GOOGLE_CLIENT_SECRET`
//! 2. `<app data>/client_secret.json`
//! 3. `./client_secret.json`
//! 4. `./client_secret_*.json` (first by file name)
//! 5. a bundled secret, extracted once to
//!    `<app data>/oauth/client_secret.bundled.json`
//!
//! Both the `installed` and the `web` layouts of Google's file are accepted.

use crate::error::{AuthError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable holding an explicit client secret path.
pub const CLIENT_SECRET_ENV: &str = "ANITAIL_GOOGLE_CLIENT_SECRET";

pub const CLIENT_SECRET_FILE_NAME: &str = "client_secret.json";

const WILDCARD_PREFIX: &str = "client_secret_";
const BUNDLED_DIR: &str = "oauth";
const BUNDLED_FILE_NAME: &str = "client_secret.bundled.json";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Deserialize)]
struct RawSecretFile {
    installed: Option<RawClient>,
    web: Option<RawClient>,
}

#[derive(Deserialize)]
struct RawClient {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// OAuth client registration read from a Google client secret file.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uris: Vec<String>,
}

impl ClientSecret {
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawSecretFile = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidClientSecret(e.to_string()))?;
        let client = raw.installed.or(raw.web).ok_or_else(|| {
            AuthError::InvalidClientSecret("expected an `installed` or `web` section".to_string())
        })?;

        if client.client_id.trim().is_empty() {
            return Err(AuthError::InvalidClientSecret(
                "client_id is empty".to_string(),
            ));
        }

        Ok(Self {
            client_id: client.client_id,
            client_secret: client.client_secret.filter(|s| !s.trim().is_empty()),
            auth_uri: client
                .auth_uri
                .unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: client
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            redirect_uris: client.redirect_uris,
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::parse(&json)
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Finds the client secret file to use.
#[derive(Debug, Clone)]
pub struct ClientSecretLocator {
    env_override: Option<PathBuf>,
    app_data_dir: PathBuf,
    working_dir: PathBuf,
    bundled: Option<&'static str>,
}

impl ClientSecretLocator {
    pub fn new(app_data_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            env_override: None,
            app_data_dir: app_data_dir.into(),
            working_dir: working_dir.into(),
            bundled: None,
        }
    }

    /// Locator reading the override from the process environment and
    /// searching the current working directory.
    pub fn from_environment(app_data_dir: impl Into<PathBuf>) -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let env_override = std::env::var(CLIENT_SECRET_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Self {
            env_override,
            ..Self::new(app_data_dir, working_dir)
        }
    }

    pub fn with_env_override(mut self, path: Option<PathBuf>) -> Self {
        self.env_override = path;
        self
    }

    /// Secret compiled into the binary, used when nothing is found on disk.
    pub fn with_bundled(mut self, json: &'static str) -> Self {
        self.bundled = Some(json);
        self
    }

    pub fn bundled_target(&self) -> PathBuf {
        self.app_data_dir.join(BUNDLED_DIR).join(BUNDLED_FILE_NAME)
    }

    /// Path of the first client secret found, if any.
    pub async fn resolve(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.env_override {
            if is_file(path).await {
                debug!(source = "env", "Using client secret");
                return Ok(Some(path.clone()));
            }
        }

        let app_data = self.app_data_dir.join(CLIENT_SECRET_FILE_NAME);
        if is_file(&app_data).await {
            debug!(source = "app_data", "Using client secret");
            return Ok(Some(app_data));
        }

        let cwd = self.working_dir.join(CLIENT_SECRET_FILE_NAME);
        if is_file(&cwd).await {
            debug!(source = "working_dir", "Using client secret");
            return Ok(Some(cwd));
        }

        if let Some(wildcard) = first_wildcard_match(&self.working_dir).await? {
            debug!(source = "working_dir_wildcard", "Using client secret");
            return Ok(Some(wildcard));
        }

        self.extract_bundled().await
    }

    /// Resolve and parse.
    ///
    /// # Errors
    ///
    /// [`AuthError::ClientSecretNotFound`] when no candidate exists.
    pub async fn load(&self) -> Result<ClientSecret> {
        let path = self
            .resolve()
            .await?
            .ok_or(AuthError::ClientSecretNotFound)?;
        ClientSecret::load(&path).await
    }

    async fn extract_bundled(&self) -> Result<Option<PathBuf>> {
        let Some(json) = self.bundled else {
            return Ok(None);
        };

        let target = self.bundled_target();
        if is_file(&target).await {
            return Ok(Some(target));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, json).await?;
        info!(path = %target.display(), "Extracted bundled client secret");
        Ok(Some(target))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn first_wildcard_match(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(String, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(WILDCARD_PREFIX) || !name.ends_with(".json") {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if best.as_ref().map_or(true, |(best_name, _)| name < *best_name) {
            best = Some((name, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INSTALLED: &str = r#"{"installed":{"client_id":"desktop.apps.googleusercontent.com","client_secret":"shh","redirect_uris":["http://localhost"]}}"#;
    const WEB: &str = r#"{"web":{"client_id":"web-client","auth_uri":"https://auth.example","token_uri":"https://token.example"}}"#;

    #[test]
    fn test_parse_installed_layout() {
        let secret = ClientSecret::parse(INSTALLED).unwrap();
        assert_eq!(secret.client_id, "desktop.apps.googleusercontent.com");
        assert_eq!(secret.client_secret.as_deref(), Some("shh"));
        assert_eq!(secret.token_uri, DEFAULT_TOKEN_URI);
        assert!(!format!("{:?}", secret).contains("shh"));
    }

    #[test]
    fn test_parse_web_layout() {
        let secret = ClientSecret::parse(WEB).unwrap();
        assert_eq!(secret.client_id, "web-client");
        assert_eq!(secret.client_secret, None);
        assert_eq!(secret.token_uri, "https://token.example");
    }

    #[test]
    fn test_parse_rejects_unknown_layout() {
        assert!(matches!(
            ClientSecret::parse(r#"{"other":{}}"#),
            Err(AuthError::InvalidClientSecret(_))
        ));
    }

    #[tokio::test]
    async fn test_resolution_order() {
        let app_data = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let locator = ClientSecretLocator::new(app_data.path(), cwd.path());

        assert_eq!(locator.resolve().await.unwrap(), None);

        let wildcard_b = cwd.path().join("client_secret_b.json");
        let wildcard_a = cwd.path().join("client_secret_a.json");
        tokio::fs::write(&wildcard_b, INSTALLED).await.unwrap();
        tokio::fs::write(&wildcard_a, INSTALLED).await.unwrap();
        assert_eq!(locator.resolve().await.unwrap(), Some(wildcard_a));

        let in_cwd = cwd.path().join(CLIENT_SECRET_FILE_NAME);
        tokio::fs::write(&in_cwd, INSTALLED).await.unwrap();
        assert_eq!(locator.resolve().await.unwrap(), Some(in_cwd));

        let in_app_data = app_data.path().join(CLIENT_SECRET_FILE_NAME);
        tokio::fs::write(&in_app_data, INSTALLED).await.unwrap();
        assert_eq!(locator.resolve().await.unwrap(), Some(in_app_data));

        let explicit = cwd.path().join("explicit.json");
        tokio::fs::write(&explicit, WEB).await.unwrap();
        let locator = locator.with_env_override(Some(explicit.clone()));
        assert_eq!(locator.resolve().await.unwrap(), Some(explicit));
    }

    #[tokio::test]
    async fn test_bundled_secret_extracted_once() {
        let app_data = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let locator = ClientSecretLocator::new(app_data.path(), cwd.path()).with_bundled(INSTALLED);

        let first = locator.resolve().await.unwrap().unwrap();
        assert_eq!(first, locator.bundled_target());

        tokio::fs::write(&first, WEB).await.unwrap();
        let second = locator.resolve().await.unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(locator.load().await.unwrap().client_id, "web-client");
    }

    #[tokio::test]
    async fn test_load_without_any_secret() {
        let app_data = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let locator = ClientSecretLocator::new(app_data.path(), cwd.path());

        assert!(matches!(
            locator.load().await,
            Err(AuthError::ClientSecretNotFound)
        ));
    }
}
