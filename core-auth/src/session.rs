//! # Drive Session Manager
//!
//! Obtains an authorized Google Drive session for the backup client.
//!
//! ## Overview
//!
//! A session is an access token for the `drive.file` scope. It can be
//! acquired in three ways ([`SessionMode`]):
//!
//! - `Interactive`: run the browser consent flow, always
//! - `SilentCached`: reuse the cached token, refreshing it when expired; fall
//!   back to the browser flow when nothing usable is cached
//! - `SilentOnly`: reuse the cached token or fail with
//!   [`AuthError::NoCachedCredential`] (opportunistic restore at startup)
//!
//! The browser step is delegated to an [`AuthorizationPrompt`] supplied by the
//! host: it opens the consent URL and returns the loopback callback's `code`
//! and `state`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = DriveSessionManager::new(locator, TokenStore::in_app_data(&app_data), http, prompt);
//! if !manager.try_silent_restore().await {
//!     let email = manager.sign_in().await?;
//! }
//! let token = manager.access_token().await?;
//! ```

use crate::client_secret::ClientSecretLocator;
use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager};
use crate::token_store::TokenStore;
use crate::types::{OAuthTokens, SessionMode};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Loopback address the consent page redirects to.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/Callback";

const ABOUT_URL: &str = "https://www.googleapis.com/drive/v3/about?fields=user(emailAddress)";

/// Parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    pub state: String,
}

/// Host side of the browser consent step.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Redirect URI the prompt listens on.
    fn redirect_uri(&self) -> String {
        DEFAULT_REDIRECT_URI.to_string()
    }

    /// Show `authorization_url` to the user and wait for the callback.
    async fn authorize(&self, authorization_url: &str) -> Result<AuthorizationCallback>;
}

/// Source of bearer tokens for Drive requests.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    user: Option<AboutUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    email_address: Option<String>,
}

/// Google Drive session acquisition and sign-in state.
pub struct DriveSessionManager {
    locator: ClientSecretLocator,
    token_store: TokenStore,
    http_client: Arc<dyn HttpClient>,
    prompt: Arc<dyn AuthorizationPrompt>,
    flow: Mutex<Option<Arc<OAuthFlowManager>>>,
    /// Held across acquisition so concurrent callers share one refresh.
    tokens: Mutex<Option<OAuthTokens>>,
    signed_in_email: RwLock<Option<String>>,
}

impl DriveSessionManager {
    pub fn new(
        locator: ClientSecretLocator,
        token_store: TokenStore,
        http_client: Arc<dyn HttpClient>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Self {
        Self {
            locator,
            token_store,
            http_client,
            prompt,
            flow: Mutex::new(None),
            tokens: Mutex::new(None),
            signed_in_email: RwLock::new(None),
        }
    }

    /// Whether a client secret can be found.
    pub async fn is_configured(&self) -> bool {
        matches!(self.locator.resolve().await, Ok(Some(_)))
    }

    /// E-mail of the signed-in account, when known.
    pub async fn signed_in_email(&self) -> Option<String> {
        self.signed_in_email.read().await.clone()
    }

    /// Acquire usable tokens according to `mode`.
    #[instrument(skip(self))]
    pub async fn acquire(&self, mode: SessionMode) -> Result<OAuthTokens> {
        let mut current = self.tokens.lock().await;

        if mode != SessionMode::Interactive {
            let cached = match current.clone() {
                Some(tokens) => Some(tokens),
                None => self.token_store.retrieve_tokens().await?,
            };

            if let Some(tokens) = cached {
                if !tokens.is_expired() {
                    debug!("Reusing cached Drive credential");
                    *current = Some(tokens.clone());
                    return Ok(tokens);
                }

                if tokens.can_refresh() {
                    let refresh_token = tokens.refresh_token.as_deref().unwrap_or_default();
                    let flow = self.flow().await?;
                    match flow.refresh_access_token(refresh_token).await {
                        Ok(fresh) => {
                            self.token_store.store_tokens(&fresh).await?;
                            *current = Some(fresh.clone());
                            return Ok(fresh);
                        }
                        Err(e) if !mode.allows_prompt() => return Err(e),
                        Err(e) => warn!(error = %e, "Refresh failed; falling back to consent"),
                    }
                }
            }

            if !mode.allows_prompt() {
                return Err(AuthError::NoCachedCredential);
            }
        }

        let fresh = self.authorize_interactively().await?;
        self.token_store.store_tokens(&fresh).await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Run the browser flow and sign in. Returns the account e-mail.
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<Option<String>> {
        let tokens = self.acquire(SessionMode::Interactive).await?;
        let email = self.fetch_current_user_email(&tokens).await?;
        *self.signed_in_email.write().await = email.clone();
        info!(has_email = email.is_some(), "Signed in to Google Drive");
        Ok(email)
    }

    /// Restore a previous session without user interaction.
    #[instrument(skip(self))]
    pub async fn try_silent_restore(&self) -> bool {
        let restored = async {
            let tokens = self.acquire(SessionMode::SilentOnly).await?;
            self.fetch_current_user_email(&tokens).await
        }
        .await;

        match restored {
            Ok(email) => {
                *self.signed_in_email.write().await = email;
                true
            }
            Err(e) => {
                debug!(error = %e, "Silent Drive restore unavailable");
                false
            }
        }
    }

    /// Forget the session and delete the token cache.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        *self.tokens.lock().await = None;
        *self.flow.lock().await = None;
        *self.signed_in_email.write().await = None;
        self.token_store.clear().await?;
        info!("Signed out of Google Drive");
        Ok(())
    }

    async fn flow(&self) -> Result<Arc<OAuthFlowManager>> {
        let mut flow = self.flow.lock().await;
        if let Some(existing) = flow.as_ref() {
            return Ok(existing.clone());
        }

        let secret = self.locator.load().await?;
        let config = OAuthConfig::google_drive(&secret, self.prompt.redirect_uri());
        let created = Arc::new(OAuthFlowManager::new(config, self.http_client.clone()));
        *flow = Some(created.clone());
        Ok(created)
    }

    async fn authorize_interactively(&self) -> Result<OAuthTokens> {
        let flow = self.flow().await?;
        let (url, verifier) = flow.build_auth_url()?;
        let callback = self.prompt.authorize(&url).await?;
        flow.exchange_code(&callback.code, &callback.state, &verifier)
            .await
    }

    async fn fetch_current_user_email(&self, tokens: &OAuthTokens) -> Result<Option<String>> {
        let request = HttpRequest::new(HttpMethod::Get, ABOUT_URL).bearer_token(&tokens.access_token);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::AuthenticationFailed(format!(
                "Drive about endpoint returned {}",
                response.status
            )));
        }

        let about: AboutResponse = response.json()?;
        Ok(about
            .user
            .and_then(|user| user.email_address)
            .filter(|email| !email.trim().is_empty()))
    }
}

#[async_trait]
impl AccessTokenProvider for DriveSessionManager {
    async fn access_token(&self) -> Result<String> {
        Ok(self.acquire(SessionMode::SilentCached).await?.access_token)
    }
}
