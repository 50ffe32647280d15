//! OAuth 2.0 Authorization Flow with PKCE
//!
//! Implements the installed-app authorization code flow (RFC 6749) with
//! PKCE (RFC 7636, `S256`) against Google's OAuth endpoints.
//!
//! # Overview
//!
//! - [`OAuthFlowManager::build_auth_url`] produces the consent URL and the
//!   [`PkceVerifier`] that must be kept until the callback arrives
//! - [`OAuthFlowManager::exchange_code`] checks the callback `state` and
//!   trades the code for tokens
//! - [`OAuthFlowManager::refresh_access_token`] renews an expired access
//!   token, keeping the old refresh token when Google does not rotate it
//!
//! # Security
//!
//! Codes, verifiers and tokens are never logged.
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_auth::client_secret::ClientSecret;
//! use std::sync::Arc;
//!
//! # async fn example(secret: ClientSecret, http_client: Arc<dyn bridge_traits::http::HttpClient>) -> core_auth::Result<()> {
//! let config = OAuthConfig::google_drive(&secret, "http://localhost:8888/Callback");
//! let flow = OAuthFlowManager::new(config, http_client);
//! let (auth_url, verifier) = flow.build_auth_url()?;
//! // Open auth_url, wait for the redirect...
//! # let (code, state) = ("code".to_string(), verifier.state().to_string());
//! let tokens = flow.exchange_code(&code, &state, &verifier).await?;
//! # Ok(())
//! # }
//! ```

use crate::client_secret::ClientSecret;
use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Per-file access to files the app created or opened.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// OAuth 2.0 client configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Absent for public clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    /// Configuration for Drive backups with the `drive.file` scope.
    pub fn google_drive(secret: &ClientSecret, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
            auth_url: secret.auth_uri.clone(),
            token_url: secret.token_uri.clone(),
        }
    }
}

/// PKCE code verifier plus the CSRF `state` of one authorization attempt.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes of verifier and 16 of state, URL-safe base64 without
    /// padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// `BASE64URL(SHA256(verifier))`
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// OAuth 2.0 authorization code flow.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent URL.
    ///
    /// Requests offline access and forces the consent screen so Google
    /// returns a refresh token even for a returning user.
    #[instrument(skip(self))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", verifier.state())
            .append_pair("code_challenge", &verifier.challenge())
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        debug!("Built authorization URL");
        Ok((url.to_string(), verifier))
    }

    /// Exchange the callback `code` for tokens.
    ///
    /// # Errors
    ///
    /// - [`AuthError::StateMismatch`] when `state` is not the one issued
    /// - [`AuthError::InvalidAuthCode`] when the token endpoint rejects the code
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        if state != verifier.state() {
            warn!("OAuth state mismatch");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: state.to_string(),
            });
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http_client
            .execute(self.token_request(&params)?)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let detail = error_detail(&response);
            warn!(status = response.status, "Authorization code exchange failed");
            return Err(AuthError::InvalidAuthCode(format!(
                "Token endpoint returned {}: {}",
                response.status, detail
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        info!(expires_in = token.expires_in, "Exchanged authorization code");
        Ok(OAuthTokens::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
        ))
    }

    /// Obtain a fresh access token.
    ///
    /// Transport failures and 5xx responses are retried; a 4xx means the
    /// refresh token was revoked and is returned immediately.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http_client
            .execute_with_retry(self.token_request(&params)?, RetryPolicy::default())
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        if !response.is_success() {
            let detail = error_detail(&response);
            warn!(status = response.status, "Token refresh failed");
            return Err(AuthError::TokenRefreshFailed(format!(
                "Token endpoint returned {}: {}",
                response.status, detail
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        info!(expires_in = token.expires_in, "Refreshed access token");
        Ok(OAuthTokens::new(
            token.access_token,
            token
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            token.expires_in,
        ))
    }

    fn token_request(&self, params: &[(&str, &str)]) -> Result<HttpRequest> {
        let body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;
        Ok(
            HttpRequest::new(HttpMethod::Post, self.config.token_url.clone()).body_with_type(
                Bytes::from(body),
                "application/x-www-form-urlencoded",
            ),
        )
    }
}

fn error_detail(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}
