use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Invalid authorization code: {0}")]
    InvalidAuthCode(String),

    #[error("OAuth state mismatch")]
    StateMismatch { expected: String, actual: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    /// Silent-only acquisition found no stored credential.
    #[error("No cached Google Drive credential available")]
    NoCachedCredential,

    #[error("Google OAuth client secret file not found")]
    ClientSecretNotFound,

    #[error("Invalid client secret: {0}")]
    InvalidClientSecret(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
