//! Error types for the Google Drive backup store

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// Google Drive backup store errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// Drive rejected the bearer token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The backup folder holds no backup blobs
    #[error("No backups found in folder '{folder}'")]
    NoBackupsFound { folder: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// No session could be acquired
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            GoogleDriveError::NoBackupsFound { folder } => {
                BridgeError::NotFound(format!("No backups found in folder '{}'", folder))
            }
            GoogleDriveError::AuthenticationFailed(msg) => {
                BridgeError::OperationFailed(format!("Authentication failed: {}", msg))
            }
            GoogleDriveError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            GoogleDriveError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            GoogleDriveError::Auth(AuthError::Bridge(e)) => e,
            GoogleDriveError::Auth(e) => {
                BridgeError::OperationFailed(format!("Google Drive session: {}", e))
            }
            GoogleDriveError::BridgeError(e) => e,
        }
    }
}
