//! # Google Drive Provider
//!
//! Implements `RemoteBlobStore` for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Resolution (or creation) of one dedicated backup folder
//! - Upload that replaces a blob with the same name in place
//! - Download of the most recently modified backup
//! - Listing of backups, newest first
//!
//! Bearer tokens come from an injected `AccessTokenProvider`, normally the
//! `core-auth` session manager. An empty backup folder surfaces as
//! `BridgeError::NotFound` so a first-ever sync is not treated as a failure.

pub mod error;
pub mod store;
pub mod types;

pub use error::{GoogleDriveError, Result};
pub use store::{GoogleDriveBackupStore, DEFAULT_LIST_LIMIT};
