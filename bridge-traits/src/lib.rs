//! # Host Bridge Traits
//!
//! Contracts between the backup engine and the host application.
//!
//! ## Overview
//!
//! The engine never reaches for global state. Everything it needs from the
//! host (network access, preferences, credentials, file locations, a cloud
//! folder, the current time) arrives as one of the traits below, injected as
//! `Arc<dyn Trait>`.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with opt-in retry
//! - [`RemoteBlobStore`](storage::RemoteBlobStore) - Named backup blobs in a remote folder
//!
//! ### Host state
//! - [`PreferencesStore`](storage::PreferencesStore) - Typed preferences with `load()`
//! - [`CredentialStore`](storage::CredentialStore) - Account credentials with `load_credentials()`
//! - [`PathResolver`](storage::PathResolver) - Canonical locations of auxiliary files
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep file paths in the message.
//! A missing remote resource is reported as `BridgeError::NotFound`, which
//! callers match on.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across
//! tokio tasks.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{
    AccountCredentials, CredentialStore, DownloadedBlob, PathResolver, PreferencesStore,
    RemoteBlob, RemoteBlobStore,
};
pub use time::{Clock, FixedClock, SystemClock};
