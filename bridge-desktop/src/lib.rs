//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls
//! - `PreferencesStore` backed by `~/.anitail/preferences.json`
//! - `CredentialStore` backed by `~/.anitail/credentials.json`
//! - `PathResolver` describing the `~/.anitail` layout
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopPaths, JsonPreferencesStore, ReqwestHttpClient};
//! use bridge_traits::PathResolver;
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let paths = DesktopPaths::from_home()?;
//!     let preferences = JsonPreferencesStore::open(paths.preferences_file()).await?;
//!     let http_client = ReqwestHttpClient::new()?;
//!     // Hand these to core_runtime::config::CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod credentials;
mod http;
mod paths;
mod preferences;

pub use credentials::JsonCredentialStore;
pub use http::ReqwestHttpClient;
pub use paths::DesktopPaths;
pub use preferences::JsonPreferencesStore;
