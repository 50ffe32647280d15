//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the backup engine:
//! - Logging and tracing bootstrap
//! - Configuration management with injected host bridges
//!
//! Every other core crate takes a [`config::CoreConfig`] rather than reaching
//! for global state, so the engine can be exercised against in-memory fakes.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, RemoteStoreConfig};
pub use error::{Error, Result};
