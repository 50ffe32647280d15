//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `music-backup-workspace`
//! and enable `desktop-shims` to get the desktop bridges (reqwest HTTP client,
//! JSON-file preference and credential stores, `~/.anitail` path layout)
//! without wiring each crate individually.

pub use core_runtime as runtime;
pub use core_sync as sync;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
