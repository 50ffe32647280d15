//! # Backup & Sync Module
//!
//! Packages the music library into portable backup archives, restores them,
//! and keeps the library in step with a remote copy.
//!
//! ## Overview
//!
//! - Writing and restoring `.backup` archives with rollback on failure
//! - Reconciling a local and a remote library snapshot (smart merge)
//! - Uploading and downloading backups through a [`RemoteBlobStore`]
//! - Periodic local backups with retention
//!
//! ## Components
//!
//! - **Archive Packager** (`archive`): zip layout, restore ordering, operation gate
//! - **Account blob** (`accounts`): base64 account values carried in `accounts.json`
//! - **Legacy scrobbles** (`scrobbles`): XML wrapper for older mobile builds
//! - **Merge Engine** (`merge`): per-entity merge rules
//! - **Cloud Sync** (`cloud`): smart-merge flow over a remote store
//! - **Scheduler** (`scheduler`): auto-backup loop and retention
//!
//! [`RemoteBlobStore`]: bridge_traits::storage::RemoteBlobStore

pub mod accounts;
pub mod archive;
pub mod cloud;
pub mod error;
pub mod merge;
pub mod scheduler;
pub mod scrobbles;

pub use archive::{ArchivePackager, BackupReport, OperationGuard, RestoreReport};
pub use cloud::{CloudSyncCoordinator, CloudSyncReport};
pub use error::{Result, SyncError};
pub use merge::merge_snapshots;
pub use scheduler::{
    enforce_retention, AutoBackupConfig, AutoBackupExecution, AutoBackupScheduler,
    BackupFrequency,
};
