//! # Archive Packager
//!
//! Builds and restores `.backup` archives: a zip holding the relational
//! library file plus the auxiliary host files.
//!
//! ## Layout
//!
//! ```text
//! song.db                               relational library file
//! accounts.json                         optional, flat key -> base64 map
//! settings.preferences_pb               optional, passed through untouched
//! lastfm_offline.xml                    optional, legacy scrobble queue
//! desktop/preferences.json
//! desktop/credentials.json
//! desktop/lyrics_overrides.json
//! desktop/lastfm_pending_scrobbles.json
//! desktop/database/...                  dump of the live database directory
//! ```
//!
//! ## Crash safety
//!
//! A restore captures the live snapshot first. Any failure after that puts
//! the snapshot back before the error is returned.
//!
//! ## Single flight
//!
//! Backup, restore and cloud sync share one gate per live database. Public
//! entry points take it; the `*_locked` variants are for callers that
//! already hold it.

use bridge_traits::storage::{CredentialStore, PathResolver, PreferencesStore};
use core_library::{JsonLiveDatabase, LiveDatabase, RelationalAdapter};
use core_runtime::logging::{redact_if_sensitive, strip_path};
use core_runtime::CoreConfig;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::accounts::{self, ACCOUNTS_ENTRY};
use crate::error::{Result, SyncError};
use crate::scrobbles::{self, LEGACY_SCROBBLES_ENTRY};

/// Relational library file entry.
pub const SONG_DB_ENTRY: &str = "song.db";

/// Opaque settings blob from other platforms.
pub const SETTINGS_ENTRY: &str = "settings.preferences_pb";

const PREFERENCES_ENTRY: &str = "desktop/preferences.json";
const CREDENTIALS_ENTRY: &str = "desktop/credentials.json";
const LYRICS_OVERRIDES_ENTRY: &str = "desktop/lyrics_overrides.json";
const PENDING_SCROBBLES_ENTRY: &str = "desktop/lastfm_pending_scrobbles.json";
const DATABASE_DIR_ENTRY: &str = "desktop/database";

/// Preference key mirroring the InnerTube cookie.
const INNER_TUBE_COOKIE_PREF: &str = "innerTubeCookie";

pub const WARN_LEGACY_DATABASE: &str =
    "song.db not found; restored desktop database files instead.";
pub const WARN_NO_DATABASE: &str = "No database payload found in backup.";
pub const WARN_PASSTHROUGH_SETTINGS: &str =
    "settings.preferences_pb restored as passthrough (not applied to desktop preferences).";

/// Outcome of [`ArchivePackager::backup_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub backup_file: PathBuf,
    pub includes_song_database: bool,
    pub includes_accounts: bool,
}

/// Outcome of [`ArchivePackager::restore_from`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored_song_database: bool,
    pub restored_accounts: bool,
    pub restored_desktop_preferences: bool,
    pub restored_lyrics_overrides: bool,
    pub restored_lastfm_pending: bool,
    pub warnings: Vec<String>,
}

/// Held while a backup, restore or sync runs.
pub type OperationGuard<'a> = MutexGuard<'a, ()>;

enum EntrySource {
    File(PathBuf),
    Bytes(Vec<u8>),
    Directory(PathBuf),
}

struct PlannedEntry {
    name: String,
    source: EntrySource,
}

pub struct ArchivePackager {
    live: Arc<dyn LiveDatabase>,
    adapter: Arc<RelationalAdapter>,
    preferences: Arc<dyn PreferencesStore>,
    credentials: Arc<dyn CredentialStore>,
    paths: Arc<dyn PathResolver>,
    scratch_dir: PathBuf,
    gate: Mutex<()>,
}

impl ArchivePackager {
    pub fn new(
        config: &CoreConfig,
        live: Arc<dyn LiveDatabase>,
        adapter: RelationalAdapter,
    ) -> Self {
        Self {
            live,
            adapter: Arc::new(adapter),
            preferences: Arc::clone(&config.preferences),
            credentials: Arc::clone(&config.credentials),
            paths: Arc::clone(&config.paths),
            scratch_dir: config.scratch_dir(),
            gate: Mutex::new(()),
        }
    }

    /// Packager over the desktop JSON live database, with the schema
    /// descriptor resolved from `config`.
    pub async fn open(config: &CoreConfig) -> Result<Self> {
        let live = JsonLiveDatabase::open(config.paths.database_dir()).await?;
        let adapter = RelationalAdapter::locate(&config.schema_path, &config.schema_dir).await?;
        Ok(Self::new(config, Arc::new(live), adapter))
    }

    pub fn live(&self) -> &Arc<dyn LiveDatabase> {
        &self.live
    }

    pub fn paths(&self) -> &Arc<dyn PathResolver> {
        &self.paths
    }

    /// Wait for any running operation and take the gate.
    pub async fn lock(&self) -> OperationGuard<'_> {
        self.gate.lock().await
    }

    /// Scratch directory removed when dropped.
    pub(crate) fn scratch(&self, prefix: &str) -> Result<TempDir> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        Ok(tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.scratch_dir)?)
    }

    /// Write a backup archive of the current state to `target`.
    #[instrument(skip_all, fields(target = %strip_path(&target.to_string_lossy())))]
    pub async fn backup_to(&self, target: &Path) -> Result<BackupReport> {
        let guard = self.lock().await;
        self.backup_to_locked(&guard, target).await
    }

    pub async fn backup_to_locked(
        &self,
        _guard: &OperationGuard<'_>,
        target: &Path,
    ) -> Result<BackupReport> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = self.live.snapshot().await?;
        let scratch = self.scratch("anitail_backup_")?;
        let song_db = scratch.path().join(SONG_DB_ENTRY);
        self.adapter.write(&snapshot, &song_db).await?;

        let mut entries = vec![PlannedEntry {
            name: SONG_DB_ENTRY.to_string(),
            source: EntrySource::File(song_db),
        }];

        let account_blob = accounts::encode_accounts(&self.credentials.credentials().await?)?;
        let includes_accounts = account_blob.is_some();
        if let Some(blob) = account_blob {
            entries.push(PlannedEntry {
                name: ACCOUNTS_ENTRY.to_string(),
                source: EntrySource::Bytes(blob),
            });
        }

        let optional_files = [
            (PREFERENCES_ENTRY, self.paths.preferences_file()),
            (SETTINGS_ENTRY, self.paths.passthrough_settings_file()),
            (CREDENTIALS_ENTRY, self.paths.credentials_file()),
            (LYRICS_OVERRIDES_ENTRY, self.paths.lyrics_overrides_file()),
            (PENDING_SCROBBLES_ENTRY, self.paths.pending_scrobbles_file()),
        ];
        for (name, path) in optional_files {
            if is_file(&path).await {
                entries.push(PlannedEntry {
                    name: name.to_string(),
                    source: EntrySource::File(path),
                });
            }
        }

        let legacy_xml = self.paths.legacy_scrobbles_file();
        if is_file(&legacy_xml).await {
            entries.push(PlannedEntry {
                name: LEGACY_SCROBBLES_ENTRY.to_string(),
                source: EntrySource::File(legacy_xml),
            });
        } else if let Some(xml) = self.synthesize_legacy_scrobbles().await? {
            entries.push(PlannedEntry {
                name: LEGACY_SCROBBLES_ENTRY.to_string(),
                source: EntrySource::Bytes(xml.into_bytes()),
            });
        }

        let database_dir = self.paths.database_dir();
        if tokio::fs::metadata(&database_dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            entries.push(PlannedEntry {
                name: DATABASE_DIR_ENTRY.to_string(),
                source: EntrySource::Directory(database_dir),
            });
        }

        let entry_count = entries.len();
        let archive_path = target.to_path_buf();
        tokio::task::spawn_blocking(move || write_archive(&archive_path, entries)).await??;
        drop(scratch);

        info!(
            entries = entry_count,
            songs = snapshot.songs.len(),
            includes_accounts,
            "Backup written"
        );
        Ok(BackupReport {
            backup_file: target.to_path_buf(),
            includes_song_database: true,
            includes_accounts,
        })
    }

    /// Restore the state held in `backup_file`.
    ///
    /// # Errors
    ///
    /// [`SyncError::BackupFileNotFound`] when the file does not exist (nothing
    /// is changed). Any later failure rolls the live database back to its
    /// state before the call.
    #[instrument(skip_all, fields(backup = %strip_path(&backup_file.to_string_lossy())))]
    pub async fn restore_from(&self, backup_file: &Path) -> Result<RestoreReport> {
        let guard = self.lock().await;
        self.restore_from_locked(&guard, backup_file).await
    }

    pub async fn restore_from_locked(
        &self,
        _guard: &OperationGuard<'_>,
        backup_file: &Path,
    ) -> Result<RestoreReport> {
        if !is_file(backup_file).await {
            return Err(SyncError::BackupFileNotFound(backup_file.to_path_buf()));
        }

        let previous = self.live.snapshot().await?;
        match self.restore_steps(backup_file).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(error = %e, "Restore failed; rolling back live database");
                if let Err(rollback) = self.live.replace_all(previous).await {
                    error!(error = %rollback, "Rollback after failed restore also failed");
                }
                Err(e)
            }
        }
    }

    async fn restore_steps(&self, backup_file: &Path) -> Result<RestoreReport> {
        let scratch = self.scratch("anitail_restore_")?;
        let extracted = scratch.path().to_path_buf();
        let source = backup_file.to_path_buf();
        tokio::task::spawn_blocking({
            let extracted = extracted.clone();
            move || extract_archive(&source, &extracted)
        })
        .await??;

        let mut report = RestoreReport::default();

        let song_db = extracted.join(SONG_DB_ENTRY);
        let database_dump = extracted.join(DATABASE_DIR_ENTRY);
        if is_file(&song_db).await {
            let snapshot = self.adapter.read(&song_db).await?;
            debug!(counts = ?snapshot.counts(), "Read relational library file");
            self.live.replace_all(snapshot).await?;
            report.restored_song_database = true;
        } else if tokio::fs::metadata(&database_dump).await.map(|m| m.is_dir()).unwrap_or(false) {
            let target = self.paths.database_dir();
            tokio::task::spawn_blocking(move || replace_directory(&database_dump, &target))
                .await??;
            self.live.initialize().await?;
            report.restored_song_database = true;
            warn!("Restored desktop database files instead of the relational file");
            report.warnings.push(WARN_LEGACY_DATABASE.to_string());
        } else {
            report.warnings.push(WARN_NO_DATABASE.to_string());
        }

        report.restored_desktop_preferences =
            copy_if_present(&extracted.join(PREFERENCES_ENTRY), &self.paths.preferences_file())
                .await?;

        if copy_if_present(
            &extracted.join(SETTINGS_ENTRY),
            &self.paths.passthrough_settings_file(),
        )
        .await?
        {
            report.warnings.push(WARN_PASSTHROUGH_SETTINGS.to_string());
        }

        copy_if_present(&extracted.join(CREDENTIALS_ENTRY), &self.paths.credentials_file())
            .await?;

        report.restored_lyrics_overrides = copy_if_present(
            &extracted.join(LYRICS_OVERRIDES_ENTRY),
            &self.paths.lyrics_overrides_file(),
        )
        .await?;

        report.restored_lastfm_pending = copy_if_present(
            &extracted.join(PENDING_SCROBBLES_ENTRY),
            &self.paths.pending_scrobbles_file(),
        )
        .await?;

        let legacy_xml = extracted.join(LEGACY_SCROBBLES_ENTRY);
        if copy_if_present(&legacy_xml, &self.paths.legacy_scrobbles_file()).await?
            && !report.restored_lastfm_pending
        {
            let xml = tokio::fs::read_to_string(&legacy_xml).await?;
            if let Some(pending) = scrobbles::extract_pending_json(&xml) {
                write_file(&self.paths.pending_scrobbles_file(), pending.as_bytes()).await?;
                report.restored_lastfm_pending = true;
            }
        }

        if report.restored_desktop_preferences {
            self.preferences.load().await?;
        }
        self.credentials.load_credentials().await?;

        let accounts_file = extracted.join(ACCOUNTS_ENTRY);
        if is_file(&accounts_file).await {
            report.restored_accounts = self.apply_account_blob(&accounts_file).await?;
        }

        drop(scratch);
        info!(
            song_database = report.restored_song_database,
            accounts = report.restored_accounts,
            warnings = report.warnings.len(),
            "Restore complete"
        );
        Ok(report)
    }

    async fn apply_account_blob(&self, path: &Path) -> Result<bool> {
        let raw = tokio::fs::read_to_string(path).await?;
        let decoded = accounts::decode_accounts(&raw)?;
        if decoded.is_empty() {
            return Ok(false);
        }

        let current = self.credentials.credentials().await?;
        let updated = accounts::apply_accounts(current, &decoded);
        self.credentials.save_credentials(updated).await?;

        if let Some(cookie) = decoded.get("innerTubeCookie") {
            self.preferences
                .set_string(INNER_TUBE_COOKIE_PREF, cookie)
                .await?;
        }
        let account = decoded
            .get("accountEmail")
            .map(|email| redact_if_sensitive("accountEmail", email))
            .unwrap_or_default();
        debug!(keys = decoded.len(), account = %account, "Applied account blob");
        Ok(true)
    }

    async fn synthesize_legacy_scrobbles(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.paths.pending_scrobbles_file()).await {
            Ok(pending) => Ok(scrobbles::encode_pending_xml(&pending)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn write_file(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, contents).await?;
    Ok(())
}

/// Copy `source` over `target` when it exists. Returns whether it did.
async fn copy_if_present(source: &Path, target: &Path) -> Result<bool> {
    if !is_file(source).await {
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(source, target).await?;
    Ok(true)
}

// =============================================================================
// Blocking zip and directory work
// =============================================================================

fn write_archive(target: &Path, entries: Vec<PlannedEntry>) -> Result<()> {
    if target.exists() {
        std::fs::remove_file(target)?;
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(target)?);
    for entry in entries {
        match entry.source {
            EntrySource::File(path) => {
                zip.start_file(entry.name.as_str(), options)?;
                std::io::copy(&mut File::open(&path)?, &mut zip)?;
            }
            EntrySource::Bytes(bytes) => {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(&bytes)?;
            }
            EntrySource::Directory(root) => {
                add_directory(&mut zip, &root, &root, &entry.name, options)?;
            }
        }
    }
    zip.finish()?.sync_all()?;
    Ok(())
}

fn add_directory(
    zip: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let path = child.path();
        let file_type = child.file_type()?;
        if file_type.is_dir() {
            add_directory(zip, root, &path, prefix, options)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| SyncError::TaskFailed(e.to_string()))?;
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            zip.start_file(format!("{}/{}", prefix, relative.join("/")), options)?;
            std::io::copy(&mut File::open(&path)?, zip)?;
        }
    }
    Ok(())
}

/// Extract every entry under `destination`, rejecting entries that would
/// land outside it.
fn extract_archive(source: &Path, destination: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(source)?)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| SyncError::UnsafeArchiveEntry(entry.name().to_string()))?;
        let target = destination.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn replace_directory(source: &Path, target: &Path) -> Result<()> {
    match std::fs::remove_dir_all(target) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    copy_tree(source, target)
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;
    for child in std::fs::read_dir(source)? {
        let child = child?;
        let destination = target.join(child.file_name());
        if child.file_type()?.is_dir() {
            copy_tree(&child.path(), &destination)?;
        } else {
            std::fs::copy(child.path(), &destination)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_rejects_escaping_entry() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        zip.start_file("../escape.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"nope").unwrap();
        zip.finish().unwrap();

        let destination = dir.path().join("out");
        std::fs::create_dir_all(&destination).unwrap();
        let result = extract_archive(&archive, &destination);

        assert!(matches!(result, Err(SyncError::UnsafeArchiveEntry(ref name)) if name == "../escape.txt"));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_directory_dump_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("database");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::fs::write(source.join("songs.json"), b"[]").unwrap();
        std::fs::write(source.join("nested/extra.bin"), b"\x00\x01").unwrap();

        let archive = dir.path().join("dump.zip");
        write_archive(
            &archive,
            vec![PlannedEntry {
                name: DATABASE_DIR_ENTRY.to_string(),
                source: EntrySource::Directory(source),
            }],
        )
        .unwrap();

        let extracted = dir.path().join("extracted");
        extract_archive(&archive, &extracted).unwrap();
        assert_eq!(
            std::fs::read(extracted.join("desktop/database/nested/extra.bin")).unwrap(),
            b"\x00\x01"
        );

        let target = dir.path().join("restored");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.json"), b"{}").unwrap();
        replace_directory(&extracted.join(DATABASE_DIR_ENTRY), &target).unwrap();

        assert!(target.join("songs.json").exists());
        assert!(target.join("nested/extra.bin").exists());
        assert!(!target.join("stale.json").exists());
    }

    #[test]
    fn test_write_archive_replaces_existing_target() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("backup.backup");
        std::fs::write(&archive, b"old contents").unwrap();

        write_archive(
            &archive,
            vec![PlannedEntry {
                name: "desktop/preferences.json".to_string(),
                source: EntrySource::Bytes(b"{}".to_vec()),
            }],
        )
        .unwrap();

        let reader = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(reader.len(), 1);
        assert!(reader.file_names().any(|n| n == "desktop/preferences.json"));
    }
}
