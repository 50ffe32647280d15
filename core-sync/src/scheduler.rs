//! # Auto Backup Scheduler
//!
//! One background loop per scheduler: sleep for the configured interval,
//! write a timestamped backup, then prune the directory down to the newest
//! `keep_count` backups. A failed cycle is recorded in [`last_error`] and the
//! loop carries on.
//!
//! Replacing or stopping the loop cancels the sleeping task only; a backup
//! that is already being written runs to completion. A successful cycle,
//! scheduled or manual, clears the recorded error.
//!
//! [`last_error`]: AutoBackupScheduler::last_error

use bridge_traits::storage::{PathResolver, PreferencesStore};
use bridge_traits::time::Clock;
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::archive::ArchivePackager;
use crate::error::Result;

const FILE_PREFIX: &str = "AniTail_AutoBackup_";
const FILE_EXTENSION: &str = "backup";
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const MIN_KEEP_COUNT: u32 = 1;
pub const MAX_KEEP_COUNT: u32 = 20;

const PREF_ENABLED: &str = "autoBackupEnabled";
const PREF_FREQUENCY_HOURS: &str = "autoBackupFrequencyHours";
const PREF_KEEP_COUNT: &str = "autoBackupKeepCount";
const PREF_USE_CUSTOM_LOCATION: &str = "autoBackupUseCustomLocation";
const PREF_CUSTOM_LOCATION: &str = "autoBackupCustomLocation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupFrequency {
    OneHour,
    ThreeHours,
    SixHours,
    Daily,
    Weekly,
}

impl BackupFrequency {
    pub fn hours(self) -> u64 {
        match self {
            BackupFrequency::OneHour => 1,
            BackupFrequency::ThreeHours => 3,
            BackupFrequency::SixHours => 6,
            BackupFrequency::Daily => 24,
            BackupFrequency::Weekly => 168,
        }
    }

    /// Unknown values fall back to [`BackupFrequency::Daily`].
    pub fn from_hours(hours: i64) -> Self {
        match hours {
            1 => BackupFrequency::OneHour,
            3 => BackupFrequency::ThreeHours,
            6 => BackupFrequency::SixHours,
            168 => BackupFrequency::Weekly,
            _ => BackupFrequency::Daily,
        }
    }

    pub fn interval(self) -> Duration {
        Duration::from_secs(self.hours() * 60 * 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBackupConfig {
    pub enabled: bool,
    pub frequency: BackupFrequency,
    /// Number of backups kept; always within `1..=20`
    pub keep_count: u32,
    pub use_custom_location: bool,
    pub custom_location: Option<PathBuf>,
}

impl Default for AutoBackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: BackupFrequency::Daily,
            keep_count: 5,
            use_custom_location: false,
            custom_location: None,
        }
    }
}

impl AutoBackupConfig {
    pub fn with_keep_count(mut self, keep_count: i64) -> Self {
        self.keep_count = clamp_keep_count(keep_count);
        self
    }

    /// Read the configuration from `store`, using defaults for unset keys.
    pub async fn from_preferences(store: &dyn PreferencesStore) -> Result<Self> {
        let defaults = Self::default();

        let enabled = store.get_bool(PREF_ENABLED).await?.unwrap_or(defaults.enabled);
        let frequency = store
            .get_i64(PREF_FREQUENCY_HOURS)
            .await?
            .map(BackupFrequency::from_hours)
            .unwrap_or(defaults.frequency);
        let keep_count = store
            .get_i64(PREF_KEEP_COUNT)
            .await?
            .map(clamp_keep_count)
            .unwrap_or(defaults.keep_count);
        let use_custom_location = store
            .get_bool(PREF_USE_CUSTOM_LOCATION)
            .await?
            .unwrap_or(defaults.use_custom_location);
        let custom_location = store
            .get_string(PREF_CUSTOM_LOCATION)
            .await?
            .filter(|location| !location.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            enabled,
            frequency,
            keep_count,
            use_custom_location,
            custom_location,
        })
    }

    /// Directory the backups go to. A custom location is used only when it
    /// is enabled and set.
    pub fn target_directory(&self, paths: &dyn PathResolver) -> PathBuf {
        match (&self.custom_location, self.use_custom_location) {
            (Some(location), true) => location.clone(),
            _ => paths.auto_backup_dir(),
        }
    }
}

fn clamp_keep_count(value: i64) -> u32 {
    value.clamp(MIN_KEEP_COUNT as i64, MAX_KEEP_COUNT as i64) as u32
}

/// A backup written by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoBackupExecution {
    pub file: PathBuf,
}

struct SchedulerInner {
    packager: Arc<ArchivePackager>,
    clock: Arc<dyn Clock>,
    last_error: RwLock<Option<String>>,
}

struct RunningLoop {
    config: AutoBackupConfig,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AutoBackupScheduler {
    inner: Arc<SchedulerInner>,
    running: Mutex<Option<RunningLoop>>,
    interval: fn(BackupFrequency) -> Duration,
}

impl AutoBackupScheduler {
    pub fn new(packager: Arc<ArchivePackager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                packager,
                clock,
                last_error: RwLock::new(None),
            }),
            running: Mutex::new(None),
            interval: BackupFrequency::interval,
        }
    }

    /// Override how long the loop waits between backups. Defaults to
    /// [`BackupFrequency::interval`].
    pub fn with_interval(mut self, interval: fn(BackupFrequency) -> Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the loop for `config`, replacing any loop with a different
    /// configuration. A disabled config stops the loop.
    #[instrument(skip(self))]
    pub async fn start_or_update(&self, config: AutoBackupConfig) {
        let mut running = self.running.lock().await;

        if let Some(current) = running.as_ref() {
            if current.config == config && !current.handle.is_finished() {
                debug!("Auto backup loop already running with this configuration");
                return;
            }
        }
        if let Some(previous) = running.take() {
            previous.token.cancel();
        }
        if !config.enabled {
            info!("Auto backup disabled");
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            config.clone(),
            (self.interval)(config.frequency),
            token.clone(),
        ));
        info!(
            interval_hours = config.frequency.hours(),
            keep_count = config.keep_count,
            "Auto backup loop started"
        );
        *running = Some(RunningLoop {
            config,
            token,
            handle,
        });
    }

    /// Cancel the loop and wait for it to exit. A backup already being
    /// written is finished first.
    pub async fn stop(&self) {
        let previous = self.running.lock().await.take();
        if let Some(previous) = previous {
            previous.token.cancel();
            if let Err(e) = previous.handle.await {
                warn!(error = %e, "Auto backup loop ended abnormally");
            }
            info!("Auto backup loop stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|current| !current.handle.is_finished())
            .unwrap_or(false)
    }

    /// Write one backup for `config` right away and prune old ones.
    #[instrument(skip(self))]
    pub async fn create_backup_now(&self, config: &AutoBackupConfig) -> Result<AutoBackupExecution> {
        self.inner.run_and_record(config).await
    }

    /// Message of the most recent failed cycle, cleared by the next
    /// successful one.
    pub async fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().await.clone()
    }
}

async fn run_loop(
    inner: Arc<SchedulerInner>,
    config: AutoBackupConfig,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if let Err(e) = inner.run_and_record(&config).await {
            warn!(error = %e, "Scheduled backup failed");
        }
    }
    debug!("Auto backup loop exited");
}

impl SchedulerInner {
    async fn run_and_record(&self, config: &AutoBackupConfig) -> Result<AutoBackupExecution> {
        let result = self.run_cycle(config).await;
        *self.last_error.write().await = result.as_ref().err().map(|e| e.to_string());
        result
    }

    async fn run_cycle(&self, config: &AutoBackupConfig) -> Result<AutoBackupExecution> {
        let directory = config.target_directory(self.packager.paths().as_ref());
        tokio::fs::create_dir_all(&directory).await?;

        let file = directory.join(backup_file_name(self.clock.as_ref()));
        self.packager.backup_to(&file).await?;

        let keep = config.keep_count as usize;
        let dir = directory.clone();
        let deleted = tokio::task::spawn_blocking(move || enforce_retention(&dir, keep)).await??;
        info!(
            file = %strip_path(&file.to_string_lossy()),
            pruned = deleted.len(),
            "Auto backup complete"
        );
        Ok(AutoBackupExecution { file })
    }
}

/// `AniTail_AutoBackup_<yyyyMMdd_HHmmss>.backup` at the clock's local time.
pub fn backup_file_name(clock: &dyn Clock) -> String {
    format!(
        "{}{}.{}",
        FILE_PREFIX,
        clock.local_now().format(FILE_TIMESTAMP_FORMAT),
        FILE_EXTENSION
    )
}

fn is_backup_like(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("backup") || ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Keep the `keep` most recently modified backup files in `directory` and
/// delete the rest. Returns the deleted paths.
///
/// Files that cannot be deleted are logged and skipped.
pub fn enforce_retention(directory: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut backups: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if !metadata.is_file() || !is_backup_like(&path) {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        backups.push((path, modified));
    }
    backups.sort_by(|a, b| b.1.cmp(&a.1));

    let mut deleted = Vec::new();
    for (path, _) in backups.into_iter().skip(keep) {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %strip_path(&path.to_string_lossy()), "Pruned old backup");
                deleted.push(path);
            }
            Err(e) => warn!(path = %strip_path(&path.to_string_lossy()), error = %e, "Failed to delete old backup"),
        }
    }
    Ok(deleted)
}
