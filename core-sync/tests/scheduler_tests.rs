//! Integration tests for the auto-backup scheduler

mod common;

use bridge_traits::storage::PathResolver;
use bridge_traits::time::Clock;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use common::{sample_library, Device};
use core_sync::{AutoBackupConfig, AutoBackupScheduler, BackupFrequency};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Moves one minute forward every time a backup name is taken.
#[derive(Default)]
struct SteppingClock {
    ticks: AtomicI64,
}

impl SteppingClock {
    fn ticks(&self) -> i64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 8, 30, 0).unwrap()
            + chrono::Duration::minutes(self.ticks())
    }

    fn local_now(&self) -> NaiveDateTime {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        (Utc.with_ymd_and_hms(2024, 6, 20, 8, 30, 0).unwrap() + chrono::Duration::minutes(tick))
            .naive_utc()
    }
}

fn fast_scheduler(device: &Device, clock: Arc<SteppingClock>) -> AutoBackupScheduler {
    AutoBackupScheduler::new(device.packager.clone(), clock)
        .with_interval(|frequency| Duration::from_millis(frequency.hours() * 20))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(condition(), "condition not reached in time");
}

fn backup_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn scheduler(device: &Device) -> AutoBackupScheduler {
    AutoBackupScheduler::new(device.packager.clone(), device.config.clock.clone())
}

#[tokio::test]
async fn test_backup_now_writes_file_and_prunes() {
    let device = Device::new().await;
    device.seed(sample_library()).await;
    let target = device.root.path().join("backups");
    std::fs::create_dir_all(&target).unwrap();
    for (name, age) in [("old_a.backup", 300), ("old_b.zip", 200), ("old_c.backup", 100)] {
        let file = std::fs::File::create(target.join(name)).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age))
            .unwrap();
    }

    let config = AutoBackupConfig {
        enabled: true,
        use_custom_location: true,
        custom_location: Some(target.clone()),
        ..Default::default()
    }
    .with_keep_count(2);

    let execution = scheduler(&device).create_backup_now(&config).await.unwrap();

    assert_eq!(
        execution.file,
        target.join("AniTail_AutoBackup_20240620_083000.backup")
    );
    assert_eq!(
        backup_files(&target),
        vec!["AniTail_AutoBackup_20240620_083000.backup", "old_c.backup"]
    );
}

#[tokio::test]
async fn test_backup_now_defaults_to_auto_backup_dir() {
    let device = Device::new().await;
    let scheduler = scheduler(&device);

    let execution = scheduler
        .create_backup_now(&AutoBackupConfig::default())
        .await
        .unwrap();

    assert_eq!(execution.file.parent(), Some(device.paths.auto_backup_dir().as_path()));
    assert!(execution.file.exists());
    assert_eq!(scheduler.last_error().await, None);
}

#[tokio::test]
async fn test_failed_backup_records_last_error() {
    let device = Device::new().await;
    let blocker = device.root.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let scheduler = scheduler(&device);

    let config = AutoBackupConfig {
        use_custom_location: true,
        custom_location: Some(blocker.join("nested")),
        ..Default::default()
    };
    assert!(scheduler.create_backup_now(&config).await.is_err());
    assert!(scheduler.last_error().await.is_some());

    scheduler
        .create_backup_now(&AutoBackupConfig::default())
        .await
        .unwrap();
    assert_eq!(scheduler.last_error().await, None);
}

#[tokio::test]
async fn test_start_update_and_stop() {
    let device = Device::new().await;
    let scheduler = scheduler(&device);
    let config = AutoBackupConfig {
        enabled: true,
        frequency: BackupFrequency::Weekly,
        ..Default::default()
    };

    scheduler.start_or_update(config.clone()).await;
    assert!(scheduler.is_running().await);

    scheduler.start_or_update(config.clone()).await;
    assert!(scheduler.is_running().await);

    scheduler
        .start_or_update(AutoBackupConfig {
            frequency: BackupFrequency::SixHours,
            ..config.clone()
        })
        .await;
    assert!(scheduler.is_running().await);

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);

    scheduler
        .start_or_update(AutoBackupConfig {
            enabled: false,
            ..config
        })
        .await;
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn test_scheduled_backups_keep_newest() {
    let device = Device::new().await;
    device.seed(sample_library()).await;
    let clock = Arc::new(SteppingClock::default());
    let scheduler = fast_scheduler(&device, clock.clone());
    let target = device.root.path().join("scheduled");
    let config = AutoBackupConfig {
        enabled: true,
        frequency: BackupFrequency::OneHour,
        use_custom_location: true,
        custom_location: Some(target.clone()),
        ..Default::default()
    }
    .with_keep_count(2);

    scheduler.start_or_update(config).await;
    wait_until(|| clock.ticks() >= 5).await;
    scheduler.stop().await;

    let written = clock.ticks();
    let files = backup_files(&target);
    assert_eq!(files.len(), 2);
    let newest = |minutes_after: i64| {
        let stamp = Utc.with_ymd_and_hms(2024, 6, 20, 8, 30, 0).unwrap()
            + chrono::Duration::minutes(minutes_after);
        format!("AniTail_AutoBackup_{}.backup", stamp.format("%Y%m%d_%H%M%S"))
    };
    assert_eq!(files, vec![newest(written - 2), newest(written - 1)]);
    assert_eq!(scheduler.last_error().await, None);
}

#[tokio::test]
async fn test_scheduled_loop_survives_failed_cycle() {
    let device = Device::new().await;
    let clock = Arc::new(SteppingClock::default());
    let scheduler = fast_scheduler(&device, clock.clone());
    let target = device.root.path().join("blocked");
    std::fs::write(&target, b"not a directory").unwrap();
    let config = AutoBackupConfig {
        enabled: true,
        frequency: BackupFrequency::OneHour,
        use_custom_location: true,
        custom_location: Some(target.clone()),
        ..Default::default()
    };

    scheduler.start_or_update(config).await;
    let mut failed = false;
    for _ in 0..2_000 {
        if scheduler.last_error().await.is_some() {
            failed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(failed, "scheduled cycle never reported an error");
    assert!(scheduler.is_running().await);

    std::fs::remove_file(&target).unwrap();
    wait_until(|| target.is_dir() && !backup_files(&target).is_empty()).await;
    scheduler.stop().await;

    assert_eq!(scheduler.last_error().await, None);
    assert!(!backup_files(&target).is_empty());
}

#[tokio::test]
async fn test_same_config_keeps_loop_going() {
    let device = Device::new().await;
    let clock = Arc::new(SteppingClock::default());
    let scheduler = fast_scheduler(&device, clock.clone());
    let config = AutoBackupConfig {
        enabled: true,
        frequency: BackupFrequency::OneHour,
        use_custom_location: true,
        custom_location: Some(device.root.path().join("steady")),
        ..Default::default()
    };

    scheduler.start_or_update(config.clone()).await;
    wait_until(|| clock.ticks() >= 1).await;
    let before = clock.ticks();

    // A restart would reset the 20ms wait every time and starve the loop.
    for _ in 0..40 {
        scheduler.start_or_update(config.clone()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.stop().await;

    assert!(clock.ticks() > before);
}
