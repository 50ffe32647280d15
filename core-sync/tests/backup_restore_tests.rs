//! Integration tests for archive backup and restore
//!
//! These tests verify:
//! - Backup → restore reproduces the library and auxiliary files
//! - Account values travel through `accounts.json`
//! - Legacy archive shapes (database dump, XML scrobble queue)
//! - Rollback when a restore fails partway through
//! - Rejection of zip entries escaping the extraction directory

mod common;

use bridge_traits::storage::{AccountCredentials, PathResolver, PreferencesStore};
use common::{other_library, sample_library, song_ids, Device};
use core_library::Song;
use core_sync::archive::{WARN_LEGACY_DATABASE, WARN_NO_DATABASE, WARN_PASSTHROUGH_SETTINGS};
use core_sync::SyncError;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn entry_names(archive: &Path) -> Vec<String> {
    let reader = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut names: Vec<String> = reader.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn write_zip(target: &Path, entries: &[(&str, &[u8])]) {
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    let mut zip = ZipWriter::new(File::create(target).unwrap());
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

#[tokio::test]
async fn test_backup_then_restore_round_trip() {
    let device = Device::new().await;
    device.seed(sample_library()).await;
    device
        .preferences
        .set_string("theme", "dark")
        .await
        .unwrap();
    device
        .credentials
        .save_credentials(AccountCredentials {
            account_name: "listener".to_string(),
            inner_tube_cookie: "SAPISID=abc".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    tokio::fs::write(device.paths.lyrics_overrides_file(), b"{\"s1\":\"la la\"}")
        .await
        .unwrap();
    tokio::fs::write(
        device.paths.pending_scrobbles_file(),
        br#"[{"track":"Morning Light"}]"#,
    )
    .await
    .unwrap();

    let target = device.out_file("manual.backup");
    let report = device.packager.backup_to(&target).await.unwrap();

    assert_eq!(report.backup_file, target);
    assert!(report.includes_song_database);
    assert!(report.includes_accounts);
    let names = entry_names(&target);
    for expected in [
        "song.db",
        "accounts.json",
        "desktop/preferences.json",
        "desktop/credentials.json",
        "desktop/lyrics_overrides.json",
        "desktop/lastfm_pending_scrobbles.json",
        "lastfm_offline.xml",
        "desktop/database/songs.json",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}: {names:?}");
    }

    // Diverge from the backed-up state.
    device.seed(other_library()).await;
    tokio::fs::remove_file(device.paths.lyrics_overrides_file())
        .await
        .unwrap();
    device
        .credentials
        .save_credentials(AccountCredentials::default())
        .await
        .unwrap();

    let restored = device.packager.restore_from(&target).await.unwrap();

    assert!(restored.restored_song_database);
    assert!(restored.restored_accounts);
    assert!(restored.restored_desktop_preferences);
    assert!(restored.restored_lyrics_overrides);
    assert!(restored.restored_lastfm_pending);
    assert!(restored.warnings.is_empty(), "{:?}", restored.warnings);

    let snapshot = device.snapshot().await;
    assert_eq!(song_ids(&snapshot), vec!["s1", "s2"]);
    let liked = snapshot.songs.iter().find(|s| s.id == "s1").unwrap();
    assert!(liked.liked);
    assert_eq!(liked.total_play_time, 180_000);
    assert_eq!(snapshot.playlist_song_maps.len(), 2);
    assert_eq!(snapshot.search_history.len(), 1);

    let credentials = device.credentials.credentials().await.unwrap();
    assert_eq!(credentials.account_name, "listener");
    assert_eq!(
        device.preferences.get_string("innerTubeCookie").await.unwrap(),
        Some("SAPISID=abc".to_string())
    );
    assert_eq!(
        device.preferences.get_string("theme").await.unwrap(),
        Some("dark".to_string())
    );
    assert!(device.paths.lyrics_overrides_file().exists());
}

#[tokio::test]
async fn test_backup_without_accounts_omits_blob() {
    let device = Device::new().await;
    device.seed(sample_library()).await;

    let target = device.out_file("plain.backup");
    let report = device.packager.backup_to(&target).await.unwrap();

    assert!(!report.includes_accounts);
    let names = entry_names(&target);
    assert!(!names.iter().any(|n| n == "accounts.json"));
    assert!(!names.iter().any(|n| n == "lastfm_offline.xml"));
}

#[tokio::test]
async fn test_backup_overwrites_existing_target() {
    let device = Device::new().await;
    device.seed(sample_library()).await;
    let target = device.out_file("again.backup");

    device.packager.backup_to(&target).await.unwrap();
    device.seed(other_library()).await;
    device.packager.backup_to(&target).await.unwrap();

    device.seed(Default::default()).await;
    device.packager.restore_from(&target).await.unwrap();
    assert_eq!(song_ids(&device.snapshot().await), vec!["s3"]);
}

#[tokio::test]
async fn test_restore_missing_file_changes_nothing() {
    let device = Device::new().await;
    device.seed(sample_library()).await;

    let missing = device.out_file("nope.backup");
    let result = device.packager.restore_from(&missing).await;

    assert!(matches!(result, Err(SyncError::BackupFileNotFound(ref p)) if p == &missing));
    assert_eq!(device.snapshot().await, sample_library());
}

#[tokio::test]
async fn test_restore_legacy_database_dump() {
    let device = Device::new().await;
    device.seed(sample_library()).await;

    let songs = serde_json::to_vec(&vec![Song::new("legacy-1", "Old Favourite")]).unwrap();
    let xml = b"<?xml version='1.0' encoding='utf-8' standalone='yes' ?><map><string name=\"pending_scrobbles\">[{&quot;track&quot;:&quot;Old&quot;}]</string></map>";
    let archive = device.out_file("legacy.backup");
    write_zip(
        &archive,
        &[
            ("desktop/database/songs.json", songs.as_slice()),
            ("settings.preferences_pb", b"\x0a\x02\x08\x01"),
            ("lastfm_offline.xml", xml),
        ],
    );

    let report = device.packager.restore_from(&archive).await.unwrap();

    assert!(report.restored_song_database);
    assert!(report.restored_lastfm_pending);
    assert_eq!(
        report.warnings,
        vec![
            WARN_LEGACY_DATABASE.to_string(),
            WARN_PASSTHROUGH_SETTINGS.to_string()
        ]
    );
    assert_eq!(song_ids(&device.snapshot().await), vec!["legacy-1"]);
    assert_eq!(
        tokio::fs::read_to_string(device.paths.pending_scrobbles_file())
            .await
            .unwrap(),
        r#"[{"track":"Old"}]"#
    );
    assert!(device.paths.passthrough_settings_file().exists());
    assert!(device.paths.legacy_scrobbles_file().exists());
}

#[tokio::test]
async fn test_restore_without_database_payload_warns() {
    let device = Device::new().await;
    device.seed(sample_library()).await;

    let archive = device.out_file("prefs-only.backup");
    write_zip(&archive, &[("desktop/preferences.json", b"{\"theme\":\"light\"}")]);

    let report = device.packager.restore_from(&archive).await.unwrap();

    assert!(!report.restored_song_database);
    assert!(report.restored_desktop_preferences);
    assert_eq!(report.warnings, vec![WARN_NO_DATABASE.to_string()]);
    assert_eq!(device.snapshot().await, sample_library());
    assert_eq!(
        device.preferences.get_string("theme").await.unwrap(),
        Some("light".to_string())
    );
}

#[tokio::test]
async fn test_failed_restore_rolls_back_live_database() {
    let device = Device::with_failing_credentials().await;
    device.seed(sample_library()).await;
    let target = device.out_file("before.backup");
    device.packager.backup_to(&target).await.unwrap();

    device.seed(other_library()).await;
    let result = device.packager.restore_from(&target).await;

    assert!(matches!(result, Err(SyncError::Bridge(_))));
    assert_eq!(device.snapshot().await, other_library());
}

#[tokio::test]
async fn test_restore_rejects_escaping_entries() {
    let device = Device::new().await;
    device.seed(sample_library()).await;

    let archive = device.out_file("evil.backup");
    write_zip(
        &archive,
        &[("song.db", b"not a database"), ("../../escaped.txt", b"gotcha")],
    );

    let result = device.packager.restore_from(&archive).await;

    assert!(matches!(result, Err(SyncError::UnsafeArchiveEntry(_))));
    assert_eq!(device.snapshot().await, sample_library());
    assert!(!device.root.path().join("escaped.txt").exists());
}
