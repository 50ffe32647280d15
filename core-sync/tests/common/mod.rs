//! Shared fixtures for the core-sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{DesktopPaths, JsonCredentialStore, JsonPreferencesStore};
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::{
        AccountCredentials, CredentialStore, DownloadedBlob, PathResolver, RemoteBlob,
        RemoteBlobStore,
    },
    time::FixedClock,
};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use core_library::{
    Album, Artist, Event, LibrarySnapshot, Playlist, PlaylistSongMap, RelatedSongMap,
    SearchHistory, Song, SongArtistMap,
};
use core_runtime::CoreConfig;
use core_sync::ArchivePackager;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

pub const SCHEMA_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../schemas/26.json");
pub const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../schemas");

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

// ============================================================================
// Device harness
// ============================================================================

/// One simulated desktop install rooted in a temp directory.
pub struct Device {
    pub root: TempDir,
    pub paths: Arc<DesktopPaths>,
    pub preferences: Arc<JsonPreferencesStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub config: CoreConfig,
    pub packager: Arc<ArchivePackager>,
}

impl Device {
    pub async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let paths = Arc::new(DesktopPaths::rooted_at(root.path()));
        let credentials: Arc<dyn CredentialStore> = Arc::new(
            JsonCredentialStore::open(paths.credentials_file())
                .await
                .unwrap(),
        );
        Self::with_credentials(root, paths, credentials).await
    }

    /// Device whose credential store fails to reload from disk.
    pub async fn with_failing_credentials() -> Self {
        let root = TempDir::new().unwrap();
        let paths = Arc::new(DesktopPaths::rooted_at(root.path()));
        Self::with_credentials(root, paths, Arc::new(FailingCredentialStore)).await
    }

    async fn with_credentials(
        root: TempDir,
        paths: Arc<DesktopPaths>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let preferences = Arc::new(
            JsonPreferencesStore::open(paths.preferences_file())
                .await
                .unwrap(),
        );
        let config = CoreConfig::builder()
            .schema_path(SCHEMA_FILE)
            .schema_dir(SCHEMA_DIR)
            .temp_dir(root.path().join("tmp"))
            .paths(paths.clone())
            .preferences(preferences.clone())
            .credentials(credentials.clone())
            .clock(Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2024, 6, 20, 8, 30, 0).unwrap(),
            )))
            .build()
            .unwrap();
        let packager = Arc::new(ArchivePackager::open(&config).await.unwrap());

        Self {
            root,
            paths,
            preferences,
            credentials,
            config,
            packager,
        }
    }

    pub async fn seed(&self, snapshot: LibrarySnapshot) {
        self.packager.live().replace_all(snapshot).await.unwrap();
    }

    pub async fn snapshot(&self) -> LibrarySnapshot {
        self.packager.live().snapshot().await.unwrap()
    }

    pub fn out_file(&self, name: &str) -> PathBuf {
        self.root.path().join("out").join(name)
    }

    pub async fn backup_bytes(&self) -> Bytes {
        let target = self.out_file("export.backup");
        self.packager.backup_to(&target).await.unwrap();
        Bytes::from(tokio::fs::read(&target).await.unwrap())
    }
}

pub fn song_ids(snapshot: &LibrarySnapshot) -> Vec<String> {
    let mut ids: Vec<String> = snapshot.songs.iter().map(|s| s.id.clone()).collect();
    ids.sort();
    ids
}

// ============================================================================
// Sample libraries
// ============================================================================

pub fn sample_library() -> LibrarySnapshot {
    let mut liked = Song::new("s1", "Morning Light");
    liked.liked = true;
    liked.liked_date = Some(at(2, 10));
    liked.date_modified = Some(at(2, 10));
    liked.album_id = Some("al1".to_string());
    liked.total_play_time = 180_000;

    LibrarySnapshot {
        songs: vec![liked, Song::new("s2", "Night Drive")],
        artists: vec![Artist::new("ar1", "The Daybreaks", at(1, 9))],
        albums: vec![Album::new("al1", "Sunrise", at(1, 9))],
        playlists: vec![Playlist::new("p1", "Commute")],
        playlist_song_maps: vec![
            PlaylistSongMap {
                id: 1,
                playlist_id: "p1".to_string(),
                song_id: "s2".to_string(),
                position: 0,
                set_video_id: None,
            },
            PlaylistSongMap {
                id: 2,
                playlist_id: "p1".to_string(),
                song_id: "s1".to_string(),
                position: 1,
                set_video_id: None,
            },
        ],
        song_artist_maps: vec![SongArtistMap {
            song_id: "s1".to_string(),
            artist_id: "ar1".to_string(),
            position: 0,
        }],
        related_song_maps: vec![RelatedSongMap {
            id: 1,
            song_id: "s1".to_string(),
            related_song_id: "s2".to_string(),
        }],
        events: vec![Event {
            id: 1,
            song_id: "s1".to_string(),
            timestamp: at(3, 18),
            play_time: 120_000,
        }],
        search_history: vec![SearchHistory {
            id: 1,
            query: "daybreaks".to_string(),
        }],
    }
}

pub fn other_library() -> LibrarySnapshot {
    LibrarySnapshot {
        songs: vec![Song::new("s3", "Evening Rain")],
        playlists: vec![Playlist::new("p2", "Focus")],
        playlist_song_maps: vec![PlaylistSongMap {
            id: 1,
            playlist_id: "p2".to_string(),
            song_id: "s3".to_string(),
            position: 0,
            set_video_id: None,
        }],
        search_history: vec![SearchHistory {
            id: 4,
            query: "rain".to_string(),
        }],
        ..Default::default()
    }
}

// ============================================================================
// Fakes
// ============================================================================

pub struct FailingCredentialStore;

#[async_trait]
impl CredentialStore for FailingCredentialStore {
    async fn load_credentials(&self) -> BridgeResult<()> {
        Err(BridgeError::OperationFailed(
            "credential file locked".to_string(),
        ))
    }

    async fn credentials(&self) -> BridgeResult<AccountCredentials> {
        Ok(AccountCredentials::default())
    }

    async fn save_credentials(&self, _credentials: AccountCredentials) -> BridgeResult<()> {
        Ok(())
    }
}

/// Remote folder kept in memory. Newest upload is "latest".
#[derive(Default)]
pub struct InMemoryRemote {
    blobs: Mutex<Vec<(RemoteBlob, Bytes)>>,
    next_id: Mutex<u32>,
    pub fail_downloads: AtomicBool,
    pub fail_uploads: AtomicBool,
}

impl InMemoryRemote {
    pub async fn seed(&self, name: &str, data: Bytes) -> String {
        self.store(name, data).await
    }

    pub async fn names(&self) -> Vec<String> {
        self.blobs
            .lock()
            .await
            .iter()
            .map(|(blob, _)| blob.name.clone())
            .collect()
    }

    async fn store(&self, name: &str, data: Bytes) -> String {
        let mut blobs = self.blobs.lock().await;
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let modified_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(*next_id as i64));

        if let Some(position) = blobs.iter().position(|(blob, _)| blob.name == name) {
            let (mut blob, _) = blobs.remove(position);
            blob.modified_at = modified_at;
            blob.size = Some(data.len() as u64);
            let id = blob.id.clone();
            blobs.push((blob, data));
            return id;
        }

        let id = format!("file-{}", next_id);
        blobs.push((
            RemoteBlob {
                id: id.clone(),
                name: name.to_string(),
                modified_at,
                size: Some(data.len() as u64),
            },
            data,
        ));
        id
    }
}

#[async_trait]
impl RemoteBlobStore for InMemoryRemote {
    async fn upload_replacing_by_name(&self, name: &str, data: Bytes) -> BridgeResult<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("upload rejected".to_string()));
        }
        Ok(self.store(name, data).await)
    }

    async fn download_latest(&self) -> BridgeResult<DownloadedBlob> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("quota exceeded".to_string()));
        }
        let blobs = self.blobs.lock().await;
        let (blob, data) = blobs
            .last()
            .cloned()
            .ok_or_else(|| BridgeError::NotFound("No backups found".to_string()))?;
        Ok(DownloadedBlob { blob, data })
    }

    async fn list_backups(&self, limit: u32) -> BridgeResult<Vec<RemoteBlob>> {
        let blobs = self.blobs.lock().await;
        Ok(blobs
            .iter()
            .rev()
            .take(limit as usize)
            .map(|(blob, _)| blob.clone())
            .collect())
    }
}
