//! # Live Database
//!
//! The backup engine never talks to the application's database directly; it
//! goes through [`LiveDatabase`], which captures and replaces whole
//! [`LibrarySnapshot`]s.
//!
//! [`JsonLiveDatabase`] is the desktop implementation: one JSON file per
//! entity list under the database directory, mirrored in memory.
//!
//! ## Pairwise merge helpers
//!
//! [`merge_song`] and [`merge_playlist`] reconcile two versions of the same
//! entity. They are the trait's default `merge_*` methods, so an
//! implementation with its own notion of recency can override them.

use crate::error::{LibraryError, Result};
use crate::models::{
    Album, Artist, Event, LibrarySnapshot, Playlist, PlaylistSongMap, RelatedSongMap,
    SearchHistory, Song, SongArtistMap,
};
use async_trait::async_trait;
use core_runtime::logging::strip_path;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Whole-state access to the application's library database.
#[async_trait]
pub trait LiveDatabase: Send + Sync {
    /// Capture the full current state.
    async fn snapshot(&self) -> Result<LibrarySnapshot>;

    /// Replace the full state with `snapshot`.
    ///
    /// On error the previous state stays visible to [`snapshot`](Self::snapshot).
    async fn replace_all(&self, snapshot: LibrarySnapshot) -> Result<()>;

    /// Re-read state from the database's own files, e.g. after they were
    /// replaced on disk.
    async fn initialize(&self) -> Result<()>;

    fn merge_song(&self, existing: &Song, incoming: &Song) -> Song {
        merge_song(existing, incoming)
    }

    fn merge_playlist(&self, existing: &Playlist, incoming: &Playlist) -> Playlist {
        merge_playlist(existing, incoming)
    }
}

/// Reconcile two versions of a song, `incoming` taking precedence.
///
/// Like state (`liked`, `liked_date`, `in_library`) follows whichever side
/// was modified last when both carry a modification time. Without that, a
/// like on either side sticks.
pub fn merge_song(existing: &Song, incoming: &Song) -> Song {
    let mut merged = incoming.clone();

    match (existing.date_modified, incoming.date_modified) {
        (Some(existing_at), Some(incoming_at)) if existing_at != incoming_at => {
            let newer = if existing_at > incoming_at {
                existing
            } else {
                incoming
            };
            merged.liked = newer.liked;
            merged.liked_date = newer.liked_date;
            merged.in_library = newer.in_library;
            merged.date_modified = Some(existing_at.max(incoming_at));
        }
        _ => {
            merged.liked = existing.liked || incoming.liked;
            merged.liked_date = if merged.liked {
                incoming.liked_date.or(existing.liked_date)
            } else {
                None
            };
            merged.in_library = incoming.in_library.or(existing.in_library);
            merged.date_modified = incoming.date_modified.or(existing.date_modified);
        }
    }

    merged.total_play_time = existing.total_play_time.max(incoming.total_play_time);
    merged.date_download = incoming.date_download.or(existing.date_download);
    merged.explicit = existing.explicit || incoming.explicit;
    merged.is_local = existing.is_local || incoming.is_local;
    merged.romanize_lyrics = existing.romanize_lyrics;
    merged.media_store_uri = incoming
        .media_store_uri
        .clone()
        .or_else(|| existing.media_store_uri.clone());
    merged
}

/// Reconcile two versions of a playlist, `incoming` taking precedence.
pub fn merge_playlist(existing: &Playlist, incoming: &Playlist) -> Playlist {
    fn pick<T: Clone>(incoming: &Option<T>, existing: &Option<T>) -> Option<T> {
        incoming.clone().or_else(|| existing.clone())
    }

    Playlist {
        id: incoming.id.clone(),
        name: if incoming.name.trim().is_empty() {
            existing.name.clone()
        } else {
            incoming.name.clone()
        },
        browse_id: pick(&incoming.browse_id, &existing.browse_id),
        created_at: pick(&incoming.created_at, &existing.created_at),
        last_update_time: pick(&incoming.last_update_time, &existing.last_update_time),
        is_editable: existing.is_editable || incoming.is_editable,
        bookmarked_at: pick(&incoming.bookmarked_at, &existing.bookmarked_at),
        remote_song_count: pick(&incoming.remote_song_count, &existing.remote_song_count),
        play_endpoint_params: pick(&incoming.play_endpoint_params, &existing.play_endpoint_params),
        thumbnail_url: pick(&incoming.thumbnail_url, &existing.thumbnail_url),
        shuffle_endpoint_params: pick(
            &incoming.shuffle_endpoint_params,
            &existing.shuffle_endpoint_params,
        ),
        radio_endpoint_params: pick(
            &incoming.radio_endpoint_params,
            &existing.radio_endpoint_params,
        ),
        background_image_url: pick(&incoming.background_image_url, &existing.background_image_url),
    }
}

// =============================================================================
// JSON directory implementation
// =============================================================================

const SONGS_FILE: &str = "songs.json";
const ARTISTS_FILE: &str = "artists.json";
const ALBUMS_FILE: &str = "albums.json";
const PLAYLISTS_FILE: &str = "playlists.json";
const PLAYLIST_SONGS_FILE: &str = "playlist_songs.json";
const SONG_ARTIST_MAP_FILE: &str = "song_artist_map.json";
const RELATED_SONGS_FILE: &str = "related_songs.json";
const EVENTS_FILE: &str = "events.json";
const SEARCH_HISTORY_FILE: &str = "search_history.json";

/// Desktop live database kept as JSON files in one directory.
pub struct JsonLiveDatabase {
    directory: PathBuf,
    state: RwLock<LibrarySnapshot>,
}

impl JsonLiveDatabase {
    /// Open the database in `directory`, creating it when missing.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        let state = load_directory(&directory).await?;
        info!(
            path = %strip_path(&directory.to_string_lossy()),
            songs = state.songs.len(),
            playlists = state.playlists.len(),
            "Opened live database"
        );
        Ok(Self {
            directory,
            state: RwLock::new(state),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl LiveDatabase for JsonLiveDatabase {
    async fn snapshot(&self) -> Result<LibrarySnapshot> {
        Ok(self.state.read().await.clone())
    }

    /// Every list is serialized and staged next to its file before any file
    /// is swapped in, so a staging failure leaves the directory untouched.
    #[instrument(skip(self, snapshot), fields(path = %strip_path(&self.directory.to_string_lossy())))]
    async fn replace_all(&self, snapshot: LibrarySnapshot) -> Result<()> {
        let mut state = self.state.write().await;
        tokio::fs::create_dir_all(&self.directory).await?;

        let payloads = vec![
            (SONGS_FILE, serde_json::to_vec(&snapshot.songs)?),
            (ARTISTS_FILE, serde_json::to_vec(&snapshot.artists)?),
            (ALBUMS_FILE, serde_json::to_vec(&snapshot.albums)?),
            (PLAYLISTS_FILE, serde_json::to_vec(&snapshot.playlists)?),
            (PLAYLIST_SONGS_FILE, serde_json::to_vec(&snapshot.playlist_song_maps)?),
            (SONG_ARTIST_MAP_FILE, serde_json::to_vec(&snapshot.song_artist_maps)?),
            (RELATED_SONGS_FILE, serde_json::to_vec(&snapshot.related_song_maps)?),
            (EVENTS_FILE, serde_json::to_vec(&snapshot.events)?),
            (SEARCH_HISTORY_FILE, serde_json::to_vec(&snapshot.search_history)?),
        ];

        let dir = &self.directory;
        let mut staged = Vec::with_capacity(payloads.len());
        for (name, payload) in payloads {
            let tmp = staging_path(dir, name);
            if let Err(e) = tokio::fs::write(&tmp, payload).await {
                discard_staged(&staged).await;
                return Err(e.into());
            }
            staged.push((tmp, dir.join(name)));
        }
        for (tmp, path) in &staged {
            tokio::fs::rename(tmp, path).await?;
        }

        debug!(counts = ?snapshot.counts(), "Replaced live database");
        *state = snapshot;
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        let fresh = load_directory(&self.directory).await?;
        info!(path = %strip_path(&self.directory.to_string_lossy()), songs = fresh.songs.len(), "Reloaded live database");
        *self.state.write().await = fresh;
        Ok(())
    }
}

async fn load_directory(dir: &Path) -> Result<LibrarySnapshot> {
    Ok(LibrarySnapshot {
        songs: read_list::<Song>(dir, SONGS_FILE).await?,
        artists: read_list::<Artist>(dir, ARTISTS_FILE).await?,
        albums: read_list::<Album>(dir, ALBUMS_FILE).await?,
        playlists: read_list::<Playlist>(dir, PLAYLISTS_FILE).await?,
        playlist_song_maps: read_list::<PlaylistSongMap>(dir, PLAYLIST_SONGS_FILE).await?,
        song_artist_maps: read_list::<SongArtistMap>(dir, SONG_ARTIST_MAP_FILE).await?,
        related_song_maps: read_list::<RelatedSongMap>(dir, RELATED_SONGS_FILE).await?,
        events: read_list::<Event>(dir, EVENTS_FILE).await?,
        search_history: read_list::<SearchHistory>(dir, SEARCH_HISTORY_FILE).await?,
    })
}

async fn read_list<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Vec<T>> {
    let path = dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(raw) => serde_json::from_slice(&raw).map_err(|e| LibraryError::InvalidInput {
            field: name.to_string(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn staging_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.tmp", name))
}

async fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = tokio::fs::remove_file(tmp).await;
    }
}
