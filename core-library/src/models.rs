//! Domain models for the music library
//!
//! Every entity mirrors one table of the portable relational file. Timestamps
//! are naive date-times interpreted as UTC; the relational file stores them
//! as epoch milliseconds.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// =============================================================================
// Entities
// =============================================================================

/// A song known to the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    /// Duration in seconds, `-1` when unknown
    pub duration: i32,
    pub thumbnail_url: Option<String>,
    pub album_id: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub explicit: bool,
    pub year: Option<i32>,
    pub date: Option<NaiveDateTime>,
    /// Last local modification; drives newer-wins merging of like state
    pub date_modified: Option<NaiveDateTime>,
    pub liked: bool,
    pub liked_date: Option<NaiveDateTime>,
    /// Accumulated play time in milliseconds
    pub total_play_time: i64,
    pub in_library: Option<NaiveDateTime>,
    pub date_download: Option<NaiveDateTime>,
    pub is_local: bool,
    pub romanize_lyrics: bool,
    pub media_store_uri: Option<String>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            duration: -1,
            thumbnail_url: None,
            album_id: None,
            album_name: None,
            artist_name: None,
            explicit: false,
            year: None,
            date: None,
            date_modified: None,
            liked: false,
            liked_date: None,
            total_play_time: 0,
            in_library: None,
            date_download: None,
            is_local: false,
            romanize_lyrics: true,
            media_store_uri: None,
        }
    }
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub thumbnail_url: Option<String>,
    pub channel_id: Option<String>,
    pub last_update_time: NaiveDateTime,
    pub bookmarked_at: Option<NaiveDateTime>,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>, last_update_time: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            thumbnail_url: None,
            channel_id: None,
            last_update_time,
            bookmarked_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub playlist_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub thumbnail_url: Option<String>,
    pub theme_color: Option<i32>,
    pub song_count: i32,
    /// Total duration in seconds
    pub duration: i32,
    pub last_update_time: NaiveDateTime,
    pub bookmarked_at: Option<NaiveDateTime>,
    pub liked_date: Option<NaiveDateTime>,
    pub in_library: Option<NaiveDateTime>,
}

impl Album {
    pub fn new(id: impl Into<String>, title: impl Into<String>, last_update_time: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            playlist_id: None,
            title: title.into(),
            year: None,
            thumbnail_url: None,
            theme_color: None,
            song_count: 0,
            duration: 0,
            last_update_time,
            bookmarked_at: None,
            liked_date: None,
            in_library: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    /// Remote playlist id when the playlist mirrors an online one
    pub browse_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub last_update_time: Option<NaiveDateTime>,
    pub is_editable: bool,
    pub bookmarked_at: Option<NaiveDateTime>,
    pub remote_song_count: Option<i32>,
    pub play_endpoint_params: Option<String>,
    pub thumbnail_url: Option<String>,
    pub shuffle_endpoint_params: Option<String>,
    pub radio_endpoint_params: Option<String>,
    pub background_image_url: Option<String>,
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            browse_id: None,
            created_at: None,
            last_update_time: None,
            is_editable: true,
            bookmarked_at: None,
            remote_song_count: None,
            play_endpoint_params: None,
            thumbnail_url: None,
            shuffle_endpoint_params: None,
            radio_endpoint_params: None,
            background_image_url: None,
        }
    }
}

impl Playlist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Join tables and history
// =============================================================================

/// Ordered playlist membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSongMap {
    pub id: i64,
    pub playlist_id: String,
    pub song_id: String,
    /// Zero-based, contiguous per playlist
    pub position: i32,
    /// Remote playlist item token
    pub set_video_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongArtistMap {
    pub song_id: String,
    pub artist_id: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedSongMap {
    pub id: i64,
    pub song_id: String,
    pub related_song_id: String,
}

/// One play of a song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub song_id: String,
    pub timestamp: NaiveDateTime,
    /// Milliseconds actually played
    pub play_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistory {
    pub id: i64,
    pub query: String,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Full library state at one instant.
///
/// Captured from a live database, never mutated in place, and handed back
/// wholesale through `replace_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LibrarySnapshot {
    pub songs: Vec<Song>,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub playlists: Vec<Playlist>,
    pub playlist_song_maps: Vec<PlaylistSongMap>,
    pub song_artist_maps: Vec<SongArtistMap>,
    pub related_song_maps: Vec<RelatedSongMap>,
    pub events: Vec<Event>,
    pub search_history: Vec<SearchHistory>,
}

/// Per-entity row counts, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub songs: usize,
    pub artists: usize,
    pub albums: usize,
    pub playlists: usize,
    pub playlist_song_maps: usize,
    pub song_artist_maps: usize,
    pub related_song_maps: usize,
    pub events: usize,
    pub search_history: usize,
}

impl LibrarySnapshot {
    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    pub fn counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            songs: self.songs.len(),
            artists: self.artists.len(),
            albums: self.albums.len(),
            playlists: self.playlists.len(),
            playlist_song_maps: self.playlist_song_maps.len(),
            song_artist_maps: self.song_artist_maps.len(),
            related_song_maps: self.related_song_maps.len(),
            events: self.events.len(),
            search_history: self.search_history.len(),
        }
    }
}

impl SnapshotCounts {
    pub fn total(&self) -> usize {
        self.songs
            + self.artists
            + self.albums
            + self.playlists
            + self.playlist_song_maps
            + self.song_artist_maps
            + self.related_song_maps
            + self.events
            + self.search_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_defaults() {
        let song = Song::new("s1", "Title");
        assert_eq!(song.duration, -1);
        assert!(song.romanize_lyrics);
        assert!(!song.liked);
    }

    #[test]
    fn test_playlist_defaults_to_editable() {
        assert!(Playlist::new("LPabc", "Mix").is_editable);
    }

    #[test]
    fn test_song_deserializes_with_missing_fields() {
        let song: Song = serde_json::from_str(r#"{"id":"s1","title":"T","liked":true}"#).unwrap();
        assert!(song.liked);
        assert_eq!(song.duration, -1);
        assert!(song.romanize_lyrics);
    }

    #[test]
    fn test_snapshot_counts() {
        let mut snapshot = LibrarySnapshot::default();
        assert!(snapshot.is_empty());

        snapshot.songs.push(Song::new("s1", "One"));
        snapshot.search_history.push(SearchHistory {
            id: 1,
            query: "abc".into(),
        });

        let counts = snapshot.counts();
        assert_eq!(counts.songs, 1);
        assert_eq!(counts.search_history, 1);
        assert_eq!(counts.total(), 2);
        assert!(!snapshot.is_empty());
    }
}
