//! # Relational Adapter
//!
//! Converts a [`LibrarySnapshot`] to and from the portable SQLite file that
//! backup archives carry as `song.db`.
//!
//! ## Writing
//!
//! The target file is deleted and rebuilt from the [`SchemaDescriptor`] DDL,
//! then every entity is inserted with `INSERT OR REPLACE` inside a single
//! transaction. Three tables exist only in the file and are derived here:
//!
//! - `song_album_map`: one row per song with a non-blank album id
//! - `album_artist_map`: album/artist pairs reachable through song credits
//! - `set_video_id`: the first remote item token seen for each song
//!
//! Join rows are re-keyed on the way in: playlist memberships get ids
//! `1..=n` across all playlists and positions `0..k` within each playlist
//! (kept in position order), related-song rows and play events get ids
//! `1..=n` in snapshot order. Ids carried by the snapshot are never trusted,
//! so rows that share an id cannot replace each other.
//!
//! Finally `PRAGMA user_version` is set to the descriptor version so the
//! mobile app opens the file without a migration.
//!
//! ## Reading
//!
//! Each entity table is read with `SELECT *`. Missing tables yield empty
//! collections and missing columns read as absent, so files written by older
//! schema versions still load.
//!
//! ## Encoding
//!
//! - Blank optional strings are stored as `NULL` and read back as `None`
//! - Booleans are `0`/`1`
//! - Timestamps are UTC epoch milliseconds

use crate::db::{open_pool, table_exists, DatabaseConfig};
use crate::error::{LibraryError, Result};
use crate::models::{
    Album, Artist, Event, LibrarySnapshot, Playlist, PlaylistSongMap, RelatedSongMap,
    SearchHistory, Song, SongArtistMap,
};
use crate::schema::SchemaDescriptor;
use chrono::{DateTime, NaiveDateTime, Utc};
use core_runtime::logging::strip_path;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Snapshot <-> relational file converter bound to one schema version.
#[derive(Debug, Clone)]
pub struct RelationalAdapter {
    schema: SchemaDescriptor,
}

impl RelationalAdapter {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// Resolve the schema descriptor and build an adapter for it.
    pub async fn locate(schema_file: &Path, schema_dir: &Path) -> Result<Self> {
        Ok(Self::new(SchemaDescriptor::locate(schema_file, schema_dir).await?))
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Write `snapshot` to a fresh file at `target`.
    ///
    /// Any existing file at `target` is replaced. On failure the partial file
    /// is removed.
    #[instrument(skip(self, snapshot), fields(target = %strip_path(&target.to_string_lossy()), version = self.schema.version))]
    pub async fn write(&self, snapshot: &LibrarySnapshot, target: &Path) -> Result<()> {
        remove_if_exists(target).await?;
        remove_if_exists(&journal_path(target)).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = open_pool(DatabaseConfig::new(target)).await?;
        let outcome = self.write_all(&pool, snapshot).await;
        pool.close().await;

        match outcome {
            Ok(()) => {
                info!(counts = ?snapshot.counts(), "Wrote relational file");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Relational write failed; removing partial file");
                let _ = tokio::fs::remove_file(target).await;
                Err(e)
            }
        }
    }

    async fn write_all(&self, pool: &Pool<Sqlite>, snapshot: &LibrarySnapshot) -> Result<()> {
        let mut tx = pool.begin().await?;

        for statement in self.schema.creation_statements() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        insert_artists(&mut tx, &snapshot.artists).await?;
        insert_albums(&mut tx, &snapshot.albums).await?;
        insert_playlists(&mut tx, &snapshot.playlists).await?;
        insert_songs(&mut tx, &snapshot.songs).await?;
        insert_song_artist_maps(&mut tx, &snapshot.song_artist_maps).await?;
        insert_song_album_maps(&mut tx, &snapshot.songs).await?;
        insert_album_artist_maps(&mut tx, &snapshot.songs, &snapshot.song_artist_maps).await?;
        let memberships = renumber_playlist_song_maps(&snapshot.playlist_song_maps);
        insert_playlist_song_maps(&mut tx, &memberships).await?;
        insert_set_video_ids(&mut tx, &snapshot.playlist_song_maps).await?;
        insert_related_song_maps(&mut tx, &snapshot.related_song_maps).await?;
        insert_events(&mut tx, &snapshot.events).await?;
        insert_search_history(&mut tx, &snapshot.search_history).await?;

        // PRAGMA does not accept bound parameters
        sqlx::query(&format!("PRAGMA user_version = {}", self.schema.version))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Read a snapshot back from the file at `source`.
    #[instrument(skip(self), fields(source = %strip_path(&source.to_string_lossy())))]
    pub async fn read(&self, source: &Path) -> Result<LibrarySnapshot> {
        if !tokio::fs::try_exists(source).await? {
            return Err(LibraryError::InvalidInput {
                field: "source".to_string(),
                message: format!("{} does not exist", source.display()),
            });
        }

        let pool = open_pool(DatabaseConfig::read_only(source)).await?;
        let outcome = read_all(&pool).await;
        pool.close().await;

        let snapshot = outcome?;
        info!(counts = ?snapshot.counts(), "Read relational file");
        Ok(snapshot)
    }
}

async fn read_all(pool: &Pool<Sqlite>) -> Result<LibrarySnapshot> {
    Ok(LibrarySnapshot {
        songs: read_table(pool, "song", song_from_row).await?,
        artists: read_table(pool, "artist", artist_from_row).await?,
        albums: read_table(pool, "album", album_from_row).await?,
        playlists: read_table(pool, "playlist", playlist_from_row).await?,
        playlist_song_maps: read_table(pool, "playlist_song_map", playlist_song_map_from_row)
            .await?,
        song_artist_maps: read_table(pool, "song_artist_map", song_artist_map_from_row).await?,
        related_song_maps: read_table(pool, "related_song_map", related_song_map_from_row)
            .await?,
        events: read_table(pool, "event", event_from_row).await?,
        search_history: read_table(pool, "search_history", search_history_from_row).await?,
    })
}

async fn read_table<T>(
    pool: &Pool<Sqlite>,
    table: &str,
    map: fn(&SqliteRow) -> Result<T>,
) -> Result<Vec<T>> {
    if !table_exists(pool, table).await? {
        debug!(table, "Table missing; reading as empty");
        return Ok(Vec::new());
    }

    let rows = sqlx::query(&format!("SELECT * FROM `{}`", table))
        .fetch_all(pool)
        .await?;
    rows.iter().map(map).collect()
}

// =============================================================================
// Inserts
// =============================================================================

async fn insert_artists(conn: &mut SqliteConnection, artists: &[Artist]) -> Result<()> {
    for artist in artists {
        sqlx::query(
            "INSERT OR REPLACE INTO artist (id, name, thumbnailUrl, channelId, lastUpdateTime, bookmarkedAt) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&artist.id)
        .bind(&artist.name)
        .bind(non_blank(&artist.thumbnail_url))
        .bind(non_blank(&artist.channel_id))
        .bind(to_millis(artist.last_update_time))
        .bind(artist.bookmarked_at.map(to_millis))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_albums(conn: &mut SqliteConnection, albums: &[Album]) -> Result<()> {
    for album in albums {
        sqlx::query(
            "INSERT OR REPLACE INTO album (id, playlistId, title, year, thumbnailUrl, themeColor, \
             songCount, duration, lastUpdateTime, bookmarkedAt, likedDate, inLibrary) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&album.id)
        .bind(non_blank(&album.playlist_id))
        .bind(&album.title)
        .bind(album.year)
        .bind(non_blank(&album.thumbnail_url))
        .bind(album.theme_color)
        .bind(album.song_count)
        .bind(album.duration)
        .bind(to_millis(album.last_update_time))
        .bind(album.bookmarked_at.map(to_millis))
        .bind(album.liked_date.map(to_millis))
        .bind(album.in_library.map(to_millis))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_playlists(conn: &mut SqliteConnection, playlists: &[Playlist]) -> Result<()> {
    for playlist in playlists {
        sqlx::query(
            "INSERT OR REPLACE INTO playlist (id, name, browseId, createdAt, lastUpdateTime, isEditable, \
             bookmarkedAt, remoteSongCount, playEndpointParams, thumbnailUrl, shuffleEndpointParams, \
             radioEndpointParams, backgroundImageUrl) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&playlist.id)
        .bind(&playlist.name)
        .bind(non_blank(&playlist.browse_id))
        .bind(playlist.created_at.map(to_millis))
        .bind(playlist.last_update_time.map(to_millis))
        .bind(playlist.is_editable)
        .bind(playlist.bookmarked_at.map(to_millis))
        .bind(playlist.remote_song_count)
        .bind(non_blank(&playlist.play_endpoint_params))
        .bind(non_blank(&playlist.thumbnail_url))
        .bind(non_blank(&playlist.shuffle_endpoint_params))
        .bind(non_blank(&playlist.radio_endpoint_params))
        .bind(non_blank(&playlist.background_image_url))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_songs(conn: &mut SqliteConnection, songs: &[Song]) -> Result<()> {
    for song in songs {
        sqlx::query(
            "INSERT OR REPLACE INTO song (id, title, duration, thumbnailUrl, albumId, albumName, \
             artistName, explicit, year, date, dateModified, liked, likedDate, totalPlayTime, \
             inLibrary, dateDownload, isLocal, romanizeLyrics, mediaStoreUri) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(song.duration)
        .bind(non_blank(&song.thumbnail_url))
        .bind(non_blank(&song.album_id))
        .bind(non_blank(&song.album_name))
        .bind(non_blank(&song.artist_name))
        .bind(song.explicit)
        .bind(song.year)
        .bind(song.date.map(to_millis))
        .bind(song.date_modified.map(to_millis))
        .bind(song.liked)
        .bind(song.liked_date.map(to_millis))
        .bind(song.total_play_time)
        .bind(song.in_library.map(to_millis))
        .bind(song.date_download.map(to_millis))
        .bind(song.is_local)
        .bind(song.romanize_lyrics)
        .bind(non_blank(&song.media_store_uri))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_song_artist_maps(
    conn: &mut SqliteConnection,
    maps: &[SongArtistMap],
) -> Result<()> {
    for map in maps {
        sqlx::query(
            "INSERT OR REPLACE INTO song_artist_map (songId, artistId, position) VALUES (?, ?, ?)",
        )
        .bind(&map.song_id)
        .bind(&map.artist_id)
        .bind(map.position)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_song_album_maps(conn: &mut SqliteConnection, songs: &[Song]) -> Result<()> {
    for (song_id, album_id) in derive_song_album_pairs(songs) {
        sqlx::query(
            "INSERT OR REPLACE INTO song_album_map (songId, albumId, `index`) VALUES (?, ?, 0)",
        )
        .bind(song_id)
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_album_artist_maps(
    conn: &mut SqliteConnection,
    songs: &[Song],
    maps: &[SongArtistMap],
) -> Result<()> {
    for (album_id, artist_id, order) in derive_album_artist_rows(songs, maps) {
        sqlx::query(
            "INSERT OR REPLACE INTO album_artist_map (albumId, artistId, `order`) VALUES (?, ?, ?)",
        )
        .bind(album_id)
        .bind(artist_id)
        .bind(order)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_playlist_song_maps(
    conn: &mut SqliteConnection,
    maps: &[PlaylistSongMap],
) -> Result<()> {
    for map in maps {
        sqlx::query(
            "INSERT OR REPLACE INTO playlist_song_map (id, playlistId, songId, position, setVideoId) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(map.id)
        .bind(&map.playlist_id)
        .bind(&map.song_id)
        .bind(map.position)
        .bind(non_blank(&map.set_video_id))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_set_video_ids(
    conn: &mut SqliteConnection,
    maps: &[PlaylistSongMap],
) -> Result<()> {
    for (video_id, set_video_id) in derive_set_video_ids(maps) {
        sqlx::query("INSERT OR REPLACE INTO set_video_id (videoId, setVideoId) VALUES (?, ?)")
            .bind(video_id)
            .bind(set_video_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn insert_related_song_maps(
    conn: &mut SqliteConnection,
    maps: &[RelatedSongMap],
) -> Result<()> {
    for (map, id) in maps.iter().zip(1_i64..) {
        sqlx::query(
            "INSERT OR REPLACE INTO related_song_map (id, songId, relatedSongId) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(&map.song_id)
        .bind(&map.related_song_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_events(conn: &mut SqliteConnection, events: &[Event]) -> Result<()> {
    for (event, id) in events.iter().zip(1_i64..) {
        sqlx::query(
            "INSERT OR REPLACE INTO event (id, songId, timestamp, playTime) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&event.song_id)
        .bind(to_millis(event.timestamp))
        .bind(event.play_time)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_search_history(
    conn: &mut SqliteConnection,
    entries: &[SearchHistory],
) -> Result<()> {
    for entry in dedup_search_history(entries) {
        sqlx::query("INSERT OR REPLACE INTO search_history (id, query) VALUES (?, ?)")
            .bind(entry.id)
            .bind(&entry.query)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

// =============================================================================
// Derived tables
// =============================================================================

fn derive_song_album_pairs(songs: &[Song]) -> Vec<(&str, &str)> {
    songs
        .iter()
        .filter_map(|song| non_blank(&song.album_id).map(|album| (song.id.as_str(), album)))
        .collect()
}

/// Album/artist pairs in credit order. The first credit for a pair decides
/// its order; negative positions clamp to zero.
fn derive_album_artist_rows<'a>(
    songs: &'a [Song],
    maps: &'a [SongArtistMap],
) -> Vec<(&'a str, &'a str, i32)> {
    let album_by_song: HashMap<&str, &str> = songs
        .iter()
        .filter_map(|song| non_blank(&song.album_id).map(|album| (song.id.as_str(), album)))
        .collect();

    let mut credits: Vec<&SongArtistMap> = maps.iter().collect();
    credits.sort_by_key(|map| map.position);

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for credit in credits {
        let Some(album_id) = album_by_song.get(credit.song_id.as_str()) else {
            continue;
        };
        if seen.insert((*album_id, credit.artist_id.as_str())) {
            rows.push((*album_id, credit.artist_id.as_str(), credit.position.max(0)));
        }
    }
    rows
}

/// Memberships grouped by playlist in first-seen order. Within a playlist
/// the existing position order is kept (ties in snapshot order).
fn renumber_playlist_song_maps(maps: &[PlaylistSongMap]) -> Vec<PlaylistSongMap> {
    let mut playlist_order: Vec<&str> = Vec::new();
    let mut by_playlist: HashMap<&str, Vec<&PlaylistSongMap>> = HashMap::new();
    for map in maps {
        let members = by_playlist.entry(map.playlist_id.as_str()).or_default();
        if members.is_empty() {
            playlist_order.push(map.playlist_id.as_str());
        }
        members.push(map);
    }

    let mut renumbered = Vec::with_capacity(maps.len());
    for playlist_id in playlist_order {
        let mut members = by_playlist.remove(playlist_id).unwrap_or_default();
        members.sort_by_key(|map| map.position);
        for (map, position) in members.into_iter().zip(0_i32..) {
            let id = renumbered.len() as i64 + 1;
            renumbered.push(PlaylistSongMap {
                id,
                position,
                ..map.clone()
            });
        }
    }
    renumbered
}

fn derive_set_video_ids(maps: &[PlaylistSongMap]) -> Vec<(&str, &str)> {
    let mut seen = HashSet::new();
    maps.iter()
        .filter_map(|map| non_blank(&map.set_video_id).map(|token| (map.song_id.as_str(), token)))
        .filter(|(song_id, _)| seen.insert(*song_id))
        .collect()
}

/// One entry per query (case-insensitive), keeping the highest id, sorted
/// by id.
fn dedup_search_history(entries: &[SearchHistory]) -> Vec<&SearchHistory> {
    let mut by_query: HashMap<String, &SearchHistory> = HashMap::new();
    for entry in entries {
        let key = entry.query.to_lowercase();
        match by_query.get(&key) {
            Some(existing) if existing.id >= entry.id => {}
            _ => {
                by_query.insert(key, entry);
            }
        }
    }
    let mut kept: Vec<&SearchHistory> = by_query.into_values().collect();
    kept.sort_by_key(|entry| entry.id);
    kept
}

// =============================================================================
// Row mapping
// =============================================================================

fn song_from_row(row: &SqliteRow) -> Result<Song> {
    Ok(Song {
        id: required_text(row, "id")?,
        title: optional_text(row, "title")?.unwrap_or_default(),
        duration: optional_int(row, "duration")?.map_or(-1, |v| v as i32),
        thumbnail_url: optional_text(row, "thumbnailUrl")?,
        album_id: optional_text(row, "albumId")?,
        album_name: optional_text(row, "albumName")?,
        artist_name: optional_text(row, "artistName")?,
        explicit: flag(row, "explicit", false)?,
        year: optional_int(row, "year")?.map(|v| v as i32),
        date: optional_time(row, "date")?,
        date_modified: optional_time(row, "dateModified")?,
        liked: flag(row, "liked", false)?,
        liked_date: optional_time(row, "likedDate")?,
        total_play_time: optional_int(row, "totalPlayTime")?.unwrap_or(0),
        in_library: optional_time(row, "inLibrary")?,
        date_download: optional_time(row, "dateDownload")?,
        is_local: flag(row, "isLocal", false)?,
        romanize_lyrics: flag(row, "romanizeLyrics", true)?,
        media_store_uri: optional_text(row, "mediaStoreUri")?,
    })
}

fn artist_from_row(row: &SqliteRow) -> Result<Artist> {
    Ok(Artist {
        id: required_text(row, "id")?,
        name: optional_text(row, "name")?.unwrap_or_default(),
        thumbnail_url: optional_text(row, "thumbnailUrl")?,
        channel_id: optional_text(row, "channelId")?,
        last_update_time: time_or_now(row, "lastUpdateTime")?,
        bookmarked_at: optional_time(row, "bookmarkedAt")?,
    })
}

fn album_from_row(row: &SqliteRow) -> Result<Album> {
    Ok(Album {
        id: required_text(row, "id")?,
        playlist_id: optional_text(row, "playlistId")?,
        title: optional_text(row, "title")?.unwrap_or_default(),
        year: optional_int(row, "year")?.map(|v| v as i32),
        thumbnail_url: optional_text(row, "thumbnailUrl")?,
        theme_color: optional_int(row, "themeColor")?.map(|v| v as i32),
        song_count: optional_int(row, "songCount")?.unwrap_or(0) as i32,
        duration: optional_int(row, "duration")?.unwrap_or(0) as i32,
        last_update_time: time_or_now(row, "lastUpdateTime")?,
        bookmarked_at: optional_time(row, "bookmarkedAt")?,
        liked_date: optional_time(row, "likedDate")?,
        in_library: optional_time(row, "inLibrary")?,
    })
}

fn playlist_from_row(row: &SqliteRow) -> Result<Playlist> {
    Ok(Playlist {
        id: required_text(row, "id")?,
        name: optional_text(row, "name")?.unwrap_or_default(),
        browse_id: optional_text(row, "browseId")?,
        created_at: optional_time(row, "createdAt")?,
        last_update_time: optional_time(row, "lastUpdateTime")?,
        is_editable: flag(row, "isEditable", true)?,
        bookmarked_at: optional_time(row, "bookmarkedAt")?,
        remote_song_count: optional_int(row, "remoteSongCount")?.map(|v| v as i32),
        play_endpoint_params: optional_text(row, "playEndpointParams")?,
        thumbnail_url: optional_text(row, "thumbnailUrl")?,
        shuffle_endpoint_params: optional_text(row, "shuffleEndpointParams")?,
        radio_endpoint_params: optional_text(row, "radioEndpointParams")?,
        background_image_url: optional_text(row, "backgroundImageUrl")?,
    })
}

fn playlist_song_map_from_row(row: &SqliteRow) -> Result<PlaylistSongMap> {
    Ok(PlaylistSongMap {
        id: optional_int(row, "id")?.unwrap_or(0),
        playlist_id: required_text(row, "playlistId")?,
        song_id: required_text(row, "songId")?,
        position: optional_int(row, "position")?.unwrap_or(0) as i32,
        set_video_id: optional_text(row, "setVideoId")?,
    })
}

fn song_artist_map_from_row(row: &SqliteRow) -> Result<SongArtistMap> {
    Ok(SongArtistMap {
        song_id: required_text(row, "songId")?,
        artist_id: required_text(row, "artistId")?,
        position: optional_int(row, "position")?.unwrap_or(0) as i32,
    })
}

fn related_song_map_from_row(row: &SqliteRow) -> Result<RelatedSongMap> {
    Ok(RelatedSongMap {
        id: optional_int(row, "id")?.unwrap_or(0),
        song_id: required_text(row, "songId")?,
        related_song_id: required_text(row, "relatedSongId")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    Ok(Event {
        id: optional_int(row, "id")?.unwrap_or(0),
        song_id: required_text(row, "songId")?,
        timestamp: time_or_now(row, "timestamp")?,
        play_time: optional_int(row, "playTime")?.unwrap_or(0),
    })
}

fn search_history_from_row(row: &SqliteRow) -> Result<SearchHistory> {
    Ok(SearchHistory {
        id: optional_int(row, "id")?.unwrap_or(0),
        query: optional_text(row, "query")?.unwrap_or_default(),
    })
}

/// Treat a column the row does not have as `NULL`.
fn absent_as_none<T>(value: std::result::Result<Option<T>, sqlx::Error>) -> Result<Option<T>> {
    match value {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn optional_text(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    Ok(absent_as_none(row.try_get::<Option<String>, _>(column))?
        .filter(|value| !value.trim().is_empty()))
}

fn required_text(row: &SqliteRow, column: &str) -> Result<String> {
    optional_text(row, column)?.ok_or_else(|| LibraryError::InvalidInput {
        field: column.to_string(),
        message: "required column is missing or blank".to_string(),
    })
}

fn optional_int(row: &SqliteRow, column: &str) -> Result<Option<i64>> {
    absent_as_none(row.try_get::<Option<i64>, _>(column))
}

fn flag(row: &SqliteRow, column: &str, default: bool) -> Result<bool> {
    Ok(optional_int(row, column)?.map_or(default, |value| value != 0))
}

fn optional_time(row: &SqliteRow, column: &str) -> Result<Option<NaiveDateTime>> {
    Ok(optional_int(row, column)?.and_then(from_millis))
}

fn time_or_now(row: &SqliteRow, column: &str) -> Result<NaiveDateTime> {
    Ok(optional_time(row, column)?.unwrap_or_else(|| Utc::now().naive_utc()))
}

// =============================================================================
// Helpers
// =============================================================================

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn to_millis(time: NaiveDateTime) -> i64 {
    time.and_utc().timestamp_millis()
}

fn from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

fn journal_path(target: &Path) -> std::path::PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push("-journal");
    name.into()
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
