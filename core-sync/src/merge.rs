//! Smart merge of two library snapshots
//!
//! Used by cloud sync to reconcile the local library with the one restored
//! from the remote backup. Every entity list is the union of both sides,
//! keyed by primary key.
//!
//! Membership never depends on which side is local. Ordering and tie-breaks
//! prefer the remote side: remote playlist order comes first, remote join
//! rows are considered first.

use chrono::NaiveDateTime;
use core_library::{
    Album, Artist, Event, LibrarySnapshot, LiveDatabase, Playlist, PlaylistSongMap,
    RelatedSongMap, SearchHistory, Song, SongArtistMap,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Merge `local` and `remote` into a new snapshot.
///
/// Songs and playlists present on both sides go through the live database's
/// pairwise helpers (`existing` = local, `incoming` = remote).
pub fn merge_snapshots(
    local: &LibrarySnapshot,
    remote: &LibrarySnapshot,
    helpers: &dyn LiveDatabase,
) -> LibrarySnapshot {
    LibrarySnapshot {
        songs: merge_by_id(&local.songs, &remote.songs, |s: &Song| &s.id, |l, r| {
            helpers.merge_song(l, r)
        }),
        artists: merge_by_id(&local.artists, &remote.artists, |a: &Artist| &a.id, merge_artist),
        albums: merge_by_id(&local.albums, &remote.albums, |a: &Album| &a.id, merge_album),
        playlists: merge_by_id(&local.playlists, &remote.playlists, |p: &Playlist| &p.id, |l, r| {
            helpers.merge_playlist(l, r)
        }),
        playlist_song_maps: merge_playlist_song_maps(
            &local.playlist_song_maps,
            &remote.playlist_song_maps,
        ),
        song_artist_maps: merge_song_artist_maps(&local.song_artist_maps, &remote.song_artist_maps),
        related_song_maps: merge_related_song_maps(
            &local.related_song_maps,
            &remote.related_song_maps,
        ),
        events: merge_events(&local.events, &remote.events),
        search_history: merge_search_history(&local.search_history, &remote.search_history),
    }
}

/// Union by id: local ids in local order, then remote-only ids.
fn merge_by_id<T, K, F>(local: &[T], remote: &[T], key: K, merge_both: F) -> Vec<T>
where
    T: Clone,
    K: Fn(&T) -> &String,
    F: Fn(&T, &T) -> T,
{
    let remote_by_id: HashMap<&String, &T> = remote.iter().map(|r| (key(r), r)).collect();

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(local.len() + remote.len());
    for item in local {
        if !seen.insert(key(item)) {
            continue;
        }
        match remote_by_id.get(key(item)) {
            Some(remote_item) => merged.push(merge_both(item, remote_item)),
            None => merged.push(item.clone()),
        }
    }
    for item in remote {
        if seen.insert(key(item)) {
            merged.push(item.clone());
        }
    }
    merged
}

fn latest(left: Option<NaiveDateTime>, right: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (left, right) {
        (Some(l), Some(r)) => Some(l.max(r)),
        (l, r) => l.or(r),
    }
}

/// Later `last_update_time` is the base; the other side fills its gaps.
fn merge_artist(local: &Artist, remote: &Artist) -> Artist {
    let (newer, older) = newer_first(local, remote, |a| a.last_update_time);

    Artist {
        id: newer.id.clone(),
        name: if newer.name.trim().is_empty() {
            older.name.clone()
        } else {
            newer.name.clone()
        },
        thumbnail_url: newer.thumbnail_url.clone().or_else(|| older.thumbnail_url.clone()),
        channel_id: newer.channel_id.clone().or_else(|| older.channel_id.clone()),
        last_update_time: newer.last_update_time,
        bookmarked_at: latest(local.bookmarked_at, remote.bookmarked_at),
    }
}

fn merge_album(local: &Album, remote: &Album) -> Album {
    let (newer, older) = newer_first(local, remote, |a| a.last_update_time);

    Album {
        playlist_id: newer.playlist_id.clone().or_else(|| older.playlist_id.clone()),
        year: newer.year.or(older.year),
        thumbnail_url: newer.thumbnail_url.clone().or_else(|| older.thumbnail_url.clone()),
        theme_color: newer.theme_color.or(older.theme_color),
        song_count: local.song_count.max(remote.song_count),
        duration: local.duration.max(remote.duration),
        bookmarked_at: latest(local.bookmarked_at, remote.bookmarked_at),
        liked_date: latest(local.liked_date, remote.liked_date),
        in_library: latest(local.in_library, remote.in_library),
        ..newer.clone()
    }
}

/// Remote wins only when strictly newer.
fn newer_first<'a, T>(
    local: &'a T,
    remote: &'a T,
    updated: impl Fn(&T) -> NaiveDateTime,
) -> (&'a T, &'a T) {
    if updated(remote) > updated(local) {
        (remote, local)
    } else {
        (local, remote)
    }
}

/// Per playlist: remote order, then local songs not already present.
/// Positions restart at 0 per playlist; ids run from 1 across all playlists.
fn merge_playlist_song_maps(
    local: &[PlaylistSongMap],
    remote: &[PlaylistSongMap],
) -> Vec<PlaylistSongMap> {
    let mut playlist_order: Vec<&str> = Vec::new();
    let mut known = HashSet::new();
    for map in local.iter().chain(remote) {
        if known.insert(map.playlist_id.as_str()) {
            playlist_order.push(map.playlist_id.as_str());
        }
    }

    let mut next_id = 1;
    let mut merged = Vec::with_capacity(local.len() + remote.len());
    for playlist_id in playlist_order {
        let sorted_members = |maps: &[PlaylistSongMap]| {
            let mut members: Vec<PlaylistSongMap> = maps
                .iter()
                .filter(|m| m.playlist_id == playlist_id)
                .cloned()
                .collect();
            members.sort_by_key(|m| m.position);
            members
        };

        let mut seen_songs = HashSet::new();
        let mut position = 0;
        for map in sorted_members(remote).into_iter().chain(sorted_members(local)) {
            if !seen_songs.insert(map.song_id.clone()) {
                continue;
            }
            merged.push(PlaylistSongMap {
                id: next_id,
                position,
                ..map
            });
            next_id += 1;
            position += 1;
        }
    }
    merged
}

/// One credit per (song, artist); the lower position wins.
fn merge_song_artist_maps(local: &[SongArtistMap], remote: &[SongArtistMap]) -> Vec<SongArtistMap> {
    let mut merged: Vec<SongArtistMap> = Vec::new();
    let mut index_by_key: HashMap<(&str, &str), usize> = HashMap::new();

    for map in remote.iter().chain(local) {
        let key = (map.song_id.as_str(), map.artist_id.as_str());
        match index_by_key.get(&key) {
            Some(&index) => {
                if map.position < merged[index].position {
                    merged[index] = map.clone();
                }
            }
            None => {
                index_by_key.insert(key, merged.len());
                merged.push(map.clone());
            }
        }
    }
    merged
}

fn first_by_key<'a, T, K>(remote: &'a [T], local: &'a [T], key: impl Fn(&'a T) -> K) -> Vec<&'a T>
where
    K: Eq + Hash,
{
    let mut seen = HashSet::new();
    remote
        .iter()
        .chain(local)
        .filter(|item| seen.insert(key(*item)))
        .collect()
}

fn merge_related_song_maps(
    local: &[RelatedSongMap],
    remote: &[RelatedSongMap],
) -> Vec<RelatedSongMap> {
    first_by_key(remote, local, |m| (m.song_id.as_str(), m.related_song_id.as_str()))
        .into_iter()
        .zip(1..)
        .map(|(map, id)| RelatedSongMap {
            id,
            ..map.clone()
        })
        .collect()
}

/// Deduplicated by (song, timestamp, play time), newest first.
fn merge_events(local: &[Event], remote: &[Event]) -> Vec<Event> {
    let mut merged: Vec<Event> = first_by_key(remote, local, |e| {
        (e.song_id.as_str(), e.timestamp, e.play_time)
    })
    .into_iter()
    .cloned()
    .collect();

    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    for (event, id) in merged.iter_mut().zip(1..) {
        event.id = id;
    }
    merged
}

/// One entry per query, compared case-insensitively. The first casing seen
/// (local before remote) is kept together with the highest id of the group.
fn merge_search_history(local: &[SearchHistory], remote: &[SearchHistory]) -> Vec<SearchHistory> {
    let mut merged: Vec<SearchHistory> = Vec::new();
    let mut index_by_query: HashMap<String, usize> = HashMap::new();

    for entry in local.iter().chain(remote) {
        let key = entry.query.to_lowercase();
        match index_by_query.get(&key) {
            Some(&index) => {
                merged[index].id = merged[index].id.max(entry.id);
            }
            None => {
                index_by_query.insert(key, merged.len());
                merged.push(entry.clone());
            }
        }
    }

    merged.sort_by_key(|entry| entry.id);
    for (entry, id) in merged.iter_mut().zip(1..) {
        entry.id = id;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// Only the default pairwise helpers are used.
    struct DefaultHelpers;

    #[async_trait]
    impl LiveDatabase for DefaultHelpers {
        async fn snapshot(&self) -> core_library::Result<LibrarySnapshot> {
            Ok(LibrarySnapshot::default())
        }

        async fn replace_all(&self, _snapshot: LibrarySnapshot) -> core_library::Result<()> {
            Ok(())
        }

        async fn initialize(&self) -> core_library::Result<()> {
            Ok(())
        }
    }

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn membership(playlist: &str, song: &str, position: i32) -> PlaylistSongMap {
        PlaylistSongMap {
            id: 0,
            playlist_id: playlist.into(),
            song_id: song.into(),
            position,
            set_video_id: None,
        }
    }

    fn credit(song: &str, artist: &str, position: i32) -> SongArtistMap {
        SongArtistMap {
            song_id: song.into(),
            artist_id: artist.into(),
            position,
        }
    }

    fn event(id: i64, song: &str, day: u32, play_time: i64) -> Event {
        Event {
            id,
            song_id: song.into(),
            timestamp: at(day),
            play_time,
        }
    }

    fn search(id: i64, query: &str) -> SearchHistory {
        SearchHistory {
            id,
            query: query.into(),
        }
    }

    fn sample_local() -> LibrarySnapshot {
        LibrarySnapshot {
            songs: vec![Song::new("s1", "Local One"), Song::new("s2", "Only Local")],
            artists: vec![Artist::new("a1", "Artist", at(1))],
            playlist_song_maps: vec![membership("p1", "s1", 0), membership("p1", "s2", 1)],
            song_artist_maps: vec![credit("s1", "a1", 1), credit("s2", "a1", 0)],
            related_song_maps: vec![RelatedSongMap {
                id: 7,
                song_id: "s1".into(),
                related_song_id: "s2".into(),
            }],
            events: vec![event(1, "s1", 3, 100), event(2, "s2", 1, 50)],
            search_history: vec![search(5, "abc"), search(6, "lofi")],
            ..Default::default()
        }
    }

    fn sample_remote() -> LibrarySnapshot {
        LibrarySnapshot {
            songs: vec![Song::new("s1", "Remote One"), Song::new("s3", "Only Remote")],
            artists: vec![Artist::new("a2", "Other", at(1))],
            playlist_song_maps: vec![membership("p1", "s3", 0), membership("p1", "s1", 1)],
            song_artist_maps: vec![credit("s1", "a1", 0), credit("s3", "a2", 0)],
            related_song_maps: vec![RelatedSongMap {
                id: 1,
                song_id: "s1".into(),
                related_song_id: "s2".into(),
            }],
            events: vec![event(9, "s1", 3, 100), event(3, "s3", 2, 70)],
            search_history: vec![search(9, "ABC")],
            ..Default::default()
        }
    }

    #[test]
    fn test_entities_are_unioned() {
        let merged = merge_snapshots(&sample_local(), &sample_remote(), &DefaultHelpers);

        let song_ids: Vec<&str> = merged.songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(song_ids, vec!["s1", "s2", "s3"]);
        assert_eq!(merged.songs[0].title, "Remote One");

        let artist_ids: Vec<&str> = merged.artists.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(artist_ids, vec!["a1", "a2"]);
    }

    #[test]
    fn test_playlist_membership_remote_first_then_local() {
        let merged = merge_snapshots(&sample_local(), &sample_remote(), &DefaultHelpers);

        let members: Vec<(i64, &str, i32)> = merged
            .playlist_song_maps
            .iter()
            .map(|m| (m.id, m.song_id.as_str(), m.position))
            .collect();
        assert_eq!(members, vec![(1, "s3", 0), (2, "s1", 1), (3, "s2", 2)]);
    }

    #[test]
    fn test_membership_ids_unique_across_playlists() {
        let local = LibrarySnapshot {
            playlist_song_maps: vec![membership("p1", "s1", 0), membership("p2", "s1", 3)],
            ..Default::default()
        };
        let remote = LibrarySnapshot {
            playlist_song_maps: vec![membership("p2", "s2", 0)],
            ..Default::default()
        };

        let merged = merge_snapshots(&local, &remote, &DefaultHelpers);
        let ids: HashSet<i64> = merged.playlist_song_maps.iter().map(|m| m.id).collect();

        assert_eq!(ids.len(), 3);
        let p2: Vec<(&str, i32)> = merged
            .playlist_song_maps
            .iter()
            .filter(|m| m.playlist_id == "p2")
            .map(|m| (m.song_id.as_str(), m.position))
            .collect();
        assert_eq!(p2, vec![("s2", 0), ("s1", 1)]);
    }

    #[test]
    fn test_song_artist_keeps_lowest_position() {
        let merged = merge_snapshots(&sample_local(), &sample_remote(), &DefaultHelpers);

        assert_eq!(
            merged.song_artist_maps,
            vec![credit("s1", "a1", 0), credit("s3", "a2", 0), credit("s2", "a1", 0)]
        );
    }

    #[test]
    fn test_events_deduplicated_newest_first() {
        let merged = merge_snapshots(&sample_local(), &sample_remote(), &DefaultHelpers);

        let events: Vec<(i64, &str, NaiveDateTime)> = merged
            .events
            .iter()
            .map(|e| (e.id, e.song_id.as_str(), e.timestamp))
            .collect();
        assert_eq!(
            events,
            vec![(1, "s1", at(3)), (2, "s3", at(2)), (3, "s2", at(1))]
        );
    }

    #[test]
    fn test_related_songs_renumbered() {
        let merged = merge_snapshots(&sample_local(), &sample_remote(), &DefaultHelpers);

        assert_eq!(merged.related_song_maps.len(), 1);
        assert_eq!(merged.related_song_maps[0].id, 1);
    }

    #[test]
    fn test_search_history_case_insensitive_highest_id() {
        let merged = merge_snapshots(&sample_local(), &sample_remote(), &DefaultHelpers);

        // "lofi" (6) sorts before "abc" whose group id is 9
        assert_eq!(merged.search_history, vec![search(1, "lofi"), search(2, "abc")]);
    }

    #[test]
    fn test_newer_song_like_state_wins() {
        let mut local_song = Song::new("s1", "Song");
        local_song.liked = true;
        local_song.liked_date = Some(at(1));
        local_song.date_modified = Some(at(1));
        let mut remote_song = Song::new("s1", "Song");
        remote_song.liked = false;
        remote_song.date_modified = Some(at(2));

        let local = LibrarySnapshot {
            songs: vec![local_song],
            ..Default::default()
        };
        let remote = LibrarySnapshot {
            songs: vec![remote_song],
            ..Default::default()
        };

        let merged = merge_snapshots(&local, &remote, &DefaultHelpers);
        assert!(!merged.songs[0].liked);
        assert_eq!(merged.songs[0].liked_date, None);
    }

    #[test]
    fn test_artist_and_album_backfill() {
        let mut local_artist = Artist::new("a1", "Local Name", at(5));
        local_artist.thumbnail_url = Some("local.jpg".into());
        local_artist.bookmarked_at = Some(at(2));
        let mut remote_artist = Artist::new("a1", "Remote Name", at(3));
        remote_artist.channel_id = Some("UC1".into());
        remote_artist.bookmarked_at = Some(at(4));

        let mut local_album = Album::new("al1", "Local Title", at(1));
        local_album.song_count = 12;
        local_album.liked_date = Some(at(6));
        let mut remote_album = Album::new("al1", "Remote Title", at(2));
        remote_album.song_count = 10;
        remote_album.duration = 3600;
        remote_album.year = Some(2020);

        let local = LibrarySnapshot {
            artists: vec![local_artist],
            albums: vec![local_album],
            ..Default::default()
        };
        let remote = LibrarySnapshot {
            artists: vec![remote_artist],
            albums: vec![remote_album],
            ..Default::default()
        };

        let merged = merge_snapshots(&local, &remote, &DefaultHelpers);
        let artist = &merged.artists[0];
        assert_eq!(artist.name, "Local Name");
        assert_eq!(artist.thumbnail_url.as_deref(), Some("local.jpg"));
        assert_eq!(artist.channel_id.as_deref(), Some("UC1"));
        assert_eq!(artist.last_update_time, at(5));
        assert_eq!(artist.bookmarked_at, Some(at(4)));

        let album = &merged.albums[0];
        assert_eq!(album.title, "Remote Title");
        assert_eq!(album.song_count, 12);
        assert_eq!(album.duration, 3600);
        assert_eq!(album.year, Some(2020));
        assert_eq!(album.liked_date, Some(at(6)));
    }

    #[test]
    fn test_membership_independent_of_side() {
        let (a, b) = (sample_local(), sample_remote());
        let ab = merge_snapshots(&a, &b, &DefaultHelpers);
        let ba = merge_snapshots(&b, &a, &DefaultHelpers);

        let credits = |s: &LibrarySnapshot| -> HashSet<(String, String)> {
            s.song_artist_maps
                .iter()
                .map(|m| (m.song_id.clone(), m.artist_id.clone()))
                .collect()
        };
        let related = |s: &LibrarySnapshot| -> HashSet<(String, String)> {
            s.related_song_maps
                .iter()
                .map(|m| (m.song_id.clone(), m.related_song_id.clone()))
                .collect()
        };
        let events = |s: &LibrarySnapshot| -> HashSet<(String, NaiveDateTime, i64)> {
            s.events
                .iter()
                .map(|e| (e.song_id.clone(), e.timestamp, e.play_time))
                .collect()
        };

        assert_eq!(credits(&ab), credits(&ba));
        assert_eq!(related(&ab), related(&ba));
        assert_eq!(events(&ab), events(&ba));
    }

    #[test]
    fn test_merge_with_itself_is_identity_up_to_ids() {
        let snapshot = sample_local();
        let merged = merge_snapshots(&snapshot, &snapshot, &DefaultHelpers);

        assert_eq!(merged.songs, snapshot.songs);
        assert_eq!(merged.artists, snapshot.artists);
        assert_eq!(merged.song_artist_maps, snapshot.song_artist_maps);
        assert_eq!(merged.playlist_song_maps.len(), snapshot.playlist_song_maps.len());
        assert_eq!(merged.events.len(), snapshot.events.len());
        assert_eq!(merged.search_history.len(), snapshot.search_history.len());
    }
}
