//! # Library Snapshot Module
//!
//! Owns the in-memory model of the music library and its portable relational
//! form.
//!
//! ## Overview
//!
//! This module provides:
//! - [`models`]: entities and the [`LibrarySnapshot`] aggregate
//! - [`schema`]: typed Room schema descriptors and their resolution
//! - [`adapters`]: the [`RelationalAdapter`] that writes and reads `song.db`
//! - [`live`]: the [`LiveDatabase`] contract, pairwise merge helpers and the
//!   JSON-directory desktop database
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::{JsonLiveDatabase, LiveDatabase, RelationalAdapter};
//!
//! let live = JsonLiveDatabase::open(paths.database_dir()).await?;
//! let adapter = RelationalAdapter::locate("schemas/26.json".as_ref(), "schemas".as_ref()).await?;
//! adapter.write(&live.snapshot().await?, &scratch.join("song.db")).await?;
//! ```

pub mod adapters;
pub mod db;
pub mod error;
pub mod live;
pub mod models;
pub mod schema;

pub use adapters::RelationalAdapter;
pub use error::{LibraryError, Result};
pub use live::{merge_playlist, merge_song, JsonLiveDatabase, LiveDatabase};
pub use models::{
    Album, Artist, Event, LibrarySnapshot, Playlist, PlaylistSongMap, RelatedSongMap,
    SearchHistory, SnapshotCounts, Song, SongArtistMap,
};
pub use schema::SchemaDescriptor;
