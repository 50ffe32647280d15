//! # Schema Descriptor
//!
//! Typed view of a Room schema export (`<version>.json`). The relational
//! file is created from the descriptor's DDL so it opens cleanly in the
//! mobile app that owns the schema.
//!
//! Placeholders (`${TABLE_NAME}`, `${VIEW_NAME}`) are substituted once at
//! load time; callers only ever see executable statements.
//!
//! ## Resolution
//!
//! [`resolve_schema_file`] tries, in order:
//! 1. the configured file
//! 2. the same relative path under `..`
//! 3. the newest `*.json` in the schema directory, then in `../<dir>`
//!
//! "Newest" compares the numeric file stem (`26.json` > `9.json`), then the
//! file name.

use crate::error::{LibraryError, Result};
use core_runtime::logging::strip_path;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Oldest Room schema whose columns the adapter knows how to fill.
pub const MIN_SUPPORTED_VERSION: i64 = 24;

/// Tables the relational adapter writes into.
pub const REQUIRED_TABLES: &[&str] = &[
    "song",
    "artist",
    "album",
    "playlist",
    "song_artist_map",
    "song_album_map",
    "album_artist_map",
    "playlist_song_map",
    "set_video_id",
    "related_song_map",
    "event",
    "search_history",
];

const TABLE_PLACEHOLDER: &str = "`${TABLE_NAME}`";
const VIEW_PLACEHOLDER: &str = "`${VIEW_NAME}`";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchemaFile {
    #[serde(default)]
    format_version: i64,
    database: RawDatabase,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDatabase {
    version: i64,
    entities: Vec<RawEntity>,
    #[serde(default)]
    views: Vec<RawView>,
    #[serde(default)]
    setup_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntity {
    table_name: String,
    create_sql: String,
    #[serde(default)]
    indices: Vec<RawIndex>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndex {
    create_sql: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawView {
    view_name: String,
    create_sql: String,
}

/// A table and its indices, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub table_name: String,
    pub create_sql: String,
    pub index_sql: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDescriptor {
    pub view_name: String,
    pub create_sql: String,
}

/// Validated, versioned schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub format_version: i64,
    pub version: i64,
    pub entities: Vec<EntityDescriptor>,
    pub views: Vec<ViewDescriptor>,
    pub setup_queries: Vec<String>,
}

impl SchemaDescriptor {
    /// Parse and validate a Room schema export.
    ///
    /// # Errors
    ///
    /// [`LibraryError::UnsupportedSchema`] for malformed JSON, versions below
    /// [`MIN_SUPPORTED_VERSION`], or a descriptor missing any of
    /// [`REQUIRED_TABLES`].
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawSchemaFile = serde_json::from_str(json)
            .map_err(|e| LibraryError::UnsupportedSchema(format!("Malformed descriptor: {}", e)))?;

        let version = raw.database.version;
        if version < MIN_SUPPORTED_VERSION {
            return Err(LibraryError::UnsupportedSchema(format!(
                "Schema version {} is older than the minimum supported version {}",
                version, MIN_SUPPORTED_VERSION
            )));
        }

        let entities: Vec<EntityDescriptor> = raw
            .database
            .entities
            .into_iter()
            .map(|entity| {
                let quoted = format!("`{}`", entity.table_name);
                EntityDescriptor {
                    create_sql: entity.create_sql.replace(TABLE_PLACEHOLDER, &quoted),
                    index_sql: entity
                        .indices
                        .into_iter()
                        .map(|index| index.create_sql.replace(TABLE_PLACEHOLDER, &quoted))
                        .collect(),
                    table_name: entity.table_name,
                }
            })
            .collect();

        let missing: Vec<&str> = REQUIRED_TABLES
            .iter()
            .copied()
            .filter(|table| !entities.iter().any(|e| e.table_name == *table))
            .collect();
        if !missing.is_empty() {
            return Err(LibraryError::UnsupportedSchema(format!(
                "Schema version {} is missing tables: {}",
                version,
                missing.join(", ")
            )));
        }

        let views = raw
            .database
            .views
            .into_iter()
            .map(|view| ViewDescriptor {
                create_sql: view
                    .create_sql
                    .replace(VIEW_PLACEHOLDER, &format!("`{}`", view.view_name)),
                view_name: view.view_name,
            })
            .collect();

        Ok(Self {
            format_version: raw.format_version,
            version,
            entities,
            views,
            setup_queries: raw.database.setup_queries,
        })
    }

    /// Read and parse a descriptor file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LibraryError::SchemaNotFound(path.to_path_buf())
            } else {
                LibraryError::Io(e)
            }
        })?;
        let descriptor = Self::parse(&json)?;
        info!(
            path = %strip_path(&path.to_string_lossy()),
            version = descriptor.version,
            tables = descriptor.entities.len(),
            "Loaded schema descriptor"
        );
        Ok(descriptor)
    }

    /// Resolve and load in one step.
    pub async fn locate(schema_file: &Path, schema_dir: &Path) -> Result<Self> {
        let path = resolve_schema_file(schema_file, schema_dir).await?;
        Self::load(&path).await
    }

    /// Creation statements in execution order: tables with their indices,
    /// then views, then setup queries.
    pub fn creation_statements(&self) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .flat_map(|entity| {
                std::iter::once(entity.create_sql.as_str())
                    .chain(entity.index_sql.iter().map(String::as_str))
            })
            .chain(self.views.iter().map(|view| view.create_sql.as_str()))
            .chain(self.setup_queries.iter().map(String::as_str))
    }
}

/// Locate the descriptor file to use.
///
/// # Errors
///
/// [`LibraryError::SchemaNotFound`] naming `schema_file` when nothing matches.
pub async fn resolve_schema_file(schema_file: &Path, schema_dir: &Path) -> Result<PathBuf> {
    if is_file(schema_file).await {
        return Ok(schema_file.to_path_buf());
    }

    if schema_file.is_relative() && !schema_file.as_os_str().is_empty() {
        let parent_candidate = Path::new("..").join(schema_file);
        if is_file(&parent_candidate).await {
            return Ok(parent_candidate);
        }
    }

    let mut directories = vec![schema_dir.to_path_buf()];
    if schema_dir.is_relative() {
        directories.push(Path::new("..").join(schema_dir));
    }

    for directory in directories {
        if let Some(latest) = latest_schema_in(&directory).await? {
            debug!(path = %strip_path(&latest.to_string_lossy()), "Falling back to newest schema in directory");
            return Ok(latest);
        }
    }

    Err(LibraryError::SchemaNotFound(schema_file.to_path_buf()))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn latest_schema_in(directory: &Path) -> Result<Option<PathBuf>> {
    let is_dir = tokio::fs::metadata(directory)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Ok(None);
    }

    let mut entries = tokio::fs::read_dir(directory).await?;

    let mut best: Option<(i64, String, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.to_ascii_lowercase().ends_with(".json") {
            continue;
        }
        let rank = name
            .split('.')
            .next()
            .and_then(|stem| stem.parse::<i64>().ok())
            .unwrap_or(-1);

        let better = match &best {
            None => true,
            Some((best_rank, best_name, _)) => (rank, &name) > (*best_rank, best_name),
        };
        if better {
            best = Some((rank, name, entry.path()));
        }
    }

    Ok(best.map(|(_, _, path)| path))
}
