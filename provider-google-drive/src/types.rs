//! Google Drive API response types
//!
//! Data structures for deserializing Google Drive API v3 responses.

use bridge_traits::storage::RemoteBlob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Google Drive API file resource, restricted to the fields the backup store
/// requests.
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// File size in bytes, as a decimal string (omitted for folders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Creation time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,

    /// Modification time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

impl DriveFile {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn into_remote_blob(self) -> RemoteBlob {
        RemoteBlob {
            modified_at: self.modified_at(),
            size: self.size_bytes(),
            id: self.id,
            name: self.name,
        }
    }
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata part of a multipart create request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileMetadata<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_listed_file() {
        let json = r#"{
            "id": "file1",
            "name": "AniTail_Desktop_CloudSync.backup",
            "modifiedTime": "2024-03-01T10:15:30.250Z",
            "createdTime": "2024-02-01T00:00:00.000Z",
            "size": "20480"
        }"#;

        let file: DriveFile = serde_json::from_str(json).unwrap();
        let blob = file.into_remote_blob();

        assert_eq!(blob.id, "file1");
        assert_eq!(blob.size, Some(20480));
        assert_eq!(
            blob.modified_at.map(|t| t.timestamp_millis()),
            Some(1_709_288_130_250)
        );
    }

    #[test]
    fn test_deserialize_id_only() {
        let file: DriveFile = serde_json::from_str(r#"{"id":"folder9"}"#).unwrap();

        assert_eq!(file.id, "folder9");
        assert!(file.name.is_empty());
        assert_eq!(file.modified_at(), None);
        assert_eq!(file.size_bytes(), None);
    }

    #[test]
    fn test_folder_metadata_serialization() {
        let metadata = NewFileMetadata {
            name: "AniTail Backups",
            mime_type: Some("application/vnd.google-apps.folder"),
            parents: Vec::new(),
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["mimeType"], "application/vnd.google-apps.folder");
        assert!(json.get("parents").is_none());
    }
}
