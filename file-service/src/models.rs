//! File metadata records and upload stream types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata row describing a stored file.
///
/// A record is only ever created after its blob is durably stored, so a
/// record's `storage_key` always points at an existing object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

/// Derive the object-store key for a file identifier.
///
/// Opaque to the metadata store; only the object store adapter
/// interprets it.
pub fn storage_key(file_id: Uuid) -> String {
    format!("files/{file_id}")
}

/// Descriptive fields accompanying an upload.
#[derive(Debug, Clone)]
pub struct UploadHeader {
    pub name: String,
    pub mime_type: String,
    pub course_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

/// One message of a chunked upload. The first-seen header supplies the
/// file's descriptive metadata; every chunk may carry payload bytes.
#[derive(Debug, Clone)]
pub struct FileChunk {
    pub header: Option<UploadHeader>,
    pub data: Bytes,
}

impl FileChunk {
    pub fn header(header: UploadHeader) -> Self {
        Self {
            header: Some(header),
            data: Bytes::new(),
        }
    }

    pub fn data(data: Bytes) -> Self {
        Self { header: None, data }
    }
}

/// Result of an object-store stat call.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub size: i64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}
