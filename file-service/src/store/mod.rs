//! Store contracts: object store and metadata store.
//!
//! The coordinator depends only on these traits; concrete adapters are
//! injected at construction time.

use crate::error::Result;
use crate::models::{FileRecord, ObjectInfo};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod pg;
pub mod s3;

pub use pg::{connect_metadata_store, PgMetadataStore};
pub use s3::{connect_object_store, S3ObjectStore};

/// A streamed blob body.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opaque blob storage keyed by storage key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a whole payload under `key`.
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<()>;

    /// Store a blob from a channel of chunks as one streamed write.
    ///
    /// The write finishes when the sender side closes; returns the number
    /// of bytes written. On failure no partial object remains visible.
    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        chunks: mpsc::Receiver<Bytes>,
    ) -> Result<u64>;

    /// Stream a blob's content.
    async fn get(&self, key: &str) -> Result<ByteStream>;

    /// Delete a blob. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Describe a blob; `NotFound` if no object exists under `key`.
    async fn stat(&self, key: &str) -> Result<ObjectInfo>;
}

/// File metadata rows keyed by file identifier.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record; `DuplicateEntry` on identifier collision.
    async fn create(&self, record: &FileRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn list_by_course(&self, course_id: Uuid) -> Result<Vec<FileRecord>>;

    async fn list_by_group(&self, group_id: Uuid) -> Result<Vec<FileRecord>>;
}
