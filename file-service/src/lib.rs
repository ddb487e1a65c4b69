/// File Service Library
///
/// Two-phase file storage core: keeps a binary object store (S3) and a
/// relational metadata store (Postgres) consistent across upload, streamed
/// upload, download and delete, with compensation on partial failure.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `coordinator`: Two-phase upload/download/delete orchestration
/// - `error`: Error types
/// - `models`: File records and upload stream types
/// - `store`: ObjectStore (S3) and MetadataStore (Postgres) adapters
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use coordinator::{Download, UploadCoordinator};
pub use error::{FileError, Result};
pub use models::{FileChunk, FileRecord, UploadHeader};
