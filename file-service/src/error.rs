use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, FileError>;

/// Errors produced by the file storage core.
///
/// Storage faults during compensation are logged, never surfaced; the
/// caller always sees the original cause.
#[derive(Debug, Error)]
pub enum FileError {
    /// Blob write failed; no metadata row exists for the key
    #[error("object storage write failed: {0}")]
    StorageWriteFailed(String),

    /// Blob read failed mid-download
    #[error("object storage read failed: {0}")]
    StorageReadFailed(String),

    /// Other object-store fault (delete, stat)
    #[error("object storage error: {0}")]
    Storage(String),

    /// Metadata row creation failed; the blob has been compensated away
    #[error("metadata write failed: {0}")]
    MetadataWriteFailed(String),

    /// Other metadata-store fault
    #[error("metadata store error: {0}")]
    Metadata(String),

    /// No file record (or blob, where keyed directly) for the identifier
    #[error("file not found")]
    NotFound,

    /// Uniqueness violation, distinct from a generic write failure
    #[error("duplicate entry")]
    DuplicateEntry,

    /// Inbound upload stream violated the chunk protocol
    #[error("invalid upload stream: {0}")]
    InvalidStream(String),

    /// Client cancelled an in-flight transfer
    #[error("upload canceled")]
    Canceled,
}

impl FileError {
    /// Convert to gRPC Status for the surrounding RPC layer
    pub fn to_status(&self) -> Status {
        match self {
            FileError::NotFound => Status::new(Code::NotFound, self.to_string()),
            FileError::DuplicateEntry => Status::new(Code::AlreadyExists, self.to_string()),
            FileError::InvalidStream(_) => Status::new(Code::InvalidArgument, self.to_string()),
            FileError::Canceled => Status::new(Code::Cancelled, self.to_string()),
            FileError::StorageWriteFailed(_)
            | FileError::StorageReadFailed(_)
            | FileError::Storage(_)
            | FileError::MetadataWriteFailed(_)
            | FileError::Metadata(_) => Status::new(Code::Internal, "internal server error"),
        }
    }
}

impl From<sqlx::Error> for FileError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => FileError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => FileError::DuplicateEntry,
            _ => FileError::Metadata(err.to_string()),
        }
    }
}
