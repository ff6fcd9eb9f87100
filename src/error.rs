use thiserror::Error;

use crate::storage::BackendKind;
use crate::types::FileType;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Convenience result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenience result type for [`crate::service::Ingestor`] operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error type returned by format detection and normalization.
///
/// Any of these aborts the upload before anything is persisted.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The extension is not in the upload allow-list.
    #[error("file type '{extension}' not supported. Allowed: .csv, .xlsx, .xls, .json")]
    UnsupportedFormat { extension: String },

    /// The bytes could not be parsed as the declared format.
    #[error("{file_type} processing error: {message}")]
    Format { file_type: FileType, message: String },

    /// The parsed structure cannot be normalized (e.g. it has no columns).
    #[error("normalization error: {message}")]
    Normalization { message: String },

    /// Underlying I/O error (e.g. reading an upload from disk).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    pub(crate) fn format(file_type: FileType, message: impl Into<String>) -> Self {
        Self::Format {
            file_type,
            message: message.into(),
        }
    }
}

/// Error type returned by persistence adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached (connect failure or timeout).
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    /// No record exists with the requested id.
    #[error("file {id} not found")]
    NotFound { id: i64 },

    /// A stored row could not be decoded back into a record.
    #[error("corrupt {backend} record: {message}")]
    Corrupt { backend: BackendKind, message: String },

    /// Primary (SQLite) store error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Secondary relational (PostgreSQL) store error.
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// Document store (MongoDB) error.
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Search index (OpenSearch) transport error.
    #[error("search index request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding/decoding of stored columns failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error means the cached connection handle can no longer be used.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Postgres(e) => e.is_closed(),
            Self::Mongo(e) => matches!(
                e.kind.as_ref(),
                mongodb::error::ErrorKind::ServerSelection { .. } | mongodb::error::ErrorKind::Io(_)
            ),
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Error type returned by [`crate::service::Ingestor`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Detection or normalization failed.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    /// The primary store failed. Always fatal for the request.
    #[error("primary store error: {0}")]
    PrimaryStore(StoreError),

    /// No primary record exists with this id.
    #[error("file {id} not found")]
    NotFound { id: i64 },

    /// Local I/O failed (e.g. creating the upload directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// HTTP status an outer layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Ingestion(IngestionError::Io(_)) => 500,
            Self::Ingestion(_) => 400,
            Self::NotFound { .. } => 404,
            Self::PrimaryStore(_) | Self::Io(_) => 500,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => Self::NotFound { id },
            other => Self::PrimaryStore(other),
        }
    }
}
