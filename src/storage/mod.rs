//! Persistence adapters.
//!
//! Every backend implements [`FileStore`], a small save/list/search/stats/ping contract over
//! [`CanonicalRecord`]s. The primary store additionally implements [`PrimaryStore`]: it is
//! the source of truth for every upload, and the only store that supports lookups by id,
//! deletes, and filtering by the backend an upload was aimed at.
//!
//! | Backend | Adapter | Crate |
//! |---------|---------|-------|
//! | primary relational store | [`sqlite::SqliteStore`] | `rusqlite` |
//! | document store | [`mongo::DocumentStore`] | `mongodb` (sync) |
//! | search index | [`opensearch::SearchIndex`] | `reqwest` (blocking) |
//! | secondary relational store | [`postgres::SecondaryStore`] | `postgres` |
//!
//! Optional backends connect lazily through [`lazy::LazyConnection`] and never fail the
//! caller on connect; they report [`crate::error::StoreError::Unavailable`] instead.

pub mod lazy;
pub mod mongo;
pub mod opensearch;
pub mod postgres;
pub mod sqlite;
pub mod uploads;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::types::{CanonicalRecord, FileType};

pub use lazy::LazyConnection;
pub use mongo::DocumentStore;
pub use opensearch::SearchIndex;
pub use postgres::SecondaryStore;
pub use sqlite::SqliteStore;
pub use uploads::UploadDirectory;

/// Identifies one storage backend. Also used as the `source` tag on primary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Primary relational store (SQLite).
    Primary,
    /// Document store (MongoDB).
    Document,
    /// Search index (OpenSearch).
    Search,
    /// Secondary relational store (PostgreSQL).
    Secondary,
}

impl BackendKind {
    /// Backends that may be down without failing a request.
    pub const OPTIONAL: [Self; 3] = [Self::Document, Self::Search, Self::Secondary];

    /// Tag persisted in the primary store's `source` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Document => "document",
            Self::Search => "search",
            Self::Secondary => "secondary",
        }
    }

    /// Whether this is one of the optional accelerators.
    pub fn is_optional(self) -> bool {
        self != Self::Primary
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "sqlite" => Ok(Self::Primary),
            "document" | "mongodb" => Ok(Self::Document),
            "search" | "opensearch" => Ok(Self::Search),
            "secondary" | "postgres" => Ok(Self::Secondary),
            other => Err(format!(
                "unknown backend '{other}' (expected primary, document, search or secondary)"
            )),
        }
    }
}

/// Backend-assigned identifier of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackendId {
    /// Relational row id.
    Int(i64),
    /// Document/search id (ObjectId hex, OpenSearch `_id`).
    Text(String),
}

impl BackendId {
    /// Integer view of a relational id.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(id) => Some(*id),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// A record about to be written to one backend.
#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
    /// Client-supplied file name.
    pub filename: &'a str,
    /// Detected file type.
    pub file_type: FileType,
    /// Normalized contents.
    pub record: &'a CanonicalRecord,
    /// Backend the upload was aimed at.
    pub source: BackendKind,
    /// Write time (application local clock, second precision).
    pub uploaded_at: NaiveDateTime,
}

/// What the search index keeps about a file instead of the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Column names.
    pub columns: Vec<String>,
    /// Stringified values of the first preview rows.
    pub content: String,
    /// Relevance score, present on search hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Body of a [`StoredFile`]: the full record, or the search index's document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredBody {
    /// Full canonical record (relational and document stores).
    Record(CanonicalRecord),
    /// Search index document.
    Indexed(IndexedDocument),
}

impl StoredBody {
    /// Column names, whichever shape the body has.
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Record(record) => &record.columns,
            Self::Indexed(doc) => &doc.columns,
        }
    }
}

/// A file as read back from one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    /// Backend-assigned id.
    pub id: BackendId,
    /// Backend this view was read from.
    pub backend: BackendKind,
    /// Client-supplied file name.
    pub filename: String,
    /// Detected file type.
    pub file_type: FileType,
    /// Write time.
    pub uploaded_at: NaiveDateTime,
    /// Backend the upload was aimed at.
    pub source: BackendKind,
    /// Stored contents.
    #[serde(flatten)]
    pub body: StoredBody,
}

impl StoredFile {
    /// The canonical record, unless this is a search index document.
    pub fn record(&self) -> Option<&CanonicalRecord> {
        match &self.body {
            StoredBody::Record(record) => Some(record),
            StoredBody::Indexed(_) => None,
        }
    }
}

/// Aggregate counts reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of stored files.
    pub total_files: u64,
    /// File count per file type label (`CSV`, `Excel`, `JSON`).
    pub by_type: BTreeMap<String, u64>,
    /// Sum of `row_count` over stored files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    /// Sum of column counts over stored files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_columns: Option<u64>,
    /// On-disk size of the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_in_bytes: Option<u64>,
}

/// Result of a primary store delete.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The row existed and was removed.
    Deleted(StoredFile),
    /// No row had this id.
    NotFound,
}

/// The contract every storage backend implements.
pub trait FileStore: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Establish the connection (if not already established).
    ///
    /// Optional backends fail with [`crate::error::StoreError::Unavailable`].
    fn connect(&self) -> StoreResult<()>;

    /// Persist a record and return the backend-assigned id.
    fn save(&self, file: &NewFile<'_>) -> StoreResult<BackendId>;

    /// All stored files, newest first.
    fn list_all(&self) -> StoreResult<Vec<StoredFile>>;

    /// Stored files matching `keyword`.
    fn search(&self, keyword: &str) -> StoreResult<Vec<StoredFile>>;

    /// Aggregate counts.
    fn stats(&self) -> StoreResult<StoreStats>;

    /// Reachability probe.
    fn ping(&self) -> StoreResult<()>;
}

/// Extra operations of the source-of-truth store.
pub trait PrimaryStore: FileStore {
    /// Fetch one file by id.
    fn get(&self, id: i64) -> StoreResult<Option<StoredFile>>;

    /// Remove one file by id.
    fn delete(&self, id: i64) -> StoreResult<DeleteOutcome>;

    /// Files whose upload was aimed at `source`, newest first.
    fn list_by_source(&self, source: BackendKind) -> StoreResult<Vec<StoredFile>>;

    /// Persist several records, all or none.
    ///
    /// The default saves one by one and deletes the rows already written when a later
    /// save fails.
    fn save_all(&self, files: &[NewFile<'_>]) -> StoreResult<Vec<BackendId>> {
        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            match self.save(file) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids.iter().filter_map(BackendId::as_int) {
                        if let Err(undo) = self.delete(id) {
                            tracing::warn!(id, error = %undo, "could not undo partial primary write");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }
}

/// Current local wall clock time, truncated to whole seconds.
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local().trunc_subsecs(0)
}

/// `%keyword%` pattern for `LIKE`/`ILIKE`, with wildcards in the keyword escaped by `\`.
pub(crate) fn like_pattern(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len() + 2);
    out.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
