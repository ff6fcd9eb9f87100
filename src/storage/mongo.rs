//! Document store backed by MongoDB (sync driver).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Collection};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::types::{CanonicalRecord, ColumnStats, FileType, Row};

use super::{BackendId, BackendKind, FileStore, LazyConnection, NewFile, StoreStats, StoredBody, StoredFile};

/// Rows of the preview kept in each document.
pub const DOCUMENT_PREVIEW_ROWS: usize = 10;

/// Connection settings for [`DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    /// Connection string, e.g. `mongodb://mongodb:27017/`.
    pub uri: String,
    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection name.
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_database() -> String {
    "analytics_db".to_string()
}

fn default_collection() -> String {
    "files".to_string()
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://mongodb:27017/".to_string(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}

/// Shape of one document in the `files` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    filename: String,
    file_type: String,
    uploaded_at: BsonDateTime,
    columns: Vec<String>,
    row_count: i64,
    preview_data: Vec<Row>,
    #[serde(default)]
    stats: IndexMap<String, ColumnStats>,
}

impl FileDocument {
    fn into_stored(self) -> StoreResult<StoredFile> {
        let id = self.id.map(|oid| oid.to_hex()).unwrap_or_default();
        let file_type: FileType = self.file_type.parse().map_err(|message| StoreError::Corrupt {
            backend: BackendKind::Document,
            message: format!("document {id}: {message}"),
        })?;
        Ok(StoredFile {
            id: BackendId::Text(id),
            backend: BackendKind::Document,
            filename: self.filename,
            file_type,
            uploaded_at: from_bson_datetime(self.uploaded_at),
            source: BackendKind::Document,
            body: StoredBody::Record(CanonicalRecord {
                columns: self.columns,
                preview: self.preview_data,
                row_count: self.row_count.max(0) as usize,
                stats: self.stats,
            }),
        })
    }
}

/// Naive local times are stored as if they were UTC, so they read back unchanged.
fn to_bson_datetime(ts: NaiveDateTime) -> BsonDateTime {
    BsonDateTime::from_millis(ts.and_utc().timestamp_millis())
}

fn from_bson_datetime(ts: BsonDateTime) -> NaiveDateTime {
    chrono::DateTime::from_timestamp_millis(ts.timestamp_millis())
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Append driver timeouts to a connection string.
fn uri_with_timeouts(uri: &str, timeout: Duration) -> String {
    let ms = timeout.as_millis();
    let options = format!("serverSelectionTimeoutMS={ms}&connectTimeoutMS={ms}");
    if uri.contains('?') {
        format!("{uri}&{options}")
    } else {
        let hosts = uri.split_once("://").map_or(uri, |(_, rest)| rest);
        let slash = if hosts.contains('/') { "" } else { "/" };
        format!("{uri}{slash}?{options}")
    }
}

/// MongoDB-backed [`FileStore`]. Keeps the first [`DOCUMENT_PREVIEW_ROWS`] preview rows.
#[derive(Debug)]
pub struct DocumentStore {
    config: DocumentStoreConfig,
    timeout: Duration,
    client: LazyConnection<Client>,
}

impl DocumentStore {
    /// Create the adapter. Nothing is contacted until the first operation.
    pub fn new(config: DocumentStoreConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            client: LazyConnection::new(BackendKind::Document),
        }
    }

    fn open(&self) -> StoreResult<Client> {
        let client = Client::with_uri_str(uri_with_timeouts(&self.config.uri, self.timeout))?;
        // Client construction is lazy; make sure the server is actually reachable.
        client.database("admin").run_command(doc! { "ping": 1 }, None)?;
        Ok(client)
    }

    fn with_collection<T>(&self, op: impl FnOnce(Collection<FileDocument>) -> StoreResult<T>) -> StoreResult<T> {
        self.client.with(
            || self.open(),
            |client| {
                let coll = client
                    .database(&self.config.database)
                    .collection::<FileDocument>(&self.config.collection);
                op(coll)
            },
        )
    }

    fn find(&self, filter: Option<Document>) -> StoreResult<Vec<StoredFile>> {
        self.with_collection(|coll| {
            let options = FindOptions::builder().sort(doc! { "uploaded_at": -1 }).build();
            let mut files = Vec::new();
            for doc in coll.find(filter, options)? {
                files.push(doc?.into_stored()?);
            }
            Ok(files)
        })
    }
}

impl FileStore for DocumentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn connect(&self) -> StoreResult<()> {
        self.client.with(|| self.open(), |_| Ok(()))
    }

    fn save(&self, file: &NewFile<'_>) -> StoreResult<BackendId> {
        let doc = FileDocument {
            id: None,
            filename: file.filename.to_string(),
            file_type: file.file_type.as_str().to_string(),
            uploaded_at: to_bson_datetime(file.uploaded_at),
            columns: file.record.columns.clone(),
            row_count: file.record.row_count as i64,
            preview_data: file.record.preview.iter().take(DOCUMENT_PREVIEW_ROWS).cloned().collect(),
            stats: file.record.stats.clone(),
        };
        self.with_collection(|coll| {
            let inserted = coll.insert_one(doc, None)?;
            let id = match inserted.inserted_id {
                Bson::ObjectId(oid) => oid.to_hex(),
                other => other.to_string(),
            };
            tracing::debug!(%id, filename = file.filename, "saved to document store");
            Ok(BackendId::Text(id))
        })
    }

    fn list_all(&self) -> StoreResult<Vec<StoredFile>> {
        self.find(None)
    }

    /// Case-insensitive match on filename or any column name. The keyword is matched
    /// literally, not as a regular expression.
    fn search(&self, keyword: &str) -> StoreResult<Vec<StoredFile>> {
        let pattern = regex::escape(keyword);
        self.find(Some(doc! {
            "$or": [
                { "filename": { "$regex": pattern.as_str(), "$options": "i" } },
                { "columns": { "$regex": pattern.as_str(), "$options": "i" } },
            ]
        }))
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        self.with_collection(|coll| {
            let pipeline = vec![doc! {
                "$group": {
                    "_id": "$file_type",
                    "count": { "$sum": 1 },
                    "rows": { "$sum": "$row_count" },
                    "columns": { "$sum": { "$size": "$columns" } },
                }
            }];
            let mut stats = StoreStats {
                total_rows: Some(0),
                total_columns: Some(0),
                ..StoreStats::default()
            };
            let mut by_type = BTreeMap::new();
            for group in coll.aggregate(pipeline, None)? {
                let group = group?;
                let count = bson_count(group.get("count"));
                stats.total_files += count;
                stats.total_rows = Some(stats.total_rows.unwrap_or(0) + bson_count(group.get("rows")));
                stats.total_columns = Some(stats.total_columns.unwrap_or(0) + bson_count(group.get("columns")));
                let label = group.get_str("_id").unwrap_or("unknown").to_string();
                by_type.insert(label, count);
            }
            stats.by_type = by_type;
            Ok(stats)
        })
    }

    fn ping(&self) -> StoreResult<()> {
        self.client.with(
            || self.open(),
            |client| {
                client.database("admin").run_command(doc! { "ping": 1 }, None)?;
                Ok(())
            },
        )
    }
}

fn bson_count(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) if n.is_finite() && *n > 0.0 => *n as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_appended_to_the_uri() {
        let t = Duration::from_millis(2000);
        assert_eq!(
            uri_with_timeouts("mongodb://mongodb:27017/", t),
            "mongodb://mongodb:27017/?serverSelectionTimeoutMS=2000&connectTimeoutMS=2000"
        );
        assert_eq!(
            uri_with_timeouts("mongodb://localhost:27017", t),
            "mongodb://localhost:27017/?serverSelectionTimeoutMS=2000&connectTimeoutMS=2000"
        );
        assert_eq!(
            uri_with_timeouts("mongodb://h/db?retryWrites=true", t),
            "mongodb://h/db?retryWrites=true&serverSelectionTimeoutMS=2000&connectTimeoutMS=2000"
        );
    }

    #[test]
    fn datetimes_read_back_unchanged() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(23, 15, 1))
            .unwrap();
        assert_eq!(from_bson_datetime(to_bson_datetime(ts)), ts);
    }

    #[test]
    fn counts_accept_any_numeric_bson() {
        assert_eq!(bson_count(Some(&Bson::Int32(3))), 3);
        assert_eq!(bson_count(Some(&Bson::Int64(5))), 5);
        assert_eq!(bson_count(Some(&Bson::Double(2.0))), 2);
        assert_eq!(bson_count(None), 0);
    }
}
