//! Search index backed by OpenSearch, spoken to over its REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{StoreError, StoreResult};
use crate::types::{FileType, Row};

use super::{BackendId, BackendKind, FileStore, IndexedDocument, LazyConnection, NewFile, StoreStats, StoredBody, StoredFile};

/// Preview rows folded into the searchable `content` field.
pub const CONTENT_ROWS: usize = 5;
/// Maximum hits returned by a search.
pub const SEARCH_SIZE: usize = 50;
/// Maximum documents returned by a listing.
const LIST_SIZE: usize = 1000;

/// Connection settings for [`SearchIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexConfig {
    /// Base URL of the cluster, e.g. `http://opensearch:9200`.
    pub url: String,
    /// Index name.
    #[serde(default = "default_index")]
    pub index: String,
}

fn default_index() -> String {
    "files".to_string()
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            url: "http://opensearch:9200".to_string(),
            index: default_index(),
        }
    }
}

/// Index settings and mappings used when the index does not exist yet.
fn index_body() -> serde_json::Value {
    json!({
        "settings": { "index": { "number_of_shards": 1, "number_of_replicas": 0 } },
        "mappings": { "properties": {
            "filename": { "type": "text" },
            "file_type": { "type": "keyword" },
            "columns": { "type": "keyword" },
            "content": { "type": "text" },
            "uploaded_at": { "type": "date" }
        }}
    })
}

/// Space-joined stringified values of the first [`CONTENT_ROWS`] preview rows.
///
/// Null cells are indexed as the JSON token `null`.
pub fn content_text(preview: &[Row]) -> String {
    preview
        .iter()
        .take(CONTENT_ROWS)
        .map(|row| row.values().map(ToString::to_string).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexSource {
    filename: String,
    file_type: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    content: String,
    uploaded_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
    #[serde(default)]
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: IndexSource,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    by_type: Terms,
}

#[derive(Debug, Deserialize)]
struct Terms {
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    key: String,
    doc_count: u64,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl Hit {
    fn into_stored(self) -> StoreResult<StoredFile> {
        let file_type: FileType = self.source.file_type.parse().map_err(|message| StoreError::Corrupt {
            backend: BackendKind::Search,
            message: format!("document {}: {message}", self.id),
        })?;
        Ok(StoredFile {
            id: BackendId::Text(self.id),
            backend: BackendKind::Search,
            filename: self.source.filename,
            file_type,
            uploaded_at: self.source.uploaded_at,
            source: BackendKind::Search,
            body: StoredBody::Indexed(IndexedDocument {
                columns: self.source.columns,
                content: self.source.content,
                score: self.score,
            }),
        })
    }
}

/// OpenSearch-backed [`FileStore`].
///
/// The index is created with its mapping on first connect. Documents carry the file's
/// columns and a `content` string instead of the full preview.
#[derive(Debug)]
pub struct SearchIndex {
    config: SearchIndexConfig,
    timeout: Duration,
    client: LazyConnection<Client>,
}

impl SearchIndex {
    /// Create the adapter. Nothing is contacted until the first operation.
    pub fn new(config: SearchIndexConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            client: LazyConnection::new(BackendKind::Search),
        }
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn index_url(&self, path: &str) -> String {
        format!("{}/{}/{path}", self.base(), self.config.index)
    }

    fn open(&self) -> StoreResult<Client> {
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()?;
        client.get(self.base()).send()?.error_for_status()?;

        let index_url = format!("{}/{}", self.base(), self.config.index);
        let exists = client.head(&index_url).send()?;
        if exists.status() == StatusCode::NOT_FOUND {
            client.put(&index_url).json(&index_body()).send()?.error_for_status()?;
            tracing::info!(index = %self.config.index, "created search index");
        } else {
            exists.error_for_status()?;
        }
        Ok(client)
    }

    fn run_search(&self, body: serde_json::Value) -> StoreResult<SearchResponse> {
        self.client.with(
            || self.open(),
            |client| {
                let response = client
                    .post(self.index_url("_search"))
                    .json(&body)
                    .send()?
                    .error_for_status()?
                    .json::<SearchResponse>()?;
                Ok(response)
            },
        )
    }

    fn hits(&self, body: serde_json::Value) -> StoreResult<Vec<StoredFile>> {
        self.run_search(body)?
            .hits
            .hits
            .into_iter()
            .map(Hit::into_stored)
            .collect()
    }
}

impl FileStore for SearchIndex {
    fn kind(&self) -> BackendKind {
        BackendKind::Search
    }

    fn connect(&self) -> StoreResult<()> {
        self.client.with(|| self.open(), |_| Ok(()))
    }

    fn save(&self, file: &NewFile<'_>) -> StoreResult<BackendId> {
        let source = IndexSource {
            filename: file.filename.to_string(),
            file_type: file.file_type.as_str().to_string(),
            columns: file.record.columns.clone(),
            content: content_text(&file.record.preview),
            uploaded_at: file.uploaded_at,
        };
        self.client.with(
            || self.open(),
            |client| {
                let response = client
                    .post(self.index_url("_doc?refresh=true"))
                    .json(&source)
                    .send()?
                    .error_for_status()?
                    .json::<IndexResponse>()?;
                tracing::debug!(id = %response.id, filename = file.filename, "indexed in search index");
                Ok(BackendId::Text(response.id))
            },
        )
    }

    fn list_all(&self) -> StoreResult<Vec<StoredFile>> {
        self.hits(json!({
            "size": LIST_SIZE,
            "query": { "match_all": {} },
            "sort": [{ "uploaded_at": { "order": "desc" } }]
        }))
    }

    /// Fuzzy `multi_match` over filename (boosted), content and columns.
    fn search(&self, keyword: &str) -> StoreResult<Vec<StoredFile>> {
        self.hits(json!({
            "size": SEARCH_SIZE,
            "query": { "multi_match": {
                "query": keyword,
                "fields": ["filename^3", "content", "columns"],
                "fuzziness": "AUTO"
            }}
        }))
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let count = self.client.with(
            || self.open(),
            |client| {
                let response = client
                    .get(self.index_url("_count"))
                    .send()?
                    .error_for_status()?
                    .json::<CountResponse>()?;
                Ok(response.count)
            },
        )?;
        let stats = self.client.with(
            || self.open(),
            |client| {
                let response = client
                    .get(self.index_url("_stats"))
                    .send()?
                    .error_for_status()?
                    .json::<serde_json::Value>()?;
                Ok(response)
            },
        )?;
        let size_in_bytes = stats
            .pointer("/_all/total/store/size_in_bytes")
            .and_then(serde_json::Value::as_u64);

        let aggregated = self.run_search(json!({
            "size": 0,
            "aggs": { "by_type": { "terms": { "field": "file_type" } } }
        }))?;
        let by_type: BTreeMap<String, u64> = aggregated
            .aggregations
            .map(|a| a.by_type.buckets.into_iter().map(|b| (b.key, b.doc_count)).collect())
            .unwrap_or_default();

        Ok(StoreStats {
            total_files: count,
            by_type,
            total_rows: None,
            total_columns: None,
            size_in_bytes,
        })
    }

    fn ping(&self) -> StoreResult<()> {
        self.client.with(
            || self.open(),
            |client| {
                client.get(self.base()).send()?.error_for_status()?;
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn content_uses_first_five_rows_only() {
        let preview: Vec<Row> = (0..8)
            .map(|i| {
                let mut row = Row::new();
                row.insert("n".to_string(), Value::Int64(i));
                row.insert("name".to_string(), Value::Utf8(format!("r{i}")));
                row
            })
            .collect();
        assert_eq!(content_text(&preview), "0 r0 1 r1 2 r2 3 r3 4 r4");
    }

    #[test]
    fn content_writes_null_cells_as_json_null() {
        let mut row = Row::new();
        row.insert("a".to_string(), Value::Null);
        row.insert("b".to_string(), Value::Bool(true));
        assert_eq!(content_text(&[row]), "null true");
    }

    #[test]
    fn search_hit_decodes_into_indexed_body() {
        let raw = r#"{"hits":{"hits":[{"_id":"x1","_score":2.5,"_source":{
            "filename":"sales.csv","file_type":"CSV","columns":["region"],
            "content":"north","uploaded_at":"2024-01-05T10:00:00"}}]}}"#;
        let response: SearchResponse = serde_json::from_str(raw).unwrap();
        let files: Vec<StoredFile> = response
            .hits
            .hits
            .into_iter()
            .map(|h| h.into_stored().unwrap())
            .collect();
        assert_eq!(files[0].id, BackendId::Text("x1".to_string()));
        assert_eq!(files[0].body.columns(), ["region".to_string()]);
        let StoredBody::Indexed(doc) = &files[0].body else {
            panic!("expected indexed body");
        };
        assert_eq!(doc.score, Some(2.5));
    }
}
