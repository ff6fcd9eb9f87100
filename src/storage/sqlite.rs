//! Primary store backed by SQLite.
//!
//! One row per upload in `uploaded_files`. Columns, preview and stats are stored as JSON
//! text. The schema only ever grows: missing columns are added on open, and databases
//! written before the `preview` column existed have their legacy `data_preview` copied over.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension, Row as SqlRow};

use crate::error::{StoreError, StoreResult};
use crate::types::{CanonicalRecord, ColumnStats, FileType, Row};

use super::{
    like_pattern, BackendId, BackendKind, DeleteOutcome, FileStore, NewFile, PrimaryStore, StoreStats, StoredBody,
    StoredFile,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS uploaded_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    file_type TEXT NOT NULL,
    columns TEXT NOT NULL,
    row_count INTEGER,
    uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// Columns added after the original table definition, with their DDL.
const ADDITIVE_COLUMNS: [(&str, &str); 3] = [
    ("preview", "TEXT"),
    ("stats", "TEXT"),
    ("source", "TEXT NOT NULL DEFAULT 'primary'"),
];

const SELECT_COLUMNS: &str =
    "SELECT id, filename, file_type, columns, row_count, uploaded_at, preview, stats, source FROM uploaded_files";

/// SQLite-backed [`PrimaryStore`]. A single connection guarded by a mutex.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and migrate its schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened primary store");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_files(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<StoredFile>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, RawRow::from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRow::decode).collect()
    }
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(CREATE_TABLE)?;

    let existing: HashSet<String> = {
        let mut stmt = conn.prepare("PRAGMA table_info(uploaded_files)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<HashSet<_>, _>>()?;
        names
    };

    for (name, ddl) in ADDITIVE_COLUMNS {
        if !existing.contains(name) {
            conn.execute_batch(&format!("ALTER TABLE uploaded_files ADD COLUMN {name} {ddl}"))?;
            tracing::info!(column = name, "added column to uploaded_files");
        }
    }

    if existing.contains("data_preview") {
        let copied = conn.execute(
            "UPDATE uploaded_files SET preview = data_preview WHERE preview IS NULL AND data_preview IS NOT NULL",
            [],
        )?;
        if copied > 0 {
            tracing::info!(rows = copied, "back-filled preview from data_preview");
        }
    }
    Ok(())
}

/// Undecoded row, read inside the rusqlite row callback.
struct RawRow {
    id: i64,
    filename: String,
    file_type: String,
    columns: String,
    row_count: Option<i64>,
    uploaded_at: Option<String>,
    preview: Option<String>,
    stats: Option<String>,
    source: String,
}

impl RawRow {
    fn from_sql(row: &SqlRow<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            file_type: row.get(2)?,
            columns: row.get(3)?,
            row_count: row.get(4)?,
            uploaded_at: row.get(5)?,
            preview: row.get(6)?,
            stats: row.get(7)?,
            source: row.get(8)?,
        })
    }

    fn decode(self) -> StoreResult<StoredFile> {
        let corrupt = |message: String| StoreError::Corrupt {
            backend: BackendKind::Primary,
            message: format!("row {}: {message}", self.id),
        };

        let file_type: FileType = self.file_type.parse().map_err(corrupt)?;
        let source: BackendKind = self.source.parse().map_err(corrupt)?;
        let uploaded_at = self
            .uploaded_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?
            .unwrap_or_default();
        let columns: Vec<String> = serde_json::from_str(&self.columns)?;
        let preview: Vec<Row> = match &self.preview {
            Some(text) => serde_json::from_str(text)?,
            None => Vec::new(),
        };
        let stats: IndexMap<String, ColumnStats> = match &self.stats {
            Some(text) => serde_json::from_str(text)?,
            None => IndexMap::new(),
        };

        Ok(StoredFile {
            id: BackendId::Int(self.id),
            backend: BackendKind::Primary,
            filename: self.filename,
            file_type,
            uploaded_at,
            source,
            body: StoredBody::Record(CanonicalRecord {
                columns,
                preview,
                row_count: self.row_count.map_or(0, |n| n.max(0) as usize),
                stats,
            }),
        })
    }
}

fn parse_timestamp(text: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn insert(conn: &Connection, file: &NewFile<'_>) -> StoreResult<i64> {
    let columns = serde_json::to_string(&file.record.columns)?;
    let preview = serde_json::to_string(&file.record.preview)?;
    let stats = serde_json::to_string(&file.record.stats)?;
    conn.execute(
        "INSERT INTO uploaded_files (filename, file_type, columns, row_count, uploaded_at, preview, stats, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            file.filename,
            file.file_type.as_str(),
            columns,
            file.record.row_count as i64,
            file.uploaded_at.format(TIMESTAMP_FORMAT).to_string(),
            preview,
            stats,
            file.source.as_str(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, filename = file.filename, source = %file.source, "saved to primary store");
    Ok(id)
}

impl FileStore for SqliteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Primary
    }

    fn connect(&self) -> StoreResult<()> {
        self.ping()
    }

    fn save(&self, file: &NewFile<'_>) -> StoreResult<BackendId> {
        let conn = self.lock();
        insert(&conn, file).map(BackendId::Int)
    }

    fn list_all(&self) -> StoreResult<Vec<StoredFile>> {
        self.query_files(&format!("{SELECT_COLUMNS} ORDER BY uploaded_at DESC, id DESC"), [])
    }

    fn search(&self, keyword: &str) -> StoreResult<Vec<StoredFile>> {
        self.query_files(
            &format!(
                "{SELECT_COLUMNS} WHERE filename LIKE ?1 ESCAPE '\\' OR file_type LIKE ?1 ESCAPE '\\' \
                 OR columns LIKE ?1 ESCAPE '\\' ORDER BY uploaded_at DESC, id DESC"
            ),
            [like_pattern(keyword)],
        )
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.lock();
        let (total_files, total_rows, total_columns): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(row_count), 0), COALESCE(SUM(json_array_length(columns)), 0)
             FROM uploaded_files",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let mut stmt = conn.prepare("SELECT file_type, COUNT(*) FROM uploaded_files GROUP BY file_type")?;
        let by_type: BTreeMap<String, u64> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<_, _>>()?;
        Ok(StoreStats {
            total_files: total_files as u64,
            by_type,
            total_rows: Some(total_rows as u64),
            total_columns: Some(total_columns as u64),
            size_in_bytes: None,
        })
    }

    fn ping(&self) -> StoreResult<()> {
        self.lock().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

impl PrimaryStore for SqliteStore {
    fn get(&self, id: i64) -> StoreResult<Option<StoredFile>> {
        let conn = self.lock();
        let raw = conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], RawRow::from_sql)
            .optional()?;
        raw.map(RawRow::decode).transpose()
    }

    fn delete(&self, id: i64) -> StoreResult<DeleteOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let raw = tx
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], RawRow::from_sql)
            .optional()?;
        let Some(raw) = raw else {
            return Ok(DeleteOutcome::NotFound);
        };
        tx.execute("DELETE FROM uploaded_files WHERE id = ?1", [id])?;
        tx.commit()?;
        tracing::info!(id, filename = %raw.filename, "deleted from primary store");
        Ok(DeleteOutcome::Deleted(raw.decode()?))
    }

    fn list_by_source(&self, source: BackendKind) -> StoreResult<Vec<StoredFile>> {
        self.query_files(
            &format!("{SELECT_COLUMNS} WHERE source = ?1 ORDER BY uploaded_at DESC, id DESC"),
            [source.as_str()],
        )
    }

    fn save_all(&self, files: &[NewFile<'_>]) -> StoreResult<Vec<BackendId>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let ids = files
            .iter()
            .map(|file| insert(&tx, file).map(BackendId::Int))
            .collect::<StoreResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn record() -> CanonicalRecord {
        let mut row = Row::new();
        row.insert("a".to_string(), Value::Int64(1));
        CanonicalRecord {
            columns: vec!["a".to_string()],
            preview: vec![row],
            row_count: 1,
            stats: IndexMap::new(),
        }
    }

    #[test]
    fn legacy_table_is_migrated_additively() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE uploaded_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                columns TEXT NOT NULL,
                row_count INTEGER,
                uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                data_preview TEXT,
                stats TEXT
            );
            INSERT INTO uploaded_files (filename, file_type, columns, row_count, uploaded_at, data_preview, stats)
            VALUES ('old.csv', 'CSV', '[\"a\"]', 1, '2023-06-01 08:30:00', '[{\"a\":1}]', '{}');",
        )
        .unwrap();

        let store = SqliteStore::from_connection(conn).unwrap();
        let file = store.get(1).unwrap().unwrap();
        assert_eq!(file.source, BackendKind::Primary);
        assert_eq!(file.record().unwrap(), &record());
        assert_eq!(file.uploaded_at.to_string(), "2023-06-01 08:30:00");
    }

    #[test]
    fn unknown_file_type_is_reported_as_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .lock()
            .execute(
                "INSERT INTO uploaded_files (filename, file_type, columns, row_count) VALUES ('x', 'TSV', '[]', 0)",
                [],
            )
            .unwrap();
        let err = store.list_all().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { backend: BackendKind::Primary, .. }));
    }
}
