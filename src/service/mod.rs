//! Upload orchestration.
//!
//! [`Ingestor`] runs the whole upload pipeline (detect, normalize, persist) and answers the
//! read-side queries. The primary store is the source of truth: it is always written first
//! and its failures fail the request. Optional backends are written afterwards and any
//! failure there only degrades the answer.
//!
//! ```
//! use std::sync::Arc;
//!
//! use file_analytics::service::Ingestor;
//! use file_analytics::storage::{BackendKind, SqliteStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ingestor = Ingestor::new(Arc::new(SqliteStore::open_in_memory()?));
//! let report = ingestor.ingest("sales.csv", ".csv", b"region,amount\nnorth,10\nsouth,20\n", &[])?;
//! assert_eq!(report.record.row_count, 2);
//!
//! // Not wired: the upload still succeeds, with a warning.
//! let report = ingestor.ingest("sales.csv", ".csv", b"a\n1\n", &[BackendKind::Search])?;
//! assert!(report.is_degraded());
//! # Ok(())
//! # }
//! ```

mod report;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::{analyze, AnalysisKind};
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult, StoreError};
use crate::ingestion::{detect, resolve_file_type, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use crate::normalize::normalize;
use crate::storage::mongo::DOCUMENT_PREVIEW_ROWS;
use crate::storage::{
    now_local, BackendId, BackendKind, DeleteOutcome, DocumentStore, FileStore, NewFile, PrimaryStore, SearchIndex,
    SecondaryStore, SqliteStore, StoreStats, StoredBody, StoredFile, UploadDirectory,
};

pub use report::{
    AnalysisReport, BackendOutcome, BackendWrite, Degradable, HealthReport, HealthStatus, IngestReport, WriteStatus,
};

/// The upload pipeline and its query surface.
pub struct Ingestor {
    primary: Arc<dyn PrimaryStore>,
    optional: BTreeMap<BackendKind, Arc<dyn FileStore>>,
    uploads: Option<UploadDirectory>,
    observer: Option<Arc<dyn IngestionObserver>>,
    alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("optional", &self.optional.keys().collect::<Vec<_>>())
            .field("uploads", &self.uploads)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Ingestor {
    /// An ingestor writing only to `primary`.
    pub fn new(primary: Arc<dyn PrimaryStore>) -> Self {
        Self {
            primary,
            optional: BTreeMap::new(),
            uploads: None,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }

    /// Wire the primary store, upload directory and every enabled optional backend.
    ///
    /// Optional backends are not contacted here; they connect on first use.
    pub fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let mut ingestor = Self::new(Arc::new(SqliteStore::open(&config.database_path)?));
        if let Some(dir) = &config.upload_dir {
            ingestor = ingestor.with_uploads(UploadDirectory::create(dir)?);
        }

        let timeout = config.connect_timeout();
        for kind in BackendKind::OPTIONAL {
            if !config.is_enabled(kind) {
                continue;
            }
            let store: Arc<dyn FileStore> = match kind {
                BackendKind::Document => Arc::new(DocumentStore::new(config.document.clone(), timeout)),
                BackendKind::Search => Arc::new(SearchIndex::new(config.search.clone(), timeout)),
                BackendKind::Secondary => Arc::new(SecondaryStore::new(config.secondary.clone(), timeout)),
                BackendKind::Primary => continue,
            };
            ingestor = ingestor.with_backend(store);
        }
        Ok(ingestor)
    }

    /// Register an optional backend, replacing any earlier one of the same kind.
    ///
    /// A store reporting [`BackendKind::Primary`] is ignored.
    pub fn with_backend(mut self, store: Arc<dyn FileStore>) -> Self {
        let kind = store.kind();
        if kind.is_optional() {
            self.optional.insert(kind, store);
        } else {
            tracing::warn!("ignoring a second primary store");
        }
        self
    }

    /// Keep a copy of every raw upload in `uploads`.
    pub fn with_uploads(mut self, uploads: UploadDirectory) -> Self {
        self.uploads = Some(uploads);
        self
    }

    /// Report upload outcomes to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Severity at which failed uploads also trigger `on_alert` (default: critical).
    pub fn with_alert_threshold(mut self, severity: IngestionSeverity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    /// The primary store.
    pub fn primary(&self) -> &Arc<dyn PrimaryStore> {
        &self.primary
    }

    /// The optional backend of `kind`, if wired.
    pub fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn FileStore>> {
        self.optional.get(&kind)
    }

    /// Detect, normalize and persist one upload.
    ///
    /// `targets` names the optional backends the upload is aimed at. The primary store gets
    /// one row per target, tagged with it, or a single row tagged `primary` when there is
    /// none. Optional targets that fail (or are not wired) are reported in
    /// [`IngestReport::warnings`] and never fail the upload.
    ///
    /// # Errors
    ///
    /// Unsupported extensions, unparseable bytes and primary store failures.
    pub fn ingest(
        &self,
        filename: &str,
        extension: &str,
        bytes: &[u8],
        targets: &[BackendKind],
    ) -> ServiceResult<IngestReport> {
        let start = Instant::now();
        let mut ctx = IngestionContext {
            filename: filename.to_string(),
            file_type: None,
            targets: optional_targets(targets),
        };

        let result = self.run_ingest(&mut ctx, extension, bytes, start);

        if let Some(obs) = self.observer.as_ref() {
            match &result {
                Ok(report) => obs.on_success(
                    &ctx,
                    IngestionStats {
                        rows: report.record.row_count,
                        elapsed: start.elapsed(),
                    },
                ),
                Err(e) => {
                    let sev = IngestionSeverity::for_error(e);
                    obs.on_failure(&ctx, sev, e);
                    if sev >= self.alert_at_or_above {
                        obs.on_alert(&ctx, sev, e);
                    }
                }
            }
        }
        result
    }

    fn run_ingest(
        &self,
        ctx: &mut IngestionContext,
        extension: &str,
        bytes: &[u8],
        start: Instant,
    ) -> ServiceResult<IngestReport> {
        let file_type = resolve_file_type(extension)?;
        ctx.file_type = Some(file_type);
        let (_, dataset) = detect(bytes, extension)?;
        let record = normalize(&dataset)?;
        let ctx: &IngestionContext = ctx;

        let uploaded_at = now_local();
        let new_file = |source| NewFile {
            filename: &ctx.filename,
            file_type,
            record: &record,
            source,
            uploaded_at,
        };

        let sources = if ctx.targets.is_empty() {
            vec![BackendKind::Primary]
        } else {
            ctx.targets.clone()
        };

        let mut writes = Vec::new();
        let mut warnings = Vec::new();
        let rows: Vec<NewFile<'_>> = sources.iter().map(|&source| new_file(source)).collect();
        match self.primary.save_all(&rows) {
            Ok(ids) => {
                for (source, id) in sources.into_iter().zip(ids) {
                    let outcome = BackendOutcome::Stored(id);
                    self.collect(ctx, BackendKind::Primary, source, outcome, &mut writes, &mut warnings)?;
                }
            }
            Err(e) => {
                let outcome = BackendOutcome::Fatal(e);
                self.collect(ctx, BackendKind::Primary, BackendKind::Primary, outcome, &mut writes, &mut warnings)?;
            }
        }

        for &target in &ctx.targets {
            let outcome = match self.optional.get(&target) {
                Some(store) => BackendOutcome::classify(target, store.save(&new_file(target))),
                None => BackendOutcome::Degraded(format!("{target} is not configured")),
            };
            self.collect(ctx, target, target, outcome, &mut writes, &mut warnings)?;
        }

        if let Some(uploads) = &self.uploads {
            if let Err(e) = uploads.save(&ctx.filename, bytes) {
                tracing::warn!(filename = %ctx.filename, error = %e, "could not keep raw upload");
                warnings.push(format!("raw upload not saved: {e}"));
            }
        }

        let primary_ids = writes
            .iter()
            .filter(|w| w.backend == BackendKind::Primary)
            .filter_map(|w| match &w.status {
                WriteStatus::Stored { id } => id.as_int(),
                WriteStatus::Degraded { .. } => None,
            })
            .collect();

        Ok(IngestReport {
            filename: ctx.filename.clone(),
            file_type,
            record,
            primary_ids,
            writes,
            warnings,
            upload_time: (start.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        })
    }

    fn collect(
        &self,
        ctx: &IngestionContext,
        backend: BackendKind,
        source: BackendKind,
        outcome: BackendOutcome,
        writes: &mut Vec<BackendWrite>,
        warnings: &mut Vec<String>,
    ) -> ServiceResult<()> {
        let status = match outcome {
            BackendOutcome::Stored(id) => WriteStatus::Stored { id },
            BackendOutcome::Degraded(warning) => {
                tracing::warn!(filename = %ctx.filename, %backend, %warning, "optional backend skipped");
                if let Some(obs) = self.observer.as_ref() {
                    obs.on_degraded(ctx, backend, &warning);
                }
                warnings.push(warning.clone());
                WriteStatus::Degraded { warning }
            }
            BackendOutcome::Fatal(e) => {
                tracing::error!(filename = %ctx.filename, error = %e, "primary store write failed");
                return Err(ServiceError::PrimaryStore(e));
            }
        };
        writes.push(BackendWrite {
            backend,
            source,
            status,
        });
        Ok(())
    }

    /// One file from the primary store.
    pub fn get_file(&self, id: i64) -> ServiceResult<StoredFile> {
        self.primary.get(id)?.ok_or(ServiceError::NotFound { id })
    }

    /// Remove a file from the primary store, together with its raw upload.
    ///
    /// Optional backends keep their copies.
    pub fn delete_file(&self, id: i64) -> ServiceResult<StoredFile> {
        let file = match self.primary.delete(id)? {
            DeleteOutcome::Deleted(file) => file,
            DeleteOutcome::NotFound => return Err(ServiceError::NotFound { id }),
        };
        if let Some(uploads) = &self.uploads {
            match uploads.remove(&file.filename) {
                Ok(true) => tracing::debug!(filename = %file.filename, "removed raw upload"),
                Ok(false) => tracing::debug!(filename = %file.filename, "no raw upload to remove"),
                Err(e) => tracing::warn!(filename = %file.filename, error = %e, "could not remove raw upload"),
            }
        }
        Ok(file)
    }

    /// Every file held by `backend`, newest first.
    ///
    /// When the document store fails or holds nothing, the primary rows aimed at it are
    /// served instead, reshaped like documents.
    pub fn list_files(&self, backend: BackendKind) -> ServiceResult<Degradable<Vec<StoredFile>>> {
        if backend == BackendKind::Primary {
            return Ok(Degradable::live(self.primary.list_all()?));
        }
        match self.query(backend, |store| store.list_all()) {
            Ok(files) if !files.is_empty() || backend != BackendKind::Document => Ok(Degradable::live(files)),
            Ok(_) => Ok(Degradable::fallback(self.document_fallback(None)?, None)),
            Err(warning) if backend == BackendKind::Document => {
                Ok(Degradable::fallback(self.document_fallback(None)?, Some(warning)))
            }
            Err(warning) => Ok(Degradable::unavailable(Vec::new(), warning)),
        }
    }

    /// Files in `backend` matching `keyword`.
    ///
    /// A failing document store is answered from the primary rows aimed at it, filtered by
    /// filename and column names.
    pub fn search(&self, backend: BackendKind, keyword: &str) -> ServiceResult<Degradable<Vec<StoredFile>>> {
        if backend == BackendKind::Primary {
            return Ok(Degradable::live(self.primary.search(keyword)?));
        }
        match self.query(backend, |store| store.search(keyword)) {
            Ok(files) => Ok(Degradable::live(files)),
            Err(warning) if backend == BackendKind::Document => {
                Ok(Degradable::fallback(self.document_fallback(Some(keyword))?, Some(warning)))
            }
            Err(warning) => Ok(Degradable::unavailable(Vec::new(), warning)),
        }
    }

    /// Aggregate counts of `backend`.
    pub fn stats(&self, backend: BackendKind) -> ServiceResult<Degradable<StoreStats>> {
        if backend == BackendKind::Primary {
            return Ok(Degradable::live(self.primary.stats()?));
        }
        Ok(match self.query(backend, |store| store.stats()) {
            Ok(stats) => Degradable::live(stats),
            Err(warning) => Degradable::unavailable(StoreStats::default(), warning),
        })
    }

    /// Probe one backend. Never fails.
    pub fn health(&self, backend: BackendKind) -> HealthReport {
        let result = if backend == BackendKind::Primary {
            self.primary.ping()
        } else {
            match self.optional.get(&backend) {
                Some(store) => store.ping(),
                None => {
                    return HealthReport {
                        backend,
                        status: HealthStatus::NotConfigured,
                        message: None,
                    };
                }
            }
        };
        match result {
            Ok(()) => HealthReport {
                backend,
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => {
                tracing::warn!(%backend, error = %e, "health probe failed");
                HealthReport {
                    backend,
                    status: HealthStatus::Unhealthy,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    /// Probe every backend, primary first.
    pub fn health_all(&self) -> Vec<HealthReport> {
        std::iter::once(BackendKind::Primary)
            .chain(BackendKind::OPTIONAL)
            .map(|backend| self.health(backend))
            .collect()
    }

    /// Run `kind` over the stored preview of primary file `id`.
    pub fn analyze(&self, id: i64, kind: AnalysisKind) -> ServiceResult<AnalysisReport> {
        let file = self.get_file(id)?;
        let record = file.record().ok_or_else(|| {
            ServiceError::PrimaryStore(StoreError::Corrupt {
                backend: BackendKind::Primary,
                message: format!("file {id} has no stored record"),
            })
        })?;
        Ok(AnalysisReport {
            file_id: id,
            analysis_type: kind,
            results: analyze(record, kind),
        })
    }

    /// Run `op` against an optional backend, turning any failure into a warning.
    fn query<T>(
        &self,
        backend: BackendKind,
        op: impl FnOnce(&dyn FileStore) -> crate::error::StoreResult<T>,
    ) -> Result<T, String> {
        let Some(store) = self.optional.get(&backend) else {
            return Err(format!("{backend} is not configured"));
        };
        op(store.as_ref()).map_err(|e| {
            tracing::warn!(%backend, error = %e, "optional backend query failed");
            format!("{backend} unavailable: {e}")
        })
    }

    /// Primary rows aimed at the document store, shaped like documents.
    fn document_fallback(&self, keyword: Option<&str>) -> ServiceResult<Vec<StoredFile>> {
        let needle = keyword.map(str::to_lowercase);
        let files = self
            .primary
            .list_by_source(BackendKind::Document)?
            .into_iter()
            .filter(|file| match &needle {
                None => true,
                Some(needle) => {
                    file.filename.to_lowercase().contains(needle.as_str())
                        || file.body.columns().iter().any(|c| c.to_lowercase().contains(needle.as_str()))
                }
            })
            .map(as_document)
            .collect::<Vec<_>>();
        tracing::info!(count = files.len(), "serving document store listing from primary store");
        Ok(files)
    }
}

/// Deduplicated optional targets in first-seen order.
fn optional_targets(targets: &[BackendKind]) -> Vec<BackendKind> {
    let mut out: Vec<BackendKind> = Vec::with_capacity(targets.len());
    for &target in targets {
        if target.is_optional() && !out.contains(&target) {
            out.push(target);
        }
    }
    out
}

fn as_document(file: StoredFile) -> StoredFile {
    let body = match file.body {
        StoredBody::Record(record) => StoredBody::Record(record.with_preview_limit(DOCUMENT_PREVIEW_ROWS)),
        indexed @ StoredBody::Indexed(_) => indexed,
    };
    StoredFile {
        id: match file.id {
            BackendId::Int(id) => BackendId::Text(id.to_string()),
            text @ BackendId::Text(_) => text,
        },
        backend: BackendKind::Document,
        source: BackendKind::Document,
        body,
        ..file
    }
}
