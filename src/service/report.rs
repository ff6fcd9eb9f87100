use serde::Serialize;

use crate::analysis::{Analysis, AnalysisKind};
use crate::error::{StoreError, StoreResult};
use crate::storage::{BackendId, BackendKind};
use crate::types::{CanonicalRecord, FileType};

/// What happened when one backend was asked to persist an upload.
#[derive(Debug)]
pub enum BackendOutcome {
    /// The backend accepted the record.
    Stored(BackendId),
    /// An optional backend could not take part; the upload continues.
    Degraded(String),
    /// The primary store failed; the upload is aborted.
    Fatal(StoreError),
}

impl BackendOutcome {
    /// Classify a write result. Only primary failures are fatal.
    pub fn classify(backend: BackendKind, result: StoreResult<BackendId>) -> Self {
        match result {
            Ok(id) => Self::Stored(id),
            Err(e) if backend.is_optional() => Self::Degraded(format!("{backend} write failed: {e}")),
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Status of one backend write, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WriteStatus {
    /// Persisted under `id`.
    Stored { id: BackendId },
    /// Skipped or failed without failing the upload.
    Degraded { warning: String },
}

/// One backend write performed by an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendWrite {
    /// Backend written to.
    pub backend: BackendKind,
    /// Target tag the record was written with.
    pub source: BackendKind,
    /// Outcome.
    #[serde(flatten)]
    pub status: WriteStatus,
}

/// Result of a successful [`super::Ingestor::ingest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    /// Client-supplied file name.
    pub filename: String,
    /// Detected file type.
    pub file_type: FileType,
    /// Normalized contents.
    #[serde(flatten)]
    pub record: CanonicalRecord,
    /// Primary row ids, one per target.
    pub primary_ids: Vec<i64>,
    /// Every backend write in the order it happened, primary first.
    pub writes: Vec<BackendWrite>,
    /// Warnings for the optional backends (and raw upload copy) that did not succeed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Seconds spent on the upload, rounded to two decimals.
    pub upload_time: f64,
}

impl IngestReport {
    /// Whether any optional backend degraded.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Id assigned by `backend`, if it stored the record.
    pub fn id_for(&self, backend: BackendKind) -> Option<&BackendId> {
        self.writes.iter().find_map(|w| match &w.status {
            WriteStatus::Stored { id } if w.backend == backend => Some(id),
            _ => None,
        })
    }
}

/// A query answer that may have been served by a fallback, or not at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradable<T> {
    /// The answer (empty/default when the backend was unavailable and nothing could stand in).
    pub value: T,
    /// Why the live backend did not answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Whether `value` came from the primary store instead of the requested backend.
    pub fallback: bool,
}

impl<T> Degradable<T> {
    /// Answered by the requested backend.
    pub fn live(value: T) -> Self {
        Self {
            value,
            warning: None,
            fallback: false,
        }
    }

    /// Answered by the primary store on behalf of an unavailable backend.
    pub fn fallback(value: T, warning: Option<String>) -> Self {
        Self {
            value,
            warning,
            fallback: true,
        }
    }

    /// Not answered; `value` is a placeholder.
    pub fn unavailable(value: T, warning: String) -> Self {
        Self {
            value,
            warning: Some(warning),
            fallback: false,
        }
    }
}

/// Reachability of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Reachable.
    Healthy,
    /// Configured but not reachable.
    Unhealthy,
    /// Not wired into this service.
    NotConfigured,
}

/// Answer of a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Backend probed.
    pub backend: BackendKind,
    /// Probe result.
    pub status: HealthStatus,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Answer of [`super::Ingestor::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Primary id of the analyzed file.
    pub file_id: i64,
    /// Analysis that was run.
    pub analysis_type: AnalysisKind,
    /// Its output.
    pub results: Analysis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_primary_failures_are_fatal() {
        let err = || {
            Err(StoreError::Unavailable {
                backend: BackendKind::Search,
                reason: "connection refused".to_string(),
            })
        };
        assert!(matches!(
            BackendOutcome::classify(BackendKind::Search, err()),
            BackendOutcome::Degraded(w) if w.contains("connection refused")
        ));
        assert!(matches!(BackendOutcome::classify(BackendKind::Primary, err()), BackendOutcome::Fatal(_)));
        assert!(matches!(
            BackendOutcome::classify(BackendKind::Primary, Ok(BackendId::Int(3))),
            BackendOutcome::Stored(BackendId::Int(3))
        ));
    }

    #[test]
    fn write_status_serializes_tagged() {
        let write = BackendWrite {
            backend: BackendKind::Document,
            source: BackendKind::Document,
            status: WriteStatus::Degraded {
                warning: "down".to_string(),
            },
        };
        let json = serde_json::to_value(&write).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["warning"], "down");
        assert_eq!(json["backend"], "document");
    }

    #[test]
    fn health_status_is_snake_case() {
        let json = serde_json::to_value(HealthStatus::NotConfigured).unwrap();
        assert_eq!(json, "not_configured");
    }
}
