use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{IngestionError, ServiceError};
use crate::storage::BackendKind;
use crate::types::FileType;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal, e.g. an optional backend degraded).
    Warning,
    /// Error-level event (the upload was rejected).
    Error,
    /// Critical error (I/O or primary store failure).
    Critical,
}

impl IngestionSeverity {
    /// Severity of an upload failure.
    pub fn for_error(error: &ServiceError) -> Self {
        match error {
            ServiceError::Ingestion(IngestionError::Io(_)) | ServiceError::PrimaryStore(_) | ServiceError::Io(_) => {
                Self::Critical
            }
            ServiceError::Ingestion(_) | ServiceError::NotFound { .. } => Self::Error,
        }
    }
}

/// Context about an upload attempt.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// Client-supplied file name.
    pub filename: String,
    /// Detected file type, if the extension was accepted.
    pub file_type: Option<FileType>,
    /// Optional backends the upload was aimed at.
    pub targets: Vec<BackendKind>,
}

/// Minimal stats reported on a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of rows in the uploaded file.
    pub rows: usize,
    /// Wall time spent detecting, normalizing and persisting.
    pub elapsed: Duration,
}

/// Observer interface for upload outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when an upload succeeds (the primary store accepted it).
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when an upload fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &ServiceError) {}

    /// Called when an upload failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ServiceError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called when an optional backend could not take part in an upload.
    fn on_degraded(&self, _ctx: &IngestionContext, _backend: BackendKind, _warning: &str) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ServiceError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ServiceError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_degraded(&self, ctx: &IngestionContext, backend: BackendKind, warning: &str) {
        for o in &self.observers {
            o.on_degraded(ctx, backend, warning);
        }
    }
}

/// Emits upload events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            filename = %ctx.filename,
            file_type = ?ctx.file_type,
            rows = stats.rows,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "upload stored"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ServiceError) {
        tracing::warn!(
            filename = %ctx.filename,
            file_type = ?ctx.file_type,
            ?severity,
            error = %error,
            "upload failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &ServiceError) {
        tracing::error!(
            filename = %ctx.filename,
            file_type = ?ctx.file_type,
            ?severity,
            error = %error,
            "upload alert"
        );
    }

    fn on_degraded(&self, ctx: &IngestionContext, backend: BackendKind, warning: &str) {
        tracing::warn!(filename = %ctx.filename, %backend, warning, "backend degraded");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl IngestionObserver for Recorder {
        fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
            self.events.lock().unwrap().push(format!("ok {} {}", ctx.filename, stats.rows));
        }

        fn on_degraded(&self, _ctx: &IngestionContext, backend: BackendKind, _warning: &str) {
            self.events.lock().unwrap().push(format!("degraded {backend}"));
        }
    }

    #[test]
    fn composite_fans_out_to_every_observer() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let composite = CompositeObserver::new(vec![a.clone(), b.clone()]);
        let ctx = IngestionContext {
            filename: "x.csv".to_string(),
            file_type: Some(FileType::Csv),
            targets: vec![BackendKind::Document],
        };
        composite.on_success(&ctx, IngestionStats { rows: 3, elapsed: Duration::ZERO });
        composite.on_degraded(&ctx, BackendKind::Document, "down");

        for r in [&a, &b] {
            let events = r.events.lock().unwrap();
            assert_eq!(*events, vec!["ok x.csv 3".to_string(), "degraded document".to_string()]);
        }
    }

    #[test]
    fn primary_failures_are_critical() {
        let err = ServiceError::PrimaryStore(crate::error::StoreError::Unavailable {
            backend: BackendKind::Primary,
            reason: "locked".to_string(),
        });
        assert_eq!(IngestionSeverity::for_error(&err), IngestionSeverity::Critical);
        let err = ServiceError::Ingestion(IngestionError::Normalization { message: "x".to_string() });
        assert_eq!(IngestionSeverity::for_error(&err), IngestionSeverity::Error);
    }
}
