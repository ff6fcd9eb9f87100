//! Prometheus upload metrics.
//!
//! [`UploadMetrics`] is an [`IngestionObserver`]; attach it to an
//! [`crate::service::Ingestor`] and expose [`UploadMetrics::render`] on whatever endpoint the
//! outer layer scrapes.
//!
//! | Name | Type | Meaning |
//! |------|------|---------|
//! | `file_uploads_total` | counter | successful uploads |
//! | `upload_time_seconds` | histogram | time to detect, normalize and persist an upload |
//! | `errors_total` | counter | failed uploads |

use std::fmt;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

use crate::error::ServiceError;
use crate::ingestion::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};

/// Histogram buckets for `upload_time_seconds`.
pub const UPLOAD_TIME_BUCKETS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

/// Upload counters and timings, registered in their own registry.
#[derive(Clone)]
pub struct UploadMetrics {
    registry: Registry,
    uploads_total: IntCounter,
    upload_time: Histogram,
    errors_total: IntCounter,
}

impl UploadMetrics {
    /// Create and register the metrics in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create and register the metrics in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric with the same name is already registered.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let uploads_total = IntCounter::new("file_uploads_total", "Total files uploaded")?;
        let upload_time = Histogram::with_opts(
            HistogramOpts::new("upload_time_seconds", "Time to upload and process files")
                .buckets(UPLOAD_TIME_BUCKETS.to_vec()),
        )?;
        let errors_total = IntCounter::new("errors_total", "Total errors while handling requests")?;

        registry.register(Box::new(uploads_total.clone()))?;
        registry.register(Box::new(upload_time.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        Ok(Self {
            registry,
            uploads_total,
            upload_time,
            errors_total,
        })
    }

    /// The registry the metrics live in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Successful uploads so far.
    pub fn uploads(&self) -> u64 {
        self.uploads_total.get()
    }

    /// Failed uploads so far.
    pub fn errors(&self) -> u64 {
        self.errors_total.get()
    }

    /// Prometheus text exposition of every metric in the registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl fmt::Debug for UploadMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadMetrics")
            .field("uploads", &self.uploads())
            .field("errors", &self.errors())
            .finish()
    }
}

impl IngestionObserver for UploadMetrics {
    fn on_success(&self, _ctx: &IngestionContext, stats: IngestionStats) {
        self.uploads_total.inc();
        self.upload_time.observe(stats.elapsed.as_secs_f64());
    }

    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &ServiceError) {
        self.errors_total.inc();
    }

    // Failures are already counted in `on_failure`.
    fn on_alert(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &ServiceError) {}
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::IngestionError;

    fn ctx() -> IngestionContext {
        IngestionContext {
            filename: "a.csv".to_string(),
            file_type: None,
            targets: Vec::new(),
        }
    }

    #[test]
    fn success_counts_and_times_the_upload() {
        let metrics = UploadMetrics::new().unwrap();
        metrics.on_success(&ctx(), IngestionStats { rows: 10, elapsed: Duration::from_millis(300) });
        assert_eq!(metrics.uploads(), 1);
        assert_eq!(metrics.upload_time.get_sample_count(), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("file_uploads_total 1"));
        assert!(text.contains("upload_time_seconds_bucket{le=\"0.5\"} 1"));
        assert!(text.contains("upload_time_seconds_bucket{le=\"0.1\"} 0"));
    }

    #[test]
    fn alerts_are_not_double_counted() {
        let metrics = UploadMetrics::new().unwrap();
        let err = ServiceError::Ingestion(IngestionError::UnsupportedFormat { extension: ".txt".to_string() });
        metrics.on_failure(&ctx(), IngestionSeverity::Error, &err);
        metrics.on_alert(&ctx(), IngestionSeverity::Error, &err);
        assert_eq!(metrics.errors(), 1);
    }

    #[test]
    fn registering_twice_in_one_registry_fails() {
        let registry = Registry::new();
        UploadMetrics::with_registry(registry.clone()).unwrap();
        assert!(UploadMetrics::with_registry(registry).is_err());
    }
}
