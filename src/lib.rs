//! `file-analytics` turns uploaded tabular files into schema + statistics records and keeps
//! them across several storage backends.
//!
//! ## Pipeline
//!
//! 1. **Detect** ([`ingestion`]): CSV, Excel (`.xlsx`/`.xls`, Cargo feature `excel`) and JSON
//!    bytes are parsed into an in-memory [`types::DataSet`] whose schema is inferred from the
//!    values.
//! 2. **Normalize** ([`normalize`]): date/time values become plain text in one fixed format
//!    and the dataset is reduced to a [`types::CanonicalRecord`] (columns, a 100-row
//!    preview, the row count, and mean/min/max/std for numeric columns).
//! 3. **Persist** ([`storage`]): the record is written to the primary SQLite store and to
//!    any optional backend the upload targets (MongoDB, OpenSearch, PostgreSQL). Optional
//!    backends connect lazily and may be down without failing the upload.
//!
//! [`service::Ingestor`] drives all three steps and answers the read side (listing, search,
//! stats, health, [`analysis`]).
//!
//! ## Quick example
//!
//! ```rust
//! use file_analytics::ingestion::detect;
//! use file_analytics::normalize::normalize;
//! use file_analytics::types::FileType;
//!
//! # fn main() -> Result<(), file_analytics::IngestionError> {
//! let (file_type, ds) = detect(b"day,amount\n2024-01-05,10\n2024-01-06,12.5\n", ".csv")?;
//! assert_eq!(file_type, FileType::Csv);
//!
//! let record = normalize(&ds)?;
//! assert_eq!(record.columns, vec!["day", "amount"]);
//! assert_eq!(record.stats["amount"].max, 12.5);
//! assert!(!record.stats.contains_key("day"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: format detectors and upload observers
//! - [`normalize`]: temporal canonicalization and record extraction
//! - [`storage`]: the backend contract and its adapters
//! - [`service`]: the upload orchestrator
//! - [`analysis`]: summary and correlation reports over a stored preview
//! - [`config`]: layered service configuration
//! - [`metrics`]: Prometheus upload metrics
//! - [`types`], [`error`]: shared data model and error types

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod normalize;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{IngestionError, ServiceError, StoreError};
