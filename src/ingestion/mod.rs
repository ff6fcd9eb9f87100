//! Format detection entrypoints and implementations.
//!
//! Most callers should use [`detect`] (from [`unified`]) which:
//!
//! - checks the declared extension against the upload allow-list
//! - parses the bytes into an in-memory [`crate::types::DataSet`]
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]
//! - `excel` (Cargo feature `excel`, on by default)
//!
//! Upload outcomes are reported through [`IngestionObserver`]s by the
//! [`crate::service::Ingestor`].

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod json;
pub mod observability;
pub mod unified;

pub use observability::{
    CompositeObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, TracingObserver,
};
pub use unified::{detect, detect_path, extension_of, resolve_file_type};
