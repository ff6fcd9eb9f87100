//! Unified detection entrypoint.
//!
//! Most callers should use [`detect`], which dispatches on the declared file extension and
//! parses the uploaded bytes into an in-memory [`crate::types::DataSet`].
//!
//! - The extension must be one of [`FileType::ALLOWED_EXTENSIONS`]; anything else fails with
//!   [`IngestionError::UnsupportedFormat`] before any parsing happens.
//! - Detection never returns a partial structure: either the whole input parses or an
//!   [`IngestionError::Format`] describes why it did not.

use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, FileType};

use super::{csv, json};

/// Detect the format of `bytes` from `extension` and parse them.
///
/// `extension` may be given with or without its leading dot, in any case.
///
/// # Examples
///
/// ```rust
/// use file_analytics::ingestion::detect;
/// use file_analytics::types::FileType;
///
/// # fn main() -> Result<(), file_analytics::IngestionError> {
/// let (file_type, ds) = detect(b"id,name\n1,Ada\n2,Grace\n", ".csv")?;
/// assert_eq!(file_type, FileType::Csv);
/// assert_eq!(ds.row_count(), 2);
/// # Ok(())
/// # }
/// ```
///
/// Extensions outside the allow-list are rejected without looking at the bytes:
///
/// ```rust
/// use file_analytics::ingestion::detect;
/// use file_analytics::IngestionError;
///
/// let err = detect(b"PAR1", ".parquet").unwrap_err();
/// assert!(matches!(err, IngestionError::UnsupportedFormat { .. }));
/// ```
pub fn detect(bytes: &[u8], extension: &str) -> IngestionResult<(FileType, DataSet)> {
    let file_type = resolve_file_type(extension)?;
    let ds = match file_type {
        FileType::Csv => csv::detect_csv(bytes)?,
        FileType::Json => json::detect_json(bytes)?,
        FileType::Excel => detect_excel_dispatch(bytes)?,
    };
    Ok((file_type, ds))
}

/// Read a file from disk and [`detect`] it using the path's extension.
pub fn detect_path(path: impl AsRef<Path>) -> IngestionResult<(FileType, DataSet)> {
    let path = path.as_ref();
    let extension = extension_of(path);
    // Reject before touching the disk.
    resolve_file_type(&extension)?;
    let bytes = std::fs::read(path)?;
    detect(&bytes, &extension)
}

/// Map a declared extension to a [`FileType`], or fail with `UnsupportedFormat`.
pub fn resolve_file_type(extension: &str) -> IngestionResult<FileType> {
    FileType::from_extension(extension).ok_or_else(|| IngestionError::UnsupportedFormat {
        extension: extension.to_string(),
    })
}

/// Lowercased extension of `filename` including the leading dot (`""` if it has none).
pub fn extension_of(filename: impl AsRef<Path>) -> String {
    filename
        .as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn detect_excel_dispatch(bytes: &[u8]) -> IngestionResult<DataSet> {
    #[cfg(feature = "excel")]
    {
        super::excel::detect_excel(bytes)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = bytes;
        Err(IngestionError::format(
            FileType::Excel,
            "excel ingestion not enabled (enable cargo feature 'excel')",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_of_lowercases_and_keeps_dot() {
        assert_eq!(extension_of("Report.XLSX"), ".xlsx");
        assert_eq!(extension_of("dir/data.csv"), ".csv");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn unsupported_extension_is_rejected_before_parsing() {
        let err = detect(b"not,even,checked", ".txt").unwrap_err();
        match err {
            IngestionError::UnsupportedFormat { extension } => assert_eq!(extension, ".txt"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_with_supported_extension_is_io() {
        let err = detect_path("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, IngestionError::Io(_)));
    }
}
