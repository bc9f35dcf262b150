//! Error types for importing and exporting booking data.

use thiserror::Error;

/// Fatal import failure. No records are loaded when one of these occurs.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unable to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("input is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("input is empty, expected a header row")]
    EmptyInput,

    #[error("header is not ';'-delimited (found a single column: {0:?})")]
    WrongDelimiter(String),

    #[error("required columns missing from header: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single row that could not be decoded. The row is skipped, the batch
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}: {}{reason}", field_prefix(.field))]
pub struct RowParseError {
    /// 1-based index of the data row (the header is not counted).
    pub row: usize,
    /// Canonical field name, when the failure is tied to one column.
    pub field: Option<&'static str>,
    pub reason: String,
}

fn field_prefix(field: &Option<&'static str>) -> String {
    field.map(|f| format!("{f}: ")).unwrap_or_default()
}

impl RowParseError {
    pub fn new(row: usize, field: Option<&'static str>, reason: impl Into<String>) -> Self {
        Self {
            row,
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl From<printpdf::Error> for ExportError {
    fn from(err: printpdf::Error) -> Self {
        ExportError::Pdf(format!("{err:?}"))
    }
}
