use thiserror::Error;

/// Coarse classification of failures, used by callers that need to map an
/// error onto a transport status (HTTP, process exit code, ...).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A requested spreadsheet or worksheet does not exist.
    NotFound,
    /// The input could not be read as a supported workbook.
    Format,
    /// The configured memory budget was exceeded.
    ResourceExhausted,
    /// Anything else (I/O failures, invalid patterns, ...).
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code for this kind of failure.
    pub const fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Format => 400,
            ErrorKind::ResourceExhausted | ErrorKind::Internal => 500,
        }
    }
}

/// Main error type for the crate.
/// Aggregates errors from the standard library, dependencies and internal modules.
#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("{message}")]
    WithContextError { message: String, kind: ErrorKind },

    #[error("Worksheet '{worksheet}' does not exist in '{workbook}'.")]
    WorksheetNotFound { worksheet: String, workbook: String },

    #[error("Spreadsheet '{0}' not found.")]
    SpreadsheetNotFound(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Crate module errors
    #[error("{0}")]
    FormatError(#[from] crate::spreadsheet::FormatError),

    #[error("{0}")]
    SourceError(#[from] crate::source::SourceError),

    #[error("{0}")]
    ResourceExhausted(#[from] crate::budget::BudgetError),

    #[error("{0}")]
    EvalError(#[from] crate::formula::EvalError),
}

impl RecordsError {
    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordsError::WithContextError { kind, .. } => *kind,
            RecordsError::WorksheetNotFound { .. } | RecordsError::SpreadsheetNotFound(_) => ErrorKind::NotFound,
            RecordsError::SourceError(error) => error.kind(),
            RecordsError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            RecordsError::IoError(error) if error.kind() == std::io::ErrorKind::OutOfMemory => ErrorKind::ResourceExhausted,
            RecordsError::IoError(_) | RecordsError::EvalError(_) => ErrorKind::Internal,
            RecordsError::ParseIntError(_)
            | RecordsError::ParseFloatError(_)
            | RecordsError::StringEncodingError(_)
            | RecordsError::ZipError(_)
            | RecordsError::XmlError(_)
            | RecordsError::XmlEncodingError(_)
            | RecordsError::XmlAttributeError(_)
            | RecordsError::CsvError(_)
            | RecordsError::XmlHelperError(_)
            | RecordsError::FormatError(_) => ErrorKind::Format,
        }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, RecordsError> {
    /// Prefixes the error message while keeping its classification.
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| RecordsError::WithContextError {
            kind: e.kind(),
            message: format!("{}: {}", message, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worksheet_not_found_message() {
        let error = RecordsError::WorksheetNotFound {
            worksheet: "Missing".to_owned(),
            workbook: "book.xlsx".to_owned(),
        };
        assert_eq!(error.to_string(), "Worksheet 'Missing' does not exist in 'book.xlsx'.");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.status_code(), 404);
    }

    #[test]
    fn prefix_keeps_kind() {
        let result: Result<(), RecordsError> = Err(RecordsError::SpreadsheetNotFound("a.csv".to_owned()));
        let error = result.with_prefix("Open spreadsheet").unwrap_err();
        assert_eq!(error.to_string(), "Open spreadsheet: Spreadsheet 'a.csv' not found.");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
