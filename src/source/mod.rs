//! # Source Module
//!
//! Where spreadsheet bytes come from. The extraction core only ever sees a
//! byte buffer; a [`BlobSource`] turns a locator into that buffer.
mod fs;
mod memory;

use crate::error::ErrorKind;
pub use fs::FileSystemSource;
pub use memory::MemorySource;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Spreadsheet '{0}' not found.")]
    NotFound(String),

    #[error("Unsupported locator scheme '{scheme}' in '{locator}'")]
    UnsupportedScheme { scheme: String, locator: String },

    #[error("Read '{locator}' failed: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    GlobError(#[from] glob::GlobError),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::NotFound(_) => ErrorKind::NotFound,
            SourceError::UnsupportedScheme { .. } => ErrorKind::Format,
            SourceError::Io { source, .. } if source.kind() == std::io::ErrorKind::OutOfMemory => {
                ErrorKind::ResourceExhausted
            }
            SourceError::Io { .. } | SourceError::PatternError(_) | SourceError::GlobError(_) => ErrorKind::Internal,
        }
    }
}

/// A store of spreadsheet files addressed by name.
pub trait BlobSource {
    /// Returns the whole content of the file at `locator`.
    fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, SourceError>;

    /// Returns the names of the available files, sorted.
    fn list(&self) -> Result<Vec<String>, SourceError>;
}

impl<S: BlobSource + ?Sized> BlobSource for &S {
    fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        (**self).fetch_bytes(locator)
    }

    fn list(&self) -> Result<Vec<String>, SourceError> {
        (**self).list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(SourceError::NotFound("a.csv".to_owned()).kind(), ErrorKind::NotFound);
        let error = SourceError::UnsupportedScheme {
            scheme: "s3".to_owned(),
            locator: "s3://bucket/a.csv".to_owned(),
        };
        assert_eq!(error.kind(), ErrorKind::Format);
        assert_eq!(error.to_string(), "Unsupported locator scheme 's3' in 's3://bucket/a.csv'");
    }
}
