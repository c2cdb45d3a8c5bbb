use crate::source::BlobSource;
use crate::source::SourceError;
use std::collections::BTreeMap;

/// Files held in memory, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.files.insert(name.to_owned(), bytes.into());
    }

    pub fn with(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl BlobSource for MemorySource {
    fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        self.files
            .get(locator)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(locator.to_owned()))
    }

    fn list(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.files.keys().cloned().collect())
    }
}
