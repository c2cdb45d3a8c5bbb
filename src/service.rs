//! # Service Module
//!
//! The operations callers see: list spreadsheets, list worksheets, and get
//! the records of every worksheet or of one. Each call fetches and parses
//! the workbook afresh; nothing is cached between calls.
use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::error::ResultMessage;
use crate::extract::extract_all;
use crate::extract::extract_one;
use crate::extract::list_worksheets;
use crate::extract::ExtractionConfig;
use crate::extract::Params;
use crate::source::BlobSource;
use crate::source::FileSystemSource;
use crate::source::SourceError;
use crate::spreadsheet::parse_workbook;
use crate::spreadsheet::Workbook;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;

/// Where the service finds its spreadsheets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Directory all locators are resolved against
    pub root: PathBuf,
    /// Storage container inside the root
    pub container: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            container: "/".to_owned(),
        }
    }
}

impl ServiceConfig {
    pub fn source(&self) -> FileSystemSource {
        FileSystemSource::new(&self.root).with_container(&self.container)
    }
}

pub struct SpreadsheetService<S> {
    source: S,
}

impl SpreadsheetService<FileSystemSource> {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.source())
    }
}

impl<S: BlobSource> SpreadsheetService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn list_spreadsheets(&self) -> Result<Vec<String>, RecordsError> {
        info!("listing spreadsheets");
        self.source
            .list()
            .map_err(RecordsError::from)
            .with_prefix("List spreadsheets failed")
    }

    /// Fetches and parses a spreadsheet, charging parsed cells to `budget`.
    pub fn open(&self, name: &str, budget: &mut MemoryBudget) -> Result<Workbook, RecordsError> {
        let bytes = self.source.fetch_bytes(name).map_err(|error| match error {
            SourceError::NotFound(name) => RecordsError::SpreadsheetNotFound(name),
            error => error.into(),
        })?;
        debug!(spreadsheet = name, size = bytes.len(), "fetched spreadsheet");
        parse_workbook(name, bytes, budget)
    }

    pub fn list_worksheets(&self, name: &str) -> Result<Vec<String>, RecordsError> {
        info!(spreadsheet = name, "listing worksheets");
        let workbook = self.open(name, &mut MemoryBudget::unlimited())?;
        Ok(list_worksheets(&workbook))
    }

    /// Records of every worksheet as a JSON object keyed by worksheet name.
    pub fn get_all(&self, name: &str, params: &Params) -> Result<Value, RecordsError> {
        let config = ExtractionConfig::from_params(params);
        info!(spreadsheet = name, ?config, "extracting all worksheets");
        let mut budget = config.budget();
        let workbook = self.open(name, &mut budget)?;
        let records = extract_all(&workbook, &config, &mut budget)?;
        debug!(spreadsheet = name, memory = budget.used(), "extracted all worksheets");
        Ok(records.to_json())
    }

    /// Records of one worksheet as a JSON array.
    pub fn get_one(&self, name: &str, worksheet: &str, params: &Params) -> Result<Value, RecordsError> {
        let config = ExtractionConfig::from_params(params);
        info!(spreadsheet = name, worksheet, ?config, "extracting worksheet");
        let mut budget = config.budget();
        let workbook = self.open(name, &mut budget)?;
        let records = extract_one(&workbook, worksheet, &config, &mut budget)?;
        debug!(spreadsheet = name, worksheet, memory = budget.used(), "extracted worksheet");
        Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::MemorySource;
    use serde_json::json;

    fn service() -> SpreadsheetService<MemorySource> {
        SpreadsheetService::new(
            MemorySource::new()
                .with("people.csv", "name,age\nann,31\nbob,\n")
                .with("empty.csv", ""),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn list_operations() {
        let service = service();
        assert_eq!(service.list_spreadsheets().unwrap(), vec!["empty.csv", "people.csv"]);
        assert_eq!(service.list_worksheets("people.csv").unwrap(), vec!["Worksheet"]);
    }

    #[test]
    fn get_all_and_get_one() {
        let service = service();
        let raw = params(&[("formatted_values", "false")]);
        assert_eq!(
            service.get_all("people.csv", &raw).unwrap(),
            json!({"Worksheet": [{"name": "ann", "age": 31}, {"name": "bob", "age": null}]})
        );
        assert_eq!(
            service.get_one("people.csv", "Worksheet", &Params::new()).unwrap(),
            json!([{"name": "ann", "age": "31"}, {"name": "bob", "age": ""}])
        );
    }

    #[test]
    fn not_found_errors() {
        let service = service();
        let error = service.get_all("missing.csv", &Params::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.to_string(), "Spreadsheet 'missing.csv' not found.");

        let error = service.get_one("people.csv", "Sheet1", &Params::new()).unwrap_err();
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.to_string(), "Worksheet 'Sheet1' does not exist in 'people.csv'.");
    }

    #[test]
    fn deeply_nested_formulas_resolve_to_null() {
        let csv = format!(
            "nested,negated,total\n={}1{},={}1,=1+2\n",
            "(".repeat(50_000),
            ")".repeat(50_000),
            "-".repeat(5_000)
        );
        let service = SpreadsheetService::new(MemorySource::new().with("deep.csv", csv));
        let raw = params(&[("formatted_values", "false"), ("calculate_formulas", "true")]);
        assert_eq!(
            service.get_one("deep.csv", "Worksheet", &raw).unwrap(),
            json!([{"nested": null, "negated": null, "total": 3}])
        );
    }

    #[test]
    fn format_and_budget_errors() {
        let service = service();
        let error = service.get_all("empty.csv", &Params::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);

        let error = service
            .get_all("people.csv", &params(&[("memory_limit", "64")]))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(error.status_code(), 500);
    }
}
