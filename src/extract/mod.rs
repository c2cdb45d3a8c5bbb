//! # Extract Module
//!
//! Turns a parsed [`Workbook`] into field-keyed records: one ordered JSON
//! object per data row, grouped by worksheet in declaration order.
pub mod config;
mod mapper;
mod resolve;

use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::spreadsheet::Workbook;
pub use config::parse_bool;
pub use config::ExtractionConfig;
pub use config::NamedParam;
pub use config::Params;
pub use mapper::RecordMapper;
pub use resolve::ValueResolver;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Value;

/// One data row: field name to value, in column order.
pub type Record = Map<String, Value>;

/// Records of every worksheet, in workbook declaration order. Serializes as
/// a JSON object keyed by worksheet name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkbookRecords {
    pub worksheets: Vec<(String, Vec<Record>)>,
}

impl WorkbookRecords {
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.worksheets
                .iter()
                .map(|(name, records)| {
                    let records = records.iter().cloned().map(Value::Object).collect();
                    (name.to_owned(), Value::Array(records))
                })
                .collect(),
        )
    }
}

impl Serialize for WorkbookRecords {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.worksheets.len()))?;
        for (name, records) in &self.worksheets {
            map.serialize_entry(name, records)?;
        }
        map.end()
    }
}

/// Worksheet names in declaration order.
pub fn list_worksheets(workbook: &Workbook) -> Vec<String> {
    workbook.names()
}

/// Records of every worksheet.
pub fn extract_all(
    workbook: &Workbook,
    config: &ExtractionConfig,
    budget: &mut MemoryBudget,
) -> Result<WorkbookRecords, RecordsError> {
    let resolver = ValueResolver::new(workbook, config);
    let mut records = WorkbookRecords::default();
    for (index, worksheet) in workbook.worksheets.iter().enumerate() {
        let rows = RecordMapper::new(&resolver, config).map(index, budget)?;
        records.worksheets.push((worksheet.name().to_owned(), rows));
    }
    Ok(records)
}

/// Records of the worksheet named exactly `name`.
pub fn extract_one(
    workbook: &Workbook,
    name: &str,
    config: &ExtractionConfig,
    budget: &mut MemoryBudget,
) -> Result<Vec<Record>, RecordsError> {
    let index = workbook.worksheet_index(name)?;
    let resolver = ValueResolver::new(workbook, config);
    RecordMapper::new(&resolver, config).map(index, budget)
}
