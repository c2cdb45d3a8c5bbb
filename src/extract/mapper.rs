use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::extract::config::ExtractionConfig;
use crate::extract::resolve::ValueResolver;
use crate::extract::Record;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MapperState {
    /// Row 1 has not been seen yet and will supply the field names
    AwaitingHeader,
    MappingRows,
}

/// Header text of a resolved value.
fn header_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.to_owned(),
        Value::Bool(true) => "TRUE".to_owned(),
        Value::Bool(false) => "FALSE".to_owned(),
        value => value.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Maps one worksheet to its records.
pub struct RecordMapper<'r, 'a> {
    resolver: &'r ValueResolver<'a>,
    config: &'r ExtractionConfig,
    state: MapperState,
    /// Field names by column index
    headers: HashMap<u32, String>,
}

impl<'r, 'a> RecordMapper<'r, 'a> {
    pub fn new(resolver: &'r ValueResolver<'a>, config: &'r ExtractionConfig) -> Self {
        Self {
            resolver,
            config,
            state: if config.first_row_headers {
                MapperState::AwaitingHeader
            } else {
                MapperState::MappingRows
            },
            headers: HashMap::new(),
        }
    }

    /// Walks the worksheet at `sheet` row by row. A later column whose key
    /// repeats an earlier one overwrites the value but not the key position.
    pub fn map(mut self, sheet: usize, budget: &mut MemoryBudget) -> Result<Vec<Record>, RecordsError> {
        let worksheet = &self.resolver.workbook().worksheets[sheet];
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in worksheet.rows(self.config.cell_iteration()) {
            let mut values = Vec::new();
            for position in row.cells() {
                values.push((position.column, self.resolver.resolve(sheet, &position, budget)?));
            }

            if self.state == MapperState::AwaitingHeader {
                self.state = MapperState::MappingRows;
                if row.index == 1 {
                    self.headers = values
                        .iter()
                        .map(|(column, value)| (*column, header_text(value)))
                        .collect();
                    continue;
                }
            }

            if self.config.skip_empty_rows && values.iter().all(|(_, value)| is_blank(value)) {
                skipped += 1;
                continue;
            }

            let mut record = Record::new();
            for (column, value) in values {
                let key = match self.headers.get(&column) {
                    Some(header) => header.to_owned(),
                    None => column.to_string(),
                };
                record.insert(key, value);
            }
            records.push(record);
        }
        debug!(
            worksheet = worksheet.name(),
            records = records.len(),
            skipped,
            headers = self.headers.len(),
            "mapped worksheet"
        );
        Ok(records)
    }
}
