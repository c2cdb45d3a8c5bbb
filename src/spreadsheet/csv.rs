//! Delimited text (.csv, .tsv) as a single-worksheet workbook.
use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::Formula;
use crate::spreadsheet::sheet::Worksheet;
use crate::spreadsheet::Workbook;
use encoding_rs::Encoding;
use encoding_rs::WINDOWS_1252;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::debug;

/// Name of the only worksheet of a delimited file.
pub(crate) const WORKSHEET_NAME: &str = "Worksheet";

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\d*\.?\d+)([Ee][+-]?\d{1,3})?$").expect("Hardcode regex pattern")
});

/// Decodes the bytes: BOM first, then UTF-8, then Windows-1252.
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        return text;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("delimited text is not UTF-8, decoding as Windows-1252");
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text
        }
    }
}

/// Types a field the way a spreadsheet application would on import:
/// numbers, `TRUE`/`FALSE`, `=` formulas, text otherwise. Numbers with
/// leading zeros stay text so identifiers like `007` keep their digits.
fn to_value(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Empty;
    }
    if let Some(expression) = field.strip_prefix('=').filter(|expression| !expression.is_empty()) {
        return CellValue::Formula(Formula {
            expression: expression.to_owned(),
            cached: None,
        });
    }
    if field.eq_ignore_ascii_case("true") {
        return CellValue::Boolean(true);
    }
    if field.eq_ignore_ascii_case("false") {
        return CellValue::Boolean(false);
    }
    if NUMERIC.is_match(field) {
        let unsigned = field.trim_start_matches(['+', '-']);
        let leading_zero = unsigned.len() > 1 && unsigned.starts_with('0') && !unsigned[1..].starts_with(['.', 'e', 'E']);
        if !leading_zero {
            if let Ok(number) = field.parse::<f64>() {
                if number.is_finite() {
                    return CellValue::Number(number);
                }
            }
        }
    }
    CellValue::Text(field.to_owned())
}

pub(super) fn read(name: &str, bytes: &[u8], delimiter: u8, budget: &mut MemoryBudget) -> Result<Workbook, RecordsError> {
    let text = decode(bytes);
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());

    let mut sheet = Worksheet::new(WORKSHEET_NAME);
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index as u32 + 1;
        for (offset, field) in record.iter().enumerate() {
            let value = to_value(field);
            if !value.is_empty() {
                sheet.push(Cell::new(row, offset as u32 + 1, value), budget)?;
            }
        }
    }
    sheet.finish();

    let mut workbook = Workbook::new(name, false);
    workbook.worksheets.push(sheet);
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_types() {
        assert_eq!(to_value("1"), CellValue::Number(1.0));
        assert_eq!(to_value("-2.5"), CellValue::Number(-2.5));
        assert_eq!(to_value("1e3"), CellValue::Number(1000.0));
        assert_eq!(to_value("0.5"), CellValue::Number(0.5));
        assert_eq!(to_value("007"), CellValue::Text("007".to_owned()));
        assert_eq!(to_value("TRUE"), CellValue::Boolean(true));
        assert_eq!(to_value("false"), CellValue::Boolean(false));
        assert_eq!(to_value("5/23/2019 13:01"), CellValue::Text("5/23/2019 13:01".to_owned()));
        assert_eq!(to_value("1,000"), CellValue::Text("1,000".to_owned()));
        assert_eq!(to_value("="), CellValue::Text("=".to_owned()));
        assert_eq!(
            to_value("=A1+1"),
            CellValue::Formula(Formula {
                expression: "A1+1".to_owned(),
                cached: None
            })
        );
        assert!(to_value("").is_empty());
    }

    #[test]
    fn read_rows() {
        let bytes = b"id,prefix\n1,acme1554\n\n3,\"quoted, text\",extra\n";
        let workbook = read("a.csv", bytes, b',', &mut MemoryBudget::unlimited()).unwrap();
        assert_eq!(workbook.names(), vec![WORKSHEET_NAME]);
        let sheet = &workbook.worksheets[0];
        assert_eq!(sheet.highest_row(), 3);
        assert_eq!(sheet.highest_column(), 3);
        assert_eq!(sheet.value(1, 2), &CellValue::Text("prefix".to_owned()));
        assert_eq!(sheet.value(2, 1), &CellValue::Number(1.0));
        assert_eq!(sheet.value(3, 2), &CellValue::Text("quoted, text".to_owned()));
        assert_eq!(sheet.value(3, 3), &CellValue::Text("extra".to_owned()));
    }

    #[test]
    fn tab_delimited_with_bom() {
        let bytes = "\u{feff}a\tb\n1\t2\n".as_bytes();
        let workbook = read("a.tsv", bytes, b'\t', &mut MemoryBudget::unlimited()).unwrap();
        let sheet = &workbook.worksheets[0];
        assert_eq!(sheet.value(1, 1), &CellValue::Text("a".to_owned()));
        assert_eq!(sheet.value(2, 2), &CellValue::Number(2.0));
    }

    #[test]
    fn windows_1252_fallback() {
        let bytes = b"caf\xe9\n";
        let workbook = read("a.csv", bytes, b',', &mut MemoryBudget::unlimited()).unwrap();
        assert_eq!(workbook.worksheets[0].value(1, 1), &CellValue::Text("café".to_owned()));
    }
}
