use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::error::ResultMessage;
use crate::helpers::xml::StartTagExt;
use crate::helpers::xml::TextSink;
use crate::helpers::xml::XmlReader;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::DateTimeValue;
use crate::spreadsheet::cell::Formula;
use crate::spreadsheet::sheet::Worksheet;
use crate::spreadsheet::Archive;
use crate::spreadsheet::FormatError;
use crate::spreadsheet::Workbook;
use quick_xml::events::Event;
use quick_xml::name::QName;
use regex::Captures;
use regex::Regex;
use std::io::BufRead;
use std::sync::LazyLock;
use tracing::warn;

const CONTENT_PATH: &str = "content.xml";
const MANIFEST_PATH: &str = "META-INF/manifest.xml";

const TABLE: QName = QName(b"table:table");
const TABLE_ROW: QName = QName(b"table:table-row");
const TABLE_CELL: QName = QName(b"table:table-cell");
/// Cells hidden under a merged range
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// Comments attached to a cell
const ANNOTATION: QName = QName(b"office:annotation");
const PARAGRAPH: QName = QName(b"text:p");
/// Run of spaces, `text:c` wide
const SPACES: QName = QName(b"text:s");
const TAB: QName = QName(b"text:tab");
const LINE_BREAK: QName = QName(b"text:line-break");
const FILE_ENTRY: QName = QName(b"manifest:file-entry");
const ENCRYPTION_DATA: QName = QName(b"manifest:encryption-data");

/// Bracketed OpenFormula references such as `[.A1]`, `[.A1:.B2]` or `[$Sheet2.C3]`.
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("Hardcode regex pattern"));

/// Parsing state of the `<table:table-cell>` element being read.
#[derive(Default)]
struct PendingCell {
    value: Option<CellValue>,
    is_string: bool,
    formula: Option<String>,
    columns_repeated: u32,
    text: String,
    paragraphs: usize,
    in_paragraph: bool,
}

/// Reads every table of an OpenDocument spreadsheet.
pub(super) fn read(name: &str, mut zip: Archive, budget: &mut MemoryBudget) -> Result<Workbook, RecordsError> {
    if is_password_protected(&mut zip)? {
        Err(FormatError::Unsupported {
            name: name.to_owned(),
            reason: "password protected workbook",
        })?
    }
    let mut reader = zip.xml_reader(CONTENT_PATH)?.ok_or_else(|| FormatError::MissingPart {
        name: name.to_owned(),
        part: CONTENT_PATH.to_owned(),
    })?;
    let mut workbook = Workbook::new(name, false);
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TABLE => {
            let sheet_name = event
                .attribute("table:name")?
                .map(|name| name.into_owned())
                .unwrap_or_else(|| format!("Sheet{}", workbook.worksheets.len() + 1));
            let sheet = read_table(&mut reader, &sheet_name, budget)
                .with_prefix(&format!("Read worksheet '{sheet_name}'"))?;
            workbook.worksheets.push(sheet);
        }
    });
    Ok(workbook)
}

/// Reads one `<table:table>` up to its end tag.
fn read_table<R: BufRead>(reader: &mut XmlReader<R>, name: &str, budget: &mut MemoryBudget) -> Result<Worksheet, RecordsError> {
    let mut sheet = Worksheet::new(name);
    let mut row = 1u32;
    let mut rows_repeated = 1u32;
    let mut column = 1u32;
    let mut cell = PendingCell::default();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == TABLE => break,
        Event::Start(event) if event.name() == TABLE_ROW => {
            rows_repeated = event.parse_attribute("table:number-rows-repeated")?.unwrap_or(1);
            column = 1;
        }
        Event::End(event) if event.name() == TABLE_ROW => row = row.saturating_add(rows_repeated),
        Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
            cell = PendingCell {
                columns_repeated: event.parse_attribute("table:number-columns-repeated")?.unwrap_or(1),
                formula: event.attribute("table:formula")?.map(|formula| normalize_formula(&formula)),
                ..Default::default()
            };
            let is_error = event.attribute("calcext:value-type")?.is_some_and(|kind| kind == "error");
            if let Some(value_type) = event.attribute("office:value-type")? {
                match value_type.as_ref() {
                    _ if is_error => cell.is_string = true,
                    "string" => {
                        cell.is_string = true;
                        cell.value = event.attribute("office:string-value")?.map(|text| CellValue::Text(text.into_owned()));
                    }
                    "boolean" => {
                        let value = event.attribute("office:boolean-value")?;
                        cell.value = Some(CellValue::Boolean(value.is_some_and(|value| value != "false" && value != "0")));
                    }
                    "date" => {
                        let value = event.attribute("office:date-value")?;
                        cell.value = value.as_deref().and_then(DateTimeValue::from_iso).map(CellValue::DateTime);
                    }
                    "time" => {
                        let value = event.attribute("office:time-value")?;
                        cell.value = value.as_deref().and_then(DateTimeValue::from_iso_duration).map(CellValue::DateTime);
                    }
                    _ => {
                        let value = event.attribute("office:value")?;
                        cell.value = value.and_then(|value| value.trim().parse::<f64>().ok()).map(CellValue::Number);
                    }
                }
                if cell.value.is_none() && !cell.is_string {
                    warn!(worksheet = name, row, column, value_type = %value_type, "unreadable cell value, treated as empty");
                }
            }
        }
        Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
            let text = std::mem::take(&mut cell.text);
            let value = match cell.value.take() {
                Some(value) => value,
                None if cell.is_string => CellValue::Text(text.to_owned()),
                None => CellValue::Empty,
            };
            let display = Some(text).filter(|text| !cell.is_string && !text.is_empty());
            let value = match cell.formula.take() {
                Some(expression) => CellValue::Formula(Formula {
                    expression,
                    cached: Some(Box::new(value)).filter(|cached| !cached.is_empty()),
                }),
                None => value,
            };
            if !value.is_empty() {
                for row_offset in 0..rows_repeated {
                    for column_offset in 0..cell.columns_repeated {
                        let stored = Cell::new(row + row_offset, column + column_offset, value.clone())
                            .with_display(display.clone());
                        sheet.push(stored, budget)?;
                    }
                }
            }
            column = column.saturating_add(cell.columns_repeated);
        }
        Event::Start(event) if event.name() == ANNOTATION => reader.skip_to_end(ANNOTATION)?,
        Event::Start(event) if event.name() == PARAGRAPH => {
            if cell.paragraphs > 0 {
                cell.text.push('\n');
            }
            cell.paragraphs += 1;
            cell.in_paragraph = true;
        }
        Event::End(event) if event.name() == PARAGRAPH => cell.in_paragraph = false,
        Event::Start(event) if event.name() == SPACES => {
            let count = event.parse_attribute::<usize>("text:c")?.unwrap_or(1);
            cell.text.push_str(&" ".repeat(count));
        }
        Event::Start(event) if event.name() == TAB => cell.text.push('\t'),
        Event::Start(event) if event.name() == LINE_BREAK => cell.text.push('\n'),
        Event::Text(event) if cell.in_paragraph => cell.text.push_text(&event)?,
        Event::GeneralRef(event) if cell.in_paragraph => cell.text.push_reference(&event)?,
    });
    sheet.finish();
    Ok(sheet)
}

/// Rewrites an OpenFormula expression (`of:=SUM([.A1:.B2];1)`) into the A1
/// syntax the calculator reads (`SUM(A1:B2,1)`).
fn normalize_formula(formula: &str) -> String {
    let expression = match formula.split_once(":=") {
        Some((namespace, expression)) if !namespace.contains(['(', '"', '[']) => expression,
        _ => formula.strip_prefix('=').unwrap_or(formula),
    };
    let expression = REFERENCE.replace_all(expression, |captures: &Captures| {
        captures[1]
            .split(':')
            .map(normalize_reference)
            .collect::<Vec<_>>()
            .join(":")
    });
    let mut normalized = String::with_capacity(expression.len());
    let mut quoted = false;
    for character in expression.chars() {
        match character {
            '"' => {
                quoted = !quoted;
                normalized.push(character);
            }
            ';' if !quoted => normalized.push(','),
            _ => normalized.push(character),
        }
    }
    normalized
}

/// `.A1` → `A1`, `$Sheet2.$A$1` → `Sheet2!$A$1`, `'My sheet'.A1` → `'My sheet'!A1`.
fn normalize_reference(reference: &str) -> String {
    match reference.rsplit_once('.') {
        Some(("", cell)) => cell.to_owned(),
        Some((sheet, cell)) => format!("{}!{}", sheet.trim_start_matches('$'), cell),
        None => reference.to_owned(),
    }
}

/// Checks the manifest for encrypted entries.
fn is_password_protected(zip: &mut Archive) -> Result<bool, RecordsError> {
    let Some(mut reader) = zip.xml_reader(MANIFEST_PATH)? else {
        return Ok(false);
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == FILE_ENTRY => in_file_entry = true,
        Event::End(event) if event.name() == FILE_ENTRY => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == ENCRYPTION_DATA => return Ok(true),
    });
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::helpers::zip::tests::build_zip;
    use crate::spreadsheet::cell::TemporalKind;
    use std::io::Cursor;
    use zip::ZipArchive;

    const CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:calcext="urn:org:documentfoundation:names:experimental:calc:xmlns:calcext:1.0" office:version="1.2">
  <office:body>
    <office:spreadsheet>
      <table:table table:name="Worksheet">
        <table:table-column table:number-columns-repeated="3"/>
        <table:table-row>
          <table:table-cell office:value-type="string"><text:p>id</text:p></table:table-cell>
          <table:table-cell office:value-type="string"><text:p>prefix</text:p></table:table-cell>
          <table:table-cell office:value-type="string"><text:p>some_date</text:p></table:table-cell>
        </table:table-row>
        <table:table-row>
          <table:table-cell office:value-type="float" office:value="1"><text:p>1</text:p></table:table-cell>
          <table:table-cell office:value-type="string"><text:p>acme<text:s text:c="2"/>1554</text:p><office:annotation><text:p>note</text:p></office:annotation></table:table-cell>
          <table:table-cell office:value-type="date" office:date-value="2019-05-23T13:01:00"><text:p>05/23/2019 13:01</text:p></table:table-cell>
        </table:table-row>
        <table:table-row table:number-rows-repeated="2">
          <table:table-cell table:number-columns-repeated="2" office:value-type="percentage" office:value="0.25"><text:p>25%</text:p></table:table-cell>
          <table:table-cell office:value-type="boolean" office:boolean-value="true"><text:p>TRUE</text:p></table:table-cell>
        </table:table-row>
        <table:table-row table:number-rows-repeated="1048570">
          <table:table-cell table:number-columns-repeated="1024"/>
        </table:table-row>
      </table:table>
      <table:table table:name="Formulas">
        <table:table-row>
          <table:table-cell office:value-type="float" office:value="2"><text:p>2</text:p></table:table-cell>
          <table:table-cell table:formula="of:=SUM([.A1:.A1];[$Worksheet.A2])*2" office:value-type="float" office:value="6"><text:p>6</text:p></table:table-cell>
          <table:table-cell table:formula="of:=1/0" office:value-type="string" calcext:value-type="error"><text:p>#DIV/0!</text:p></table:table-cell>
          <table:table-cell office:value-type="time" office:time-value="PT13H01M00S"><text:p>13:01:00</text:p></table:table-cell>
        </table:table-row>
      </table:table>
    </office:spreadsheet>
  </office:body>
</office:document-content>"#;

    fn workbook() -> Workbook {
        let bytes = build_zip(&[
            ("mimetype", "application/vnd.oasis.opendocument.spreadsheet"),
            ("content.xml", CONTENT),
        ]);
        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        read("book.ods", zip, &mut MemoryBudget::unlimited()).unwrap()
    }

    #[test]
    fn tables_and_values() {
        let workbook = workbook();
        assert_eq!(workbook.names(), vec!["Worksheet", "Formulas"]);
        let sheet = &workbook.worksheets[workbook.worksheet_index("Worksheet").unwrap()];
        assert_eq!(sheet.highest_row(), 4);
        assert_eq!(sheet.highest_column(), 3);
        assert_eq!(sheet.value(1, 3), &CellValue::Text("some_date".to_owned()));
        assert_eq!(sheet.value(2, 1), &CellValue::Number(1.0));
        assert_eq!(sheet.value(2, 2), &CellValue::Text("acme  1554".to_owned()));
        match sheet.value(2, 3) {
            CellValue::DateTime(value) => assert_eq!(value.to_string(), "2019-05-23 13:01:00"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sheet.value(4, 2), &CellValue::Number(0.25));
        assert_eq!(sheet.value(4, 3), &CellValue::Boolean(true));
    }

    #[test]
    fn display_text_is_kept() {
        let workbook = workbook();
        let sheet = &workbook.worksheets[workbook.worksheet_index("Worksheet").unwrap()];
        assert_eq!(sheet.get(2, 3).unwrap().formatted(false), "05/23/2019 13:01");
        assert_eq!(sheet.get(3, 1).unwrap().formatted(false), "25%");
        assert_eq!(sheet.get(1, 1).unwrap().display, None);
    }

    #[test]
    fn formulas_and_errors() {
        let workbook = workbook();
        let sheet = &workbook.worksheets[workbook.worksheet_index("Formulas").unwrap()];
        match sheet.value(1, 2) {
            CellValue::Formula(formula) => {
                assert_eq!(formula.expression, "SUM(A1:A1,Worksheet!A2)*2");
                assert_eq!(formula.cached.as_deref(), Some(&CellValue::Number(6.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match sheet.value(1, 3) {
            CellValue::Formula(formula) => {
                assert_eq!(formula.expression, "1/0");
                assert_eq!(formula.cached.as_deref(), Some(&CellValue::Text("#DIV/0!".to_owned())));
            }
            other => panic!("unexpected {other:?}"),
        }
        match sheet.value(1, 4) {
            CellValue::DateTime(value) => {
                assert_eq!(value.kind, TemporalKind::Time);
                assert_eq!(value.to_string(), "13:01:00");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn normalize_formulas() {
        assert_eq!(normalize_formula("of:=[.A1]+[.B2]"), "A1+B2");
        assert_eq!(normalize_formula("of:=IF([.A1]>0;\"a;b\";[.$C$3])"), "IF(A1>0,\"a;b\",$C$3)");
        assert_eq!(normalize_formula("of:=SUM(['My sheet'.A1:.A3])"), "SUM('My sheet'!A1:A3)");
        assert_eq!(normalize_formula("=A1*2"), "A1*2");
    }

    #[test]
    fn encrypted_documents_are_rejected() {
        let manifest = r#"<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
  <manifest:file-entry manifest:full-path="content.xml"><manifest:encryption-data/></manifest:file-entry>
</manifest:manifest>"#;
        let bytes = build_zip(&[("content.xml", CONTENT), ("META-INF/manifest.xml", manifest)]);
        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let error = read("secret.ods", zip, &mut MemoryBudget::unlimited()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);
    }
}
