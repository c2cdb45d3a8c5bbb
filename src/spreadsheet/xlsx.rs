use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::error::ResultMessage;
use crate::formula::shift_formula;
use crate::helpers::xml::AttributeValue;
use crate::helpers::xml::StartTagExt;
use crate::helpers::xml::TextSink;
use crate::helpers::xml::XmlReader;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::DateTimeValue;
use crate::spreadsheet::cell::Formula;
use crate::spreadsheet::format::builtin_format_code;
use crate::spreadsheet::format::FormatKind;
use crate::spreadsheet::format::NumberFormat;
use crate::spreadsheet::reference::parse_reference;
use crate::spreadsheet::reference::to_reference;
use crate::spreadsheet::sheet::Worksheet;
use crate::spreadsheet::Archive;
use crate::spreadsheet::FormatError;
use crate::spreadsheet::Workbook;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use tracing::warn;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs"); // Cell formats, indexed by the `s` attribute
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh"); // Phonetic runs for East Asian text
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_FORMULA: QName = QName(b"f");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const RELATIONSHIPS_PATH: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PATH: &str = "xl/styles.xml";
const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

/// Number format per cell style index; `None` is General.
type StyleFormats = Vec<Option<Arc<NumberFormat>>>;

/// How the `<v>` text of a cell is interpreted, from its `t` attribute.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
enum ValueType {
    #[default]
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Boolean,
    Error,
    IsoDate,
}

impl ValueType {
    fn parse(value: &str) -> Self {
        match value {
            "s" => ValueType::SharedString,
            "inlineStr" => ValueType::InlineString,
            "str" => ValueType::FormulaString,
            "b" => ValueType::Boolean,
            "e" => ValueType::Error,
            "d" => ValueType::IsoDate,
            _ => ValueType::Number,
        }
    }
}

/// A shared formula anchor: where it was written and its expression there.
struct SharedFormula {
    row: u32,
    column: u32,
    expression: String,
}

/// Parsing state of the `<c>` element being read.
#[derive(Default)]
struct PendingCell {
    row: u32,
    column: u32,
    value_type: ValueType,
    style: usize,
    text: Option<String>,
    formula: Option<String>,
}

/// Reads every worksheet of an XLSX/XLSM container.
pub(super) fn read(name: &str, mut zip: Archive, budget: &mut MemoryBudget) -> Result<Workbook, RecordsError> {
    let (sheets, is_1904) = load_workbook(name, &mut zip)?;
    let formats = load_number_formats(&mut zip)?;
    let shared_strings = load_shared_strings(&mut zip, budget)?;
    let mut workbook = Workbook::new(name, is_1904);
    for (sheet_name, path) in sheets {
        let mut reader = zip.xml_reader(&path)?.ok_or_else(|| FormatError::MissingPart {
            name: name.to_owned(),
            part: path.to_owned(),
        })?;
        let sheet = read_sheet(&mut reader, &sheet_name, &formats, &shared_strings, is_1904, budget)
            .with_prefix(&format!("Read worksheet '{sheet_name}'"))?;
        workbook.worksheets.push(sheet);
    }
    Ok(workbook)
}

/// Normalizes a relationship target to its path inside the archive.
fn to_zip_path(path: &str) -> String {
    if let Some(path) = path.strip_prefix('/') {
        path.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}

/// Loads worksheet relationships: relationship id → archive path.
fn load_relationships(zip: &mut Archive) -> Result<HashMap<String, String>, RecordsError> {
    let mut relationships = HashMap::<String, String>::new();
    let Some(mut reader) = zip.xml_reader(RELATIONSHIPS_PATH)? else {
        return Ok(relationships);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.attribute("Id")?;
            let kind = event.attribute("Type")?;
            let target = event.attribute("Target")?;
            if kind.map(|kind| kind.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Loads the declared worksheets as (name, archive path) pairs and the date
/// system of the workbook.
fn load_workbook(name: &str, zip: &mut Archive) -> Result<(Vec<(String, String)>, bool), RecordsError> {
    let relationships = load_relationships(zip)?;
    let mut reader = zip.xml_reader(WORKBOOK_PATH)?.ok_or_else(|| FormatError::MissingPart {
        name: name.to_owned(),
        part: WORKBOOK_PATH.to_owned(),
    })?;
    let mut sheets = Vec::<(String, String)>::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut sheet_name = None::<String>;
            let mut id = None::<String>;
            for attribute in event.attributes() {
                let attribute = attribute?;
                match attribute.key.local_name().as_ref() {
                    b"name" => sheet_name = Some(attribute.text()?.into_owned()),
                    b"id" => id = Some(attribute.text()?.into_owned()),
                    _ => (),
                }
            }
            match sheet_name.zip(id) {
                Some((sheet_name, id)) => match relationships.get(&id) {
                    Some(path) => sheets.push((sheet_name, path.to_owned())),
                    None => warn!(worksheet = %sheet_name, relationship = %id, "worksheet part not found, skipped"),
                },
                None => warn!("worksheet declaration without name or relationship id, skipped"),
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event
                .attribute("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads the number format of every cell style (`cellXfs/xf`), resolving
/// custom `numFmt` codes first and built-in ids second.
fn load_number_formats(zip: &mut Archive) -> Result<StyleFormats, RecordsError> {
    let Some(mut reader) = zip.xml_reader(STYLES_PATH)? else {
        return Ok(Vec::new());
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<u32, String>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<u32>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.parse_attribute::<u32>("numFmtId")?;
            let code = event.attribute("formatCode")?;
            if let Some((id, code)) = id.zip(code) {
                custom_formats.insert(id, code.into_owned());
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = false,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            format_indexes.push(event.parse_attribute::<u32>("numFmtId")?.unwrap_or(0));
        }
    });

    let mut parsed = HashMap::<u32, Option<Arc<NumberFormat>>>::new();
    let formats = format_indexes
        .into_iter()
        .map(|id| {
            parsed
                .entry(id)
                .or_insert_with(|| {
                    let code = custom_formats.get(&id).map(String::as_str).or_else(|| builtin_format_code(id));
                    code.map(NumberFormat::parse)
                        .filter(|format| format.kind() != FormatKind::General)
                        .map(Arc::new)
                })
                .clone()
        })
        .collect();
    Ok(formats)
}

/// Loads the shared string table.
fn load_shared_strings(zip: &mut Archive, budget: &mut MemoryBudget) -> Result<Vec<String>, RecordsError> {
    let mut shared_strings = Vec::<String>::new();
    let Some(mut reader) = zip.xml_reader(SHARED_STRINGS_PATH)? else {
        return Ok(shared_strings);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            budget.charge(string.len() + std::mem::size_of::<String>())?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Reads the text of an element up to `end_tag`, skipping phonetic runs.
///
/// With `is_text_content` the element's own text counts (`<v>`, `<f>`);
/// otherwise only `<t>` children do (`<si>`, `<is>`).
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, RecordsError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && !is_text_content && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text && !is_phonetic_text => text.push_text(&event)?,
        Event::CData(event) if is_text && !is_phonetic_text => text.push_str(&String::from_utf8_lossy(&event)),
        Event::GeneralRef(event) if is_text && !is_phonetic_text => text.push_reference(&event)?,
    });
    Ok(text)
}

fn read_sheet<R: BufRead>(
    reader: &mut XmlReader<R>,
    name: &str,
    formats: &StyleFormats,
    shared_strings: &[String],
    is_1904: bool,
    budget: &mut MemoryBudget,
) -> Result<Worksheet, RecordsError> {
    let mut sheet = Worksheet::new(name);
    let mut shared_formulas = HashMap::<u32, SharedFormula>::new();
    let mut row = 0u32;
    let mut column = 0u32;
    let mut cell = PendingCell::default();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_ROW => {
            row = event.parse_attribute::<u32>("r")?.unwrap_or(row + 1);
            column = 0;
        }
        Event::Start(event) if event.name() == TAG_CELL => {
            (cell.row, cell.column) = event
                .attribute("r")?
                .and_then(|reference| parse_reference(&reference))
                .unwrap_or((row.max(1), column + 1));
            column = cell.column;
            cell.value_type = event.attribute("t")?.map(|t| ValueType::parse(&t)).unwrap_or_default();
            cell.style = event.parse_attribute::<usize>("s")?.unwrap_or(0);
            cell.text = None;
            cell.formula = None;
        }
        Event::Start(event) if event.name() == TAG_FORMULA => {
            let shared = event.attribute("t")?.is_some_and(|t| t == "shared");
            let index = event.parse_attribute::<u32>("si")?;
            let expression = read_string_value(reader, TAG_FORMULA, true)?;
            cell.formula = match index.filter(|_| shared) {
                Some(index) if expression.is_empty() => shared_formulas.get(&index).map(|anchor| {
                    shift_formula(
                        &anchor.expression,
                        i64::from(cell.row) - i64::from(anchor.row),
                        i64::from(cell.column) - i64::from(anchor.column),
                    )
                }),
                Some(index) => {
                    shared_formulas.insert(index, SharedFormula {
                        row: cell.row,
                        column: cell.column,
                        expression: expression.to_owned(),
                    });
                    Some(expression)
                }
                None => Some(expression).filter(|expression| !expression.is_empty()),
            };
        }
        Event::Start(event) if event.name() == TAG_INLINE_STRING => {
            cell.text = Some(read_string_value(reader, TAG_INLINE_STRING, false)?);
        }
        Event::Start(event) if event.name() == TAG_VALUE => {
            cell.text = Some(read_string_value(reader, TAG_VALUE, true)?);
        }
        Event::End(event) if event.name() == TAG_CELL => {
            let format = formats.get(cell.style).cloned().flatten();
            let value = decode_value(&cell, format.as_deref(), shared_strings, is_1904);
            let value = match cell.formula.take() {
                Some(expression) => CellValue::Formula(Formula {
                    expression,
                    cached: Some(Box::new(value)).filter(|cached| !cached.is_empty()),
                }),
                None => value,
            };
            if !value.is_empty() {
                sheet.push(Cell::new(cell.row, cell.column, value).with_format(format), budget)?;
            }
        }
    });
    sheet.finish();
    Ok(sheet)
}

/// Converts the raw `<v>` text of a cell into a typed value. Unreadable
/// values become `Empty` and are logged.
fn decode_value(cell: &PendingCell, format: Option<&NumberFormat>, shared_strings: &[String], is_1904: bool) -> CellValue {
    let Some(text) = cell.text.as_deref() else {
        return CellValue::Empty;
    };
    let value = match cell.value_type {
        ValueType::InlineString | ValueType::FormulaString | ValueType::Error => Some(CellValue::Text(text.to_owned())),
        ValueType::SharedString => text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| shared_strings.get(index))
            .map(|string| CellValue::Text(string.to_owned())),
        ValueType::Boolean => Some(CellValue::Boolean(text.trim() == "1" || text.trim() == "true")),
        ValueType::IsoDate => DateTimeValue::from_iso(text).map(CellValue::DateTime),
        ValueType::Number if text.trim().is_empty() => return CellValue::Empty,
        ValueType::Number => text.trim().parse::<f64>().ok().map(|number| {
            format
                .and_then(NumberFormat::temporal)
                .and_then(|kind| DateTimeValue::from_serial(number, is_1904, kind))
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Number(number))
        }),
    };
    value.unwrap_or_else(|| {
        warn!(
            reference = %to_reference(cell.row, cell.column),
            value = text,
            kind = ?cell.value_type,
            "unreadable cell value, treated as empty"
        );
        CellValue::Empty
    })
}
