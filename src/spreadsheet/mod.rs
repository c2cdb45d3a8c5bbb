//! # Spreadsheet Module
//!
//! Turns workbook bytes into the in-memory grid model. Office Open XML
//! (.xlsx, .xlsm) and OpenDocument (.ods) containers are read with our own
//! ZIP + XML readers; delimited text (.csv, .tsv) goes through the `csv`
//! crate. Every reader produces the same [`Workbook`] of [`Worksheet`]s
//! holding typed [`Cell`]s with their number formats.
pub mod cell;
mod csv;
pub mod format;
mod ods;
pub mod reference;
pub mod sheet;
mod xlsx;

use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::helpers::zip::ZipHelper;
use encoding_rs::Encoding;
pub use cell::Cell;
pub use cell::CellValue;
pub use cell::DateTimeValue;
pub use cell::Formula;
pub use cell::TemporalKind;
pub use format::NumberFormat;
pub use sheet::CellIteration;
pub use sheet::CellRef;
pub use sheet::Row;
pub use sheet::Worksheet;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// An in-memory ZIP container.
pub(crate) type Archive = ZipArchive<Cursor<Vec<u8>>>;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ODS_MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";

/// Bytes inspected when deciding whether unknown input is text.
const TEXT_PROBE_LENGTH: usize = 8192;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Spreadsheet '{0}' is empty")]
    Empty(String),

    #[error("Cannot detect file format for '{0}'")]
    Unrecognized(String),

    #[error("Unsupported spreadsheet format for '{name}': {reason}")]
    Unsupported { name: String, reason: &'static str },

    #[error("Invalid spreadsheet '{name}': missing '{part}'")]
    MissingPart { name: String, part: String },
}

/// The container formats we can read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkbookFormat {
    Xlsx,
    Ods,
    Delimited(u8),
}

/// A parsed workbook: worksheets in the order the file declares them.
#[derive(Clone, Debug, Default)]
pub struct Workbook {
    /// Spreadsheet file name, as requested
    pub name: String,
    pub worksheets: Vec<Worksheet>,
    /// Whether date serials count from 1904-01-01
    pub is_1904: bool,
}

impl Workbook {
    pub fn new(name: &str, is_1904: bool) -> Self {
        Self {
            name: name.to_owned(),
            worksheets: Vec::new(),
            is_1904,
        }
    }

    /// Worksheet names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.worksheets.iter().map(|sheet| sheet.name().to_owned()).collect()
    }

    /// Position of a worksheet by exact, case-sensitive name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.worksheets.iter().position(|sheet| sheet.name() == name)
    }

    /// Like [`Workbook::position`], failing with `WorksheetNotFound`.
    pub fn worksheet_index(&self, name: &str) -> Result<usize, RecordsError> {
        self.position(name).ok_or_else(|| RecordsError::WorksheetNotFound {
            worksheet: name.to_owned(),
            workbook: self.name.to_owned(),
        })
    }
}

fn delimiter_for(name: &str) -> u8 {
    let extension = Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Detects the container format from the leading bytes (and, for text, the
/// file name).
pub fn detect_format(name: &str, bytes: &[u8]) -> Result<WorkbookFormat, RecordsError> {
    if bytes.is_empty() {
        Err(FormatError::Empty(name.to_owned()))?
    }
    if bytes.starts_with(CFB_MAGIC) {
        Err(FormatError::Unsupported {
            name: name.to_owned(),
            reason: "legacy binary or password protected workbook",
        })?
    }
    if bytes.starts_with(ZIP_MAGIC) {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        if zip.contains("xl/workbook.xml") {
            return Ok(WorkbookFormat::Xlsx);
        }
        if zip.contains("xl/workbook.bin") {
            Err(FormatError::Unsupported {
                name: name.to_owned(),
                reason: "binary workbook (xlsb)",
            })?
        }
        let mime_type = zip.read_bytes("mimetype")?;
        if mime_type.is_some_and(|mime_type| mime_type.trim_ascii() == ODS_MIME_TYPE) || zip.contains("content.xml") {
            return Ok(WorkbookFormat::Ods);
        }
        Err(FormatError::Unrecognized(name.to_owned()))?
    }
    let probe = &bytes[..bytes.len().min(TEXT_PROBE_LENGTH)];
    if probe.contains(&0) && Encoding::for_bom(bytes).is_none() {
        Err(FormatError::Unrecognized(name.to_owned()))?
    }
    Ok(WorkbookFormat::Delimited(delimiter_for(name)))
}

/// Parses workbook bytes, charging every stored cell to `budget`.
pub fn parse_workbook(name: &str, bytes: Vec<u8>, budget: &mut MemoryBudget) -> Result<Workbook, RecordsError> {
    let format = detect_format(name, &bytes)?;
    debug!(spreadsheet = name, ?format, size = bytes.len(), "parsing workbook");
    let workbook = match format {
        WorkbookFormat::Xlsx => xlsx::read(name, ZipArchive::new(Cursor::new(bytes))?, budget)?,
        WorkbookFormat::Ods => ods::read(name, ZipArchive::new(Cursor::new(bytes))?, budget)?,
        WorkbookFormat::Delimited(delimiter) => csv::read(name, &bytes, delimiter, budget)?,
    };
    debug!(
        spreadsheet = name,
        worksheets = workbook.worksheets.len(),
        cells = workbook.worksheets.iter().map(|sheet| sheet.cells().len()).sum::<usize>(),
        memory = budget.used(),
        "parsed workbook"
    );
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::helpers::zip::tests::build_zip;

    #[test]
    fn detect_formats() {
        let xlsx = build_zip(&[("xl/workbook.xml", "<workbook/>")]);
        assert_eq!(detect_format("a.xlsx", &xlsx).unwrap(), WorkbookFormat::Xlsx);
        let ods = build_zip(&[("mimetype", "application/vnd.oasis.opendocument.spreadsheet")]);
        assert_eq!(detect_format("a.ods", &ods).unwrap(), WorkbookFormat::Ods);
        assert_eq!(detect_format("a.csv", b"a,b\n1,2").unwrap(), WorkbookFormat::Delimited(b','));
        assert_eq!(detect_format("a.TSV", b"a\tb").unwrap(), WorkbookFormat::Delimited(b'\t'));
    }

    #[test]
    fn reject_unsupported_input() {
        let error = detect_format("a.csv", b"").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);
        assert_eq!(error.to_string(), "Spreadsheet 'a.csv' is empty");

        let mut cfb = CFB_MAGIC.to_vec();
        cfb.extend_from_slice(&[0; 16]);
        let error = detect_format("a.xls", &cfb).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);

        let other = build_zip(&[("word/document.xml", "<document/>")]);
        let error = detect_format("a.docx", &other).unwrap_err();
        assert_eq!(error.to_string(), "Cannot detect file format for 'a.docx'");

        let error = detect_format("a.bin", &[1, 0, 2, 3]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);
    }

    #[test]
    fn workbook_lookup_is_exact() {
        let mut workbook = Workbook::new("book.xlsx", false);
        workbook.worksheets.push(Worksheet::new("Data"));
        workbook.worksheets.push(Worksheet::new("Summary"));
        assert_eq!(workbook.names(), vec!["Data", "Summary"]);
        assert_eq!(workbook.position("Summary"), Some(1));
        assert_eq!(workbook.worksheet_index("Data").unwrap(), 0);
        let error = workbook.worksheet_index("data").unwrap_err();
        assert_eq!(error.to_string(), "Worksheet 'data' does not exist in 'book.xlsx'.");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
