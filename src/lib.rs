//! # Rusty Records
//!
//! Extracts the worksheets of a spreadsheet as ordered, field-keyed JSON
//! records: row 1 names the fields, every following row becomes one object.
//!
//! ## Features
//!
//! - **Multi-format support**: Office Open XML (`.xlsx`, `.xlsm`), OpenDocument
//!   (`.ods`) and delimited text (`.csv`, `.tsv`)
//! - **Raw or formatted values**: typed JSON values, or display strings rendered
//!   through each cell's number format
//! - **Formula recomputation**: cached results by default, recomputed on request
//! - **Dense or sparse iteration**: every column up to the highest one, or only
//!   stored cells
//! - **Memory budget**: a byte limit per request instead of unbounded growth
//!
//! ## Operations
//!
//! - [`SpreadsheetService::list_spreadsheets`]
//! - [`SpreadsheetService::list_worksheets`]
//! - [`SpreadsheetService::get_all`]: `{ worksheet name: [record, ...] }`
//! - [`SpreadsheetService::get_one`]: `[record, ...]`
pub mod budget;
pub mod error;
pub mod extract;
pub mod formula;
mod helpers;
pub mod service;
pub mod source;
pub mod spreadsheet;

pub use budget::MemoryBudget;
pub use error::ErrorKind;
pub use error::RecordsError;
pub use extract::extract_all;
pub use extract::extract_one;
pub use extract::list_worksheets;
pub use extract::ExtractionConfig;
pub use extract::Params;
pub use extract::Record;
pub use extract::WorkbookRecords;
pub use service::ServiceConfig;
pub use service::SpreadsheetService;
pub use source::BlobSource;
pub use source::FileSystemSource;
pub use source::MemorySource;
pub use spreadsheet::parse_workbook;
pub use spreadsheet::Workbook;
