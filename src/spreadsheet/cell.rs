use crate::spreadsheet::format::NumberFormat;
use crate::spreadsheet::reference::to_reference;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use chrono::Timelike;
use iso8601_duration::Duration as IsoDuration;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::LazyLock;

/// Serial numbers past 9999-12-31 are not dates.
const MAX_SERIAL: f64 = 2_958_466.0;

static GENERAL: LazyLock<NumberFormat> = LazyLock::new(NumberFormat::general);

/// Shared placeholder for positions without a stored cell.
pub static EMPTY: CellValue = CellValue::Empty;

fn epoch_1900() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default().and_time(Default::default())
}

/// Whether a temporal value carries a date, a time of day, or both.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TemporalKind {
    Date,
    Time,
    DateTime,
}

/// A date and/or time decoded from a serial number or an ISO 8601 string.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DateTimeValue {
    pub value: NaiveDateTime,
    pub kind: TemporalKind,
}

impl DateTimeValue {
    /// Decodes a spreadsheet serial number, including the Lotus 1-2-3 leap
    /// year bug of the 1900 date system.
    pub fn from_serial(serial: f64, is_1904: bool, kind: TemporalKind) -> Option<Self> {
        if !serial.is_finite() || !(0.0..MAX_SERIAL).contains(&serial) {
            return None;
        }
        let days = serial.trunc() as i64;
        let millis = ((serial - serial.trunc()) * 86_400_000.0).round() as i64;
        let offset = if is_1904 {
            1_462
        } else if days < 60 {
            1
        } else {
            0
        };
        let value = epoch_1900()
            .checked_add_signed(TimeDelta::days(days + offset))?
            .checked_add_signed(TimeDelta::milliseconds(millis))?;
        Some(Self { value, kind })
    }

    /// Encodes back into a serial number of the given date system.
    pub fn to_serial(&self, is_1904: bool) -> f64 {
        let elapsed = self.value - epoch_1900();
        let days = elapsed.num_days();
        let days = if is_1904 {
            days - 1_462
        } else if days <= 60 {
            days - 1
        } else {
            days
        };
        let time = self.value.time();
        let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9;
        days as f64 + seconds / 86_400.0
    }

    /// Parses `2019-05-23`, `2019-05-23T13:01:00` and fractional variants.
    pub fn from_iso(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.contains('T') {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
                .ok()
                .map(|value| Self {
                    value,
                    kind: TemporalKind::DateTime,
                })
        } else {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| Self {
                    value: date.and_time(Default::default()),
                    kind: TemporalKind::Date,
                })
        }
    }

    /// Parses an ISO 8601 duration such as `PT13H01M00S` as a time of day.
    pub fn from_iso_duration(text: &str) -> Option<Self> {
        let duration = text.trim().parse::<IsoDuration>().ok()?;
        let millis = ((duration.hour as f64 * 3_600.0 + duration.minute as f64 * 60.0 + duration.second as f64)
            * 1_000.0)
            .round() as i64;
        let value = epoch_1900()
            .checked_add_signed(TimeDelta::days(1))?
            .checked_add_signed(TimeDelta::milliseconds(millis))?;
        Some(Self {
            value,
            kind: TemporalKind::Time,
        })
    }
}

impl Display for DateTimeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shifted = self.value + TimeDelta::milliseconds(500);
        let rounded = shifted.with_nanosecond(0).unwrap_or(shifted);
        let pattern = match self.kind {
            TemporalKind::Date => "%Y-%m-%d",
            TemporalKind::Time => "%H:%M:%S",
            TemporalKind::DateTime => "%Y-%m-%d %H:%M:%S",
        };
        let value = if self.kind == TemporalKind::Date { self.value } else { rounded };
        write!(f, "{}", value.format(pattern))
    }
}

/// A formula expression with the value last computed by the authoring
/// application, when the file stored one.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    /// Expression without the leading `=`.
    pub expression: String,
    pub cached: Option<Box<CellValue>>,
}

/// Typed cell content.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    DateTime(DateTimeValue),
    Formula(Formula),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// The value to use without recomputation: a formula's cached result or
    /// `Empty` when none was stored, anything else as is.
    pub fn cached(&self) -> &CellValue {
        match self {
            CellValue::Formula(formula) => formula.cached.as_deref().unwrap_or(&EMPTY),
            value => value,
        }
    }

    /// Approximate bytes held by this value.
    pub fn memory_size(&self) -> usize {
        let heap = match self {
            CellValue::Text(text) => text.len(),
            CellValue::Formula(formula) => {
                formula.expression.len() + formula.cached.as_ref().map_or(0, |cached| cached.memory_size())
            }
            _ => 0,
        };
        std::mem::size_of::<CellValue>() + heap
    }
}

/// Converts binary error codes to their display strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A stored cell. Rows and columns are 1-based.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub column: u32,
    pub value: CellValue,
    /// Number format; `None` means General.
    pub format: Option<Arc<NumberFormat>>,
    /// Display text supplied by the file itself (ODS `text:p`).
    pub display: Option<String>,
}

impl Cell {
    pub fn new(row: u32, column: u32, value: CellValue) -> Self {
        Self {
            row,
            column,
            value,
            format: None,
            display: None,
        }
    }

    pub fn with_format(mut self, format: Option<Arc<NumberFormat>>) -> Self {
        self.format = format;
        self
    }

    pub fn with_display(mut self, display: Option<String>) -> Self {
        self.display = display;
        self
    }

    /// Returns the A1 reference of this cell (e.g. `B2`).
    pub fn reference(&self) -> String {
        to_reference(self.row, self.column)
    }

    pub fn number_format(&self) -> &NumberFormat {
        self.format.as_deref().unwrap_or(&GENERAL)
    }

    /// Display string as the authoring application would show it.
    pub fn formatted(&self, is_1904: bool) -> String {
        match &self.display {
            Some(display) => display.clone(),
            None => self.number_format().render(self.value.cached(), is_1904),
        }
    }

    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Cell>() - std::mem::size_of::<CellValue>()
            + self.value.memory_size()
            + self.display.as_ref().map_or(0, String::len)
    }
}
