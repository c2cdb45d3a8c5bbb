use crate::budget::parse_memory_limit;
use crate::budget::MemoryBudget;
use crate::spreadsheet::CellIteration;
use std::collections::HashMap;
use tracing::warn;

/// Flat request parameters, e.g. decoded from a query string.
pub type Params = HashMap<String, String>;

/// Coerces a request parameter to a boolean: empty, `false`, `0`, `off` and
/// `no` (case-insensitive, trimmed) are false, anything else is true.
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty()
        || value.eq_ignore_ascii_case("false")
        || value == "0"
        || value.eq_ignore_ascii_case("off")
        || value.eq_ignore_ascii_case("no"))
}

/// A recognized request parameter.
///
/// # Type Parameters
///
/// * `T` - The type of the parameter value
pub trait NamedParam<T> {
    /// Returns the parameter name as passed by callers
    fn name() -> &'static str;

    /// Value used when the parameter is absent or cannot be understood
    fn default() -> T;

    /// Converts the raw parameter text, `None` when it is malformed
    fn parse(value: &str) -> Option<T>;

    /// Extracts the parameter value from the request parameters
    fn read(params: &Params) -> T {
        match params.get(Self::name()) {
            Some(value) => Self::parse(value).unwrap_or_else(|| {
                warn!(param = Self::name(), value = %value, "ignoring malformed parameter");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}

/// Row 1 supplies field names parameter handler
struct FirstRowHeadersParam;

/// Skip empty rows parameter handler
struct SkipEmptyRowsParam;

/// Formula recomputation parameter handler
struct CalculateFormulasParam;

/// Formatted values parameter handler
struct FormattedValuesParam;

/// Sparse iteration parameter handler
struct IterateOnlyExistingCellsParam;

/// Memory limit parameter handler
struct MemoryLimitParam;

macro_rules! flag_param {
    ($param:ident, $name:literal, $default:literal) => {
        impl NamedParam<bool> for $param {
            fn name() -> &'static str {
                $name
            }

            fn default() -> bool {
                $default
            }

            fn parse(value: &str) -> Option<bool> {
                Some(parse_bool(value))
            }
        }
    };
}

flag_param!(FirstRowHeadersParam, "first_row_headers", true);
flag_param!(SkipEmptyRowsParam, "skip_empty_rows", false);
flag_param!(CalculateFormulasParam, "calculate_formulas", false);
flag_param!(FormattedValuesParam, "formatted_values", true);
flag_param!(IterateOnlyExistingCellsParam, "iterate_only_existing_cells", false);

impl NamedParam<Option<usize>> for MemoryLimitParam {
    fn name() -> &'static str {
        "memory_limit"
    }

    fn default() -> Option<usize> {
        None
    }

    fn parse(value: &str) -> Option<Option<usize>> {
        parse_memory_limit(value)
    }
}

/// Options of one extraction request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Row 1 supplies field names instead of becoming a record
    pub first_row_headers: bool,
    /// Drop rows whose resolved values are all empty or blank
    pub skip_empty_rows: bool,
    /// Recompute formulas instead of using their cached results
    pub calculate_formulas: bool,
    /// Display-formatted strings instead of typed raw values
    pub formatted_values: bool,
    /// Walk only stored cells instead of every column up to the highest one
    pub iterate_only_existing_cells: bool,
    /// Byte budget for parsed cells and formatted strings, `None` for unlimited
    pub memory_limit: Option<usize>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            first_row_headers: FirstRowHeadersParam::default(),
            skip_empty_rows: SkipEmptyRowsParam::default(),
            calculate_formulas: CalculateFormulasParam::default(),
            formatted_values: FormattedValuesParam::default(),
            iterate_only_existing_cells: IterateOnlyExistingCellsParam::default(),
            memory_limit: MemoryLimitParam::default(),
        }
    }
}

impl ExtractionConfig {
    /// Builds the config from request parameters. Unrecognized keys are
    /// ignored.
    pub fn from_params(params: &Params) -> Self {
        Self {
            first_row_headers: FirstRowHeadersParam::read(params),
            skip_empty_rows: SkipEmptyRowsParam::read(params),
            calculate_formulas: CalculateFormulasParam::read(params),
            formatted_values: FormattedValuesParam::read(params),
            iterate_only_existing_cells: IterateOnlyExistingCellsParam::read(params),
            memory_limit: MemoryLimitParam::read(params),
        }
    }

    pub fn cell_iteration(&self) -> CellIteration {
        if self.iterate_only_existing_cells {
            CellIteration::Sparse
        } else {
            CellIteration::Dense
        }
    }

    /// A fresh budget for one request.
    pub fn budget(&self) -> MemoryBudget {
        MemoryBudget::new(self.memory_limit)
    }
}
