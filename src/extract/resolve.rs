use crate::budget::MemoryBudget;
use crate::error::RecordsError;
use crate::extract::config::ExtractionConfig;
use crate::formula::Calculator;
use crate::spreadsheet::cell::DateTimeValue;
use crate::spreadsheet::CellRef;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::NumberFormat;
use crate::spreadsheet::Workbook;
use serde_json::Number;
use serde_json::Value;
use tracing::warn;

/// Integers above this lose precision as `f64` and stay floating point.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Numbers as JSON: integral values as integers.
pub(crate) fn number_to_json(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        Value::from(number as i64)
    } else {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

/// Typed JSON for a raw value. Numbers carrying a date or time format become
/// ISO-like strings.
pub(crate) fn typed_value(value: &CellValue, format: &NumberFormat, is_1904: bool) -> Value {
    match value {
        CellValue::Empty | CellValue::Formula(_) => Value::Null,
        CellValue::Text(text) => Value::String(text.to_owned()),
        CellValue::Boolean(boolean) => Value::Bool(*boolean),
        CellValue::DateTime(datetime) => Value::String(datetime.to_string()),
        CellValue::Number(number) => match format.temporal() {
            Some(kind) => match DateTimeValue::from_serial(*number, is_1904, kind) {
                Some(datetime) => Value::String(datetime.to_string()),
                None => number_to_json(*number),
            },
            None => number_to_json(*number),
        },
    }
}

/// Turns cells into JSON values for one extraction request.
pub struct ValueResolver<'a> {
    workbook: &'a Workbook,
    formatted_values: bool,
    calculator: Option<Calculator<'a>>,
}

impl<'a> ValueResolver<'a> {
    pub fn new(workbook: &'a Workbook, config: &ExtractionConfig) -> Self {
        Self {
            workbook,
            formatted_values: config.formatted_values,
            calculator: config.calculate_formulas.then(|| Calculator::new(workbook)),
        }
    }

    pub fn workbook(&self) -> &'a Workbook {
        self.workbook
    }

    /// The value of a position without a usable cell.
    fn empty(&self) -> Value {
        if self.formatted_values {
            Value::String(String::new())
        } else {
            Value::Null
        }
    }

    /// Resolves one position of worksheet `sheet`. Cell-level failures come
    /// back as the empty value; only the memory budget can fail the call.
    pub fn resolve(&self, sheet: usize, position: &CellRef, budget: &mut MemoryBudget) -> Result<Value, RecordsError> {
        let Some(cell) = position.cell else {
            return Ok(self.empty());
        };
        let is_1904 = self.workbook.is_1904;
        let computed = match (&cell.value, &self.calculator) {
            (CellValue::Formula(formula), Some(calculator)) => match calculator.value_of(sheet, cell.row, cell.column) {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(
                        worksheet = %self.workbook.worksheets[sheet].name(),
                        cell = %cell.reference(),
                        formula = %formula.expression,
                        %error,
                        "formula recomputation failed"
                    );
                    return Ok(self.empty());
                }
            },
            _ => None,
        };

        if self.formatted_values {
            let text = match &computed {
                Some(value) => cell.number_format().render(value, is_1904),
                None => cell.formatted(is_1904),
            };
            budget.charge(text.len())?;
            Ok(Value::String(text))
        } else {
            let value = computed.as_ref().unwrap_or_else(|| cell.value.cached());
            Ok(typed_value(value, cell.number_format(), is_1904))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::Cell;
    use crate::spreadsheet::cell::Formula;
    use crate::spreadsheet::CellIteration;
    use crate::spreadsheet::Worksheet;
    use serde_json::json;
    use std::sync::Arc;

    fn workbook(cells: Vec<Cell>) -> Workbook {
        let mut sheet = Worksheet::new("Data");
        let mut budget = MemoryBudget::unlimited();
        for cell in cells {
            sheet.push(cell, &mut budget).unwrap();
        }
        sheet.finish();
        let mut workbook = Workbook::new("book.xlsx", false);
        workbook.worksheets.push(sheet);
        workbook
    }

    fn resolve_row(workbook: &Workbook, config: &ExtractionConfig) -> Vec<Value> {
        let resolver = ValueResolver::new(workbook, config);
        let mut budget = MemoryBudget::unlimited();
        let row = workbook.worksheets[0].rows(CellIteration::Dense).next().unwrap();
        row.cells()
            .map(|position| resolver.resolve(0, &position, &mut budget).unwrap())
            .collect()
    }

    fn raw() -> ExtractionConfig {
        ExtractionConfig {
            formatted_values: false,
            ..Default::default()
        }
    }

    fn sample() -> Workbook {
        let percent = Some(Arc::new(NumberFormat::parse("0.0%")));
        let date = Some(Arc::new(NumberFormat::parse("yyyy-mm-dd")));
        workbook(vec![
            Cell::new(1, 1, CellValue::Number(1.0)),
            Cell::new(1, 2, CellValue::Number(0.125)).with_format(percent),
            Cell::new(1, 3, CellValue::Boolean(true)),
            Cell::new(1, 4, CellValue::Number(43608.0)).with_format(date),
            Cell::new(
                1,
                6,
                CellValue::Formula(Formula {
                    expression: "A1+1".to_owned(),
                    cached: Some(Box::new(CellValue::Number(5.0))),
                }),
            ),
            Cell::new(
                1,
                7,
                CellValue::Formula(Formula {
                    expression: "VLOOKUP(A1,B1:C9,2)".to_owned(),
                    cached: Some(Box::new(CellValue::Text("x".to_owned()))),
                }),
            ),
        ])
    }

    #[test]
    fn raw_values() {
        let values = resolve_row(&sample(), &raw());
        assert_eq!(
            values,
            vec![json!(1), json!(0.125), json!(true), json!("2019-05-23"), Value::Null, json!(5), json!("x")]
        );
    }

    #[test]
    fn formatted_values() {
        let values = resolve_row(&sample(), &ExtractionConfig::default());
        assert_eq!(values, vec![
            json!("1"),
            json!("12.5%"),
            json!("TRUE"),
            json!("2019-05-23"),
            json!(""),
            json!("5"),
            json!("x")
        ]);
    }

    #[test]
    fn recomputed_values() {
        let config = ExtractionConfig {
            calculate_formulas: true,
            ..raw()
        };
        let values = resolve_row(&sample(), &config);
        assert_eq!(values[5], json!(2));
        assert_eq!(values[6], Value::Null);
    }

    #[test]
    fn formatted_strings_are_charged() {
        let workbook = sample();
        let config = ExtractionConfig::default();
        let resolver = ValueResolver::new(&workbook, &config);
        let mut budget = MemoryBudget::new(Some(2));
        let row = workbook.worksheets[0].rows(CellIteration::Dense).next().unwrap();
        let results: Vec<_> = row.cells().map(|position| resolver.resolve(0, &position, &mut budget)).collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(RecordsError::ResourceExhausted(_))));
    }

    #[test]
    fn json_numbers() {
        assert_eq!(number_to_json(3.0), json!(3));
        assert_eq!(number_to_json(-0.5), json!(-0.5));
        assert_eq!(number_to_json(1e300), json!(1e300));
        assert_eq!(number_to_json(f64::NAN), Value::Null);
    }
}
