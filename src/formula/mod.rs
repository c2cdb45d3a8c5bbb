//! # Formula Module
//!
//! Recomputes formula cells against a parsed [`Workbook`]. Expressions are
//! parsed on demand, evaluated lazily with memoization, and reference cycles
//! are reported as errors instead of recursing forever.
mod functions;
mod parser;

use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::column_to_letters;
use crate::spreadsheet::reference::letters_to_column;
use crate::spreadsheet::reference::to_reference;
use crate::spreadsheet::Workbook;
use functions::Argument;
pub use parser::parse;
pub use parser::Address;
pub use parser::BinaryOperator;
pub use parser::Expr;
use regex::Captures;
use regex::Regex;
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Nested formula evaluations allowed before giving up.
const MAX_DEPTH: usize = 256;

/// Nested expression evaluations, summed over every cell in progress.
const MAX_EVALUATION_DEPTH: usize = 1024;

const MAX_COLUMN: i64 = 16_384;
const MAX_ROW: i64 = 1_048_576;

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)").expect("Hardcode regex pattern"));

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Invalid formula '{0}'")]
    Syntax(String),

    #[error("Unknown name '{0}'")]
    Name(String),

    #[error("Unsupported function '{0}'")]
    UnsupportedFunction(String),

    #[error("Wrong number of arguments for '{0}'")]
    Arity(String),

    #[error("#VALUE!")]
    Value,

    #[error("#DIV/0!")]
    DivisionByZero,

    #[error("#NUM!")]
    Number,

    #[error("Invalid reference to '{0}'")]
    Reference(String),

    #[error("Formula evaluates to {0}")]
    Code(String),

    #[error("Circular reference at {0}")]
    Cycle(String),

    #[error("Formula nesting is too deep")]
    TooDeep,

    #[error("Formula is longer than 8192 characters")]
    TooLong,
}

fn shift_segment(segment: &str, rows: i64, columns: i64) -> String {
    REFERENCE
        .replace_all(segment, |captures: &Captures| {
            let (start, end) = captures.get(0).map_or((0, 0), |found| (found.start(), found.end()));
            let before = segment[..start].chars().next_back();
            let after = segment[end..].chars().next();
            // Part of a longer name, a function call or a sheet prefix
            if before.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$'))
                || after.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '(' | '!'))
            {
                return captures[0].to_owned();
            }
            let (column_absolute, row_absolute) = (&captures[1], &captures[3]);
            let column = letters_to_column(&captures[2]).map_or(0, i64::from);
            let row = captures[4].parse::<i64>().unwrap_or(0);
            let column = if column_absolute.is_empty() { column + columns } else { column };
            let row = if row_absolute.is_empty() { row + rows } else { row };
            if !(1..=MAX_COLUMN).contains(&column) || !(1..=MAX_ROW).contains(&row) {
                return "#REF!".to_owned();
            }
            format!(
                "{}{}{}{}",
                column_absolute,
                column_to_letters(column as u32),
                row_absolute,
                row
            )
        })
        .into_owned()
}

/// Moves the relative references of a formula by `rows` and `columns`,
/// leaving `$`-anchored parts, string literals and quoted sheet names alone.
/// References pushed off the grid become `#REF!`.
pub fn shift_formula(expression: &str, rows: i64, columns: i64) -> String {
    let mut output = String::with_capacity(expression.len());
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (index, c) in expression.char_indices() {
        match quote {
            Some(open) if c == open => {
                output.push_str(&expression[start..=index]);
                start = index + 1;
                quote = None;
            }
            Some(_) => {}
            None if c == '"' || c == '\'' => {
                output.push_str(&shift_segment(&expression[start..index], rows, columns));
                start = index;
                quote = Some(c);
            }
            None => {}
        }
    }
    match quote {
        Some(_) => output.push_str(&expression[start..]),
        None => output.push_str(&shift_segment(&expression[start..], rows, columns)),
    }
    output
}

type CellKey = (usize, u32, u32);

/// Lazily recomputes formula cells of one workbook.
///
/// Results are memoized per cell for the lifetime of the calculator, so a
/// calculator should live as long as one extraction request.
pub struct Calculator<'a> {
    workbook: &'a Workbook,
    cache: RefCell<HashMap<CellKey, Result<CellValue, EvalError>>>,
    /// Cells being evaluated, outermost first
    in_progress: RefCell<Vec<CellKey>>,
    depth: Cell<usize>,
}

impl<'a> Calculator<'a> {
    pub fn new(workbook: &'a Workbook) -> Self {
        Self {
            workbook,
            cache: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        }
    }

    /// The recomputed value of a cell. Cells without a formula yield their
    /// stored value.
    pub fn value_of(&self, sheet: usize, row: u32, column: u32) -> Result<CellValue, EvalError> {
        let worksheet = self
            .workbook
            .worksheets
            .get(sheet)
            .ok_or_else(|| EvalError::Reference(to_reference(row, column)))?;
        let formula = match worksheet.value(row, column) {
            CellValue::Formula(formula) => formula,
            value => return Ok(value.to_owned()),
        };

        let key = (sheet, row, column);
        if let Some(result) = self.cache.borrow().get(&key) {
            return result.to_owned();
        }
        if self.in_progress.borrow().contains(&key) {
            return Err(EvalError::Cycle(to_reference(row, column)));
        }
        if self.in_progress.borrow().len() >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }

        self.in_progress.borrow_mut().push(key);
        let result = parse(&formula.expression)
            .and_then(|expr| self.evaluate(sheet, &expr))
            .and_then(|value| match value {
                CellValue::Empty => Ok(CellValue::Number(0.0)),
                CellValue::Number(number) if !number.is_finite() => Err(EvalError::Number),
                value => Ok(value),
            });
        self.in_progress.borrow_mut().pop();
        self.cache.borrow_mut().insert(key, result.to_owned());
        result
    }

    fn sheet_index(&self, current: usize, address: &Address) -> Result<usize, EvalError> {
        match &address.sheet {
            Some(name) => self
                .workbook
                .position(name)
                .ok_or_else(|| EvalError::Reference(format!("{}!{}", name, to_reference(address.row, address.column)))),
            None => Ok(current),
        }
    }

    /// A referenced cell as an operand: formulas recomputed, dates as serials.
    fn operand(&self, sheet: usize, row: u32, column: u32) -> Result<CellValue, EvalError> {
        match self.value_of(sheet, row, column)? {
            CellValue::DateTime(value) => Ok(CellValue::Number(value.to_serial(self.workbook.is_1904))),
            value => Ok(value),
        }
    }

    fn cells(&self, sheet: usize, start: &Address, end: &Address) -> Result<Vec<CellValue>, EvalError> {
        let index = self.sheet_index(sheet, start)?;
        let worksheet = &self.workbook.worksheets[index];
        let rows = start.row.min(end.row)..=start.row.max(end.row).min(worksheet.highest_row());
        let columns = start.column.min(end.column)..=start.column.max(end.column).min(worksheet.highest_column());
        let mut values = Vec::new();
        for row in rows {
            for column in columns.to_owned() {
                values.push(self.operand(index, row, column)?);
            }
        }
        Ok(values)
    }

    fn argument(&self, sheet: usize, expr: &Expr) -> Result<Argument, EvalError> {
        match expr {
            Expr::Reference(address) => Ok(Argument::Cells(self.cells(sheet, address, address)?)),
            Expr::Range(start, end) => Ok(Argument::Cells(self.cells(sheet, start, end)?)),
            expr => Ok(Argument::Value(self.evaluate(sheet, expr)?)),
        }
    }

    fn evaluate(&self, sheet: usize, expr: &Expr) -> Result<CellValue, EvalError> {
        let depth = self.depth.get();
        if depth >= MAX_EVALUATION_DEPTH {
            return Err(EvalError::TooDeep);
        }
        self.depth.set(depth + 1);
        let value = self.evaluate_expr(sheet, expr);
        self.depth.set(depth);
        value
    }

    fn evaluate_expr(&self, sheet: usize, expr: &Expr) -> Result<CellValue, EvalError> {
        let value = match expr {
            Expr::Number(number) => CellValue::Number(*number),
            Expr::Text(text) => CellValue::Text(text.to_owned()),
            Expr::Boolean(boolean) => CellValue::Boolean(*boolean),
            Expr::Error(code) => Err(EvalError::Code(code.to_owned()))?,
            Expr::Reference(address) => self.operand(self.sheet_index(sheet, address)?, address.row, address.column)?,
            Expr::Range(..) => Err(EvalError::Value)?,
            Expr::Negate(inner) => CellValue::Number(-functions::to_number(&self.evaluate(sheet, inner)?)?),
            Expr::Percent(inner) => CellValue::Number(functions::to_number(&self.evaluate(sheet, inner)?)? / 100.0),
            Expr::Binary(operator, lhs, rhs) => {
                let lhs = self.evaluate(sheet, lhs)?;
                let rhs = self.evaluate(sheet, rhs)?;
                binary(*operator, &lhs, &rhs)?
            }
            Expr::Call(name, arguments) if name == "IF" => {
                if arguments.is_empty() || arguments.len() > 3 {
                    Err(EvalError::Arity(name.to_owned()))?
                }
                let condition = functions::to_boolean(&self.argument(sheet, &arguments[0])?.scalar()?)?;
                match (condition, arguments.get(1), arguments.get(2)) {
                    (true, Some(then), _) => self.argument(sheet, then)?.scalar()?,
                    (false, _, Some(otherwise)) => self.argument(sheet, otherwise)?.scalar()?,
                    (true, None, _) => CellValue::Number(0.0),
                    (false, _, None) => CellValue::Boolean(false),
                }
            }
            Expr::Call(name, arguments) => {
                if !functions::is_supported(name) {
                    Err(EvalError::UnsupportedFunction(name.to_owned()))?
                }
                let arguments = arguments
                    .iter()
                    .map(|argument| self.argument(sheet, argument))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::call(name, arguments)?
            }
        };
        Ok(value)
    }
}

fn binary(operator: BinaryOperator, lhs: &CellValue, rhs: &CellValue) -> Result<CellValue, EvalError> {
    use std::cmp::Ordering;
    let value = match operator {
        BinaryOperator::Concat => {
            CellValue::Text(functions::to_text(lhs)? + &functions::to_text(rhs)?)
        }
        BinaryOperator::Equal => CellValue::Boolean(functions::compare(lhs, rhs)? == Ordering::Equal),
        BinaryOperator::NotEqual => CellValue::Boolean(functions::compare(lhs, rhs)? != Ordering::Equal),
        BinaryOperator::Less => CellValue::Boolean(functions::compare(lhs, rhs)? == Ordering::Less),
        BinaryOperator::LessEqual => CellValue::Boolean(functions::compare(lhs, rhs)? != Ordering::Greater),
        BinaryOperator::Greater => CellValue::Boolean(functions::compare(lhs, rhs)? == Ordering::Greater),
        BinaryOperator::GreaterEqual => CellValue::Boolean(functions::compare(lhs, rhs)? != Ordering::Less),
        _ => {
            let (a, b) = (functions::to_number(lhs)?, functions::to_number(rhs)?);
            let number = match operator {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide if b == 0.0 => Err(EvalError::DivisionByZero)?,
                BinaryOperator::Divide => a / b,
                _ => a.powf(b),
            };
            if !number.is_finite() {
                Err(EvalError::Number)?
            }
            CellValue::Number(number)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::MemoryBudget;
    use crate::spreadsheet::cell::Cell;
    use crate::spreadsheet::cell::DateTimeValue;
    use crate::spreadsheet::cell::Formula;
    use crate::spreadsheet::cell::TemporalKind;
    use crate::spreadsheet::sheet::Worksheet;

    fn formula(expression: &str) -> CellValue {
        CellValue::Formula(Formula {
            expression: expression.to_owned(),
            cached: None,
        })
    }

    fn sheet(name: &str, cells: Vec<(u32, u32, CellValue)>) -> Worksheet {
        let mut sheet = Worksheet::new(name);
        let mut budget = MemoryBudget::unlimited();
        for (row, column, value) in cells {
            sheet.push(Cell::new(row, column, value), &mut budget).unwrap();
        }
        sheet.finish();
        sheet
    }

    fn workbook(sheets: Vec<Worksheet>) -> Workbook {
        let mut workbook = Workbook::new("book.xlsx", false);
        workbook.worksheets = sheets;
        workbook
    }

    #[test]
    fn shift_relative_references() {
        assert_eq!(shift_formula("A1*2", 1, 0), "A2*2");
        assert_eq!(shift_formula("$A$1+B$2+$C3", 1, 1), "$A$1+C$2+$C4");
        assert_eq!(shift_formula("SUM(A1:B2)", 2, 0), "SUM(A3:B4)");
        assert_eq!(shift_formula("\"A1\"&A1", 1, 0), "\"A1\"&A2");
        assert_eq!(shift_formula("'Q1 A1'!A1+Data!B2", 0, 1), "'Q1 A1'!B1+Data!C2");
        assert_eq!(shift_formula("LOG10(A1)", 1, 0), "LOG10(A2)");
        assert_eq!(shift_formula("A1-1", -1, 0), "#REF!-1");
    }

    #[test]
    fn evaluate_arithmetic_and_references() {
        let workbook = workbook(vec![sheet(
            "Data",
            vec![
                (1, 1, CellValue::Number(2.0)),
                (1, 2, CellValue::Number(3.0)),
                (1, 3, formula("A1*B1+1")),
                (2, 1, formula("C1^2-A1")),
                (2, 2, formula("-2^2")),
                (2, 3, formula("50%*A1")),
                (3, 1, formula("A1&\"-\"&B1")),
                (3, 2, formula("A1<B1")),
                (3, 3, formula("D9")),
            ],
        )]);
        let calculator = Calculator::new(&workbook);
        assert_eq!(calculator.value_of(0, 1, 3), Ok(CellValue::Number(7.0)));
        assert_eq!(calculator.value_of(0, 2, 1), Ok(CellValue::Number(47.0)));
        assert_eq!(calculator.value_of(0, 2, 2), Ok(CellValue::Number(4.0)));
        assert_eq!(calculator.value_of(0, 2, 3), Ok(CellValue::Number(1.0)));
        assert_eq!(calculator.value_of(0, 3, 1), Ok(CellValue::Text("2-3".to_owned())));
        assert_eq!(calculator.value_of(0, 3, 2), Ok(CellValue::Boolean(true)));
        assert_eq!(calculator.value_of(0, 3, 3), Ok(CellValue::Number(0.0)));
        assert_eq!(calculator.value_of(0, 1, 1), Ok(CellValue::Number(2.0)));
    }

    #[test]
    fn evaluate_functions_across_sheets() {
        let workbook = workbook(vec![
            sheet(
                "Data",
                vec![
                    (1, 1, CellValue::Number(1.0)),
                    (2, 1, CellValue::Number(2.0)),
                    (3, 1, CellValue::Text("n/a".to_owned())),
                    (4, 1, formula("SUM(A1:A3)")),
                ],
            ),
            sheet(
                "My Totals",
                vec![
                    (1, 1, formula("Data!A4*10")),
                    (1, 2, formula("AVERAGE(Data!A1:A2)")),
                    (1, 3, formula("IF(A1>20,\"big\",1/0)")),
                    (1, 4, formula("IF(A1<20,\"small\",1/0)")),
                    (1, 5, formula("ROUND(2.345,2)")),
                    (1, 6, formula("UPPER(TRIM(\"  a  b \"))")),
                ],
            ),
        ]);
        let calculator = Calculator::new(&workbook);
        assert_eq!(calculator.value_of(0, 4, 1), Ok(CellValue::Number(3.0)));
        assert_eq!(calculator.value_of(1, 1, 1), Ok(CellValue::Number(30.0)));
        assert_eq!(calculator.value_of(1, 1, 2), Ok(CellValue::Number(1.5)));
        assert_eq!(calculator.value_of(1, 1, 3), Ok(CellValue::Text("big".to_owned())));
        assert_eq!(calculator.value_of(1, 1, 4), Err(EvalError::DivisionByZero));
        assert_eq!(calculator.value_of(1, 1, 5), Ok(CellValue::Number(2.35)));
        assert_eq!(calculator.value_of(1, 1, 6), Ok(CellValue::Text("A B".to_owned())));
    }

    #[test]
    fn dates_are_serial_numbers_in_arithmetic() {
        let date = DateTimeValue::from_serial(43_608.0, false, TemporalKind::Date).unwrap();
        let workbook = workbook(vec![sheet(
            "Data",
            vec![(1, 1, CellValue::DateTime(date)), (1, 2, formula("A1+1"))],
        )]);
        let calculator = Calculator::new(&workbook);
        assert_eq!(calculator.value_of(0, 1, 2), Ok(CellValue::Number(43_609.0)));
    }

    #[test]
    fn failures_are_errors() {
        let workbook = workbook(vec![sheet(
            "Data",
            vec![
                (1, 1, formula("B1+1")),
                (1, 2, formula("A1+1")),
                (2, 1, formula("VLOOKUP(1,A1:B2,2)")),
                (2, 2, formula("Other!A1")),
                (2, 3, formula("1+")),
                (3, 1, formula("#N/A")),
                (3, 2, formula("\"x\"*2")),
            ],
        )]);
        let calculator = Calculator::new(&workbook);
        assert_eq!(calculator.value_of(0, 1, 1), Err(EvalError::Cycle("A1".to_owned())));
        assert!(matches!(calculator.value_of(0, 1, 2), Err(EvalError::Cycle(_))));
        assert_eq!(
            calculator.value_of(0, 2, 1),
            Err(EvalError::UnsupportedFunction("VLOOKUP".to_owned()))
        );
        assert_eq!(calculator.value_of(0, 2, 2), Err(EvalError::Reference("Other!A1".to_owned())));
        assert!(matches!(calculator.value_of(0, 2, 3), Err(EvalError::Syntax(_))));
        assert_eq!(calculator.value_of(0, 3, 1), Err(EvalError::Code("#N/A".to_owned())));
        assert_eq!(calculator.value_of(0, 3, 2), Err(EvalError::Value));
    }

    #[test]
    fn deep_formulas_are_errors() {
        let nested = format!("={}1{}", "(".repeat(4_000), ")".repeat(4_000));
        let workbook = workbook(vec![sheet(
            "Data",
            vec![
                (1, 1, formula(&nested)),
                (1, 2, formula(&format!("={}1", "-".repeat(200_000)))),
                (1, 3, formula("A1+1")),
            ],
        )]);
        let calculator = Calculator::new(&workbook);
        assert_eq!(calculator.value_of(0, 1, 1), Err(EvalError::TooDeep));
        assert_eq!(calculator.value_of(0, 1, 2), Err(EvalError::TooLong));
        assert_eq!(calculator.value_of(0, 1, 3), Err(EvalError::TooDeep));
    }

    #[test]
    fn long_reference_chains_are_errors() {
        // A1 = A2+1, A2 = A3+1, ..., A300 = 1
        let mut cells: Vec<_> = (1..300).map(|row| (row, 1, formula(&format!("A{}+1", row + 1)))).collect();
        cells.push((300, 1, CellValue::Number(1.0)));
        let workbook = workbook(vec![sheet("Data", cells)]);
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || {
                let calculator = Calculator::new(&workbook);
                assert_eq!(calculator.value_of(0, 1, 1), Err(EvalError::TooDeep));
                assert_eq!(calculator.value_of(0, 290, 1), Ok(CellValue::Number(11.0)));
            })
            .unwrap()
            .join()
            .unwrap();
    }
}
