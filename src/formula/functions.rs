use crate::formula::EvalError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::format::general_number;
use crate::spreadsheet::format::round_decimal;
use std::cmp::Ordering;

/// An evaluated function argument. References and ranges keep their cells
/// apart from direct values because aggregates skip text found in cells but
/// coerce text passed directly.
#[derive(Clone, Debug)]
pub(crate) enum Argument {
    Value(CellValue),
    Cells(Vec<CellValue>),
}

impl Argument {
    /// The single value of the argument; a multi-cell range is a `#VALUE!`.
    pub(crate) fn scalar(self) -> Result<CellValue, EvalError> {
        match self {
            Argument::Value(value) => Ok(value),
            Argument::Cells(mut cells) if cells.len() == 1 => Ok(cells.remove(0)),
            Argument::Cells(_) => Err(EvalError::Value),
        }
    }
}

pub(crate) fn to_number(value: &CellValue) -> Result<f64, EvalError> {
    match value {
        CellValue::Empty => Ok(0.0),
        CellValue::Number(number) => Ok(*number),
        CellValue::Boolean(boolean) => Ok(if *boolean { 1.0 } else { 0.0 }),
        CellValue::Text(text) => text.trim().parse::<f64>().map_err(|_| EvalError::Value),
        CellValue::DateTime(_) | CellValue::Formula(_) => Err(EvalError::Value),
    }
}

pub(crate) fn to_text(value: &CellValue) -> Result<String, EvalError> {
    match value {
        CellValue::Empty => Ok(String::new()),
        CellValue::Number(number) => Ok(general_number(*number)),
        CellValue::Boolean(boolean) => Ok(if *boolean { "TRUE" } else { "FALSE" }.to_owned()),
        CellValue::Text(text) => Ok(text.to_owned()),
        CellValue::DateTime(_) | CellValue::Formula(_) => Err(EvalError::Value),
    }
}

pub(crate) fn to_boolean(value: &CellValue) -> Result<bool, EvalError> {
    match value {
        CellValue::Empty => Ok(false),
        CellValue::Number(number) => Ok(*number != 0.0),
        CellValue::Boolean(boolean) => Ok(*boolean),
        CellValue::Text(text) if text.eq_ignore_ascii_case("TRUE") => Ok(true),
        CellValue::Text(text) if text.eq_ignore_ascii_case("FALSE") => Ok(false),
        _ => Err(EvalError::Value),
    }
}

/// Orders values the way comparison operators do: numbers before text before
/// booleans, text case-insensitively, empty as zero or as the empty string.
pub(crate) fn compare(lhs: &CellValue, rhs: &CellValue) -> Result<Ordering, EvalError> {
    fn rank(value: &CellValue) -> u8 {
        match value {
            CellValue::Number(_) => 0,
            CellValue::Text(_) => 1,
            CellValue::Boolean(_) => 2,
            _ => 3,
        }
    }
    let (lhs, rhs) = match (lhs, rhs) {
        (CellValue::Empty, CellValue::Empty) => return Ok(Ordering::Equal),
        (CellValue::Empty, CellValue::Text(_)) => (CellValue::Text(String::new()), rhs.to_owned()),
        (CellValue::Text(_), CellValue::Empty) => (lhs.to_owned(), CellValue::Text(String::new())),
        (CellValue::Empty, CellValue::Boolean(_)) => (CellValue::Boolean(false), rhs.to_owned()),
        (CellValue::Boolean(_), CellValue::Empty) => (lhs.to_owned(), CellValue::Boolean(false)),
        (CellValue::Empty, _) => (CellValue::Number(0.0), rhs.to_owned()),
        (_, CellValue::Empty) => (lhs.to_owned(), CellValue::Number(0.0)),
        _ => (lhs.to_owned(), rhs.to_owned()),
    };
    match (&lhs, &rhs) {
        (CellValue::Number(a), CellValue::Number(b)) => a.partial_cmp(b).ok_or(EvalError::Number),
        (CellValue::Text(a), CellValue::Text(b)) => Ok(a.to_lowercase().cmp(&b.to_lowercase())),
        (CellValue::Boolean(a), CellValue::Boolean(b)) => Ok(a.cmp(b)),
        _ => Ok(rank(&lhs).cmp(&rank(&rhs))),
    }
}

/// Numbers for aggregates: cells contribute only their numbers, direct
/// arguments are coerced.
fn numbers(arguments: Vec<Argument>) -> Result<Vec<f64>, EvalError> {
    let mut numbers = Vec::new();
    for argument in arguments {
        match argument {
            Argument::Value(value) => numbers.push(to_number(&value)?),
            Argument::Cells(cells) => numbers.extend(cells.iter().filter_map(|cell| match cell {
                CellValue::Number(number) => Some(*number),
                _ => None,
            })),
        }
    }
    Ok(numbers)
}

fn booleans(arguments: Vec<Argument>) -> Result<Vec<bool>, EvalError> {
    let mut booleans = Vec::new();
    for argument in arguments {
        match argument {
            Argument::Value(value) => booleans.push(to_boolean(&value)?),
            Argument::Cells(cells) => booleans.extend(cells.iter().filter_map(|cell| match cell {
                CellValue::Number(number) => Some(*number != 0.0),
                CellValue::Boolean(boolean) => Some(*boolean),
                _ => None,
            })),
        }
    }
    if booleans.is_empty() {
        return Err(EvalError::Value);
    }
    Ok(booleans)
}

fn texts(arguments: Vec<Argument>) -> Result<String, EvalError> {
    let mut text = String::new();
    for argument in arguments {
        match argument {
            Argument::Value(value) => text.push_str(&to_text(&value)?),
            Argument::Cells(cells) => {
                for cell in cells {
                    text.push_str(&to_text(&cell)?);
                }
            }
        }
    }
    Ok(text)
}

fn arity(name: &str, arguments: &[Argument], min: usize, max: usize) -> Result<(), EvalError> {
    if arguments.len() < min || arguments.len() > max {
        Err(EvalError::Arity(name.to_owned()))?
    }
    Ok(())
}

/// Single scalar argument.
fn unary(name: &str, mut arguments: Vec<Argument>) -> Result<CellValue, EvalError> {
    arity(name, &arguments, 1, 1)?;
    arguments.remove(0).scalar()
}

/// Whether a function is known; `IF` is handled by the calculator since its
/// branches are evaluated lazily.
pub(crate) fn is_supported(name: &str) -> bool {
    matches!(
        name,
        "SUM"
            | "AVERAGE"
            | "MIN"
            | "MAX"
            | "COUNT"
            | "COUNTA"
            | "IF"
            | "AND"
            | "OR"
            | "NOT"
            | "CONCATENATE"
            | "CONCAT"
            | "LEN"
            | "UPPER"
            | "LOWER"
            | "TRIM"
            | "ROUND"
            | "ABS"
    )
}

/// Calls an eagerly evaluated function.
pub(crate) fn call(name: &str, arguments: Vec<Argument>) -> Result<CellValue, EvalError> {
    let value = match name {
        "SUM" => CellValue::Number(numbers(arguments)?.iter().sum()),
        "AVERAGE" => {
            let numbers = numbers(arguments)?;
            if numbers.is_empty() {
                Err(EvalError::DivisionByZero)?
            }
            CellValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
        "MIN" => CellValue::Number(numbers(arguments)?.into_iter().reduce(f64::min).unwrap_or(0.0)),
        "MAX" => CellValue::Number(numbers(arguments)?.into_iter().reduce(f64::max).unwrap_or(0.0)),
        "COUNT" => {
            let count = arguments
                .iter()
                .map(|argument| match argument {
                    Argument::Value(CellValue::Empty) => 0,
                    Argument::Value(value) => usize::from(to_number(value).is_ok()),
                    Argument::Cells(cells) => cells.iter().filter(|cell| matches!(cell, CellValue::Number(_))).count(),
                })
                .sum::<usize>();
            CellValue::Number(count as f64)
        }
        "COUNTA" => {
            let count = arguments
                .iter()
                .map(|argument| match argument {
                    Argument::Value(_) => 1,
                    Argument::Cells(cells) => cells.iter().filter(|cell| !cell.is_empty()).count(),
                })
                .sum::<usize>();
            CellValue::Number(count as f64)
        }
        "AND" => CellValue::Boolean(booleans(arguments)?.into_iter().all(|boolean| boolean)),
        "OR" => CellValue::Boolean(booleans(arguments)?.into_iter().any(|boolean| boolean)),
        "NOT" => CellValue::Boolean(!to_boolean(&unary(name, arguments)?)?),
        "CONCATENATE" | "CONCAT" => CellValue::Text(texts(arguments)?),
        "LEN" => CellValue::Number(to_text(&unary(name, arguments)?)?.chars().count() as f64),
        "UPPER" => CellValue::Text(to_text(&unary(name, arguments)?)?.to_uppercase()),
        "LOWER" => CellValue::Text(to_text(&unary(name, arguments)?)?.to_lowercase()),
        "TRIM" => {
            let text = to_text(&unary(name, arguments)?)?;
            CellValue::Text(text.split(' ').filter(|word| !word.is_empty()).collect::<Vec<_>>().join(" "))
        }
        "ABS" => CellValue::Number(to_number(&unary(name, arguments)?)?.abs()),
        "ROUND" => {
            arity(name, &arguments, 2, 2)?;
            let mut arguments = arguments.into_iter();
            let number = match arguments.next() {
                Some(argument) => to_number(&argument.scalar()?)?,
                None => Err(EvalError::Arity(name.to_owned()))?,
            };
            let digits = match arguments.next() {
                Some(argument) => to_number(&argument.scalar()?)?.trunc() as i32,
                None => Err(EvalError::Arity(name.to_owned()))?,
            };
            CellValue::Number(round_decimal(number, digits))
        }
        _ => Err(EvalError::UnsupportedFunction(name.to_owned()))?,
    };
    Ok(value)
}
