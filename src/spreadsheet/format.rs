//! Spreadsheet number formats.
//!
//! A format code such as `#,##0.00;(#,##0.00)` or `m/d/yyyy h:mm` is split
//! into up to four sections (positive; negative; zero; text) and each section
//! into parts. The same parse decides whether numeric cells carrying the
//! format hold dates, times or plain numbers, and renders their display
//! strings for `formatted_values` output.
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::DateTimeValue;
use crate::spreadsheet::cell::TemporalKind;
use chrono::Datelike;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use chrono::Timelike;

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

/// Returns the code of a built-in number format id.
pub fn builtin_format_code(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "m/d/yyyy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yyyy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mm:ss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

/// What values carrying a format represent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatKind {
    General,
    Number,
    Text,
    Date,
    Time,
    DateTime,
}

impl FormatKind {
    pub fn temporal(&self) -> Option<TemporalKind> {
        match self {
            FormatKind::Date => Some(TemporalKind::Date),
            FormatKind::Time => Some(TemporalKind::Time),
            FormatKind::DateTime => Some(TemporalKind::DateTime),
            FormatKind::General | FormatKind::Number | FormatKind::Text => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumberFormat {
    code: String,
    sections: Vec<Section>,
    kind: FormatKind,
}

#[derive(Clone, Debug, PartialEq)]
struct Section {
    parts: Vec<Part>,
    temporal: bool,
    twelve_hour: bool,
    percent: i32,
}

#[derive(Clone, Debug, PartialEq)]
enum Part {
    Literal(String),
    General,
    Text,
    Number(NumberPattern),
    Date(DatePart),
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum DatePart {
    Year2,
    Year4,
    Month,
    Month2,
    MonthShort,
    MonthLong,
    MonthLetter,
    Day,
    Day2,
    DayShort,
    DayLong,
    Hour(usize),
    Minute(usize),
    Second(usize),
    Elapsed(char, usize),
    Fraction(usize),
    AmPm,
    AP,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct NumberPattern {
    integer_zeros: usize,
    thousands: bool,
    scale: i32,
    has_point: bool,
    decimals: usize,
    optional_decimals: usize,
    exponent: Option<(usize, bool)>,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Run(char, usize),
    Elapsed(char, usize),
    Placeholder(char),
    Exponent(bool),
    Percent,
    AmPm,
    AP,
    Text,
    General,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::parse("General")
    }
}

impl NumberFormat {
    pub fn general() -> Self {
        Self::default()
    }

    /// Parses a format code; unknown constructs degrade to literals.
    pub fn parse(code: &str) -> Self {
        let sections: Vec<Section> = split_sections(code).iter().map(|section| build_section(section)).collect();
        let kind = classify(&sections);
        Self {
            code: code.to_owned(),
            sections,
            kind,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    /// The temporal kind numeric cells with this format represent, if any.
    pub fn temporal(&self) -> Option<TemporalKind> {
        self.kind.temporal()
    }

    /// Renders any cell value as its display string.
    pub fn render(&self, value: &CellValue, is_1904: bool) -> String {
        match value {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => self.format_text(text),
            CellValue::Number(number) => self.format_number(*number, is_1904),
            CellValue::Boolean(true) => "TRUE".to_owned(),
            CellValue::Boolean(false) => "FALSE".to_owned(),
            CellValue::DateTime(datetime) => self.format_datetime(datetime, is_1904),
            CellValue::Formula(formula) => match &formula.cached {
                Some(cached) => self.render(cached, is_1904),
                None => String::new(),
            },
        }
    }

    pub fn format_number(&self, value: f64, is_1904: bool) -> String {
        if !value.is_finite() {
            return "#NUM!".to_owned();
        }
        let Some((section, value, negative)) = self.pick_section(value) else {
            return general_number(value);
        };
        if section.temporal {
            let kind = self.kind.temporal().unwrap_or(TemporalKind::DateTime);
            return match DateTimeValue::from_serial(value, is_1904, kind) {
                Some(datetime) if !negative => render_temporal(section, &datetime, is_1904),
                _ => general_number(if negative { -value } else { value }),
            };
        }
        render_numeric(section, value, negative)
    }

    pub fn format_datetime(&self, value: &DateTimeValue, is_1904: bool) -> String {
        match self.sections.first() {
            Some(section) if section.temporal => render_temporal(section, value, is_1904),
            Some(_) if self.kind == FormatKind::Number => self.format_number(value.to_serial(is_1904), is_1904),
            _ => value.to_string(),
        }
    }

    pub fn format_text(&self, text: &str) -> String {
        let section = match self.sections.get(3) {
            Some(section) => section,
            None => match self.sections.first() {
                Some(section) if section.parts.contains(&Part::Text) => section,
                _ => return text.to_owned(),
            },
        };
        let mut output = String::new();
        for part in &section.parts {
            match part {
                Part::Literal(literal) => output.push_str(literal),
                Part::Text => output.push_str(text),
                _ => (),
            }
        }
        output
    }

    /// Chooses the section for a number; the flag asks for a leading minus.
    fn pick_section(&self, value: f64) -> Option<(&Section, f64, bool)> {
        let numeric = &self.sections[..self.sections.len().min(3)];
        match numeric.len() {
            0 => None,
            count if value < 0.0 && count >= 2 => Some((&numeric[1], -value, false)),
            3 if value == 0.0 => Some((&numeric[2], value, false)),
            _ if value < 0.0 => Some((&numeric[0], -value, true)),
            _ => Some((&numeric[0], value, false)),
        }
    }
}

/// Excel "General" rendering: integers without a fraction, other numbers
/// rounded to 15 significant digits.
pub fn general_number(value: f64) -> String {
    if !value.is_finite() {
        return "#NUM!".to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let rounded = format!("{:.14e}", value).parse::<f64>().unwrap_or(value);
    rounded.to_string()
}

/// Rounds half away from zero at `digits` decimals, at the 15 significant
/// digits spreadsheets keep, so 2.345 rounds to 2.35.
pub(crate) fn round_decimal(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = value * factor;
    let scaled = format!("{:.14e}", scaled).parse::<f64>().unwrap_or(scaled);
    scaled.round() / factor
}

fn split_sections(code: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut bracket = false;
    let mut escaped = false;
    for character in code.chars() {
        match character {
            _ if escaped => escaped = false,
            '\\' | '_' | '*' if !quoted => escaped = true,
            '"' => quoted = !quoted,
            '[' if !quoted => bracket = true,
            ']' if !quoted => bracket = false,
            ';' if !quoted && !bracket => {
                sections.push(std::mem::take(&mut current));
                continue;
            }
            _ => (),
        }
        current.push(character);
    }
    sections.push(current);
    sections
}

fn starts_with_ignore_case(characters: &[char], pattern: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    characters.len() >= pattern.len()
        && characters
            .iter()
            .zip(pattern.iter())
            .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn push_literal(tokens: &mut Vec<Token>, text: &str) {
    if let Some(Token::Literal(last)) = tokens.last_mut() {
        last.push_str(text);
    } else if !text.is_empty() {
        tokens.push(Token::Literal(text.to_owned()));
    }
}

fn tokenize(section: &str) -> Vec<Token> {
    let characters: Vec<char> = section.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;
    while index < characters.len() {
        let character = characters[index];
        let rest = &characters[index..];
        match character {
            '"' => {
                let end = characters[index + 1..]
                    .iter()
                    .position(|c| *c == '"')
                    .map(|offset| index + 1 + offset)
                    .unwrap_or(characters.len());
                let literal: String = characters[index + 1..end].iter().collect();
                push_literal(&mut tokens, &literal);
                index = end + 1;
            }
            '\\' => {
                if let Some(next) = characters.get(index + 1) {
                    push_literal(&mut tokens, &next.to_string());
                }
                index += 2;
            }
            '_' => {
                push_literal(&mut tokens, " ");
                index += 2;
            }
            '*' => index += 2,
            '[' => {
                let end = characters[index..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|offset| index + offset)
                    .unwrap_or(characters.len());
                let content: String = characters[index + 1..end].iter().collect();
                bracket_token(&mut tokens, &content);
                index = end + 1;
            }
            '@' => {
                tokens.push(Token::Text);
                index += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                index += 1;
            }
            '0' | '#' | '?' | '.' | ',' => {
                tokens.push(Token::Placeholder(character));
                index += 1;
            }
            'E' | 'e' if matches!(characters.get(index + 1), Some('+') | Some('-')) => {
                tokens.push(Token::Exponent(characters[index + 1] == '+'));
                index += 2;
            }
            _ if starts_with_ignore_case(rest, "general") => {
                tokens.push(Token::General);
                index += 7;
            }
            _ if starts_with_ignore_case(rest, "am/pm") => {
                tokens.push(Token::AmPm);
                index += 5;
            }
            _ if starts_with_ignore_case(rest, "a/p") => {
                tokens.push(Token::AP);
                index += 3;
            }
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => {
                let letter = character.to_ascii_lowercase();
                let length = rest
                    .iter()
                    .take_while(|c| c.to_ascii_lowercase() == letter)
                    .count();
                tokens.push(Token::Run(letter, length));
                index += length;
            }
            _ => {
                push_literal(&mut tokens, &character.to_string());
                index += 1;
            }
        }
    }
    tokens
}

/// Bracketed content: elapsed time units, currency symbols; colors and
/// conditions are dropped.
fn bracket_token(tokens: &mut Vec<Token>, content: &str) {
    let lower = content.to_ascii_lowercase();
    if let Some(first) = lower.chars().next() {
        if matches!(first, 'h' | 'm' | 's') && lower.chars().all(|c| c == first) {
            tokens.push(Token::Elapsed(first, lower.len()));
            return;
        }
    }
    if let Some(currency) = content.strip_prefix('$') {
        let symbol = currency.split('-').next().unwrap_or_default();
        push_literal(tokens, symbol);
    }
}

fn is_temporal(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|token| matches!(token, Token::Run(..) | Token::Elapsed(..) | Token::AmPm | Token::AP))
}

fn build_section(code: &str) -> Section {
    let tokens = tokenize(code);
    if is_temporal(&tokens) {
        build_temporal_section(tokens)
    } else {
        build_numeric_section(tokens)
    }
}

fn is_hour(token: &Token) -> bool {
    matches!(token, Token::Run('h', _) | Token::Elapsed('h', _))
}

fn is_second(token: &Token) -> bool {
    matches!(token, Token::Run('s', _) | Token::Elapsed('s', _))
}

fn build_temporal_section(tokens: Vec<Token>) -> Section {
    let date_tokens: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| matches!(token, Token::Run(..) | Token::Elapsed(..)))
        .map(|(index, _)| index)
        .collect();
    let is_minute = |index: usize| -> bool {
        let position = date_tokens.iter().position(|candidate| *candidate == index);
        position.is_some_and(|position| {
            let previous = position.checked_sub(1).and_then(|p| date_tokens.get(p));
            let next = date_tokens.get(position + 1);
            previous.is_some_and(|p| is_hour(&tokens[*p])) || next.is_some_and(|n| is_second(&tokens[*n]))
        })
    };
    let twelve_hour = tokens.iter().any(|token| matches!(token, Token::AmPm | Token::AP));

    let mut parts = Vec::new();
    let mut index = 0usize;
    while index < tokens.len() {
        let part = match &tokens[index] {
            Token::Run('y', length) if *length <= 2 => Part::Date(DatePart::Year2),
            Token::Run('y', _) => Part::Date(DatePart::Year4),
            Token::Run('m', length) if *length <= 2 && is_minute(index) => Part::Date(DatePart::Minute(*length)),
            Token::Run('m', 1) => Part::Date(DatePart::Month),
            Token::Run('m', 2) => Part::Date(DatePart::Month2),
            Token::Run('m', 3) => Part::Date(DatePart::MonthShort),
            Token::Run('m', 5) => Part::Date(DatePart::MonthLetter),
            Token::Run('m', _) => Part::Date(DatePart::MonthLong),
            Token::Run('d', 1) => Part::Date(DatePart::Day),
            Token::Run('d', 2) => Part::Date(DatePart::Day2),
            Token::Run('d', 3) => Part::Date(DatePart::DayShort),
            Token::Run('d', _) => Part::Date(DatePart::DayLong),
            Token::Run('h', length) => Part::Date(DatePart::Hour(*length)),
            Token::Run('s', length) => Part::Date(DatePart::Second(*length)),
            Token::Run(letter, length) => Part::Literal(letter.to_string().repeat(*length)),
            Token::Elapsed(unit, width) => Part::Date(DatePart::Elapsed(*unit, *width)),
            Token::AmPm => Part::Date(DatePart::AmPm),
            Token::AP => Part::Date(DatePart::AP),
            Token::Placeholder('.') if matches!(parts.last(), Some(Part::Date(DatePart::Second(_)))) => {
                let digits = tokens[index + 1..]
                    .iter()
                    .take_while(|token| **token == Token::Placeholder('0'))
                    .count();
                if digits > 0 {
                    index += digits;
                    Part::Date(DatePart::Fraction(digits.min(3)))
                } else {
                    Part::Literal(".".to_owned())
                }
            }
            Token::Placeholder(character) => Part::Literal(character.to_string()),
            Token::Percent => Part::Literal("%".to_owned()),
            Token::Literal(text) => Part::Literal(text.to_owned()),
            Token::Exponent(_) | Token::Text | Token::General => Part::Literal(String::new()),
        };
        parts.push(part);
        index += 1;
    }
    Section {
        parts,
        temporal: true,
        twelve_hour,
        percent: 0,
    }
}

fn build_numeric_section(tokens: Vec<Token>) -> Section {
    let is_digit = |token: &Token| matches!(token, Token::Placeholder('0' | '#' | '?'));
    let mut parts = Vec::new();
    let mut percent = 0;
    let mut index = 0usize;
    let mut has_number = false;
    while index < tokens.len() {
        match &tokens[index] {
            Token::Placeholder(_) if !has_number && tokens[index..].iter().take_while(|t| matches!(t, Token::Placeholder(_))).any(is_digit) => {
                let length = tokens[index..]
                    .iter()
                    .take_while(|token| matches!(token, Token::Placeholder(_) | Token::Exponent(_)))
                    .count();
                parts.push(Part::Number(parse_pattern(&tokens[index..index + length])));
                has_number = true;
                index += length;
                continue;
            }
            Token::Placeholder(character) => parts.push(Part::Literal(character.to_string())),
            Token::Percent => {
                percent += 1;
                parts.push(Part::Literal("%".to_owned()));
            }
            Token::Literal(text) => parts.push(Part::Literal(text.to_owned())),
            Token::Text => parts.push(Part::Text),
            Token::General => parts.push(Part::General),
            Token::Exponent(plus) => parts.push(Part::Literal(if *plus { "E+" } else { "E-" }.to_owned())),
            Token::Run(..) | Token::Elapsed(..) | Token::AmPm | Token::AP => (),
        }
        index += 1;
    }
    Section {
        parts,
        temporal: false,
        twelve_hour: false,
        percent,
    }
}

fn parse_pattern(tokens: &[Token]) -> NumberPattern {
    let mut pattern = NumberPattern::default();
    let mut integer = Vec::<char>::new();
    let mut exponent_digits = None::<(usize, bool)>;
    for token in tokens {
        match token {
            Token::Exponent(plus) => exponent_digits = Some((0, *plus)),
            Token::Placeholder(character) => match exponent_digits.as_mut() {
                Some((digits, _)) => *digits += usize::from(*character == '0'),
                None if *character == '.' && !pattern.has_point => pattern.has_point = true,
                None if pattern.has_point => match character {
                    '0' => pattern.decimals += 1,
                    '#' | '?' => pattern.optional_decimals += 1,
                    _ => (),
                },
                None => integer.push(*character),
            },
            _ => (),
        }
    }
    let trailing_commas = integer.iter().rev().take_while(|c| **c == ',').count();
    integer.truncate(integer.len() - trailing_commas);
    pattern.scale = trailing_commas as i32;
    pattern.integer_zeros = integer.iter().filter(|c| **c == '0').count();
    pattern.thousands = integer.contains(&',');
    pattern.exponent = exponent_digits;
    pattern
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

impl NumberPattern {
    fn render(&self, value: f64) -> String {
        let value = value / 1000f64.powi(self.scale);
        if let Some((digits, plus)) = self.exponent {
            return self.render_scientific(value, digits, plus);
        }
        let total = self.decimals + self.optional_decimals;
        let fixed = format!("{:.*}", total, round_decimal(value, total as i32));
        let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let mut integer = integer.trim_start_matches('0').to_owned();
        if integer.len() < self.integer_zeros {
            integer = format!("{}{}", "0".repeat(self.integer_zeros - integer.len()), integer);
        }
        if self.thousands {
            integer = group_thousands(&integer);
        }
        let mut fraction = fraction.to_owned();
        while fraction.len() > self.decimals && fraction.ends_with('0') {
            fraction.pop();
        }
        if self.has_point {
            format!("{integer}.{fraction}")
        } else {
            integer
        }
    }

    fn render_scientific(&self, value: f64, digits: usize, plus: bool) -> String {
        let total = self.decimals + self.optional_decimals;
        let formatted = format!("{:.*e}", total, value);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
        let exponent = exponent.parse::<i32>().unwrap_or(0);
        let sign = if exponent < 0 { "-" } else if plus { "+" } else { "" };
        format!("{mantissa}E{sign}{:0width$}", exponent.abs(), width = digits.max(1))
    }
}

fn render_numeric(section: &Section, value: f64, negative: bool) -> String {
    let value = value * 100f64.powi(section.percent);
    let mut output = String::new();
    if negative {
        output.push('-');
    }
    for part in &section.parts {
        match part {
            Part::Literal(literal) => output.push_str(literal),
            Part::Number(pattern) => output.push_str(&pattern.render(value)),
            Part::General => output.push_str(&general_number(value)),
            Part::Text | Part::Date(_) => (),
        }
    }
    output
}

fn round_to_second(value: NaiveDateTime) -> NaiveDateTime {
    let shifted = value + TimeDelta::milliseconds(500);
    shifted.with_nanosecond(0).unwrap_or(shifted)
}

fn render_temporal(section: &Section, value: &DateTimeValue, is_1904: bool) -> String {
    let has_fraction = section
        .parts
        .iter()
        .any(|part| matches!(part, Part::Date(DatePart::Fraction(_))));
    let datetime = if has_fraction { value.value } else { round_to_second(value.value) };
    let mut output = String::new();
    for part in &section.parts {
        let Part::Date(date_part) = part else {
            if let Part::Literal(literal) = part {
                output.push_str(literal);
            }
            continue;
        };
        let hour12 = match datetime.hour() % 12 {
            0 => 12,
            hour => hour,
        };
        let hour = if section.twelve_hour { hour12 } else { datetime.hour() };
        let rendered = match date_part {
            DatePart::Year2 => format!("{:02}", datetime.year().rem_euclid(100)),
            DatePart::Year4 => format!("{:04}", datetime.year()),
            DatePart::Month => datetime.month().to_string(),
            DatePart::Month2 => format!("{:02}", datetime.month()),
            DatePart::MonthShort => MONTHS[datetime.month0() as usize][..3].to_owned(),
            DatePart::MonthLong => MONTHS[datetime.month0() as usize].to_owned(),
            DatePart::MonthLetter => MONTHS[datetime.month0() as usize][..1].to_owned(),
            DatePart::Day => datetime.day().to_string(),
            DatePart::Day2 => format!("{:02}", datetime.day()),
            DatePart::DayShort => WEEKDAYS[datetime.weekday().num_days_from_monday() as usize][..3].to_owned(),
            DatePart::DayLong => WEEKDAYS[datetime.weekday().num_days_from_monday() as usize].to_owned(),
            DatePart::Hour(1) => hour.to_string(),
            DatePart::Hour(_) => format!("{:02}", hour),
            DatePart::Minute(1) => datetime.minute().to_string(),
            DatePart::Minute(_) => format!("{:02}", datetime.minute()),
            DatePart::Second(1) => datetime.second().to_string(),
            DatePart::Second(_) => format!("{:02}", datetime.second()),
            DatePart::Elapsed(unit, width) => {
                let seconds = (value.to_serial(is_1904) * 86_400.0).round() as i64;
                let amount = match unit {
                    'h' => seconds / 3_600,
                    'm' => seconds / 60,
                    _ => seconds,
                };
                format!("{:0width$}", amount, width = *width)
            }
            DatePart::Fraction(digits) => {
                let millis = datetime.nanosecond() / 1_000_000;
                let scaled = millis / 10u32.pow(3 - *digits as u32);
                format!("{:0width$}", scaled, width = *digits)
            }
            DatePart::AmPm => (if datetime.hour() < 12 { "AM" } else { "PM" }).to_owned(),
            DatePart::AP => (if datetime.hour() < 12 { "A" } else { "P" }).to_owned(),
        };
        output.push_str(&rendered);
    }
    output
}

fn classify(sections: &[Section]) -> FormatKind {
    let Some(section) = sections.first() else {
        return FormatKind::General;
    };
    if section.temporal {
        let mut has_date = false;
        let mut has_time = false;
        for part in &section.parts {
            match part {
                Part::Date(
                    DatePart::Year2
                    | DatePart::Year4
                    | DatePart::Month
                    | DatePart::Month2
                    | DatePart::MonthShort
                    | DatePart::MonthLong
                    | DatePart::MonthLetter
                    | DatePart::Day
                    | DatePart::Day2
                    | DatePart::DayShort
                    | DatePart::DayLong,
                ) => has_date = true,
                Part::Date(_) => has_time = true,
                _ => (),
            }
        }
        return match (has_date, has_time) {
            (true, true) => FormatKind::DateTime,
            (true, false) => FormatKind::Date,
            _ => FormatKind::Time,
        };
    }
    if section.parts.iter().any(|part| matches!(part, Part::Number(_))) {
        FormatKind::Number
    } else if section.parts.contains(&Part::Text) {
        FormatKind::Text
    } else {
        FormatKind::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTimeValue {
        DateTimeValue {
            value: NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap(),
            kind: TemporalKind::DateTime,
        }
    }

    #[test]
    fn classify_formats() {
        assert_eq!(NumberFormat::parse("General").kind(), FormatKind::General);
        assert_eq!(NumberFormat::parse("0.00").kind(), FormatKind::Number);
        assert_eq!(NumberFormat::parse("@").kind(), FormatKind::Text);
        assert_eq!(NumberFormat::parse("m/d/yyyy").kind(), FormatKind::Date);
        assert_eq!(NumberFormat::parse("h:mm:ss").kind(), FormatKind::Time);
        assert_eq!(NumberFormat::parse("[h]:mm").kind(), FormatKind::Time);
        assert_eq!(NumberFormat::parse("m/d/yyyy h:mm").kind(), FormatKind::DateTime);
        assert_eq!(NumberFormat::parse("\"day\" 0").kind(), FormatKind::Number);
        assert_eq!(NumberFormat::parse("[Red]0.00").kind(), FormatKind::Number);
        assert_eq!(NumberFormat::parse("yyyy-mm-dd;@").kind(), FormatKind::Date);
    }

    #[test]
    fn general_numbers() {
        assert_eq!(general_number(1.0), "1");
        assert_eq!(general_number(-42.0), "-42");
        assert_eq!(general_number(1.5), "1.5");
        assert_eq!(general_number(0.1 + 0.2), "0.3");
        assert_eq!(general_number(f64::NAN), "#NUM!");
    }

    #[test]
    fn fixed_and_grouped_numbers() {
        assert_eq!(NumberFormat::parse("0").format_number(2.5, false), "3");
        assert_eq!(NumberFormat::parse("0.00").format_number(1.5, false), "1.50");
        assert_eq!(NumberFormat::parse("#,##0").format_number(1234567.0, false), "1,234,567");
        assert_eq!(NumberFormat::parse("#,##0.00").format_number(-1234.5, false), "-1,234.50");
        assert_eq!(NumberFormat::parse("0.0#").format_number(3.0, false), "3.0");
        assert_eq!(NumberFormat::parse("0.0#").format_number(3.14159, false), "3.14");
        assert_eq!(NumberFormat::parse("#.##").format_number(0.5, false), ".5");
        assert_eq!(NumberFormat::parse("000").format_number(7.0, false), "007");
        assert_eq!(NumberFormat::parse("#,##0,").format_number(12345.0, false), "12");
    }

    #[test]
    fn percent_scientific_and_literals() {
        assert_eq!(NumberFormat::parse("0%").format_number(0.256, false), "26%");
        assert_eq!(NumberFormat::parse("0.00%").format_number(0.5, false), "50.00%");
        assert_eq!(NumberFormat::parse("0.00E+00").format_number(12345.0, false), "1.23E+04");
        assert_eq!(NumberFormat::parse("0.00E+00").format_number(0.000123, false), "1.23E-04");
        assert_eq!(NumberFormat::parse("\"$\"#,##0.00").format_number(1000.0, false), "$1,000.00");
        assert_eq!(NumberFormat::parse("[$€-407] #,##0").format_number(5.0, false), "€ 5");
        assert_eq!(NumberFormat::parse("0\" units\"").format_number(3.0, false), "3 units");
    }

    #[test]
    fn sections_by_sign() {
        let format = NumberFormat::parse("#,##0.00;(#,##0.00);\"zero\"");
        assert_eq!(format.format_number(5.0, false), "5.00");
        assert_eq!(format.format_number(-5.0, false), "(5.00)");
        assert_eq!(format.format_number(0.0, false), "zero");
        let format = NumberFormat::parse("#,##0 ;[Red](#,##0)");
        assert_eq!(format.format_number(-1200.0, false), "(1,200)");
        assert_eq!(format.format_number(1200.0, false), "1,200 ");
    }

    #[test]
    fn text_sections() {
        assert_eq!(NumberFormat::parse("@").format_text("abc"), "abc");
        assert_eq!(NumberFormat::parse("0;-0;0;\"<\"@\">\"").format_text("abc"), "<abc>");
        assert_eq!(NumberFormat::parse("0.00").format_text("abc"), "abc");
    }

    #[test]
    fn dates_and_times() {
        let value = datetime(2019, 5, 23, 13, 1, 0);
        assert_eq!(NumberFormat::parse("m/d/yyyy h:mm").format_datetime(&value, false), "5/23/2019 13:01");
        assert_eq!(NumberFormat::parse("yyyy-mm-dd").format_datetime(&value, false), "2019-05-23");
        assert_eq!(NumberFormat::parse("d-mmm-yy").format_datetime(&value, false), "23-May-19");
        assert_eq!(NumberFormat::parse("dddd, mmmm d").format_datetime(&value, false), "Thursday, May 23");
        assert_eq!(NumberFormat::parse("h:mm AM/PM").format_datetime(&value, false), "1:01 PM");
        assert_eq!(NumberFormat::parse("hh:mm:ss").format_datetime(&value, false), "13:01:00");
        assert_eq!(NumberFormat::parse("mm:ss").format_datetime(&datetime(2019, 5, 23, 0, 2, 5), false), "02:05");
        assert_eq!(NumberFormat::parse("MM/DD/YYYY").format_datetime(&value, false), "05/23/2019");
    }

    #[test]
    fn serial_numbers_with_date_formats() {
        // 43608.54236111 is 2019-05-23 13:01 in the 1900 date system
        assert_eq!(NumberFormat::parse("m/d/yyyy h:mm").format_number(43608.54236111, false), "5/23/2019 13:01");
        assert_eq!(NumberFormat::parse("[h]:mm").format_number(1.5, false), "36:00");
        assert_eq!(NumberFormat::parse("mm:ss.0").format_number(0.0006, false), "00:51.8");
    }

    #[test]
    fn render_cell_values() {
        let format = NumberFormat::general();
        assert_eq!(format.render(&CellValue::Empty, false), "");
        assert_eq!(format.render(&CellValue::Boolean(true), false), "TRUE");
        assert_eq!(format.render(&CellValue::Number(3.0), false), "3");
        assert_eq!(format.render(&CellValue::Text("x".to_owned()), false), "x");
    }

    #[test]
    fn builtin_codes() {
        assert_eq!(builtin_format_code(14), Some("m/d/yyyy"));
        assert_eq!(builtin_format_code(49), Some("@"));
        assert_eq!(builtin_format_code(5), None);
    }
}
