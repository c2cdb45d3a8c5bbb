use crate::formula::EvalError;
use crate::spreadsheet::reference::parse_reference;

/// A cell position, optionally qualified by a worksheet name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub sheet: Option<String>,
    pub row: u32,
    pub column: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOperator {
    /// Left and right binding powers, lowest first: comparison, `&`, `+ -`,
    /// `* /`, `^`.
    fn binding_power(&self) -> (u8, u8) {
        match self {
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::Less
            | BinaryOperator::LessEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => (1, 2),
            BinaryOperator::Concat => (3, 4),
            BinaryOperator::Add | BinaryOperator::Subtract => (5, 6),
            BinaryOperator::Multiply | BinaryOperator::Divide => (7, 8),
            BinaryOperator::Power => (9, 10),
        }
    }
}

/// Negation binds tighter than `^`, so `-2^2` is 4.
const PREFIX_POWER: u8 = 11;
const PERCENT_POWER: u8 = 13;

/// Longest formula accepted, in characters.
const MAX_LENGTH: usize = 8192;

/// Nested subexpressions plus chained operators allowed in one formula.
const MAX_NESTING: usize = 256;

/// Parsed formula expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error literal such as `#N/A`
    Error(String),
    Reference(Address),
    Range(Address, Address),
    Negate(Box<Expr>),
    Percent(Box<Expr>),
    Binary(BinaryOperator, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Error(String),
    /// Reference or bare name, with an optional sheet prefix
    Name { sheet: Option<String>, name: String },
    Function(String),
    Operator(BinaryOperator),
    Minus,
    Plus,
    Percent,
    Colon,
    Comma,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let c = chars[index];
        match c {
            ' ' | '\t' | '\r' | '\n' => index += 1,
            '0'..='9' | '.' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                    index += 1;
                }
                if index < chars.len() && matches!(chars[index], 'e' | 'E') {
                    let mut end = index + 1;
                    if end < chars.len() && matches!(chars[end], '+' | '-') {
                        end += 1;
                    }
                    if end < chars.len() && chars[end].is_ascii_digit() {
                        index = end;
                        while index < chars.len() && chars[index].is_ascii_digit() {
                            index += 1;
                        }
                    }
                }
                let text: String = chars[start..index].iter().collect();
                let number = text.parse::<f64>().map_err(|_| EvalError::Syntax(expression.to_owned()))?;
                tokens.push(Token::Number(number));
            }
            '"' => {
                let (text, next) = read_quoted(&chars, index, '"').ok_or_else(|| EvalError::Syntax(expression.to_owned()))?;
                tokens.push(Token::Text(text));
                index = next;
            }
            '\'' => {
                let (sheet, next) = read_quoted(&chars, index, '\'').ok_or_else(|| EvalError::Syntax(expression.to_owned()))?;
                if chars.get(next) != Some(&'!') {
                    Err(EvalError::Syntax(expression.to_owned()))?
                }
                let (name, next) = read_name(&chars, next + 1);
                tokens.push(Token::Name {
                    sheet: Some(sheet),
                    name,
                });
                index = next;
            }
            '#' => {
                let start = index;
                index += 1;
                while index < chars.len() && (chars[index].is_ascii_alphanumeric() || matches!(chars[index], '/' | '!' | '?')) {
                    index += 1;
                }
                tokens.push(Token::Error(chars[start..index].iter().collect::<String>().to_ascii_uppercase()));
            }
            c if c.is_alphabetic() || c == '$' || c == '_' => {
                let (name, next) = read_name(&chars, index);
                index = next;
                if chars.get(index) == Some(&'!') {
                    let (reference, next) = read_name(&chars, index + 1);
                    tokens.push(Token::Name {
                        sheet: Some(name),
                        name: reference,
                    });
                    index = next;
                } else if chars.get(index) == Some(&'(') {
                    tokens.push(Token::Function(name.to_ascii_uppercase()));
                } else {
                    tokens.push(Token::Name { sheet: None, name });
                }
            }
            _ => {
                index += 1;
                let next = chars.get(index).copied();
                let token = match (c, next) {
                    ('<', Some('=')) => {
                        index += 1;
                        Token::Operator(BinaryOperator::LessEqual)
                    }
                    ('<', Some('>')) => {
                        index += 1;
                        Token::Operator(BinaryOperator::NotEqual)
                    }
                    ('>', Some('=')) => {
                        index += 1;
                        Token::Operator(BinaryOperator::GreaterEqual)
                    }
                    ('<', _) => Token::Operator(BinaryOperator::Less),
                    ('>', _) => Token::Operator(BinaryOperator::Greater),
                    ('=', _) => Token::Operator(BinaryOperator::Equal),
                    ('*', _) => Token::Operator(BinaryOperator::Multiply),
                    ('/', _) => Token::Operator(BinaryOperator::Divide),
                    ('^', _) => Token::Operator(BinaryOperator::Power),
                    ('&', _) => Token::Operator(BinaryOperator::Concat),
                    ('+', _) => Token::Plus,
                    ('-', _) => Token::Minus,
                    ('%', _) => Token::Percent,
                    (':', _) => Token::Colon,
                    (',', _) | (';', _) => Token::Comma,
                    ('(', _) => Token::Open,
                    (')', _) => Token::Close,
                    _ => Err(EvalError::Syntax(expression.to_owned()))?,
                };
                tokens.push(token);
            }
        }
    }
    Ok(tokens)
}

/// Reads a quoted run starting at `start`; a doubled quote is a literal quote.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut index = start + 1;
    loop {
        match chars.get(index) {
            None => return None,
            Some(&c) if c == quote => {
                if chars.get(index + 1) == Some(&quote) {
                    text.push(quote);
                    index += 2;
                } else {
                    return Some((text, index + 1));
                }
            }
            Some(&c) => {
                text.push(c);
                index += 1;
            }
        }
    }
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut index = start;
    while index < chars.len() && (chars[index].is_alphanumeric() || matches!(chars[index], '$' | '_' | '.')) {
        index += 1;
    }
    (chars[start..index].iter().collect(), index)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn syntax_error(&self) -> EvalError {
        EvalError::Syntax(self.expression.to_owned())
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvalError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            _ => Err(self.syntax_error()),
        }
    }

    fn address(&self, sheet: Option<String>, name: &str) -> Option<Address> {
        let (row, column) = parse_reference(name)?;
        Some(Address { sheet, row, column })
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(EvalError::TooDeep);
        }
        Ok(())
    }

    fn parse_expression(&mut self, min_power: u8) -> Result<Expr, EvalError> {
        let depth = self.depth;
        let expr = self.parse_operators(min_power);
        self.depth = depth;
        expr
    }

    fn parse_operators(&mut self, min_power: u8) -> Result<Expr, EvalError> {
        self.descend()?;
        let mut lhs = self.parse_prefix()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Percent) => {
                    if PERCENT_POWER < min_power {
                        break;
                    }
                    self.advance();
                    self.descend()?;
                    lhs = Expr::Percent(Box::new(lhs));
                    continue;
                }
                Some(Token::Operator(operator)) => *operator,
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Subtract,
                _ => break,
            };
            let (left, right) = operator.binding_power();
            if left < min_power {
                break;
            }
            self.advance();
            self.descend()?;
            let rhs = self.parse_expression(right)?;
            lhs = Expr::Binary(operator, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Number(number)) => Ok(Expr::Number(number)),
            Some(Token::Text(text)) => Ok(Expr::Text(text)),
            Some(Token::Error(code)) => Ok(Expr::Error(code)),
            Some(Token::Minus) => Ok(Expr::Negate(Box::new(self.parse_expression(PREFIX_POWER)?))),
            Some(Token::Plus) => self.parse_expression(PREFIX_POWER),
            Some(Token::Open) => {
                let inner = self.parse_expression(0)?;
                self.expect(Token::Close)?;
                Ok(inner)
            }
            Some(Token::Function(name)) => {
                self.expect(Token::Open)?;
                let mut arguments = Vec::new();
                if self.peek() == Some(&Token::Close) {
                    self.advance();
                    return Ok(Expr::Call(name, arguments));
                }
                loop {
                    arguments.push(self.parse_expression(0)?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::Close) => break,
                        _ => return Err(self.syntax_error()),
                    }
                }
                Ok(Expr::Call(name, arguments))
            }
            Some(Token::Name { sheet, name }) => {
                if sheet.is_none() && name.eq_ignore_ascii_case("TRUE") {
                    return Ok(Expr::Boolean(true));
                }
                if sheet.is_none() && name.eq_ignore_ascii_case("FALSE") {
                    return Ok(Expr::Boolean(false));
                }
                let start = self
                    .address(sheet.to_owned(), &name)
                    .ok_or_else(|| EvalError::Name(name.to_owned()))?;
                if self.peek() != Some(&Token::Colon) {
                    return Ok(Expr::Reference(start));
                }
                self.advance();
                match self.advance() {
                    Some(Token::Name { name: end, .. }) => {
                        let end = self.address(sheet, &end).ok_or(EvalError::Name(end))?;
                        Ok(Expr::Range(start, end))
                    }
                    _ => Err(self.syntax_error()),
                }
            }
            _ => Err(self.syntax_error()),
        }
    }
}

/// Parses a formula expression, with or without its leading `=`.
pub fn parse(expression: &str) -> Result<Expr, EvalError> {
    let source = expression.trim();
    let source = source.strip_prefix('=').unwrap_or(source);
    if source.chars().count() > MAX_LENGTH {
        return Err(EvalError::TooLong);
    }
    let mut parser = Parser {
        expression,
        tokens: tokenize(source)?,
        position: 0,
        depth: 0,
    };
    let expr = parser.parse_expression(0)?;
    if parser.position != parser.tokens.len() {
        return Err(parser.syntax_error());
    }
    Ok(expr)
}
