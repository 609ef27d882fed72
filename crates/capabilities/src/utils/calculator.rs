//! `calculate`: evaluates mathematical expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `^` and `**` (right-associative power),
//! postfix `%`, parentheses, unary signs, the functions listed in
//! [`call_function`], the constants `pi` and `e`, and the phrase
//! "X% of Y". Uses a recursive-descent parser.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use switchboard_core::protocol::ServiceError;
use tracing::debug;

use super::format_number;
use crate::capability::{Capability, required_str};

pub struct CalculateCapability;

#[async_trait]
impl Capability for CalculateCapability {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression exactly. Supports +, -, *, /, ^ or ** (power), \
         % (percent), parentheses, sqrt, abs, sin, cos, tan, ln, log, log10, log2, exp, floor, \
         ceil, round, pow, the constants pi and e, and phrases like '15% of 289.99'."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. 'sqrt(16) + 5^2'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ServiceError> {
        let expression = required_str(&arguments, "expression")?;
        debug!(expression, "Evaluating expression");

        if let Some((percent, of)) = percent_of(expression) {
            let result = of * percent / 100.0;
            return Ok(Value::String(format!(
                "Result: {}% of {} = {result:.2}",
                format_number(percent, 10),
                format_number(of, 10)
            )));
        }

        let value = evaluate(expression)?;
        Ok(Value::String(format!(
            "Result: {expression} = {}",
            format_number(value, 10)
        )))
    }
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Syntax(String),
    DivisionByZero,
    Math(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "Invalid expression syntax: {msg}"),
            Self::DivisionByZero => write!(f, "Division by zero"),
            Self::Math(msg) => write!(f, "Math error: {msg}"),
        }
    }
}

impl From<EvalError> for ServiceError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::Syntax(_) => ServiceError::invalid_arguments(e.to_string()),
            _ => ServiceError::failed(e.to_string()),
        }
    }
}

/// Matches `<number> % of <number>` anywhere in the input.
fn percent_of(expression: &str) -> Option<(f64, f64)> {
    let lower = expression.to_lowercase();
    for (at, _) in lower.match_indices('%') {
        let before = lower[..at].trim_end();
        let start = before
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map_or(0, |i| i + 1);
        let Ok(percent) = before[start..].parse::<f64>() else {
            continue;
        };

        let Some(rest) = lower[at + 1..].trim_start().strip_prefix("of") else {
            continue;
        };
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if let Ok(of) = rest[..end].parse::<f64>() {
            return Some((percent, of));
        }
    }
    None
}

// ── Recursive-descent expression evaluator ────────────────────────────────

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, EvalError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(EvalError::Syntax(format!(
            "unexpected token at position {}: {tok}",
            parser.pos
        )));
    }
    if !result.is_finite() {
        return Err(EvalError::Math("result is not a finite number".into()));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Comma,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Caret => write!(f, "^"),
            Self::Percent => write!(f, "%"),
            Self::Comma => write!(f, ","),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' if chars.get(i + 1) == Some(&'*') => { tokens.push(Token::Caret); i += 2; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '^' => { tokens.push(Token::Caret); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| EvalError::Syntax(format!("invalid number: {num_str}")))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(ident.to_lowercase()));
            }
            c => return Err(EvalError::Syntax(format!("invalid character '{c}'"))),
        }
    }

    Ok(tokens)
}

/// Deepest nesting of parentheses, signs and exponents accepted.
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvalError> {
        match self.consume() {
            Some(tok) if *tok == expected => Ok(()),
            Some(tok) => Err(EvalError::Syntax(format!("expected '{expected}', found '{tok}'"))),
            None => Err(EvalError::Syntax(format!("expected '{expected}'"))),
        }
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, EvalError> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<f64, EvalError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    left /= right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | power
    // Every recursive rule passes through here, so this bounds the stack.
    fn parse_unary(&mut self) -> Result<f64, EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::Syntax(format!(
                "expression is nested more than {MAX_DEPTH} levels deep"
            )));
        }
        let value = self.parse_signed();
        self.depth -= 1;
        value
    }

    fn parse_signed(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power = postfix ('^' unary)?
    // The exponent recurses through unary, so `2^3^2` is `2^(3^2)` and
    // `-2^2` is `-(2^2)`.
    fn parse_power(&mut self) -> Result<f64, EvalError> {
        let base = self.parse_postfix()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            if base == 0.0 && exponent < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // postfix = primary '%'*
    fn parse_postfix(&mut self) -> Result<f64, EvalError> {
        let mut value = self.parse_primary()?;
        while let Some(Token::Percent) = self.peek() {
            self.consume();
            value /= 100.0;
        }
        Ok(value)
    }

    // primary = NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, EvalError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(val)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let args = self.parse_args()?;
                    return call_function(name, &args);
                }
                match name.as_str() {
                    "pi" => Ok(std::f64::consts::PI),
                    "e" => Ok(std::f64::consts::E),
                    _ => Err(EvalError::Syntax(format!("unknown name '{name}'"))),
                }
            }
            Some(tok) => Err(EvalError::Syntax(format!("unexpected token '{tok}'"))),
            None => Err(EvalError::Syntax("unexpected end of expression".into())),
        }
    }

    // args = expr (',' expr)* ')'
    fn parse_args(&mut self) -> Result<Vec<f64>, EvalError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(EvalError::Syntax("expected ',' or ')' in argument list".into())),
            }
        }
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(EvalError::Syntax(format!(
                "{name}() takes {n} argument(s), got {}",
                args.len()
            )))
        }
    };
    let positive = |x: f64| {
        if x > 0.0 {
            Ok(x)
        } else {
            Err(EvalError::Math(format!("{name}() of a non-positive number")))
        }
    };

    match name {
        "sqrt" => {
            arity(1)?;
            if args[0] < 0.0 {
                return Err(EvalError::Math("sqrt() of a negative number".into()));
            }
            Ok(args[0].sqrt())
        }
        "abs" => arity(1).map(|_| args[0].abs()),
        "sin" => arity(1).map(|_| args[0].sin()),
        "cos" => arity(1).map(|_| args[0].cos()),
        "tan" => arity(1).map(|_| args[0].tan()),
        "exp" => arity(1).map(|_| args[0].exp()),
        "floor" => arity(1).map(|_| args[0].floor()),
        "ceil" => arity(1).map(|_| args[0].ceil()),
        "ln" => {
            arity(1)?;
            Ok(positive(args[0])?.ln())
        }
        "log" => match args {
            [x] => Ok(positive(*x)?.ln()),
            [x, base] => Ok(positive(*x)?.ln() / positive(*base)?.ln()),
            _ => Err(EvalError::Syntax("log() takes 1 or 2 arguments".into())),
        },
        "log10" => {
            arity(1)?;
            Ok(positive(args[0])?.log10())
        }
        "log2" => {
            arity(1)?;
            Ok(positive(args[0])?.log2())
        }
        "round" => match args {
            [x] => Ok(x.round()),
            [x, digits] => {
                let scale = 10f64.powi(*digits as i32);
                Ok((x * scale).round() / scale)
            }
            _ => Err(EvalError::Syntax("round() takes 1 or 2 arguments".into())),
        },
        "pow" => {
            arity(2)?;
            Ok(args[0].powf(args[1]))
        }
        _ => Err(EvalError::Syntax(format!("unknown function '{name}'"))),
    }
}
