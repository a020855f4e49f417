//! Recursive-descent parser for the query language.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! comma   := pipe (',' pipe)*
//! pipe    := postfix ('|' postfix)*
//! postfix := primary ('.' name | '.' string | '[' index ']' | '?')*
//! primary := '.' | '..' | '.' name | '.' string | '.[' index ']'
//!          | '(' comma ')' | '{' fields '}' | literal
//! ```

use super::expr::QueryExpr;
use crate::core::errors::{Result, ScanError};
use crate::core::value::Value;

/// Parse query text into an expression.
pub fn parse(input: &str) -> Result<QueryExpr> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_comma()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(expr),
        Some(c) => Err(parser.error(format!("unexpected character '{c}'"))),
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, details: impl Into<String>) -> ScanError {
        ScanError::QuerySyntax {
            position: self.pos,
            details: details.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == expected => {
                self.next();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn parse_comma(&mut self) -> Result<QueryExpr> {
        let mut expr = self.parse_pipe()?;
        self.skip_ws();
        while self.peek() == Some(',') {
            self.next();
            let right = self.parse_pipe()?;
            expr = QueryExpr::Comma(Box::new(expr), Box::new(right));
            self.skip_ws();
        }
        Ok(expr)
    }

    fn parse_pipe(&mut self) -> Result<QueryExpr> {
        let mut expr = self.parse_postfix()?;
        self.skip_ws();
        while self.peek() == Some('|') {
            self.next();
            let right = self.parse_postfix()?;
            expr = QueryExpr::Pipe(Box::new(expr), Box::new(right));
            self.skip_ws();
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<QueryExpr> {
        let mut chain = vec![self.parse_primary()?];
        loop {
            self.skip_ws();
            match self.peek() {
                Some('?') => {
                    self.next();
                    let last = chain.pop().unwrap_or(QueryExpr::Identity);
                    chain.push(QueryExpr::Optional(Box::new(last)));
                }
                Some('[') => chain.push(self.parse_bracket()?),
                Some('.') if self.peek_second() != Some('.') => {
                    self.next();
                    let step = match self.peek() {
                        Some('[') => self.parse_bracket()?,
                        Some('"') => QueryExpr::Field(self.parse_string()?),
                        _ => QueryExpr::Field(self.parse_ident()?),
                    };
                    chain.push(step);
                }
                _ => break,
            }
        }
        Ok(QueryExpr::chain(chain))
    }

    fn parse_primary(&mut self) -> Result<QueryExpr> {
        self.skip_ws();
        match self.peek() {
            Some('.') => {
                self.next();
                match self.peek() {
                    Some('.') => {
                        self.next();
                        Ok(QueryExpr::RecursiveDescent)
                    }
                    Some('[') => self.parse_bracket(),
                    Some('"') => Ok(QueryExpr::Field(self.parse_string()?)),
                    Some(c) if is_ident_start(c) => Ok(QueryExpr::Field(self.parse_ident()?)),
                    _ => Ok(QueryExpr::Identity),
                }
            }
            Some('(') => {
                self.next();
                let inner = self.parse_comma()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some('{') => self.parse_object(),
            Some('"') => Ok(QueryExpr::Literal(Value::String(self.parse_string()?))),
            Some(c) if c.is_ascii_digit() || c == '-' => {
                Ok(QueryExpr::Literal(self.parse_number()?))
            }
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                let word = self.parse_ident()?;
                match word.as_str() {
                    "null" => Ok(QueryExpr::Literal(Value::Null)),
                    "true" => Ok(QueryExpr::Literal(Value::Bool(true))),
                    "false" => Ok(QueryExpr::Literal(Value::Bool(false))),
                    _ => {
                        self.pos = start;
                        Err(self.error(format!("unsupported keyword or function '{word}'")))
                    }
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}', expected expression"))),
            None => Err(self.error("unexpected end of input, expected expression")),
        }
    }

    /// `[` already peeked: `[]`, `[n]` or `["name"]`.
    fn parse_bracket(&mut self) -> Result<QueryExpr> {
        self.expect('[')?;
        self.skip_ws();
        let expr = match self.peek() {
            Some(']') => QueryExpr::Iterate,
            Some('"') => QueryExpr::Field(self.parse_string()?),
            Some(c) if c.is_ascii_digit() || c == '-' => match self.parse_number()? {
                Value::Integer(i) => QueryExpr::Index(i),
                // Out of range for any sequence.
                Value::Unsigned(_) => QueryExpr::Index(i64::MAX),
                _ => return Err(self.error("index must be an integer")),
            },
            Some(c) => return Err(self.error(format!("unexpected character '{c}' in index"))),
            None => return Err(self.error("unterminated index")),
        };
        self.expect(']')?;
        Ok(expr)
    }

    fn parse_object(&mut self) -> Result<QueryExpr> {
        self.expect('{')?;
        let mut fields = Vec::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.next();
            return Ok(QueryExpr::Object(fields));
        }

        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some('"') => self.parse_string()?,
                Some(c) if is_ident_start(c) => self.parse_ident()?,
                Some(c) => return Err(self.error(format!("expected object key, found '{c}'"))),
                None => return Err(self.error("expected object key, found end of input")),
            };
            self.skip_ws();
            // `{name}` is shorthand for `{name: .name}`
            let value = if self.peek() == Some(':') {
                self.next();
                self.parse_pipe()?
            } else {
                QueryExpr::Field(key.clone())
            };
            fields.push((key, value));

            self.skip_ws();
            match self.next() {
                Some(',') => {}
                Some('}') => return Ok(QueryExpr::Object(fields)),
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.error(format!("expected ',' or '}}', found '{c}'")));
                }
                None => return Err(self.error("expected ',' or '}' , found end of input")),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                self.next();
            }
            Some(c) => return Err(self.error(format!("expected identifier, found '{c}'"))),
            None => return Err(self.error("expected identifier, found end of input")),
        }
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.next();
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// JSON-style string literal, including escapes.
    fn parse_string(&mut self) -> Result<String> {
        let start = self.pos;
        self.expect('"')?;
        let mut escaped = false;
        loop {
            match self.next() {
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
                Some('\\') if !escaped => escaped = true,
                Some('"') if !escaped => break,
                Some(_) => escaped = false,
            }
        }
        serde_json::from_str::<String>(&self.input[start..self.pos]).map_err(|err| {
            ScanError::QuerySyntax {
                position: start,
                details: format!("invalid string literal: {err}"),
            }
        })
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.next();
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+'))
        {
            // `-` only inside an exponent
            self.next();
            if matches!(self.input[..self.pos].chars().last(), Some('e' | 'E'))
                && self.peek() == Some('-')
            {
                self.next();
            }
        }
        let text = &self.input[start..self.pos];
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
        if let Ok(u) = text.parse::<u64>() {
            return Ok(Value::Unsigned(u));
        }
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && text != "-")
            .map(Value::Float)
            .ok_or_else(|| ScanError::QuerySyntax {
                position: start,
                details: format!("invalid number '{text}'"),
            })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}
