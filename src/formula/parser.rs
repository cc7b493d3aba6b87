//! Registry-based formula parser.
//!
//! Constraint types register literal operator tokens; parsing a clause
//! reads `attribute operator rhs` and dispatches on the operator. All
//! failures are positioned: the error carries the byte offset and span of
//! the offending token.

use super::token::{Token, TokenKind, scan};
use crate::error::{QueryError, Result};
use crate::model::{Attribute, ConstraintData};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Operator parse hook: consumes the clause's right-hand side.
pub type ParseOp = fn(&Attribute, &mut Cursor<'_>) -> Result<ConstraintData>;

/// Operator token registry.
#[derive(Default)]
pub struct Registry {
    ops: HashMap<&'static str, ParseOp>,
}

static STANDARD: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::new();
    crate::constraint::register_standard_ops(&mut registry);
    registry
});

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in constraint type registered.
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Register a literal operator token.
    ///
    /// Later registrations of the same token win; constraint types own
    /// disjoint token sets so this never triggers in practice.
    pub fn register(&mut self, token: &'static str, op: ParseOp) {
        self.ops.insert(token, op);
    }

    #[must_use]
    pub fn knows(&self, token: &str) -> bool {
        self.ops.contains_key(token)
    }

    /// Parse formula text into constraint-data records, left to right.
    pub fn parse(&self, input: &str) -> Result<Vec<ConstraintData>> {
        let tokens = scan(input)?;
        let mut cursor = Cursor::new(&tokens, input.len());
        let mut records = Vec::new();
        while !cursor.at_end() {
            let attr_token = cursor.take_word("attribute")?;
            let attr = Attribute::new(&attr_token.text);
            let op_token = cursor.take_word("operator")?;
            let Some(op) = self.ops.get(op_token.text.as_str()) else {
                return Err(QueryError::UnknownOperator {
                    token: op_token.text,
                    position: op_token.start,
                });
            };
            records.push(op(&attr, &mut cursor)?);
        }
        Ok(records)
    }
}

/// Parse with the standard registry.
pub fn parse(input: &str) -> Result<Vec<ConstraintData>> {
    Registry::standard().parse(input)
}

/// Token cursor handed to operator parse hooks.
pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    input_len: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn new(tokens: &'a [Token], input_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            input_len,
        }
    }

    #[must_use]
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    /// Next token, which must be a bare or quoted word.
    pub fn take_word(&mut self, what: &str) -> Result<Token> {
        match self.peek() {
            Some(token) if token.is_word() => {
                self.pos += 1;
                Ok(token.clone())
            }
            Some(token) => Err(QueryError::parse(
                token.start,
                token.len,
                format!("expected {what}, found '{}'", token.text),
            )),
            None => Err(QueryError::parse(
                self.input_len,
                0,
                format!("expected {what}, found end of input"),
            )),
        }
    }

    /// Right-hand side: either a single word or a parenthesized group of
    /// words. A group may be empty.
    pub fn take_operands(&mut self, what: &str) -> Result<Vec<Token>> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Open => {
                let open = token.clone();
                self.pos += 1;
                let mut operands = Vec::new();
                loop {
                    match self.peek() {
                        Some(token) if token.kind == TokenKind::Close => {
                            self.pos += 1;
                            return Ok(operands);
                        }
                        Some(token) if token.is_word() => {
                            operands.push(token.clone());
                            self.pos += 1;
                        }
                        Some(token) => {
                            return Err(QueryError::parse(
                                token.start,
                                token.len,
                                "nested groups are not supported",
                            ));
                        }
                        None => {
                            return Err(QueryError::parse(
                                open.start,
                                open.len,
                                "unclosed group",
                            ));
                        }
                    }
                }
            }
            _ => Ok(vec![self.take_word(what)?]),
        }
    }

    /// A group of exactly `n` operands (or a single word when `n == 1`).
    pub fn take_exactly(&mut self, n: usize, what: &str) -> Result<Vec<Token>> {
        let operands = self.take_operands(what)?;
        if operands.len() == n {
            Ok(operands)
        } else {
            let position = operands
                .first()
                .map_or(self.input_len, |token| token.start);
            Err(QueryError::parse(
                position,
                0,
                format!("expected {n} operand(s) for {what}, found {}", operands.len()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_operator_is_positioned() {
        let err = parse("status near open").unwrap_err();
        match err {
            QueryError::UnknownOperator { token, position } => {
                assert_eq!(token, "near");
                assert_eq!(position, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_operator_reports_end_of_input() {
        let err = parse("status").unwrap_err();
        match err {
            QueryError::Parse { position, .. } => assert_eq!(position, 6),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn clause_cannot_start_with_group() {
        let err = parse("( status )").unwrap_err();
        assert!(matches!(err, QueryError::Parse { position: 0, .. }));
    }

    #[test]
    fn multiple_clauses_parse_left_to_right() {
        let records = parse("status in open assignee in (alice bob)").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attribute, Attribute::new("status"));
        assert_eq!(records[1].attribute, Attribute::new("assignee"));
    }
}
