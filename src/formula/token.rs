//! Formula tokenizer.
//!
//! Tokens split on whitespace. Double quotes group; a backslash escapes a
//! quote or a backslash (any other escaped character keeps its backslash).
//! Parentheses are structural single-character tokens outside quotes.
//! Empty fragments are discarded.

use crate::error::{QueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Open,
    Close,
}

/// One token with its source span for positioned errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub start: usize,
    /// Byte length of the token in the source.
    pub len: usize,
    /// Whether any part of the token was quoted.
    pub quoted: bool,
}

impl Token {
    #[must_use]
    pub const fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Word)
    }
}

/// Tokenize formula text. Fails with a positioned error on an unterminated
/// quote.
pub fn scan(input: &str) -> Result<Vec<Token>> {
    scan_impl(input, true)
}

/// Split free text into fragments with the same quote/escape rules, but
/// without structural parentheses. Never fails: an unterminated quote
/// groups to the end of input.
#[must_use]
pub fn split_fragments(input: &str) -> Vec<String> {
    // Lenient mode cannot produce errors.
    scan_impl(input, false)
        .unwrap_or_default()
        .into_iter()
        .map(|token| token.text)
        .collect()
}

fn scan_impl(input: &str, structural_parens: bool) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if structural_parens && (c == '(' || c == ')') {
            chars.next();
            tokens.push(Token {
                text: c.to_string(),
                kind: if c == '(' { TokenKind::Open } else { TokenKind::Close },
                start,
                len: c.len_utf8(),
                quoted: false,
            });
            continue;
        }

        let mut text = String::new();
        let mut quoted = false;
        let mut in_quotes = false;
        let mut quote_start = start;
        let mut end = start;

        while let Some(&(pos, c)) = chars.peek() {
            if in_quotes {
                match c {
                    '"' => {
                        in_quotes = false;
                        chars.next();
                    }
                    '\\' => {
                        chars.next();
                        end = consume_escape(&mut chars, &mut text, pos);
                        continue;
                    }
                    _ => {
                        text.push(c);
                        chars.next();
                    }
                }
                end = pos + c.len_utf8();
                continue;
            }
            if c.is_whitespace() || (structural_parens && (c == '(' || c == ')')) {
                break;
            }
            match c {
                '"' => {
                    in_quotes = true;
                    quoted = true;
                    quote_start = pos;
                    chars.next();
                    end = pos + 1;
                }
                '\\' => {
                    chars.next();
                    end = consume_escape(&mut chars, &mut text, pos);
                }
                _ => {
                    text.push(c);
                    chars.next();
                    end = pos + c.len_utf8();
                }
            }
        }

        // Lenient mode lets an open quote group to end of input.
        if in_quotes && structural_parens {
            return Err(QueryError::parse(quote_start, 1, "unterminated quote"));
        }

        // Empty fragments are discarded, quoted or not.
        if !text.is_empty() {
            tokens.push(Token {
                text,
                kind: TokenKind::Word,
                start,
                len: end - start,
                quoted,
            });
        }
    }

    Ok(tokens)
}

/// Consume the character after a backslash. Quote and backslash lose the
/// backslash; anything else keeps it.
fn consume_escape(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    text: &mut String,
    backslash_pos: usize,
) -> usize {
    match chars.peek().copied() {
        Some((pos, next)) => {
            if next == '"' || next == '\\' {
                text.push(next);
            } else {
                text.push('\\');
                text.push(next);
            }
            chars.next();
            pos + next.len_utf8()
        }
        None => {
            // Trailing backslash stays literal.
            text.push('\\');
            backslash_pos + 1
        }
    }
}
