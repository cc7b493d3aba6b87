//! Formula writer.
//!
//! Emits the textual query language: space-separated tokens, operands
//! quoted when they contain whitespace, quotes, backslashes or
//! parentheses, multi-token right-hand sides parenthesized.

/// Whether an operand needs quoting to survive the tokenizer.
#[must_use]
pub fn needs_quoting(text: &str) -> bool {
    text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '(' | ')'))
}

/// Quote and escape an operand.
#[must_use]
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Operand as written: bare when possible, quoted when necessary.
#[must_use]
pub fn write_operand(text: &str) -> String {
    if needs_quoting(text) {
        quote(text)
    } else {
        text.to_string()
    }
}

/// Re-join fragments so the tokenizer recovers them exactly.
#[must_use]
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    fragments
        .into_iter()
        .map(write_operand)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-stream writer for one or more formula clauses.
#[derive(Debug, Default)]
pub struct FormulaWriter {
    buf: String,
}

impl FormulaWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a literal token (operator, parenthesis) without quoting.
    pub fn raw(&mut self, token: &str) {
        self.separate();
        self.buf.push_str(token);
    }

    /// Append an operand, quoted as needed.
    pub fn operand(&mut self, text: &str) {
        self.separate();
        self.buf.push_str(&write_operand(text));
    }

    /// Append a parenthesized group of operands.
    pub fn group<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) {
        self.raw("(");
        for item in items {
            self.operand(item);
        }
        self.raw(")");
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.buf
    }

    fn separate(&mut self) {
        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
    }
}
