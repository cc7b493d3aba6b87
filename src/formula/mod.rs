//! Formula codec: the textual query language.
//!
//! The writer and the registry-based parser are left-inverses of each
//! other per constraint type: `parse(write(data))` yields data the owning
//! descriptor accepts as same-data. See `constraint` for the operator
//! table.

pub mod parser;
pub mod token;
pub mod writer;

pub use parser::{Cursor, ParseOp, Registry, parse};
pub use token::{Token, TokenKind, scan, split_fragments};
pub use writer::{FormulaWriter, join_fragments, needs_quoting, quote, write_operand};
