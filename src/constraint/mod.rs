//! Constraint descriptors.
//!
//! A descriptor turns a persisted [`ConstraintData`] record into:
//! - a boolean predicate tree (`create_filter`)
//! - a legacy flat clause for the old engine (`legacy_constraint`)
//! - formula text (`write_formula`, with a registered parse as inverse)
//! - semantic equality (`is_same_data`) and a suggested display name
//!
//! The four variants are a closed sum so dedup/compare logic enumerates
//! every shape exhaustively.

pub mod date;
pub mod numeric;
pub mod refset;
pub mod text;

pub use date::{DateDescriptor, DatePreset};
pub use numeric::NumericDescriptor;
pub use refset::EnumDescriptor;
pub use text::TextDescriptor;

use crate::config::Tunables;
use crate::formula::{FormulaWriter, Registry};
use crate::hypercube::Hypercube;
use crate::model::{Attribute, ConstraintData};
use crate::predicate::Predicate;
use serde::Serialize;

// === Constraint-data field names ===
//
// The persisted record is a named-field value map; these are the names
// the descriptors and formula parsers agree on.

/// Reference list: the chosen subset (enum).
pub const F_SUBSET: &str = "subset";
/// Flag: expand the subset to its descendant closure (enum).
pub const F_UNDER: &str = "under";
/// Flag: multi-value attributes must contain every chosen value.
pub const F_MATCH_ALL: &str = "match_all";
/// Flag: match items with no value set.
pub const F_EMPTY: &str = "empty";
/// Date: lower bound.
pub const F_AFTER: &str = "after";
/// Date: upper bound.
pub const F_BEFORE: &str = "before";
/// Text: named preset interval (date).
pub const F_PRESET: &str = "preset";
/// Flag: a future lower bound also accepts items with no value (date).
pub const F_ACCEPT_EMPTY: &str = "accept_empty";
/// Text: free search text.
pub const F_TEXT: &str = "text";
/// Int: lower numeric bound, inclusive.
pub const F_MIN: &str = "min";
/// Int: upper numeric bound, inclusive.
pub const F_MAX: &str = "max";

/// Flat clause form consumed by the legacy constraint engine: the same
/// operator literals and operand spellings as the formula, unparsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyConstraint {
    pub attribute: Attribute,
    pub op: String,
    pub operands: Vec<String>,
}

/// One formula clause before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Clause {
    pub op: &'static str,
    pub operands: Vec<String>,
}

/// A constraint descriptor variant.
#[derive(Clone)]
pub enum Descriptor {
    Enum(EnumDescriptor),
    Date(DateDescriptor),
    Numeric(NumericDescriptor),
    Text(TextDescriptor),
}

impl Descriptor {
    /// The constrained attribute.
    #[must_use]
    pub fn attr(&self) -> &Attribute {
        match self {
            Self::Enum(d) => &d.attr,
            Self::Date(d) => &d.attr,
            Self::Numeric(d) => &d.attr,
            Self::Text(d) => &d.attr,
        }
    }

    /// Build the predicate tree for the data under the given narrowing
    /// context. `None` means the record carries no effective constraint.
    #[must_use]
    pub fn create_filter(&self, data: &ConstraintData, cube: &Hypercube) -> Option<Predicate> {
        match self {
            Self::Enum(d) => d.create_filter(data, cube),
            Self::Date(d) => d.create_filter(data),
            Self::Numeric(d) => d.create_filter(data),
            Self::Text(d) => d.create_filter(data),
        }
    }

    /// Build the flat clause form for the legacy engine.
    #[must_use]
    pub fn legacy_constraint(&self, data: &ConstraintData) -> Option<LegacyConstraint> {
        self.clause(data).map(|clause| LegacyConstraint {
            attribute: data.attribute.clone(),
            op: clause.op.to_string(),
            operands: clause.operands,
        })
    }

    /// Append the formula clause for the data; writes nothing when the
    /// record carries no effective constraint.
    pub fn write_formula(&self, writer: &mut FormulaWriter, data: &ConstraintData) {
        let Some(clause) = self.clause(data) else {
            return;
        };
        writer.operand(data.attribute.as_str());
        writer.raw(clause.op);
        match clause.operands.len() {
            0 => {}
            1 => writer.operand(&clause.operands[0]),
            _ => writer.group(clause.operands.iter().map(String::as_str)),
        }
    }

    /// One-clause formula text.
    #[must_use]
    pub fn formula(&self, data: &ConstraintData) -> String {
        let mut writer = FormulaWriter::new();
        self.write_formula(&mut writer, data);
        writer.finish()
    }

    /// Semantic equality: set-equality for reference lists (by textual
    /// id), fragment-equality for search text, ephemeral fields ignored.
    #[must_use]
    pub fn is_same_data(&self, a: &ConstraintData, b: &ConstraintData) -> bool {
        if a.attribute != b.attribute {
            return false;
        }
        match self {
            Self::Enum(_) => refset::same_data(a, b),
            Self::Date(_) => date::same_data(a, b),
            Self::Numeric(_) => numeric::same_data(a, b),
            Self::Text(_) => text::same_data(a, b),
        }
    }

    /// A short display name for the criteria; `None` when the data cannot
    /// be summarized (callers fall back to a generic label).
    #[must_use]
    pub fn suggest_name(&self, data: &ConstraintData, tunables: &Tunables) -> Option<String> {
        match self {
            Self::Enum(_) => refset::suggest_name(data, tunables),
            Self::Date(_) => date::suggest_name(data),
            Self::Numeric(_) => numeric::suggest_name(data),
            Self::Text(_) => text::suggest_name(data),
        }
    }

    /// The editable record handed to the editor boundary: a copy with the
    /// variant's fields present so widgets bind to stable names.
    #[must_use]
    pub fn editor_seed(&self, data: &ConstraintData) -> ConstraintData {
        match self {
            Self::Enum(_) => refset::editor_seed(data),
            Self::Date(_) | Self::Numeric(_) => data.clone(),
            Self::Text(_) => text::editor_seed(data),
        }
    }

    fn clause(&self, data: &ConstraintData) -> Option<Clause> {
        match self {
            Self::Enum(_) => refset::clause(data),
            Self::Date(_) => date::clause(data),
            Self::Numeric(_) => numeric::clause(data),
            Self::Text(_) => text::clause(data),
        }
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Enum(_) => "enum",
            Self::Date(_) => "date",
            Self::Numeric(_) => "numeric",
            Self::Text(_) => "text",
        };
        write!(f, "Descriptor::{kind}({})", self.attr())
    }
}

/// Register every built-in constraint type's operator tokens.
pub fn register_standard_ops(registry: &mut Registry) {
    refset::register(registry);
    date::register(registry);
    numeric::register(registry);
    text::register(registry);
}
