//! Free-text substring constraints.
//!
//! Search text splits into fragments on whitespace, respecting
//! double-quote grouping and backslash escapes; empty fragments are
//! discarded. The match-all flag selects conjunction over disjunction of
//! the per-fragment substring leaves.

use super::{Clause, F_EMPTY, F_MATCH_ALL, F_TEXT};
use crate::formula::{Cursor, Registry, join_fragments, split_fragments};
use crate::model::{Attribute, ConstraintData, FieldValue};
use crate::predicate::{Leaf, Predicate};

pub const OP_HAS: &str = "has";
pub const OP_HAS_ALL: &str = "hasall";
pub const OP_BLANK: &str = "blank";

/// Descriptor for a free-text attribute.
#[derive(Debug, Clone)]
pub struct TextDescriptor {
    pub attr: Attribute,
}

impl TextDescriptor {
    #[must_use]
    pub fn new(attr: impl Into<Attribute>) -> Self {
        Self { attr: attr.into() }
    }

    pub(crate) fn create_filter(&self, data: &ConstraintData) -> Option<Predicate> {
        if data.flag(F_EMPTY) {
            return Some(Predicate::leaf(Leaf::IsEmpty {
                attr: self.attr.clone(),
            }));
        }
        let fragments = split_fragments(data.text(F_TEXT).unwrap_or_default());
        if fragments.is_empty() {
            return None;
        }
        let leaves = fragments.into_iter().map(|needle| {
            Predicate::leaf(Leaf::ContainsText {
                attr: self.attr.clone(),
                needle,
            })
        });
        if data.flag(F_MATCH_ALL) {
            Some(Predicate::and(leaves))
        } else {
            Some(Predicate::or(leaves))
        }
    }
}

pub(crate) fn clause(data: &ConstraintData) -> Option<Clause> {
    if data.flag(F_EMPTY) {
        return Some(Clause {
            op: OP_BLANK,
            operands: Vec::new(),
        });
    }
    let fragments = split_fragments(data.text(F_TEXT).unwrap_or_default());
    if fragments.is_empty() {
        return None;
    }
    Some(Clause {
        op: if data.flag(F_MATCH_ALL) {
            OP_HAS_ALL
        } else {
            OP_HAS
        },
        operands: fragments,
    })
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register(OP_HAS, |attr, cursor| parse_text(attr, cursor, false));
    registry.register(OP_HAS_ALL, |attr, cursor| parse_text(attr, cursor, true));
    registry.register(OP_BLANK, |attr, _cursor| {
        Ok(ConstraintData::new(attr.clone()).with(F_EMPTY, FieldValue::Flag(true)))
    });
}

fn parse_text(
    attr: &Attribute,
    cursor: &mut Cursor<'_>,
    match_all: bool,
) -> crate::error::Result<ConstraintData> {
    let operands = cursor.take_operands("search text")?;
    let text = join_fragments(operands.iter().map(|token| token.text.as_str()));
    let mut data = ConstraintData::new(attr.clone()).with(F_TEXT, FieldValue::Text(text));
    if match_all {
        data = data.with(F_MATCH_ALL, FieldValue::Flag(true));
    }
    Ok(data)
}

/// Fragment-level comparison: raw text differing only in whitespace or
/// quoting counts as the same criteria.
pub(crate) fn same_data(a: &ConstraintData, b: &ConstraintData) -> bool {
    split_fragments(a.text(F_TEXT).unwrap_or_default())
        == split_fragments(b.text(F_TEXT).unwrap_or_default())
        && a.flag(F_MATCH_ALL) == b.flag(F_MATCH_ALL)
        && a.flag(F_EMPTY) == b.flag(F_EMPTY)
}

pub(crate) fn suggest_name(data: &ConstraintData) -> Option<String> {
    if data.flag(F_EMPTY) {
        return Some(format!("no {}", data.attribute));
    }
    let fragments = split_fragments(data.text(F_TEXT).unwrap_or_default());
    if fragments.is_empty() {
        None
    } else {
        Some(fragments.join(" "))
    }
}

pub(crate) fn editor_seed(data: &ConstraintData) -> ConstraintData {
    if data.get(F_TEXT).is_some() {
        data.clone()
    } else {
        data.clone().with(F_TEXT, FieldValue::Text(String::new()))
    }
}
