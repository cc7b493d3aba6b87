//! Numeric range constraints.

use super::{Clause, F_EMPTY, F_MAX, F_MIN};
use crate::error::{QueryError, Result};
use crate::formula::{Cursor, Registry, Token};
use crate::model::{Attribute, ConstraintData, FieldValue};
use crate::predicate::{Leaf, Predicate};

pub const OP_AT_LEAST: &str = "atleast";
pub const OP_AT_MOST: &str = "atmost";
pub const OP_BETWEEN: &str = "between";
pub const OP_UNVALUED: &str = "unvalued";

/// Descriptor for an integer attribute.
#[derive(Debug, Clone)]
pub struct NumericDescriptor {
    pub attr: Attribute,
}

impl NumericDescriptor {
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
        let min = data.int(F_MIN);
        let max = data.int(F_MAX);
        if min.is_none() && max.is_none() {
            return None;
        }
        Some(Predicate::leaf(Leaf::NumberRange {
            attr: self.attr.clone(),
            min,
            max,
        }))
    }
}

pub(crate) fn clause(data: &ConstraintData) -> Option<Clause> {
    if data.flag(F_EMPTY) {
        return Some(Clause {
            op: OP_UNVALUED,
            operands: Vec::new(),
        });
    }
    match (data.int(F_MIN), data.int(F_MAX)) {
        (Some(min), Some(max)) => Some(Clause {
            op: OP_BETWEEN,
            operands: vec![min.to_string(), max.to_string()],
        }),
        (Some(min), None) => Some(Clause {
            op: OP_AT_LEAST,
            operands: vec![min.to_string()],
        }),
        (None, Some(max)) => Some(Clause {
            op: OP_AT_MOST,
            operands: vec![max.to_string()],
        }),
        (None, None) => None,
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register(OP_AT_LEAST, |attr, cursor| {
        let token = cursor.take_word("number")?;
        Ok(ConstraintData::new(attr.clone()).with(F_MIN, FieldValue::Int(parse_int(&token)?)))
    });
    registry.register(OP_AT_MOST, |attr, cursor| {
        let token = cursor.take_word("number")?;
        Ok(ConstraintData::new(attr.clone()).with(F_MAX, FieldValue::Int(parse_int(&token)?)))
    });
    registry.register(OP_BETWEEN, |attr, cursor| {
        let operands = cursor.take_exactly(2, "numeric range")?;
        Ok(ConstraintData::new(attr.clone())
            .with(F_MIN, FieldValue::Int(parse_int(&operands[0])?))
            .with(F_MAX, FieldValue::Int(parse_int(&operands[1])?)))
    });
    registry.register(OP_UNVALUED, |attr, _cursor| {
        Ok(ConstraintData::new(attr.clone()).with(F_EMPTY, FieldValue::Flag(true)))
    });
}

fn parse_int(token: &Token) -> Result<i64> {
    token.text.parse().map_err(|_| {
        QueryError::parse(
            token.start,
            token.len,
            format!("invalid number '{}'", token.text),
        )
    })
}

pub(crate) fn same_data(a: &ConstraintData, b: &ConstraintData) -> bool {
    a.int(F_MIN) == b.int(F_MIN)
        && a.int(F_MAX) == b.int(F_MAX)
        && a.flag(F_EMPTY) == b.flag(F_EMPTY)
}

pub(crate) fn suggest_name(data: &ConstraintData) -> Option<String> {
    if data.flag(F_EMPTY) {
        return Some(format!("no {}", data.attribute));
    }
    match (data.int(F_MIN), data.int(F_MAX)) {
        (Some(min), Some(max)) => Some(format!("{min} to {max}")),
        (Some(min), None) => Some(format!("at least {min}")),
        (None, Some(max)) => Some(format!("at most {max}")),
        (None, None) => None,
    }
}
