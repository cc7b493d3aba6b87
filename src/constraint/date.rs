//! Date constraints.
//!
//! Four mutually exclusive modes: absolute bound, relative bound
//! (before/after/both), named preset interval, is-empty. A bounded range
//! is the conjunction of its two one-sided bounds; "is empty" negates
//! not-null. The accept mode additionally matches items with no value
//! whenever the only active bound is a lower bound lying in the future at
//! resolution time.

use super::{Clause, F_ACCEPT_EMPTY, F_AFTER, F_BEFORE, F_EMPTY, F_PRESET};
use crate::calendar::{BoundSide, CalendarUnit};
use crate::error::{QueryError, Result};
use crate::formula::{Cursor, Registry, Token};
use crate::model::{Attribute, ConstraintData, DateValue, FieldValue};
use crate::predicate::{Leaf, Predicate};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub const OP_AFTER: &str = "after";
pub const OP_AFTER_OR_UNSET: &str = "after-or-unset";
pub const OP_BEFORE: &str = "before";
pub const OP_WITHIN: &str = "within";
pub const OP_DURING: &str = "during";
pub const OP_UNDATED: &str = "undated";

/// Named calendar-window presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePreset {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
}

impl DatePreset {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "this-week",
            Self::LastWeek => "last-week",
            Self::ThisMonth => "this-month",
            Self::LastMonth => "last-month",
        }
    }

    /// The preset's calendar window as (lower, upper) relative bounds.
    #[must_use]
    pub const fn window(self) -> (DateValue, DateValue) {
        let (unit, back) = match self {
            Self::Today => (CalendarUnit::Day, 0),
            Self::Yesterday => (CalendarUnit::Day, 1),
            Self::ThisWeek => (CalendarUnit::Week, 0),
            Self::LastWeek => (CalendarUnit::Week, 1),
            Self::ThisMonth => (CalendarUnit::Month, 0),
            Self::LastMonth => (CalendarUnit::Month, 1),
        };
        (
            DateValue::Relative {
                offset: -back,
                unit,
                side: BoundSide::After,
            },
            DateValue::Relative {
                offset: 1 - back,
                unit,
                side: BoundSide::Before,
            },
        )
    }
}

impl fmt::Display for DatePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatePreset {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "this-week" => Ok(Self::ThisWeek),
            "last-week" => Ok(Self::LastWeek),
            "this-month" => Ok(Self::ThisMonth),
            "last-month" => Ok(Self::LastMonth),
            other => Err(QueryError::UnknownPreset {
                preset: other.to_string(),
            }),
        }
    }
}

/// Descriptor for a date attribute.
#[derive(Debug, Clone)]
pub struct DateDescriptor {
    pub attr: Attribute,
}

impl DateDescriptor {
    #[must_use]
    pub fn new(attr: impl Into<Attribute>) -> Self {
        Self { attr: attr.into() }
    }

    pub(crate) fn create_filter(&self, data: &ConstraintData) -> Option<Predicate> {
        if data.flag(F_EMPTY) {
            // "Is empty" is negated not-null.
            return Some(Predicate::not(Predicate::not(Predicate::leaf(
                Leaf::IsEmpty {
                    attr: self.attr.clone(),
                },
            ))));
        }

        if let Some(name) = data.text(F_PRESET) {
            let Ok(preset) = name.parse::<DatePreset>() else {
                warn!(preset = name, attr = %self.attr, "ignoring unknown date preset");
                return None;
            };
            let (lower, upper) = preset.window();
            return Some(Predicate::and([
                self.bound(lower, BoundSide::After, false),
                self.bound(upper, BoundSide::Before, false),
            ]));
        }

        let after = data.date(F_AFTER);
        let before = data.date(F_BEFORE);
        let accept_empty = data.flag(F_ACCEPT_EMPTY) && before.is_none();

        let mut arms = Vec::new();
        if let Some(value) = after {
            arms.push(self.bound(value, BoundSide::After, accept_empty));
        }
        if let Some(value) = before {
            arms.push(self.bound(value, BoundSide::Before, false));
        }
        if arms.is_empty() {
            None
        } else {
            Some(Predicate::and(arms))
        }
    }

    fn bound(&self, value: DateValue, side: BoundSide, accept_empty: bool) -> Predicate {
        Predicate::leaf(Leaf::DateBound {
            attr: self.attr.clone(),
            value,
            side,
            accept_empty,
        })
    }
}

static RELATIVE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]\d{1,4})(d|w|mo)$").expect("static regex"));

/// Parse a date operand: `2026-01-15`, RFC3339, or a relative token like
/// `-7d` / `+2w` / `-1mo`.
pub fn parse_date_value(text: &str, side: BoundSide) -> Result<DateValue> {
    if let Some(caps) = RELATIVE_TOKEN.captures(text) {
        let offset: i32 = caps[1]
            .parse()
            .map_err(|_| QueryError::InvalidDate {
                value: text.to_string(),
            })?;
        let unit: CalendarUnit = caps[2].parse()?;
        return Ok(DateValue::Relative { offset, unit, side });
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(DateValue::Absolute(
            Utc.from_utc_datetime(&date.and_time(midnight)),
        ));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(DateValue::Absolute(dt.with_timezone(&Utc)));
    }
    Err(QueryError::InvalidDate {
        value: text.to_string(),
    })
}

/// Format a date value as its operand spelling.
#[must_use]
pub fn format_date_value(value: DateValue) -> String {
    match value {
        DateValue::Relative { offset, unit, .. } => format!("{offset:+}{}", unit.suffix()),
        DateValue::Absolute(t) => {
            if t.time() == NaiveTime::default() && t.nanosecond() == 0 {
                t.format("%Y-%m-%d").to_string()
            } else {
                t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            }
        }
    }
}

pub(crate) fn clause(data: &ConstraintData) -> Option<Clause> {
    if data.flag(F_EMPTY) {
        return Some(Clause {
            op: OP_UNDATED,
            operands: Vec::new(),
        });
    }
    if let Some(preset) = data.text(F_PRESET) {
        return Some(Clause {
            op: OP_DURING,
            operands: vec![preset.to_string()],
        });
    }
    let after = data.date(F_AFTER);
    let before = data.date(F_BEFORE);
    match (after, before) {
        (Some(a), Some(b)) => Some(Clause {
            op: OP_WITHIN,
            operands: vec![format_date_value(a), format_date_value(b)],
        }),
        (Some(a), None) => Some(Clause {
            op: if data.flag(F_ACCEPT_EMPTY) {
                OP_AFTER_OR_UNSET
            } else {
                OP_AFTER
            },
            operands: vec![format_date_value(a)],
        }),
        (None, Some(b)) => Some(Clause {
            op: OP_BEFORE,
            operands: vec![format_date_value(b)],
        }),
        (None, None) => None,
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register(OP_AFTER, |attr, cursor| parse_one_sided(attr, cursor, BoundSide::After, false));
    registry.register(OP_AFTER_OR_UNSET, |attr, cursor| {
        parse_one_sided(attr, cursor, BoundSide::After, true)
    });
    registry.register(OP_BEFORE, |attr, cursor| {
        parse_one_sided(attr, cursor, BoundSide::Before, false)
    });
    registry.register(OP_WITHIN, parse_within);
    registry.register(OP_DURING, parse_during);
    registry.register(OP_UNDATED, |attr, _cursor| {
        Ok(ConstraintData::new(attr.clone()).with(F_EMPTY, FieldValue::Flag(true)))
    });
}

fn parse_one_sided(
    attr: &Attribute,
    cursor: &mut Cursor<'_>,
    side: BoundSide,
    accept_empty: bool,
) -> Result<ConstraintData> {
    let token = cursor.take_word("date value")?;
    let value = parse_date_token(&token, side)?;
    let field = match side {
        BoundSide::After => F_AFTER,
        BoundSide::Before => F_BEFORE,
    };
    let mut data = ConstraintData::new(attr.clone()).with(field, FieldValue::Date(value));
    if accept_empty {
        data = data.with(F_ACCEPT_EMPTY, FieldValue::Flag(true));
    }
    Ok(data)
}

fn parse_within(attr: &Attribute, cursor: &mut Cursor<'_>) -> Result<ConstraintData> {
    let operands = cursor.take_exactly(2, "date range")?;
    let lower = parse_date_token(&operands[0], BoundSide::After)?;
    let upper = parse_date_token(&operands[1], BoundSide::Before)?;
    Ok(ConstraintData::new(attr.clone())
        .with(F_AFTER, FieldValue::Date(lower))
        .with(F_BEFORE, FieldValue::Date(upper)))
}

fn parse_during(attr: &Attribute, cursor: &mut Cursor<'_>) -> Result<ConstraintData> {
    let token = cursor.take_word("preset name")?;
    let preset: DatePreset = token.text.parse().map_err(|_| {
        QueryError::parse(
            token.start,
            token.len,
            format!("unknown date preset '{}'", token.text),
        )
    })?;
    Ok(ConstraintData::new(attr.clone())
        .with(F_PRESET, FieldValue::Text(preset.as_str().to_string())))
}

fn parse_date_token(token: &Token, side: BoundSide) -> Result<DateValue> {
    parse_date_value(&token.text, side).map_err(|_| {
        QueryError::parse(
            token.start,
            token.len,
            format!("invalid date value '{}'", token.text),
        )
    })
}

pub(crate) fn same_data(a: &ConstraintData, b: &ConstraintData) -> bool {
    let effective_accept =
        |d: &ConstraintData| d.flag(F_ACCEPT_EMPTY) && d.date(F_BEFORE).is_none();
    a.date(F_AFTER) == b.date(F_AFTER)
        && a.date(F_BEFORE) == b.date(F_BEFORE)
        && a.text(F_PRESET) == b.text(F_PRESET)
        && a.flag(F_EMPTY) == b.flag(F_EMPTY)
        && effective_accept(a) == effective_accept(b)
}

pub(crate) fn suggest_name(data: &ConstraintData) -> Option<String> {
    if data.flag(F_EMPTY) {
        return Some(format!("no {}", data.attribute));
    }
    if let Some(preset) = data.text(F_PRESET) {
        return Some(preset.replace('-', " "));
    }
    match (data.date(F_AFTER), data.date(F_BEFORE)) {
        (Some(a), Some(b)) => Some(format!(
            "{} to {}",
            format_date_value(a),
            format_date_value(b)
        )),
        (Some(a), None) => Some(format!("after {}", format_date_value(a))),
        (None, Some(b)) => Some(format!("before {}", format_date_value(b))),
        (None, None) => None,
    }
}
