//! Core data types for `spindle_query`.
//!
//! This module defines the fundamental types used throughout the crate:
//! - `ItemId` - stable integer handle of a store item
//! - `SourceId` - tag of the connection/source an item belongs to
//! - `Attribute` - name of an item attribute
//! - `AttrValue` - attribute values as stored
//! - `ItemKey` - a reference value, resolved or not
//! - `DateValue` - absolute or calendar-relative date
//! - `ConstraintData` - the persisted filter criteria record

use crate::calendar::{BoundSide, CalendarUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable integer handle of a store item. Valid handles are positive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl ItemId {
    /// Whether this is a usable handle (matched against the store).
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of the source (connection) an item belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of an item attribute ("status", "due", "parent", ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attribute(String);

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An attribute value as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Date(DateTime<Utc>),
    Ref(ItemId),
    RefList(Vec<ItemId>),
}

impl AttrValue {
    /// Whether this value counts as "no value set" for is-empty predicates.
    #[must_use]
    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Text(t) => t.is_empty(),
            Self::RefList(refs) => refs.is_empty(),
            Self::Int(_) | Self::Date(_) | Self::Ref(_) => false,
        }
    }
}

/// A reference value with deferred resolution.
///
/// Keys are created unresolved from user input or persisted formulas and
/// matched against the store later; the resolved handle is runtime state
/// and never serialized.
///
/// Equality: two resolved keys compare by resolved handle; two unresolved
/// keys compare by textual id; a resolved and an unresolved key are never
/// equal (the enum dedup pass bridges the two explicitly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemKey {
    /// Stable textual id (e.g. "alice", "backend", "v2.1").
    pub id: String,

    /// Resolved store handle, present once matched.
    #[serde(skip)]
    pub item: Option<ItemId>,

    /// Human-readable name for display and name suggestion.
    pub display_name: String,

    /// Owning source, if the value belongs to one connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceId>,
}

impl ItemKey {
    /// An unresolved key from a textual id; display falls back to the id.
    #[must_use]
    pub fn unresolved(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            item: None,
            source: None,
        }
    }

    /// A key already matched against the store.
    #[must_use]
    pub fn resolved(id: impl Into<String>, item: ItemId, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item: Some(item),
            display_name: display_name.into(),
            source: None,
        }
    }

    /// Attach an owning source.
    #[must_use]
    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.item.is_some()
    }

    /// Full field-wise comparison, used by the live index to distinguish
    /// content-equal updates (skipped) from stale entries (replaced).
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.item == other.item
            && self.display_name == other.display_name
            && self.source == other.source
    }
}

impl PartialEq for ItemKey {
    fn eq(&self, other: &Self) -> bool {
        match (self.item, other.item) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.id == other.id,
            _ => false,
        }
    }
}

impl Eq for ItemKey {}

impl Hash for ItemKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.item {
            Some(item) => {
                true.hash(state);
                item.hash(state);
            }
            None => {
                false.hash(state);
                self.id.hash(state);
            }
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

/// A point on an axis of a [`Hypercube`](crate::hypercube::Hypercube).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisValue {
    Item(ItemId),
    Source(SourceId),
    Text(String),
}

/// A date criterion, absolute or calendar-relative.
///
/// Relative values are resolved to a concrete instant only at
/// predicate-resolution time, against the evaluating reader's transaction
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateValue {
    Absolute(DateTime<Utc>),
    Relative {
        /// Units forward from "now"; negative reaches into the past.
        offset: i32,
        unit: CalendarUnit,
        side: BoundSide,
    },
}

impl DateValue {
    /// A relative value `n` units in the past.
    #[must_use]
    pub const fn back(n: i32, unit: CalendarUnit, side: BoundSide) -> Self {
        Self::Relative {
            offset: -n,
            unit,
            side,
        }
    }

    #[must_use]
    pub const fn is_relative(&self) -> bool {
        matches!(self, Self::Relative { .. })
    }
}

/// A single field of a [`ConstraintData`] record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Flag(bool),
    Date(DateValue),
    Refs(Vec<ItemKey>),
}

/// Persisted filter criteria: an immutable, named-field value record.
///
/// Fully reconstructable from the textual formula and vice versa. Field
/// names are the `data::F_*` constants in the `constraint` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintData {
    /// The constrained item attribute.
    pub attribute: Attribute,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, FieldValue>,
}

impl ConstraintData {
    #[must_use]
    pub fn new(attribute: impl Into<Attribute>) -> Self {
        Self {
            attribute: attribute.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(FieldValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn int(&self, field: &str) -> Option<i64> {
        match self.fields.get(field) {
            Some(FieldValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Missing flags read as false.
    #[must_use]
    pub fn flag(&self, field: &str) -> bool {
        matches!(self.fields.get(field), Some(FieldValue::Flag(true)))
    }

    #[must_use]
    pub fn date(&self, field: &str) -> Option<DateValue> {
        match self.fields.get(field) {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    /// Reference list field; missing reads as empty.
    #[must_use]
    pub fn refs(&self, field: &str) -> &[ItemKey] {
        match self.fields.get(field) {
            Some(FieldValue::Refs(keys)) => keys,
            _ => &[],
        }
    }

    /// Iterate fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_keys_compare_by_handle() {
        let a = ItemKey::resolved("alice", ItemId(5), "Alice");
        let b = ItemKey::resolved("renamed", ItemId(5), "Alicia");
        assert_eq!(a, b);

        let c = ItemKey::resolved("alice", ItemId(6), "Alice");
        assert_ne!(a, c);
    }

    #[test]
    fn unresolved_keys_compare_by_id() {
        let a = ItemKey::unresolved("alice");
        let b = ItemKey::unresolved("alice");
        let c = ItemKey::unresolved("bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn mixed_resolution_never_equal() {
        let resolved = ItemKey::resolved("alice", ItemId(5), "Alice");
        let unresolved = ItemKey::unresolved("alice");
        assert_ne!(resolved, unresolved);
    }

    #[test]
    fn same_content_sees_display_changes() {
        let a = ItemKey::resolved("alice", ItemId(5), "Alice");
        let b = ItemKey::resolved("alice", ItemId(5), "Alice B.");
        assert_eq!(a, b); // identity-equal
        assert!(!a.same_content(&b)); // not content-equal
    }

    #[test]
    fn item_key_serialization_skips_handle() {
        let key = ItemKey::resolved("alice", ItemId(5), "Alice");
        let json = serde_json::to_string(&key).unwrap();
        assert!(!json.contains("item"));
        let back: ItemKey = serde_json::from_str(&json).unwrap();
        assert!(!back.is_resolved());
        assert_eq!(back.id, "alice");
        assert_eq!(back.display_name, "Alice");
    }

    #[test]
    fn constraint_data_field_access() {
        let data = ConstraintData::new("status")
            .with("subset", FieldValue::Refs(vec![ItemKey::unresolved("open")]))
            .with("match_all", FieldValue::Flag(true))
            .with("min", FieldValue::Int(3));

        assert_eq!(data.refs("subset").len(), 1);
        assert!(data.flag("match_all"));
        assert!(!data.flag("empty"));
        assert_eq!(data.int("min"), Some(3));
        assert_eq!(data.int("max"), None);
    }

    #[test]
    fn constraint_data_roundtrip() {
        let data = ConstraintData::new("assignee")
            .with(
                "subset",
                FieldValue::Refs(vec![
                    ItemKey::unresolved("alice"),
                    ItemKey::unresolved("bob"),
                ]),
            )
            .with("empty", FieldValue::Flag(false));

        let json = serde_json::to_string(&data).unwrap();
        let back: ConstraintData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn attr_value_emptiness() {
        assert!(AttrValue::Text(String::new()).is_empty_value());
        assert!(AttrValue::RefList(vec![]).is_empty_value());
        assert!(!AttrValue::Int(0).is_empty_value());
        assert!(!AttrValue::Ref(ItemId(1)).is_empty_value());
    }
}
