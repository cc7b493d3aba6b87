//! Enum (reference-subset) constraints.
//!
//! The stored subset may hold unresolved keys: saved queries referencing
//! values the client has not seen yet must load without error, so
//! resolution is attempted against the live index at filter-build time
//! and whatever stays unresolved is kept as a marker.

use super::{Clause, F_EMPTY, F_MATCH_ALL, F_SUBSET, F_UNDER};
use crate::config::Tunables;
use crate::formula::{Cursor, Registry};
use crate::hypercube::Hypercube;
use crate::index::KeyIndex;
use crate::model::{Attribute, ConstraintData, FieldValue, ItemId, ItemKey};
use crate::narrow::Narrower;
use crate::predicate::{Leaf, Predicate};
use std::collections::{BTreeSet, HashSet};

pub const OP_IN: &str = "in";
pub const OP_ALL_OF: &str = "allof";
pub const OP_UNDER: &str = "under";
pub const OP_UNSET: &str = "unset";

/// Descriptor for an enumerable reference attribute.
#[derive(Clone)]
pub struct EnumDescriptor {
    pub attr: Attribute,
    /// Live index of the attribute's value type, consulted to resolve
    /// textual ids. Absent in offline contexts; resolution then stays
    /// deferred to predicate-resolution time.
    pub index: Option<KeyIndex>,
    /// Sentinel key standing for "no value set"; a subset entry whose id
    /// matches it contributes an is-empty arm.
    pub missing_key: Option<ItemKey>,
    /// Parent attribute of hierarchical value types; enables the
    /// under-closure mode.
    pub parent_attr: Option<Attribute>,
    /// Narrows the resolved subset to the filter's context.
    pub narrower: Narrower,
}

impl EnumDescriptor {
    #[must_use]
    pub fn new(attr: impl Into<Attribute>) -> Self {
        Self {
            attr: attr.into(),
            index: None,
            missing_key: None,
            parent_attr: None,
            narrower: Narrower::Identity,
        }
    }

    #[must_use]
    pub fn with_index(mut self, index: KeyIndex) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn with_missing_key(mut self, key: ItemKey) -> Self {
        self.missing_key = Some(key);
        self
    }

    #[must_use]
    pub fn with_parent_attr(mut self, attr: impl Into<Attribute>) -> Self {
        self.parent_attr = Some(attr.into());
        self
    }

    #[must_use]
    pub fn with_narrower(mut self, narrower: Narrower) -> Self {
        self.narrower = narrower;
        self
    }

    pub(crate) fn create_filter(
        &self,
        data: &ConstraintData,
        cube: &Hypercube,
    ) -> Option<Predicate> {
        if data.flag(F_EMPTY) {
            return Some(Predicate::leaf(Leaf::IsEmpty {
                attr: self.attr.clone(),
            }));
        }

        let subset = data.refs(F_SUBSET);
        if subset.is_empty() {
            return None;
        }

        let resolved: Vec<ItemKey> = subset.iter().map(|key| self.resolve_entry(key)).collect();
        let deduped = dedup_subset(&resolved);
        let narrowed = self.narrower.narrow(&deduped, cube);

        let (sentinels, members): (Vec<ItemKey>, Vec<ItemKey>) = narrowed
            .into_iter()
            .partition(|key| self.is_missing_sentinel(key));

        let mut arms = Vec::new();
        if !members.is_empty() {
            let leaf = match (&self.parent_attr, data.flag(F_UNDER)) {
                (Some(parent_attr), true) => Leaf::UnderParent {
                    attr: self.attr.clone(),
                    parent_attr: parent_attr.clone(),
                    roots: members,
                },
                _ => Leaf::InKeySet {
                    attr: self.attr.clone(),
                    keys: members,
                    match_all: data.flag(F_MATCH_ALL),
                },
            };
            arms.push(Predicate::leaf(leaf));
        }
        if !sentinels.is_empty() {
            arms.push(Predicate::leaf(Leaf::IsEmpty {
                attr: self.attr.clone(),
            }));
        }

        if arms.is_empty() {
            None
        } else {
            Some(Predicate::or(arms))
        }
    }

    /// Resolve one subset entry: missing-sentinel substitution first, then
    /// a live-index lookup by textual id; unresolvable entries stay as
    /// unresolved markers rather than failing.
    fn resolve_entry(&self, key: &ItemKey) -> ItemKey {
        if key.is_resolved() {
            return key.clone();
        }
        if let Some(missing) = &self.missing_key {
            if key.id == missing.id {
                return missing.clone();
            }
        }
        if let Some(index) = &self.index {
            if let Some(hit) = index.find_by_id(&key.id).into_iter().next() {
                return hit;
            }
        }
        key.clone()
    }

    fn is_missing_sentinel(&self, key: &ItemKey) -> bool {
        self.missing_key
            .as_ref()
            .is_some_and(|missing| missing.id == key.id)
    }
}

/// Subset deduplication, scanning left to right:
/// - a resolved key is kept only if no earlier result already carries its
///   handle
/// - an unresolved key is dropped when an earlier result already covers
///   its textual id; otherwise, if a later entry of the original list is
///   resolved to the same identity with an as-yet-unused handle, that
///   later entry is substituted in its place; otherwise it is kept as an
///   unresolved marker
pub(crate) fn dedup_subset(keys: &[ItemKey]) -> Vec<ItemKey> {
    let mut result: Vec<ItemKey> = Vec::new();
    let mut used: HashSet<ItemId> = HashSet::new();

    for (i, key) in keys.iter().enumerate() {
        match key.item {
            Some(handle) => {
                if used.insert(handle) {
                    result.push(key.clone());
                }
            }
            None => {
                if result.iter().any(|earlier| earlier.id == key.id) {
                    continue;
                }
                let substitute = keys[i + 1..].iter().find(|later| {
                    later.id == key.id
                        && later.item.is_some_and(|handle| !used.contains(&handle))
                });
                if let Some(later) = substitute {
                    if let Some(handle) = later.item {
                        used.insert(handle);
                    }
                    result.push(later.clone());
                } else {
                    result.push(key.clone());
                }
            }
        }
    }
    result
}

pub(crate) fn clause(data: &ConstraintData) -> Option<Clause> {
    if data.flag(F_EMPTY) {
        return Some(Clause {
            op: OP_UNSET,
            operands: Vec::new(),
        });
    }
    let subset = data.refs(F_SUBSET);
    if subset.is_empty() {
        return None;
    }
    let op = if data.flag(F_UNDER) {
        OP_UNDER
    } else if data.flag(F_MATCH_ALL) {
        OP_ALL_OF
    } else {
        OP_IN
    };
    Some(Clause {
        op,
        operands: subset.iter().map(|key| key.id.clone()).collect(),
    })
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register(OP_IN, |attr, cursor| parse_subset(attr, cursor, false, false));
    registry.register(OP_ALL_OF, |attr, cursor| parse_subset(attr, cursor, true, false));
    registry.register(OP_UNDER, |attr, cursor| parse_subset(attr, cursor, false, true));
    registry.register(OP_UNSET, |attr, _cursor| {
        Ok(ConstraintData::new(attr.clone()).with(F_EMPTY, FieldValue::Flag(true)))
    });
}

fn parse_subset(
    attr: &Attribute,
    cursor: &mut Cursor<'_>,
    match_all: bool,
    under: bool,
) -> crate::error::Result<ConstraintData> {
    let operands = cursor.take_operands("reference id")?;
    let keys: Vec<ItemKey> = operands
        .iter()
        .map(|token| ItemKey::unresolved(&token.text))
        .collect();
    let mut data =
        ConstraintData::new(attr.clone()).with(F_SUBSET, FieldValue::Refs(keys));
    if match_all {
        data = data.with(F_MATCH_ALL, FieldValue::Flag(true));
    }
    if under {
        data = data.with(F_UNDER, FieldValue::Flag(true));
    }
    Ok(data)
}

pub(crate) fn same_data(a: &ConstraintData, b: &ConstraintData) -> bool {
    let ids = |d: &ConstraintData| -> BTreeSet<String> {
        d.refs(F_SUBSET).iter().map(|key| key.id.clone()).collect()
    };
    ids(a) == ids(b)
        && a.flag(F_EMPTY) == b.flag(F_EMPTY)
        && a.flag(F_UNDER) == b.flag(F_UNDER)
        && a.flag(F_MATCH_ALL) == b.flag(F_MATCH_ALL)
}

pub(crate) fn suggest_name(data: &ConstraintData, tunables: &Tunables) -> Option<String> {
    if data.flag(F_EMPTY) {
        return Some(format!("no {}", data.attribute));
    }
    let subset = data.refs(F_SUBSET);
    if subset.is_empty() || subset.len() > tunables.name_suggest_max {
        return None;
    }
    Some(
        subset
            .iter()
            .map(|key| key.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

pub(crate) fn editor_seed(data: &ConstraintData) -> ConstraintData {
    if data.get(F_SUBSET).is_some() {
        data.clone()
    } else {
        data.clone().with(F_SUBSET, FieldValue::Refs(Vec::new()))
    }
}
