//! Boolean predicate trees and their point-in-time resolution.
//!
//! A [`Predicate`] is the declarative filter form built by constraint
//! descriptors: AND/OR/NOT nodes over six leaf shapes. Leaves are value
//! types with structural equality and hash, so equivalent branches
//! deduplicate at construction.
//!
//! [`Predicate::resolve`] converts the tree into a [`Resolved`] tree bound
//! to one reader: relative dates become concrete instants, unresolved keys
//! get a last-chance lookup, subtree roots expand to closures. Resolution
//! with a subscription schedules calendar wake-ups for time-dependent
//! leaves; a one-off resolution schedules nothing.

use crate::calendar::{BoundSide, Scheduler, resolve_relative};
use crate::config::Tunables;
use crate::error::Result;
use crate::model::{AttrValue, Attribute, DateValue, ItemId, ItemKey};
use crate::store::{Lifetime, Reader};
use crate::subtree;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A leaf predicate. Structural equality and hash support tree-level
/// deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Leaf {
    /// Attribute value is (or, for multi-value attributes, overlaps or
    /// contains, per `match_all`) one of the given keys.
    InKeySet {
        attr: Attribute,
        keys: Vec<ItemKey>,
        match_all: bool,
    },
    /// Integer attribute within the inclusive range.
    NumberRange {
        attr: Attribute,
        min: Option<i64>,
        max: Option<i64>,
    },
    /// Case-insensitive substring match on a text attribute.
    ContainsText { attr: Attribute, needle: String },
    /// Attribute has no value set.
    IsEmpty { attr: Attribute },
    /// Attribute value lies in the descendant closure of the given roots.
    UnderParent {
        attr: Attribute,
        parent_attr: Attribute,
        roots: Vec<ItemKey>,
    },
    /// One-sided date comparison; relative values resolve at resolution
    /// time against the reader's transaction timestamp.
    DateBound {
        attr: Attribute,
        value: DateValue,
        side: BoundSide,
        /// Also match items with no value when the resolved bound lies in
        /// the future (lower bounds only).
        accept_empty: bool,
    },
}

/// A boolean predicate tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Leaf(Leaf),
}

impl Predicate {
    /// Conjunction; flattens nested ANDs, drops structural duplicates,
    /// and unwraps singletons.
    #[must_use]
    pub fn and(children: impl IntoIterator<Item = Self>) -> Self {
        let flat = Self::flatten(children, |p| match p {
            Self::And(inner) => Ok(inner),
            other => Err(other),
        });
        match flat.len() {
            1 => flat.into_iter().next().unwrap_or(Self::And(Vec::new())),
            _ => Self::And(flat),
        }
    }

    /// Disjunction; flattens nested ORs, drops structural duplicates,
    /// and unwraps singletons.
    #[must_use]
    pub fn or(children: impl IntoIterator<Item = Self>) -> Self {
        let flat = Self::flatten(children, |p| match p {
            Self::Or(inner) => Ok(inner),
            other => Err(other),
        });
        match flat.len() {
            1 => flat.into_iter().next().unwrap_or(Self::Or(Vec::new())),
            _ => Self::Or(flat),
        }
    }

    /// Negation with double-negation elimination.
    #[must_use]
    pub fn not(p: Self) -> Self {
        match p {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    #[must_use]
    pub fn leaf(leaf: Leaf) -> Self {
        Self::Leaf(leaf)
    }

    fn flatten(
        children: impl IntoIterator<Item = Self>,
        split: impl Fn(Self) -> std::result::Result<Vec<Self>, Self>,
    ) -> Vec<Self> {
        let mut flat: Vec<Self> = Vec::new();
        for child in children {
            match split(child) {
                Ok(inner) => {
                    for c in inner {
                        if !flat.contains(&c) {
                            flat.push(c);
                        }
                    }
                }
                Err(other) => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        flat
    }

    /// Resolve against a fixed-point-in-time reader.
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Resolved> {
        match self {
            Self::And(children) => Ok(Resolved::And(
                children
                    .iter()
                    .map(|c| c.resolve(ctx))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Self::Or(children) => Ok(Resolved::Or(
                children
                    .iter()
                    .map(|c| c.resolve(ctx))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Self::Not(inner) => Ok(Resolved::Not(Box::new(inner.resolve(ctx)?))),
            Self::Leaf(leaf) => leaf.resolve(ctx),
        }
    }
}

impl Leaf {
    fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Resolved> {
        match self {
            Self::InKeySet {
                attr,
                keys,
                match_all,
            } => Ok(Resolved::InSet {
                attr: attr.clone(),
                items: resolve_key_handles(ctx.reader, keys),
                match_all: *match_all,
            }),
            Self::NumberRange { attr, min, max } => Ok(Resolved::NumberRange {
                attr: attr.clone(),
                min: *min,
                max: *max,
            }),
            Self::ContainsText { attr, needle } => Ok(Resolved::ContainsText {
                attr: attr.clone(),
                needle_lower: needle.to_lowercase(),
            }),
            Self::IsEmpty { attr } => Ok(Resolved::IsEmpty { attr: attr.clone() }),
            Self::UnderParent {
                attr,
                parent_attr,
                roots,
            } => {
                let root_ids: Vec<ItemId> = resolve_key_handles(ctx.reader, roots)
                    .into_iter()
                    .collect();
                Ok(Resolved::InSet {
                    attr: attr.clone(),
                    items: subtree::descendant_closure(ctx.reader, parent_attr, &root_ids),
                    match_all: false,
                })
            }
            Self::DateBound {
                attr,
                value,
                side,
                accept_empty,
            } => Ok(resolve_date_bound(ctx, attr, *value, *side, *accept_empty)),
        }
    }
}

/// Resolved handles for a key list: existing handles plus a last-chance
/// textual-id lookup against the reader. Keys that stay unresolved match
/// nothing (resolution stays deferred, never an error).
fn resolve_key_handles(reader: &dyn Reader, keys: &[ItemKey]) -> HashSet<ItemId> {
    keys.iter()
        .filter_map(|key| key.item.or_else(|| reader.find_by_key_id(&key.id)))
        .collect()
}

fn resolve_date_bound(
    ctx: &ResolveContext<'_>,
    attr: &Attribute,
    value: DateValue,
    side: BoundSide,
    accept_empty: bool,
) -> Resolved {
    let now = ctx.reader.now();
    let instant = match value {
        DateValue::Absolute(t) => t,
        DateValue::Relative { offset, unit, .. } => {
            let week_start = ctx.tunables.week_start.weekday();
            if let Some(sub) = &ctx.subscription {
                // Truth value changes at the next unit boundary: ask for a
                // wake-up just past it so every clock agrees it has passed.
                let wake_at = unit.next_boundary(now, week_start)
                    + Duration::milliseconds(ctx.tunables.resubscribe_margin_ms);
                sub.schedule_wake(wake_at);
            }
            resolve_relative(offset, unit, now, week_start)
        }
    };

    // Lower bound in the future: items with no value may also match, with
    // a skew margin so a bound right at "now" still counts as future.
    let skew = Duration::milliseconds(ctx.tunables.null_accept_skew_ms);
    let accepts_unset =
        accept_empty && side == BoundSide::After && instant + skew > now;

    match side {
        BoundSide::After => Resolved::DateRange {
            attr: attr.clone(),
            min: Some(instant),
            max: None,
            accept_empty: accepts_unset,
        },
        BoundSide::Before => Resolved::DateRange {
            attr: attr.clone(),
            min: None,
            max: Some(instant),
            accept_empty: false,
        },
    }
}

/// Context for one resolution pass.
pub struct ResolveContext<'a> {
    /// Fixed-point-in-time reader; its `now()` is the resolution clock.
    pub reader: &'a dyn Reader,
    pub tunables: &'a Tunables,
    /// Present for live resolutions; absent for one-off evaluation.
    pub subscription: Option<Subscription<'a>>,
}

impl<'a> ResolveContext<'a> {
    /// One-off evaluation: no wake-ups are scheduled.
    #[must_use]
    pub fn one_off(reader: &'a dyn Reader, tunables: &'a Tunables) -> Self {
        Self {
            reader,
            tunables,
            subscription: None,
        }
    }

    /// Live resolution owned by `lifetime`; time-dependent leaves schedule
    /// re-subscription wake-ups through `scheduler`.
    #[must_use]
    pub fn live(
        reader: &'a dyn Reader,
        tunables: &'a Tunables,
        lifetime: &'a Lifetime,
        scheduler: &'a dyn Scheduler,
        on_wake: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            reader,
            tunables,
            subscription: Some(Subscription {
                lifetime,
                scheduler,
                on_wake,
            }),
        }
    }
}

/// The live half of a [`ResolveContext`].
pub struct Subscription<'a> {
    pub lifetime: &'a Lifetime,
    pub scheduler: &'a dyn Scheduler,
    /// Triggers re-resolution of the owning query; must be cheap.
    pub on_wake: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription<'_> {
    fn schedule_wake(&self, when: DateTime<Utc>) {
        if !self.lifetime.is_alive() {
            return;
        }
        debug!(%when, "scheduling calendar wake-up");
        let on_wake = Arc::clone(&self.on_wake);
        let handle = self
            .scheduler
            .schedule_at(when, Box::new(move || on_wake()));
        // Cancelled automatically when the owning lifetime ends.
        self.lifetime.attach(handle);
    }
}

/// A predicate bound to one reader, ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    And(Vec<Resolved>),
    Or(Vec<Resolved>),
    Not(Box<Resolved>),
    InSet {
        attr: Attribute,
        items: HashSet<ItemId>,
        match_all: bool,
    },
    NumberRange {
        attr: Attribute,
        min: Option<i64>,
        max: Option<i64>,
    },
    ContainsText {
        attr: Attribute,
        needle_lower: String,
    },
    IsEmpty {
        attr: Attribute,
    },
    DateRange {
        attr: Attribute,
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
        accept_empty: bool,
    },
}

impl Resolved {
    /// Evaluate against one item of the same reader the tree was resolved
    /// with.
    #[must_use]
    pub fn matches(&self, reader: &dyn Reader, item: ItemId) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.matches(reader, item)),
            Self::Or(children) => children.iter().any(|c| c.matches(reader, item)),
            Self::Not(inner) => !inner.matches(reader, item),
            Self::InSet {
                attr,
                items,
                match_all,
            } => match reader.attr(item, attr) {
                Some(AttrValue::Ref(id)) => items.contains(&id),
                Some(AttrValue::RefList(list)) => {
                    if *match_all {
                        items.iter().all(|id| list.contains(id))
                    } else {
                        list.iter().any(|id| items.contains(id))
                    }
                }
                _ => false,
            },
            Self::NumberRange { attr, min, max } => match reader.attr(item, attr) {
                Some(AttrValue::Int(n)) => {
                    min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi)
                }
                _ => false,
            },
            Self::ContainsText { attr, needle_lower } => match reader.attr(item, attr) {
                Some(AttrValue::Text(t)) => t.to_lowercase().contains(needle_lower),
                _ => false,
            },
            Self::IsEmpty { attr } => reader
                .attr(item, attr)
                .as_ref()
                .is_none_or(AttrValue::is_empty_value),
            Self::DateRange {
                attr,
                min,
                max,
                accept_empty,
            } => match reader.attr(item, attr) {
                Some(AttrValue::Date(d)) => {
                    min.is_none_or(|lo| d >= lo) && max.is_none_or(|hi| d < hi)
                }
                _ => *accept_empty,
            },
        }
    }

    /// All items of the reader's view matching this predicate.
    ///
    /// Test/diagnostic convenience over [`matches`](Self::matches); the
    /// production query engine owns real evaluation.
    #[must_use]
    pub fn select(&self, reader: &dyn Reader, candidates: &[ItemId]) -> Vec<ItemId> {
        candidates
            .iter()
            .copied()
            .filter(|&item| self.matches(reader, item))
            .collect()
    }
}
