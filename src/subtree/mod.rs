//! Recursive parent-to-descendants expansion.
//!
//! Hierarchical enum constraints ("under component X") match an item when
//! its value lies anywhere below one of the chosen roots. Expansion is a
//! full synchronous re-walk per resolve - hierarchies are small relative
//! to item counts, so no incremental diffing is attempted.

use crate::model::{Attribute, ItemId, ItemKey};
use crate::store::Reader;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Walk `parent_attr` child queries from `roots` to the full descendant
/// closure, unioned with the roots themselves. Cycle-safe.
#[must_use]
pub fn descendant_closure(
    reader: &dyn Reader,
    parent_attr: &Attribute,
    roots: &[ItemId],
) -> HashSet<ItemId> {
    let mut closure: HashSet<ItemId> = roots.iter().copied().collect();
    let mut frontier: Vec<ItemId> = roots.to_vec();
    while let Some(current) = frontier.pop() {
        for child in reader.children_of(parent_attr, current) {
            if closure.insert(child) {
                frontier.push(child);
            }
        }
    }
    trace!(roots = roots.len(), size = closure.len(), "expanded subtree");
    closure
}

/// A root set whose expansion tracks external hierarchy modifications.
///
/// The owner feeds an externally supplied modification-notification stream
/// into [`notify_modified`](Self::notify_modified); `take_modified`
/// reports (and clears) whether a notification arrived since the last
/// check, which tells a live query to re-resolve. Resolution itself is
/// always a fresh walk against the supplied reader.
#[derive(Debug)]
pub struct SubtreeExpansion {
    parent_attr: Attribute,
    roots: Vec<ItemKey>,
    modified: AtomicBool,
}

impl SubtreeExpansion {
    #[must_use]
    pub fn new(parent_attr: impl Into<Attribute>, roots: Vec<ItemKey>) -> Self {
        Self {
            parent_attr: parent_attr.into(),
            roots,
            modified: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn roots(&self) -> &[ItemKey] {
        &self.roots
    }

    #[must_use]
    pub fn parent_attr(&self) -> &Attribute {
        &self.parent_attr
    }

    /// Record that the hierarchy changed under some root.
    pub fn notify_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    /// Whether a modification arrived since the last call; clears the flag.
    pub fn take_modified(&self) -> bool {
        self.modified.swap(false, Ordering::SeqCst)
    }

    /// Expand against the reader: resolved roots (plus textual ids the
    /// reader can resolve) walked to their descendant closure.
    #[must_use]
    pub fn resolve(&self, reader: &dyn Reader) -> HashSet<ItemId> {
        let root_ids: Vec<ItemId> = self
            .roots
            .iter()
            .filter_map(|key| {
                key.item
                    .or_else(|| reader.find_by_key_id(&key.id))
            })
            .collect();
        descendant_closure(reader, &self.parent_attr, &root_ids)
    }
}
