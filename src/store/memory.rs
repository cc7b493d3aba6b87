//! In-memory reference store.
//!
//! `MemStore` implements the `store` traits over plain collections with
//! per-transaction change batches delivered synchronously on the mutating
//! thread (the delivery context). It exists for tests, doc examples and
//! benches - it is not a production storage engine.

use super::{ChangeBatch, ChangeSink, ItemFilter, ItemStore, Lifetime, Reader};
use crate::error::Result;
use crate::model::{AttrValue, Attribute, ItemId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Attrs = BTreeMap<Attribute, AttrValue>;

#[derive(Debug, Clone)]
struct StoreState {
    items: BTreeMap<ItemId, Attrs>,
    now: DateTime<Utc>,
    next_id: i64,
}

struct Subscription {
    lifetime: Lifetime,
    filter: ItemFilter,
    sink: Arc<dyn ChangeSink>,
}

/// In-memory transactional item store with live-query subscriptions.
pub struct MemStore {
    state: Mutex<StoreState>,
    subs: Mutex<Vec<Arc<Subscription>>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                items: BTreeMap::new(),
                now: Utc::now(),
                next_id: 1,
            }),
            subs: Mutex::new(Vec::new()),
        }
    }

    /// Pin the store clock for deterministic tests.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock_state().now = now;
    }

    /// Advance the store clock.
    pub fn advance(&self, by: chrono::Duration) {
        let mut state = self.lock_state();
        state.now += by;
    }

    /// Run one transaction. All mutations form a single change batch
    /// dispatched to live subscriptions before this method returns.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Txn<'_>) -> R) -> R {
        let (result, before, after) = {
            let mut state = self.lock_state();
            let before = state.clone();
            let mut txn = Txn {
                state: &mut state,
                removed: Vec::new(),
                touched: Vec::new(),
            };
            let result = f(&mut txn);
            let Txn {
                removed, touched, ..
            } = txn;
            (result, before, (removed, touched, state.clone()))
        };

        let (removed, touched, after_state) = after;
        if removed.is_empty() && touched.is_empty() {
            return result;
        }

        let old_reader = MemReader {
            items: before.items,
            now: before.now,
        };
        let new_reader = MemReader {
            items: after_state.items,
            now: after_state.now,
        };
        self.dispatch(&removed, &touched, &old_reader, &new_reader);
        result
    }

    fn dispatch(
        &self,
        removed: &[ItemId],
        touched: &[ItemId],
        old_reader: &MemReader,
        new_reader: &MemReader,
    ) {
        let subs: Vec<Arc<Subscription>> = {
            let mut subs = self
                .subs
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subs.retain(|sub| sub.lifetime.is_alive());
            subs.clone()
        };

        for sub in subs {
            let mut batch = ChangeBatch::default();
            for &item in removed {
                if sub.filter.matches(old_reader, item) {
                    batch.removed.push(item);
                }
            }
            for &item in touched {
                let was_in = sub.filter.matches(old_reader, item);
                let is_in = sub.filter.matches(new_reader, item);
                match (was_in, is_in) {
                    (_, true) => batch.touched.push(item),
                    (true, false) => batch.removed.push(item),
                    (false, false) => {}
                }
            }
            if !batch.is_empty() {
                debug!(
                    removed = batch.removed.len(),
                    touched = batch.touched.len(),
                    "dispatching change batch"
                );
                sub.sink.on_change(&batch, new_reader);
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ItemStore for MemStore {
    fn snapshot(&self) -> Box<dyn Reader> {
        let state = self.lock_state();
        Box::new(MemReader {
            items: state.items.clone(),
            now: state.now,
        })
    }

    fn subscribe(
        &self,
        lifetime: &Lifetime,
        filter: ItemFilter,
        sink: Arc<dyn ChangeSink>,
    ) -> Result<()> {
        let reader = {
            let state = self.lock_state();
            MemReader {
                items: state.items.clone(),
                now: state.now,
            }
        };
        // Initial full scan: one batch covering everything that matches,
        // delivered before any incremental batch.
        let initial = ChangeBatch {
            removed: Vec::new(),
            touched: reader
                .items
                .keys()
                .copied()
                .filter(|&item| filter.matches(&reader, item))
                .collect(),
        };
        debug!(matched = initial.touched.len(), "initial scan batch");
        sink.on_change(&initial, &reader);

        let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
        subs.push(Arc::new(Subscription {
            lifetime: lifetime.clone(),
            filter,
            sink,
        }));
        Ok(())
    }
}

/// One open transaction against a [`MemStore`].
pub struct Txn<'a> {
    state: &'a mut StoreState,
    removed: Vec<ItemId>,
    touched: Vec<ItemId>,
}

impl Txn<'_> {
    /// Insert a new item with a fresh handle.
    pub fn put(&mut self, attrs: impl IntoIterator<Item = (Attribute, AttrValue)>) -> ItemId {
        let id = ItemId(self.state.next_id);
        self.state.next_id += 1;
        self.state.items.insert(id, attrs.into_iter().collect());
        self.touched.push(id);
        id
    }

    /// Set one attribute on an existing item.
    pub fn set_attr(&mut self, item: ItemId, attr: impl Into<Attribute>, value: AttrValue) {
        if let Some(attrs) = self.state.items.get_mut(&item) {
            attrs.insert(attr.into(), value);
            self.touched.push(item);
        }
    }

    /// Clear one attribute on an existing item.
    pub fn clear_attr(&mut self, item: ItemId, attr: &Attribute) {
        if let Some(attrs) = self.state.items.get_mut(&item) {
            attrs.remove(attr);
            self.touched.push(item);
        }
    }

    /// Remove an item entirely.
    pub fn remove(&mut self, item: ItemId) {
        if self.state.items.remove(&item).is_some() {
            self.removed.push(item);
        }
    }

    /// The transaction's timestamp.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.state.now
    }
}

/// Snapshot reader over a cloned item map.
#[derive(Debug, Clone)]
pub struct MemReader {
    items: BTreeMap<ItemId, Attrs>,
    now: DateTime<Utc>,
}

impl Reader for MemReader {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn contains(&self, item: ItemId) -> bool {
        self.items.contains_key(&item)
    }

    fn attr(&self, item: ItemId, attr: &Attribute) -> Option<AttrValue> {
        self.items.get(&item).and_then(|attrs| attrs.get(attr)).cloned()
    }

    fn children_of(&self, parent_attr: &Attribute, parent: ItemId) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|(_, attrs)| attrs.get(parent_attr) == Some(&AttrValue::Ref(parent)))
            .map(|(&id, _)| id)
            .collect()
    }

    fn find_by_key_id(&self, id: &str) -> Option<ItemId> {
        let key_attr = Attribute::new("key");
        self.items
            .iter()
            .find(|(_, attrs)| {
                matches!(attrs.get(&key_attr), Some(AttrValue::Text(t)) if t == id)
            })
            .map(|(&item, _)| item)
    }
}
