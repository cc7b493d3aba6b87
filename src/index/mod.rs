//! Live resolution index.
//!
//! A [`KeyIndex`] maintains the resolved keys of one item type, fed by a
//! live store subscription:
//! - arena keyed by stable item id (single source of truth for keys)
//! - derived stable-position ordered list powering value pickers
//! - derived textual-id multimap for name lookup
//!
//! Readers (`find`, `snapshot`, `resolve_one`) are safe from any thread;
//! the single internal lock is only ever held for bounded map operations,
//! never across store-touching resolution. Change batches are applied
//! whole: observers see one atomic update per originating transaction and
//! never a partial batch.

use crate::error::{QueryError, Result};
use crate::model::{ItemId, ItemKey};
use crate::store::{ChangeBatch, ChangeSink, ItemFilter, ItemStore, KeyShape, Lifetime, Reader};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// One atomic observer update, covering a whole change batch.
///
/// Positions are list positions at the time the mutation applied;
/// removals are reported in descending position order, before additions.
#[derive(Debug, Clone, Default)]
pub struct IndexUpdate {
    pub removed: Vec<(usize, ItemKey)>,
    pub added: Vec<(usize, ItemKey)>,
    pub replaced: Vec<(usize, ItemKey, ItemKey)>,
}

impl IndexUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.replaced.is_empty()
    }
}

/// Observer of index updates.
pub trait IndexListener: Send + Sync {
    fn on_update(&self, update: &IndexUpdate);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    NotStarted,
    Scanning,
    Complete,
}

#[derive(Default)]
struct IndexState {
    arena: HashMap<ItemId, ItemKey>,
    order: Vec<ItemId>,
    by_id: HashMap<String, Vec<ItemId>>,
}

impl IndexState {
    fn insert_new(&mut self, item: ItemId, key: ItemKey) -> usize {
        let pos = self.order.len();
        self.order.push(item);
        self.by_id.entry(key.id.clone()).or_default().push(item);
        self.arena.insert(item, key);
        pos
    }

    fn drop_name(&mut self, textual_id: &str, item: ItemId) {
        if let Some(items) = self.by_id.get_mut(textual_id) {
            items.retain(|&i| i != item);
            if items.is_empty() {
                self.by_id.remove(textual_id);
            }
        }
    }
}

struct IndexInner {
    shape: Box<dyn KeyShape>,
    state: Mutex<IndexState>,
    scan: Mutex<ScanState>,
    scan_cv: Condvar,
    listeners: Mutex<Vec<Arc<dyn IndexListener>>>,
}

/// Incrementally maintained index of resolved keys for one item type.
#[derive(Clone)]
pub struct KeyIndex {
    inner: Arc<IndexInner>,
}

impl KeyIndex {
    #[must_use]
    pub fn new(shape: impl KeyShape + 'static) -> Self {
        Self {
            inner: Arc::new(IndexInner {
                shape: Box::new(shape),
                state: Mutex::new(IndexState::default()),
                scan: Mutex::new(ScanState::NotStarted),
                scan_cv: Condvar::new(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open the live query feeding this index.
    ///
    /// The store delivers the initial full scan as the first batch;
    /// delivery stops when `lifetime` ends. Entries outlive any single
    /// query - an ended subscription leaves the cache intact.
    pub fn subscribe(
        &self,
        lifetime: &Lifetime,
        store: &dyn ItemStore,
        filter: ItemFilter,
        listener: Option<Arc<dyn IndexListener>>,
    ) -> Result<()> {
        if let Some(listener) = listener {
            self.add_listener(listener);
        }
        {
            let mut scan = self.lock_scan();
            if *scan == ScanState::NotStarted {
                *scan = ScanState::Scanning;
            }
        }
        let sink: Arc<dyn ChangeSink> = Arc::new(IndexSink {
            inner: Arc::clone(&self.inner),
        });
        store.subscribe(lifetime, filter, sink)
    }

    /// Register an additional observer.
    pub fn add_listener(&self, listener: Arc<dyn IndexListener>) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Cached key for an item, if resolved before.
    #[must_use]
    pub fn find(&self, item: ItemId) -> Option<ItemKey> {
        self.lock_state().arena.get(&item).cloned()
    }

    /// Keys matching a textual id (several sources may share one id).
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Vec<ItemKey> {
        let state = self.lock_state();
        state
            .by_id
            .get(id)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| state.arena.get(item).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The observable collection in stable order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ItemKey> {
        let state = self.lock_state();
        state
            .order
            .iter()
            .filter_map(|item| state.arena.get(item).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().order.is_empty()
    }

    /// Resolve one item synchronously and cache the result.
    ///
    /// The internal lock is released while the resolution touches the
    /// store; a concurrent delivery may win the insert, in which case its
    /// entry stays.
    pub fn resolve_one(&self, reader: &dyn Reader, item: ItemId) -> Result<ItemKey> {
        if let Some(key) = self.find(item) {
            return Ok(key);
        }
        let key = self.inner.shape.resolve_key(reader, item)?;
        let mut state = self.lock_state();
        if let Some(existing) = state.arena.get(&item) {
            return Ok(existing.clone());
        }
        state.insert_new(item, key.clone());
        Ok(key)
    }

    /// Block until the first full scan has been applied.
    ///
    /// Caller contract: must not be invoked from the delivery context -
    /// the scan completes on that context, so waiting there deadlocks.
    pub fn await_initial_scan(&self) {
        let mut scan = self.lock_scan();
        while *scan != ScanState::Complete {
            scan = self
                .inner
                .scan_cv
                .wait(scan)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, IndexState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_scan(&self) -> MutexGuard<'_, ScanState> {
        self.inner
            .scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct IndexSink {
    inner: Arc<IndexInner>,
}

impl ChangeSink for IndexSink {
    fn on_change(&self, batch: &ChangeBatch, reader: &dyn Reader) {
        self.inner.apply_batch(batch, reader);
    }
}

impl IndexInner {
    fn apply_batch(&self, batch: &ChangeBatch, reader: &dyn Reader) {
        // Resolve outside the state lock: resolution touches the store.
        let mut resolved: Vec<(ItemId, ItemKey)> = Vec::with_capacity(batch.touched.len());
        for &item in &batch.touched {
            match self.shape.resolve_key(reader, item) {
                Ok(key) => resolved.push((item, key)),
                Err(err) => {
                    // Skip the one item; the rest of the batch proceeds.
                    warn!(item = item.0, %err, "skipping unresolvable item");
                }
            }
        }

        let update = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut update = IndexUpdate::default();

            // Queued removals, applied as one descending-position pass
            // before any addition so untouched positions stay stable.
            let mut removals: Vec<(usize, ItemId)> = batch
                .removed
                .iter()
                .filter_map(|id| {
                    state
                        .order
                        .iter()
                        .position(|entry| entry == id)
                        .map(|pos| (pos, *id))
                })
                .collect();
            removals.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            for (pos, item) in removals {
                state.order.remove(pos);
                if let Some(old) = state.arena.remove(&item) {
                    state.drop_name(&old.id, item);
                    update.removed.push((pos, old));
                }
            }

            for (item, new_key) in resolved {
                let existing = state.arena.get(&item).cloned();
                match existing {
                    None => {
                        let pos = state.insert_new(item, new_key.clone());
                        update.added.push((pos, new_key));
                    }
                    // Content-equal: nothing to do, not even a notification.
                    Some(old) if old.same_content(&new_key) => {}
                    Some(old) => {
                        // Existing position holds a stale key; swap in place.
                        let pos = state
                            .order
                            .iter()
                            .position(|entry| *entry == item)
                            .unwrap_or(usize::MAX);
                        state.drop_name(&old.id, item);
                        state
                            .by_id
                            .entry(new_key.id.clone())
                            .or_default()
                            .push(item);
                        state.arena.insert(item, new_key.clone());
                        update.replaced.push((pos, old, new_key));
                    }
                }
            }
            update
        };

        {
            let mut scan = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
            if *scan != ScanState::Complete {
                *scan = ScanState::Complete;
                self.scan_cv.notify_all();
            }
        }

        if update.is_empty() {
            return;
        }
        debug!(
            removed = update.removed.len(),
            added = update.added.len(),
            replaced = update.replaced.len(),
            "applied index batch"
        );
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_update(&update);
        }
    }
}
