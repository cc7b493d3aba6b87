//! External store interfaces.
//!
//! The core does not own physical storage. It consumes a transactional item
//! store through the traits in this module:
//! - `Reader` - a fixed-point-in-time view bound to one store transaction
//! - `ItemStore` - snapshot access plus live-query subscription
//! - `ChangeSink` - receiver of ordered, single-writer change batches
//! - `KeyShape` - item-to-key resolution contract
//! - `Lifetime` - cancellation scope that owns subscription resources
//!
//! `memory` provides an in-memory reference implementation used by tests,
//! doc examples and benches.

pub mod memory;

use crate::error::{QueryError, Result};
use crate::model::{AttrValue, Attribute, ItemId, ItemKey, SourceId};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::{Arc, Mutex};

/// A fixed-point-in-time view of the store.
///
/// Every predicate resolution and key resolution runs against one reader;
/// `now()` is the transaction timestamp, which relative-date resolution
/// uses instead of the wall clock.
pub trait Reader: Send + Sync {
    /// Transaction timestamp of this view.
    fn now(&self) -> DateTime<Utc>;

    /// Whether the item exists in this view.
    fn contains(&self, item: ItemId) -> bool;

    /// Value of one attribute, if set.
    fn attr(&self, item: ItemId, attr: &Attribute) -> Option<AttrValue>;

    /// Items whose `parent_attr` references `parent`. Used by subtree
    /// expansion; expected to be cheap relative to full scans.
    fn children_of(&self, parent_attr: &Attribute, parent: ItemId) -> Vec<ItemId>;

    /// Find an item by its stable textual key id, if present.
    fn find_by_key_id(&self, id: &str) -> Option<ItemId>;
}

/// One ordered change batch, scoped to a single originating transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    /// Items removed (or no longer matching the subscription filter).
    pub removed: Vec<ItemId>,
    /// Items added or changed, matching the filter in the new state.
    pub touched: Vec<ItemId>,
}

impl ChangeBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.touched.is_empty()
    }
}

/// Receiver of change batches on the designated delivery context.
///
/// Delivery must be idempotent if a batch is ever replayed.
pub trait ChangeSink: Send + Sync {
    /// Handle one batch. `reader` is bound to the batch's transaction.
    fn on_change(&self, batch: &ChangeBatch, reader: &dyn Reader);
}

/// Which items a subscription (or index) covers - the "type predicate".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFilter {
    /// Every item.
    All,
    /// Items whose attribute equals the given value.
    AttrEquals { attr: Attribute, value: AttrValue },
}

impl ItemFilter {
    /// Convenience filter on a text-typed attribute.
    #[must_use]
    pub fn attr_text(attr: impl Into<Attribute>, value: impl Into<String>) -> Self {
        Self::AttrEquals {
            attr: attr.into(),
            value: AttrValue::Text(value.into()),
        }
    }

    /// Whether the item matches under the given reader.
    #[must_use]
    pub fn matches(&self, reader: &dyn Reader, item: ItemId) -> bool {
        match self {
            Self::All => reader.contains(item),
            Self::AttrEquals { attr, value } => {
                reader.attr(item, attr).as_ref() == Some(value)
            }
        }
    }
}

/// Live-query capable item store.
pub trait ItemStore: Send + Sync {
    /// A snapshot reader at the current point in time.
    fn snapshot(&self) -> Box<dyn Reader>;

    /// Open a live query. The store delivers one initial batch covering
    /// all currently-matching items (possibly empty), then one batch per
    /// originating transaction, all on the designated delivery context.
    /// Delivery stops when `lifetime` ends.
    fn subscribe(
        &self,
        lifetime: &Lifetime,
        filter: ItemFilter,
        sink: Arc<dyn ChangeSink>,
    ) -> Result<()>;
}

/// Item-to-key resolution contract.
pub trait KeyShape: Send + Sync {
    /// Resolve an item into a key.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ItemShape`] when the item lacks the expected
    /// attributes. Batch consumers skip the item and continue.
    fn resolve_key(&self, reader: &dyn Reader, item: ItemId) -> Result<ItemKey>;
}

/// Default key shape: textual id from `key`, display from `name`,
/// owning source from `source`.
#[derive(Debug, Clone)]
pub struct StandardKeyShape {
    pub id_attr: Attribute,
    pub name_attr: Attribute,
    pub source_attr: Attribute,
}

impl Default for StandardKeyShape {
    fn default() -> Self {
        Self {
            id_attr: Attribute::new("key"),
            name_attr: Attribute::new("name"),
            source_attr: Attribute::new("source"),
        }
    }
}

impl KeyShape for StandardKeyShape {
    fn resolve_key(&self, reader: &dyn Reader, item: ItemId) -> Result<ItemKey> {
        let Some(AttrValue::Text(id)) = reader.attr(item, &self.id_attr) else {
            return Err(QueryError::ItemShape {
                item: item.0,
                reason: format!("missing text attribute '{}'", self.id_attr),
            });
        };
        let display = match reader.attr(item, &self.name_attr) {
            Some(AttrValue::Text(name)) if !name.is_empty() => name,
            _ => id.clone(),
        };
        let mut key = ItemKey::resolved(id, item, display);
        if let Some(AttrValue::Text(source)) = reader.attr(item, &self.source_attr) {
            key = key.with_source(SourceId::new(source));
        }
        Ok(key)
    }
}

/// A cancellation scope owning subscription resources.
///
/// Attachments (wake handles, callbacks) are dropped when the lifetime
/// ends; subscriptions check `is_alive` before delivering.
#[derive(Clone, Default)]
pub struct Lifetime {
    inner: Arc<Mutex<LifetimeState>>,
}

struct LifetimeState {
    alive: bool,
    attachments: Vec<Box<dyn Any + Send>>,
}

impl Default for LifetimeState {
    fn default() -> Self {
        Self {
            alive: true,
            attachments: Vec::new(),
        }
    }
}

impl Lifetime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.lock().map_or(false, |state| state.alive)
    }

    /// Keep `value` alive until the lifetime ends, then drop it.
    ///
    /// If the lifetime has already ended the value is dropped immediately,
    /// outside the internal lock.
    pub fn attach<T: Send + 'static>(&self, value: T) {
        let mut boxed: Option<Box<dyn Any + Send>> = Some(Box::new(value));
        {
            let mut state = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.alive {
                if let Some(b) = boxed.take() {
                    state.attachments.push(b);
                }
            }
        }
        drop(boxed);
    }

    /// Run `f` when the lifetime ends (immediately if already ended).
    pub fn on_end(&self, f: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.alive {
                state.attachments.push(Box::new(RunOnDrop(Some(Box::new(f)))));
                None
            } else {
                Some(f)
            }
        };
        if let Some(f) = run_now {
            f();
        }
    }

    /// End the lifetime, dropping all attachments.
    ///
    /// Attachment destructors run outside the internal lock so they may
    /// call back into this lifetime.
    pub fn end(&self) {
        let attachments = {
            let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.alive = false;
            std::mem::take(&mut state.attachments)
        };
        drop(attachments);
    }
}

impl std::fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifetime")
            .field("alive", &self.is_alive())
            .finish()
    }
}

struct RunOnDrop(Option<Box<dyn FnOnce() + Send>>);

impl Drop for RunOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}
