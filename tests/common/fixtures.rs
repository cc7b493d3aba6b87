//! Builder-style fixtures over the in-memory reference store.

use chrono::{DateTime, Utc};
use spindle_query::model::{AttrValue, Attribute, ItemId};
use spindle_query::store::memory::{MemStore, Txn};

/// Builder for one store item with the standard key shape.
#[derive(Debug, Clone, Default)]
pub struct ItemBuilder {
    attrs: Vec<(Attribute, AttrValue)>,
}

impl ItemBuilder {
    /// An item resolvable by the standard key shape.
    pub fn keyed(id: &str, name: &str) -> Self {
        Self::default()
            .with_text("key", id)
            .with_text("name", name)
    }

    pub fn with_text(mut self, attr: &str, value: &str) -> Self {
        self.attrs
            .push((Attribute::new(attr), AttrValue::Text(value.to_string())));
        self
    }

    pub fn with_int(mut self, attr: &str, value: i64) -> Self {
        self.attrs.push((Attribute::new(attr), AttrValue::Int(value)));
        self
    }

    pub fn with_date(mut self, attr: &str, value: DateTime<Utc>) -> Self {
        self.attrs.push((Attribute::new(attr), AttrValue::Date(value)));
        self
    }

    pub fn with_ref(mut self, attr: &str, target: ItemId) -> Self {
        self.attrs.push((Attribute::new(attr), AttrValue::Ref(target)));
        self
    }

    pub fn with_refs(mut self, attr: &str, targets: Vec<ItemId>) -> Self {
        self.attrs
            .push((Attribute::new(attr), AttrValue::RefList(targets)));
        self
    }

    pub fn put(self, txn: &mut Txn<'_>) -> ItemId {
        txn.put(self.attrs)
    }
}

/// A store pinned to a deterministic clock.
pub fn pinned_store(now: DateTime<Utc>) -> MemStore {
    let store = MemStore::new();
    store.set_now(now);
    store
}
