//! Narrowing strategies.
//!
//! Narrowing scopes an enumerable value set to the current context: given
//! a list of keys and a [`Hypercube`], a [`Narrower`] returns the keys
//! still in scope. An absent or unrestricted axis accepts everything -
//! absence of restriction never means rejection.

use crate::hypercube::Hypercube;
use crate::model::{Attribute, AxisValue, ItemKey, SourceId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Builds the per-source narrower used by [`AggregatingNarrower`].
pub type NarrowerFactory = Arc<dyn Fn(&SourceId) -> Narrower + Send + Sync>;

/// A narrowing strategy.
#[derive(Clone)]
pub enum Narrower {
    /// Pass-through.
    Identity,
    /// Keep a key iff it is ownerless or its source is allowed on `axis`.
    SourceFiltered { axis: Attribute },
    /// Union over per-source narrowers that attach/detach live.
    Aggregating(AggregatingNarrower),
}

impl Narrower {
    /// Narrow `keys` to those in scope under `cube`.
    #[must_use]
    pub fn narrow(&self, keys: &[ItemKey], cube: &Hypercube) -> Vec<ItemKey> {
        match self {
            Self::Identity => keys.to_vec(),
            Self::SourceFiltered { axis } => {
                let Some(allowed) = cube.allowed(axis) else {
                    // Unrestricted axis: everything stays in scope.
                    return keys.to_vec();
                };
                keys.iter()
                    .filter(|key| {
                        key.source.as_ref().is_none_or(|source| {
                            allowed.contains(&AxisValue::Source(source.clone()))
                        })
                    })
                    .cloned()
                    .collect()
            }
            Self::Aggregating(agg) => agg.narrow(keys, cube),
        }
    }
}

impl std::fmt::Debug for Narrower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::SourceFiltered { axis } => write!(f, "SourceFiltered({axis})"),
            Self::Aggregating(agg) => {
                write!(f, "Aggregating({} sources)", agg.active_sources().len())
            }
        }
    }
}

/// Listener for live source registration changes.
pub trait SourceListener: Send + Sync {
    fn source_added(&self, source: &SourceId);
    fn source_removed(&self, source: &SourceId);
}

/// The set of currently-active sources (connections), with listeners.
#[derive(Default)]
pub struct SourceRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    sources: BTreeSet<SourceId>,
    listeners: Vec<Arc<dyn SourceListener>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, source: SourceId) {
        let listeners = {
            let mut state = self.lock();
            if !state.sources.insert(source.clone()) {
                return;
            }
            state.listeners.clone()
        };
        debug!(%source, "source activated");
        for listener in listeners {
            listener.source_added(&source);
        }
    }

    pub fn remove(&self, source: &SourceId) {
        let listeners = {
            let mut state = self.lock();
            if !state.sources.remove(source) {
                return;
            }
            state.listeners.clone()
        };
        debug!(%source, "source deactivated");
        for listener in listeners {
            listener.source_removed(source);
        }
    }

    #[must_use]
    pub fn sources(&self) -> Vec<SourceId> {
        self.lock().sources.iter().cloned().collect()
    }

    /// Register a listener, replaying already-active sources to it.
    pub fn subscribe(&self, listener: Arc<dyn SourceListener>) {
        let existing = {
            let mut state = self.lock();
            state.listeners.push(Arc::clone(&listener));
            state.sources.iter().cloned().collect::<Vec<_>>()
        };
        for source in existing {
            listener.source_added(&source);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unions per-source narrowing results, de-duplicating by resolved
/// identity. Sources attach and detach live via [`SourceListener`]; the
/// source-axis restriction captured at construction is honored at attach
/// time, so an out-of-scope source never contributes a delegate.
#[derive(Clone)]
pub struct AggregatingNarrower {
    inner: Arc<AggInner>,
}

struct AggInner {
    source_axis: Attribute,
    /// Allowed sources captured from the construction-time cube;
    /// `None` = the axis was unrestricted.
    allowed: Option<BTreeSet<AxisValue>>,
    factory: NarrowerFactory,
    delegates: Mutex<BTreeMap<SourceId, Narrower>>,
}

impl AggregatingNarrower {
    /// Build against the construction-time cube and attach to the
    /// registry's live source set.
    #[must_use]
    pub fn attach(
        registry: &SourceRegistry,
        source_axis: impl Into<Attribute>,
        cube: &Hypercube,
        factory: NarrowerFactory,
    ) -> Self {
        let source_axis = source_axis.into();
        let narrower = Self {
            inner: Arc::new(AggInner {
                allowed: cube.allowed(&source_axis).cloned(),
                source_axis,
                factory,
                delegates: Mutex::new(BTreeMap::new()),
            }),
        };
        registry.subscribe(Arc::new(narrower.clone()));
        narrower
    }

    #[must_use]
    pub fn active_sources(&self) -> Vec<SourceId> {
        self.lock_delegates().keys().cloned().collect()
    }

    fn narrow(&self, keys: &[ItemKey], cube: &Hypercube) -> Vec<ItemKey> {
        let delegates = self.lock_delegates();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut result = Vec::new();
        for (source, delegate) in delegates.iter() {
            // Each delegate sees its own keys plus ownerless ones.
            let scoped: Vec<ItemKey> = keys
                .iter()
                .filter(|key| {
                    key.source.as_ref().is_none_or(|owner| owner == source)
                })
                .cloned()
                .collect();
            for key in delegate.narrow(&scoped, cube) {
                let identity = key.item.map_or_else(
                    || format!("id:{}", key.id),
                    |item| format!("item:{}", item.0),
                );
                if seen.insert(identity) {
                    result.push(key);
                }
            }
        }
        result
    }

    fn lock_delegates(&self) -> std::sync::MutexGuard<'_, BTreeMap<SourceId, Narrower>> {
        self.inner
            .delegates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl SourceListener for AggregatingNarrower {
    fn source_added(&self, source: &SourceId) {
        if let Some(allowed) = &self.inner.allowed {
            if !allowed.contains(&AxisValue::Source(source.clone())) {
                debug!(%source, axis = %self.inner.source_axis, "source outside axis restriction, not attached");
                return;
            }
        }
        let delegate = (self.inner.factory)(source);
        self.lock_delegates().insert(source.clone(), delegate);
    }

    fn source_removed(&self, source: &SourceId) {
        self.lock_delegates().remove(source);
    }
}
