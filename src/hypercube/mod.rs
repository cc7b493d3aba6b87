//! Multi-axis narrowing context.
//!
//! A [`Hypercube`] describes which attribute values are currently "in
//! scope": each axis maps an attribute to its allowed value set. An absent
//! axis means "unrestricted" - narrowing against it must accept everything,
//! never reject.

use crate::model::{Attribute, AxisValue};
use std::collections::{BTreeMap, BTreeSet};

/// An immutable set of (attribute -> allowed-value-set) axes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hypercube {
    axes: BTreeMap<Attribute, BTreeSet<AxisValue>>,
}

impl Hypercube {
    /// The unrestricted cube: every axis absent.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Copy of this cube with an axis restricted to the given values.
    ///
    /// Restricting an already-present axis replaces its value set.
    #[must_use]
    pub fn with_axis(
        &self,
        axis: impl Into<Attribute>,
        values: impl IntoIterator<Item = AxisValue>,
    ) -> Self {
        let mut axes = self.axes.clone();
        axes.insert(axis.into(), values.into_iter().collect());
        Self { axes }
    }

    /// Copy of this cube with an axis removed (made unrestricted).
    #[must_use]
    pub fn without_axis(&self, axis: &Attribute) -> Self {
        let mut axes = self.axes.clone();
        axes.remove(axis);
        Self { axes }
    }

    /// Whether the cube restricts the given axis at all.
    #[must_use]
    pub fn has_axis(&self, axis: &Attribute) -> bool {
        self.axes.contains_key(axis)
    }

    /// Allowed values for an axis; `None` means unrestricted.
    #[must_use]
    pub fn allowed(&self, axis: &Attribute) -> Option<&BTreeSet<AxisValue>> {
        self.axes.get(axis)
    }

    /// Whether `value` is in scope on `axis` (absent axis accepts all).
    #[must_use]
    pub fn permits(&self, axis: &Attribute, value: &AxisValue) -> bool {
        self.axes.get(axis).is_none_or(|set| set.contains(value))
    }

    /// Number of restricted axes.
    #[must_use]
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }
}
