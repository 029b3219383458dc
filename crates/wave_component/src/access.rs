//! Normalised component access for one system.
//!
//! A [`ComponentAccess`] records which component types a system touches and
//! how. The scheduler uses the `read`/`write` sets to detect conflicts between
//! systems; the storage layer uses `all`/`without`/`any` to select the data a
//! system runs over.

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;
use crate::mask::BitSet;

/// The resource footprint and data filter of a system.
///
/// Invariant: `write ⊆ read ⊆ all`. The builder methods maintain it, so a
/// value assembled through them is always well formed. `without` and `any`
/// narrow matching only and never take part in conflict detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAccess {
    /// Every component that must be present on matched data.
    pub all: BitSet,
    /// Components the system reads (including the ones it writes).
    pub read: BitSet,
    /// Components the system writes.
    pub write: BitSet,
    /// Components that must be absent on matched data.
    pub without: BitSet,
    /// If non-empty, at least one of these must be present.
    pub any: BitSet,
}

impl ComponentAccess {
    /// Create an empty access description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read-only component.
    #[must_use]
    pub fn read(mut self, type_id: ComponentTypeId) -> Self {
        self.add_read(type_id);
        self
    }

    /// Add a read-write component.
    #[must_use]
    pub fn write(mut self, type_id: ComponentTypeId) -> Self {
        self.add_write(type_id);
        self
    }

    /// Require a component to be present without accessing it.
    #[must_use]
    pub fn with(mut self, type_id: ComponentTypeId) -> Self {
        self.all.insert(type_id.index());
        self
    }

    /// Require a component to be absent.
    #[must_use]
    pub fn without(mut self, type_id: ComponentTypeId) -> Self {
        self.without.insert(type_id.index());
        self
    }

    /// Require at least one of the `any` components to be present.
    #[must_use]
    pub fn any(mut self, type_id: ComponentTypeId) -> Self {
        self.any.insert(type_id.index());
        self
    }

    /// In-place form of [`ComponentAccess::read`].
    pub fn add_read(&mut self, type_id: ComponentTypeId) {
        self.all.insert(type_id.index());
        self.read.insert(type_id.index());
    }

    /// In-place form of [`ComponentAccess::write`].
    pub fn add_write(&mut self, type_id: ComponentTypeId) {
        self.add_read(type_id);
        self.write.insert(type_id.index());
    }

    /// Returns `true` if the system may read `type_id`.
    #[must_use]
    pub fn can_read(&self, type_id: ComponentTypeId) -> bool {
        self.read.contains(type_id.index())
    }

    /// Returns `true` if the system may write `type_id`.
    #[must_use]
    pub fn can_write(&self, type_id: ComponentTypeId) -> bool {
        self.write.contains(type_id.index())
    }

    /// Returns `true` if the system touches no component data at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    /// Checks the `write ⊆ read ⊆ all` invariant.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.write.is_subset(&self.read) && self.read.is_subset(&self.all)
    }

    /// Checks whether two systems may not share a wave.
    ///
    /// ```text
    /// A.write ∩ B.read ≠ ∅  OR  B.write ∩ A.read ≠ ∅
    /// ```
    ///
    /// Because `write ⊆ read`, write/write overlap is covered too.
    #[must_use]
    pub fn conflicts_with(&self, other: &ComponentAccess) -> bool {
        self.write.intersects(&other.read) || other.write.intersects(&self.read)
    }

    /// Checks whether data with the given component `signature` is selected.
    #[must_use]
    pub fn matches(&self, signature: &BitSet) -> bool {
        self.all.is_subset(signature)
            && self.without.is_disjoint(signature)
            && (self.any.is_empty() || self.any.intersects(signature))
    }
}
