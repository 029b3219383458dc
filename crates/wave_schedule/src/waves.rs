//! Wave assignment.
//!
//! Systems are placed one by one, in topological order, into the earliest wave
//! that is (a) strictly later than every explicit predecessor's wave and
//! (b) free of access conflicts with the systems already there. The result is
//! a greedy colouring: not globally optimal, but fully determined by the
//! topological order, which itself is determined by system ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wave_component::{BitSet, ComponentAccess};

use crate::declaration::SystemId;
use crate::graph::DependencyGraph;

/// A group of systems that may run concurrently.
///
/// ## Invariants
/// * No two systems in a wave conflict on component access.
/// * Systems are stored in the order they were placed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    systems: Vec<SystemId>,
}

impl Wave {
    /// Systems in placement order.
    #[must_use]
    pub fn systems(&self) -> &[SystemId] {
        &self.systems
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if the wave holds no system.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Returns `true` if `id` was placed in this wave.
    #[must_use]
    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.contains(&id)
    }
}

/// Union of the access of every system in one wave.
///
/// Checking a candidate against the union is equivalent to checking it
/// against each member, since conflict is an intersection test.
#[derive(Debug, Default)]
struct WaveFootprint {
    read: BitSet,
    write: BitSet,
}

impl WaveFootprint {
    fn accepts(&self, access: &ComponentAccess) -> bool {
        !access.write.intersects(&self.read) && !self.write.intersects(&access.read)
    }

    fn absorb(&mut self, access: &ComponentAccess) {
        self.read.union_with(&access.read);
        self.write.union_with(&access.write);
    }
}

/// Output of [`assign_waves`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveAssignment {
    /// Waves in execution order.
    pub waves: Vec<Wave>,
    /// Wave index of every placed system.
    pub placement: BTreeMap<SystemId, usize>,
}

/// Place every system of `order` into a wave.
///
/// `order` must be a topological order of `graph`; `access_of` returns the
/// access record of a system. Systems it does not know are treated as
/// touching nothing.
#[must_use]
pub fn assign_waves<'a, F>(
    order: &[SystemId],
    graph: &DependencyGraph,
    access_of: F,
) -> WaveAssignment
where
    F: Fn(SystemId) -> Option<&'a ComponentAccess>,
{
    let empty = ComponentAccess::new();
    let mut waves: Vec<Wave> = Vec::new();
    let mut footprints: Vec<WaveFootprint> = Vec::new();
    let mut placement: BTreeMap<SystemId, usize> = BTreeMap::new();

    for &id in order {
        let access = access_of(id).unwrap_or(&empty);

        let min_wave = graph
            .predecessors(id)
            .filter_map(|pred| placement.get(&pred))
            .map(|&wave| wave + 1)
            .max()
            .unwrap_or(0);

        let mut candidate = min_wave;
        while footprints
            .get(candidate)
            .is_some_and(|footprint| !footprint.accepts(access))
        {
            candidate += 1;
        }

        if candidate >= waves.len() {
            waves.resize_with(candidate + 1, Wave::default);
            footprints.resize_with(candidate + 1, WaveFootprint::default);
        }
        waves[candidate].systems.push(id);
        footprints[candidate].absorb(access);
        placement.insert(id, candidate);
    }

    WaveAssignment { waves, placement }
}
