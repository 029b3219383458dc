//! Entity handles and allocation.
//!
//! An [`Entity`] packs a slot index and a generation into one `u64`. Freed
//! slots are recycled with a bumped generation, so a handle kept past a
//! despawn no longer resolves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A generational entity handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// Build a handle from its parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    /// Rebuild a handle from [`Entity::to_bits`].
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The packed representation.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

/// Hands out entity handles and recycles freed slots.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
}

impl EntityAllocator {
    /// Create an allocator with no live entities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, reusing the most recently freed slot if any.
    pub fn allocate(&mut self) -> Entity {
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return Entity::new(index, self.generations[slot]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        Entity::new(index, 0)
    }

    /// Release `entity`. Returns `false` if the handle was stale or unknown.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.index() as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(entity.index());
        true
    }

    /// Returns `true` if `entity` refers to a live slot of the same generation.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        self.alive.get(slot).copied().unwrap_or(false)
            && self.generations[slot] == entity.generation()
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.generations.len() - self.free.len()
    }
}
