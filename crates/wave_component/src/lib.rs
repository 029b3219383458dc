//! # wave_component
//!
//! Shared vocabulary of the wave scheduler: what a component is, how it is
//! identified, and how a system's access to components is described.
//!
//! This crate provides:
//!
//! - [`Component`] trait and [`ComponentRegistry`] — stable, dense type ids.
//! - [`BitSet`] — runtime-sized sets indexed by those ids.
//! - [`ComponentAccess`] — a system's read/write footprint and data filter.
//! - [`Entity`] and [`EntityAllocator`] — generational entity handles.

pub mod access;
pub mod component;
pub mod entity;
pub mod mask;

pub use access::ComponentAccess;
pub use component::{Component, ComponentRegistry, ComponentTypeId, RegistryError};
pub use entity::{Entity, EntityAllocator};
pub use mask::BitSet;
