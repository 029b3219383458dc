//! # wave_world
//!
//! In-memory archetype storage that serves batches to a wave schedule.
//!
//! - [`World`] — entity allocation, archetype tables, `spawn().with(..).build()`.
//! - [`ArchetypeTable`] — one typed column per component, split into
//!   fixed-size batches on demand.
//!
//! `World` implements [`BatchSource`](wave_schedule::BatchSource), so a
//! [`Schedule`](wave_schedule::Schedule) can run directly against it.

pub mod archetype;
pub mod error;
pub mod world;

pub use archetype::{ArchetypeId, ArchetypeTable, ErasedColumn, TypedColumn};
pub use error::WorldError;
pub use world::{DEFAULT_BATCH_SIZE, EntityBuilder, World};
