//! # wave_schedule
//!
//! Turns a set of system declarations into an ordered list of waves, then
//! runs those waves against a data source.
//!
//! Building happens once:
//!
//! - [`extract_access`] turns each [`SystemDeclaration`] into a
//!   [`ComponentAccess`](wave_component::ComponentAccess).
//! - [`DependencyGraph`] holds the explicit `after`/`before` edges and sorts
//!   them topologically; a cycle aborts the build with [`CycleError`].
//! - [`assign_waves`] places systems greedily so no two systems in a wave
//!   conflict, and every explicit edge crosses at least one wave boundary.
//!
//! Running happens many times: a [`ScheduleBuilder`] picks which systems take
//! part, and the resulting [`Schedule`] dispatches them wave by wave, either
//! sequentially or with rayon inside each wave.
//!
//! ```rust
//! use wave_component::ComponentRegistry;
//! use wave_schedule::{SystemDeclaration, build_schedule};
//!
//! let components = ComponentRegistry::from_names(["Position", "Velocity"]).unwrap();
//! let plan = build_schedule(
//!     &[
//!         SystemDeclaration::new("Move").write("Position").read("Velocity"),
//!         SystemDeclaration::new("Render").read("Position"),
//!         SystemDeclaration::new("Gravity").write("Velocity"),
//!     ],
//!     &components,
//! )
//! .unwrap();
//! assert_eq!(plan.to_string(), "wave 0: Gravity, Render\nwave 1: Move\n");
//! ```

pub mod batch;
pub mod build;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod declaration;
pub mod error;
pub mod extract;
pub mod graph;
pub mod registry;
pub mod schedule;
pub mod system;
pub mod waves;

pub use batch::{Batch, BatchSource, BatchView, EntityView, SharedColumn};
pub use build::{PrecomputedWaves, build_schedule};
pub use builder::ScheduleBuilder;
pub use cancel::CancelToken;
pub use config::DeclarationFile;
pub use declaration::{
    AccessMode, Filters, ResourceParameter, SystemDeclaration, SystemDescriptor, SystemId,
};
pub use error::{
    AccessError, ConfigError, CycleError, DeclarationError, DeclarationField, DispatchError,
};
pub use extract::extract_access;
pub use graph::{DependencyEdge, DependencyGraph};
pub use registry::SystemRegistry;
pub use schedule::{RunStats, Schedule, SchedulePlan};
pub use system::{Granularity, System, per_batch, per_entity};
pub use waves::{Wave, WaveAssignment, assign_waves};
