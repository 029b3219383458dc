//! Scheduler error types.
//!
//! Errors are split by how far they reach:
//!
//! - [`DeclarationError`] — one system is excluded, the build carries on.
//! - [`CycleError`] — explicit ordering is cyclic, no plan is produced.
//! - [`DispatchError`] — a run failed; the plan itself is untouched.
//! - [`AccessError`] — a system asked a view for data it did not declare.
//! - [`ConfigError`] — a declaration file could not be read.
//!
//! Systems are always named by their qualified name, never by numeric id.

use std::fmt;
use std::path::PathBuf;

use wave_component::RegistryError;

use crate::declaration::AccessMode;

/// The declaration field an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeclarationField {
    /// `parameters` (read/write resources).
    Parameters,
    /// `filters.with`.
    With,
    /// `filters.without`.
    Without,
    /// `filters.any`.
    Any,
    /// `after`.
    After,
    /// `before`.
    Before,
    /// `manual_id`.
    ManualId,
}

impl fmt::Display for DeclarationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parameters => "parameters",
            Self::With => "with",
            Self::Without => "without",
            Self::Any => "any",
            Self::After => "after",
            Self::Before => "before",
            Self::ManualId => "manual_id",
        })
    }
}

/// A problem with a single system declaration.
///
/// Most variants exclude the system from scheduling (see
/// [`DeclarationError::excludes_system`]); the build still succeeds for every
/// other system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// A declaration without a name cannot be referenced or reported.
    #[error("system declaration at position {position} has an empty name")]
    EmptyName {
        /// Index of the declaration in the input list.
        position: usize,
    },

    /// Two or more declarations share a name; every copy is excluded.
    #[error("system '{system}' is declared {count} times")]
    DuplicateName {
        /// The shared name.
        system: String,
        /// Number of declarations using it.
        count: usize,
    },

    /// The system declares no resource parameter at all.
    #[error("system '{system}' has no resource parameters")]
    NoParameters {
        /// The offending system.
        system: String,
    },

    /// A parameter or filter names a resource the registry does not know.
    #[error("system '{system}' references unknown resource '{resource}' in {field}")]
    UnknownResource {
        /// The offending system.
        system: String,
        /// Where the reference appears.
        field: DeclarationField,
        /// The unknown resource name.
        resource: String,
    },

    /// A resource is both required and excluded, so nothing can ever match.
    #[error("system '{system}' both requires and excludes resource '{resource}'")]
    ExcludedAndRequired {
        /// The offending system.
        system: String,
        /// The contradictory resource.
        resource: String,
    },

    /// The requested manual id was already claimed by another system.
    #[error("system '{system}' requests manual id {id}, already claimed by '{claimed_by}'")]
    DuplicateManualId {
        /// The system that lost the claim.
        system: String,
        /// The contested id.
        id: u32,
        /// The system holding the id.
        claimed_by: String,
    },

    /// The requested manual id is not below the number of schedulable
    /// systems, so it would leave a hole in the id space.
    #[error("system '{system}' requests manual id {id}, but only ids below {limit} are available")]
    ManualIdOutOfRange {
        /// The offending system.
        system: String,
        /// The requested id.
        id: u32,
        /// Number of systems that passed validation.
        limit: u32,
    },

    /// An ordering constraint names a system that is not scheduled. The edge
    /// is dropped; the declaring system stays scheduled.
    #[error("system '{system}' names unscheduled system '{target}' in {field}")]
    UnresolvedOrderingTarget {
        /// The declaring system.
        system: String,
        /// `after` or `before`.
        field: DeclarationField,
        /// The missing target.
        target: String,
    },
}

impl DeclarationError {
    /// The qualified name of the system concerned, if it has one.
    #[must_use]
    pub fn system(&self) -> Option<&str> {
        match self {
            Self::EmptyName { .. } => None,
            Self::DuplicateName { system, .. }
            | Self::NoParameters { system }
            | Self::UnknownResource { system, .. }
            | Self::ExcludedAndRequired { system, .. }
            | Self::DuplicateManualId { system, .. }
            | Self::ManualIdOutOfRange { system, .. }
            | Self::UnresolvedOrderingTarget { system, .. } => Some(system),
        }
    }

    /// The part of the declaration at fault, if a single one is.
    #[must_use]
    pub fn field(&self) -> Option<DeclarationField> {
        match self {
            Self::EmptyName { .. } | Self::DuplicateName { .. } => None,
            Self::NoParameters { .. } => Some(DeclarationField::Parameters),
            Self::UnknownResource { field, .. } | Self::UnresolvedOrderingTarget { field, .. } => {
                Some(*field)
            }
            Self::ExcludedAndRequired { .. } => Some(DeclarationField::Without),
            Self::DuplicateManualId { .. } | Self::ManualIdOutOfRange { .. } => {
                Some(DeclarationField::ManualId)
            }
        }
    }

    /// Returns `true` if this error keeps the system out of the schedule.
    #[must_use]
    pub fn excludes_system(&self) -> bool {
        !matches!(self, Self::UnresolvedOrderingTarget { .. })
    }
}

/// Explicit ordering constraints form at least one cycle.
///
/// `members` lists every system the topological sort could not place, sorted
/// by name. That includes the cycle itself and anything ordered after it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cyclic ordering between systems: {}", members.join(", "))]
pub struct CycleError {
    /// Qualified names of the unresolved systems.
    pub members: Vec<String>,
}

/// A system asked its view for data outside its declaration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The component type was never registered.
    #[error("component '{component}' is not registered")]
    Unregistered {
        /// Component name.
        component: &'static str,
    },

    /// The system did not declare this access.
    #[error("component '{component}' was not declared for {mode} access")]
    NotDeclared {
        /// Component name.
        component: &'static str,
        /// Requested access.
        mode: AccessMode,
    },

    /// The column is already borrowed incompatibly through this view.
    #[error("component '{component}' is already borrowed through this view")]
    AlreadyBorrowed {
        /// Component name.
        component: &'static str,
    },

    /// The batch carries no column for this component.
    #[error("batch has no column for component '{component}'")]
    MissingColumn {
        /// Component name.
        component: &'static str,
    },

    /// The column does not hold values of the requested Rust type, or is
    /// shorter than the batch.
    #[error("column for component '{component}' does not match the requested type or rows")]
    ColumnMismatch {
        /// Component name.
        component: &'static str,
    },
}

/// A run of a schedule failed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The data layer failed to resolve batches for a system.
    #[error("failed to resolve batches for system '{system}'")]
    Resolve {
        /// The system being dispatched.
        system: String,
        /// The data layer's error.
        #[source]
        source: anyhow::Error,
    },

    /// A system body returned an error.
    #[error("system '{system}' failed")]
    System {
        /// The failing system.
        system: String,
        /// The body's error.
        #[source]
        source: anyhow::Error,
    },

    /// A system body asked its view for access it did not declare.
    #[error("system '{system}' violated its declared access")]
    Access {
        /// The offending system.
        system: String,
        /// What was refused.
        #[source]
        source: AccessError,
    },

    /// A scheduled system has no body bound to it.
    #[error("system '{system}' has no body")]
    MissingBody {
        /// The system without a body.
        system: String,
    },

    /// The run was cancelled between waves.
    #[error("run cancelled after {completed_waves} waves")]
    Cancelled {
        /// Waves fully executed before the cancellation was observed.
        completed_waves: usize,
    },
}

/// Errors loading a declaration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read '{}'", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid declaration JSON.
    #[error("failed to parse '{}'", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A resource listed in the file could not be registered.
    #[error("invalid resource list: {0}")]
    Registry(#[from] RegistryError),
}
