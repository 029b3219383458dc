//! System declarations and resolved descriptors.
//!
//! A [`SystemDeclaration`] is the raw, name-based description a front end hands
//! to the scheduler: which resources a system reads or writes, which filters
//! narrow its data, and which systems it must run after or before. Declarations
//! can be built in code or deserialised from configuration.
//!
//! A [`SystemDescriptor`] is what the scheduler keeps after validation: a
//! stable [`SystemId`], the normalised [`ComponentAccess`], and ordering
//! constraints resolved to ids.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use wave_component::ComponentAccess;

/// Stable ordinal of a scheduled system.
///
/// Assigned at build time in ascending order of qualified name, except for
/// systems that request a manual id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u32);

impl SystemId {
    /// The id as a bit index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// How a resource parameter is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Shared, read-only access.
    Read,
    /// Exclusive read-write access.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// One resource a system accesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceParameter {
    /// Registered resource name.
    pub resource: String,
    /// Access mode.
    pub access: AccessMode,
}

/// Filters that narrow matched data without granting access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Must be present.
    pub with: Vec<String>,
    /// Must be absent.
    pub without: Vec<String>,
    /// At least one must be present.
    pub any: Vec<String>,
}

/// The declaration of one system, as received from a front end.
///
/// # Examples
///
/// ```rust
/// use wave_schedule::SystemDeclaration;
///
/// let movement = SystemDeclaration::new("physics::Move")
///     .write("Position")
///     .read("Velocity")
///     .without("Frozen")
///     .after("physics::Gravity");
/// assert_eq!(movement.parameters.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDeclaration {
    /// Qualified, unique system name.
    pub name: String,
    /// Resources the system accesses.
    #[serde(default)]
    pub parameters: Vec<ResourceParameter>,
    /// Data filters.
    #[serde(default)]
    pub filters: Filters,
    /// Systems this one must run after.
    #[serde(default)]
    pub after: Vec<String>,
    /// Systems this one must run before.
    #[serde(default)]
    pub before: Vec<String>,
    /// Requested id, taking priority over automatic assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_id: Option<u32>,
}

impl SystemDeclaration {
    /// Start a declaration with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            filters: Filters::default(),
            after: Vec::new(),
            before: Vec::new(),
            manual_id: None,
        }
    }

    /// Add a read-only resource parameter.
    #[must_use]
    pub fn read(self, resource: impl Into<String>) -> Self {
        self.parameter(resource, AccessMode::Read)
    }

    /// Add a read-write resource parameter.
    #[must_use]
    pub fn write(self, resource: impl Into<String>) -> Self {
        self.parameter(resource, AccessMode::Write)
    }

    /// Add a resource parameter with an explicit mode.
    #[must_use]
    pub fn parameter(mut self, resource: impl Into<String>, access: AccessMode) -> Self {
        self.parameters.push(ResourceParameter {
            resource: resource.into(),
            access,
        });
        self
    }

    /// Require a resource to be present.
    #[must_use]
    pub fn with(mut self, resource: impl Into<String>) -> Self {
        self.filters.with.push(resource.into());
        self
    }

    /// Require a resource to be absent.
    #[must_use]
    pub fn without(mut self, resource: impl Into<String>) -> Self {
        self.filters.without.push(resource.into());
        self
    }

    /// Require at least one of the `any` resources.
    #[must_use]
    pub fn any(mut self, resource: impl Into<String>) -> Self {
        self.filters.any.push(resource.into());
        self
    }

    /// Run after `system`.
    #[must_use]
    pub fn after(mut self, system: impl Into<String>) -> Self {
        self.after.push(system.into());
        self
    }

    /// Run before `system`.
    #[must_use]
    pub fn before(mut self, system: impl Into<String>) -> Self {
        self.before.push(system.into());
        self
    }

    /// Request a specific id.
    #[must_use]
    pub fn manual_id(mut self, id: u32) -> Self {
        self.manual_id = Some(id);
        self
    }
}

/// A validated system, ready for ordering and wave assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDescriptor {
    /// Stable ordinal.
    pub id: SystemId,
    /// Qualified name.
    pub name: String,
    /// Normalised access.
    pub access: ComponentAccess,
    /// Resolved `after` targets.
    pub after: BTreeSet<SystemId>,
    /// Resolved `before` targets.
    pub before: BTreeSet<SystemId>,
}
