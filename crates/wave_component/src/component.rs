//! Component identity and the component registry.
//!
//! A component (also called a resource type) is a kind of shared data that
//! systems read or write. Each kind gets a small dense [`ComponentTypeId`]
//! from a [`ComponentRegistry`]; the id is used as a bit position in every
//! access set and archetype signature.
//!
//! The registry is an ordinary value owned by whoever assembles a world. It is
//! filled once during setup and then shared read-only (usually behind an
//! `Arc`) by the scheduler and the storage layer.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense identifier of a component type, assigned by a [`ComponentRegistry`].
///
/// Ids are handed out in registration order starting at zero and are only
/// meaningful together with the registry that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// The id as a bit index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The core component trait.
///
/// Any `Send + Sync + 'static` type can be stored as a component once it
/// names itself. The name is what declarations refer to, so it must be unique
/// within one registry.
///
/// # Examples
///
/// ```rust
/// use wave_component::{Component, ComponentRegistry};
///
/// struct Health {
///     current: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
///
/// let mut registry = ComponentRegistry::new();
/// let id = registry.register::<Health>().unwrap();
/// assert_eq!(registry.id_by_name("Health"), Some(id));
/// ```
pub trait Component: Send + Sync + 'static {
    /// A human-readable, registry-unique name for this component type.
    fn type_name() -> &'static str;
}

/// Errors raised while registering component types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Component names must be non-empty.
    #[error("component name must not be empty")]
    EmptyName,

    /// The name is already bound to a different Rust type.
    #[error("component name '{name}' is already bound to another type")]
    NameTaken {
        /// The contested name.
        name: String,
    },
}

/// Maps component names and Rust types to stable [`ComponentTypeId`]s.
///
/// Names can be registered without a Rust type (for declarations loaded from
/// configuration) and bound to a type later with [`ComponentRegistry::register`].
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    names: Vec<String>,
    rust_types: Vec<Option<TypeId>>,
    by_name: HashMap<String, ComponentTypeId>,
    by_type: HashMap<TypeId, ComponentTypeId>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every name in `names`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyName`] if any name is empty.
    pub fn from_names<I, S>(names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register_named(name)?;
        }
        Ok(registry)
    }

    /// Register a component by name only. Registering a known name returns
    /// its existing id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyName`] for an empty name.
    pub fn register_named(
        &mut self,
        name: impl Into<String>,
    ) -> Result<ComponentTypeId, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(&id) = self.by_name.get(&name) {
            return Ok(id);
        }
        Ok(self.push(name, None))
    }

    /// Register the Rust component type `T` under [`Component::type_name`].
    ///
    /// If the name was registered earlier without a type, `T` is bound to the
    /// existing id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NameTaken`] if the name is bound to another
    /// Rust type, or [`RegistryError::EmptyName`] for an empty name.
    pub fn register<T: Component>(&mut self) -> Result<ComponentTypeId, RegistryError> {
        let rust_type = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&rust_type) {
            return Ok(id);
        }
        let name = T::type_name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        match self.by_name.get(name) {
            Some(&id) => {
                let slot = &mut self.rust_types[id.index()];
                if slot.is_some() {
                    return Err(RegistryError::NameTaken {
                        name: name.to_string(),
                    });
                }
                *slot = Some(rust_type);
                self.by_type.insert(rust_type, id);
                Ok(id)
            }
            None => Ok(self.push(name.to_string(), Some(rust_type))),
        }
    }

    fn push(&mut self, name: String, rust_type: Option<TypeId>) -> ComponentTypeId {
        let id = ComponentTypeId(self.names.len() as u32);
        self.by_name.insert(name.clone(), id);
        if let Some(t) = rust_type {
            self.by_type.insert(t, id);
        }
        self.names.push(name);
        self.rust_types.push(rust_type);
        id
    }

    /// The id bound to the Rust type `T`, if registered.
    #[must_use]
    pub fn id_of<T: Component>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The id registered under `name`.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// The name registered for `id`.
    #[must_use]
    pub fn name_of(&self, id: ComponentTypeId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Number of distinct component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentTypeId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (ComponentTypeId(i as u32), n.as_str()))
    }
}
