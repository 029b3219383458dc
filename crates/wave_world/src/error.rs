//! World errors.

use thiserror::Error;
use wave_component::Entity;

/// Errors from entity and component storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The entity was never spawned or has been despawned.
    #[error("{0} not found")]
    EntityNotFound(Entity),

    /// The component's Rust type is not registered with the world's registry.
    #[error("component '{0}' is not registered")]
    Unregistered(&'static str),

    /// The entity exists but has no such component.
    #[error("component '{component}' not found on {entity}")]
    ComponentNotFound {
        /// Component name.
        component: &'static str,
        /// The entity.
        entity: Entity,
    },

    /// A spawn listed the same component twice.
    #[error("component '{0}' given twice")]
    DuplicateComponent(&'static str),
}
