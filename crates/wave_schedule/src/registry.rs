//! System registry: declarations paired with their bodies.
//!
//! Registration is cheap and unchecked. All validation happens once, in
//! [`SystemRegistry::build`], which produces the shared [`SchedulePlan`] every
//! run configuration is derived from.

use std::collections::BTreeMap;
use std::sync::Arc;

use wave_component::ComponentRegistry;

use crate::build::build_schedule;
use crate::declaration::SystemDeclaration;
use crate::error::CycleError;
use crate::schedule::SchedulePlan;
use crate::system::System;

struct Entry {
    declaration: SystemDeclaration,
    body: Box<dyn System>,
}

/// Collects systems before the one-shot build.
#[derive(Default)]
pub struct SystemRegistry {
    entries: Vec<Entry>,
}

impl SystemRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system.
    pub fn register(
        &mut self,
        declaration: SystemDeclaration,
        body: impl System + 'static,
    ) -> &mut Self {
        self.entries.push(Entry {
            declaration,
            body: Box::new(body),
        });
        self
    }

    /// Registered declarations, in registration order.
    pub fn declarations(&self) -> impl Iterator<Item = &SystemDeclaration> {
        self.entries.iter().map(|entry| &entry.declaration)
    }

    /// Number of registered systems, valid or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate, order and place every registered system.
    ///
    /// Bodies of systems excluded by a declaration error are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] if explicit ordering is cyclic.
    pub fn build(
        self,
        components: Arc<ComponentRegistry>,
    ) -> Result<Arc<SchedulePlan>, CycleError> {
        let declarations: Vec<SystemDeclaration> = self.declarations().cloned().collect();
        let waves = build_schedule(&declarations, &components)?;

        let mut bodies = BTreeMap::new();
        for Entry { declaration, body } in self.entries {
            if let Some(id) = waves.id_of(&declaration.name) {
                bodies.insert(id, body);
            }
        }
        Ok(Arc::new(SchedulePlan::new(components, waves, bodies)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::per_batch;

    fn components() -> Arc<ComponentRegistry> {
        Arc::new(ComponentRegistry::from_names(["Position", "Velocity"]).unwrap())
    }

    #[test]
    fn test_build_binds_bodies_to_ids() {
        let mut registry = SystemRegistry::new();
        registry
            .register(SystemDeclaration::new("Move").write("Position"), per_batch(|_| Ok(())))
            .register(SystemDeclaration::new("Gravity").write("Velocity"), per_batch(|_| Ok(())));
        assert_eq!(registry.len(), 2);

        let plan = registry.build(components()).unwrap();
        assert_eq!(plan.waves().system_count(), 2);
        assert!(plan.has_body(plan.waves().id_of("Move").unwrap()));
        assert!(plan.has_body(plan.waves().id_of("Gravity").unwrap()));
    }

    #[test]
    fn test_excluded_systems_lose_their_bodies() {
        let mut registry = SystemRegistry::new();
        registry
            .register(SystemDeclaration::new("Move").write("Position"), per_batch(|_| Ok(())))
            .register(SystemDeclaration::new("Broken").write("Mass"), per_batch(|_| Ok(())));

        let plan = registry.build(components()).unwrap();
        assert_eq!(plan.waves().system_count(), 1);
        assert_eq!(plan.waves().diagnostics().len(), 1);
    }

    #[test]
    fn test_cycle_fails_build() {
        let mut registry = SystemRegistry::new();
        registry
            .register(
                SystemDeclaration::new("A").read("Position").after("B"),
                per_batch(|_| Ok(())),
            )
            .register(
                SystemDeclaration::new("B").read("Position").after("A"),
                per_batch(|_| Ok(())),
            );
        let Err(err) = registry.build(components()) else {
            panic!("expected a cycle");
        };
        assert_eq!(err.members, vec!["A", "B"]);
    }
}
