//! The in-memory world.
//!
//! [`World`] owns entity allocation and archetype storage, and serves batches
//! to a [`Schedule`](wave_schedule::Schedule) through [`BatchSource`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use wave_component::{
    BitSet, Component, ComponentAccess, ComponentRegistry, ComponentTypeId, Entity, EntityAllocator,
};
use wave_schedule::{Batch, BatchSource};

use crate::archetype::{ArchetypeId, ArchetypeTable, ErasedColumn, TypedColumn};
use crate::error::WorldError;

/// Rows per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    archetype: ArchetypeId,
    row: usize,
}

/// Entities and their components, grouped by archetype.
#[derive(Debug)]
pub struct World {
    components: Arc<ComponentRegistry>,
    allocator: EntityAllocator,
    archetypes: Vec<ArchetypeTable>,
    by_signature: HashMap<BitSet, ArchetypeId>,
    locations: HashMap<Entity, Location>,
    batch_size: usize,
}

impl World {
    /// Create an empty world over `components`.
    ///
    /// Schedules run against this world must be built with the same registry.
    #[must_use]
    pub fn new(components: Arc<ComponentRegistry>) -> Self {
        Self {
            components,
            allocator: EntityAllocator::new(),
            archetypes: Vec::new(),
            by_signature: HashMap::new(),
            locations: HashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the maximum rows per batch. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Maximum rows per batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The component registry.
    #[must_use]
    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// Start spawning an entity.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use wave_component::{Component, ComponentRegistry};
    /// # use wave_world::World;
    /// struct Health(u32);
    /// impl Component for Health {
    ///     fn type_name() -> &'static str { "Health" }
    /// }
    ///
    /// let mut components = ComponentRegistry::new();
    /// components.register::<Health>().unwrap();
    /// let mut world = World::new(Arc::new(components));
    /// let entity = world.spawn().with(Health(10)).build().unwrap();
    /// assert_eq!(world.get::<Health>(entity).unwrap().0, 10);
    /// ```
    pub fn spawn(&mut self) -> EntityBuilder<'_> {
        EntityBuilder {
            world: self,
            pending: Vec::new(),
            error: None,
        }
    }

    /// Destroy an entity.
    ///
    /// Returns `true` if the entity existed and was removed.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(location) = self.locations.remove(&entity) else {
            return false;
        };
        if let Some(table) = self.archetypes.get_mut(location.archetype.index())
            && let Some(moved) = table.swap_remove(location.row)
            && let Some(moved_location) = self.locations.get_mut(&moved)
        {
            moved_location.row = location.row;
        }
        self.allocator.free(entity);
        true
    }

    /// Returns `true` if `entity` is alive.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    /// Component `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if the entity is gone, `T` is unregistered, or the entity has no `T`.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, WorldError> {
        let (location, component) = self.locate::<T>(entity)?;
        self.archetypes[location.archetype.index()]
            .typed::<T>(component)
            .and_then(|column| column.get(location.row))
            .ok_or(WorldError::ComponentNotFound {
                component: T::type_name(),
                entity,
            })
    }

    /// Mutable component `T` of `entity`.
    ///
    /// # Errors
    ///
    /// As for [`World::get`].
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, WorldError> {
        let (location, component) = self.locate::<T>(entity)?;
        self.archetypes[location.archetype.index()]
            .typed_mut::<T>(component)
            .and_then(|column| column.get_mut(location.row))
            .ok_or(WorldError::ComponentNotFound {
                component: T::type_name(),
                entity,
            })
    }

    fn locate<T: Component>(
        &self,
        entity: Entity,
    ) -> Result<(Location, ComponentTypeId), WorldError> {
        let location = *self
            .locations
            .get(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        let component = self
            .components
            .id_of::<T>()
            .ok_or(WorldError::Unregistered(T::type_name()))?;
        Ok((location, component))
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of archetypes ever created.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetype tables, in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &ArchetypeTable> {
        self.archetypes.iter()
    }

    /// Tables whose signature matches `access`.
    #[must_use]
    pub fn matching_archetypes(&self, access: &ComponentAccess) -> Vec<&ArchetypeTable> {
        self.archetypes
            .iter()
            .filter(|table| access.matches(table.signature()))
            .collect()
    }

    fn archetype_for(
        &mut self,
        signature: BitSet,
        columns: impl FnOnce() -> Vec<Box<dyn ErasedColumn>>,
    ) -> ArchetypeId {
        if let Some(&id) = self.by_signature.get(&signature) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        debug!(archetype = %id, components = signature.len(), "created archetype");
        self.archetypes.push(ArchetypeTable::new(id, columns()));
        self.by_signature.insert(signature, id);
        id
    }
}

// SAFETY: batches of one call come from distinct tables or from
// non-overlapping row chunks of one table, and each table keeps exactly one
// column per component id.
unsafe impl BatchSource for World {
    fn resolve(&self, access: &ComponentAccess) -> anyhow::Result<Vec<Batch<'_>>> {
        Ok(self
            .matching_archetypes(access)
            .into_iter()
            .filter(|table| !table.is_empty())
            .flat_map(|table| table.batches(access, self.batch_size))
            .collect())
    }
}

trait PendingComponent: Send {
    fn component(&self) -> ComponentTypeId;
    fn new_column(&self) -> Box<dyn ErasedColumn>;
    fn push_into(self: Box<Self>, column: &mut dyn ErasedColumn) -> bool;
}

struct Pending<T: Component> {
    component: ComponentTypeId,
    value: T,
}

impl<T: Component> PendingComponent for Pending<T> {
    fn component(&self) -> ComponentTypeId {
        self.component
    }

    fn new_column(&self) -> Box<dyn ErasedColumn> {
        Box::new(TypedColumn::<T>::new(self.component))
    }

    fn push_into(self: Box<Self>, column: &mut dyn ErasedColumn) -> bool {
        match column.as_any_mut().downcast_mut::<TypedColumn<T>>() {
            Some(column) => {
                column.push(self.value);
                true
            }
            None => false,
        }
    }
}

/// Collects the components of an entity being spawned.
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    pending: Vec<Box<dyn PendingComponent>>,
    error: Option<WorldError>,
}

impl EntityBuilder<'_> {
    /// Add a component.
    #[must_use]
    pub fn with<T: Component>(mut self, value: T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.world.components.id_of::<T>() {
            None => self.error = Some(WorldError::Unregistered(T::type_name())),
            Some(component) if self.pending.iter().any(|p| p.component() == component) => {
                self.error = Some(WorldError::DuplicateComponent(T::type_name()));
            }
            Some(component) => self.pending.push(Box::new(Pending { component, value })),
        }
        self
    }

    /// Allocate the entity and store its components.
    ///
    /// # Errors
    ///
    /// Returns the first problem recorded by [`EntityBuilder::with`]; nothing
    /// is spawned in that case.
    pub fn build(self) -> Result<Entity, WorldError> {
        let Self { world, pending, error } = self;
        if let Some(error) = error {
            return Err(error);
        }

        let signature: BitSet = pending.iter().map(|p| p.component().index()).collect();
        let archetype =
            world.archetype_for(signature, || pending.iter().map(|p| p.new_column()).collect());
        let entity = world.allocator.allocate();
        let table = &mut world.archetypes[archetype.index()];

        for component in pending {
            let pushed = table
                .column_index(component.component())
                .and_then(|index| table.column_mut(index))
                .is_some_and(|column| component.push_into(column));
            debug_assert!(pushed, "archetype columns follow the signature");
        }
        let row = table.push_entity(entity);
        world.locations.insert(entity, Location { archetype, row });
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(f32);
    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Velocity(f32);
    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Frozen;
    impl Component for Frozen {
        fn type_name() -> &'static str {
            "Frozen"
        }
    }

    struct Unregistered;
    impl Component for Unregistered {
        fn type_name() -> &'static str {
            "Unregistered"
        }
    }

    fn world() -> World {
        let mut components = ComponentRegistry::new();
        components.register::<Position>().unwrap();
        components.register::<Velocity>().unwrap();
        components.register::<Frozen>().unwrap();
        World::new(Arc::new(components))
    }

    fn id<T: Component>(world: &World) -> ComponentTypeId {
        world.components().id_of::<T>().unwrap()
    }

    #[test]
    fn test_spawn_and_get() {
        let mut world = world();
        let e = world.spawn().with(Position(1.0)).with(Velocity(2.0)).build().unwrap();
        assert_eq!(world.get::<Position>(e).unwrap(), &Position(1.0));
        world.get_mut::<Velocity>(e).unwrap().0 = 3.0;
        assert_eq!(world.get::<Velocity>(e).unwrap(), &Velocity(3.0));
        assert_eq!(
            world.get::<Frozen>(e).unwrap_err(),
            WorldError::ComponentNotFound {
                component: "Frozen",
                entity: e
            }
        );
    }

    #[test]
    fn test_same_signature_shares_archetype() {
        let mut world = world();
        world.spawn().with(Position(0.0)).with(Velocity(0.0)).build().unwrap();
        world.spawn().with(Velocity(0.0)).with(Position(0.0)).build().unwrap();
        world.spawn().with(Position(0.0)).build().unwrap();
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.archetype_count(), 2);
    }

    #[test]
    fn test_spawn_errors_leave_world_untouched() {
        let mut world = world();
        let err = world.spawn().with(Position(0.0)).with(Unregistered).build().unwrap_err();
        assert_eq!(err, WorldError::Unregistered("Unregistered"));
        let err = world.spawn().with(Position(0.0)).with(Position(1.0)).build().unwrap_err();
        assert_eq!(err, WorldError::DuplicateComponent("Position"));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.archetype_count(), 0);
    }

    #[test]
    fn test_despawn_moves_last_row() {
        let mut world = world();
        let a = world.spawn().with(Position(1.0)).build().unwrap();
        let b = world.spawn().with(Position(2.0)).build().unwrap();
        let c = world.spawn().with(Position(3.0)).build().unwrap();

        assert!(world.despawn(a));
        assert!(!world.despawn(a));
        assert_eq!(world.get::<Position>(c).unwrap(), &Position(3.0));
        assert_eq!(world.get::<Position>(b).unwrap(), &Position(2.0));
        assert_eq!(world.get::<Position>(a).unwrap_err(), WorldError::EntityNotFound(a));
        assert_eq!(world.entity_count(), 2);
    }

    #[test]
    fn test_recycled_slot_gets_new_generation() {
        let mut world = world();
        let a = world.spawn().with(Position(1.0)).build().unwrap();
        world.despawn(a);
        let b = world.spawn().with(Position(2.0)).build().unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!world.contains(a));
    }

    #[test]
    fn test_resolve_filters_archetypes() {
        let mut world = world().with_batch_size(2);
        for i in 0..5 {
            world.spawn().with(Position(i as f32)).with(Velocity(1.0)).build().unwrap();
        }
        for i in 0..3 {
            world
                .spawn()
                .with(Position(i as f32))
                .with(Velocity(1.0))
                .with(Frozen)
                .build()
                .unwrap();
        }
        world.spawn().with(Position(0.0)).build().unwrap();

        let moving = ComponentAccess::new()
            .write(id::<Position>(&world))
            .read(id::<Velocity>(&world))
            .without(id::<Frozen>(&world));
        assert_eq!(world.matching_archetypes(&moving).len(), 1);
        let batches = world.resolve(&moving).unwrap();
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![2, 2, 1]);

        let positioned = ComponentAccess::new().read(id::<Position>(&world));
        let total: usize = world.resolve(&positioned).unwrap().iter().map(Batch::len).sum();
        assert_eq!(total, 9);

        let frozen_or_fast = ComponentAccess::new()
            .read(id::<Position>(&world))
            .any(id::<Frozen>(&world));
        let total: usize = world.resolve(&frozen_or_fast).unwrap().iter().map(Batch::len).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_empty_tables_yield_no_batches() {
        let mut world = world();
        let e = world.spawn().with(Velocity(0.0)).build().unwrap();
        world.despawn(e);
        let access = ComponentAccess::new().read(id::<Velocity>(&world));
        assert!(world.resolve(&access).unwrap().is_empty());
    }
}
