//! Archetype tables.
//!
//! An archetype is a unique set of component types. Entities sharing the same
//! set live in the same [`ArchetypeTable`], one typed column per component,
//! row `i` of every column belonging to `entities[i]`.

use std::any::Any;
use std::fmt;

use wave_component::{BitSet, Component, ComponentAccess, ComponentTypeId, Entity};
use wave_schedule::{Batch, SharedColumn};

/// Dense index of an archetype, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub u32);

impl ArchetypeId {
    /// The id as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archetype#{}", self.0)
    }
}

/// A column with its element type erased.
pub trait ErasedColumn: Send + Sync {
    /// The component stored here.
    fn component(&self) -> ComponentTypeId;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Returns `true` if the column has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop one row, moving the last row into its place.
    fn swap_remove(&mut self, row: usize);

    /// The underlying [`SharedColumn`], for batches.
    fn shared(&self) -> &(dyn Any + Send + Sync);

    /// The concrete column, for typed access.
    fn as_any(&self) -> &dyn Any;

    /// The concrete column, for typed mutable access and pushes.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A column of `T` values.
pub struct TypedColumn<T: Component> {
    component: ComponentTypeId,
    cells: SharedColumn<T>,
}

impl<T: Component> TypedColumn<T> {
    /// Create an empty column for `component`.
    #[must_use]
    pub fn new(component: ComponentTypeId) -> Self {
        Self {
            component,
            cells: SharedColumn::new(),
        }
    }

    /// Append a row.
    pub fn push(&mut self, value: T) {
        self.cells.push(value);
    }

    /// Value at `row`.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.cells.get(row)
    }

    /// Mutable value at `row`.
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.cells.get_mut(row)
    }
}

impl<T: Component> ErasedColumn for TypedColumn<T> {
    fn component(&self) -> ComponentTypeId {
        self.component
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn swap_remove(&mut self, row: usize) {
        self.cells.swap_remove(row);
    }

    fn shared(&self) -> &(dyn Any + Send + Sync) {
        &self.cells
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All entities with exactly one set of component types.
pub struct ArchetypeTable {
    id: ArchetypeId,
    signature: BitSet,
    entities: Vec<Entity>,
    /// Sorted by component id.
    columns: Vec<Box<dyn ErasedColumn>>,
}

impl ArchetypeTable {
    /// Create an empty table from its columns.
    #[must_use]
    pub fn new(id: ArchetypeId, mut columns: Vec<Box<dyn ErasedColumn>>) -> Self {
        columns.sort_by_key(|column| column.component());
        let signature = columns.iter().map(|column| column.component().index()).collect();
        Self {
            id,
            signature,
            entities: Vec::new(),
            columns,
        }
    }

    /// The archetype id.
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The set of component ids stored in this table.
    #[must_use]
    pub fn signature(&self) -> &BitSet {
        &self.signature
    }

    /// Entities, row by row.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the table has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if the table stores `component`.
    #[must_use]
    pub fn has_component(&self, component: ComponentTypeId) -> bool {
        self.signature.contains(component.index())
    }

    /// Position of `component` among the columns.
    #[must_use]
    pub fn column_index(&self, component: ComponentTypeId) -> Option<usize> {
        self.columns
            .binary_search_by_key(&component, |column| column.component())
            .ok()
    }

    pub(crate) fn column_mut(&mut self, index: usize) -> Option<&mut (dyn ErasedColumn + 'static)> {
        self.columns.get_mut(index).map(|column| column.as_mut())
    }

    /// Typed column of `component`.
    #[must_use]
    pub fn typed<T: Component>(&self, component: ComponentTypeId) -> Option<&TypedColumn<T>> {
        let index = self.column_index(component)?;
        self.columns[index].as_any().downcast_ref()
    }

    /// Mutable typed column of `component`.
    pub fn typed_mut<T: Component>(
        &mut self,
        component: ComponentTypeId,
    ) -> Option<&mut TypedColumn<T>> {
        let index = self.column_index(component)?;
        self.columns[index].as_any_mut().downcast_mut()
    }

    pub(crate) fn push_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Remove `row` from every column. Returns the entity that moved into
    /// `row`, if any.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.get(row).copied()
    }

    /// Split the table into batches of at most `batch_size` rows, carrying
    /// the columns `access` reads or writes.
    pub fn batches(&self, access: &ComponentAccess, batch_size: usize) -> Vec<Batch<'_>> {
        let batch_size = batch_size.max(1);
        let columns: Vec<_> = self
            .columns
            .iter()
            .filter(|column| access.can_read(column.component()))
            .collect();

        (0..self.len())
            .step_by(batch_size)
            .map(|start| {
                columns.iter().fold(
                    Batch::new(&self.entities, start..start.saturating_add(batch_size)),
                    |batch, &column| batch.with_column(column.component(), column.shared()),
                )
            })
            .collect()
    }
}

impl fmt::Debug for ArchetypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeTable")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("entities", &self.entities.len())
            .finish()
    }
}
