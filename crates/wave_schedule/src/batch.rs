//! Batches and the views systems see.
//!
//! The scheduler never looks at memory layout. A [`BatchSource`] hands it a
//! list of [`Batch`]es per system, each a contiguous row range over a set of
//! [`SharedColumn`]s. Systems then read and write through a [`BatchView`] or
//! an [`EntityView`], which only grant what the system declared.
//!
//! There are no runtime locks between systems. Two systems in one wave never
//! conflict, so their views never alias. Inside one view a small borrow log
//! stops a system from taking `&mut` and `&` to the same column at once.

use std::any::Any;
use std::cell::{RefCell, UnsafeCell};
use std::ops::Range;

use wave_component::{
    BitSet, Component, ComponentAccess, ComponentRegistry, ComponentTypeId, Entity,
};

use crate::declaration::AccessMode;
use crate::error::AccessError;

/// Column storage that batches can share across worker threads.
///
/// Values live in [`UnsafeCell`]s so that row ranges can be lent out mutably
/// through a shared reference during dispatch.
#[derive(Debug, Default)]
pub struct SharedColumn<T> {
    slots: Vec<UnsafeCell<T>>,
}

// SAFETY: concurrent access only happens through `slice`/`slice_mut` whose
// callers guarantee rows are never shared with a writer.
unsafe impl<T: Send + Sync> Sync for SharedColumn<T> {}

impl<T> SharedColumn<T> {
    /// Create an empty column.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a row.
    pub fn push(&mut self, value: T) {
        self.slots.push(UnsafeCell::new(value));
    }

    /// Remove a row, moving the last row into its place.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn swap_remove(&mut self, row: usize) -> T {
        self.slots.swap_remove(row).into_inner()
    }

    /// Shared access to one row.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&T> {
        // SAFETY: writers go through `slice_mut`, whose contract excludes
        // any other reference to the row.
        self.slots.get(row).map(|slot| unsafe { &*slot.get() })
    }

    /// Exclusive access to one row.
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.slots.get_mut(row).map(UnsafeCell::get_mut)
    }

    /// Shared view of a row range.
    #[must_use]
    pub fn slice(&self, rows: Range<usize>) -> Option<&[T]> {
        let slots = self.slots.get(rows)?;
        let start = UnsafeCell::raw_get(slots.as_ptr());
        // SAFETY: `UnsafeCell<T>` has the layout of `T`.
        Some(unsafe { std::slice::from_raw_parts(start, slots.len()) })
    }

    /// Exclusive view of a row range through a shared reference.
    ///
    /// # Safety
    ///
    /// For as long as the returned slice lives, no other reference to any of
    /// these rows may exist or be created.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, rows: Range<usize>) -> Option<&mut [T]> {
        let slots = self.slots.get(rows)?;
        let start = UnsafeCell::raw_get(slots.as_ptr());
        // SAFETY: layout as in `slice`; exclusivity is the caller's contract.
        Some(unsafe { std::slice::from_raw_parts_mut(start, slots.len()) })
    }
}

impl<T> FromIterator<T> for SharedColumn<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(UnsafeCell::new).collect(),
        }
    }
}

/// A contiguous row range over some columns.
pub struct Batch<'a> {
    entities: &'a [Entity],
    rows: Range<usize>,
    columns: Vec<(ComponentTypeId, &'a (dyn Any + Send + Sync))>,
}

impl<'a> Batch<'a> {
    /// Start a batch over `rows` of a table whose row entities are
    /// `entities`.
    #[must_use]
    pub fn new(entities: &'a [Entity], rows: Range<usize>) -> Self {
        let end = rows.end.min(entities.len());
        let start = rows.start.min(end);
        Self {
            entities: &entities[start..end],
            rows: start..end,
            columns: Vec::new(),
        }
    }

    /// Attach the column of `component`. The column must be a
    /// [`SharedColumn<T>`] for the component's Rust type.
    #[must_use]
    pub fn with_column(
        mut self,
        component: ComponentTypeId,
        column: &'a (dyn Any + Send + Sync),
    ) -> Self {
        self.columns.push((component, column));
        self
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the batch holds no unit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities of the batch, row by row.
    #[must_use]
    pub fn entities(&self) -> &'a [Entity] {
        self.entities
    }

    /// Row range within the underlying table.
    #[must_use]
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    fn column(&self, component: ComponentTypeId) -> Option<&'a (dyn Any + Send + Sync)> {
        self.columns
            .iter()
            .find(|(id, _)| *id == component)
            .map(|&(_, column)| column)
    }
}

/// The data layer the dispatcher pulls batches from.
///
/// # Safety
///
/// Batches returned by one `resolve` call must cover disjoint rows of every
/// column they carry, and a column registered for a component must not be
/// reachable under another component's id. Views lend out `&mut` row ranges
/// relying on both.
pub unsafe trait BatchSource: Sync {
    /// Every batch matching `access`.
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn resolve(&self, access: &ComponentAccess) -> anyhow::Result<Vec<Batch<'_>>>;
}

#[derive(Clone, Copy)]
struct Scope<'a> {
    batch: &'a Batch<'a>,
    access: &'a ComponentAccess,
    components: &'a ComponentRegistry,
}

impl<'a> Scope<'a> {
    fn column<T: Component>(
        &self,
        mode: AccessMode,
    ) -> Result<(usize, &'a SharedColumn<T>), AccessError> {
        let component = T::type_name();
        let id = self
            .components
            .id_of::<T>()
            .ok_or(AccessError::Unregistered { component })?;
        let declared = match mode {
            AccessMode::Read => self.access.can_read(id),
            AccessMode::Write => self.access.can_write(id),
        };
        if !declared {
            return Err(AccessError::NotDeclared { component, mode });
        }
        let column = self
            .batch
            .column(id)
            .ok_or(AccessError::MissingColumn { component })?
            .downcast_ref::<SharedColumn<T>>()
            .ok_or(AccessError::ColumnMismatch { component })?;
        if column.len() < self.batch.rows.end {
            return Err(AccessError::ColumnMismatch { component });
        }
        Ok((id.index(), column))
    }
}

#[derive(Default)]
struct BorrowLog {
    shared: BitSet,
    exclusive: BitSet,
}

impl BorrowLog {
    fn claim(&mut self, bit: usize, mode: AccessMode) -> bool {
        if self.exclusive.contains(bit) {
            return false;
        }
        match mode {
            AccessMode::Read => {
                self.shared.insert(bit);
                true
            }
            AccessMode::Write if self.shared.contains(bit) => false,
            AccessMode::Write => {
                self.exclusive.insert(bit);
                true
            }
        }
    }
}

/// What a batch-granular system sees for one batch.
pub struct BatchView<'a> {
    scope: Scope<'a>,
    log: RefCell<BorrowLog>,
}

impl<'a> BatchView<'a> {
    pub(crate) fn new(
        batch: &'a Batch<'a>,
        access: &'a ComponentAccess,
        components: &'a ComponentRegistry,
    ) -> Self {
        Self {
            scope: Scope {
                batch,
                access,
                components,
            },
            log: RefCell::default(),
        }
    }

    /// Number of units in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scope.batch.len()
    }

    /// Returns `true` if the batch holds no unit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scope.batch.is_empty()
    }

    /// Entities of the batch, row by row.
    #[must_use]
    pub fn entities(&self) -> &'a [Entity] {
        self.scope.batch.entities()
    }

    /// Shared view of component `T` for every unit of the batch.
    ///
    /// # Errors
    ///
    /// Fails if `T` was not declared, is missing from the batch, or is
    /// already borrowed mutably through this view.
    pub fn read<T: Component>(&self) -> Result<&[T], AccessError> {
        let (bit, column) = self.scope.column::<T>(AccessMode::Read)?;
        if !self.log.borrow_mut().claim(bit, AccessMode::Read) {
            return Err(AccessError::AlreadyBorrowed {
                component: T::type_name(),
            });
        }
        column
            .slice(self.scope.batch.rows())
            .ok_or(AccessError::ColumnMismatch {
                component: T::type_name(),
            })
    }

    /// Exclusive view of component `T` for every unit of the batch.
    ///
    /// # Errors
    ///
    /// Fails if `T` was not declared for write, is missing from the batch, or
    /// is already borrowed through this view.
    #[allow(clippy::mut_from_ref)]
    pub fn write<T: Component>(&self) -> Result<&mut [T], AccessError> {
        let (bit, column) = self.scope.column::<T>(AccessMode::Write)?;
        if !self.log.borrow_mut().claim(bit, AccessMode::Write) {
            return Err(AccessError::AlreadyBorrowed {
                component: T::type_name(),
            });
        }
        // SAFETY: the rows belong to this batch only, no system sharing the
        // wave touches `T`, and the log keeps this view from lending them twice.
        unsafe { column.slice_mut(self.scope.batch.rows()) }.ok_or(AccessError::ColumnMismatch {
            component: T::type_name(),
        })
    }

    pub(crate) fn unit(&self, row: usize) -> EntityView<'a> {
        EntityView {
            scope: self.scope,
            row,
            log: RefCell::default(),
        }
    }
}

/// What an entity-granular system sees for one unit.
pub struct EntityView<'a> {
    scope: Scope<'a>,
    row: usize,
    log: RefCell<BorrowLog>,
}

impl EntityView<'_> {
    /// The entity being visited.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.scope.batch.entities()[self.row]
    }

    /// Shared access to this entity's `T`.
    ///
    /// # Errors
    ///
    /// As for [`BatchView::read`].
    pub fn read<T: Component>(&self) -> Result<&T, AccessError> {
        let (bit, column) = self.scope.column::<T>(AccessMode::Read)?;
        if !self.log.borrow_mut().claim(bit, AccessMode::Read) {
            return Err(AccessError::AlreadyBorrowed {
                component: T::type_name(),
            });
        }
        let row = self.scope.batch.rows.start + self.row;
        column
            .slice(row..row + 1)
            .and_then(<[T]>::first)
            .ok_or(AccessError::ColumnMismatch {
                component: T::type_name(),
            })
    }

    /// Exclusive access to this entity's `T`.
    ///
    /// # Errors
    ///
    /// As for [`BatchView::write`].
    #[allow(clippy::mut_from_ref)]
    pub fn write<T: Component>(&self) -> Result<&mut T, AccessError> {
        let (bit, column) = self.scope.column::<T>(AccessMode::Write)?;
        if !self.log.borrow_mut().claim(bit, AccessMode::Write) {
            return Err(AccessError::AlreadyBorrowed {
                component: T::type_name(),
            });
        }
        let row = self.scope.batch.rows.start + self.row;
        // SAFETY: as in `BatchView::write`; units of one batch are visited one
        // at a time and each view lends its row once.
        unsafe { column.slice_mut(row..row + 1) }
            .and_then(<[T]>::first_mut)
            .ok_or(AccessError::ColumnMismatch {
                component: T::type_name(),
            })
    }
}
