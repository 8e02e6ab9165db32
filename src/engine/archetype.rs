//! # Archetypes
//!
//! An [`Archetype`] stores every entity that shares one [`Signature`]: the
//! dense list of entity ids plus one chunked [`Column`] per component index in
//! the signature.
//!
//! ## Layout
//!
//! ```text
//! entity_ids : [e0, e1, e2, ..., eN-1]
//! columns    : slot 0 -> Column<A> (chunks of CHUNK_SIZE rows)
//!              slot 1 -> Column<B>
//! heap_map   : component index -> column slot
//! ```
//!
//! For every row `i < len`, the value of every column at chunk
//! `i / CHUNK_SIZE`, slot `i % CHUNK_SIZE` belongs to `entity_ids[i]`.
//!
//! ## Concurrency model
//!
//! Each column sits behind a `parking_lot::RwLock`. Structural operations take
//! `&mut Archetype` and reach the columns through `RwLock::get_mut`, so they
//! never lock. Shared access (queries, entity handles) uses `try_read` /
//! `try_write` and reports [`EcsError::ColumnBorrowed`] instead of blocking
//! when another borrow of the same column is live.

use std::fmt;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::component::{Component, Schema, TypeKind};
use crate::engine::error::{EcsError, EcsResult, SchemaError};
use crate::engine::storage::{Column, ErasedColumn};
use crate::engine::types::{
    chunk_count_for, chunk_len_for, ArchetypeId, ComponentIndex, EntityId, Row, Signature, CHUNK_SIZE,
};

/// Storage for all entities sharing one signature.
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    entity_ids: Vec<EntityId>,
    columns: Vec<RwLock<Box<dyn ErasedColumn>>>,
    column_types: Vec<ComponentIndex>,
    heap_map: Vec<Option<u8>>,
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("len", &self.entity_ids.len())
            .finish()
    }
}

impl Archetype {
    /// Builds an empty archetype with one column per component in `signature`.
    ///
    /// ## Errors
    /// [`SchemaError::UnknownIndex`] if the signature names an index the
    /// schema does not own.
    pub(crate) fn new(id: ArchetypeId, signature: Signature, schema: &Schema) -> Result<Self, SchemaError> {
        schema.check_components(&signature.components)?;
        schema.check_tags(&signature.tags)?;

        let column_types: Vec<ComponentIndex> =
            signature.components.iter().map(|i| i as ComponentIndex).collect();
        let map_len = column_types.last().map_or(0, |&i| i as usize + 1);
        let mut heap_map = vec![None; map_len];
        let mut columns = Vec::with_capacity(column_types.len());

        for (slot, &index) in column_types.iter().enumerate() {
            let component = schema
                .component(index)
                .ok_or(SchemaError::UnknownIndex { kind: TypeKind::Component, index: index as usize })?;
            heap_map[index as usize] = Some(slot as u8);
            columns.push(RwLock::new(component.new_column()));
        }

        Ok(Self { id, signature, entity_ids: Vec::new(), columns, column_types, heap_map })
    }

    /// Dense id of this archetype within its store.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Component and tag membership.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    /// Returns `true` if the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    /// Number of chunks holding at least one entity.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        chunk_count_for(self.len())
    }

    /// Number of valid rows in `chunk`.
    #[inline]
    pub fn chunk_len(&self, chunk: usize) -> usize {
        chunk_len_for(self.len(), chunk)
    }

    /// Entity ids in row order.
    #[inline]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entity_ids
    }

    /// Entity ids of the rows in `chunk`.
    #[inline]
    pub fn chunk_entities(&self, chunk: usize) -> &[EntityId] {
        let start = (chunk * CHUNK_SIZE).min(self.len());
        let end = (start + CHUNK_SIZE).min(self.len());
        &self.entity_ids[start..end]
    }

    /// Component indices in ascending order, one per column.
    #[inline]
    pub fn component_types(&self) -> &[ComponentIndex] {
        &self.column_types
    }

    /// Returns `true` if the archetype stores component `index`.
    #[inline]
    pub fn has_component(&self, index: ComponentIndex) -> bool {
        self.column_slot(index).is_some()
    }

    /// Column slot of component `index`.
    #[inline]
    pub fn column_slot(&self, index: ComponentIndex) -> Option<usize> {
        self.heap_map.get(index as usize).copied().flatten().map(usize::from)
    }

    /// Appends `id` with default values for every column and returns its row.
    pub(crate) fn add_entity(&mut self, id: EntityId) -> Row {
        for column in &mut self.columns {
            column.get_mut().push_default();
        }
        self.entity_ids.push(id);
        self.entity_ids.len() - 1
    }

    /// Appends `id` with a clone of every value at `row`.
    pub(crate) fn clone_row(&mut self, row: Row, id: EntityId) -> Row {
        for column in &mut self.columns {
            column.get_mut().push_clone(row);
        }
        self.entity_ids.push(id);
        self.entity_ids.len() - 1
    }

    /// Swap-removes `row` from every column and from the id list.
    ///
    /// Returns the id of the entity promoted into `row`, if any.
    pub(crate) fn remove_entity(&mut self, row: Row) -> Option<EntityId> {
        for column in &mut self.columns {
            column.get_mut().swap_remove_row(row);
        }
        self.entity_ids.swap_remove(row);
        self.entity_ids.get(row).copied()
    }

    /// Moves the entity at `row` into `destination`.
    ///
    /// Values of components present in both signatures are moved, components
    /// only in `destination` get their default value, components only in
    /// `self` are dropped. Returns the new row in `destination` and the id of
    /// the entity promoted into `row` here, if any.
    pub(crate) fn move_entity_to(
        &mut self,
        row: Row,
        destination: &mut Archetype,
    ) -> EcsResult<(Row, Option<EntityId>)> {
        debug_assert!(row < self.len());
        let id = self.entity_ids[row];

        for (slot, &index) in destination.column_types.iter().enumerate() {
            let target = destination.columns[slot].get_mut();
            match self.column_slot(index) {
                Some(source_slot) => self.columns[source_slot].get_mut().move_row_to(row, &mut **target)?,
                None => target.push_default(),
            }
        }
        for &index in &self.column_types {
            if !destination.has_component(index) {
                if let Some(slot) = self.column_slot(index) {
                    self.columns[slot].get_mut().swap_remove_row(row);
                }
            }
        }

        self.entity_ids.swap_remove(row);
        destination.entity_ids.push(id);
        Ok((destination.entity_ids.len() - 1, self.entity_ids.get(row).copied()))
    }

    /// Typed column for exclusive (`&mut`) access. No locking.
    pub(crate) fn column_mut<T: Component>(&mut self, index: ComponentIndex) -> Option<&mut Column<T>> {
        let slot = self.column_slot(index)?;
        self.columns[slot].get_mut().as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Erased column for exclusive (`&mut`) access. No locking.
    pub(crate) fn erased_column_mut(&mut self, index: ComponentIndex) -> Option<&mut dyn ErasedColumn> {
        let slot = self.column_slot(index)?;
        Some(&mut **self.columns[slot].get_mut())
    }

    /// Shared typed view of component `index`.
    ///
    /// `Ok(None)` if the archetype does not store the component.
    ///
    /// ## Errors
    /// [`EcsError::ColumnBorrowed`] if the column is write-locked.
    pub fn try_read_column<T: Component>(
        &self,
        index: ComponentIndex,
    ) -> EcsResult<Option<MappedRwLockReadGuard<'_, Column<T>>>> {
        let Some(slot) = self.column_slot(index) else { return Ok(None) };
        let guard = self.columns[slot]
            .try_read()
            .ok_or(EcsError::ColumnBorrowed { component: T::KEY })?;
        RwLockReadGuard::try_map(guard, |column| column.as_any().downcast_ref::<Column<T>>())
            .map(Some)
            .map_err(|guard| EcsError::TypeMismatch {
                expected: guard.element_type_name(),
                actual: std::any::type_name::<T>(),
            })
    }

    /// Exclusive typed view of component `index` through a shared archetype.
    ///
    /// `Ok(None)` if the archetype does not store the component.
    ///
    /// ## Errors
    /// [`EcsError::ColumnBorrowed`] if the column is read- or write-locked.
    pub fn try_write_column<T: Component>(
        &self,
        index: ComponentIndex,
    ) -> EcsResult<Option<MappedRwLockWriteGuard<'_, Column<T>>>> {
        let Some(slot) = self.column_slot(index) else { return Ok(None) };
        let guard = self.columns[slot]
            .try_write()
            .ok_or(EcsError::ColumnBorrowed { component: T::KEY })?;
        RwLockWriteGuard::try_map(guard, |column| column.as_any_mut().downcast_mut::<Column<T>>())
            .map(Some)
            .map_err(|guard| EcsError::TypeMismatch {
                expected: guard.element_type_name(),
                actual: std::any::type_name::<T>(),
            })
    }
}

/// Returns two distinct archetypes mutably.
///
/// ## Panics
/// Panics if `a == b` or either id is out of bounds.
pub(crate) fn archetype_pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    assert!(a != b, "source and destination archetype must differ");
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let (head, tail) = archetypes.split_at_mut(high as usize);

    let left = &mut head[low as usize];
    let right = &mut tail[0];

    if a < b { (left, right) } else { (right, left) }
}
