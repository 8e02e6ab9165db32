//! Chunked column storage and its type-erased interface.
//!
//! [`Column<T>`] stores the values of one component type for every entity of
//! one archetype. Values live in fixed-capacity chunks of [`CHUNK_SIZE`] rows:
//!
//! ```text
//! Vec<Vec<T>>   // every inner Vec is allocated with capacity CHUNK_SIZE
//! ```
//!
//! Values are written densely from the start of chunk 0 upward. Every chunk
//! before the last holding values is full; the last one holds the "chunk
//! rest". A chunk's `Vec` length is exactly its number of valid rows, so a
//! chunk slice never exposes uninitialized memory.
//!
//! # Core operations
//!
//! - **Append**: `push` writes into the first chunk that is not full,
//!   allocating a new chunk only when every allocated chunk is full.
//! - **Remove**: `swap_remove` pops the last value and moves it into the
//!   removed slot. O(1), no shifting, order is not preserved.
//! - **Transfer**: `move_row_to` swap-removes a value from one column and
//!   appends it to another column of the same type.
//!
//! Chunks emptied by removals keep their allocation; a column never shrinks
//! its chunk array.
//!
//! # Type erasure
//!
//! Archetypes keep their columns as `Box<dyn ErasedColumn>`. The trait mirrors
//! the structural operations so archetype code never needs `T`, and exposes
//! `as_any` / `as_any_mut` so typed callers downcast once per archetype, not
//! once per entity.

use std::any::{type_name, Any, TypeId};
use std::mem;

use crate::engine::component::Component;
use crate::engine::error::EcsError;
use crate::engine::types::{chunk_of, slot_of, Row, CHUNK_SIZE};

/// Chunked storage for one component type.
pub struct Column<T> {
    chunks: Vec<Vec<T>>,
    len: usize,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { chunks: Vec::new(), len: 0 }
    }
}

impl<T: Component> Column<T> {
    /// Empty column. Allocates nothing until the first push.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the column holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated chunks, including chunks emptied by removals.
    #[inline]
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Appends `value` and returns its row.
    pub fn push(&mut self, value: T) -> Row {
        let row = self.len;
        let chunk = chunk_of(row);
        if chunk == self.chunks.len() {
            self.chunks.push(Vec::with_capacity(CHUNK_SIZE));
        }
        self.chunks[chunk].push(value);
        self.len += 1;
        row
    }

    /// Removes the value at `row`, moving the last value into its slot.
    ///
    /// Returns the removed value, or `None` if `row` is out of bounds.
    pub fn swap_remove(&mut self, row: Row) -> Option<T> {
        if row >= self.len {
            return None;
        }
        let last = self.len - 1;
        let last_value = self.chunks[chunk_of(last)].pop()?;
        self.len -= 1;
        if row == last {
            return Some(last_value);
        }
        Some(mem::replace(&mut self.chunks[chunk_of(row)][slot_of(row)], last_value))
    }

    /// Value at `row`.
    #[inline]
    pub fn get(&self, row: Row) -> Option<&T> {
        if row >= self.len {
            return None;
        }
        self.chunks.get(chunk_of(row))?.get(slot_of(row))
    }

    /// Mutable value at `row`.
    #[inline]
    pub fn get_mut(&mut self, row: Row) -> Option<&mut T> {
        if row >= self.len {
            return None;
        }
        self.chunks.get_mut(chunk_of(row))?.get_mut(slot_of(row))
    }

    /// Overwrites the value at `row` and returns the old one.
    pub fn replace(&mut self, row: Row, value: T) -> Option<T> {
        self.get_mut(row).map(|slot| mem::replace(slot, value))
    }

    /// Valid rows of chunk `chunk`. Empty for chunks past the end.
    #[inline]
    pub fn chunk(&self, chunk: usize) -> &[T] {
        self.chunks.get(chunk).map_or(&[], Vec::as_slice)
    }

    /// Mutable valid rows of chunk `chunk`. Empty for chunks past the end.
    #[inline]
    pub fn chunk_mut(&mut self, chunk: usize) -> &mut [T] {
        match self.chunks.get_mut(chunk) {
            Some(values) => values.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Iterates all values in row order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|chunk| chunk.iter())
    }
}

/// Type-erased interface over [`Column<T>`].
///
/// Implementations keep the column dense: `len()` values, all but the last
/// non-empty chunk full. Rows passed in must be `< len()`; archetype code
/// guarantees this.
pub trait ErasedColumn: Any + Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of allocated chunks.
    fn allocated_chunks(&self) -> usize;

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Appends the element type's `Default` value.
    fn push_default(&mut self);

    /// Appends a clone of the value at `row`.
    fn push_clone(&mut self, row: Row);

    /// Appends a boxed value. Fails if the box does not hold the element type.
    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), EcsError>;

    /// Overwrites the value at `row` with a boxed value.
    fn set_boxed(&mut self, row: Row, value: Box<dyn Any + Send>) -> Result<(), EcsError>;

    /// Swap-removes `row`, dropping its value.
    fn swap_remove_row(&mut self, row: Row);

    /// Swap-removes `row` from `self` and appends the value to `destination`.
    fn move_row_to(&mut self, row: Row, destination: &mut dyn ErasedColumn) -> Result<(), EcsError>;

    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting hook.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

fn type_mismatch<T>(actual: &'static str) -> EcsError {
    EcsError::TypeMismatch { expected: type_name::<T>(), actual }
}

impl<T: Component> ErasedColumn for Column<T> {
    fn len(&self) -> usize { self.len }
    fn allocated_chunks(&self) -> usize { self.chunks.len() }
    fn element_type_id(&self) -> TypeId { TypeId::of::<T>() }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }

    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn push_default(&mut self) {
        self.push(T::default());
    }

    fn push_clone(&mut self, row: Row) {
        debug_assert!(row < self.len);
        if let Some(value) = self.get(row).cloned() {
            self.push(value);
        }
    }

    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), EcsError> {
        let value = value.downcast::<T>().map_err(|_| type_mismatch::<T>("<boxed value>"))?;
        self.push(*value);
        Ok(())
    }

    fn set_boxed(&mut self, row: Row, value: Box<dyn Any + Send>) -> Result<(), EcsError> {
        let value = value.downcast::<T>().map_err(|_| type_mismatch::<T>("<boxed value>"))?;
        match self.get_mut(row) {
            Some(slot) => {
                *slot = *value;
                Ok(())
            }
            None => Err(type_mismatch::<T>("<row out of bounds>")),
        }
    }

    fn swap_remove_row(&mut self, row: Row) {
        let removed = self.swap_remove(row);
        debug_assert!(removed.is_some(), "swap_remove_row: row {row} out of bounds");
    }

    fn move_row_to(&mut self, row: Row, destination: &mut dyn ErasedColumn) -> Result<(), EcsError> {
        let actual = destination.element_type_name();
        let destination = destination
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or_else(|| type_mismatch::<T>(actual))?;
        if let Some(value) = self.swap_remove(row) {
            destination.push(value);
        }
        Ok(())
    }
}
