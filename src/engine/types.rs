//! Core identifiers, capacities and the archetype [`Signature`].
//!
//! These definitions are shared by every other engine module: the storage and
//! archetype layers address rows with them, the query engine matches
//! signatures, and the event layer reports them.
//!
//! ## Layout constants
//!
//! * [`CHUNK_SIZE`] rows per chunk. A power of two so `row / CHUNK_SIZE` and
//!   `row % CHUNK_SIZE` compile to a shift and a mask.
//! * [`MAX_TYPES`] component or tag types per schema. Matches the width of
//!   [`BitSet`] minus the reserved sentinel index `0`.
//!
//! ## Entity ids
//!
//! Entity ids are dense `u32` values starting at `1`. Id `0` is never handed
//! out and is used as "no entity" in the hierarchy tables.

use crate::engine::bitset::{BitSet, BITSET_BITS};

/// Identifier of an entity within one [`EntityStore`](crate::EntityStore).
pub type EntityId = u32;

/// Reserved "no entity" id.
pub const NO_ENTITY: EntityId = 0;

/// Dense index of an archetype inside its store.
pub type ArchetypeId = u32;

/// Dense index of a registered component type (`>= 1`).
pub type ComponentIndex = u8;

/// Dense index of a registered tag type (`>= 1`).
pub type TagIndex = u8;

/// Dense index of a registered script type (`>= 1`).
pub type ScriptIndex = u16;

/// Row index of an entity inside its archetype.
pub type Row = usize;

/// Number of rows stored in every chunk of an archetype column.
pub const CHUNK_SIZE: usize = 512;

const _: () = assert!(CHUNK_SIZE.is_power_of_two());

/// Maximum number of component types, and separately of tag types, a schema
/// can hold. Index `0` is the sentinel so the last usable index is `255`.
pub const MAX_TYPES: usize = BITSET_BITS - 1;

/// Width in bytes of the SIMD register used to derive per-type parallel
/// section granularity.
pub const SIMD_REGISTER_BYTES: usize = 32;

/// Chunk containing `row`.
#[inline]
pub const fn chunk_of(row: Row) -> usize {
    row / CHUNK_SIZE
}

/// Slot of `row` inside its chunk.
#[inline]
pub const fn slot_of(row: Row) -> usize {
    row % CHUNK_SIZE
}

/// Number of chunks needed to hold `len` rows.
#[inline]
pub const fn chunk_count_for(len: usize) -> usize {
    (len + CHUNK_SIZE - 1) / CHUNK_SIZE
}

/// Number of valid rows in chunk `chunk` of an archetype holding `len` rows.
///
/// Every chunk before the last is full; the last one holds the "chunk rest".
#[inline]
pub const fn chunk_len_for(len: usize, chunk: usize) -> usize {
    let start = chunk * CHUNK_SIZE;
    if start >= len {
        0
    } else if len - start >= CHUNK_SIZE {
        CHUNK_SIZE
    } else {
        len - start
    }
}

/// Component and tag membership identifying an archetype.
///
/// Two archetypes are the same iff both bitsets are equal. The derived `Hash`
/// feeds both words arrays to the hasher, which makes the pair usable as the
/// store's archetype lookup key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Component type indices present.
    pub components: BitSet,
    /// Tag type indices present.
    pub tags: BitSet,
}

impl Signature {
    /// Builds a signature from explicit bitsets.
    #[inline]
    pub const fn new(components: BitSet, tags: BitSet) -> Self {
        Self { components, tags }
    }

    /// Signature with no components and no tags.
    #[inline]
    pub const fn empty() -> Self {
        Self { components: BitSet::new(), tags: BitSet::new() }
    }

    /// Returns a copy with `component` added.
    #[inline]
    pub fn with_component(mut self, component: ComponentIndex) -> Self {
        self.components.set_bit(component as usize);
        self
    }

    /// Returns a copy with `component` removed.
    #[inline]
    pub fn without_component(mut self, component: ComponentIndex) -> Self {
        self.components.clear_bit(component as usize);
        self
    }

    /// Returns a copy whose tag set is `tags`.
    #[inline]
    pub fn with_tags(mut self, tags: BitSet) -> Self {
        self.tags = tags;
        self
    }

    /// Deterministic 64-bit hash over both bitsets.
    #[inline]
    pub fn hash64(&self) -> u64 {
        self.components.hash64().rotate_left(31) ^ self.tags.hash64()
    }
}
