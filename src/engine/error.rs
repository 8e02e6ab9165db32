//! Error types for schema definition, structural changes and queries.
//!
//! Errors are small, focused enums that carry enough context to make a failure
//! actionable: the offending entity id, the name of the component or tag type,
//! the capacity that was exceeded. Low-level failures convert into the
//! aggregate [`EcsError`] through `From`, so store code bubbles them with `?`.
//!
//! ## Taxonomy
//! * [`SchemaError`]: schema definition failures. Returned by
//!   [`SchemaBuilder::build`](crate::SchemaBuilder::build) and expected to be
//!   treated as fatal at start-up. Also reported when a type that was never
//!   registered is used at run time.
//! * [`EcsError`]: API misuse on a live store (adding a component that is
//!   already present, removing one that is absent, structural mutation from a
//!   thread that does not own the store, conflicting column borrows).
//! * [`QueryError`]: invalid query projections.
//! * [`PlaybackError`]: the first failing command of a command buffer
//!   playback, with its position in the buffer.
//!
//! Allocation failure is not modeled. A query whose filter matches nothing is
//! not an error.
//!
//! ## Display vs. Debug
//! * `Display` is short and meant for operator logs.
//! * `Debug` (derived) keeps the full structure.

use thiserror::Error;

use crate::engine::component::TypeKind;
use crate::engine::types::EntityId;

/// Result alias used across the store API.
pub type EcsResult<T> = Result<T, EcsError>;

/// Returned by the checked [`BitSet`](crate::BitSet) setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BitSetError {
    /// Bit index outside `0..256`.
    #[error("bit index {index} out of range (max 255)")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
    },
}

/// Schema definition and type lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two different types were registered under the same key.
    #[error("{kind} key `{key}` used by both `{existing}` and `{duplicate}`")]
    DuplicateKey {
        /// Component, tag or script.
        kind: TypeKind,
        /// The contested key.
        key: &'static str,
        /// Type registered first.
        existing: &'static str,
        /// Type that tried to reuse the key.
        duplicate: &'static str,
    },

    /// More than [`MAX_TYPES`](crate::engine::types::MAX_TYPES) types of one kind.
    #[error("too many {kind} types (max {max})")]
    CapacityExceeded {
        /// Component, tag or script.
        kind: TypeKind,
        /// Configured maximum.
        max: usize,
    },

    /// A type was used that is not part of the schema.
    #[error("{kind} type `{type_name}` is not registered")]
    UnknownType {
        /// Component, tag or script.
        kind: TypeKind,
        /// Rust type name.
        type_name: &'static str,
    },

    /// An index was used that no registered type owns.
    #[error("no {kind} type registered at index {index}")]
    UnknownIndex {
        /// Component, tag or script.
        kind: TypeKind,
        /// Offending index.
        index: usize,
    },
}

/// Invalid query projections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The same component type appears twice in the projected tuple.
    #[error("component `{type_name}` projected more than once")]
    DuplicateComponent {
        /// Rust type name.
        type_name: &'static str,
    },

    /// Copy mode was requested for a type the query does not project.
    #[error("component `{type_name}` is not projected by this query")]
    NotProjected {
        /// Rust type name.
        type_name: &'static str,
    },
}

/// Errors reported by [`EntityStore`](crate::EntityStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    /// No live entity has this id.
    #[error("entity {id} not found")]
    EntityNotFound {
        /// Requested id.
        id: EntityId,
    },

    /// The id is reserved for "no entity" or already belongs to a live entity.
    #[error("entity id {id} is already in use")]
    EntityIdInUse {
        /// Requested id.
        id: EntityId,
    },

    /// The entity already has the component.
    #[error("entity {id} already has component `{component}`")]
    ComponentAlreadyPresent {
        /// Target entity.
        id: EntityId,
        /// Component key.
        component: &'static str,
    },

    /// The entity does not have the component.
    #[error("entity {id} has no component `{component}`")]
    ComponentNotPresent {
        /// Target entity.
        id: EntityId,
        /// Component key.
        component: &'static str,
    },

    /// The entity already carries the tag.
    #[error("entity {id} already has tag `{tag}`")]
    TagAlreadyPresent {
        /// Target entity.
        id: EntityId,
        /// Tag key.
        tag: &'static str,
    },

    /// The entity does not carry the tag.
    #[error("entity {id} has no tag `{tag}`")]
    TagNotPresent {
        /// Target entity.
        id: EntityId,
        /// Tag key.
        tag: &'static str,
    },

    /// The entity already has a script of this type.
    #[error("entity {id} already has script `{script}`")]
    ScriptAlreadyPresent {
        /// Target entity.
        id: EntityId,
        /// Script key.
        script: &'static str,
    },

    /// The entity has no script of this type.
    #[error("entity {id} has no script `{script}`")]
    ScriptNotPresent {
        /// Target entity.
        id: EntityId,
        /// Script key.
        script: &'static str,
    },

    /// Structural mutation attempted from a thread that does not own the store.
    #[error("structural change from a thread that does not own the store")]
    NotOwnerThread,

    /// A column is already borrowed in a conflicting way.
    #[error("column `{component}` is already borrowed")]
    ColumnBorrowed {
        /// Component key.
        component: &'static str,
    },

    /// A stored value does not have the type the caller expected.
    #[error("type mismatch: expected `{expected}`, found `{actual}`")]
    TypeMismatch {
        /// Type the column stores.
        expected: &'static str,
        /// Type that was supplied.
        actual: &'static str,
    },

    /// The requested parent/child link would create a cycle.
    #[error("entity {child} cannot become a child of {parent}: cycle")]
    CyclicHierarchy {
        /// Requested parent.
        parent: EntityId,
        /// Requested child.
        child: EntityId,
    },

    /// `child` is not a child of `parent`.
    #[error("entity {child} is not a child of {parent}")]
    NotAChild {
        /// Parent entity.
        parent: EntityId,
        /// Child entity.
        child: EntityId,
    },

    /// Child insertion index past the end of the child list.
    #[error("child index {index} out of range for entity {parent} ({len} children)")]
    ChildIndexOutOfRange {
        /// Parent entity.
        parent: EntityId,
        /// Requested index.
        index: usize,
        /// Current number of children.
        len: usize,
    },

    /// The worker pool of a [`ParallelJobRunner`](crate::ParallelJobRunner)
    /// could not be started.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// Schema lookup failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Query definition failure.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Bit index failure.
    #[error(transparent)]
    BitSet(#[from] BitSetError),
}

/// First command that failed during [`CommandBuffer::playback`](crate::CommandBuffer::playback).
///
/// Commands before `index` were applied; `index` and later were not. The
/// buffer is cleared either way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command {index} failed: {error}")]
pub struct PlaybackError {
    /// Position of the failing command in recording order.
    pub index: usize,
    /// Cause.
    #[source]
    pub error: EcsError,
}
