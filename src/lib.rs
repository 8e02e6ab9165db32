//! # Columnar ECS
//!
//! Archetype-based entity/component store: an in-memory columnar database for
//! repeated, allocation-free iteration over large, frequently mutated
//! collections of typed records.
//!
//! ## Design Goals
//! - Dynamic schema per entity: components and tags attach and detach at run time
//! - Chunked columnar storage per unique signature ("archetype")
//! - Low-allocation queries by type signature
//! - Deterministic, synchronous change notification
//! - Safe parallel iteration across worker threads
//!
//! ## Quick start
//! ```ignore
//! let schema = Schema::builder().component::<Position>().component::<Velocity>().build()?;
//! let mut store = EntityStore::new(schema);
//! let id = store.create_entity()?;
//! store.add_component(id, Position::default())?;
//! store.add_component(id, Velocity { x: 1.0, ..Default::default() })?;
//!
//! let mut query = store.query::<(Position, Velocity)>()?;
//! query.for_each_entity(&store, |(p, v), _| p.x += v.x)?;
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Store and entities

pub use engine::store::{
    EntityStore,
    StoreConfig,
};

pub use engine::entity::{
    Entity,
    EntityLocation,
};

pub use engine::archetype::Archetype;
pub use engine::storage::{Column, ErasedColumn};

// Schema

pub use engine::bitset::{BitSet, BitSetIter, BITSET_BITS};

pub use engine::component::{
    Component,
    ComponentList,
    ComponentType,
    Disabled,
    Schema,
    SchemaBuilder,
    Script,
    ScriptType,
    Tag,
    TagList,
    TagType,
    TypeKind,
    DISABLED_TAG,
};

// Queries and jobs

pub use engine::query::{
    ChunkEntities,
    ComponentSet,
    Query,
    QueryFilter,
};

pub use engine::scheduler::{
    ChunkSlices,
    JobConfig,
    ParallelJobRunner,
    QueryJob,
    Sections,
};

// Events

pub use engine::events::{
    ChangeAction,
    ChildEntitiesChanged,
    ComponentChanged,
    EntityCreate,
    EntityCreated,
    EntityDelete,
    EntityDeleted,
    EntityEvents,
    HandlerId,
    Signal,
    StoreEvent,
    TagsChanged,
};

pub use engine::recorder::{EventFilter, EventRecorder};

// Deferred work

pub use engine::commands::{Command, CommandBuffer, SyncCommandBuffer};
pub use engine::dispatcher::{DispatchJob, ImmediateDispatcher, MainThreadDispatcher, QueuedDispatcher};

// Errors and identifiers

pub use engine::error::{
    BitSetError,
    EcsError,
    EcsResult,
    PlaybackError,
    QueryError,
    SchemaError,
};

pub use engine::types::{
    ArchetypeId,
    ComponentIndex,
    EntityId,
    Row,
    ScriptIndex,
    Signature,
    TagIndex,
    CHUNK_SIZE,
    MAX_TYPES,
    NO_ENTITY,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use columnar_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BitSet,
        ChunkEntities,
        CommandBuffer,
        Component,
        EcsError,
        EcsResult,
        Entity,
        EntityId,
        EntityStore,
        EventFilter,
        ParallelJobRunner,
        Query,
        QueryFilter,
        Schema,
        Script,
        Signature,
        Tag,
    };
}
