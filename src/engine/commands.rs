//! # Commands
//!
//! Deferred structural changes.
//!
//! ## Purpose
//! Code that only holds `&EntityStore` (query closures, parallel job
//! sections, worker threads) cannot change structure. It records
//! [`Command`]s into a [`CommandBuffer`] instead, and the owner thread
//! applies them later with [`CommandBuffer::playback`].
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur. Component
//!   values travel boxed together with their component index.
//! - `create_entity` reserves the id from the store's atomic allocator at
//!   record time, so later commands in the same buffer can target the new
//!   entity before it exists.
//! - [`SyncCommandBuffer`] wraps a buffer in a `parking_lot::Mutex` for
//!   concurrent recording.
//!
//! ## Invariants
//! - Commands are applied in recording order.
//! - Playback stops at the first failing command and reports its position.
//!   The buffer is cleared either way; its capacity is kept.
//! - During playback, adding a component the entity already has overwrites
//!   the value instead of failing.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::engine::bitset::BitSet;
use crate::engine::component::{Component, Schema, Tag};
use crate::engine::error::{EcsResult, PlaybackError, SchemaError};
use crate::engine::store::EntityStore;
use crate::engine::types::{ComponentIndex, EntityId};

/// A deferred structural change.
pub enum Command {
    /// Creates an entity with a reserved id.
    CreateEntity {
        /// Id reserved at record time.
        id: EntityId,
    },

    /// Deletes an entity.
    DeleteEntity {
        /// Target entity.
        id: EntityId,
    },

    /// Adds a component, or overwrites it if already present.
    ///
    /// ## Behavior
    /// - Moves the entity to the archetype including the component when it
    ///   is new, firing one `ComponentChanged`.
    /// - Writes the value in place otherwise.
    AddComponent {
        /// Target entity.
        id: EntityId,
        /// Component index.
        component: ComponentIndex,
        /// Component value. Must have the registered type of `component`.
        value: Box<dyn Any + Send>,
    },

    /// Removes a component; the value is dropped.
    RemoveComponent {
        /// Target entity.
        id: EntityId,
        /// Component index.
        component: ComponentIndex,
    },

    /// Adds a set of tags.
    AddTags {
        /// Target entity.
        id: EntityId,
        /// Tags to add.
        tags: BitSet,
    },

    /// Removes a set of tags.
    RemoveTags {
        /// Target entity.
        id: EntityId,
        /// Tags to remove.
        tags: BitSet,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateEntity { id } => f.debug_struct("CreateEntity").field("id", id).finish(),
            Self::DeleteEntity { id } => f.debug_struct("DeleteEntity").field("id", id).finish(),
            Self::AddComponent { id, component, .. } => {
                f.debug_struct("AddComponent").field("id", id).field("component", component).finish_non_exhaustive()
            }
            Self::RemoveComponent { id, component } => {
                f.debug_struct("RemoveComponent").field("id", id).field("component", component).finish()
            }
            Self::AddTags { id, tags } => f.debug_struct("AddTags").field("id", id).field("tags", tags).finish(),
            Self::RemoveTags { id, tags } => f.debug_struct("RemoveTags").field("id", id).field("tags", tags).finish(),
        }
    }
}

impl Command {
    fn apply(self, store: &mut EntityStore) -> EcsResult<()> {
        match self {
            Self::CreateEntity { id } => store.create_entity_with_id(id).map(drop),
            Self::DeleteEntity { id } => store.delete_entity(id),
            Self::AddComponent { id, component, value } => store.add_component_boxed(id, component, value, true),
            Self::RemoveComponent { id, component } => store.remove_component_index(id, component),
            Self::AddTags { id, tags } => store.add_tags(id, &tags),
            Self::RemoveTags { id, tags } => store.remove_tags(id, &tags),
        }
    }
}

/// Ordered list of deferred structural changes.
pub struct CommandBuffer {
    schema: Arc<Schema>,
    commands: Vec<Command>,
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer").field("commands", &self.commands).finish()
    }
}

impl CommandBuffer {
    /// Empty buffer resolving component and tag types through `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema, commands: Vec::new() }
    }

    /// Empty buffer sharing the schema of `store`.
    pub fn for_store(store: &EntityStore) -> Self {
        Self::new(store.schema().clone())
    }

    /// Number of recorded commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Allocated command slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.commands.capacity()
    }

    /// Recorded commands in order.
    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drops every recorded command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Appends a raw command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Reserves an id from `store` and records its creation.
    pub fn create_entity(&mut self, store: &EntityStore) -> EntityId {
        let id = store.reserve_id();
        self.commands.push(Command::CreateEntity { id });
        id
    }

    /// Records the deletion of `id`.
    pub fn delete_entity(&mut self, id: EntityId) {
        self.commands.push(Command::DeleteEntity { id });
    }

    /// Records adding `value` as component `T`.
    pub fn add_component<T: Component>(&mut self, id: EntityId, value: T) -> Result<(), SchemaError> {
        let component = self.schema.component_index::<T>()?;
        self.commands.push(Command::AddComponent { id, component, value: Box::new(value) });
        Ok(())
    }

    /// Records writing `value` to component `T`. Identical to
    /// [`add_component`](Self::add_component) since playback upserts.
    pub fn set_component<T: Component>(&mut self, id: EntityId, value: T) -> Result<(), SchemaError> {
        self.add_component(id, value)
    }

    /// Records removing component `T`.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<(), SchemaError> {
        let component = self.schema.component_index::<T>()?;
        self.commands.push(Command::RemoveComponent { id, component });
        Ok(())
    }

    /// Records adding `tags`.
    pub fn add_tags(&mut self, id: EntityId, tags: BitSet) {
        self.commands.push(Command::AddTags { id, tags });
    }

    /// Records removing `tags`.
    pub fn remove_tags(&mut self, id: EntityId, tags: BitSet) {
        self.commands.push(Command::RemoveTags { id, tags });
    }

    /// Records adding tag `T`.
    pub fn add_tag<T: Tag>(&mut self, id: EntityId) -> Result<(), SchemaError> {
        let index = self.schema.tag_index::<T>()?;
        self.add_tags(id, BitSet::from_indices(&[index as usize]));
        Ok(())
    }

    /// Records removing tag `T`.
    pub fn remove_tag<T: Tag>(&mut self, id: EntityId) -> Result<(), SchemaError> {
        let index = self.schema.tag_index::<T>()?;
        self.remove_tags(id, BitSet::from_indices(&[index as usize]));
        Ok(())
    }

    /// Applies every command to `store` in order and returns how many were
    /// applied.
    ///
    /// ## Errors
    /// The first failing command, with its position. Commands before it stay
    /// applied, the rest are dropped. The buffer is empty afterwards in both
    /// cases.
    pub fn playback(&mut self, store: &mut EntityStore) -> Result<usize, PlaybackError> {
        let total = self.commands.len();
        for (index, command) in self.commands.drain(..).enumerate() {
            trace!(index, ?command, "playback");
            if let Err(error) = command.apply(store) {
                return Err(PlaybackError { index, error });
            }
        }
        Ok(total)
    }
}

/// [`CommandBuffer`] that can be recorded into from several threads.
///
/// Recording order across threads is the order in which the internal lock
/// was acquired.
pub struct SyncCommandBuffer {
    inner: Mutex<CommandBuffer>,
}

impl fmt::Debug for SyncCommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCommandBuffer").field("len", &self.len()).finish()
    }
}

impl SyncCommandBuffer {
    /// Empty buffer resolving types through `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { inner: Mutex::new(CommandBuffer::new(schema)) }
    }

    /// Empty buffer sharing the schema of `store`.
    pub fn for_store(store: &EntityStore) -> Self {
        Self::new(store.schema().clone())
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// See [`CommandBuffer::create_entity`].
    pub fn create_entity(&self, store: &EntityStore) -> EntityId {
        self.inner.lock().create_entity(store)
    }

    /// See [`CommandBuffer::delete_entity`].
    pub fn delete_entity(&self, id: EntityId) {
        self.inner.lock().delete_entity(id);
    }

    /// See [`CommandBuffer::add_component`].
    pub fn add_component<T: Component>(&self, id: EntityId, value: T) -> Result<(), SchemaError> {
        self.inner.lock().add_component(id, value)
    }

    /// See [`CommandBuffer::set_component`].
    pub fn set_component<T: Component>(&self, id: EntityId, value: T) -> Result<(), SchemaError> {
        self.inner.lock().set_component(id, value)
    }

    /// See [`CommandBuffer::remove_component`].
    pub fn remove_component<T: Component>(&self, id: EntityId) -> Result<(), SchemaError> {
        self.inner.lock().remove_component::<T>(id)
    }

    /// See [`CommandBuffer::add_tags`].
    pub fn add_tags(&self, id: EntityId, tags: BitSet) {
        self.inner.lock().add_tags(id, tags);
    }

    /// See [`CommandBuffer::remove_tags`].
    pub fn remove_tags(&self, id: EntityId, tags: BitSet) {
        self.inner.lock().remove_tags(id, tags);
    }

    /// See [`CommandBuffer::add_tag`].
    pub fn add_tag<T: Tag>(&self, id: EntityId) -> Result<(), SchemaError> {
        self.inner.lock().add_tag::<T>(id)
    }

    /// See [`CommandBuffer::remove_tag`].
    pub fn remove_tag<T: Tag>(&self, id: EntityId) -> Result<(), SchemaError> {
        self.inner.lock().remove_tag::<T>(id)
    }

    /// See [`CommandBuffer::playback`].
    pub fn playback(&self, store: &mut EntityStore) -> Result<usize, PlaybackError> {
        self.inner.lock().playback(store)
    }

    /// Unwraps the buffer.
    pub fn into_inner(self) -> CommandBuffer {
        self.inner.into_inner()
    }
}
