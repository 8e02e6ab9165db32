//! # Entity store
//!
//! [`EntityStore`] owns everything about one population of entities: the
//! archetypes and their columns, the id allocator, the node table locating
//! every entity, parent/child links, scripts, event handlers and the event
//! recorder.
//!
//! ## Structural changes
//!
//! Adding or removing a component or tag changes an entity's signature, which
//! moves its row into another archetype:
//!
//! 1. the destination signature is derived from the current one;
//! 2. the destination archetype is looked up, or created on first use;
//! 3. the row moves: shared components are moved, new ones are defaulted,
//!    dropped ones are discarded, and the source row is swap-removed;
//! 4. the node of the entity promoted into the vacated source row, and the
//!    node of the moved entity, are updated;
//! 5. exactly one event describing the change fires.
//!
//! Archetypes are created lazily and never removed.
//!
//! ## Ownership
//!
//! Structural changes take `&mut self`. On top of that the store remembers
//! the thread that created it and rejects structural changes from any other
//! thread with [`EcsError::NotOwnerThread`] (see
//! [`StoreConfig::check_owner_thread`]). A store handed to another thread
//! must call [`claim_ownership`](EntityStore::claim_ownership) there first.
//!
//! Shared `&self` access (queries, entity handles, parallel jobs) never changes
//! structure; it only reads or writes component values through the column
//! locks.

use std::any::type_name;
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use tracing::{debug, trace};

use crate::engine::archetype::{archetype_pair_mut, Archetype};
use crate::engine::bitset::BitSet;
use crate::engine::component::{Component, Schema, Script, Tag, TypeKind, DISABLED_TAG};
use crate::engine::entity::{Entity, EntityLocation, EntityTable, IdAllocator};
use crate::engine::error::{EcsError, EcsResult, SchemaError};
use crate::engine::events::{
    ChangeAction, ChildEntitiesChanged, ComponentChanged, EntityCreate, EntityCreated, EntityDelete,
    EntityDeleted, EntityEvents, HandlerId, Signal, TagsChanged,
};
use crate::engine::query::{ComponentSet, Query};
use crate::engine::recorder::{EventFilter, EventRecorder};
use crate::engine::types::{ArchetypeId, ComponentIndex, EntityId, ScriptIndex, Signature, NO_ENTITY};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Construction options for an [`EntityStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Node table slots reserved up front.
    pub initial_entity_capacity: usize,
    /// Reject structural changes from threads other than the owner.
    pub check_owner_thread: bool,
    /// Start with the event recorder enabled.
    pub record_events: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { initial_entity_capacity: 1024, check_owner_thread: true, record_events: false }
    }
}

/// Archetype-based entity/component store.
pub struct EntityStore {
    store_id: u64,
    schema: Arc<Schema>,
    config: StoreConfig,
    archetypes: Vec<Archetype>,
    archetype_lookup: HashMap<Signature, ArchetypeId>,
    entities: EntityTable,
    ids: IdAllocator,
    owner: ThreadId,
    events: EntityEvents,
    recorder: EventRecorder,
}

impl EntityStore {
    /// Empty store using `schema` and the default [`StoreConfig`].
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Empty store using `schema` and `config`.
    pub fn with_config(schema: Arc<Schema>, config: StoreConfig) -> Self {
        let mut recorder = EventRecorder::new();
        recorder.set_enabled(config.record_events);
        Self {
            store_id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            entities: EntityTable::with_capacity(config.initial_entity_capacity),
            schema,
            config,
            archetypes: Vec::new(),
            archetype_lookup: HashMap::new(),
            ids: IdAllocator::new(),
            owner: thread::current().id(),
            events: EntityEvents::default(),
            recorder,
        }
    }

    #[inline]
    pub(crate) fn store_id(&self) -> u64 {
        self.store_id
    }

    /// Schema shared with queries and command buffers.
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Configuration the store was built with.
    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ownership
    // ─────────────────────────────────────────────────────────────────────

    /// Returns `true` on the thread allowed to make structural changes.
    #[inline]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Makes the calling thread the owner.
    pub fn claim_ownership(&mut self) {
        self.owner = thread::current().id();
        debug!(store = self.store_id, "store ownership claimed");
    }

    #[inline]
    fn check_owner(&self) -> EcsResult<()> {
        if self.config.check_owner_thread && !self.is_owner_thread() {
            return Err(EcsError::NotOwnerThread);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if `id` names a live entity.
    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    /// Handle to entity `id`.
    #[inline]
    pub fn entity(&self, id: EntityId) -> Option<Entity<'_>> {
        self.contains(id).then(|| Entity::new(id, self))
    }

    /// Live entity ids in ascending order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.ids()
    }

    /// Archetype and row of entity `id`.
    #[inline]
    pub fn location(&self, id: EntityId) -> EcsResult<EntityLocation> {
        self.entities.location(id)
    }

    /// All archetypes in creation order. Index equals [`Archetype::id`].
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Archetype by id.
    #[inline]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    /// Archetype currently holding entity `id`.
    pub fn archetype_of(&self, id: EntityId) -> EcsResult<&Archetype> {
        let location = self.entities.location(id)?;
        Ok(&self.archetypes[location.archetype as usize])
    }

    /// Structural event handlers.
    #[inline]
    pub fn events_mut(&mut self) -> &mut EntityEvents {
        &mut self.events
    }

    /// Event recorder.
    #[inline]
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Event recorder, for enabling, clearing and filtering.
    #[inline]
    pub fn recorder_mut(&mut self) -> &mut EventRecorder {
        &mut self.recorder
    }

    /// Evaluates `filter` for `id` against the store's recorder.
    pub fn filter_events(&mut self, filter: &EventFilter, id: EntityId) -> bool {
        filter.filter(&mut self.recorder, id)
    }

    /// New query over the component tuple `C`.
    ///
    /// ## Errors
    /// A type in `C` is not registered, or appears twice.
    pub fn query<C: ComponentSet>(&self) -> EcsResult<Query<C>> {
        Query::new(self.schema.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Archetypes
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the archetype for `signature`, creating it on first use.
    ///
    /// O(1) amortized. Newly created archetypes get one empty column per
    /// component in the signature and are never removed.
    ///
    /// ## Errors
    /// [`SchemaError::UnknownIndex`](crate::SchemaError::UnknownIndex) if the
    /// signature names an unregistered index.
    pub fn get_or_create_archetype(&mut self, signature: &Signature) -> EcsResult<ArchetypeId> {
        if let Some(&id) = self.archetype_lookup.get(signature) {
            return Ok(id);
        }
        let id = self.archetypes.len() as ArchetypeId;
        let archetype = Archetype::new(id, *signature, &self.schema)?;
        debug!(
            archetype = id,
            components = signature.components.count(),
            tags = signature.tags.count(),
            "archetype created"
        );
        self.archetypes.push(archetype);
        self.archetype_lookup.insert(*signature, id);
        Ok(id)
    }

    fn move_entity(&mut self, id: EntityId, location: EntityLocation, signature: &Signature) -> EcsResult<EntityLocation> {
        let destination_id = self.get_or_create_archetype(signature)?;
        if destination_id == location.archetype {
            return Ok(location);
        }
        let (source, destination) = archetype_pair_mut(&mut self.archetypes, location.archetype, destination_id);
        let (row, promoted) = source.move_entity_to(location.row, destination)?;
        if let Some(promoted) = promoted {
            self.entities.set_row(promoted, location.row);
        }
        let new_location = EntityLocation { archetype: destination_id, row };
        if let Some(node) = self.entities.get_mut(id) {
            node.location = new_location;
        }
        Ok(new_location)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entity lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Claims a fresh entity id without creating the entity.
    ///
    /// Only needs `&self`; command buffers use it to hand out ids while
    /// recording. Create the entity later with
    /// [`create_entity_with_id`](Self::create_entity_with_id).
    #[inline]
    pub fn reserve_id(&self) -> EntityId {
        self.ids.reserve()
    }

    /// Creates an entity with no components and no tags.
    pub fn create_entity(&mut self) -> EcsResult<EntityId> {
        self.create_entity_in(&Signature::empty())
    }

    /// Creates an entity in the archetype for `signature`, with default
    /// component values.
    pub fn create_entity_in(&mut self, signature: &Signature) -> EcsResult<EntityId> {
        self.check_owner()?;
        let archetype = self.get_or_create_archetype(signature)?;
        let id = self.ids.reserve();
        self.place_new_entity(id, archetype);
        Ok(id)
    }

    /// Creates an entity with a previously reserved (or caller-chosen) id.
    ///
    /// ## Errors
    /// [`EcsError::EntityIdInUse`] if `id` is `0` or already live.
    pub fn create_entity_with_id(&mut self, id: EntityId) -> EcsResult<EntityId> {
        self.check_owner()?;
        self.entities.check_vacant(id)?;
        let archetype = self.get_or_create_archetype(&Signature::empty())?;
        self.ids.observe(id);
        self.place_new_entity(id, archetype);
        Ok(id)
    }

    fn place_new_entity(&mut self, id: EntityId, archetype: ArchetypeId) {
        self.events.fire(EntityCreate { entity_id: id });
        let row = self.archetypes[archetype as usize].add_entity(id);
        self.entities.insert(id, EntityLocation { archetype, row });
        trace!(entity = id, archetype, "entity created");
        self.events.fire(EntityCreated { entity_id: id });
    }

    /// Creates a new entity with clones of `id`'s components and its tags.
    ///
    /// Scripts and parent/child links are not copied.
    pub fn clone_entity(&mut self, id: EntityId) -> EcsResult<EntityId> {
        self.check_owner()?;
        let location = self.entities.location(id)?;
        let clone = self.ids.reserve();
        self.events.fire(EntityCreate { entity_id: clone });
        let row = self.archetypes[location.archetype as usize].clone_row(location.row, clone);
        self.entities.insert(clone, EntityLocation { archetype: location.archetype, row });
        trace!(entity = clone, source = id, "entity cloned");
        self.events.fire(EntityCreated { entity_id: clone });
        Ok(clone)
    }

    /// Deletes entity `id`.
    ///
    /// ### Behavior
    /// 1. [`EntityDelete`] fires while the entity is still intact.
    /// 2. The entity is unlinked from its parent and its children are
    ///    unlinked from it, one [`ChildEntitiesChanged`] per link.
    /// 3. Its row is swap-removed; the entity promoted into the row is
    ///    relocated.
    /// 4. Scripts and signal handlers are dropped, then [`EntityDeleted`]
    ///    fires.
    pub fn delete_entity(&mut self, id: EntityId) -> EcsResult<()> {
        self.check_owner()?;
        let location = self.entities.location(id)?;
        self.events.fire(EntityDelete { entity_id: id });

        let parent = self.entities.get(id).map_or(NO_ENTITY, |n| n.parent);
        if parent != NO_ENTITY {
            self.unlink_child(parent, id)?;
        }
        let children = self.entities.get_mut(id).map(|n| mem::take(&mut n.children)).unwrap_or_default();
        for (child_index, &child) in children.iter().enumerate() {
            if let Some(node) = self.entities.get_mut(child) {
                node.parent = NO_ENTITY;
            }
            self.events.fire(ChildEntitiesChanged {
                action: ChangeAction::Remove,
                parent_id: id,
                child_id: child,
                child_index,
            });
        }

        if let Some(promoted) = self.archetypes[location.archetype as usize].remove_entity(location.row) {
            self.entities.set_row(promoted, location.row);
        }
        self.entities.remove(id);
        self.events.remove_signal_handlers(id);
        trace!(entity = id, archetype = location.archetype, "entity deleted");
        self.events.fire(EntityDeleted { entity_id: id });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Components
    // ─────────────────────────────────────────────────────────────────────

    /// Returns `true` if entity `id` has component `T`.
    pub fn has_component<T: Component>(&self, id: EntityId) -> EcsResult<bool> {
        let index = self.schema.component_index::<T>()?;
        Ok(self.archetype_of(id)?.has_component(index))
    }

    /// Adds component `T` with `value`, moving the entity to the archetype
    /// that includes `T`.
    ///
    /// ### Errors
    /// * [`EcsError::ComponentAlreadyPresent`] if the entity already has `T`.
    ///   Use [`set_component`](Self::set_component) to upsert.
    /// * [`EcsError::EntityNotFound`], [`EcsError::NotOwnerThread`], or an
    ///   unregistered `T`.
    ///
    /// ### Example
    /// ```ignore
    /// store.add_component(id, Position { x: 1.0, y: 2.0, z: 0.0 })?;
    /// ```
    pub fn add_component<T: Component>(&mut self, id: EntityId, value: T) -> EcsResult<()> {
        self.check_owner()?;
        let index = self.schema.component_index::<T>()?;
        let location = self.insert_component_slot(id, index)?;
        if let Some(column) = self.archetypes[location.archetype as usize].column_mut::<T>(index) {
            column.replace(location.row, value);
        }
        self.component_changed(id, ChangeAction::Add, index);
        Ok(())
    }

    /// Writes `value` into component `T`, adding the component first if the
    /// entity does not have it. Only the add fires an event.
    pub fn set_component<T: Component>(&mut self, id: EntityId, value: T) -> EcsResult<()> {
        if self.has_component::<T>(id)? {
            *self.get_component_mut::<T>(id)? = value;
            return Ok(());
        }
        self.add_component(id, value)
    }

    /// Removes component `T` and returns its value.
    ///
    /// ### Errors
    /// [`EcsError::ComponentNotPresent`] if the entity does not have `T`.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> EcsResult<T> {
        self.check_owner()?;
        let index = self.schema.component_index::<T>()?;
        let location = self.entities.location(id)?;
        let slot = self.archetypes[location.archetype as usize]
            .column_mut::<T>(index)
            .and_then(|column| column.get_mut(location.row))
            .ok_or(EcsError::ComponentNotPresent { id, component: T::KEY })?;
        let value = mem::take(slot);
        if let Err(error) = self.remove_component_slot(id, location, index) {
            // The entity did not move; put the value back.
            if let Some(slot) =
                self.archetypes[location.archetype as usize].column_mut::<T>(index).and_then(|c| c.get_mut(location.row))
            {
                *slot = value;
            }
            return Err(error);
        }
        Ok(value)
    }

    /// Shared access to component `T` of entity `id` through the column lock.
    ///
    /// ### Errors
    /// [`EcsError::ColumnBorrowed`] while the column is write-locked, e.g. by
    /// a running query over `T`.
    pub fn get_component<T: Component>(&self, id: EntityId) -> EcsResult<MappedRwLockReadGuard<'_, T>> {
        let index = self.schema.component_index::<T>()?;
        let location = self.entities.location(id)?;
        let missing = EcsError::ComponentNotPresent { id, component: T::KEY };
        let column = self.archetypes[location.archetype as usize]
            .try_read_column::<T>(index)?
            .ok_or_else(|| missing.clone())?;
        MappedRwLockReadGuard::try_map(column, |c| c.get(location.row)).map_err(|_| missing)
    }

    /// Exclusive access to component `T` of entity `id` through the column
    /// lock. Only needs `&self`.
    pub fn get_component_locked<T: Component>(&self, id: EntityId) -> EcsResult<MappedRwLockWriteGuard<'_, T>> {
        let index = self.schema.component_index::<T>()?;
        let location = self.entities.location(id)?;
        let missing = EcsError::ComponentNotPresent { id, component: T::KEY };
        let column = self.archetypes[location.archetype as usize]
            .try_write_column::<T>(index)?
            .ok_or_else(|| missing.clone())?;
        MappedRwLockWriteGuard::try_map(column, |c| c.get_mut(location.row)).map_err(|_| missing)
    }

    /// Exclusive access to component `T` of entity `id`. No locking, no
    /// allocation.
    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> EcsResult<&mut T> {
        let index = self.schema.component_index::<T>()?;
        let location = self.entities.location(id)?;
        self.archetypes[location.archetype as usize]
            .column_mut::<T>(index)
            .and_then(|column| column.get_mut(location.row))
            .ok_or(EcsError::ComponentNotPresent { id, component: T::KEY })
    }

    /// Copy of component `T` of entity `id`.
    pub fn component<T: Component>(&self, id: EntityId) -> EcsResult<T> {
        self.get_component::<T>(id).map(|value| value.clone())
    }

    /// Adds component `index` from a boxed value. With `overwrite`, an
    /// existing component is overwritten instead of rejected.
    ///
    /// The value's type is checked before the entity moves, so a mismatch
    /// leaves the store untouched.
    pub(crate) fn add_component_boxed(
        &mut self,
        id: EntityId,
        index: ComponentIndex,
        value: Box<dyn std::any::Any + Send>,
        overwrite: bool,
    ) -> EcsResult<()> {
        self.check_owner()?;
        let location = self.entities.location(id)?;
        let present = self.archetypes[location.archetype as usize].has_component(index);
        if present && !overwrite {
            return Err(EcsError::ComponentAlreadyPresent { id, component: self.schema.component_key(index) });
        }
        let component = self
            .schema
            .component(index)
            .ok_or(SchemaError::UnknownIndex { kind: TypeKind::Component, index: index as usize })?;
        if (*value).type_id() != component.type_id {
            return Err(EcsError::TypeMismatch { expected: component.key, actual: self.schema.boxed_type_name(&*value) });
        }
        let actual = self.schema.boxed_type_name(&*value);
        let location = if present { location } else { self.insert_component_slot(id, index)? };
        if let Some(column) = self.archetypes[location.archetype as usize].erased_column_mut(index) {
            column
                .set_boxed(location.row, value)
                .map_err(|_| EcsError::TypeMismatch { expected: self.schema.component_key(index), actual })?;
        }
        if !present {
            self.component_changed(id, ChangeAction::Add, index);
        }
        Ok(())
    }

    /// Removes component `index` without returning its value.
    pub(crate) fn remove_component_index(&mut self, id: EntityId, index: ComponentIndex) -> EcsResult<()> {
        self.check_owner()?;
        let location = self.entities.location(id)?;
        self.remove_component_slot(id, location, index)
    }

    /// Moves `id` into the archetype that also holds `index`; the new slot
    /// holds the default value.
    fn insert_component_slot(&mut self, id: EntityId, index: ComponentIndex) -> EcsResult<EntityLocation> {
        let location = self.entities.location(id)?;
        let signature = *self.archetypes[location.archetype as usize].signature();
        if signature.components.has(index as usize) {
            return Err(EcsError::ComponentAlreadyPresent { id, component: self.schema.component_key(index) });
        }
        let location = self.move_entity(id, location, &signature.with_component(index))?;
        trace!(entity = id, component = index, archetype = location.archetype, "component added");
        Ok(location)
    }

    fn remove_component_slot(&mut self, id: EntityId, location: EntityLocation, index: ComponentIndex) -> EcsResult<()> {
        let signature = *self.archetypes[location.archetype as usize].signature();
        if !signature.components.has(index as usize) {
            return Err(EcsError::ComponentNotPresent { id, component: self.schema.component_key(index) });
        }
        let location = self.move_entity(id, location, &signature.without_component(index))?;
        trace!(entity = id, component = index, archetype = location.archetype, "component removed");
        self.component_changed(id, ChangeAction::Remove, index);
        Ok(())
    }

    fn component_changed(&mut self, id: EntityId, action: ChangeAction, index: ComponentIndex) {
        self.recorder.record_component(id, action, index);
        self.events.fire(ComponentChanged { entity_id: id, action, component_type: index });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tags
    // ─────────────────────────────────────────────────────────────────────

    /// Tag set of entity `id`.
    pub fn tags(&self, id: EntityId) -> EcsResult<BitSet> {
        Ok(self.archetype_of(id)?.signature().tags)
    }

    /// Returns `true` if entity `id` carries tag `T`.
    pub fn has_tag<T: Tag>(&self, id: EntityId) -> EcsResult<bool> {
        let index = self.schema.tag_index::<T>()?;
        Ok(self.tags(id)?.has(index as usize))
    }

    /// Adds every tag in `tags`.
    ///
    /// ### Errors
    /// [`EcsError::TagAlreadyPresent`] naming the first tag the entity
    /// already carries. Nothing changes in that case.
    pub fn add_tags(&mut self, id: EntityId, tags: &BitSet) -> EcsResult<()> {
        self.check_owner()?;
        self.schema.check_tags(tags)?;
        let location = self.entities.location(id)?;
        let signature = *self.archetypes[location.archetype as usize].signature();
        if let Some(index) = signature.tags.intersect(tags).iter().next() {
            return Err(EcsError::TagAlreadyPresent { id, tag: self.schema.tag_key(index as u8) });
        }
        self.change_tags(id, location, signature, signature.tags.union(tags))
    }

    /// Removes every tag in `tags`.
    ///
    /// ### Errors
    /// [`EcsError::TagNotPresent`] naming the first tag the entity does not
    /// carry. Nothing changes in that case.
    pub fn remove_tags(&mut self, id: EntityId, tags: &BitSet) -> EcsResult<()> {
        self.check_owner()?;
        self.schema.check_tags(tags)?;
        let location = self.entities.location(id)?;
        let signature = *self.archetypes[location.archetype as usize].signature();
        if let Some(index) = tags.difference(&signature.tags).iter().next() {
            return Err(EcsError::TagNotPresent { id, tag: self.schema.tag_key(index as u8) });
        }
        self.change_tags(id, location, signature, signature.tags.difference(tags))
    }

    /// Adds tag `T`.
    pub fn add_tag<T: Tag>(&mut self, id: EntityId) -> EcsResult<()> {
        let index = self.schema.tag_index::<T>()?;
        self.add_tags(id, &BitSet::from_indices(&[index as usize]))
    }

    /// Removes tag `T`.
    pub fn remove_tag<T: Tag>(&mut self, id: EntityId) -> EcsResult<()> {
        let index = self.schema.tag_index::<T>()?;
        self.remove_tags(id, &BitSet::from_indices(&[index as usize]))
    }

    /// Adds or removes the `Disabled` tag. No-op if already in that state.
    pub fn set_enabled(&mut self, id: EntityId, enabled: bool) -> EcsResult<()> {
        let disabled = BitSet::from_indices(&[DISABLED_TAG as usize]);
        let is_enabled = !self.tags(id)?.has(DISABLED_TAG as usize);
        match (is_enabled, enabled) {
            (true, false) => self.add_tags(id, &disabled),
            (false, true) => self.remove_tags(id, &disabled),
            _ => Ok(()),
        }
    }

    fn change_tags(&mut self, id: EntityId, location: EntityLocation, signature: Signature, tags: BitSet) -> EcsResult<()> {
        if tags == signature.tags {
            return Ok(());
        }
        let location = self.move_entity(id, location, &signature.with_tags(tags))?;
        trace!(entity = id, archetype = location.archetype, "tags changed");
        self.recorder.record_tags(id, &signature.tags, &tags);
        self.events.fire(TagsChanged { entity_id: id, tags, old_tags: signature.tags });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Hierarchy
    // ─────────────────────────────────────────────────────────────────────

    /// Parent of entity `id`.
    pub fn parent(&self, id: EntityId) -> EcsResult<Option<EntityId>> {
        let node = self.entities.get(id).ok_or(EcsError::EntityNotFound { id })?;
        Ok((node.parent != NO_ENTITY).then_some(node.parent))
    }

    /// Children of entity `id` in order.
    pub fn children(&self, id: EntityId) -> EcsResult<&[EntityId]> {
        let node = self.entities.get(id).ok_or(EcsError::EntityNotFound { id })?;
        Ok(&node.children)
    }

    /// Appends `child` to `parent`'s children and returns its index.
    ///
    /// A child already under another parent is unlinked there first. Linking
    /// a child to the parent it already has returns its current index and
    /// fires nothing.
    ///
    /// ### Errors
    /// [`EcsError::CyclicHierarchy`] if `child` is `parent` or one of its
    /// ancestors.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> EcsResult<usize> {
        self.check_link(parent, child)?;
        if let Some(index) = self.entities.get(parent).and_then(|n| n.children.iter().position(|&c| c == child)) {
            return Ok(index);
        }
        self.detach_from_parent(child)?;
        let index = self.children(parent)?.len();
        self.link_child(parent, child, index);
        Ok(index)
    }

    /// Inserts `child` at `index` in `parent`'s children.
    ///
    /// ### Errors
    /// [`EcsError::ChildIndexOutOfRange`] if `index` is past the end of the
    /// child list (computed without `child` itself).
    pub fn insert_child(&mut self, parent: EntityId, child: EntityId, index: usize) -> EcsResult<()> {
        self.check_link(parent, child)?;
        let siblings = self.children(parent)?;
        let len = siblings.len() - usize::from(siblings.contains(&child));
        if index > len {
            return Err(EcsError::ChildIndexOutOfRange { parent, index, len });
        }
        self.detach_from_parent(child)?;
        self.link_child(parent, child, index);
        Ok(())
    }

    /// Unlinks `child` from `parent`.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        self.check_owner()?;
        if !self.contains(child) {
            return Err(EcsError::EntityNotFound { id: child });
        }
        self.unlink_child(parent, child)
    }

    fn check_link(&self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        self.check_owner()?;
        if !self.contains(parent) {
            return Err(EcsError::EntityNotFound { id: parent });
        }
        if !self.contains(child) {
            return Err(EcsError::EntityNotFound { id: child });
        }
        let mut ancestor = parent;
        while ancestor != NO_ENTITY {
            if ancestor == child {
                return Err(EcsError::CyclicHierarchy { parent, child });
            }
            ancestor = self.entities.get(ancestor).map_or(NO_ENTITY, |n| n.parent);
        }
        Ok(())
    }

    fn detach_from_parent(&mut self, child: EntityId) -> EcsResult<()> {
        match self.parent(child)? {
            Some(parent) => self.unlink_child(parent, child),
            None => Ok(()),
        }
    }

    fn link_child(&mut self, parent: EntityId, child: EntityId, index: usize) {
        if let Some(node) = self.entities.get_mut(parent) {
            node.children.insert(index, child);
        }
        if let Some(node) = self.entities.get_mut(child) {
            node.parent = parent;
        }
        trace!(parent, child, index, "child linked");
        self.events.fire(ChildEntitiesChanged { action: ChangeAction::Add, parent_id: parent, child_id: child, child_index: index });
    }

    fn unlink_child(&mut self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        let node = self.entities.get_mut(parent).ok_or(EcsError::EntityNotFound { id: parent })?;
        let index = node
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(EcsError::NotAChild { parent, child })?;
        node.children.remove(index);
        if let Some(node) = self.entities.get_mut(child) {
            node.parent = NO_ENTITY;
        }
        trace!(parent, child, index, "child unlinked");
        self.events.fire(ChildEntitiesChanged { action: ChangeAction::Remove, parent_id: parent, child_id: child, child_index: index });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scripts
    // ─────────────────────────────────────────────────────────────────────

    /// Attaches `script` to entity `id`. One instance per script type.
    pub fn add_script<S: Script>(&mut self, id: EntityId, script: S) -> EcsResult<()> {
        self.check_owner()?;
        let index = self.schema.script_index::<S>()?;
        let node = self.entities.get_mut(id).ok_or(EcsError::EntityNotFound { id })?;
        if node.script_slot(index).is_some() {
            return Err(EcsError::ScriptAlreadyPresent { id, script: S::KEY });
        }
        node.scripts.push((index, Box::new(script)));
        Ok(())
    }

    /// Detaches script `S` from entity `id` and returns it.
    pub fn remove_script<S: Script>(&mut self, id: EntityId) -> EcsResult<S> {
        self.check_owner()?;
        let index = self.schema.script_index::<S>()?;
        let node = self.entities.get_mut(id).ok_or(EcsError::EntityNotFound { id })?;
        let slot = node.script_slot(index).ok_or(EcsError::ScriptNotPresent { id, script: S::KEY })?;
        let (_, script) = node.scripts.remove(slot);
        script
            .downcast::<S>()
            .map(|script| *script)
            .map_err(|_| EcsError::TypeMismatch { expected: type_name::<S>(), actual: "<script>" })
    }

    /// Script `S` of entity `id`.
    pub fn script<S: Script>(&self, id: EntityId) -> EcsResult<&S> {
        let index = self.schema.script_index::<S>()?;
        let node = self.entities.get(id).ok_or(EcsError::EntityNotFound { id })?;
        node.script_slot(index)
            .and_then(|slot| node.scripts[slot].1.downcast_ref::<S>())
            .ok_or(EcsError::ScriptNotPresent { id, script: S::KEY })
    }

    /// Mutable script `S` of entity `id`.
    pub fn script_mut<S: Script>(&mut self, id: EntityId) -> EcsResult<&mut S> {
        let index = self.schema.script_index::<S>()?;
        let node = self.entities.get_mut(id).ok_or(EcsError::EntityNotFound { id })?;
        match node.script_slot(index) {
            Some(slot) => node.scripts[slot]
                .1
                .downcast_mut::<S>()
                .ok_or(EcsError::ScriptNotPresent { id, script: S::KEY }),
            None => Err(EcsError::ScriptNotPresent { id, script: S::KEY }),
        }
    }

    /// Script indices attached to entity `id`, in attach order.
    pub fn script_indices(&self, id: EntityId) -> impl Iterator<Item = ScriptIndex> + '_ {
        self.entities.get(id).into_iter().flat_map(|node| node.scripts.iter().map(|(index, _)| *index))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Signals
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribes `handler` to signals of type `T` on entity `id`. Handlers
    /// are dropped with the entity.
    pub fn add_signal_handler<T: 'static>(
        &mut self,
        id: EntityId,
        handler: impl for<'a> FnMut(&Signal<'a, T>) + Send + Sync + 'static,
    ) -> EcsResult<HandlerId> {
        if !self.contains(id) {
            return Err(EcsError::EntityNotFound { id });
        }
        Ok(self.events.add_signal_handler(id, handler))
    }

    /// Emits `event` on entity `id`; returns the number of handlers that ran.
    pub fn emit_signal<T: 'static>(&mut self, id: EntityId, event: T) -> EcsResult<usize> {
        if !self.contains(id) {
            return Err(EcsError::EntityNotFound { id });
        }
        Ok(self.events.emit_signal(id, &event))
    }
}
