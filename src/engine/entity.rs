//! Entity ids, the node table that locates them, and the [`Entity`] handle.
//!
//! ## Ids
//! Ids are dense `u32` values handed out by an atomic counter starting at 1.
//! Reservation only needs `&EntityStore`, which lets command buffers recorded
//! on worker threads claim ids up front and create the entities later during
//! playback. Ids are never reused.
//!
//! ## Node table
//! A `Vec` indexed by id. A live slot holds the entity's [`EntityLocation`]
//! plus the data that lives outside archetypes: parent/child links and
//! scripts.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::engine::archetype::Archetype;
use crate::engine::bitset::BitSet;
use crate::engine::component::{Component, Script, Tag, DISABLED_TAG};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::store::EntityStore;
use crate::engine::types::{ArchetypeId, EntityId, Row, ScriptIndex, NO_ENTITY};

/// Where an entity's component values live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Row inside the archetype.
    pub row: Row,
}

pub(crate) type ScriptBox = Box<dyn Any + Send + Sync>;

pub(crate) struct EntityNode {
    pub(crate) location: EntityLocation,
    pub(crate) parent: EntityId,
    pub(crate) children: Vec<EntityId>,
    pub(crate) scripts: Vec<(ScriptIndex, ScriptBox)>,
}

impl EntityNode {
    fn new(location: EntityLocation) -> Self {
        Self { location, parent: NO_ENTITY, children: Vec::new(), scripts: Vec::new() }
    }

    pub(crate) fn script_slot(&self, index: ScriptIndex) -> Option<usize> {
        self.scripts.iter().position(|(i, _)| *i == index)
    }
}

/// Id to node mapping for live entities.
pub(crate) struct EntityTable {
    nodes: Vec<Option<EntityNode>>,
    alive: usize,
}

impl EntityTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity + 1);
        nodes.push(None);
        Self { nodes, alive: 0 }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.alive
    }

    #[inline]
    pub(crate) fn get(&self, id: EntityId) -> Option<&EntityNode> {
        self.nodes.get(id as usize).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityNode> {
        self.nodes.get_mut(id as usize).and_then(Option::as_mut)
    }

    #[inline]
    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub(crate) fn location(&self, id: EntityId) -> EcsResult<EntityLocation> {
        self.get(id).map(|n| n.location).ok_or(EcsError::EntityNotFound { id })
    }

    /// Fails if `id` is the reserved sentinel or already live.
    pub(crate) fn check_vacant(&self, id: EntityId) -> EcsResult<()> {
        if id == NO_ENTITY || self.contains(id) {
            return Err(EcsError::EntityIdInUse { id });
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, id: EntityId, location: EntityLocation) {
        let index = id as usize;
        if index >= self.nodes.len() {
            self.nodes.resize_with(index + 1, || None);
        }
        debug_assert!(self.nodes[index].is_none());
        self.nodes[index] = Some(EntityNode::new(location));
        self.alive += 1;
    }

    pub(crate) fn remove(&mut self, id: EntityId) -> Option<EntityNode> {
        let node = self.nodes.get_mut(id as usize)?.take()?;
        self.alive -= 1;
        Some(node)
    }

    /// Updates the row of an entity promoted by a swap-remove.
    pub(crate) fn set_row(&mut self, id: EntityId, row: Row) {
        if let Some(node) = self.get_mut(id) {
            node.location.row = row;
        }
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_some())
            .map(|(id, _)| id as EntityId)
    }
}

/// Atomic id counter shared by the store and its command buffers.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self { next: AtomicU32::new(NO_ENTITY + 1) }
    }

    /// Claims a fresh id.
    #[inline]
    pub(crate) fn reserve(&self) -> EntityId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Makes sure `id` is never handed out by [`reserve`](Self::reserve).
    #[inline]
    pub(crate) fn observe(&self, id: EntityId) {
        self.next.fetch_max(id.saturating_add(1), Ordering::Relaxed);
    }
}

/// Lightweight handle to an entity in an [`EntityStore`].
///
/// A handle never owns memory. Component access goes through the column
/// locks, so `get` / `get_mut` fail with [`EcsError::ColumnBorrowed`] while a
/// query holds the same column.
#[derive(Clone, Copy)]
pub struct Entity<'s> {
    id: EntityId,
    store: &'s EntityStore,
}

impl<'s> Entity<'s> {
    #[inline]
    pub(crate) fn new(id: EntityId, store: &'s EntityStore) -> Self {
        Self { id, store }
    }

    /// Entity id.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Owning store.
    #[inline]
    pub fn store(&self) -> &'s EntityStore {
        self.store
    }

    /// Returns `true` while the entity exists.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.store.contains(self.id)
    }

    /// Current archetype.
    pub fn archetype(&self) -> Option<&'s Archetype> {
        self.store.archetype_of(self.id).ok()
    }

    /// Returns `true` if the entity has component `T`.
    pub fn has<T: Component>(&self) -> bool {
        self.store.has_component::<T>(self.id).unwrap_or(false)
    }

    /// Shared access to component `T`.
    pub fn get<T: Component>(&self) -> EcsResult<MappedRwLockReadGuard<'s, T>> {
        self.store.get_component::<T>(self.id)
    }

    /// Exclusive access to component `T` through the column lock.
    pub fn get_mut<T: Component>(&self) -> EcsResult<MappedRwLockWriteGuard<'s, T>> {
        self.store.get_component_locked::<T>(self.id)
    }

    /// Tag set.
    pub fn tags(&self) -> BitSet {
        self.archetype().map(|a| a.signature().tags).unwrap_or_default()
    }

    /// Returns `true` if the entity carries tag `T`.
    pub fn has_tag<T: Tag>(&self) -> bool {
        self.store.has_tag::<T>(self.id).unwrap_or(false)
    }

    /// Returns `false` if the entity carries the `Disabled` tag.
    pub fn is_enabled(&self) -> bool {
        !self.tags().has(DISABLED_TAG as usize)
    }

    /// Parent entity.
    pub fn parent(&self) -> Option<Entity<'s>> {
        match self.store.parent(self.id) {
            Ok(Some(parent)) => Some(Entity::new(parent, self.store)),
            _ => None,
        }
    }

    /// Child ids in order.
    pub fn child_ids(&self) -> &'s [EntityId] {
        self.store.children(self.id).unwrap_or(&[])
    }

    /// Children in order.
    pub fn children(&self) -> impl Iterator<Item = Entity<'s>> + 's {
        let store = self.store;
        self.child_ids().iter().map(move |&id| Entity::new(id, store))
    }

    /// Script `S`, if attached.
    pub fn script<S: Script>(&self) -> Option<&'s S> {
        self.store.script::<S>(self.id).ok()
    }

    /// One-line summary: id, component keys, `#`-prefixed tag keys.
    ///
    /// ```text
    /// id: 5  [position, velocity, #frozen]
    /// ```
    pub fn debug_string(&self) -> String {
        let Some(archetype) = self.archetype() else {
            return format!("id: {}  (deleted)", self.id);
        };
        let schema = self.store.schema();
        let mut parts: Vec<&str> = archetype
            .component_types()
            .iter()
            .map(|&i| schema.component(i).map_or("?", |c| c.key))
            .collect();
        let tags: Vec<String> = archetype
            .signature()
            .tags
            .iter()
            .map(|i| format!("#{}", schema.tag(i as u8).map_or("?", |t| t.key)))
            .collect();
        parts.extend(tags.iter().map(String::as_str));
        format!("id: {}  [{}]", self.id, parts.join(", "))
    }

    /// JSON summary of the entity's structure (not its component values).
    ///
    /// ```text
    /// {"id":5,"archetype":2,"components":["position"],"tags":["frozen"],
    ///  "scripts":[],"parent":null,"children":[7,8]}
    /// ```
    #[cfg(feature = "debug-json")]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let Some(archetype) = self.archetype() else {
            return json!({ "id": self.id, "deleted": true });
        };
        let schema = self.store.schema();
        let components: Vec<&str> = archetype
            .component_types()
            .iter()
            .filter_map(|&i| schema.component(i).map(|c| c.key))
            .collect();
        let tags: Vec<&str> = archetype
            .signature()
            .tags
            .iter()
            .filter_map(|i| schema.tag(i as u8).map(|t| t.key))
            .collect();
        let scripts: Vec<&str> = self
            .store
            .script_indices(self.id)
            .filter_map(|i| schema.script(i).map(|s| s.key))
            .collect();
        json!({
            "id": self.id,
            "archetype": archetype.id(),
            "components": components,
            "tags": tags,
            "scripts": scripts,
            "parent": self.parent().map(|p| p.id()),
            "children": self.child_ids(),
        })
    }
}

impl PartialEq for Entity<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.store, other.store)
    }
}

impl Eq for Entity<'_> {}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

impl fmt::Display for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.id)
    }
}
