//! Batched change recording and "did X change" filters.
//!
//! An [`EventRecorder`] is owned by the store and disabled by default. When
//! enabled, every structural change appends the entity id to an append-only
//! buffer keyed by change kind and type index:
//!
//! * component added / removed, one buffer per component index;
//! * tag added / removed, one buffer per tag index.
//!
//! [`EventFilter`] selects type indices per change kind and answers
//! [`EventFilter::filter`]: did this entity experience any selected change
//! since the last [`EventRecorder::clear_events`]?
//!
//! Each buffer carries a lazily built hash set plus a cursor into the id list.
//! A lookup first folds ids appended since the last lookup into the set, so
//! the set is built once per buffer generation and extended incrementally.
//! Appends and lookups both need `&mut EventRecorder`, so the borrow checker
//! rules out appends racing a lookup.

use std::collections::HashSet;

use crate::engine::bitset::BitSet;
use crate::engine::component::{Component, Schema, Tag};
use crate::engine::error::SchemaError;
use crate::engine::events::ChangeAction;
use crate::engine::types::{ComponentIndex, EntityId, TagIndex};

#[derive(Default)]
struct IdBuffer {
    ids: Vec<EntityId>,
    set: HashSet<EntityId>,
    position: usize,
}

impl IdBuffer {
    #[inline]
    fn push(&mut self, id: EntityId) {
        self.ids.push(id);
    }

    fn contains(&mut self, id: EntityId) -> bool {
        if self.position < self.ids.len() {
            self.set.extend(&self.ids[self.position..]);
            self.position = self.ids.len();
        }
        self.set.contains(&id)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.set.clear();
        self.position = 0;
    }
}

/// One buffer per type index, grown on demand.
#[derive(Default)]
struct BufferTable {
    buffers: Vec<IdBuffer>,
}

impl BufferTable {
    fn push(&mut self, index: usize, id: EntityId) {
        if index >= self.buffers.len() {
            self.buffers.resize_with(index + 1, IdBuffer::default);
        }
        self.buffers[index].push(id);
    }

    fn ids(&self, index: usize) -> &[EntityId] {
        self.buffers.get(index).map_or(&[], |b| b.ids.as_slice())
    }

    fn contains(&mut self, index: usize, id: EntityId) -> bool {
        self.buffers.get_mut(index).is_some_and(|b| b.contains(id))
    }

    fn clear(&mut self) {
        self.buffers.iter_mut().for_each(IdBuffer::clear);
    }
}

/// Append-only log of structural changes, grouped by change kind and type.
#[derive(Default)]
pub struct EventRecorder {
    enabled: bool,
    generation: u64,
    event_count: u64,
    component_added: BufferTable,
    component_removed: BufferTable,
    tag_added: BufferTable,
    tag_removed: BufferTable,
}

impl EventRecorder {
    /// Disabled recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while recording.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Starts or stops recording. Recorded ids are kept.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Number of [`clear_events`](Self::clear_events) calls so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of changes recorded in the current generation.
    #[inline]
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Drops all recorded ids and starts a new generation. Buffer capacity is
    /// kept.
    pub fn clear_events(&mut self) {
        self.component_added.clear();
        self.component_removed.clear();
        self.tag_added.clear();
        self.tag_removed.clear();
        self.event_count = 0;
        self.generation += 1;
    }

    pub(crate) fn record_component(&mut self, id: EntityId, action: ChangeAction, component: ComponentIndex) {
        if !self.enabled {
            return;
        }
        let table = match action {
            ChangeAction::Add => &mut self.component_added,
            ChangeAction::Remove => &mut self.component_removed,
        };
        table.push(component as usize, id);
        self.event_count += 1;
    }

    pub(crate) fn record_tags(&mut self, id: EntityId, old_tags: &BitSet, new_tags: &BitSet) {
        if !self.enabled {
            return;
        }
        for index in BitSet::added(old_tags, new_tags).iter() {
            self.tag_added.push(index, id);
            self.event_count += 1;
        }
        for index in BitSet::removed(old_tags, new_tags).iter() {
            self.tag_removed.push(index, id);
            self.event_count += 1;
        }
    }

    /// Ids that gained component `index`, in recording order.
    pub fn component_added_ids(&self, index: ComponentIndex) -> &[EntityId] {
        self.component_added.ids(index as usize)
    }

    /// Ids that lost component `index`, in recording order.
    pub fn component_removed_ids(&self, index: ComponentIndex) -> &[EntityId] {
        self.component_removed.ids(index as usize)
    }

    /// Ids that gained tag `index`, in recording order.
    pub fn tag_added_ids(&self, index: TagIndex) -> &[EntityId] {
        self.tag_added.ids(index as usize)
    }

    /// Ids that lost tag `index`, in recording order.
    pub fn tag_removed_ids(&self, index: TagIndex) -> &[EntityId] {
        self.tag_removed.ids(index as usize)
    }
}

/// Selection of change kinds evaluated against an [`EventRecorder`].
///
/// ```ignore
/// let filter = EventFilter::new().tag_added::<Selected>(store.schema())?;
/// if store.filter_events(&filter, id) { /* ... */ }
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    component_added: BitSet,
    component_removed: BitSet,
    tag_added: BitSet,
    tag_removed: BitSet,
}

impl EventFilter {
    /// Filter selecting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects "component `T` was added".
    pub fn component_added<T: Component>(mut self, schema: &Schema) -> Result<Self, SchemaError> {
        self.component_added.set_bit(schema.component_index::<T>()? as usize);
        Ok(self)
    }

    /// Selects "component `T` was removed".
    pub fn component_removed<T: Component>(mut self, schema: &Schema) -> Result<Self, SchemaError> {
        self.component_removed.set_bit(schema.component_index::<T>()? as usize);
        Ok(self)
    }

    /// Selects "tag `T` was added".
    pub fn tag_added<T: Tag>(mut self, schema: &Schema) -> Result<Self, SchemaError> {
        self.tag_added.set_bit(schema.tag_index::<T>()? as usize);
        Ok(self)
    }

    /// Selects "tag `T` was removed".
    pub fn tag_removed<T: Tag>(mut self, schema: &Schema) -> Result<Self, SchemaError> {
        self.tag_removed.set_bit(schema.tag_index::<T>()? as usize);
        Ok(self)
    }

    /// Selects additions of every component index in `components`.
    pub fn with_components_added(mut self, components: &BitSet) -> Self {
        self.component_added = self.component_added.union(components);
        self
    }

    /// Selects removals of every component index in `components`.
    pub fn with_components_removed(mut self, components: &BitSet) -> Self {
        self.component_removed = self.component_removed.union(components);
        self
    }

    /// Selects additions of every tag index in `tags`.
    pub fn with_tags_added(mut self, tags: &BitSet) -> Self {
        self.tag_added = self.tag_added.union(tags);
        self
    }

    /// Selects removals of every tag index in `tags`.
    pub fn with_tags_removed(mut self, tags: &BitSet) -> Self {
        self.tag_removed = self.tag_removed.union(tags);
        self
    }

    /// Returns `true` if the filter selects nothing.
    pub fn is_empty(&self) -> bool {
        self.component_added.is_empty()
            && self.component_removed.is_empty()
            && self.tag_added.is_empty()
            && self.tag_removed.is_empty()
    }

    /// Did `id` experience any selected change in the recorder's current
    /// generation?
    pub fn filter(&self, recorder: &mut EventRecorder, id: EntityId) -> bool {
        self.component_added.iter().any(|i| recorder.component_added.contains(i, id))
            || self.component_removed.iter().any(|i| recorder.component_removed.contains(i, id))
            || self.tag_added.iter().any(|i| recorder.tag_added.contains(i, id))
            || self.tag_removed.iter().any(|i| recorder.tag_removed.contains(i, id))
    }
}
