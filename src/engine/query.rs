//! Typed queries over archetype storage.
//!
//! A [`Query`] combines a [`QueryFilter`] (required, optional and excluded
//! components and tags) with a projected component tuple `(T1, .., Tn)`,
//! `1 <= n <= 5`. Running a query visits every non-empty matching archetype,
//! chunk by chunk, and hands the closure one `&mut [Ti]` per projected type
//! plus the [`ChunkEntities`] of that chunk.
//!
//! ## Execution model
//! 1. New archetypes created since the last run are matched against the
//!    filter and appended to the cached match list. Earlier archetypes are
//!    never rescanned.
//! 2. For each matched archetype, each projected column is locked once and
//!    downcast to its typed [`Column`].
//! 3. Each chunk is handed to the closure as typed slices. Once the match list
//!    is current, iteration performs no heap allocation.
//!
//! ## Copy mode
//! [`Query::copy_component`] switches one projected position to a private
//! snapshot of each chunk. The live column is only read-locked and writes to
//! the snapshot are discarded, so other readers of the column are not
//! blocked.
//!
//! ## Borrowing
//! Columns are locked with `try_read` / `try_write`. A conflicting borrow held
//! elsewhere (an [`Entity::get_mut`] guard, another running query) makes the
//! run fail with [`EcsError::ColumnBorrowed`] instead of blocking.
//!
//! ## Example
//! ```ignore
//! let mut query = store.query::<(Position, Velocity)>()?;
//! query.for_each_chunk(&store, |(positions, velocities), _entities| {
//!     for (p, v) in positions.iter_mut().zip(velocities.iter()) {
//!         p.x += v.x;
//!     }
//! })?;
//! ```

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::engine::archetype::Archetype;
use crate::engine::bitset::BitSet;
use crate::engine::component::{Component, ComponentList, Schema, TagList, TypeKind, DISABLED_TAG};
use crate::engine::entity::Entity;
use crate::engine::error::{EcsError, EcsResult, QueryError, SchemaError};
use crate::engine::scheduler::{lcm, JobConfig, ParallelJobRunner, QueryJob};
use crate::engine::storage::Column;
use crate::engine::store::EntityStore;
use crate::engine::types::{ArchetypeId, ComponentIndex, EntityId, Signature};

/// Archetype selection by component and tag membership.
///
/// An archetype with signature `S` matches when
/// * `S.components` contains every index of `all_components`,
/// * `any_components` is empty or intersects `S.components`,
/// * `S.components` does not intersect `without_any_components`,
/// * `S.components` is not a superset of a non-empty `without_all_components`,
/// * the same four rules hold for tags,
/// * `S` does not carry the `Disabled` tag, unless `include_disabled` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Components every match must have.
    pub all_components: BitSet,
    /// Components of which a match must have at least one.
    pub any_components: BitSet,
    /// Components a match must not have all of.
    pub without_all_components: BitSet,
    /// Components a match must not have any of.
    pub without_any_components: BitSet,
    /// Tags every match must carry.
    pub all_tags: BitSet,
    /// Tags of which a match must carry at least one.
    pub any_tags: BitSet,
    /// Tags a match must not carry all of.
    pub without_all_tags: BitSet,
    /// Tags a match must not carry any of.
    pub without_any_tags: BitSet,
    /// Also match archetypes carrying the `Disabled` tag.
    pub include_disabled: bool,
}

fn set_matches(set: &BitSet, all: &BitSet, any: &BitSet, without_all: &BitSet, without_any: &BitSet) -> bool {
    set.has_all(all)
        && (any.is_empty() || set.has_any(any))
        && !set.has_any(without_any)
        && (without_all.is_empty() || !set.has_all(without_all))
}

impl QueryFilter {
    /// Filter matching every enabled archetype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an archetype with `signature` passes the filter.
    pub fn matches(&self, signature: &Signature) -> bool {
        if !self.include_disabled && signature.tags.has(DISABLED_TAG as usize) {
            return false;
        }
        set_matches(
            &signature.components,
            &self.all_components,
            &self.any_components,
            &self.without_all_components,
            &self.without_any_components,
        ) && set_matches(&signature.tags, &self.all_tags, &self.any_tags, &self.without_all_tags, &self.without_any_tags)
    }

    /// Adds `components` to the required set.
    pub fn all_components(mut self, components: &BitSet) -> Self {
        self.all_components = self.all_components.union(components);
        self
    }

    /// Adds `components` to the "at least one of" set.
    pub fn any_components(mut self, components: &BitSet) -> Self {
        self.any_components = self.any_components.union(components);
        self
    }

    /// Adds `components` to the "not all of" set.
    pub fn without_all_components(mut self, components: &BitSet) -> Self {
        self.without_all_components = self.without_all_components.union(components);
        self
    }

    /// Adds `components` to the excluded set.
    pub fn without_any_components(mut self, components: &BitSet) -> Self {
        self.without_any_components = self.without_any_components.union(components);
        self
    }

    /// Adds `tags` to the required set.
    pub fn all_tags(mut self, tags: &BitSet) -> Self {
        self.all_tags = self.all_tags.union(tags);
        self
    }

    /// Adds `tags` to the "at least one of" set.
    pub fn any_tags(mut self, tags: &BitSet) -> Self {
        self.any_tags = self.any_tags.union(tags);
        self
    }

    /// Adds `tags` to the "not all of" set.
    pub fn without_all_tags(mut self, tags: &BitSet) -> Self {
        self.without_all_tags = self.without_all_tags.union(tags);
        self
    }

    /// Adds `tags` to the excluded set.
    pub fn without_any_tags(mut self, tags: &BitSet) -> Self {
        self.without_any_tags = self.without_any_tags.union(tags);
        self
    }

    /// Sets whether disabled entities are visited.
    pub fn include_disabled(mut self, include: bool) -> Self {
        self.include_disabled = include;
        self
    }
}

/// Tuple of component types a [`Query`] projects.
///
/// Implemented for tuples of one to five [`Component`] types.
pub trait ComponentSet: Send + Sync + 'static {
    /// Per-position snapshot buffers used by copy mode.
    type Snapshots: Default + Send;

    /// Component index of every position.
    ///
    /// ## Errors
    /// * [`SchemaError::UnknownType`] if a type is not registered.
    /// * [`QueryError::DuplicateComponent`] if a type appears twice.
    fn indices(schema: &Schema) -> EcsResult<Vec<ComponentIndex>>;
}

/// Entity ids of one chunk (or one parallel section of it).
#[derive(Clone, Copy)]
pub struct ChunkEntities<'c> {
    ids: &'c [EntityId],
    store: &'c EntityStore,
}

impl<'c> ChunkEntities<'c> {
    #[inline]
    pub(crate) fn new(ids: &'c [EntityId], store: &'c EntityStore) -> Self {
        Self { ids, store }
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in row order.
    #[inline]
    pub fn ids(&self) -> &'c [EntityId] {
        self.ids
    }

    /// Handle to the entity at position `n`.
    ///
    /// ## Panics
    /// If `n >= len()`.
    #[inline]
    pub fn entity(&self, n: usize) -> Entity<'c> {
        Entity::new(self.ids[n], self.store)
    }

    /// Entity handles in row order.
    pub fn iter(&self) -> impl Iterator<Item = Entity<'c>> + 'c {
        let store = self.store;
        self.ids.iter().map(move |&id| Entity::new(id, store))
    }

    /// Splits at `mid`, as [`slice::split_at`].
    #[inline]
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        let (head, tail) = self.ids.split_at(mid);
        (Self { ids: head, store: self.store }, Self { ids: tail, store: self.store })
    }
}

/// Query over the component tuple `C`. Build one with
/// [`EntityStore::query`].
pub struct Query<C: ComponentSet> {
    schema: Arc<Schema>,
    filter: QueryFilter,
    indices: Vec<ComponentIndex>,
    projected: BitSet,
    copy: Vec<bool>,
    lane: usize,
    matched: Vec<ArchetypeId>,
    seen: usize,
    store_id: u64,
    snapshots: C::Snapshots,
    _marker: PhantomData<fn() -> C>,
}

impl<C: ComponentSet> Query<C> {
    /// Query matching every enabled archetype that holds all of `C`.
    pub fn new(schema: Arc<Schema>) -> EcsResult<Self> {
        let indices = C::indices(&schema)?;
        let projected: BitSet = indices.iter().map(|&i| i as usize).collect();
        let lane = indices
            .iter()
            .filter_map(|&i| schema.component(i))
            .map(|c| c.simd_multiple)
            .fold(1, lcm);
        Ok(Self {
            schema,
            filter: QueryFilter::default(),
            copy: vec![false; indices.len()],
            indices,
            projected,
            lane,
            matched: Vec::new(),
            seen: 0,
            store_id: 0,
            snapshots: Default::default(),
            _marker: PhantomData,
        })
    }

    /// Current filter.
    #[inline]
    pub fn query_filter(&self) -> &QueryFilter {
        &self.filter
    }

    /// Replaces the filter. Projected components stay required.
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self.reset();
        self
    }

    fn update_filter(mut self, update: impl FnOnce(QueryFilter) -> QueryFilter) -> Self {
        self.filter = update(self.filter);
        self.reset();
        self
    }

    /// Also requires every component in `L`.
    pub fn all_components<L: ComponentList>(self) -> EcsResult<Self> {
        let bits = self.schema.components_of::<L>()?;
        Ok(self.update_filter(|f| f.all_components(&bits)))
    }

    /// Requires at least one component in `L`.
    pub fn any_components<L: ComponentList>(self) -> EcsResult<Self> {
        let bits = self.schema.components_of::<L>()?;
        Ok(self.update_filter(|f| f.any_components(&bits)))
    }

    /// Skips archetypes holding every component in `L`.
    pub fn without_all_components<L: ComponentList>(self) -> EcsResult<Self> {
        let bits = self.schema.components_of::<L>()?;
        Ok(self.update_filter(|f| f.without_all_components(&bits)))
    }

    /// Skips archetypes holding any component in `L`.
    pub fn without_any_components<L: ComponentList>(self) -> EcsResult<Self> {
        let bits = self.schema.components_of::<L>()?;
        Ok(self.update_filter(|f| f.without_any_components(&bits)))
    }

    /// Requires every tag in `L`.
    pub fn all_tags<L: TagList>(self) -> EcsResult<Self> {
        let bits = self.schema.tags_of::<L>()?;
        Ok(self.update_filter(|f| f.all_tags(&bits)))
    }

    /// Requires at least one tag in `L`.
    pub fn any_tags<L: TagList>(self) -> EcsResult<Self> {
        let bits = self.schema.tags_of::<L>()?;
        Ok(self.update_filter(|f| f.any_tags(&bits)))
    }

    /// Skips archetypes carrying every tag in `L`.
    pub fn without_all_tags<L: TagList>(self) -> EcsResult<Self> {
        let bits = self.schema.tags_of::<L>()?;
        Ok(self.update_filter(|f| f.without_all_tags(&bits)))
    }

    /// Skips archetypes carrying any tag in `L`.
    pub fn without_any_tags<L: TagList>(self) -> EcsResult<Self> {
        let bits = self.schema.tags_of::<L>()?;
        Ok(self.update_filter(|f| f.without_any_tags(&bits)))
    }

    /// Also visits entities carrying the `Disabled` tag.
    pub fn include_disabled(self) -> Self {
        self.update_filter(|f| f.include_disabled(true))
    }

    /// Hands projected component `T` to closures as a private copy of each
    /// chunk instead of the live column.
    ///
    /// ## Errors
    /// [`QueryError::NotProjected`] if `T` is not part of `C`.
    pub fn copy_component<T: Component>(mut self) -> EcsResult<Self> {
        let index = self.schema.component_index::<T>()?;
        let position = self
            .indices
            .iter()
            .position(|&i| i == index)
            .ok_or(QueryError::NotProjected { type_name: type_name::<T>() })?;
        self.copy[position] = true;
        Ok(self)
    }

    /// Least common multiple of the projected types' SIMD multiples. Parallel
    /// sections are cut at multiples of this length.
    #[inline]
    pub fn simd_lane(&self) -> usize {
        self.lane
    }

    /// Returns `true` if an archetype with `signature` is visited.
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.components.has_all(&self.projected) && self.filter.matches(signature)
    }

    fn reset(&mut self) {
        self.matched.clear();
        self.seen = 0;
    }

    /// Appends archetypes created since the last call that pass the filter.
    fn refresh(&mut self, store: &EntityStore) {
        if self.store_id != store.store_id() {
            self.store_id = store.store_id();
            self.reset();
        }
        let archetypes = store.archetypes();
        for archetype in &archetypes[self.seen..] {
            if self.matches(archetype.signature()) {
                self.matched.push(archetype.id());
            }
        }
        self.seen = archetypes.len();
    }

    /// Ids of matching archetypes, empty ones included.
    pub fn archetypes(&mut self, store: &EntityStore) -> &[ArchetypeId] {
        self.refresh(store);
        &self.matched
    }

    /// Number of entities the query visits.
    pub fn count(&mut self, store: &EntityStore) -> usize {
        self.refresh(store);
        self.matched.iter().filter_map(|&id| store.archetype(id)).map(Archetype::len).sum()
    }
}

enum ColumnGuard<'a, T> {
    Read(MappedRwLockReadGuard<'a, Column<T>>),
    Write(MappedRwLockWriteGuard<'a, Column<T>>),
}

fn lock_column<T: Component>(archetype: &Archetype, index: ComponentIndex, copy: bool) -> EcsResult<ColumnGuard<'_, T>> {
    let missing = || EcsError::from(SchemaError::UnknownIndex { kind: TypeKind::Component, index: index as usize });
    if copy {
        archetype.try_read_column::<T>(index)?.map(ColumnGuard::Read).ok_or_else(missing)
    } else {
        archetype.try_write_column::<T>(index)?.map(ColumnGuard::Write).ok_or_else(missing)
    }
}

/// Live chunk for write guards, a refreshed snapshot for read guards.
fn chunk_slice<'c, T: Component>(guard: &'c mut ColumnGuard<'_, T>, snapshot: &'c mut Vec<T>, chunk: usize) -> &'c mut [T] {
    match guard {
        ColumnGuard::Write(column) => column.chunk_mut(chunk),
        ColumnGuard::Read(column) => {
            snapshot.clear();
            snapshot.extend_from_slice(column.chunk(chunk));
            snapshot.as_mut_slice()
        }
    }
}

fn check_duplicates(indices: &[ComponentIndex], names: &[&'static str]) -> EcsResult<()> {
    for (n, index) in indices.iter().enumerate() {
        if indices[..n].contains(index) {
            return Err(QueryError::DuplicateComponent { type_name: names[n] }.into());
        }
    }
    Ok(())
}

macro_rules! impl_query {
    ($(($T:ident, $n:tt)),+) => {
        impl<$($T: Component),+> ComponentSet for ($($T,)+) {
            type Snapshots = ($(Vec<$T>,)+);

            fn indices(schema: &Schema) -> EcsResult<Vec<ComponentIndex>> {
                let indices = vec![$(schema.component_index::<$T>()?),+];
                check_duplicates(&indices, &[$(type_name::<$T>()),+])?;
                Ok(indices)
            }
        }

        impl<$($T: Component),+> Query<($($T,)+)> {
            /// Calls `f` once per non-empty chunk of every matching archetype
            /// with one slice per projected component.
            ///
            /// ## Errors
            /// [`EcsError::ColumnBorrowed`] if a projected column is borrowed
            /// elsewhere. Chunks visited before the failure keep their writes.
            pub fn for_each_chunk<F>(&mut self, store: &EntityStore, mut f: F) -> EcsResult<()>
            where
                F: FnMut(($(&mut [$T],)+), ChunkEntities<'_>),
            {
                self.refresh(store);
                let Self { matched, indices, copy, snapshots, .. } = self;
                for &id in matched.iter() {
                    let Some(archetype) = store.archetype(id) else { continue };
                    if archetype.is_empty() {
                        continue;
                    }
                    let mut columns = ($(lock_column::<$T>(archetype, indices[$n], copy[$n])?,)+);
                    for chunk in 0..archetype.chunk_count() {
                        let slices = ($(chunk_slice(&mut columns.$n, &mut snapshots.$n, chunk),)+);
                        f(slices, ChunkEntities::new(archetype.chunk_entities(chunk), store));
                    }
                }
                Ok(())
            }

            /// Wraps the query in a [`QueryJob`] that runs `action` on
            /// `runner`.
            pub fn job<F>(self, runner: &ParallelJobRunner, action: F) -> QueryJob<'_, ($($T,)+), F>
            where
                F: Fn(($(&mut [$T],)+), ChunkEntities<'_>) + Sync,
            {
                QueryJob::new(self, runner, JobConfig::default(), action)
            }

            /// Calls `f` once per matching entity. Built on
            /// [`for_each_chunk`](Self::for_each_chunk).
            pub fn for_each_entity<F>(&mut self, store: &EntityStore, mut f: F) -> EcsResult<()>
            where
                F: FnMut(($(&mut $T,)+), Entity<'_>),
            {
                self.for_each_chunk(store, |mut slices, entities| {
                    for (row, &id) in entities.ids().iter().enumerate() {
                        f(($(&mut slices.$n[row],)+), Entity::new(id, store));
                    }
                })
            }
        }

        impl<'r, $($T: Component),+, F> QueryJob<'r, ($($T,)+), F>
        where
            F: Fn(($(&mut [$T],)+), ChunkEntities<'_>) + Sync,
        {
            /// Runs the action over every matching chunk, splitting large
            /// chunks into parallel sections. Returns once every section has
            /// completed.
            pub fn run(&mut self, store: &EntityStore) -> EcsResult<()> {
                self.invocations.store(0, Ordering::Relaxed);
                let QueryJob { query, runner, action, config, invocations } = self;
                let runner: &ParallelJobRunner = runner;
                let action: &F = action;
                let invocations: &AtomicUsize = invocations;
                let lane = query.simd_lane();
                let min = config.min_parallel_chunk_length;
                query.for_each_chunk(store, |slices, entities| {
                    runner.run_sections(slices, entities, lane, min, &|section, ids| {
                        invocations.fetch_add(1, Ordering::Relaxed);
                        action(section, ids);
                    });
                })
            }
        }
    };
}

impl_query!((A, 0));
impl_query!((A, 0), (B, 1));
impl_query!((A, 0), (B, 1), (C, 2));
impl_query!((A, 0), (B, 1), (C, 2), (D, 3));
impl_query!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
