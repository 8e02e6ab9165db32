//! # Schema
//!
//! Registration pass that assigns every component, tag and script type a
//! dense index and captures the metadata the store needs to build columns.
//!
//! ## Purpose
//! The schema decouples Rust type information (`TypeId`, name, size,
//! alignment) from storage. Archetypes only see component indices and a
//! per-index column factory, so heterogeneous columns can live behind
//! [`ErasedColumn`].
//!
//! ## Design
//! - Types opt in through the [`Component`], [`Tag`] and [`Script`] marker
//!   traits. A type without the marker cannot be registered; the compiler
//!   rejects it.
//! - [`SchemaBuilder`] registers types once and [`SchemaBuilder::build`]
//!   produces an immutable `Arc<Schema>` that is handed to each store
//!   explicitly. There is no global registry.
//! - Registering the same type twice returns the index it already has.
//!   Registering a *different* type under a key that is already taken, or more
//!   than [`MAX_TYPES`] types of one kind, is a schema definition error
//!   surfaced by `build()`.
//!
//! ## Invariants
//! - Index `0` is the "no type" sentinel in every descriptor table.
//! - The built-in [`Disabled`] tag is always tag index `1`.
//! - Indices are stable for the lifetime of the schema.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, needs_drop, size_of};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::bitset::BitSet;
use crate::engine::error::SchemaError;
use crate::engine::storage::{Column, ErasedColumn};
use crate::engine::types::{ComponentIndex, ScriptIndex, TagIndex, MAX_TYPES, SIMD_REGISTER_BYTES};

/// Marker for component types: plain data stored in archetype columns.
///
/// `Default` provides the value a column holds right after a structural change
/// adds the component; `Clone` backs snapshots and entity cloning.
pub trait Component: Default + Clone + Send + Sync + 'static {
    /// Stable key used for lookup and in debug output.
    const KEY: &'static str;
    /// Display symbol for inspectors.
    const SYMBOL: Option<&'static str> = None;
    /// Display color (`0xRRGGBB`) for inspectors.
    const COLOR: Option<u32> = None;
}

/// Marker for tag types. Tags carry no data; they only take part in the
/// archetype signature.
pub trait Tag: 'static {
    /// Stable key used for lookup and in debug output.
    const KEY: &'static str;
    /// Display symbol for inspectors.
    const SYMBOL: Option<&'static str> = None;
    /// Display color (`0xRRGGBB`) for inspectors.
    const COLOR: Option<u32> = None;
}

/// Marker for script types: per-entity behaviour objects kept outside the
/// archetype columns.
pub trait Script: Send + Sync + 'static {
    /// Stable key used for lookup and in debug output.
    const KEY: &'static str;
}

/// Built-in tag excluding entities from queries that do not opt in with
/// `include_disabled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

impl Tag for Disabled {
    const KEY: &'static str = "disabled";
}

/// Tag index of [`Disabled`] in every schema.
pub const DISABLED_TAG: TagIndex = 1;

/// Kind of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// [`Component`]
    Component,
    /// [`Tag`]
    Tag,
    /// [`Script`]
    Script,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeKind::Component => "component",
            TypeKind::Tag => "tag",
            TypeKind::Script => "script",
        })
    }
}

/// Factory constructing an empty column for one component type.
pub(crate) type ColumnFactory = fn() -> Box<dyn ErasedColumn>;

fn new_column<T: Component>() -> Box<dyn ErasedColumn> {
    Box::new(Column::<T>::default())
}

/// Number of `size`-byte elements filling one SIMD register, floored to a
/// power of two, minimum 1.
pub const fn simd_multiple_for(size: usize) -> usize {
    if size == 0 || size >= SIMD_REGISTER_BYTES {
        return 1;
    }
    let fit = SIMD_REGISTER_BYTES / size;
    1 << (usize::BITS - 1 - fit.leading_zeros())
}

/// Descriptor of a registered component type.
#[derive(Clone)]
pub struct ComponentType {
    /// Dense index (`>= 1`).
    pub index: ComponentIndex,
    /// [`Component::KEY`]
    pub key: &'static str,
    /// Rust type name.
    pub type_name: &'static str,
    /// Runtime type id.
    pub type_id: TypeId,
    /// `size_of::<T>()`
    pub size: usize,
    /// `align_of::<T>()`
    pub align: usize,
    /// The type owns no drop glue and may be copied bytewise.
    pub blittable: bool,
    /// Parallel section granularity, see [`simd_multiple_for`].
    pub simd_multiple: usize,
    /// Display symbol.
    pub symbol: Option<&'static str>,
    /// Display color.
    pub color: Option<u32>,
    pub(crate) factory: ColumnFactory,
}

impl ComponentType {
    fn of<T: Component>(index: ComponentIndex) -> Self {
        Self {
            index,
            key: T::KEY,
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            blittable: !needs_drop::<T>(),
            simd_multiple: simd_multiple_for(size_of::<T>()),
            symbol: T::SYMBOL,
            color: T::COLOR,
            factory: new_column::<T>,
        }
    }

    /// Creates an empty column for this type.
    #[inline]
    pub fn new_column(&self) -> Box<dyn ErasedColumn> {
        (self.factory)()
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("index", &self.index)
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("blittable", &self.blittable)
            .field("simd_multiple", &self.simd_multiple)
            .finish()
    }
}

/// Descriptor of a registered tag type.
#[derive(Clone, Debug)]
pub struct TagType {
    /// Dense index (`>= 1`).
    pub index: TagIndex,
    /// [`Tag::KEY`]
    pub key: &'static str,
    /// Rust type name.
    pub type_name: &'static str,
    /// Runtime type id.
    pub type_id: TypeId,
    /// Display symbol.
    pub symbol: Option<&'static str>,
    /// Display color.
    pub color: Option<u32>,
}

/// Descriptor of a registered script type.
#[derive(Clone, Debug)]
pub struct ScriptType {
    /// Dense index (`>= 1`).
    pub index: ScriptIndex,
    /// [`Script::KEY`]
    pub key: &'static str,
    /// Rust type name.
    pub type_name: &'static str,
    /// Runtime type id.
    pub type_id: TypeId,
    /// `size_of::<T>()`
    pub size: usize,
}

trait Descriptor {
    fn type_name(&self) -> &'static str;
}

impl Descriptor for ComponentType {
    fn type_name(&self) -> &'static str { self.type_name }
}

impl Descriptor for TagType {
    fn type_name(&self) -> &'static str { self.type_name }
}

impl Descriptor for ScriptType {
    fn type_name(&self) -> &'static str { self.type_name }
}

/// Dense descriptor table for one type kind. Slot 0 is the sentinel.
struct TypeTable<D> {
    kind: TypeKind,
    max: usize,
    entries: Vec<Option<D>>,
    by_key: HashMap<&'static str, usize>,
    by_type: HashMap<TypeId, usize>,
}

impl<D: Descriptor> TypeTable<D> {
    fn new(kind: TypeKind, max: usize) -> Self {
        Self { kind, max, entries: vec![None], by_key: HashMap::new(), by_type: HashMap::new() }
    }

    fn insert(
        &mut self,
        type_id: TypeId,
        key: &'static str,
        type_name: &'static str,
        make: impl FnOnce(usize) -> D,
    ) -> Result<usize, SchemaError> {
        if let Some(&index) = self.by_type.get(&type_id) {
            return Ok(index);
        }
        if let Some(&index) = self.by_key.get(key) {
            let existing = self.entries[index].as_ref().map_or("?", |d| d.type_name());
            return Err(SchemaError::DuplicateKey { kind: self.kind, key, existing, duplicate: type_name });
        }
        let index = self.entries.len();
        if index > self.max {
            return Err(SchemaError::CapacityExceeded { kind: self.kind, max: self.max });
        }
        self.entries.push(Some(make(index)));
        self.by_key.insert(key, index);
        self.by_type.insert(type_id, index);
        Ok(index)
    }

    #[inline]
    fn get(&self, index: usize) -> Option<&D> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    fn by_key(&self, key: &str) -> Option<&D> {
        self.by_key.get(key).and_then(|&i| self.get(i))
    }

    fn by_type(&self, type_id: TypeId) -> Option<&D> {
        self.by_type.get(&type_id).and_then(|&i| self.get(i))
    }

    fn index_of(&self, type_id: TypeId, type_name: &'static str) -> Result<usize, SchemaError> {
        self.by_type
            .get(&type_id)
            .copied()
            .ok_or(SchemaError::UnknownType { kind: self.kind, type_name })
    }

    fn iter(&self) -> impl Iterator<Item = &D> {
        self.entries.iter().flatten()
    }

    fn count(&self) -> usize {
        self.entries.len() - 1
    }
}

/// Collects component, tag and script registrations and produces a [`Schema`].
///
/// ```ignore
/// let schema = Schema::builder()
///     .component::<Position>()
///     .component::<Velocity>()
///     .tag::<Frozen>()
///     .build()?;
/// ```
pub struct SchemaBuilder {
    components: TypeTable<ComponentType>,
    tags: TypeTable<TagType>,
    scripts: TypeTable<ScriptType>,
    error: Option<SchemaError>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Empty builder with the built-in [`Disabled`] tag registered.
    pub fn new() -> Self {
        let mut builder = Self {
            components: TypeTable::new(TypeKind::Component, MAX_TYPES),
            tags: TypeTable::new(TypeKind::Tag, MAX_TYPES),
            scripts: TypeTable::new(TypeKind::Script, ScriptIndex::MAX as usize),
            error: None,
        };
        let disabled = builder.register_tag::<Disabled>();
        debug_assert_eq!(disabled, Ok(DISABLED_TAG));
        builder
    }

    /// Registers `T` and returns its component index, or the index it
    /// already has.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentIndex, SchemaError> {
        let index = self.components.insert(TypeId::of::<T>(), T::KEY, type_name::<T>(), |i| {
            ComponentType::of::<T>(i as ComponentIndex)
        })?;
        Ok(index as ComponentIndex)
    }

    /// Registers `T` and returns its tag index, or the index it already has.
    pub fn register_tag<T: Tag>(&mut self) -> Result<TagIndex, SchemaError> {
        let index = self.tags.insert(TypeId::of::<T>(), T::KEY, type_name::<T>(), |i| TagType {
            index: i as TagIndex,
            key: T::KEY,
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            symbol: T::SYMBOL,
            color: T::COLOR,
        })?;
        Ok(index as TagIndex)
    }

    /// Registers `T` and returns its script index, or the index it already has.
    pub fn register_script<T: Script>(&mut self) -> Result<ScriptIndex, SchemaError> {
        let index = self.scripts.insert(TypeId::of::<T>(), T::KEY, type_name::<T>(), |i| ScriptType {
            index: i as ScriptIndex,
            key: T::KEY,
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
        })?;
        Ok(index as ScriptIndex)
    }

    /// Chaining form of [`register_component`](Self::register_component).
    /// The first failure is reported by [`build`](Self::build).
    pub fn component<T: Component>(mut self) -> Self {
        let result = self.register_component::<T>();
        self.keep_first_error(result.err());
        self
    }

    /// Chaining form of [`register_tag`](Self::register_tag).
    pub fn tag<T: Tag>(mut self) -> Self {
        let result = self.register_tag::<T>();
        self.keep_first_error(result.err());
        self
    }

    /// Chaining form of [`register_script`](Self::register_script).
    pub fn script<T: Script>(mut self) -> Self {
        let result = self.register_script::<T>();
        self.keep_first_error(result.err());
        self
    }

    fn keep_first_error(&mut self, error: Option<SchemaError>) {
        if self.error.is_none() {
            self.error = error;
        }
    }

    /// Freezes the registrations into a shared [`Schema`].
    ///
    /// ## Errors
    /// The first [`SchemaError`] raised by a chained registration.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.components.count() == 0 {
            warn!("schema built without component types");
        }
        debug!(
            components = self.components.count(),
            tags = self.tags.count(),
            scripts = self.scripts.count(),
            "schema built"
        );
        Ok(Arc::new(Schema { components: self.components, tags: self.tags, scripts: self.scripts }))
    }
}

/// Immutable type registry shared by stores, queries and command buffers.
pub struct Schema {
    components: TypeTable<ComponentType>,
    tags: TypeTable<TagType>,
    scripts: TypeTable<ScriptType>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("components", &self.components.iter().map(|c| c.key).collect::<Vec<_>>())
            .field("tags", &self.tags.iter().map(|t| t.key).collect::<Vec<_>>())
            .field("scripts", &self.scripts.iter().map(|s| s.key).collect::<Vec<_>>())
            .finish()
    }
}

impl Schema {
    /// Starts a new registration pass.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Component index of `T`.
    #[inline]
    pub fn component_index<T: Component>(&self) -> Result<ComponentIndex, SchemaError> {
        self.components
            .index_of(TypeId::of::<T>(), type_name::<T>())
            .map(|i| i as ComponentIndex)
    }

    /// Tag index of `T`.
    #[inline]
    pub fn tag_index<T: Tag>(&self) -> Result<TagIndex, SchemaError> {
        self.tags.index_of(TypeId::of::<T>(), type_name::<T>()).map(|i| i as TagIndex)
    }

    /// Script index of `T`.
    #[inline]
    pub fn script_index<T: Script>(&self) -> Result<ScriptIndex, SchemaError> {
        self.scripts
            .index_of(TypeId::of::<T>(), type_name::<T>())
            .map(|i| i as ScriptIndex)
    }

    /// Descriptor of component `T`.
    pub fn component_type<T: Component>(&self) -> Result<&ComponentType, SchemaError> {
        let index = self.component_index::<T>()?;
        self.component(index).ok_or(SchemaError::UnknownIndex { kind: TypeKind::Component, index: index as usize })
    }

    /// Component descriptor at `index`. `None` for the sentinel.
    #[inline]
    pub fn component(&self, index: ComponentIndex) -> Option<&ComponentType> {
        self.components.get(index as usize)
    }

    /// Tag descriptor at `index`. `None` for the sentinel.
    #[inline]
    pub fn tag(&self, index: TagIndex) -> Option<&TagType> {
        self.tags.get(index as usize)
    }

    /// Script descriptor at `index`. `None` for the sentinel.
    #[inline]
    pub fn script(&self, index: ScriptIndex) -> Option<&ScriptType> {
        self.scripts.get(index as usize)
    }

    /// Component descriptor by [`Component::KEY`].
    pub fn component_by_key(&self, key: &str) -> Option<&ComponentType> {
        self.components.by_key(key)
    }

    /// Tag descriptor by [`Tag::KEY`].
    pub fn tag_by_key(&self, key: &str) -> Option<&TagType> {
        self.tags.by_key(key)
    }

    /// Script descriptor by [`Script::KEY`].
    pub fn script_by_key(&self, key: &str) -> Option<&ScriptType> {
        self.scripts.by_key(key)
    }

    /// Component descriptor by runtime type.
    pub fn component_by_type_id(&self, type_id: TypeId) -> Option<&ComponentType> {
        self.components.by_type(type_id)
    }

    /// Tag descriptor by runtime type.
    pub fn tag_by_type_id(&self, type_id: TypeId) -> Option<&TagType> {
        self.tags.by_type(type_id)
    }

    /// Script descriptor by runtime type.
    pub fn script_by_type_id(&self, type_id: TypeId) -> Option<&ScriptType> {
        self.scripts.by_type(type_id)
    }

    /// Registered components in index order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentType> {
        self.components.iter()
    }

    /// Registered tags in index order, [`Disabled`] first.
    pub fn tags(&self) -> impl Iterator<Item = &TagType> {
        self.tags.iter()
    }

    /// Registered scripts in index order.
    pub fn scripts(&self) -> impl Iterator<Item = &ScriptType> {
        self.scripts.iter()
    }

    /// Number of registered component types.
    pub fn component_count(&self) -> usize {
        self.components.count()
    }

    /// Number of registered tag types, including [`Disabled`].
    pub fn tag_count(&self) -> usize {
        self.tags.count()
    }

    /// Number of registered script types.
    pub fn script_count(&self) -> usize {
        self.scripts.count()
    }

    /// Component bitset for the type list `L`.
    pub fn components_of<L: ComponentList>(&self) -> Result<BitSet, SchemaError> {
        L::component_bits(self)
    }

    /// Tag bitset for the type list `L`.
    pub fn tags_of<L: TagList>(&self) -> Result<BitSet, SchemaError> {
        L::tag_bits(self)
    }

    /// Key of component `index`, or `"?"` for an unknown index.
    pub(crate) fn component_key(&self, index: ComponentIndex) -> &'static str {
        self.component(index).map_or("?", |c| c.key)
    }

    /// Key of tag `index`, or `"?"` for an unknown index.
    pub(crate) fn tag_key(&self, index: TagIndex) -> &'static str {
        self.tag(index).map_or("?", |t| t.key)
    }

    /// Fails on the first component index in `bits` that no type owns.
    pub(crate) fn check_components(&self, bits: &BitSet) -> Result<(), SchemaError> {
        match bits.iter().find(|&i| self.components.get(i).is_none()) {
            Some(index) => Err(SchemaError::UnknownIndex { kind: TypeKind::Component, index }),
            None => Ok(()),
        }
    }

    /// Fails on the first tag index in `bits` that no type owns.
    pub(crate) fn check_tags(&self, bits: &BitSet) -> Result<(), SchemaError> {
        match bits.iter().find(|&i| self.tags.get(i).is_none()) {
            Some(index) => Err(SchemaError::UnknownIndex { kind: TypeKind::Tag, index }),
            None => Ok(()),
        }
    }

    /// Type name of the value inside a boxed component, for error reporting.
    pub(crate) fn boxed_type_name(&self, value: &(dyn Any + Send)) -> &'static str {
        self.component_by_type_id((*value).type_id()).map_or("<unregistered>", |c| c.type_name)
    }
}

/// Tuple of component types resolvable into a component [`BitSet`].
pub trait ComponentList {
    /// Bitset with the index of every listed type.
    fn component_bits(schema: &Schema) -> Result<BitSet, SchemaError>;
}

/// Tuple of tag types resolvable into a tag [`BitSet`].
pub trait TagList {
    /// Bitset with the index of every listed type.
    fn tag_bits(schema: &Schema) -> Result<BitSet, SchemaError>;
}

macro_rules! impl_type_lists {
    ($($T:ident),+) => {
        impl<$($T: Component),+> ComponentList for ($($T,)+) {
            fn component_bits(schema: &Schema) -> Result<BitSet, SchemaError> {
                let mut bits = BitSet::new();
                $( bits.set_bit(schema.component_index::<$T>()? as usize); )+
                Ok(bits)
            }
        }

        impl<$($T: Tag),+> TagList for ($($T,)+) {
            fn tag_bits(schema: &Schema) -> Result<BitSet, SchemaError> {
                let mut bits = BitSet::new();
                $( bits.set_bit(schema.tag_index::<$T>()? as usize); )+
                Ok(bits)
            }
        }
    };
}

impl_type_lists!(A);
impl_type_lists!(A, B);
impl_type_lists!(A, B, C);
impl_type_lists!(A, B, C, D);
impl_type_lists!(A, B, C, D, E);
impl_type_lists!(A, B, C, D, E, F);
impl_type_lists!(A, B, C, D, E, F, G);
impl_type_lists!(A, B, C, D, E, F, G, H);
