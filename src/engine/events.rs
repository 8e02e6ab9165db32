//! Structural change events and per-entity signals.
//!
//! Every structural mutation of an [`EntityStore`](crate::EntityStore) fires
//! exactly one event per logical change, synchronously, on the mutating call:
//!
//! | mutation                       | events                                 |
//! |--------------------------------|----------------------------------------|
//! | create entity                  | [`EntityCreate`], [`EntityCreated`]    |
//! | delete entity                  | [`EntityDelete`], [`EntityDeleted`]    |
//! | add / remove one component     | one [`ComponentChanged`]               |
//! | add / remove any set of tags   | one [`TagsChanged`]                    |
//! | link / unlink a child          | one [`ChildEntitiesChanged`]           |
//!
//! Handlers are boxed `FnMut(&E)` closures kept in one list per event kind and
//! run in registration order. A panicking handler unwinds into the caller
//! that triggered the mutation.
//!
//! [`Signal<T>`] is a separate, per-entity channel with an arbitrary payload
//! and no structural meaning.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::engine::bitset::BitSet;
use crate::engine::types::{ComponentIndex, EntityId};

/// Add or remove.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Something was added.
    Add,
    /// Something was removed.
    Remove,
}

/// Fired before an entity is created. The id is already reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityCreate {
    /// Id of the entity about to be created.
    pub entity_id: EntityId,
}

/// Fired after an entity was created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityCreated {
    /// Id of the new entity.
    pub entity_id: EntityId,
}

/// Fired before an entity is deleted. The entity is still fully accessible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityDelete {
    /// Id of the entity about to be deleted.
    pub entity_id: EntityId,
}

/// Fired after an entity was deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityDeleted {
    /// Id of the deleted entity.
    pub entity_id: EntityId,
}

/// A component was added to or removed from an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentChanged {
    /// Target entity.
    pub entity_id: EntityId,
    /// Add or remove.
    pub action: ChangeAction,
    /// Component index.
    pub component_type: ComponentIndex,
}

/// The tag set of an entity changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagsChanged {
    /// Target entity.
    pub entity_id: EntityId,
    /// Tags after the change.
    pub tags: BitSet,
    /// Tags before the change.
    pub old_tags: BitSet,
}

impl TagsChanged {
    /// Tags present now but not before.
    #[inline]
    pub fn added_tags(&self) -> BitSet {
        BitSet::added(&self.old_tags, &self.tags)
    }

    /// Tags present before but not now.
    #[inline]
    pub fn removed_tags(&self) -> BitSet {
        BitSet::removed(&self.old_tags, &self.tags)
    }

    /// Tags that were added or removed.
    #[inline]
    pub fn changed_tags(&self) -> BitSet {
        BitSet::changed(&self.old_tags, &self.tags)
    }
}

/// A child was linked to or unlinked from a parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildEntitiesChanged {
    /// Add or remove.
    pub action: ChangeAction,
    /// Parent entity.
    pub parent_id: EntityId,
    /// Child entity.
    pub child_id: EntityId,
    /// Position of the child in the parent's child list (before removal for
    /// `Remove`).
    pub child_index: usize,
}

/// Typed per-entity signal payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal<'a, T> {
    /// Entity the signal was emitted on.
    pub entity_id: EntityId,
    /// Payload.
    pub event: &'a T,
}

/// Handle returned by handler registration, used to remove the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send + Sync>;

/// Observer list for one event kind.
#[doc(hidden)]
pub struct HandlerList<E> {
    handlers: Vec<(HandlerId, Handler<E>)>,
}

impl<E> Default for HandlerList<E> {
    fn default() -> Self {
        Self { handlers: Vec::new() }
    }
}

impl<E> HandlerList<E> {
    #[inline]
    fn fire(&mut self, event: &E) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        before != self.handlers.len()
    }
}

/// Event types that can be subscribed to through [`EntityEvents::on`].
pub trait StoreEvent: Sized + 'static {
    #[doc(hidden)]
    fn handlers(events: &mut EntityEvents) -> &mut HandlerList<Self>;
}

macro_rules! store_events {
    ($($event:ident => $field:ident),+ $(,)?) => {
        /// Observer lists of one store, one per event kind, plus signal handlers.
        #[derive(Default)]
        pub struct EntityEvents {
            next_id: u64,
            $( $field: HandlerList<$event>, )+
            signals: HashMap<(EntityId, TypeId), Vec<(HandlerId, Box<dyn Any + Send + Sync>)>>,
        }

        $(
            impl StoreEvent for $event {
                fn handlers(events: &mut EntityEvents) -> &mut HandlerList<Self> {
                    &mut events.$field
                }
            }
        )+

        impl EntityEvents {
            /// Removes a handler registered with [`on`](Self::on) or
            /// [`add_signal_handler`](Self::add_signal_handler).
            ///
            /// Returns `false` if no handler had this id.
            pub fn remove_handler(&mut self, id: HandlerId) -> bool {
                $( if self.$field.remove(id) { return true; } )+
                let mut removed = false;
                self.signals.retain(|_, handlers| {
                    let before = handlers.len();
                    handlers.retain(|(h, _)| *h != id);
                    removed |= before != handlers.len();
                    !handlers.is_empty()
                });
                removed
            }

            /// Total number of registered structural event handlers.
            pub fn handler_count(&self) -> usize {
                0 $( + self.$field.handlers.len() )+
            }
        }
    };
}

store_events! {
    EntityCreate => entity_create,
    EntityCreated => entity_created,
    EntityDelete => entity_delete,
    EntityDeleted => entity_deleted,
    ComponentChanged => component_changed,
    TagsChanged => tags_changed,
    ChildEntitiesChanged => child_entities_changed,
}

type SignalHandler<T> = Box<dyn for<'a> FnMut(&Signal<'a, T>) + Send + Sync>;

impl EntityEvents {
    fn next_handler_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    /// Subscribes `handler` to events of type `E`.
    ///
    /// ```ignore
    /// store.events_mut().on::<TagsChanged>(|e| println!("{:?}", e.added_tags()));
    /// ```
    pub fn on<E: StoreEvent>(&mut self, handler: impl FnMut(&E) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_handler_id();
        E::handlers(self).handlers.push((id, Box::new(handler)));
        id
    }

    #[inline]
    pub(crate) fn fire<E: StoreEvent>(&mut self, event: E) {
        E::handlers(self).fire(&event);
    }

    /// Subscribes `handler` to signals of type `T` emitted on `entity`.
    pub fn add_signal_handler<T: 'static>(
        &mut self,
        entity: EntityId,
        handler: impl for<'a> FnMut(&Signal<'a, T>) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_handler_id();
        let boxed: SignalHandler<T> = Box::new(handler);
        self.signals
            .entry((entity, TypeId::of::<T>()))
            .or_default()
            .push((id, Box::new(boxed)));
        id
    }

    /// Delivers `event` to the `T` handlers of `entity`. Returns how many ran.
    pub fn emit_signal<T: 'static>(&mut self, entity: EntityId, event: &T) -> usize {
        let Some(handlers) = self.signals.get_mut(&(entity, TypeId::of::<T>())) else {
            return 0;
        };
        let signal = Signal { entity_id: entity, event };
        let mut delivered = 0;
        for (_, handler) in handlers.iter_mut() {
            if let Some(handler) = handler.downcast_mut::<SignalHandler<T>>() {
                handler(&signal);
                delivered += 1;
            }
        }
        delivered
    }

    /// Drops every signal handler registered for `entity`.
    pub(crate) fn remove_signal_handlers(&mut self, entity: EntityId) {
        self.signals.retain(|(e, _), _| *e != entity);
    }
}
