#![allow(dead_code)]

use std::sync::Arc;

use columnar_ecs::{Component, EntityId, EntityStore, Schema, Script, Tag};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Component for Position {
    const KEY: &'static str = "position";
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Component for Velocity {
    const KEY: &'static str = "velocity";
    const SYMBOL: Option<&'static str> = Some("v");
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Name(pub String);

impl Component for Name {
    const KEY: &'static str = "name";
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Health(pub u32);

impl Component for Health {
    const KEY: &'static str = "health";
}

/// Registered under the same key as `Position`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Impostor;

impl Component for Impostor {
    const KEY: &'static str = "position";
}

/// Never registered.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Unregistered;

impl Component for Unregistered {
    const KEY: &'static str = "unregistered";
}

pub struct Frozen;

impl Tag for Frozen {
    const KEY: &'static str = "frozen";
}

pub struct Selected;

impl Tag for Selected {
    const KEY: &'static str = "selected";
}

#[derive(Debug, Default, PartialEq)]
pub struct Wander {
    pub steps: u32,
}

impl Script for Wander {
    const KEY: &'static str = "wander";
}

pub fn schema() -> Arc<Schema> {
    Schema::builder()
        .component::<Position>()
        .component::<Velocity>()
        .component::<Name>()
        .component::<Health>()
        .tag::<Frozen>()
        .tag::<Selected>()
        .script::<Wander>()
        .build()
        .unwrap()
}

pub fn store() -> EntityStore {
    EntityStore::new(schema())
}

/// Creates `count` entities with `Position { x: i }` and `Velocity { x: 1 }`.
pub fn spawn_movers(store: &mut EntityStore, count: usize) -> Vec<EntityId> {
    (0..count)
        .map(|i| {
            let id = store.create_entity().unwrap();
            store.add_component(id, Position { x: i as f32, ..Default::default() }).unwrap();
            store.add_component(id, Velocity { x: 1.0, ..Default::default() }).unwrap();
            id
        })
        .collect()
}

/// Checks that every live entity's node points at a row holding its id, and
/// that every archetype row belongs to a live entity located there.
pub fn assert_index_consistent(store: &EntityStore) {
    let mut rows = 0;
    for archetype in store.archetypes() {
        for (row, &id) in archetype.entity_ids().iter().enumerate() {
            let location = store.location(id).unwrap();
            assert_eq!(location.archetype, archetype.id(), "entity {id} archetype");
            assert_eq!(location.row, row, "entity {id} row");
        }
        rows += archetype.len();
    }
    assert_eq!(rows, store.entity_count());
    for id in store.entity_ids() {
        let location = store.location(id).unwrap();
        let archetype = store.archetype(location.archetype).unwrap();
        assert_eq!(archetype.entity_ids()[location.row], id);
    }
}
