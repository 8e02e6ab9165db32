#![allow(dead_code)]

use std::sync::Arc;

use columnar_ecs::{Component, EntityStore, Schema, Tag};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const AGENTS_LARGE: usize = 1_000_000;

#[derive(Clone, Copy, Debug, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Component for Position {
    const KEY: &'static str = "position";
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

impl Component for Velocity {
    const KEY: &'static str = "velocity";
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Wealth {
    pub value: f32,
}

impl Component for Wealth {
    const KEY: &'static str = "wealth";
}

pub struct Frozen;

impl Tag for Frozen {
    const KEY: &'static str = "frozen";
}

pub fn schema() -> Arc<Schema> {
    Schema::builder()
        .component::<Position>()
        .component::<Velocity>()
        .component::<Wealth>()
        .tag::<Frozen>()
        .build()
        .expect("bench schema")
}

/// Store with `agent_count` movers. Roughly a quarter also carry `Wealth` and
/// a tenth are frozen, so queries span several archetypes.
pub fn populate(agent_count: usize) -> EntityStore {
    let mut rng = StdRng::seed_from_u64(42);
    let mut store = EntityStore::new(schema());
    for _ in 0..agent_count {
        let id = store.create_entity().expect("create");
        store
            .add_component(id, Position { x: rng.gen_range(0.0..100.0), y: rng.gen_range(0.0..100.0) })
            .expect("position");
        store.add_component(id, Velocity { x: rng.gen_range(-1.0..1.0), y: rng.gen_range(-1.0..1.0) }).expect("velocity");
        if rng.gen_bool(0.25) {
            store.add_component(id, Wealth { value: rng.gen_range(0.0..10.0) }).expect("wealth");
        }
        if rng.gen_bool(0.1) {
            store.add_tag::<Frozen>(id).expect("frozen");
        }
    }
    store
}
