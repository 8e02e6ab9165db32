use std::hint::black_box;

use columnar_ecs::{CommandBuffer, EntityStore};
use criterion::*;

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural");

    group.bench_function("spawn_100k_with_components", |b| {
        b.iter(|| {
            let mut store = EntityStore::new(schema());
            for _ in 0..AGENTS_MED {
                let id = store.create_entity().unwrap();
                store.add_component(id, Position::default()).unwrap();
                store.add_component(id, Velocity::default()).unwrap();
            }
            black_box(store.entity_count())
        });
    });

    group.bench_function("toggle_tag_10k", |b| {
        b.iter_batched(
            || populate(AGENTS_SMALL),
            |mut store| {
                let ids = store.entity_ids().collect::<Vec<_>>();
                for id in ids {
                    if store.has_tag::<Frozen>(id).unwrap() {
                        store.remove_tag::<Frozen>(id).unwrap();
                    } else {
                        store.add_tag::<Frozen>(id).unwrap();
                    }
                }
                black_box(store)
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("command_playback_10k", |b| {
        b.iter_batched(
            || {
                let store = populate(AGENTS_SMALL);
                let mut buffer = CommandBuffer::for_store(&store);
                for id in store.entity_ids() {
                    buffer.set_component(id, Wealth { value: 1.0 }).unwrap();
                }
                (store, buffer)
            },
            |(mut store, mut buffer)| {
                black_box(buffer.playback(&mut store).unwrap());
                store
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("delete_10k", |b| {
        b.iter_batched(
            || populate(AGENTS_SMALL),
            |mut store| {
                let ids = store.entity_ids().collect::<Vec<_>>();
                for id in ids {
                    store.delete_entity(id).unwrap();
                }
                store
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
