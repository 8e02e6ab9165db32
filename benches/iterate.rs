use std::hint::black_box;

use columnar_ecs::ParallelJobRunner;
use criterion::*;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for &agents in &[AGENTS_SMALL, AGENTS_MED, AGENTS_LARGE] {
        group.throughput(Throughput::Elements(agents as u64));

        group.bench_with_input(BenchmarkId::new("for_each_chunk_move", agents), &agents, |b, &agents| {
            let store = populate(agents);
            let mut query = store.query::<(Position, Velocity)>().unwrap();
            b.iter(|| {
                query
                    .for_each_chunk(&store, |(positions, velocities), _| {
                        for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                            p.x += v.x;
                            p.y += v.y;
                        }
                    })
                    .unwrap();
            });
            black_box(&store);
        });

        group.bench_with_input(BenchmarkId::new("for_each_entity_move", agents), &agents, |b, &agents| {
            let store = populate(agents);
            let mut query = store.query::<(Position, Velocity)>().unwrap();
            b.iter(|| {
                query
                    .for_each_entity(&store, |(p, v), _| {
                        p.x += v.x;
                        p.y += v.y;
                    })
                    .unwrap();
            });
            black_box(&store);
        });

        group.bench_with_input(BenchmarkId::new("for_each_chunk_unfrozen", agents), &agents, |b, &agents| {
            let store = populate(agents);
            let mut query = store.query::<(Position, Velocity)>().unwrap().without_any_tags::<(Frozen,)>().unwrap();
            b.iter(|| {
                query
                    .for_each_chunk(&store, |(positions, velocities), _| {
                        for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                            p.x += v.x;
                        }
                    })
                    .unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("sum_wealth", agents), &agents, |b, &agents| {
            let store = populate(agents);
            let mut query = store.query::<(Wealth,)>().unwrap();
            b.iter(|| {
                let mut total = 0.0f32;
                query
                    .for_each_chunk(&store, |(wealth,), _| {
                        total += wealth.iter().map(|w| w.value).sum::<f32>();
                    })
                    .unwrap();
                black_box(total)
            });
        });
    }

    group.finish();
}

fn job_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("job");
    let store = populate(AGENTS_LARGE);

    for &threads in &[1usize, 2, 4, 8] {
        let runner = ParallelJobRunner::new(threads).unwrap();
        group.throughput(Throughput::Elements(AGENTS_LARGE as u64));
        group.bench_with_input(BenchmarkId::new("move", threads), &threads, |b, _| {
            let mut job = store
                .query::<(Position, Velocity)>()
                .unwrap()
                .job(&runner, |(positions, velocities), _| {
                    for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                        p.x += v.x;
                        p.y += v.y;
                    }
                })
                .min_parallel_chunk_length(64);
            b.iter(|| job.run(&store).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, iterate_benchmark, job_benchmark);
criterion_main!(benches);
