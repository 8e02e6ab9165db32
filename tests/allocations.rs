//! Hot paths must not touch the heap once warmed up.

mod common;

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use common::*;

struct CountingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|n| n.set(n.get() + 1));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|n| n.set(n.get() + 1));
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

/// Allocations made by the calling thread.
fn allocations() -> usize {
    ALLOCATIONS.with(Cell::get)
}

#[test]
fn typed_access_and_iteration_do_not_allocate() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 1000);
    let mut query = store.query::<(Position, Velocity)>().unwrap();
    let mut snapshot = store.query::<(Position, Velocity)>().unwrap().copy_component::<Velocity>().unwrap();

    let mut pass = |store: &mut columnar_ecs::EntityStore| {
        for &id in &ids {
            store.get_component_mut::<Position>(id).unwrap().y += 1.0;
            let speed = store.get_component::<Velocity>(id).unwrap().x;
            assert_eq!(speed, 1.0);
        }
        query
            .for_each_chunk(store, |(positions, velocities), _| {
                for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                    p.x += v.x;
                }
            })
            .unwrap();
        snapshot
            .for_each_chunk(store, |(_, velocities), _| {
                for v in velocities.iter_mut() {
                    v.x = 0.0;
                }
            })
            .unwrap();
        query.for_each_entity(store, |(p, _), _| p.z += 1.0).unwrap();
    };

    pass(&mut store);
    let before = allocations();
    for _ in 0..100 {
        pass(&mut store);
    }
    assert_eq!(allocations() - before, 0);

    // Snapshot writes never reach the live column.
    assert_eq!(store.component::<Velocity>(ids[0]).unwrap().x, 1.0);
    assert_eq!(store.component::<Position>(ids[0]).unwrap().z, 101.0);
}
