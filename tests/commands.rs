mod common;

use std::sync::Arc;

use columnar_ecs::{
    BitSet, Command, CommandBuffer, ComponentChanged, EcsError, ParallelJobRunner, PlaybackError, SchemaError,
    SyncCommandBuffer,
};
use common::*;

#[test]
fn recorded_commands_apply_in_order() {
    let mut store = store();
    let mut buffer = CommandBuffer::for_store(&store);

    let id = buffer.create_entity(&store);
    assert!(!store.contains(id));
    buffer.add_component(id, Position { x: 3.0, ..Default::default() }).unwrap();
    buffer.add_component(id, Health(1)).unwrap();
    buffer.add_tags(id, BitSet::from_indices(&[2]));
    buffer.remove_component::<Health>(id).unwrap();
    assert_eq!(buffer.len(), 5);

    assert_eq!(buffer.playback(&mut store), Ok(5));
    assert!(buffer.is_empty());
    assert_eq!(store.component::<Position>(id).unwrap().x, 3.0);
    assert!(!store.has_component::<Health>(id).unwrap());
    assert!(store.has_tag::<Frozen>(id).unwrap());
    assert_index_consistent(&store);
}

#[test]
fn playback_add_overwrites_existing_component() {
    let mut store = store();
    let id = store.create_entity().unwrap();
    store.add_component(id, Health(1)).unwrap();

    let mut buffer = CommandBuffer::for_store(&store);
    buffer.add_component(id, Health(2)).unwrap();
    buffer.set_component(id, Health(3)).unwrap();
    buffer.playback(&mut store).unwrap();
    assert_eq!(store.component::<Health>(id).unwrap(), Health(3));
}

#[test]
fn playback_stops_at_first_error_and_clears() {
    let mut store = store();
    let id = store.create_entity().unwrap();

    let mut buffer = CommandBuffer::for_store(&store);
    buffer.add_component(id, Health(1)).unwrap();
    buffer.remove_component::<Velocity>(id).unwrap();
    buffer.add_component(id, Position::default()).unwrap();
    let capacity = buffer.capacity();

    assert_eq!(
        buffer.playback(&mut store),
        Err(PlaybackError { index: 1, error: EcsError::ComponentNotPresent { id, component: "velocity" } })
    );
    assert!(buffer.is_empty());
    assert_eq!(buffer.capacity(), capacity);
    assert!(store.has_component::<Health>(id).unwrap());
    assert!(!store.has_component::<Position>(id).unwrap());
}

#[test]
fn deleted_targets_fail_playback() {
    let mut store = store();
    let id = store.create_entity().unwrap();
    let mut buffer = CommandBuffer::for_store(&store);
    buffer.delete_entity(id);
    buffer.add_tag::<Selected>(id).unwrap();
    let error = buffer.playback(&mut store).unwrap_err();
    assert_eq!(error.index, 1);
    assert_eq!(error.error, EcsError::EntityNotFound { id });
}

#[test]
fn reserved_ids_do_not_collide_with_direct_creation() {
    let mut store = store();
    let mut buffer = CommandBuffer::for_store(&store);
    let reserved = buffer.create_entity(&store);
    let direct = store.create_entity().unwrap();
    assert_ne!(reserved, direct);
    buffer.playback(&mut store).unwrap();
    assert!(store.contains(reserved));
    assert!(store.contains(direct));
    assert_ne!(store.create_entity().unwrap(), reserved);
}

#[test]
fn sync_buffer_records_from_parallel_sections() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 10);
    let buffer = Arc::new(SyncCommandBuffer::for_store(&store));
    let runner = ParallelJobRunner::new(4).unwrap();

    let sink = buffer.clone();
    let mut job = store
        .query::<(Position,)>()
        .unwrap()
        .job(&runner, move |(positions,), entities| {
            for (n, p) in positions.iter().enumerate() {
                if p.x as u32 % 2 == 0 {
                    sink.add_tag::<Selected>(entities.ids()[n]).unwrap();
                }
            }
        })
        .min_parallel_chunk_length(2);
    job.run(&store).unwrap();
    drop(job);

    assert_eq!(buffer.len(), 5);
    buffer.playback(&mut store).unwrap();
    for (i, &id) in ids.iter().enumerate() {
        assert_eq!(store.has_tag::<Selected>(id).unwrap(), i % 2 == 0);
    }
}

#[test]
fn mistyped_component_value_leaves_entity_in_place() {
    let mut store = store();
    let id = store.create_entity().unwrap();
    store.add_component(id, Position::default()).unwrap();
    let before = store.location(id).unwrap().archetype;
    let archetypes = store.archetypes().len();

    let changes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = changes.clone();
    store.events_mut().on::<ComponentChanged>(move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });

    let health = store.schema().component_index::<Health>().unwrap();
    let mut buffer = CommandBuffer::for_store(&store);
    buffer.push(Command::AddComponent { id, component: health, value: Box::new(Velocity::default()) });
    let error = buffer.playback(&mut store).unwrap_err();

    assert_eq!(error.index, 0);
    assert!(matches!(error.error, EcsError::TypeMismatch { expected: "health", .. }));
    assert_eq!(store.location(id).unwrap().archetype, before);
    assert_eq!(store.archetypes().len(), archetypes);
    assert!(!store.has_component::<Health>(id).unwrap());
    assert_eq!(changes.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_index_consistent(&store);
}

#[test]
fn unknown_component_index_is_rejected_before_moving() {
    let mut store = store();
    let id = store.create_entity().unwrap();
    let before = store.location(id).unwrap();

    let mut buffer = CommandBuffer::for_store(&store);
    buffer.push(Command::AddComponent { id, component: 200, value: Box::new(Health(1)) });
    let error = buffer.playback(&mut store).unwrap_err();

    assert!(matches!(error.error, EcsError::Schema(SchemaError::UnknownIndex { index: 200, .. })));
    assert_eq!(store.location(id).unwrap(), before);
}
