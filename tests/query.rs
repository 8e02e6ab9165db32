mod common;

use columnar_ecs::{BitSet, EcsError, QueryError, QueryFilter, SchemaError, Signature, CHUNK_SIZE};
use common::*;

#[test]
fn projection_matches_supersets_and_filters_exclude() {
    let mut store = store();
    let ab = store.get_or_create_archetype(&Signature::empty().with_component(1).with_component(2)).unwrap();
    let abc = store
        .get_or_create_archetype(&Signature::empty().with_component(1).with_component(2).with_component(3))
        .unwrap();
    let a = store.get_or_create_archetype(&Signature::empty().with_component(1)).unwrap();

    let mut query = store.query::<(Position, Velocity)>().unwrap();
    assert_eq!(query.archetypes(&store), &[ab, abc]);

    let mut query = store.query::<(Position, Velocity)>().unwrap().without_all_components::<(Name,)>().unwrap();
    assert_eq!(query.archetypes(&store), &[ab]);

    let mut query = store.query::<(Position,)>().unwrap().any_components::<(Velocity, Health)>().unwrap();
    assert_eq!(query.archetypes(&store), &[ab, abc]);

    let mut query = store.query::<(Position,)>().unwrap().without_any_components::<(Velocity,)>().unwrap();
    assert_eq!(query.archetypes(&store), &[a]);
}

#[test]
fn filter_rules_on_signatures() {
    let signature = Signature::new(BitSet::from_indices(&[1, 2]), BitSet::from_indices(&[2]));
    assert!(QueryFilter::new().all_components(&BitSet::from_indices(&[1])).matches(&signature));
    assert!(!QueryFilter::new().all_components(&BitSet::from_indices(&[3])).matches(&signature));
    assert!(QueryFilter::new().without_all_components(&BitSet::from_indices(&[1, 3])).matches(&signature));
    assert!(!QueryFilter::new().without_all_components(&BitSet::from_indices(&[1, 2])).matches(&signature));
    assert!(!QueryFilter::new().without_any_tags(&BitSet::from_indices(&[2, 3])).matches(&signature));
    assert!(QueryFilter::new().any_tags(&BitSet::from_indices(&[2, 3])).matches(&signature));
    assert!(!QueryFilter::new().all_tags(&BitSet::from_indices(&[3])).matches(&signature));

    let disabled = signature.with_tags(BitSet::from_indices(&[1]));
    assert!(!QueryFilter::new().matches(&disabled));
    assert!(QueryFilter::new().include_disabled(true).matches(&disabled));
}

#[test]
fn matching_list_is_extended_incrementally() {
    let mut store = store();
    let mut query = store.query::<(Position,)>().unwrap();
    assert!(query.archetypes(&store).is_empty());
    assert_eq!(query.count(&store), 0);

    spawn_movers(&mut store, 3);
    assert_eq!(query.count(&store), 3);
    let first = query.archetypes(&store).len();

    let id = store.create_entity().unwrap();
    store.add_component(id, Position::default()).unwrap();
    store.add_tag::<Frozen>(id).unwrap();
    assert_eq!(query.archetypes(&store).len(), first + 1);
    assert_eq!(query.count(&store), 4);
}

#[test]
fn chunks_cover_every_entity_with_a_short_last_chunk() {
    let mut store = store();
    let count = CHUNK_SIZE + 10;
    spawn_movers(&mut store, count);

    let mut query = store.query::<(Position, Velocity)>().unwrap();
    let mut lengths = Vec::new();
    query
        .for_each_chunk(&store, |(positions, velocities), entities| {
            assert_eq!(positions.len(), velocities.len());
            assert_eq!(positions.len(), entities.len());
            for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                p.x += v.x;
            }
            lengths.push(entities.len());
        })
        .unwrap();
    assert_eq!(lengths, vec![CHUNK_SIZE, 10]);

    for id in store.entity_ids() {
        let entity = store.entity(id).unwrap();
        assert_eq!(entity.get::<Position>().unwrap().x, (id - 1) as f32 + 1.0);
    }
}

#[test]
fn for_each_entity_yields_matching_handles() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 5);
    store.add_component(ids[2], Health(9)).unwrap();

    let mut query = store.query::<(Health, Position)>().unwrap();
    let mut seen = Vec::new();
    query
        .for_each_entity(&store, |(health, position), entity| {
            health.0 += 1;
            position.y = 1.0;
            seen.push(entity.id());
        })
        .unwrap();
    assert_eq!(seen, vec![ids[2]]);
    assert_eq!(store.component::<Health>(ids[2]).unwrap(), Health(10));
}

#[test]
fn disabled_entities_are_skipped_unless_included() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 4);
    store.set_enabled(ids[0], false).unwrap();

    let mut query = store.query::<(Position,)>().unwrap();
    assert_eq!(query.count(&store), 3);
    let mut query = store.query::<(Position,)>().unwrap().include_disabled();
    assert_eq!(query.count(&store), 4);
}

#[test]
fn tag_filters() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 4);
    store.add_tag::<Selected>(ids[1]).unwrap();
    store.add_tag::<Selected>(ids[3]).unwrap();

    let mut selected = store.query::<(Position,)>().unwrap().all_tags::<(Selected,)>().unwrap();
    let mut ids_seen = Vec::new();
    selected.for_each_entity(&store, |_, entity| ids_seen.push(entity.id())).unwrap();
    ids_seen.sort_unstable();
    assert_eq!(ids_seen, vec![ids[1], ids[3]]);

    let mut others = store.query::<(Position,)>().unwrap().without_any_tags::<(Selected,)>().unwrap();
    assert_eq!(others.count(&store), 2);
}

#[test]
fn copy_mode_leaves_the_column_untouched() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 3);

    let mut query = store.query::<(Position, Velocity)>().unwrap().copy_component::<Velocity>().unwrap();
    query
        .for_each_chunk(&store, |(positions, velocities), _| {
            for (p, v) in positions.iter_mut().zip(velocities.iter_mut()) {
                p.x += v.x;
                v.x = 100.0;
            }
        })
        .unwrap();
    for (i, &id) in ids.iter().enumerate() {
        assert_eq!(store.component::<Velocity>(id).unwrap().x, 1.0);
        assert_eq!(store.component::<Position>(id).unwrap().x, i as f32 + 1.0);
    }

    let error = store.query::<(Position,)>().unwrap().copy_component::<Velocity>().err();
    assert!(matches!(error, Some(EcsError::Query(QueryError::NotProjected { .. }))));
}

#[test]
fn copy_mode_allows_concurrent_readers() {
    let mut store = store();
    let ids = spawn_movers(&mut store, 2);
    let entity = store.entity(ids[0]).unwrap();
    let reader = entity.get::<Velocity>().unwrap();

    let mut live = store.query::<(Velocity,)>().unwrap();
    assert_eq!(
        live.for_each_chunk(&store, |_, _| {}),
        Err(EcsError::ColumnBorrowed { component: "velocity" })
    );
    let mut copied = store.query::<(Velocity,)>().unwrap().copy_component::<Velocity>().unwrap();
    let mut rows = 0;
    copied.for_each_chunk(&store, |(velocities,), _| rows += velocities.len()).unwrap();
    assert_eq!(rows, 2);
    drop(reader);
}

#[test]
fn invalid_projections_are_rejected() {
    let store = store();
    assert!(matches!(
        store.query::<(Position, Position)>().err(),
        Some(EcsError::Query(QueryError::DuplicateComponent { .. }))
    ));
    assert!(matches!(
        store.query::<(Position, Unregistered)>().err(),
        Some(EcsError::Schema(SchemaError::UnknownType { .. }))
    ));
}

#[test]
fn five_component_projection() {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Mass(f64);
    impl columnar_ecs::Component for Mass {
        const KEY: &'static str = "mass";
    }

    let schema = columnar_ecs::Schema::builder()
        .component::<Position>()
        .component::<Velocity>()
        .component::<Name>()
        .component::<Health>()
        .component::<Mass>()
        .build()
        .unwrap();
    let mut store = columnar_ecs::EntityStore::new(schema);
    let id = store.create_entity().unwrap();
    store.add_component(id, Mass(2.0)).unwrap();
    store.add_component(id, Health(1)).unwrap();
    store.add_component(id, Name("n".into())).unwrap();
    store.add_component(id, Velocity::default()).unwrap();
    store.add_component(id, Position::default()).unwrap();

    let mut query = store.query::<(Position, Velocity, Name, Health, Mass)>().unwrap();
    assert_eq!(query.simd_lane(), 8);
    let mut visited = 0;
    query
        .for_each_entity(&store, |(_, _, name, health, mass), _| {
            assert_eq!(name.0, "n");
            health.0 = (mass.0 * 2.0) as u32;
            visited += 1;
        })
        .unwrap();
    assert_eq!(visited, 1);
    assert_eq!(store.component::<Health>(id).unwrap(), Health(4));
}
