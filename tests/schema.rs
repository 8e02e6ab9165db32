mod common;

use std::any::TypeId;

use columnar_ecs::{Schema, SchemaBuilder, SchemaError, TypeKind, DISABLED_TAG};
use common::*;

#[test]
fn indices_are_dense_and_start_at_one() {
    let schema = schema();
    assert_eq!(schema.component_index::<Position>(), Ok(1));
    assert_eq!(schema.component_index::<Velocity>(), Ok(2));
    assert_eq!(schema.tag_index::<columnar_ecs::Disabled>(), Ok(DISABLED_TAG));
    assert_eq!(schema.tag_index::<Frozen>(), Ok(2));
    assert_eq!(schema.script_index::<Wander>(), Ok(1));
    assert_eq!(schema.component_count(), 4);
    assert_eq!(schema.tag_count(), 3);
    assert!(schema.component(0).is_none());
}

#[test]
fn descriptors_carry_type_metadata() {
    let schema = schema();
    let position = schema.component_type::<Position>().unwrap();
    assert_eq!(position.key, "position");
    assert_eq!(position.size, 12);
    assert_eq!(position.simd_multiple, 2);
    assert!(position.blittable);
    assert_eq!(position.type_id, TypeId::of::<Position>());

    let name = schema.component_by_key("name").unwrap();
    assert!(!name.blittable);
    assert_eq!(schema.component_type::<Health>().unwrap().simd_multiple, 8);
    assert_eq!(schema.component_by_key("velocity").unwrap().symbol, Some("v"));
    assert_eq!(schema.tag_by_type_id(TypeId::of::<Selected>()).unwrap().key, "selected");
}

#[test]
fn registering_twice_returns_the_same_index() {
    let mut builder = SchemaBuilder::new();
    let first = builder.register_component::<Position>().unwrap();
    let second = builder.register_component::<Position>().unwrap();
    assert_eq!(first, second);
    assert_eq!(builder.build().unwrap().component_count(), 1);
}

#[test]
fn duplicate_key_fails_the_build() {
    let result = Schema::builder().component::<Position>().component::<Impostor>().build();
    match result {
        Err(SchemaError::DuplicateKey { kind, key, .. }) => {
            assert_eq!(kind, TypeKind::Component);
            assert_eq!(key, "position");
        }
        other => panic!("expected duplicate key, got {other:?}"),
    }
}

#[test]
fn unknown_type_is_reported() {
    let schema = schema();
    assert!(matches!(
        schema.component_index::<Unregistered>(),
        Err(SchemaError::UnknownType { kind: TypeKind::Component, .. })
    ));
}

#[test]
fn bitset_builders() {
    let schema = schema();
    let bits = schema.components_of::<(Position, Health)>().unwrap();
    assert_eq!(bits.iter().collect::<Vec<_>>(), vec![1, 4]);
    let tags = schema.tags_of::<(Selected,)>().unwrap();
    assert_eq!(tags.iter().collect::<Vec<_>>(), vec![3]);
    assert!(schema.components_of::<(Position, Unregistered)>().is_err());
}
