//! Transform mapping behavior: coalesce/default split, coercion,
//! prerequisite validation.
//!
//! Run with: cargo test --test transform_test

use std::collections::BTreeMap;

use forward_db::sync::kinds::EntityKind;
use forward_db::sync::transform::{
    FieldRule, FieldValue, LookupValue, RelationshipRule, TransformEngine, TransformRuleSet,
    TransformSpec,
};
use serde_json::json;

fn field(source: &str, target: &str, coalesce: bool) -> FieldRule {
    FieldRule {
        source_field: source.to_string(),
        target_field: target.to_string(),
        coalesce,
        template: None,
    }
}

fn device_spec() -> TransformSpec {
    TransformSpec {
        source_model: "device".to_string(),
        fields: vec![field("name", "name", true), field("serial", "serial", false)],
        relationships: vec![],
    }
}

#[test]
fn coalesce_default_split_round_trips() {
    let engine = TransformEngine::new();
    let spec = device_spec();

    let first = engine
        .render(EntityKind::Device, &spec, &json!({"name": "x", "serial": "y"}))
        .unwrap();
    assert_eq!(
        first.lookup.get("name"),
        Some(&LookupValue::Eq(FieldValue::Str("x".into())))
    );
    assert_eq!(first.defaults.get("serial"), Some(&FieldValue::Str("y".into())));
    assert_eq!(first.defaults.len(), 1);

    // Changing only the default field keeps the identity lookup intact.
    let second = engine
        .render(EntityKind::Device, &spec, &json!({"name": "x", "serial": "z"}))
        .unwrap();
    assert_eq!(second.lookup, first.lookup);
    assert_eq!(second.defaults.get("serial"), Some(&FieldValue::Str("z".into())));
}

#[test]
fn templates_and_coercion_compose() {
    let engine = TransformEngine::new();
    let spec = TransformSpec {
        source_model: "interface".to_string(),
        fields: vec![
            FieldRule {
                source_field: "intName".to_string(),
                target_field: "name".to_string(),
                coalesce: true,
                template: None,
            },
            FieldRule {
                source_field: "operStatus".to_string(),
                target_field: "enabled".to_string(),
                coalesce: false,
                template: Some(
                    "{% if object.operStatus == 'UP' %}true{% else %}false{% endif %}".to_string(),
                ),
            },
            FieldRule {
                source_field: "mtu".to_string(),
                target_field: "mtu".to_string(),
                coalesce: false,
                template: None,
            },
        ],
        relationships: vec![],
    };

    let rendered = engine
        .render(
            EntityKind::Interface,
            &spec,
            &json!({"intName": "Ethernet1/1", "operStatus": "UP", "mtu": "9216"}),
        )
        .unwrap();

    assert_eq!(rendered.defaults.get("enabled"), Some(&FieldValue::Bool(true)));
    assert_eq!(rendered.defaults.get("mtu"), Some(&FieldValue::Int(9216)));
}

#[test]
fn relationship_refs_fold_into_lookup_and_defaults() {
    let engine = TransformEngine::new();
    let spec = TransformSpec {
        source_model: "device".to_string(),
        fields: vec![field("name", "name", true)],
        relationships: vec![
            RelationshipRule {
                source_kind: EntityKind::Site,
                target_field: "site_id".to_string(),
                coalesce: false,
                template: "{{ object.siteName }}".to_string(),
            },
            RelationshipRule {
                source_kind: EntityKind::Location,
                target_field: "location_id".to_string(),
                coalesce: false,
                template: "none".to_string(),
            },
        ],
    };

    let mut rendered = engine
        .render(
            EntityKind::Device,
            &spec,
            &json!({"name": "core-sw-01", "siteName": "fra1"}),
        )
        .unwrap();
    assert_eq!(rendered.relationships.len(), 2);
    assert_eq!(rendered.relationships[0].reference, Some(json!("fra1")));
    assert_eq!(rendered.relationships[1].reference, None);

    // Simulate resolution: the site resolves, the location is null.
    let site = uuid::Uuid::new_v4();
    rendered.set_relation("site_id", false, Some(site));
    rendered.set_relation("location_id", false, None);
    assert_eq!(rendered.relation_id("site_id"), Some(site));
    assert_eq!(rendered.defaults.get("location_id"), Some(&FieldValue::Null));
}

#[test]
fn validation_gate_names_missing_prerequisites() {
    let mut specs = BTreeMap::new();
    specs.insert(EntityKind::Interface, device_spec());
    specs.insert(EntityKind::Device, device_spec());
    specs.insert(EntityKind::DeviceType, device_spec());
    let rules = TransformRuleSet::from_specs(specs);

    let enabled = [
        EntityKind::DeviceType,
        EntityKind::Device,
        EntityKind::Interface,
    ];
    let missing = rules.missing_prerequisites(&enabled);
    assert_eq!(
        missing,
        vec![EntityKind::Manufacturer, EntityKind::DeviceRole]
    );

    // Full coverage validates cleanly.
    let mut full = BTreeMap::new();
    for kind in EntityKind::NQE_SEQUENCE {
        full.insert(kind, device_spec());
    }
    let rules = TransformRuleSet::from_specs(full);
    assert!(rules.missing_prerequisites(&EntityKind::NQE_SEQUENCE).is_empty());
}

#[test]
fn ingestion_sequence_orders_dependencies_first() {
    let sequence = EntityKind::NQE_SEQUENCE;
    let index = |kind| sequence.iter().position(|k| *k == kind).unwrap();
    assert!(index(EntityKind::Manufacturer) < index(EntityKind::DeviceType));
    assert!(index(EntityKind::DeviceType) < index(EntityKind::Device));
    assert!(index(EntityKind::Device) < index(EntityKind::Interface));
}
