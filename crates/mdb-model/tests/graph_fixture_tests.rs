use mdb_mdf::{parse_model, MdfSource, ModelTarget, ParseOptions, Tag, TermKey};
use mdb_model::{build_graph, EntityKind, NaturalKey};

fn fixture_graph() -> mdb_model::ModelGraph {
    let sources = [
        MdfSource::new("test-model.yml", include_str!("../../../tests/fixtures/test-model.yml")),
        MdfSource::new(
            "test-model-props.yml",
            include_str!("../../../tests/fixtures/test-model-props.yml"),
        ),
    ];
    let model = parse_model(&sources, &ModelTarget::default(), &ParseOptions::default()).unwrap();
    build_graph(&model, None).unwrap()
}

#[test]
fn fixture_resolves_without_dangling_references() {
    let graph = fixture_graph();
    assert_eq!(graph.handle, "TEST");
    assert_eq!(graph.terms.len(), 3);
    assert_eq!(
        graph.properties["prop_2"].enum_terms,
        vec![
            TermKey::new("NCIt", Some("C0002"), "term_2"),
            TermKey::new("NCIt", Some("C0003"), "term_3"),
        ]
    );
    assert_eq!(
        graph.properties["prop_1"].annotations,
        vec![TermKey::new("caDSR", Some("11111"), "Property One")]
    );
}

#[test]
fn fixture_natural_keys_cover_every_entity() {
    let graph = fixture_graph();
    let keys = graph.natural_keys();
    let count = |kind: EntityKind| keys.iter().filter(|k| k.kind() == kind).count();

    assert_eq!(count(EntityKind::Model), 1);
    assert_eq!(count(EntityKind::Node), 3);
    assert_eq!(count(EntityKind::Relationship), 2);
    assert_eq!(count(EntityKind::Property), 4);
    assert_eq!(count(EntityKind::Term), 3);
    assert_eq!(count(EntityKind::ValueSet), 1);
    assert_eq!(count(EntityKind::UniqueKey), 1);
    assert_eq!(count(EntityKind::RelationshipEnd), 3);
    assert_eq!(count(EntityKind::Concept), 1);
    assert_eq!(count(EntityKind::Tag), 3);

    assert!(keys.contains(&NaturalKey::Tag(Tag::new("Category", "study"))));
    assert!(keys.contains(&NaturalKey::UniqueKey {
        model: "TEST".into(),
        node: "node_3".into(),
        props: vec!["prop_3".into()],
    }));
}

#[test]
fn non_strict_enum_accepts_any_value() {
    let graph = fixture_graph();
    // prop_2 is declared `Strict: false`.
    assert_eq!(graph.accepts_value("prop_2", "term_2"), Some(true));
    assert_eq!(graph.accepts_value("prop_2", "anything else"), Some(true));
    assert_eq!(graph.accepts_value("prop_3", "free text"), Some(true));
}
