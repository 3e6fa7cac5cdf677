//! Integration tests for the complete MDB pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - MDF parsing → graph resolution → changeset emission → simulated store
//! - Version upgrades against a baseline
//! - Term reconciliation on top of an applied model
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeSet;
use std::sync::Arc;

use mdb_changelog::{
    bootstrap_changeset, emit_changeset, render_changeset, renumber_changelog, to_liquibase_xml,
    verify_ordering, write_changeset, EmitOptions, GraphState, Literal, OutputFormat,
};
use mdb_mdf::{load_model, parse_model, MdfSource, Model, ModelTarget, ModelVersion, ParseOptions};
use mdb_model::{build_graph, ModelGraph, NaturalKey};
use mdb_terms::{
    reconcile_models, CurrentTerms, StaticTermSource, SyncOptions, TermSnapshot, TermSource,
    UnitOutcome,
};
use tempfile::tempdir;

fn fixture_sources() -> Vec<MdfSource> {
    vec![
        MdfSource::new("test-model.yml", include_str!("fixtures/test-model.yml")),
        MdfSource::new("test-model-props.yml", include_str!("fixtures/test-model-props.yml")),
    ]
}

fn fixture_model() -> Model {
    parse_model(
        &fixture_sources(),
        &ModelTarget::new("TEST", "1.2.3"),
        &ParseOptions::default(),
    )
    .unwrap()
}

fn snapshot() -> TermSnapshot {
    serde_json::from_str(include_str!("fixtures/snapshot-TEST.json")).unwrap()
}

// ============================================================================
// MDF → changeset → store
// ============================================================================

#[test]
fn test_fixture_applies_cleanly_after_bootstrap() {
    let graph = build_graph(&fixture_model(), None).unwrap();
    let mut store = GraphState::new();

    let boot = bootstrap_changeset("ci", None);
    assert!(store.apply(&boot).unmatched.is_empty());

    let options = EmitOptions {
        mark_latest_version: true,
        ..Default::default()
    };
    let cs = emit_changeset(&graph, None, &options).unwrap().changeset;
    let report = store.apply(&cs);
    assert!(report.unmatched.is_empty());

    for key in graph.natural_keys() {
        assert!(store.contains(&key), "missing {key}");
    }
    assert_eq!(store.latest_versions("TEST"), vec!["1.2.3".to_string()]);
    assert_eq!(
        store.attr(&NaturalKey::node("TEST", "node_1"), "desc"),
        Some(&Literal::from("First node"))
    );

    let before = store.clone();
    store.apply(&cs);
    store.apply(&boot);
    assert_eq!(store, before);
}

#[test]
fn test_load_model_from_files() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for source in fixture_sources() {
        let path = dir.path().join(&source.name);
        std::fs::write(&path, &source.text).unwrap();
        paths.push(path);
    }
    let model = load_model(&paths, &ModelTarget::default(), &ParseOptions::default()).unwrap();
    assert_eq!(model, fixture_model());
}

#[test]
fn test_changeset_files_in_every_format() {
    let graph = build_graph(&fixture_model(), None).unwrap();
    let cs = emit_changeset(&graph, None, &EmitOptions::default())
        .unwrap()
        .changeset;
    let dir = tempdir().unwrap();

    for format in [OutputFormat::Xml, OutputFormat::Json, OutputFormat::Cypher] {
        let path = dir.path().join(format!("changelog.{}", format.extension()));
        write_changeset(&cs, format, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_changeset(&cs, format).unwrap());
    }
}

// ============================================================================
// Version upgrades
// ============================================================================

fn upgraded() -> Model {
    let mut model = fixture_model();
    model.version = ModelVersion::parse("1.3.0").unwrap();
    if let Some(prop) = model.properties.get_mut("prop_4") {
        prop.desc = Some("When the edge was last confirmed".to_string());
    }
    model
}

#[test]
fn test_upgrade_emits_only_the_delta() {
    let base: ModelGraph = build_graph(&fixture_model(), None).unwrap();
    let next = build_graph(&upgraded(), Some(&base)).unwrap();

    let options = EmitOptions {
        mark_latest_version: true,
        ..Default::default()
    };
    let mut store = GraphState::new();
    store.apply(&emit_changeset(&base, None, &options).unwrap().changeset);

    let emission = emit_changeset(&next, Some(&base), &options).unwrap();
    let cs = &emission.changeset;
    assert_eq!(cs.id, "TEST_1.3.0_incremental");
    assert_eq!(emission.report.changed, vec![NaturalKey::property("TEST", "prop_4")]);
    assert_eq!(emission.report.added.len(), 1);

    let preexisting: BTreeSet<NaturalKey> = base.natural_keys();
    verify_ordering(cs, &preexisting).unwrap();
    assert!(store.apply(cs).unmatched.is_empty());
    assert_eq!(store.latest_versions("TEST"), vec!["1.3.0".to_string()]);
    assert_eq!(
        store.attr(&NaturalKey::property("TEST", "prop_4"), "desc"),
        Some(&Literal::from("When the edge was last confirmed"))
    );
}

#[test]
fn test_concatenated_changelogs_have_unique_ids() {
    let base = build_graph(&fixture_model(), None).unwrap();
    let next = build_graph(&upgraded(), Some(&base)).unwrap();
    let first = emit_changeset(&base, None, &EmitOptions::default()).unwrap().changeset;
    let second = emit_changeset(&next, Some(&base), &EmitOptions::default())
        .unwrap()
        .changeset;

    let a = renumber_changelog(&to_liquibase_xml(&first).unwrap(), 1).unwrap();
    let b = renumber_changelog(&to_liquibase_xml(&second).unwrap(), a.next_id).unwrap();
    assert_eq!(a.next_id as usize, first.len() + 1);
    assert_eq!(b.next_id as usize, first.len() + second.len() + 1);
    assert!(b.xml.contains(&format!("<changeSet id=\"{}\"", a.next_id)));
}

// ============================================================================
// Term reconciliation
// ============================================================================

#[tokio::test]
async fn test_term_sync_extends_applied_model() {
    let graph = build_graph(&fixture_model(), None).unwrap();
    let mut store = GraphState::new();
    store.apply(&emit_changeset(&graph, None, &EmitOptions::default()).unwrap().changeset);

    let current = CurrentTerms::from_graph(&graph);
    assert_eq!(current.terms.len(), 2);

    let source: Arc<dyn TermSource> =
        Arc::new(StaticTermSource::new("NCIt").with_snapshot(snapshot()));
    let reports = reconcile_models(source, vec![current], &SyncOptions::default()).await;
    assert_eq!(reports.len(), 1);

    let UnitOutcome::Emitted { changeset, plan } = &reports[0].outcome else {
        panic!("unit skipped: {:?}", reports[0].outcome);
    };
    assert_eq!(plan.new_terms.len(), 1);
    let present: BTreeSet<NaturalKey> = store.entities.keys().cloned().collect();
    verify_ordering(changeset, &present).unwrap();
    assert!(store.apply(changeset).unmatched.is_empty());

    let term_4 = NaturalKey::Term(mdb_mdf::TermKey::new("NCIt", Some("C0004"), "term_4"));
    assert!(store.contains(&term_4));
    assert_eq!(
        store.attr(&term_4, "origin_definition"),
        Some(&Literal::from("Fourth term."))
    );

    let before = store.clone();
    store.apply(changeset);
    assert_eq!(store, before);
}
