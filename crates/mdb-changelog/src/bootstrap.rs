//! Store-wide schema changeset, applied once before any model changelog.

use chrono::{DateTime, Utc};
use mdb_model::{uniqueness_constraints, EntityKind};

use crate::statement::{Category, Changeset, ChangesetBuilder, ChangesetKind, IndexSpec, MutationOp};

pub const BOOTSTRAP_COMMIT: &str = "bootstrap";

const NANOID_TRIGGER_QUERY: &str = "UNWIND $createdNodes AS n WITH n WHERE n.nanoid IS NULL \
     SET n.nanoid = apoc.text.random(6, \"A-Za-z0-9\")";

const LABELED_KINDS: [EntityKind; 10] = [
    EntityKind::Model,
    EntityKind::Node,
    EntityKind::Relationship,
    EntityKind::Property,
    EntityKind::Term,
    EntityKind::Tag,
    EntityKind::ValueSet,
    EntityKind::UniqueKey,
    EntityKind::RelationshipEnd,
    EntityKind::Concept,
];

/// Nanoid range indexes, fulltext search indexes, natural-key uniqueness
/// constraints and the nanoid assignment trigger.
pub fn bootstrap_changeset(author: &str, created_at: Option<DateTime<Utc>>) -> Changeset {
    let mut b = ChangesetBuilder::new(ChangesetKind::Bootstrap, None, author, BOOTSTRAP_COMMIT)
        .created_at(created_at);

    for kind in LABELED_KINDS {
        b.push(
            Category::Index,
            MutationOp::CreateIndex(IndexSpec {
                name: format!("{}_nanoid", kind.label()),
                labels: vec![kind.label().to_string()],
                properties: vec!["nanoid".to_string()],
                fulltext: false,
            }),
        );
    }
    b.push(
        Category::Index,
        MutationOp::CreateIndex(IndexSpec {
            name: "term_text".to_string(),
            labels: vec![EntityKind::Term.label().to_string()],
            properties: vec!["value".to_string(), "origin_definition".to_string()],
            fulltext: true,
        }),
    );
    b.push(
        Category::Index,
        MutationOp::CreateIndex(IndexSpec {
            name: "entity_handles".to_string(),
            labels: [EntityKind::Node, EntityKind::Relationship, EntityKind::Property]
                .iter()
                .map(|k| k.label().to_string())
                .collect(),
            properties: vec!["handle".to_string()],
            fulltext: true,
        }),
    );

    for c in uniqueness_constraints() {
        b.push(Category::Constraint, c.into());
    }

    b.push(
        Category::Index,
        MutationOp::InstallTrigger {
            name: "nanoid".to_string(),
            query: NANOID_TRIGGER_QUERY.to_string(),
        },
    );
    b.finish()
}
