//! Changeset emission.
//!
//! Statements are emitted in dependency order so that every key a statement
//! matches on was merged by an earlier statement (or already exists in the
//! baseline):
//!
//! ```text
//! 0. uniqueness constraints      (full mode only)
//! 1. terms
//! 2. properties   + value set / annotation concept links
//! 3. node types   + property links + unique keys and their constraints
//! 4. relationships + property links + ends
//! 5. tags
//! 6. model version node, then latest-version marking
//! ```
//!
//! With a baseline graph only new or attribute-differing entities, and only
//! new links and tags, produce statements. Entities that disappeared are
//! reported in the [`DiffReport`] and never deleted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use mdb_mdf::{NodeType, RelationshipType, Tag, Term};
use mdb_model::{
    check_baseline, unique_key_constraint, uniqueness_constraints, EntityKind, GraphError,
    ModelGraph, NaturalKey, ResolvedProperty,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::statement::{
    Attributes, Category, Changeset, ChangesetBuilder, ChangesetKind, Link, Literal, ModelRef,
    MutationOp, RelType,
};

pub const DEFAULT_AUTHOR: &str = "DEFAULT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmitOptions {
    pub author: String,
    /// Stamped on created entities as `_commit`; `<handle>_<version>` if unset.
    pub source_commit: Option<String>,
    pub mark_latest_version: bool,
    pub include_rollback: bool,
    pub include_constraints: bool,
    /// Emit terms (and their tags) only.
    pub terms_only: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            author: DEFAULT_AUTHOR.to_string(),
            source_commit: None,
            mark_latest_version: false,
            include_rollback: false,
            include_constraints: true,
            terms_only: false,
            created_at: None,
        }
    }
}

impl EmitOptions {
    pub fn commit_for(&self, handle: &str, version: &str) -> String {
        self.source_commit
            .clone()
            .unwrap_or_else(|| format!("{handle}_{version}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffReport {
    pub added: Vec<NaturalKey>,
    pub changed: Vec<NaturalKey>,
    pub unchanged: Vec<NaturalKey>,
    /// In the baseline but not in the new graph. Never deleted here.
    pub removed: Vec<NaturalKey>,
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone)]
pub struct Emission {
    pub changeset: Changeset,
    pub report: DiffReport,
}

pub fn emit_changeset(
    graph: &ModelGraph,
    baseline: Option<&ModelGraph>,
    options: &EmitOptions,
) -> Result<Emission, EmitError> {
    if let Some(base) = baseline {
        check_baseline(&graph.handle, &graph.version, base)?;
    }

    let kind = match (baseline, options.mark_latest_version) {
        (Some(_), _) => ChangesetKind::Incremental,
        (None, true) => ChangesetKind::Latest,
        (None, false) => ChangesetKind::Full,
    };
    let version = graph.version.to_string();
    let target = ModelRef {
        handle: graph.handle.clone(),
        version: version.clone(),
    };
    let out = ChangesetBuilder::new(
        kind,
        Some(target),
        options.author.clone(),
        options.commit_for(&graph.handle, &version),
    )
    .created_at(options.created_at)
    .with_rollback(options.include_rollback);

    let mut emitter = Emitter {
        graph,
        baseline,
        options,
        out,
        report: DiffReport::default(),
    };
    emitter.run();

    let Emitter { out, mut report, .. } = emitter;
    if let Some(base) = baseline {
        let current = graph.natural_keys();
        report.removed = base
            .natural_keys()
            .into_iter()
            .filter(|k| k.kind() != EntityKind::Model && !current.contains(k))
            .collect();
        for key in &report.removed {
            tracing::warn!(
                model = %graph.handle,
                entity = %key,
                "entity absent from new version; not deleted (pruning is external)"
            );
        }
    }

    let changeset = out.finish();
    tracing::info!(
        changeset = %changeset.id,
        statements = changeset.len(),
        added = report.added.len(),
        changed = report.changed.len(),
        removed = report.removed.len(),
        "changeset emitted"
    );
    Ok(Emission { changeset, report })
}

// ============================================================================
// Entity attributes
// ============================================================================

/// Term attributes as stored. `value` doubles as `origin_id` for terms without a code.
pub fn term_attrs(term: &Term) -> Attributes {
    vec![
        ("value".to_string(), Literal::from(term.value.as_str())),
        ("origin_version".to_string(), Literal::from(term.version.as_ref())),
        ("origin_definition".to_string(), Literal::from(term.definition.as_ref())),
    ]
}

fn property_attrs(prop: &ResolvedProperty) -> Attributes {
    let def = &prop.def;
    vec![
        ("desc".to_string(), Literal::from(def.desc.as_ref())),
        ("value_domain".to_string(), Literal::from(def.value_domain())),
        ("is_required".to_string(), Literal::from(def.required)),
        ("is_key".to_string(), Literal::from(def.key)),
        ("is_nullable".to_string(), Literal::from(def.nullable)),
        ("is_strict".to_string(), Literal::from(def.strict)),
        ("is_private".to_string(), Literal::from(def.private)),
    ]
}

fn node_attrs(node: &NodeType) -> Attributes {
    vec![("desc".to_string(), Literal::from(node.desc.as_ref()))]
}

fn relationship_attrs(rel: &RelationshipType) -> Attributes {
    vec![
        ("desc".to_string(), Literal::from(rel.desc.as_ref())),
        ("multiplicity".to_string(), Literal::from(rel.multiplicity.as_str())),
        ("is_required".to_string(), Literal::from(rel.required)),
    ]
}

fn model_attrs(graph: &ModelGraph) -> Attributes {
    vec![
        ("name".to_string(), Literal::from(graph.handle.as_str())),
        ("repository".to_string(), Literal::from(graph.uri.as_ref())),
    ]
}

/// Attributes to SET: everything non-null for a new entity; for an existing
/// one only values that differ, with `null` clearing a value that went away.
fn settable(attrs: Attributes, old: Option<&Attributes>) -> Attributes {
    match old {
        None => attrs.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        Some(old) => attrs
            .into_iter()
            .filter(|(name, value)| {
                let before = old.iter().find(|(n, _)| n == name).map(|(_, v)| v);
                before.unwrap_or(&Literal::Null) != value
            })
            .collect(),
    }
}

fn new_items<'a, T: PartialEq>(items: &'a [T], old: Option<&[T]>) -> Vec<&'a T> {
    items
        .iter()
        .filter(|i| old.map_or(true, |o| !o.contains(i)))
        .collect()
}

// ============================================================================
// Emitter
// ============================================================================

struct Emitter<'a> {
    graph: &'a ModelGraph,
    baseline: Option<&'a ModelGraph>,
    options: &'a EmitOptions,
    out: ChangesetBuilder,
    report: DiffReport,
}

impl Emitter<'_> {
    fn run(&mut self) {
        if self.baseline.is_none() && self.options.include_constraints {
            self.constraints();
        }
        self.terms();
        if !self.options.terms_only {
            self.properties();
            self.nodes();
            self.relationships();
        }
        self.tags();
        self.model();
    }

    /// Merge an entity if it is new or its attributes changed.
    fn entity(
        &mut self,
        category: Category,
        key: NaturalKey,
        attrs: Attributes,
        old: Option<Attributes>,
        on_create: Attributes,
    ) {
        match &old {
            None => self.report.added.push(key.clone()),
            Some(before) if *before == attrs => {
                self.report.unchanged.push(key);
                return;
            }
            Some(_) => self.report.changed.push(key.clone()),
        }
        let set = settable(attrs, old.as_ref());
        self.out
            .push(category, MutationOp::MergeEntity { key, on_create, set });
    }

    fn links(&mut self, category: Category, merged: Vec<NaturalKey>, links: Vec<Link>) {
        if links.is_empty() {
            return;
        }
        self.out
            .push(category, MutationOp::MergeLinks { merged, links });
    }

    fn constraints(&mut self) {
        for c in uniqueness_constraints() {
            self.out.push(Category::Constraint, c.into());
        }
    }

    fn terms(&mut self) {
        let graph = self.graph;
        for (key, term) in &graph.terms {
            let old = self
                .baseline
                .and_then(|b| b.terms.get(key))
                .map(term_attrs);
            self.entity(
                Category::Term,
                NaturalKey::Term(key.clone()),
                term_attrs(term),
                old,
                vec![],
            );
        }
    }

    fn properties(&mut self) {
        let graph = self.graph;
        for (handle, prop) in &graph.properties {
            let old = self.baseline.and_then(|b| b.properties.get(handle));
            let key = graph.property_key(handle);
            self.entity(
                Category::Property,
                key.clone(),
                property_attrs(prop),
                old.map(property_attrs),
                vec![],
            );

            let added_terms = new_items(&prop.enum_terms, old.map(|o| o.enum_terms.as_slice()));
            if !added_terms.is_empty() {
                let value_set = graph.value_set_key(handle);
                let mut links = vec![Link::new(key.clone(), RelType::HasValueSet, value_set.clone())];
                links.extend(added_terms.into_iter().map(|t| {
                    Link::new(value_set.clone(), RelType::HasTerm, NaturalKey::Term(t.clone()))
                }));
                self.links(Category::Property, vec![value_set], links);
            }

            let added_annotations =
                new_items(&prop.annotations, old.map(|o| o.annotations.as_slice()));
            if !added_annotations.is_empty() {
                let concept = graph.property_concept_key(handle);
                let mut links = vec![Link::new(key.clone(), RelType::HasConcept, concept.clone())];
                links.extend(added_annotations.into_iter().map(|t| {
                    Link::new(NaturalKey::Term(t.clone()), RelType::Represents, concept.clone())
                }));
                self.links(Category::Property, vec![concept], links);
            }
        }
    }

    fn nodes(&mut self) {
        let graph = self.graph;
        for (handle, node) in &graph.nodes {
            let old = self.baseline.and_then(|b| b.nodes.get(handle));
            let key = graph.node_key(handle);
            self.entity(
                Category::Node,
                key.clone(),
                node_attrs(node),
                old.map(node_attrs),
                vec![],
            );

            let props = new_items(&node.props, old.map(|o| o.props.as_slice()))
                .into_iter()
                .map(|p| Link::new(key.clone(), RelType::HasProperty, graph.property_key(p)))
                .collect();
            self.links(Category::Node, vec![], props);

            for props in new_items(&node.unique_keys, old.map(|o| o.unique_keys.as_slice())) {
                let unique = graph.unique_key(handle, props);
                let mut links = vec![Link::new(key.clone(), RelType::HasUniqueKey, unique.clone())];
                links.extend(props.iter().map(|p| {
                    Link::new(unique.clone(), RelType::HasProperty, graph.property_key(p))
                }));
                self.links(Category::Node, vec![unique], links);
                self.out.push(
                    Category::Constraint,
                    unique_key_constraint(&graph.handle, handle, props).into(),
                );
            }
        }
    }

    fn relationships(&mut self) {
        let graph = self.graph;
        for (handle, rel) in &graph.relationships {
            let old = self.baseline.and_then(|b| b.relationships.get(handle));
            let key = graph.relationship_key(handle);
            self.entity(
                Category::Relationship,
                key.clone(),
                relationship_attrs(rel),
                old.map(relationship_attrs),
                vec![],
            );

            let props = new_items(&rel.props, old.map(|o| o.props.as_slice()))
                .into_iter()
                .map(|p| Link::new(key.clone(), RelType::HasProperty, graph.property_key(p)))
                .collect();
            self.links(Category::Relationship, vec![], props);

            for end in new_items(&rel.ends, old.map(|o| o.ends.as_slice())) {
                let end_key = graph.end_key(handle, end);
                let links = vec![
                    Link::new(key.clone(), RelType::HasEnd, end_key.clone()),
                    Link::new(end_key.clone(), RelType::HasSrc, graph.node_key(&end.src)),
                    Link::new(end_key.clone(), RelType::HasDst, graph.node_key(&end.dst)),
                ];
                self.links(Category::Relationship, vec![end_key], links);
            }
        }
    }

    fn tags(&mut self) {
        let old_tags: BTreeMap<NaturalKey, BTreeSet<&Tag>> = self
            .baseline
            .map(|b| {
                b.tagged_entities()
                    .into_iter()
                    .map(|(k, tags)| (k, tags.iter().collect()))
                    .collect()
            })
            .unwrap_or_default();

        let graph = self.graph;
        for (entity, tags) in graph.tagged_entities() {
            if self.options.terms_only && entity.kind() != EntityKind::Term {
                continue;
            }
            let known = old_tags.get(&entity);
            for tag in tags {
                if known.is_some_and(|k| k.contains(&tag)) {
                    continue;
                }
                let tag_key = NaturalKey::Tag(tag.clone());
                self.links(
                    Category::Tag,
                    vec![tag_key.clone()],
                    vec![Link::new(entity.clone(), RelType::HasTag, tag_key)],
                );
            }
        }
    }

    fn model(&mut self) {
        let graph = self.graph;
        let old = self
            .baseline
            .filter(|b| b.version.as_str() == graph.version.as_str())
            .map(model_attrs);
        self.entity(
            Category::Model,
            graph.model_key(),
            model_attrs(graph),
            old,
            vec![("is_latest_version".to_string(), Literal::Bool(false))],
        );

        if self.options.mark_latest_version {
            let version = graph.version.to_string();
            self.out.push(
                Category::Model,
                MutationOp::MarkLatest {
                    handle: graph.handle.clone(),
                    version: version.clone(),
                },
            );
            self.out.push(
                Category::Model,
                MutationOp::RevokeLatest {
                    handle: graph.handle.clone(),
                    keep_version: version,
                },
            );
        }
    }
}
