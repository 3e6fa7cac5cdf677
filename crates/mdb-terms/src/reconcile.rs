//! Additive term/synonym reconciliation.
//!
//! ```text
//!   CurrentTerms ─┐
//!                 ├─ plan_reconciliation ─► ReconcilePlan ─ to_changeset ─► Changeset
//!   TermSnapshot ─┘                            │
//!                                              └─ review: removals, never emitted
//! ```
//!
//! New terms, attribute changes and new synonym links are reconciled
//! automatically. Anything that disappeared from the snapshot only becomes a
//! [`ReviewItem`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use mdb_changelog::{
    term_attrs, Attributes, Category, Changeset, ChangesetBuilder, ChangesetKind, Link, ModelRef,
    MutationOp, RelType, DEFAULT_AUTHOR,
};
use mdb_mdf::{Tag, TermKey};
use mdb_model::NaturalKey;
use serde::Serialize;

use crate::error::ReconcileError;
use crate::retry::RetryPolicy;
use crate::snapshot::{CurrentTerms, TermRecord, TermSnapshot};

pub const MAPPING_SOURCE_TAG: &str = "mapping_source";

/// Synonyms drawn from NCIt are attributed to caDSR mappings; everything
/// else to the NCI Metathesaurus.
pub fn mapping_source_for(synonym: &TermRecord) -> &'static str {
    if synonym.origin == "NCIt" {
        "caDSR"
    } else {
        "NCIm"
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub author: String,
    /// `<model>_<version>` if unset.
    pub source_commit: Option<String>,
    pub include_rollback: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub retry: RetryPolicy,
    /// Units reconciled at once.
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            author: DEFAULT_AUTHOR.to_string(),
            source_commit: None,
            include_rollback: false,
            created_at: None,
            retry: RetryPolicy::default(),
            concurrency: 4,
        }
    }
}

impl SyncOptions {
    pub fn commit_for(&self, model: &str, version: &str) -> String {
        self.source_commit
            .clone()
            .unwrap_or_else(|| format!("{model}_{version}"))
    }
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewTerm {
    pub term: TermRecord,
    /// Property whose value set gains the term.
    pub property: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TermUpdate {
    pub key: TermKey,
    pub set: Attributes,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SynonymLink {
    pub canonical: TermKey,
    pub synonym: TermKey,
    pub mapping_source: String,
}

impl SynonymLink {
    pub fn concept_key(&self) -> NaturalKey {
        NaturalKey::SynonymConcept {
            canonical: self.canonical.clone(),
            mapping_source: self.mapping_source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewItem {
    TermRemoved {
        term: TermKey,
        property: Option<String>,
    },
    SynonymRemoved {
        canonical: TermKey,
        synonym: TermKey,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub model: String,
    pub version: String,
    pub source: String,
    pub new_terms: Vec<NewTerm>,
    pub updated_terms: Vec<TermUpdate>,
    pub new_synonyms: Vec<SynonymLink>,
    pub review: Vec<ReviewItem>,
    pub unchanged: usize,
    /// Keys the store already holds; statements may match on them.
    #[serde(skip)]
    pub existing: BTreeSet<NaturalKey>,
}

impl ReconcilePlan {
    pub fn has_changes(&self) -> bool {
        !(self.new_terms.is_empty() && self.updated_terms.is_empty() && self.new_synonyms.is_empty())
    }
}

struct Planner<'a> {
    known: BTreeMap<TermKey, &'a TermRecord>,
    linked: BTreeSet<(TermKey, TermKey)>,
    seen_terms: BTreeSet<TermKey>,
    seen_links: BTreeSet<(TermKey, TermKey)>,
    planned: BTreeSet<TermKey>,
    plan: ReconcilePlan,
}

impl<'a> Planner<'a> {
    fn term(&mut self, record: &'a TermRecord, property: Option<&String>) {
        let key = record.key();
        self.seen_terms.insert(key.clone());
        if !self.planned.insert(key.clone()) {
            // A term first met as a synonym still joins the value set it is later listed under.
            if let Some(property) = property {
                if let Some(new) = self
                    .plan
                    .new_terms
                    .iter_mut()
                    .find(|n| n.property.is_none() && n.term.key() == key)
                {
                    new.property = Some(property.clone());
                }
            }
            return;
        }
        let Some(existing) = self.known.get(&key).copied() else {
            self.plan.new_terms.push(NewTerm {
                term: record.clone(),
                property: property.cloned(),
            });
            self.known.insert(key, record);
            return;
        };

        // Attributes the snapshot omits are left alone.
        let before = term_attrs(&existing.to_term());
        let set: Attributes = term_attrs(&record.to_term())
            .into_iter()
            .filter(|(name, value)| {
                !value.is_null() && before.iter().find(|(n, _)| n == name).map(|(_, v)| v) != Some(value)
            })
            .collect();
        if set.is_empty() {
            self.plan.unchanged += 1;
        } else {
            self.plan.updated_terms.push(TermUpdate { key, set });
        }
    }

    fn synonym(&mut self, canonical: &TermKey, synonym: &'a TermRecord) {
        self.term(synonym, None);
        let pair = (canonical.clone(), synonym.key());
        if !self.seen_links.insert(pair.clone()) || self.linked.contains(&pair) {
            return;
        }
        self.plan.new_synonyms.push(SynonymLink {
            canonical: pair.0,
            synonym: pair.1,
            mapping_source: mapping_source_for(synonym).to_string(),
        });
    }
}

/// Diff the store's current terms against `snapshot`.
#[tracing::instrument(skip_all, fields(model = %current.model, version = %current.version), err)]
pub fn plan_reconciliation(
    current: &CurrentTerms,
    snapshot: &TermSnapshot,
) -> Result<ReconcilePlan, ReconcileError> {
    if snapshot.model != current.model {
        return Err(ReconcileError::SnapshotMismatch {
            expected: current.model.clone(),
            found: snapshot.model.clone(),
        });
    }

    let mut known = BTreeMap::new();
    let mut linked = BTreeSet::new();
    let mut existing = BTreeSet::new();
    for entry in &current.terms {
        let canonical = entry.term.key();
        known.entry(canonical.clone()).or_insert(&entry.term);
        if let Some(property) = &entry.property {
            existing.insert(NaturalKey::property(&current.model, property));
        }
        for syn in &entry.synonyms {
            known.entry(syn.key()).or_insert(syn);
            linked.insert((canonical.clone(), syn.key()));
        }
    }
    existing.extend(known.keys().cloned().map(NaturalKey::Term));

    let mut planner = Planner {
        known,
        linked,
        seen_terms: BTreeSet::new(),
        seen_links: BTreeSet::new(),
        planned: BTreeSet::new(),
        plan: ReconcilePlan {
            model: current.model.clone(),
            version: current.version.clone(),
            source: snapshot.source.clone(),
            new_terms: Vec::new(),
            updated_terms: Vec::new(),
            new_synonyms: Vec::new(),
            review: Vec::new(),
            unchanged: 0,
            existing,
        },
    };

    for entry in &snapshot.entries {
        planner.term(&entry.term, entry.property.as_ref());
        let canonical = entry.term.key();
        for syn in &entry.synonyms {
            planner.synonym(&canonical, syn);
        }
    }

    let Planner {
        seen_terms,
        seen_links,
        linked,
        mut plan,
        ..
    } = planner;
    for entry in &current.terms {
        let canonical = entry.term.key();
        if !seen_terms.contains(&canonical) {
            plan.review.push(ReviewItem::TermRemoved {
                term: canonical.clone(),
                property: entry.property.clone(),
            });
        }
    }
    for (canonical, synonym) in linked {
        if !seen_links.contains(&(canonical.clone(), synonym.clone())) {
            plan.review.push(ReviewItem::SynonymRemoved { canonical, synonym });
        }
    }

    for item in &plan.review {
        tracing::warn!(model = %plan.model, item = ?item, "removal withheld for review");
    }
    tracing::info!(
        model = %plan.model,
        new_terms = plan.new_terms.len(),
        updated_terms = plan.updated_terms.len(),
        new_synonyms = plan.new_synonyms.len(),
        review = plan.review.len(),
        "reconciliation planned"
    );
    Ok(plan)
}

// ============================================================================
// Changeset
// ============================================================================

/// Terms first, then value-set membership of new terms, then synonym concepts.
pub fn to_changeset(plan: &ReconcilePlan, options: &SyncOptions) -> Changeset {
    let target = ModelRef {
        handle: plan.model.clone(),
        version: plan.version.clone(),
    };
    let mut b = ChangesetBuilder::new(
        ChangesetKind::TermSync,
        Some(target),
        options.author.clone(),
        options.commit_for(&plan.model, &plan.version),
    )
    .created_at(options.created_at)
    .with_rollback(options.include_rollback);

    for new in &plan.new_terms {
        let set = term_attrs(&new.term.to_term())
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect();
        b.push(
            Category::Term,
            MutationOp::MergeEntity {
                key: NaturalKey::Term(new.term.key()),
                on_create: vec![],
                set,
            },
        );
    }
    for update in &plan.updated_terms {
        b.push(
            Category::Term,
            MutationOp::MergeEntity {
                key: NaturalKey::Term(update.key.clone()),
                on_create: vec![],
                set: update.set.clone(),
            },
        );
    }

    for new in &plan.new_terms {
        let Some(property) = &new.property else {
            continue;
        };
        let prop = NaturalKey::property(&plan.model, property);
        let value_set = NaturalKey::value_set(&plan.model, property);
        b.push(
            Category::Property,
            MutationOp::MergeLinks {
                merged: vec![value_set.clone()],
                links: vec![
                    Link::new(prop, RelType::HasValueSet, value_set.clone()),
                    Link::new(value_set, RelType::HasTerm, NaturalKey::Term(new.term.key())),
                ],
            },
        );
    }

    for link in &plan.new_synonyms {
        let concept = link.concept_key();
        let tag = NaturalKey::Tag(Tag::new(MAPPING_SOURCE_TAG, link.mapping_source.clone()));
        b.push(
            Category::Synonym,
            MutationOp::MergeLinks {
                merged: vec![concept.clone(), tag.clone()],
                links: vec![
                    Link::new(NaturalKey::Term(link.canonical.clone()), RelType::Represents, concept.clone()),
                    Link::new(NaturalKey::Term(link.synonym.clone()), RelType::Represents, concept.clone()),
                    Link::new(concept, RelType::HasTag, tag),
                ],
            },
        );
    }
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TermEntry;

    fn record(value: &str, origin: &str, code: &str, definition: &str) -> TermRecord {
        TermRecord {
            value: value.into(),
            origin: origin.into(),
            code: Some(code.into()),
            version: Some("1".into()),
            definition: Some(definition.into()),
        }
    }

    fn entry(term: TermRecord, synonyms: Vec<TermRecord>) -> TermEntry {
        TermEntry {
            term,
            property: Some("p".into()),
            synonyms,
        }
    }

    fn current(entries: Vec<TermEntry>) -> CurrentTerms {
        CurrentTerms {
            model: "M".into(),
            version: "1".into(),
            terms: entries,
        }
    }

    fn snapshot(entries: Vec<TermEntry>) -> TermSnapshot {
        TermSnapshot {
            source: "NCIt".into(),
            model: "M".into(),
            version: "1".into(),
            entries,
        }
    }

    #[test]
    fn mapping_source_follows_synonym_origin() {
        assert_eq!(mapping_source_for(&record("a", "NCIt", "C1", "")), "caDSR");
        assert_eq!(mapping_source_for(&record("a", "UMLS", "C1", "")), "NCIm");
    }

    #[test]
    fn changed_definition_becomes_an_update() {
        let cur = current(vec![entry(record("yes", "NCIt", "C1", "old"), vec![])]);
        let snap = snapshot(vec![entry(record("yes", "NCIt", "C1", "new"), vec![])]);
        let plan = plan_reconciliation(&cur, &snap).unwrap();
        assert!(plan.new_terms.is_empty());
        assert_eq!(plan.updated_terms.len(), 1);
        assert_eq!(
            plan.updated_terms[0].set,
            vec![("origin_definition".to_string(), mdb_changelog::Literal::from("new"))]
        );
    }

    #[test]
    fn omitted_attributes_are_not_cleared() {
        let cur = current(vec![entry(record("yes", "NCIt", "C1", "kept"), vec![])]);
        let mut bare = record("yes", "NCIt", "C1", "");
        bare.definition = None;
        bare.version = None;
        let plan = plan_reconciliation(&cur, &snapshot(vec![entry(bare, vec![])])).unwrap();
        assert!(!plan.has_changes());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn new_synonym_links_through_keyed_concept() {
        let canonical = record("yes", "NCIt", "C1", "d");
        let syn = record("Y", "NCIm", "CL1", "d");
        let cur = current(vec![entry(canonical.clone(), vec![])]);
        let snap = snapshot(vec![entry(canonical, vec![syn])]);
        let plan = plan_reconciliation(&cur, &snap).unwrap();
        assert_eq!(plan.new_terms.len(), 1);
        assert_eq!(plan.new_terms[0].property, None);
        assert_eq!(plan.new_synonyms.len(), 1);
        assert_eq!(plan.new_synonyms[0].mapping_source, "NCIm");

        let cs = to_changeset(&plan, &SyncOptions::default());
        assert_eq!(cs.id, "M_1_term-sync");
        assert_eq!(cs.len(), 2);
        assert_eq!(cs.statements[1].category, Category::Synonym);
        mdb_changelog::verify_ordering(&cs, &plan.existing).unwrap();
    }

    #[test]
    fn synonym_listed_later_as_canonical_joins_value_set() {
        let a = record("a", "NCIt", "C1", "d");
        let b = record("b", "NCIt", "C2", "d");
        let first = TermEntry {
            term: a,
            property: None,
            synonyms: vec![b.clone()],
        };
        let plan = plan_reconciliation(&current(vec![]), &snapshot(vec![first, entry(b, vec![])])).unwrap();
        let planned: Vec<_> = plan
            .new_terms
            .iter()
            .map(|n| (n.term.value.as_str(), n.property.as_deref()))
            .collect();
        assert_eq!(planned, vec![("a", None), ("b", Some("p"))]);

        let cs = to_changeset(&plan, &SyncOptions::default());
        let value_set_links = cs
            .statements
            .iter()
            .filter(|s| s.category == Category::Property)
            .count();
        assert_eq!(value_set_links, 1);
    }

    #[test]
    fn removals_are_only_reviewed() {
        let kept = record("yes", "NCIt", "C1", "d");
        let gone = record("no", "NCIt", "C2", "d");
        let syn = record("Y", "NCIt", "C9", "d");
        let cur = current(vec![entry(kept.clone(), vec![syn]), entry(gone, vec![])]);
        let plan = plan_reconciliation(&cur, &snapshot(vec![entry(kept, vec![])])).unwrap();
        assert!(!plan.has_changes());
        assert_eq!(plan.review.len(), 2);
        assert!(plan
            .review
            .iter()
            .any(|r| matches!(r, ReviewItem::TermRemoved { term, .. } if term.id == mdb_mdf::TermId::Code("C2".into()))));
        assert!(plan
            .review
            .iter()
            .any(|r| matches!(r, ReviewItem::SynonymRemoved { .. })));
        assert!(to_changeset(&plan, &SyncOptions::default()).is_empty());
    }

    #[test]
    fn mismatched_model_is_rejected() {
        let mut snap = snapshot(vec![]);
        snap.model = "OTHER".into();
        assert!(matches!(
            plan_reconciliation(&current(vec![]), &snap),
            Err(ReconcileError::SnapshotMismatch { .. })
        ));
    }
}
