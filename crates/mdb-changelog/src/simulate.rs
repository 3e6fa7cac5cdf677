//! Structural interpretation of changesets.
//!
//! [`GraphState`] applies statements to an in-memory graph keyed by natural
//! key, following the same MATCH/MERGE semantics the store uses. It backs the
//! idempotence checks: applying a changeset twice must leave the state the
//! first application produced.

use std::collections::{BTreeMap, BTreeSet};

use mdb_model::NaturalKey;
use thiserror::Error;

use crate::statement::{Changeset, Link, Literal, MutationOp};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphState {
    pub entities: BTreeMap<NaturalKey, BTreeMap<String, Literal>>,
    pub links: BTreeSet<Link>,
    /// Names of constraints, indexes and triggers.
    pub schema: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Statements whose MATCH found nothing and so changed nothing.
    pub unmatched: Vec<u32>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state in which `keys` already exist (e.g. a previously applied version).
    pub fn seeded(keys: impl IntoIterator<Item = NaturalKey>) -> Self {
        let mut state = Self::new();
        for key in keys {
            state.entities.insert(key.clone(), identity_attrs(&key));
        }
        state
    }

    pub fn contains(&self, key: &NaturalKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn attr(&self, key: &NaturalKey, name: &str) -> Option<&Literal> {
        self.entities.get(key).and_then(|attrs| attrs.get(name))
    }

    /// Versions of `handle` currently flagged as latest.
    pub fn latest_versions(&self, handle: &str) -> Vec<String> {
        self.entities
            .iter()
            .filter_map(|(key, attrs)| match key {
                NaturalKey::Model { handle: h, version }
                    if h == handle
                        && attrs.get("is_latest_version") == Some(&Literal::Bool(true)) =>
                {
                    Some(version.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn apply(&mut self, changeset: &Changeset) -> ApplyReport {
        let mut report = ApplyReport::default();
        for stmt in &changeset.statements {
            if self.apply_op(&stmt.op, &changeset.source_commit) {
                report.applied += 1;
            } else {
                report.unmatched.push(stmt.id);
            }
        }
        report
    }

    /// Apply one op; `false` if its MATCH clause found nothing.
    pub fn apply_op(&mut self, op: &MutationOp, commit: &str) -> bool {
        match op {
            MutationOp::CreateConstraint { name, .. }
            | MutationOp::InstallTrigger { name, .. } => {
                self.schema.insert(name.clone());
                true
            }
            MutationOp::CreateIndex(spec) => {
                self.schema.insert(spec.name.clone());
                true
            }
            MutationOp::MergeEntity { key, on_create, set } => {
                let attrs = self.merge(key, commit);
                if attrs.get("_created").is_some() {
                    attrs.remove("_created");
                    attrs.extend(on_create.iter().cloned());
                }
                for (name, value) in set {
                    match value {
                        Literal::Null => attrs.remove(name),
                        v => attrs.insert(name.clone(), v.clone()),
                    };
                }
                true
            }
            MutationOp::MergeLinks { merged, links } => {
                if !op.references().iter().all(|k| self.contains(k)) {
                    return false;
                }
                for key in merged {
                    self.merge(key, commit).remove("_created");
                }
                self.links.extend(links.iter().cloned());
                true
            }
            MutationOp::MarkLatest { handle, version } => {
                let key = NaturalKey::Model {
                    handle: handle.clone(),
                    version: version.clone(),
                };
                match self.entities.get_mut(&key) {
                    Some(attrs) => {
                        attrs.insert("is_latest_version".into(), Literal::Bool(true));
                        true
                    }
                    None => false,
                }
            }
            MutationOp::RevokeLatest {
                handle,
                keep_version,
            } => {
                for (key, attrs) in self.entities.iter_mut() {
                    let NaturalKey::Model { handle: h, version } = key else {
                        continue;
                    };
                    if h == handle
                        && version != keep_version
                        && attrs.get("is_latest_version") == Some(&Literal::Bool(true))
                    {
                        attrs.insert("is_latest_version".into(), Literal::Bool(false));
                    }
                }
                true
            }
        }
    }

    /// MERGE by key. A freshly created entity is marked `_created` until the
    /// caller has applied its ON CREATE attributes.
    fn merge(&mut self, key: &NaturalKey, commit: &str) -> &mut BTreeMap<String, Literal> {
        self.entities.entry(key.clone()).or_insert_with(|| {
            let mut attrs = identity_attrs(key);
            attrs.insert("_commit".into(), Literal::Str(commit.to_string()));
            attrs.insert("_created".into(), Literal::Bool(true));
            attrs
        })
    }
}

fn identity_attrs(key: &NaturalKey) -> BTreeMap<String, Literal> {
    key.fields()
        .into_iter()
        .map(|(name, value)| (name.to_string(), Literal::Str(value)))
        .collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("statement {statement} references {key} before any statement merges it")]
pub struct OrderingViolation {
    pub statement: u32,
    pub key: NaturalKey,
}

/// Check that every key a statement matches on is merged by an earlier
/// statement or is in `preexisting`.
pub fn verify_ordering(
    changeset: &Changeset,
    preexisting: &BTreeSet<NaturalKey>,
) -> Result<(), OrderingViolation> {
    let mut defined: BTreeSet<&NaturalKey> = preexisting.iter().collect();
    for stmt in &changeset.statements {
        let latest_key;
        let mut needed = stmt.op.references();
        if let MutationOp::MarkLatest { handle, version } = &stmt.op {
            latest_key = NaturalKey::Model {
                handle: handle.clone(),
                version: version.clone(),
            };
            needed.push(&latest_key);
        }
        if let Some(missing) = needed.into_iter().find(|k| !defined.contains(k)) {
            return Err(OrderingViolation {
                statement: stmt.id,
                key: missing.clone(),
            });
        }
        defined.extend(stmt.op.defines());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Category, ChangesetBuilder, ChangesetKind, RelType};
    use mdb_mdf::Tag;

    fn node(h: &str) -> NaturalKey {
        NaturalKey::node("M", h)
    }

    fn tagged(first_tag_then_node: bool) -> Changeset {
        let mut b = ChangesetBuilder::new(ChangesetKind::Full, None, "me", "c");
        let merge_node = MutationOp::MergeEntity {
            key: node("a"),
            on_create: vec![],
            set: vec![("desc".into(), Literal::from("A"))],
        };
        let tag = NaturalKey::Tag(Tag::new("k", "v"));
        let attach = MutationOp::MergeLinks {
            merged: vec![tag.clone()],
            links: vec![Link::new(node("a"), RelType::HasTag, tag)],
        };
        if first_tag_then_node {
            b.push(Category::Tag, attach);
            b.push(Category::Node, merge_node);
        } else {
            b.push(Category::Node, merge_node);
            b.push(Category::Tag, attach);
        }
        b.finish()
    }

    #[test]
    fn double_application_is_stable() {
        let cs = tagged(false);
        let mut state = GraphState::new();
        assert!(state.apply(&cs).unmatched.is_empty());
        let once = state.clone();
        state.apply(&cs);
        assert_eq!(state, once);
        assert_eq!(state.entities.len(), 2);
        assert_eq!(state.links.len(), 1);
        assert_eq!(state.attr(&node("a"), "_commit"), Some(&Literal::from("c")));
        assert!(state.attr(&node("a"), "_created").is_none());
    }

    #[test]
    fn unmatched_link_changes_nothing() {
        let cs = tagged(true);
        let mut state = GraphState::new();
        let report = state.apply(&cs);
        assert_eq!(report.unmatched, vec![1]);
        assert!(state.links.is_empty());
    }

    #[test]
    fn ordering_check_finds_forward_reference() {
        assert!(verify_ordering(&tagged(false), &BTreeSet::new()).is_ok());
        let err = verify_ordering(&tagged(true), &BTreeSet::new()).unwrap_err();
        assert_eq!(err.statement, 1);
        assert_eq!(err.key, node("a"));

        let pre: BTreeSet<_> = [node("a")].into_iter().collect();
        assert!(verify_ordering(&tagged(true), &pre).is_ok());
    }

    #[test]
    fn latest_flag_moves_between_versions() {
        let mut state = GraphState::new();
        for v in ["1.0.0", "1.1.0"] {
            let key = NaturalKey::Model { handle: "M".into(), version: v.into() };
            state.apply_op(
                &MutationOp::MergeEntity {
                    key,
                    on_create: vec![("is_latest_version".into(), Literal::Bool(false))],
                    set: vec![],
                },
                "c",
            );
            state.apply_op(&MutationOp::MarkLatest { handle: "M".into(), version: v.into() }, "c");
            state.apply_op(
                &MutationOp::RevokeLatest { handle: "M".into(), keep_version: v.into() },
                "c",
            );
        }
        assert_eq!(state.latest_versions("M"), vec!["1.1.0".to_string()]);
    }
}
