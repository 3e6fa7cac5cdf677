//! Mutation operations, change statements and changesets.
//!
//! A [`MutationOp`] is the typed form of one idempotent graph mutation. The
//! [`ChangesetBuilder`] renders each op to Cypher (plus an optional rollback),
//! numbers it, digests it and collects it into a [`Changeset`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use mdb_model::{NaturalKey, UniquenessConstraint};
use serde::{Deserialize, Serialize};

use crate::cypher;
use crate::digest::{changeset_digest, statement_digest};

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Str(String),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Option<&String>> for Literal {
    fn from(s: Option<&String>) -> Self {
        s.map_or(Self::Null, |s| Self::Str(s.clone()))
    }
}

pub type Attributes = Vec<(String, Literal)>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelType {
    HasProperty,
    HasValueSet,
    HasTerm,
    HasConcept,
    Represents,
    HasTag,
    HasUniqueKey,
    HasEnd,
    HasSrc,
    HasDst,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasProperty => "has_property",
            Self::HasValueSet => "has_value_set",
            Self::HasTerm => "has_term",
            Self::HasConcept => "has_concept",
            Self::Represents => "represents",
            Self::HasTag => "has_tag",
            Self::HasUniqueKey => "has_unique_key",
            Self::HasEnd => "has_end",
            Self::HasSrc => "has_src",
            Self::HasDst => "has_dst",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    pub src: NaturalKey,
    pub rel: RelType,
    pub dst: NaturalKey,
}

impl Link {
    pub fn new(src: NaturalKey, rel: RelType, dst: NaturalKey) -> Self {
        Self { src, rel, dst }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub labels: Vec<String>,
    pub properties: Vec<String>,
    pub fulltext: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOp {
    CreateConstraint {
        name: String,
        label: String,
        properties: Vec<String>,
    },
    CreateIndex(IndexSpec),
    /// Install (or replace) a named store trigger running `query`.
    InstallTrigger {
        name: String,
        query: String,
    },
    /// Merge an entity by natural key, then overwrite `set`.
    MergeEntity {
        key: NaturalKey,
        on_create: Attributes,
        set: Attributes,
    },
    /// Merge `merged` entities by key, then merge `links`. Link endpoints that
    /// are not in `merged` must already exist.
    MergeLinks {
        merged: Vec<NaturalKey>,
        links: Vec<Link>,
    },
    MarkLatest {
        handle: String,
        version: String,
    },
    /// Clear the latest flag on every other version of `handle`.
    RevokeLatest {
        handle: String,
        keep_version: String,
    },
}

impl From<UniquenessConstraint> for MutationOp {
    fn from(c: UniquenessConstraint) -> Self {
        Self::CreateConstraint {
            name: c.name,
            label: c.label,
            properties: c.properties,
        }
    }
}

impl MutationOp {
    /// Keys this op brings into existence.
    pub fn defines(&self) -> Vec<&NaturalKey> {
        match self {
            Self::MergeEntity { key, .. } => vec![key],
            Self::MergeLinks { merged, .. } => merged.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Keys this op needs to exist already: link endpoints not merged here,
    /// in first-use order.
    pub fn references(&self) -> Vec<&NaturalKey> {
        match self {
            Self::MergeLinks { merged, links } => {
                let mut seen = BTreeSet::new();
                links
                    .iter()
                    .flat_map(|l| [&l.src, &l.dst])
                    .filter(|k| !merged.contains(*k))
                    .filter(|k| seen.insert(*k))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Statements and changesets
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Constraint,
    Index,
    Term,
    Property,
    Node,
    Relationship,
    Tag,
    Model,
    Synonym,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constraint => "constraint",
            Self::Index => "index",
            Self::Term => "term",
            Self::Property => "property",
            Self::Node => "node",
            Self::Relationship => "relationship",
            Self::Tag => "tag",
            Self::Model => "model",
            Self::Synonym => "synonym",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeStatement {
    pub id: u32,
    pub category: Category,
    pub op: MutationOp,
    pub cypher: String,
    /// `None` when rollbacks were not requested; an empty list is an explicit
    /// no-op rollback.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rollback: Option<Vec<String>>,
    pub digest: String,
}

impl ChangeStatement {
    pub fn is_entity_merge(&self) -> bool {
        matches!(self.op, MutationOp::MergeEntity { .. })
    }

    pub fn merges(&self, key: &NaturalKey) -> bool {
        matches!(&self.op, MutationOp::MergeEntity { key: k, .. } if k == key)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ChangesetKind {
    Full,
    Latest,
    Incremental,
    TermSync,
    Bootstrap,
}

impl ChangesetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Latest => "latest",
            Self::Incremental => "incremental",
            Self::TermSync => "term-sync",
            Self::Bootstrap => "bootstrap",
        }
    }
}

impl fmt::Display for ChangesetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    pub handle: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Changeset {
    pub id: String,
    pub kind: ChangesetKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<ModelRef>,
    pub author: String,
    pub source_commit: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<DateTime<Utc>>,
    pub statements: Vec<ChangeStatement>,
    pub digest: String,
}

impl Changeset {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ChangeStatement> {
        self.statements.iter().filter(move |s| s.category == category)
    }
}

/// `<handle>_<version>_<kind>`, or `mdb_<kind>` for store-wide changesets.
pub fn changeset_id(kind: ChangesetKind, target: Option<&ModelRef>) -> String {
    match target {
        Some(t) => format!("{}_{}_{}", t.handle, t.version, kind),
        None => format!("mdb_{kind}"),
    }
}

pub struct ChangesetBuilder {
    kind: ChangesetKind,
    target: Option<ModelRef>,
    author: String,
    commit: String,
    created_at: Option<DateTime<Utc>>,
    include_rollback: bool,
    statements: Vec<ChangeStatement>,
}

impl ChangesetBuilder {
    pub fn new(
        kind: ChangesetKind,
        target: Option<ModelRef>,
        author: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            target,
            author: author.into(),
            commit: commit.into(),
            created_at: None,
            include_rollback: false,
            statements: Vec::new(),
        }
    }

    pub fn created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_rollback(mut self, include_rollback: bool) -> Self {
        self.include_rollback = include_rollback;
        self
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Render and append `op`; returns its statement id.
    pub fn push(&mut self, category: Category, op: MutationOp) -> u32 {
        let id = self.statements.len() as u32 + 1;
        let text = cypher::render(&op, &self.commit);
        let rollback = self
            .include_rollback
            .then(|| cypher::render_rollback(&op, &self.commit));
        self.statements.push(ChangeStatement {
            id,
            category,
            digest: statement_digest(&text),
            cypher: text,
            rollback,
            op,
        });
        id
    }

    pub fn finish(self) -> Changeset {
        let id = changeset_id(self.kind, self.target.as_ref());
        let digest = changeset_digest(
            &id,
            self.statements.iter().map(|s| (s.id, s.digest.as_str())),
        );
        Changeset {
            id,
            kind: self.kind,
            target: self.target,
            author: self.author,
            source_commit: self.commit,
            created_at: self.created_at,
            statements: self.statements,
            digest,
        }
    }
}
