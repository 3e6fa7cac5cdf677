//! Natural keys and uniqueness constraints.
//!
//! Store entities carry a surrogate `nanoid` assigned by the store itself, so
//! nothing emitted here may depend on it. Every statement instead matches or
//! merges on the natural key defined below:
//!
//! | kind               | label              | key properties                          |
//! |--------------------|--------------------|-----------------------------------------|
//! | model              | `model`            | handle, version                         |
//! | node type          | `node`             | model, handle                           |
//! | relationship type  | `relationship`     | model, handle                           |
//! | property           | `property`         | model, handle                           |
//! | term               | `term`             | origin_name, origin_id (code or value)  |
//! | tag                | `tag`              | key, value                              |
//! | value set          | `value_set`        | model, handle (the property handle)     |
//! | unique key         | `unique_key`       | model, node, props                      |
//! | relationship end   | `relationship_end` | model, relationship, src, dst           |
//! | property concept   | `concept`          | model, property                         |
//! | synonym concept    | `concept`          | canonical_term, mapping_source          |

use std::fmt;

use mdb_mdf::{Tag, TermId, TermKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Model,
    Node,
    Relationship,
    Property,
    Term,
    Tag,
    ValueSet,
    UniqueKey,
    RelationshipEnd,
    Concept,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Node => "node",
            Self::Relationship => "relationship",
            Self::Property => "property",
            Self::Term => "term",
            Self::Tag => "tag",
            Self::ValueSet => "value_set",
            Self::UniqueKey => "unique_key",
            Self::RelationshipEnd => "relationship_end",
            Self::Concept => "concept",
        }
    }
}

/// Separator used when a list of handles is stored as one key property.
pub const PROPS_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    Model {
        handle: String,
        version: String,
    },
    Node {
        model: String,
        handle: String,
    },
    Relationship {
        model: String,
        handle: String,
    },
    Property {
        model: String,
        handle: String,
    },
    Term(TermKey),
    Tag(Tag),
    ValueSet {
        model: String,
        property: String,
    },
    UniqueKey {
        model: String,
        node: String,
        props: Vec<String>,
    },
    RelationshipEnd {
        model: String,
        relationship: String,
        src: String,
        dst: String,
    },
    PropertyConcept {
        model: String,
        property: String,
    },
    SynonymConcept {
        canonical: TermKey,
        mapping_source: String,
    },
}

impl NaturalKey {
    pub fn node(model: &str, handle: &str) -> Self {
        Self::Node {
            model: model.to_string(),
            handle: handle.to_string(),
        }
    }

    pub fn relationship(model: &str, handle: &str) -> Self {
        Self::Relationship {
            model: model.to_string(),
            handle: handle.to_string(),
        }
    }

    pub fn property(model: &str, handle: &str) -> Self {
        Self::Property {
            model: model.to_string(),
            handle: handle.to_string(),
        }
    }

    pub fn value_set(model: &str, property: &str) -> Self {
        Self::ValueSet {
            model: model.to_string(),
            property: property.to_string(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Model { .. } => EntityKind::Model,
            Self::Node { .. } => EntityKind::Node,
            Self::Relationship { .. } => EntityKind::Relationship,
            Self::Property { .. } => EntityKind::Property,
            Self::Term(_) => EntityKind::Term,
            Self::Tag(_) => EntityKind::Tag,
            Self::ValueSet { .. } => EntityKind::ValueSet,
            Self::UniqueKey { .. } => EntityKind::UniqueKey,
            Self::RelationshipEnd { .. } => EntityKind::RelationshipEnd,
            Self::PropertyConcept { .. } | Self::SynonymConcept { .. } => EntityKind::Concept,
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind().label()
    }

    /// Key properties as stored on the entity, in a fixed order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Model { handle, version } => {
                vec![("handle", handle.clone()), ("version", version.clone())]
            }
            Self::Node { model, handle }
            | Self::Relationship { model, handle }
            | Self::Property { model, handle } => {
                vec![("model", model.clone()), ("handle", handle.clone())]
            }
            Self::Term(key) => term_fields(key),
            Self::Tag(tag) => vec![("key", tag.key.clone()), ("value", tag.value.clone())],
            Self::ValueSet { model, property } => {
                vec![("model", model.clone()), ("handle", property.clone())]
            }
            Self::UniqueKey { model, node, props } => vec![
                ("model", model.clone()),
                ("node", node.clone()),
                ("props", props.join(PROPS_SEPARATOR)),
            ],
            Self::RelationshipEnd {
                model,
                relationship,
                src,
                dst,
            } => vec![
                ("model", model.clone()),
                ("relationship", relationship.clone()),
                ("src", src.clone()),
                ("dst", dst.clone()),
            ],
            Self::PropertyConcept { model, property } => {
                vec![("model", model.clone()), ("property", property.clone())]
            }
            Self::SynonymConcept {
                canonical,
                mapping_source,
            } => vec![
                ("canonical_term", canonical.to_string()),
                ("mapping_source", mapping_source.clone()),
            ],
        }
    }
}

/// Terms without a code are stored with their value as `origin_id`, so every
/// term merges on the same constrained pair.
fn term_fields(key: &TermKey) -> Vec<(&'static str, String)> {
    let id = match &key.id {
        TermId::Code(code) => code.clone(),
        TermId::Value(value) => value.clone(),
    };
    vec![("origin_name", key.origin.clone()), ("origin_id", id)]
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.label())?;
        for (i, (name, value)) in self.fields().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value:?}")?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Uniqueness constraints
// ============================================================================

/// A declarative uniqueness constraint over one label's properties.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UniquenessConstraint {
    pub name: String,
    pub label: String,
    pub properties: Vec<String>,
}

impl UniquenessConstraint {
    fn new(kind: EntityKind, properties: &[&str]) -> Self {
        Self {
            name: format!("{}_natural_key", kind.label()),
            label: kind.label().to_string(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn name_part(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The constraint a node's `UniqueKeys` entry declares over its instances:
/// instances labeled `node` are unique on `model` plus exactly `props`.
pub fn unique_key_constraint(model: &str, node: &str, props: &[String]) -> UniquenessConstraint {
    let mut name = format!("{}_{}", name_part(model), name_part(node));
    for prop in props {
        name.push('_');
        name.push_str(&name_part(prop));
    }
    name.push_str("_unique");

    let mut properties = Vec::with_capacity(props.len() + 1);
    properties.push("model".to_string());
    properties.extend(props.iter().cloned());
    UniquenessConstraint {
        name,
        label: node.to_string(),
        properties,
    }
}

/// One constraint per keyed entity kind.
///
/// Terms are constrained on `(origin_name, origin_id)` only: several terms of
/// one origin legitimately share a value under different codes. Concepts have
/// two key shapes and are left unconstrained.
pub fn uniqueness_constraints() -> Vec<UniquenessConstraint> {
    vec![
        UniquenessConstraint::new(EntityKind::Model, &["handle", "version"]),
        UniquenessConstraint::new(EntityKind::Node, &["model", "handle"]),
        UniquenessConstraint::new(EntityKind::Relationship, &["model", "handle"]),
        UniquenessConstraint::new(EntityKind::Property, &["model", "handle"]),
        UniquenessConstraint::new(EntityKind::Term, &["origin_name", "origin_id"]),
        UniquenessConstraint::new(EntityKind::Tag, &["key", "value"]),
        UniquenessConstraint::new(EntityKind::ValueSet, &["model", "handle"]),
        UniquenessConstraint::new(EntityKind::UniqueKey, &["model", "node", "props"]),
        UniquenessConstraint::new(
            EntityKind::RelationshipEnd,
            &["model", "relationship", "src", "dst"],
        ),
    ]
}
