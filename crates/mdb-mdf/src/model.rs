//! Typed MDF entities.
//!
//! Every collection is a `BTreeMap` keyed by handle so iteration order (and
//! therefore everything emitted downstream) is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::ModelVersion;

pub type Handle = String;

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model {
    pub handle: Handle,
    pub version: ModelVersion,
    /// Repository URI (`URI` section), if declared.
    pub uri: Option<String>,
    pub nodes: BTreeMap<Handle, NodeType>,
    pub relationships: BTreeMap<Handle, RelationshipType>,
    pub properties: BTreeMap<Handle, PropertyDefinition>,
    pub terms: BTreeMap<Handle, Term>,
}

impl Model {
    pub fn entity_count(&self) -> usize {
        self.nodes.len() + self.relationships.len() + self.properties.len() + self.terms.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeType {
    pub handle: Handle,
    pub desc: Option<String>,
    /// Property handles, in declaration order.
    pub props: Vec<Handle>,
    /// Each entry is a set of property handles whose combined value is unique.
    pub unique_keys: Vec<Vec<Handle>>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Multiplicity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_to_one" => Some(Self::OneToOne),
            "one_to_many" => Some(Self::OneToMany),
            "many_to_one" => Some(Self::ManyToOne),
            "many_to_many" => Some(Self::ManyToMany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct End {
    pub src: Handle,
    pub dst: Handle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipType {
    pub handle: Handle,
    pub desc: Option<String>,
    pub props: Vec<Handle>,
    pub required: bool,
    pub multiplicity: Multiplicity,
    pub ends: Vec<End>,
    pub tags: Vec<Tag>,
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Datetime,
    Boolean,
}

impl ValueType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "datetime" => Some(Self::Datetime),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub handle: Handle,
    pub desc: Option<String>,
    pub value_type: Option<ValueType>,
    /// Term handles the property may take, in declaration order.
    pub enum_terms: Vec<Handle>,
    /// `Term:` annotations: terms describing the property itself.
    pub term_annotations: Vec<Handle>,
    pub required: bool,
    pub private: bool,
    pub key: bool,
    pub nullable: bool,
    pub strict: bool,
    pub tags: Vec<Tag>,
}

impl PropertyDefinition {
    pub fn is_enumerated(&self) -> bool {
        !self.enum_terms.is_empty()
    }

    /// `value_set` for enumerated properties, otherwise the primitive type.
    pub fn value_domain(&self) -> &'static str {
        if self.is_enumerated() {
            "value_set"
        } else {
            self.value_type.unwrap_or(ValueType::String).as_str()
        }
    }

    /// The part of the definition that may never change once declared.
    pub fn domain_signature(&self) -> String {
        match (&self.value_type, self.is_enumerated()) {
            (_, true) => format!("Enum [{}]", self.enum_terms.join(", ")),
            (Some(t), false) => format!("Type {}", t.as_str()),
            (None, false) => "no Type or Enum".to_string(),
        }
    }
}

// ============================================================================
// Terms and tags
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Term {
    pub handle: Handle,
    pub value: String,
    pub origin: String,
    pub code: Option<String>,
    pub version: Option<String>,
    pub definition: Option<String>,
    pub tags: Vec<Tag>,
}

impl Term {
    pub fn key(&self) -> TermKey {
        TermKey::new(&self.origin, self.code.as_deref(), &self.value)
    }
}

/// A term's durable identity: `(origin, code)` when the origin assigned a
/// code, otherwise `(origin, value)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermKey {
    pub origin: String,
    pub id: TermId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "by", content = "id", rename_all = "snake_case")]
pub enum TermId {
    Code(String),
    Value(String),
}

impl TermKey {
    pub fn new(origin: &str, code: Option<&str>, value: &str) -> Self {
        let id = match code {
            Some(code) if !code.is_empty() => TermId::Code(code.to_string()),
            _ => TermId::Value(value.to_string()),
        };
        Self {
            origin: origin.to_string(),
            id,
        }
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            TermId::Code(code) => write!(f, "{}|{}", self.origin, code),
            TermId::Value(value) => write!(f, "{}|\"{}\"", self.origin, value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_key_prefers_code() {
        let with_code = TermKey::new("NCIt", Some("C123"), "Yes");
        let without = TermKey::new("NCIt", None, "Yes");
        let empty_code = TermKey::new("NCIt", Some(""), "Yes");
        assert_eq!(with_code.id, TermId::Code("C123".into()));
        assert_eq!(without.id, TermId::Value("Yes".into()));
        assert_eq!(without, empty_code);
        assert_eq!(with_code.to_string(), "NCIt|C123");
    }
}
