//! Single-document MDF parsing.
//!
//! Each section entry is read field by field from the YAML tree so that a bad
//! value is reported against the exact entity and field that carried it.
//! Unknown sections and unknown fields are rejected.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::{MdfError, SchemaError};
use crate::model::{
    End, Handle, Multiplicity, NodeType, PropertyDefinition, RelationshipType, Tag, Term,
    ValueType,
};

pub const SECTIONS: &[&str] = &[
    "Handle",
    "Version",
    "URI",
    "Nodes",
    "Relationships",
    "PropDefinitions",
    "Terms",
];

const NODE_FIELDS: &[&str] = &["Props", "UniqueKeys", "Tags", "Desc"];
const RELATIONSHIP_FIELDS: &[&str] = &["Props", "Req", "Mul", "Ends", "Tags", "Desc"];
const END_FIELDS: &[&str] = &["Src", "Dst"];
const PROPERTY_FIELDS: &[&str] = &[
    "Desc", "Type", "Enum", "Req", "Private", "Key", "Nul", "Strict", "Term", "Tags",
];
const TERM_FIELDS: &[&str] = &["Value", "Origin", "Code", "Version", "Definition", "Tags"];

/// Raw MDF text plus a name used in diagnostics (usually the file path).
#[derive(Debug, Clone)]
pub struct MdfSource {
    pub name: String,
    pub text: String,
}

impl MdfSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, MdfError> {
        let text = std::fs::read_to_string(path).map_err(|source| MdfError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path.display().to_string(), text))
    }
}

/// One parsed MDF file. Files after the first often carry only some sections.
#[derive(Debug, Clone, Default)]
pub struct MdfDocument {
    pub source: String,
    pub handle: Option<String>,
    pub version: Option<String>,
    pub uri: Option<String>,
    pub nodes: Vec<NodeType>,
    pub relationships: Vec<RelationshipType>,
    pub properties: Vec<PropertyDefinition>,
    pub terms: Vec<Term>,
}

pub fn parse_document(source: &MdfSource) -> Result<MdfDocument, SchemaError> {
    let root: Value = serde_yaml::from_str(&source.text)
        .map_err(|e| SchemaError::new(&source.name, "(document)", e.to_string()))?;
    let top = Fields::new(source.name.clone(), &root, SECTIONS).map_err(|mut e| {
        if e.message == "unknown field" {
            e.message = "unknown top-level section".to_string();
        }
        e
    })?;

    let mut doc = MdfDocument {
        source: source.name.clone(),
        handle: top.text("Handle")?,
        version: top.version_text("Version")?,
        uri: top.text("URI")?,
        ..Default::default()
    };

    for (handle, entry) in top.section("Nodes")? {
        doc.nodes.push(parse_node(handle, entry)?);
    }
    for (handle, entry) in top.section("Relationships")? {
        doc.relationships.push(parse_relationship(handle, entry)?);
    }
    for (handle, entry) in top.section("PropDefinitions")? {
        doc.properties.push(parse_property(handle, entry)?);
    }
    for (handle, entry) in top.section("Terms")? {
        doc.terms.push(parse_term(handle, entry)?);
    }

    tracing::debug!(
        source = %doc.source,
        nodes = doc.nodes.len(),
        relationships = doc.relationships.len(),
        properties = doc.properties.len(),
        terms = doc.terms.len(),
        "parsed MDF document"
    );
    Ok(doc)
}

// ============================================================================
// Entries
// ============================================================================

fn parse_node(handle: Handle, entry: &Value) -> Result<NodeType, SchemaError> {
    let f = Fields::new(format!("Nodes.{handle}"), entry, NODE_FIELDS)?;
    let unique_keys = f.handle_sets("UniqueKeys")?;
    if let Some(empty) = unique_keys.iter().position(|set| set.is_empty()) {
        return Err(f.error("UniqueKeys", format!("entry {empty} is empty")));
    }
    Ok(NodeType {
        desc: f.text("Desc")?,
        props: f.handles("Props")?,
        unique_keys,
        tags: f.tags()?,
        handle,
    })
}

fn parse_relationship(handle: Handle, entry: &Value) -> Result<RelationshipType, SchemaError> {
    let f = Fields::new(format!("Relationships.{handle}"), entry, RELATIONSHIP_FIELDS)?;

    let mul = f.required_text("Mul")?;
    let multiplicity = Multiplicity::parse(&mul).ok_or_else(|| {
        f.error(
            "Mul",
            format!("`{mul}` is not one of one_to_one, one_to_many, many_to_one, many_to_many"),
        )
    })?;

    let mut ends = Vec::new();
    for (i, end) in f.sequence("Ends")?.iter().enumerate() {
        let e = Fields::new(format!("Relationships.{handle}.Ends[{i}]"), end, END_FIELDS)?;
        ends.push(End {
            src: e.required_text("Src")?,
            dst: e.required_text("Dst")?,
        });
    }
    if ends.is_empty() {
        return Err(f.error("Ends", "a relationship needs at least one Src/Dst pair"));
    }

    Ok(RelationshipType {
        desc: f.text("Desc")?,
        props: f.handles("Props")?,
        required: f.flag("Req", false)?,
        multiplicity,
        ends,
        tags: f.tags()?,
        handle,
    })
}

fn parse_property(handle: Handle, entry: &Value) -> Result<PropertyDefinition, SchemaError> {
    let f = Fields::new(format!("PropDefinitions.{handle}"), entry, PROPERTY_FIELDS)?;

    let value_type = match f.text("Type")? {
        None => None,
        Some(name) => Some(ValueType::parse(&name).ok_or_else(|| {
            f.error(
                "Type",
                format!("`{name}` is not a primitive type (string, integer, number, datetime, boolean)"),
            )
        })?),
    };
    let enum_terms = f.handles("Enum")?;
    if value_type.is_none() && enum_terms.is_empty() {
        return Err(f.error("Type", "property declares neither Type nor Enum"));
    }

    Ok(PropertyDefinition {
        desc: f.text("Desc")?,
        value_type,
        enum_terms,
        term_annotations: f.handles("Term")?,
        required: f.flag("Req", false)?,
        private: f.flag("Private", false)?,
        key: f.flag("Key", false)?,
        nullable: f.flag("Nul", false)?,
        strict: f.flag("Strict", true)?,
        tags: f.tags()?,
        handle,
    })
}

fn parse_term(handle: Handle, entry: &Value) -> Result<Term, SchemaError> {
    let f = Fields::new(format!("Terms.{handle}"), entry, TERM_FIELDS)?;
    Ok(Term {
        value: f.required_text("Value")?,
        origin: f.required_text("Origin")?,
        code: f.text("Code")?,
        version: f.version_text("Version")?,
        definition: f.text("Definition")?,
        tags: f.tags()?,
        handle,
    })
}

// ============================================================================
// Field access
// ============================================================================

/// A mapping entry whose keys were checked against an allow-list.
struct Fields<'a> {
    entity: String,
    map: Option<&'a Mapping>,
}

impl<'a> Fields<'a> {
    fn new(entity: String, value: &'a Value, allowed: &[&str]) -> Result<Self, SchemaError> {
        let map = match value {
            Value::Null => None,
            Value::Mapping(map) => Some(map),
            other => {
                return Err(SchemaError::new(
                    entity,
                    "(entry)",
                    format!("expected a mapping, found {}", describe(other)),
                ))
            }
        };
        for key in map.into_iter().flat_map(|m| m.keys()) {
            let name = key
                .as_str()
                .ok_or_else(|| SchemaError::new(&entity, "(entry)", "field names must be strings"))?;
            if !allowed.contains(&name) {
                return Err(SchemaError::new(&entity, name, "unknown field"));
            }
        }
        Ok(Self { entity, map })
    }

    fn error(&self, field: &str, message: impl Into<String>) -> SchemaError {
        SchemaError::new(&self.entity, field, message)
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(field)).filter(|v| !v.is_null())
    }

    fn text(&self, field: &str) -> Result<Option<String>, SchemaError> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => scalar_text(v)
                .map(Some)
                .ok_or_else(|| self.error(field, format!("expected a scalar, found {}", describe(v)))),
        }
    }

    /// Version strings must be written as strings or integers. A YAML float
    /// like `1.10` has already lost its spelling by the time it is read.
    fn version_text(&self, field: &str) -> Result<Option<String>, SchemaError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(Some(n.to_string())),
            Some(Value::Number(n)) => Err(self.error(
                field,
                format!("numeric version `{n}` is ambiguous; quote the version (e.g. \"{n}\")"),
            )),
            Some(v) => Err(self.error(field, format!("expected a version string, found {}", describe(v)))),
        }
    }

    fn required_text(&self, field: &str) -> Result<String, SchemaError> {
        self.text(field)?
            .ok_or_else(|| self.error(field, "required field is missing"))
    }

    fn flag(&self, field: &str, default: bool) -> Result<bool, SchemaError> {
        match self.get(field) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(true),
                "false" | "no" => Ok(false),
                _ => Err(self.error(field, format!("`{s}` is not a boolean"))),
            },
            Some(v) => Err(self.error(field, format!("expected a boolean, found {}", describe(v)))),
        }
    }

    fn sequence(&self, field: &str) -> Result<&'a [Value], SchemaError> {
        match self.get(field) {
            None => Ok(&[]),
            Some(Value::Sequence(seq)) => Ok(seq.as_slice()),
            Some(v) => Err(self.error(field, format!("expected a list, found {}", describe(v)))),
        }
    }

    /// A list of handles. A lone scalar is accepted as a one-element list.
    fn handles(&self, field: &str) -> Result<Vec<Handle>, SchemaError> {
        if let Some(v) = self.get(field) {
            if let Some(one) = scalar_text(v) {
                return Ok(vec![one]);
            }
        }
        self.sequence(field)?
            .iter()
            .map(|v| {
                scalar_text(v)
                    .ok_or_else(|| self.error(field, format!("expected a handle, found {}", describe(v))))
            })
            .collect()
    }

    fn handle_sets(&self, field: &str) -> Result<Vec<Vec<Handle>>, SchemaError> {
        self.sequence(field)?
            .iter()
            .map(|set| match set {
                Value::Sequence(items) => items
                    .iter()
                    .map(|v| {
                        scalar_text(v).ok_or_else(|| {
                            self.error(field, format!("expected a handle, found {}", describe(v)))
                        })
                    })
                    .collect(),
                other => Err(self.error(
                    field,
                    format!("expected a list of handle lists, found {}", describe(other)),
                )),
            })
            .collect()
    }

    /// `Tags: {key: value}`; a list value yields one tag per element.
    fn tags(&self) -> Result<Vec<Tag>, SchemaError> {
        let map = match self.get("Tags") {
            None => return Ok(Vec::new()),
            Some(Value::Mapping(map)) => map,
            Some(v) => {
                return Err(self.error("Tags", format!("expected a mapping, found {}", describe(v))))
            }
        };
        let mut tags = Vec::new();
        for (key, value) in map {
            let key = scalar_text(key).ok_or_else(|| self.error("Tags", "tag keys must be scalars"))?;
            let values = match value {
                Value::Sequence(items) => items.iter().map(scalar_text).collect::<Option<Vec<_>>>(),
                other => scalar_text(other).map(|v| vec![v]),
            }
            .ok_or_else(|| self.error("Tags", format!("tag `{key}` must have scalar values")))?;
            tags.extend(values.into_iter().map(|v| Tag::new(key.clone(), v)));
        }
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    /// A section: mapping of handle to entry, in document order.
    fn section(&self, field: &str) -> Result<Vec<(Handle, &'a Value)>, SchemaError> {
        let map = match self.get(field) {
            None => return Ok(Vec::new()),
            Some(Value::Mapping(map)) => map,
            Some(v) => {
                return Err(self.error(field, format!("expected a mapping of handles, found {}", describe(v))))
            }
        };
        map.iter()
            .map(|(k, v)| match scalar_text(k) {
                Some(handle) if !handle.trim().is_empty() => Ok((handle, v)),
                _ => Err(self.error(field, "entity handles must be non-empty scalars")),
            })
            .collect()
    }
}

/// Text of a scalar, unchanged. Numbers and booleans are rendered as written.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn describe(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<MdfDocument, SchemaError> {
        parse_document(&MdfSource::new("test.yml", text))
    }

    #[test]
    fn rejects_unknown_section() {
        let err = parse("Handle: X\nVersion: 1.0.0\nEdges: {}\n").unwrap_err();
        assert_eq!(err.field, "Edges");
        assert_eq!(err.message, "unknown top-level section");
    }

    #[test]
    fn rejects_unknown_property_field() {
        let err = parse("PropDefinitions:\n  p:\n    Type: string\n    Colour: red\n").unwrap_err();
        assert_eq!(err.entity, "PropDefinitions.p");
        assert_eq!(err.field, "Colour");
    }

    #[test]
    fn property_needs_type_or_enum() {
        let err = parse("PropDefinitions:\n  p:\n    Desc: nothing here\n").unwrap_err();
        assert_eq!(err.entity, "PropDefinitions.p");
        assert_eq!(err.field, "Type");
    }

    #[test]
    fn property_defaults() {
        let doc = parse("PropDefinitions:\n  p:\n    Type: integer\n").unwrap();
        let p = &doc.properties[0];
        assert_eq!(p.value_type, Some(ValueType::Integer));
        assert!(p.strict);
        assert!(!p.required && !p.private && !p.key && !p.nullable);
    }

    #[test]
    fn unknown_primitive_type_is_schema_error() {
        let err = parse("PropDefinitions:\n  p:\n    Type: float\n").unwrap_err();
        assert_eq!(err.field, "Type");
        assert!(err.message.contains("float"));
    }

    #[test]
    fn relationship_requires_known_mul_and_ends() {
        let err = parse("Relationships:\n  r:\n    Mul: some\n    Ends: [{Src: a, Dst: b}]\n").unwrap_err();
        assert_eq!((err.entity.as_str(), err.field.as_str()), ("Relationships.r", "Mul"));

        let err = parse("Relationships:\n  r:\n    Mul: one_to_one\n").unwrap_err();
        assert_eq!(err.field, "Ends");

        let err = parse("Relationships:\n  r:\n    Mul: one_to_one\n    Ends: [{Src: a}]\n").unwrap_err();
        assert_eq!(err.entity, "Relationships.r.Ends[0]");
        assert_eq!(err.field, "Dst");
    }

    #[test]
    fn tags_with_list_values_fan_out() {
        let doc = parse("Nodes:\n  n:\n    Props: []\n    Tags:\n      Category: study\n      Alias: [a, b]\n").unwrap();
        let tags = &doc.nodes[0].tags;
        assert_eq!(
            tags,
            &vec![Tag::new("Alias", "a"), Tag::new("Alias", "b"), Tag::new("Category", "study")]
        );
    }

    #[test]
    fn empty_unique_key_rejected() {
        let err = parse("Nodes:\n  n:\n    Props: [a]\n    UniqueKeys: [[]]\n").unwrap_err();
        assert_eq!(err.field, "UniqueKeys");
    }

    #[test]
    fn numeric_codes_are_kept_as_text() {
        let doc = parse("Terms:\n  t:\n    Value: Yes\n    Origin: caDSR\n    Code: 2192199\n    Version: \"1.0\"\n").unwrap();
        assert_eq!(doc.terms[0].code.as_deref(), Some("2192199"));
        assert_eq!(doc.terms[0].version.as_deref(), Some("1.0"));
    }

    #[test]
    fn float_versions_must_be_quoted() {
        let err = parse("Handle: M\nVersion: 1.10\n").unwrap_err();
        assert_eq!(err.entity, "test.yml");
        assert_eq!(err.field, "Version");
        assert!(err.message.contains("quote the version"), "{}", err.message);

        let err = parse("Terms:\n  t:\n    Value: v\n    Origin: o\n    Version: 2.10\n").unwrap_err();
        assert_eq!(err.entity, "Terms.t");
        assert_eq!(err.field, "Version");

        let doc = parse("Handle: M\nVersion: \"1.10\"\n").unwrap();
        assert_eq!(doc.version.as_deref(), Some("1.10"));
        let doc = parse("Handle: M\nVersion: 2\n").unwrap();
        assert_eq!(doc.version.as_deref(), Some("2"));
    }

    #[test]
    fn free_text_is_untouched() {
        let text = "Terms:\n  t:\n    Value: v\n    Origin: o\n    Definition: |\n      line one 'quoted'\n      line \"two\" \\ end\n";
        let doc = parse(text).unwrap();
        assert_eq!(
            doc.terms[0].definition.as_deref(),
            Some("line one 'quoted'\nline \"two\" \\ end\n")
        );
    }
}
