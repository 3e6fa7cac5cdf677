//! Folding several MDF documents into one [`Model`].
//!
//! Later documents may add entities, extend tags, add props/unique keys to a
//! node and add ends to a relationship. Anything else that differs from an
//! earlier declaration is a [`ConflictError`] naming both definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{parse_document, MdfDocument, MdfSource};
use crate::error::{ConflictError, MdfError, SchemaError};
use crate::model::{Handle, Model, NodeType, PropertyDefinition, RelationshipType, Tag, Term};
use crate::version::ModelVersion;

/// Parse-time switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Accept `Enum`/`Term` references to terms this model does not declare.
    /// Used when a baseline model version will supply them.
    pub allow_external_terms: bool,
}

/// The (handle, version) a caller expects. A given version overrides the
/// documents' own `Version`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTarget {
    pub handle: Option<String>,
    pub version: Option<String>,
}

impl ModelTarget {
    pub fn new(handle: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            version: Some(version.into()),
        }
    }
}

/// Parse and merge `sources` in order, then validate the result.
pub fn parse_model(
    sources: &[MdfSource],
    target: &ModelTarget,
    options: &ParseOptions,
) -> Result<Model, MdfError> {
    let builder = sources
        .iter()
        .try_fold(ModelBuilder::default(), |mut builder, source| {
            builder.add_document(parse_document(source)?)?;
            Ok::<_, MdfError>(builder)
        })?;
    builder.finish(target, options)
}

/// Read, parse and merge MDF files.
pub fn load_model(
    paths: &[std::path::PathBuf],
    target: &ModelTarget,
    options: &ParseOptions,
) -> Result<Model, MdfError> {
    let sources = paths
        .iter()
        .map(|p| MdfSource::from_path(p))
        .collect::<Result<Vec<_>, _>>()?;
    parse_model(&sources, target, options)
}

// ============================================================================
// Builder state
// ============================================================================

/// A value together with the document that declared it.
#[derive(Debug, Clone)]
struct Declared<T> {
    value: T,
    source: String,
}

#[derive(Debug, Default)]
pub struct ModelBuilder {
    handle: Option<Declared<String>>,
    version: Option<Declared<String>>,
    uri: Option<Declared<String>>,
    nodes: BTreeMap<Handle, Declared<NodeType>>,
    relationships: BTreeMap<Handle, Declared<RelationshipType>>,
    properties: BTreeMap<Handle, Declared<PropertyDefinition>>,
    terms: BTreeMap<Handle, Declared<Term>>,
}

impl ModelBuilder {
    pub fn add_document(&mut self, doc: MdfDocument) -> Result<(), ConflictError> {
        let src = doc.source;
        merge_scalar(&mut self.handle, doc.handle, &src, "Handle")?;
        merge_scalar(&mut self.version, doc.version, &src, "Version")?;
        merge_scalar(&mut self.uri, doc.uri, &src, "URI")?;

        for node in doc.nodes {
            merge_entry(&mut self.nodes, node.handle.clone(), node, &src, merge_node)?;
        }
        for rel in doc.relationships {
            merge_entry(&mut self.relationships, rel.handle.clone(), rel, &src, merge_relationship)?;
        }
        for prop in doc.properties {
            merge_entry(&mut self.properties, prop.handle.clone(), prop, &src, merge_property)?;
        }
        for term in doc.terms {
            merge_entry(&mut self.terms, term.handle.clone(), term, &src, merge_term)?;
        }
        Ok(())
    }

    pub fn finish(self, target: &ModelTarget, options: &ParseOptions) -> Result<Model, MdfError> {
        let handle = match (&target.handle, self.handle) {
            (Some(wanted), Some(declared)) if *wanted != declared.value => {
                return Err(SchemaError::new(
                    "(model)",
                    "Handle",
                    format!(
                        "{} declares `{}` but `{}` was requested",
                        declared.source, declared.value, wanted
                    ),
                )
                .into())
            }
            (Some(wanted), _) => wanted.clone(),
            (None, Some(declared)) => declared.value,
            (None, None) => {
                return Err(SchemaError::new("(model)", "Handle", "no model handle given").into())
            }
        };

        let raw_version = match (&target.version, self.version) {
            (Some(wanted), declared) => {
                if let Some(declared) = declared.filter(|d| d.value != *wanted) {
                    tracing::debug!(
                        declared = %declared.value,
                        requested = %wanted,
                        "requested version overrides MDF Version"
                    );
                }
                wanted.clone()
            }
            (None, Some(declared)) => declared.value,
            (None, None) => {
                return Err(SchemaError::new("(model)", "Version", "no model version given").into())
            }
        };

        let model = Model {
            handle,
            version: ModelVersion::parse(&raw_version)?,
            uri: self.uri.map(|u| u.value),
            nodes: strip(self.nodes),
            relationships: strip(self.relationships),
            properties: strip(self.properties),
            terms: strip(self.terms),
        };
        validate_model(&model, options)?;

        tracing::info!(
            model = %model.handle,
            version = %model.version,
            nodes = model.nodes.len(),
            relationships = model.relationships.len(),
            properties = model.properties.len(),
            terms = model.terms.len(),
            "MDF model loaded"
        );
        Ok(model)
    }
}

fn strip<T>(map: BTreeMap<Handle, Declared<T>>) -> BTreeMap<Handle, T> {
    map.into_iter().map(|(k, d)| (k, d.value)).collect()
}

fn merge_scalar(
    slot: &mut Option<Declared<String>>,
    incoming: Option<String>,
    source: &str,
    entity: &str,
) -> Result<(), ConflictError> {
    let Some(value) = incoming else {
        return Ok(());
    };
    match slot {
        Some(existing) if existing.value != value => Err(ConflictError {
            entity: entity.to_string(),
            first: format!("`{}` in {}", existing.value, existing.source),
            second: format!("`{}` in {}", value, source),
        }),
        Some(_) => Ok(()),
        None => {
            *slot = Some(Declared {
                value,
                source: source.to_string(),
            });
            Ok(())
        }
    }
}

type MergeFn<T> = fn(&mut T, T) -> Result<(), (String, String)>;

fn merge_entry<T>(
    map: &mut BTreeMap<Handle, Declared<T>>,
    handle: Handle,
    incoming: T,
    source: &str,
    merge: MergeFn<T>,
) -> Result<(), ConflictError>
where
    T: EntityKind,
{
    match map.get_mut(&handle) {
        None => {
            map.insert(
                handle,
                Declared {
                    value: incoming,
                    source: source.to_string(),
                },
            );
            Ok(())
        }
        Some(existing) => merge(&mut existing.value, incoming).map_err(|(first, second)| ConflictError {
            entity: format!("{}.{}", T::SECTION, handle),
            first: format!("{} in {}", first, existing.source),
            second: format!("{} in {}", second, source),
        }),
    }
}

trait EntityKind {
    const SECTION: &'static str;
}

impl EntityKind for NodeType {
    const SECTION: &'static str = "Nodes";
}
impl EntityKind for RelationshipType {
    const SECTION: &'static str = "Relationships";
}
impl EntityKind for PropertyDefinition {
    const SECTION: &'static str = "PropDefinitions";
}
impl EntityKind for Term {
    const SECTION: &'static str = "Terms";
}

// ============================================================================
// Per-kind merge rules
// ============================================================================

fn extend_tags(existing: &mut Vec<Tag>, incoming: Vec<Tag>) {
    existing.extend(incoming);
    existing.sort();
    existing.dedup();
}

fn extend_unique<T: PartialEq>(existing: &mut Vec<T>, incoming: Vec<T>) {
    for item in incoming {
        if !existing.contains(&item) {
            existing.push(item);
        }
    }
}

fn merge_desc(existing: &mut Option<String>, incoming: Option<String>) -> Result<(), (String, String)> {
    let Some(desc) = incoming else {
        return Ok(());
    };
    match existing {
        None => {
            *existing = Some(desc);
            Ok(())
        }
        Some(current) if *current == desc => Ok(()),
        Some(current) => Err((format!("Desc {current:?}"), format!("Desc {desc:?}"))),
    }
}

fn merge_node(existing: &mut NodeType, incoming: NodeType) -> Result<(), (String, String)> {
    merge_desc(&mut existing.desc, incoming.desc)?;
    extend_unique(&mut existing.props, incoming.props);
    extend_unique(&mut existing.unique_keys, incoming.unique_keys);
    extend_tags(&mut existing.tags, incoming.tags);
    Ok(())
}

fn merge_relationship(
    existing: &mut RelationshipType,
    incoming: RelationshipType,
) -> Result<(), (String, String)> {
    if existing.multiplicity != incoming.multiplicity {
        return Err((
            format!("Mul {}", existing.multiplicity),
            format!("Mul {}", incoming.multiplicity),
        ));
    }
    if existing.required != incoming.required {
        return Err((
            format!("Req {}", existing.required),
            format!("Req {}", incoming.required),
        ));
    }
    merge_desc(&mut existing.desc, incoming.desc)?;
    extend_unique(&mut existing.props, incoming.props);
    extend_unique(&mut existing.ends, incoming.ends);
    extend_tags(&mut existing.tags, incoming.tags);
    Ok(())
}

fn merge_property(
    existing: &mut PropertyDefinition,
    incoming: PropertyDefinition,
) -> Result<(), (String, String)> {
    if existing.value_type != incoming.value_type || existing.enum_terms != incoming.enum_terms {
        return Err((existing.domain_signature(), incoming.domain_signature()));
    }
    let flags = |p: &PropertyDefinition| {
        format!(
            "Req {} Private {} Key {} Nul {} Strict {}",
            p.required, p.private, p.key, p.nullable, p.strict
        )
    };
    if flags(existing) != flags(&incoming) {
        return Err((flags(existing), flags(&incoming)));
    }
    if existing.term_annotations != incoming.term_annotations {
        return Err((
            format!("Term [{}]", existing.term_annotations.join(", ")),
            format!("Term [{}]", incoming.term_annotations.join(", ")),
        ));
    }
    merge_desc(&mut existing.desc, incoming.desc)?;
    extend_tags(&mut existing.tags, incoming.tags);
    Ok(())
}

fn merge_term(existing: &mut Term, incoming: Term) -> Result<(), (String, String)> {
    let describe = |t: &Term| {
        format!(
            "{} (Value {:?}, Version {:?}, Definition {:?})",
            t.key(),
            t.value,
            t.version,
            t.definition
        )
    };
    let same = existing.value == incoming.value
        && existing.origin == incoming.origin
        && existing.code == incoming.code
        && existing.version == incoming.version
        && existing.definition == incoming.definition;
    if !same {
        return Err((describe(existing), describe(&incoming)));
    }
    extend_tags(&mut existing.tags, incoming.tags);
    Ok(())
}

// ============================================================================
// Validation
// ============================================================================

/// Checks that need the merged view: unique keys against the node's final
/// props, and enum/annotation terms against the final term set.
fn validate_model(model: &Model, options: &ParseOptions) -> Result<(), SchemaError> {
    for node in model.nodes.values() {
        for (i, key) in node.unique_keys.iter().enumerate() {
            if let Some(stray) = key.iter().find(|p| !node.props.contains(p)) {
                return Err(SchemaError::new(
                    format!("Nodes.{}", node.handle),
                    "UniqueKeys",
                    format!("entry {i} names `{stray}`, which is not one of the node's Props"),
                ));
            }
        }
    }

    if options.allow_external_terms {
        return Ok(());
    }
    for prop in model.properties.values() {
        for (field, handles) in [("Enum", &prop.enum_terms), ("Term", &prop.term_annotations)] {
            if let Some(missing) = handles.iter().find(|t| !model.terms.contains_key(*t)) {
                return Err(SchemaError::new(
                    format!("PropDefinitions.{}", prop.handle),
                    field,
                    format!("references undeclared term `{missing}`"),
                ));
            }
        }
    }
    Ok(())
}
