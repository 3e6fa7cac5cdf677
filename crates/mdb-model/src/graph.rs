//! Resolved model graph.
//!
//! [`build_graph`] turns a parsed [`Model`] into a [`ModelGraph`] in which every
//! reference has been checked and every term is addressed by its natural key.
//! Enum and annotation terms the model does not declare may come from a
//! baseline graph of an earlier version of the same model.

use std::collections::{BTreeMap, BTreeSet};

use mdb_mdf::{
    ConflictError, End, Handle, Model, ModelVersion, NodeType, PropertyDefinition,
    RelationshipType, Tag, Term, TermId, TermKey,
};
use thiserror::Error;

use crate::identity::NaturalKey;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{referrer} references undeclared {target_kind} `{target}`")]
pub struct UnresolvedReferenceError {
    pub referrer: String,
    pub target_kind: &'static str,
    pub target: String,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Unresolved(#[from] UnresolvedReferenceError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("baseline {baseline} cannot be diffed against {model}: {reason}")]
    BaselineMismatch {
        model: String,
        baseline: String,
        reason: String,
    },
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperty {
    pub def: PropertyDefinition,
    pub enum_terms: Vec<TermKey>,
    pub annotations: Vec<TermKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGraph {
    pub handle: String,
    pub version: ModelVersion,
    pub uri: Option<String>,
    pub terms: BTreeMap<TermKey, Term>,
    pub term_handles: BTreeMap<Handle, TermKey>,
    pub properties: BTreeMap<Handle, ResolvedProperty>,
    pub nodes: BTreeMap<Handle, NodeType>,
    pub relationships: BTreeMap<Handle, RelationshipType>,
}

impl ModelGraph {
    pub fn model_key(&self) -> NaturalKey {
        NaturalKey::Model {
            handle: self.handle.clone(),
            version: self.version.to_string(),
        }
    }

    pub fn node_key(&self, handle: &str) -> NaturalKey {
        NaturalKey::node(&self.handle, handle)
    }

    pub fn relationship_key(&self, handle: &str) -> NaturalKey {
        NaturalKey::relationship(&self.handle, handle)
    }

    pub fn property_key(&self, handle: &str) -> NaturalKey {
        NaturalKey::property(&self.handle, handle)
    }

    pub fn value_set_key(&self, property: &str) -> NaturalKey {
        NaturalKey::value_set(&self.handle, property)
    }

    pub fn property_concept_key(&self, property: &str) -> NaturalKey {
        NaturalKey::PropertyConcept {
            model: self.handle.clone(),
            property: property.to_string(),
        }
    }

    pub fn unique_key(&self, node: &str, props: &[Handle]) -> NaturalKey {
        NaturalKey::UniqueKey {
            model: self.handle.clone(),
            node: node.to_string(),
            props: props.to_vec(),
        }
    }

    pub fn end_key(&self, relationship: &str, end: &End) -> NaturalKey {
        NaturalKey::RelationshipEnd {
            model: self.handle.clone(),
            relationship: relationship.to_string(),
            src: end.src.clone(),
            dst: end.dst.clone(),
        }
    }

    /// Every entity carrying tags, keyed by the entity's natural key.
    pub fn tagged_entities(&self) -> Vec<(NaturalKey, &[Tag])> {
        let terms = self
            .terms
            .iter()
            .map(|(k, t)| (NaturalKey::Term(k.clone()), t.tags.as_slice()));
        let props = self
            .properties
            .iter()
            .map(|(h, p)| (self.property_key(h), p.def.tags.as_slice()));
        let nodes = self
            .nodes
            .iter()
            .map(|(h, n)| (self.node_key(h), n.tags.as_slice()));
        let rels = self
            .relationships
            .iter()
            .map(|(h, r)| (self.relationship_key(h), r.tags.as_slice()));
        terms
            .chain(props)
            .chain(nodes)
            .chain(rels)
            .filter(|(_, tags)| !tags.is_empty())
            .collect()
    }

    /// Natural keys of every store entity this graph describes.
    pub fn natural_keys(&self) -> BTreeSet<NaturalKey> {
        let mut keys = BTreeSet::new();
        keys.insert(self.model_key());
        keys.extend(self.terms.keys().cloned().map(NaturalKey::Term));
        for (handle, prop) in &self.properties {
            keys.insert(self.property_key(handle));
            if !prop.enum_terms.is_empty() {
                keys.insert(self.value_set_key(handle));
            }
            if !prop.annotations.is_empty() {
                keys.insert(self.property_concept_key(handle));
            }
        }
        for (handle, node) in &self.nodes {
            keys.insert(self.node_key(handle));
            for props in &node.unique_keys {
                keys.insert(self.unique_key(handle, props));
            }
        }
        for (handle, rel) in &self.relationships {
            keys.insert(self.relationship_key(handle));
            for end in &rel.ends {
                keys.insert(self.end_key(handle, end));
            }
        }
        for (_, tags) in self.tagged_entities() {
            keys.extend(tags.iter().cloned().map(NaturalKey::Tag));
        }
        keys
    }

    /// Whether `value` is acceptable for property `property`.
    ///
    /// Strict enumerated properties accept only the values of their enum terms.
    /// `Strict: false` lifts that restriction entirely: the value need not be
    /// among the declared terms. Non-enumerated properties accept anything.
    /// `None` if the property is not part of this model.
    pub fn accepts_value(&self, property: &str, value: &str) -> Option<bool> {
        let prop = self.properties.get(property)?;
        if prop.enum_terms.is_empty() || !prop.def.strict {
            return Some(true);
        }
        Some(
            prop.enum_terms
                .iter()
                .filter_map(|k| self.terms.get(k))
                .any(|t| t.value == value),
        )
    }

    pub fn term(&self, handle: &str) -> Option<&Term> {
        self.term_handles.get(handle).and_then(|k| self.terms.get(k))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Resolve every cross-reference of `model`.
///
/// With a `baseline`, the baseline must describe the same model handle at an
/// earlier (or equal) version; undeclared enum/annotation terms are looked up
/// there, and terms whose value changed under the same code are conflicts.
pub fn build_graph(model: &Model, baseline: Option<&ModelGraph>) -> Result<ModelGraph, GraphError> {
    if let Some(base) = baseline {
        check_baseline(&model.handle, &model.version, base)?;
    }

    let mut graph = ModelGraph {
        handle: model.handle.clone(),
        version: model.version.clone(),
        uri: model.uri.clone(),
        terms: BTreeMap::new(),
        term_handles: BTreeMap::new(),
        properties: BTreeMap::new(),
        nodes: BTreeMap::new(),
        relationships: BTreeMap::new(),
    };

    for (handle, term) in &model.terms {
        add_term(&mut graph, handle, term, baseline)?;
    }

    for (handle, prop) in &model.properties {
        let referrer = format!("PropDefinitions.{handle}");
        if let Some(prior) = baseline.and_then(|b| b.properties.get(handle)) {
            check_value_domain(&graph, prior, prop, baseline)?;
        }
        let enum_terms = resolve_terms(&mut graph, &prop.enum_terms, &referrer, baseline)?;
        let annotations = resolve_terms(&mut graph, &prop.term_annotations, &referrer, baseline)?;
        graph.properties.insert(
            handle.clone(),
            ResolvedProperty {
                def: prop.clone(),
                enum_terms,
                annotations,
            },
        );
    }

    for (handle, node) in &model.nodes {
        let referrer = format!("Nodes.{handle}");
        let key_props = node.unique_keys.iter().flatten();
        for prop in node.props.iter().chain(key_props) {
            require(model.properties.contains_key(prop), &referrer, "PropDefinition", prop)?;
        }
        graph.nodes.insert(handle.clone(), node.clone());
    }

    for (handle, rel) in &model.relationships {
        let referrer = format!("Relationships.{handle}");
        for prop in &rel.props {
            require(model.properties.contains_key(prop), &referrer, "PropDefinition", prop)?;
        }
        for end in &rel.ends {
            require(model.nodes.contains_key(&end.src), &referrer, "NodeType", &end.src)?;
            require(model.nodes.contains_key(&end.dst), &referrer, "NodeType", &end.dst)?;
        }
        graph.relationships.insert(handle.clone(), rel.clone());
    }

    tracing::debug!(
        model = %graph.handle,
        version = %graph.version,
        terms = graph.terms.len(),
        baseline = ?baseline.map(|b| b.version.as_str()),
        "model graph resolved"
    );
    Ok(graph)
}

/// A baseline must describe the same model handle at an earlier or equal
/// version.
pub fn check_baseline(
    handle: &str,
    version: &ModelVersion,
    base: &ModelGraph,
) -> Result<(), GraphError> {
    let mismatch = |reason: &str| GraphError::BaselineMismatch {
        model: format!("{handle} {version}"),
        baseline: format!("{} {}", base.handle, base.version),
        reason: reason.to_string(),
    };
    if base.handle != handle {
        return Err(mismatch("model handles differ"));
    }
    if base.version > *version {
        return Err(mismatch("baseline version is newer"));
    }
    Ok(())
}

/// The stored property is shared by every version of the model, so its value
/// domain (a primitive type, or an enumerated value set) is immutable. Enum
/// membership may grow between versions.
fn check_value_domain(
    graph: &ModelGraph,
    prior: &ResolvedProperty,
    prop: &PropertyDefinition,
    baseline: Option<&ModelGraph>,
) -> Result<(), GraphError> {
    if prior.def.value_domain() == prop.value_domain() {
        return Ok(());
    }
    let base_version = baseline.map(|b| b.version.to_string()).unwrap_or_default();
    Err(ConflictError {
        entity: format!("property {}", graph.property_key(&prop.handle)),
        first: format!("{} in {} {}", prior.def.domain_signature(), graph.handle, base_version),
        second: format!("{} in {} {}", prop.domain_signature(), graph.handle, graph.version),
    }
    .into())
}

fn require(found: bool, referrer: &str, kind: &'static str, target: &str) -> Result<(), GraphError> {
    if found {
        Ok(())
    } else {
        Err(UnresolvedReferenceError {
            referrer: referrer.to_string(),
            target_kind: kind,
            target: target.to_string(),
        }
        .into())
    }
}

fn same_term(a: &Term, b: &Term) -> bool {
    a.value == b.value
        && a.origin == b.origin
        && a.code == b.code
        && a.version == b.version
        && a.definition == b.definition
}

fn add_term(
    graph: &mut ModelGraph,
    handle: &str,
    term: &Term,
    baseline: Option<&ModelGraph>,
) -> Result<(), GraphError> {
    let key = term.key();

    if let (Some(base), TermId::Code(_)) = (baseline, &key.id) {
        if let Some(prior) = base.terms.get(&key).filter(|p| p.value != term.value) {
            return Err(ConflictError {
                entity: format!("term {key}"),
                first: format!("Value {:?} in {} {}", prior.value, base.handle, base.version),
                second: format!("Value {:?} in {} {}", term.value, graph.handle, graph.version),
            }
            .into());
        }
    }

    match graph.terms.get_mut(&key) {
        Some(existing) if !same_term(existing, term) => {
            return Err(ConflictError {
                entity: format!("term {key}"),
                first: format!("Terms.{} {:?}", existing.handle, existing.definition),
                second: format!("Terms.{} {:?}", handle, term.definition),
            }
            .into())
        }
        Some(existing) => {
            existing.tags.extend(term.tags.iter().cloned());
            existing.tags.sort();
            existing.tags.dedup();
        }
        None => {
            graph.terms.insert(key.clone(), term.clone());
        }
    }
    graph.term_handles.insert(handle.to_string(), key);
    Ok(())
}

fn resolve_terms(
    graph: &mut ModelGraph,
    handles: &[Handle],
    referrer: &str,
    baseline: Option<&ModelGraph>,
) -> Result<Vec<TermKey>, GraphError> {
    let mut keys = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Some(key) = graph.term_handles.get(handle) {
            keys.push(key.clone());
            continue;
        }
        let inherited = baseline.and_then(|b| {
            let key = b.term_handles.get(handle)?;
            Some((key.clone(), b.terms.get(key)?.clone()))
        });
        let Some((key, term)) = inherited else {
            return Err(UnresolvedReferenceError {
                referrer: referrer.to_string(),
                target_kind: "Term",
                target: handle.clone(),
            }
            .into());
        };
        tracing::debug!(term = %key, referrer, "term resolved from baseline");
        graph.terms.entry(key.clone()).or_insert(term);
        graph.term_handles.insert(handle.clone(), key.clone());
        keys.push(key);
    }
    Ok(keys)
}
