//! Current-term sets and external terminology snapshots.

use std::fs;
use std::path::Path;

use mdb_mdf::{Term, TermKey};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// A term as exchanged with terminology sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermRecord {
    pub value: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl TermRecord {
    pub fn key(&self) -> TermKey {
        TermKey::new(&self.origin, self.code.as_deref(), &self.value)
    }

    pub fn to_term(&self) -> Term {
        Term {
            handle: self.value.clone(),
            value: self.value.clone(),
            origin: self.origin.clone(),
            code: self.code.clone(),
            version: self.version.clone(),
            definition: self.definition.clone(),
            tags: Vec::new(),
        }
    }
}

impl From<&Term> for TermRecord {
    fn from(term: &Term) -> Self {
        Self {
            value: term.value.clone(),
            origin: term.origin.clone(),
            code: term.code.clone(),
            version: term.version.clone(),
            definition: term.definition.clone(),
        }
    }
}

/// A canonical term, the property whose value set holds it, and its synonyms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermEntry {
    pub term: TermRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<TermRecord>,
}

/// Terms already in the store for one model version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentTerms {
    pub model: String,
    pub version: String,
    #[serde(default)]
    pub terms: Vec<TermEntry>,
}

impl CurrentTerms {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let text = fs::read_to_string(path).map_err(|e| SourceError::Unavailable {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| SourceError::Invalid {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Enumerated terms of a resolved model graph, as the store holds them.
    pub fn from_graph(graph: &mdb_model::ModelGraph) -> Self {
        let mut terms = Vec::new();
        for (handle, prop) in &graph.properties {
            for key in &prop.enum_terms {
                if let Some(term) = graph.terms.get(key) {
                    terms.push(TermEntry {
                        term: TermRecord::from(term),
                        property: Some(handle.clone()),
                        synonyms: Vec::new(),
                    });
                }
            }
        }
        Self {
            model: graph.handle.clone(),
            version: graph.version.to_string(),
            terms,
        }
    }
}

/// What an external terminology source reports for one model version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermSnapshot {
    /// Name of the terminology source (e.g. `NCIt`).
    pub source: String,
    pub model: String,
    pub version: String,
    #[serde(default)]
    pub entries: Vec<TermEntry>,
}
