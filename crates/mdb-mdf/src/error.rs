use std::path::PathBuf;

use thiserror::Error;

/// A malformed MDF field. Names the entity (`Section.handle`) and the field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("schema error in {entity}, field `{field}`: {message}")]
pub struct SchemaError {
    pub entity: String,
    pub field: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Two incompatible definitions of the same entity.
///
/// Raised when merged MDF files redefine an entity, or when two model versions
/// disagree on an attribute that is part of an entity's identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("conflicting definitions of {entity}: {first} <> {second}")]
pub struct ConflictError {
    pub entity: String,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Error)]
pub enum MdfError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
