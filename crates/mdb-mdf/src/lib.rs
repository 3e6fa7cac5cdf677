//! Model Description Format (MDF)
//!
//! An MDF document is a YAML mapping with the sections `Handle`, `Version`,
//! `URI`, `Nodes`, `Relationships`, `PropDefinitions` and `Terms`. This crate
//! parses one or more documents into a single validated [`Model`]:
//!
//! ```text
//! MdfSource ──parse_document──▶ MdfDocument ─┐
//! MdfSource ──parse_document──▶ MdfDocument ─┼─fold─▶ ModelBuilder ──finish──▶ Model
//! MdfSource ──parse_document──▶ MdfDocument ─┘
//! ```
//!
//! Free-text fields keep the exact string the YAML loader produced.

pub mod document;
pub mod error;
pub mod merge;
pub mod model;
pub mod version;

pub use document::{parse_document, MdfDocument, MdfSource};
pub use error::{ConflictError, MdfError, SchemaError};
pub use merge::{load_model, parse_model, ModelBuilder, ModelTarget, ParseOptions};
pub use model::{
    End, Handle, Model, Multiplicity, NodeType, PropertyDefinition, RelationshipType, Tag, Term,
    TermId, TermKey, ValueType,
};
pub use version::ModelVersion;
