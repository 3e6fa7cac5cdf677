//! Idempotent, ordered changesets for MDB model graphs.
//!
//! ```text
//!   ModelGraph (+ baseline) ──emit──► Changeset ──write──► Liquibase XML
//!                                        │                 JSON
//!                                        │                 Cypher script
//!                                        └──simulate──► GraphState
//! ```
//!
//! Every statement is a MERGE keyed by natural key (or a guarded schema
//! statement), so applying a changeset twice leaves the store as it was after
//! the first application.

pub mod bootstrap;
pub mod cypher;
pub mod digest;
pub mod emit;
pub mod liquibase;
pub mod simulate;
pub mod statement;
pub mod writer;

pub use bootstrap::bootstrap_changeset;
pub use emit::{emit_changeset, term_attrs, DiffReport, EmitError, EmitOptions, Emission, DEFAULT_AUTHOR};
pub use liquibase::{renumber_changelog, to_liquibase_xml, Renumbered};
pub use simulate::{verify_ordering, ApplyReport, GraphState, OrderingViolation};
pub use statement::{
    Attributes, Category, ChangeStatement, Changeset, ChangesetBuilder, ChangesetKind, IndexSpec,
    Link, Literal, ModelRef, MutationOp, RelType,
};
pub use writer::{render_changeset, to_cypher_script, write_atomic, write_changeset, OutputFormat, WriteError};
