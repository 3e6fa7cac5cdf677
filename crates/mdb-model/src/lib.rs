//! Resolved MDB model graphs and the natural-key identity scheme.
//!
//! - [`identity`]: natural keys for every entity kind and the uniqueness
//!   constraints declared over them.
//! - [`graph`]: cross-reference resolution from a parsed MDF model into a
//!   [`ModelGraph`], optionally against a baseline version.

pub mod graph;
pub mod identity;

pub use graph::{
    build_graph, check_baseline, GraphError, ModelGraph, ResolvedProperty,
    UnresolvedReferenceError,
};
pub use identity::{
    unique_key_constraint, uniqueness_constraints, EntityKind, NaturalKey, UniquenessConstraint,
};
