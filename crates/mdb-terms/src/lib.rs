//! Term and synonym reconciliation.
//!
//! Compares the terms a store already holds for a model version against an
//! external terminology snapshot and emits an additive term-sync changeset.
//!
//! - [`snapshot`]: current-term sets and snapshots.
//! - [`source`]: where snapshots come from (memory, files, HTTP).
//! - [`retry`]: bounded, timed retries around fetches.
//! - [`reconcile`]: the additive diff and its changeset.
//! - [`runner`]: concurrent per-model units.

pub mod error;
pub mod reconcile;
pub mod retry;
pub mod runner;
pub mod snapshot;
pub mod source;

pub use error::{ReconcileError, SourceError};
pub use reconcile::{
    mapping_source_for, plan_reconciliation, to_changeset, NewTerm, ReconcilePlan, ReviewItem,
    SynonymLink, SyncOptions, TermUpdate,
};
pub use retry::{fetch_with_retry, Fetched, RetryPolicy};
pub use runner::{reconcile_models, reconcile_unit, UnitOutcome, UnitReport};
pub use snapshot::{CurrentTerms, TermEntry, TermRecord, TermSnapshot};
#[cfg(feature = "http")]
pub use source::HttpTermSource;
pub use source::{FileTermSource, StaticTermSource, TermSource};
