//! Concurrent reconciliation of independent (model, version) units.
//!
//! Each unit fetches its snapshot, plans and renders a changeset on its own
//! task. A unit whose source stays unavailable is skipped; its siblings are
//! unaffected.

use std::collections::BTreeSet;
use std::sync::Arc;

use mdb_changelog::Changeset;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ReconcileError;
use crate::reconcile::{plan_reconciliation, to_changeset, ReconcilePlan, SyncOptions};
use crate::retry::fetch_with_retry;
use crate::snapshot::CurrentTerms;
use crate::source::TermSource;

#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Emitted {
        changeset: Changeset,
        plan: ReconcilePlan,
    },
    Skipped {
        error: ReconcileError,
    },
}

#[derive(Debug, Clone)]
pub struct UnitReport {
    pub model: String,
    pub version: String,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    pub fn is_emitted(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Emitted { .. })
    }
}

/// Fetch, plan and render one unit. Nothing is produced unless every step
/// succeeds.
pub async fn reconcile_unit(
    source: &dyn TermSource,
    current: &CurrentTerms,
    options: &SyncOptions,
) -> Result<(Changeset, ReconcilePlan), ReconcileError> {
    let fetched = fetch_with_retry(source, &current.model, &current.version, &options.retry).await?;
    let plan = plan_reconciliation(current, &fetched.snapshot)?;
    let changeset = to_changeset(&plan, options);
    Ok((changeset, plan))
}

/// Reconcile every unit with at most `options.concurrency` in flight.
/// Reports come back sorted by model, then version.
pub async fn reconcile_models(
    source: Arc<dyn TermSource>,
    units: Vec<CurrentTerms>,
    options: &SyncOptions,
) -> Vec<UnitReport> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let options = Arc::new(options.clone());
    let mut pending: BTreeSet<(String, String)> = BTreeSet::new();
    let mut set = JoinSet::new();

    for current in units {
        pending.insert((current.model.clone(), current.version.clone()));
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let options = Arc::clone(&options);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = match reconcile_unit(source.as_ref(), &current, &options).await {
                Ok((changeset, plan)) => UnitOutcome::Emitted { changeset, plan },
                Err(error) => {
                    tracing::error!(model = %current.model, version = %current.version, %error, "unit skipped");
                    UnitOutcome::Skipped { error }
                }
            };
            UnitReport {
                model: current.model,
                version: current.version,
                outcome,
            }
        });
    }

    let mut reports = Vec::with_capacity(pending.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => {
                pending.remove(&(report.model.clone(), report.version.clone()));
                reports.push(report);
            }
            Err(e) => tracing::error!(error = %e, "reconciliation task failed"),
        }
    }
    reports.extend(pending.into_iter().map(|(model, version)| UnitReport {
        outcome: UnitOutcome::Skipped {
            error: ReconcileError::TaskFailed {
                model: model.clone(),
            },
        },
        model,
        version,
    }));

    reports.sort_by(|a, b| (&a.model, &a.version).cmp(&(&b.model, &b.version)));
    let emitted = reports.iter().filter(|r| r.is_emitted()).count();
    tracing::info!(
        units = reports.len(),
        emitted,
        skipped = reports.len() - emitted,
        "reconciliation finished"
    );
    reports
}
