use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mdb_changelog::{Category, MutationOp};
use mdb_mdf::TermKey;
use mdb_model::NaturalKey;
use mdb_terms::{
    fetch_with_retry, plan_reconciliation, reconcile_models, to_changeset, CurrentTerms,
    FileTermSource, ReconcileError, RetryPolicy, SourceError, StaticTermSource, SyncOptions,
    TermSnapshot, TermSource, UnitOutcome,
};

fn current() -> CurrentTerms {
    serde_json::from_str(include_str!("../../../tests/fixtures/current-terms-TEST.json")).unwrap()
}

fn snapshot() -> TermSnapshot {
    serde_json::from_str(include_str!("../../../tests/fixtures/snapshot-TEST.json")).unwrap()
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter: 0.0,
        timeout: Duration::from_millis(200),
    }
}

/// Fails the first `failures` fetches, then serves the fixture snapshot.
struct FlakySource {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl TermSource for FlakySource {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn fetch_snapshot(&self, _model: &str, _version: &str) -> Result<TermSnapshot, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(SourceError::Unavailable {
                source_name: "flaky".into(),
                message: format!("outage {call}"),
            });
        }
        Ok(snapshot())
    }
}

struct SlowSource;

#[async_trait]
impl TermSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn fetch_snapshot(&self, _model: &str, _version: &str) -> Result<TermSnapshot, SourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(snapshot())
    }
}

#[test]
fn additive_snapshot_emits_only_the_new_term() {
    let plan = plan_reconciliation(&current(), &snapshot()).unwrap();
    assert_eq!(plan.new_terms.len(), 1);
    assert!(plan.updated_terms.is_empty());
    assert!(plan.review.is_empty());
    assert_eq!(plan.unchanged, 2);

    let cs = to_changeset(&plan, &SyncOptions::default());
    let term_merges: Vec<&NaturalKey> = cs
        .statements
        .iter()
        .filter_map(|s| match &s.op {
            MutationOp::MergeEntity { key, .. } => Some(key),
            _ => None,
        })
        .collect();
    let term_4 = NaturalKey::Term(TermKey::new("NCIt", Some("C0004"), "term_4"));
    assert_eq!(term_merges, vec![&term_4]);

    for existing in ["C0002", "C0003"] {
        let key = NaturalKey::Term(TermKey::new("NCIt", Some(existing), ""));
        assert!(cs.statements.iter().all(|s| !s.op.defines().contains(&&key)));
    }

    let links = cs.by_category(Category::Property).count();
    assert_eq!(links, 1);
    mdb_changelog::verify_ordering(&cs, &plan.existing).unwrap();
}

#[test]
fn unchanged_snapshot_produces_empty_changeset() {
    let mut snap = snapshot();
    snap.entries.truncate(2);
    let plan = plan_reconciliation(&current(), &snap).unwrap();
    assert!(!plan.has_changes());
    assert!(to_changeset(&plan, &SyncOptions::default()).is_empty());
}

#[tokio::test]
async fn file_source_falls_back_to_model_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("TEST.json"),
        include_str!("../../../tests/fixtures/snapshot-TEST.json"),
    )
    .unwrap();
    let source = FileTermSource::new(dir.path());
    let snap = source.fetch_snapshot("TEST", "9.9.9").await.unwrap();
    assert_eq!(snap.entries.len(), 3);

    let err = source.fetch_snapshot("OTHER", "1").await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let source = FlakySource {
        failures: 2,
        calls: AtomicU32::new(0),
    };
    let fetched = fetch_with_retry(&source, "TEST", "1.2.3", &fast_policy(3))
        .await
        .unwrap();
    assert_eq!(fetched.attempts, 3);
}

#[tokio::test]
async fn exhausted_retries_report_source_unavailable() {
    let source = FlakySource {
        failures: 10,
        calls: AtomicU32::new(0),
    };
    let err = fetch_with_retry(&source, "TEST", "1.2.3", &fast_policy(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::SourceUnavailable { attempts: 2, .. }
    ));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_source_times_out() {
    let err = fetch_with_retry(&SlowSource, "TEST", "1.2.3", &fast_policy(1))
        .await
        .unwrap_err();
    match err {
        ReconcileError::SourceUnavailable { last, .. } => {
            assert!(matches!(last, SourceError::Timeout { .. }))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn failing_unit_does_not_block_siblings() {
    let mut other = current();
    other.model = "MISSING".into();
    let source: Arc<dyn TermSource> = Arc::new(StaticTermSource::new("static").with_snapshot(snapshot()));
    let options = SyncOptions {
        retry: fast_policy(2),
        concurrency: 2,
        ..Default::default()
    };

    let reports = reconcile_models(source, vec![other, current()], &options).await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].model, "MISSING");
    assert!(matches!(
        reports[0].outcome,
        UnitOutcome::Skipped {
            error: ReconcileError::InvalidSnapshot { .. }
        }
    ));
    match &reports[1].outcome {
        UnitOutcome::Emitted { changeset, plan } => {
            assert_eq!(changeset.id, "TEST_1.2.3_term-sync");
            assert_eq!(plan.new_terms.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}
