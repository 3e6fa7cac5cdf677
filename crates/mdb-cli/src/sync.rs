use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use mdb_changelog::write_changeset;
use mdb_terms::{
    reconcile_models, CurrentTerms, FileTermSource, SyncOptions, TermSource, UnitOutcome,
};

use crate::changelog::parse_timestamp;
use crate::config::ToolConfig;

#[derive(Debug, Args)]
pub struct SyncTermsArgs {
    /// Current-terms JSON, one file per (model, version) unit.
    #[arg(long, required = true, num_args = 1..)]
    pub current: Vec<PathBuf>,

    /// Directory of `<model>_<version>.json` / `<model>.json` snapshots.
    #[arg(long = "snapshot_dir", alias = "snapshot-dir", conflicts_with = "source_url")]
    pub snapshot_dir: Option<PathBuf>,

    /// Terminology service base URL (`GET <url>/<model>/<version>`).
    #[arg(long = "source_url", alias = "source-url")]
    pub source_url: Option<String>,

    #[arg(long = "output_dir", alias = "output-dir")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub commit: Option<String>,

    #[arg(long = "add_rollback", alias = "add-rollback")]
    pub add_rollback: bool,

    #[arg(long = "max_attempts", alias = "max-attempts")]
    pub max_attempts: Option<u32>,

    #[arg(long = "timeout_secs", alias = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub format: Option<mdb_changelog::OutputFormat>,

    #[arg(long)]
    pub timestamp: Option<String>,
}

fn term_source(args: &SyncTermsArgs) -> Result<Arc<dyn TermSource>> {
    if let Some(dir) = &args.snapshot_dir {
        return Ok(Arc::new(FileTermSource::new(dir)));
    }
    match &args.source_url {
        #[cfg(feature = "http")]
        Some(url) => Ok(Arc::new(mdb_terms::HttpTermSource::new(url.clone()))),
        #[cfg(not(feature = "http"))]
        Some(_) => Err(anyhow!("--source_url requires the `http` feature")),
        None => Err(anyhow!("one of --snapshot_dir or --source_url is required")),
    }
}

pub fn cmd_sync_terms(args: &SyncTermsArgs, config: &ToolConfig) -> Result<ExitCode> {
    let format = config.output_format(args.format)?;
    let source = term_source(args)?;

    let units = args
        .current
        .iter()
        .map(|path| {
            CurrentTerms::from_path(path)
                .with_context(|| format!("failed to read current terms {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut retry = config.retry_policy();
    if let Some(n) = args.max_attempts {
        retry.max_attempts = n;
    }
    if let Some(secs) = args.timeout_secs {
        retry.timeout = Duration::from_secs(secs);
    }
    let options = SyncOptions {
        author: config.author(args.author.as_deref()),
        source_commit: args.commit.clone(),
        include_rollback: args.add_rollback,
        created_at: parse_timestamp(args.timestamp.as_deref())?,
        retry,
        concurrency: args.concurrency.or(config.concurrency).unwrap_or(4),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;
    let reports = rt.block_on(reconcile_models(source, units, &options));

    let mut first_error = None;
    let mut emitted = 0;
    for report in reports {
        match report.outcome {
            UnitOutcome::Emitted { changeset, plan } => {
                let path = args.output_dir.join(format!(
                    "{}.{}",
                    changeset.id,
                    format.extension()
                ));
                write_changeset(&changeset, format, &path)?;
                emitted += 1;
                println!(
                    "{} {} {} ({} new, {} updated, {} synonyms, {} statements)",
                    "ok".green().bold(),
                    report.model.cyan(),
                    report.version,
                    plan.new_terms.len(),
                    plan.updated_terms.len(),
                    plan.new_synonyms.len(),
                    changeset.len()
                );
                for item in &plan.review {
                    let line = serde_json::to_string(item)?;
                    println!("  {} {}", "review:".yellow().bold(), line);
                }
            }
            UnitOutcome::Skipped { error } => {
                println!(
                    "{} {} {}: {}",
                    "skipped".red().bold(),
                    report.model.cyan(),
                    report.version,
                    error
                );
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) if emitted == 0 => {
            Err(anyhow::Error::new(error).context("every reconciliation unit failed"))
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}
