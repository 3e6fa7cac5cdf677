//! MDB model compiler CLI
//!
//! - `make-changelog`: MDF files (+ optional baseline) → changeset file
//! - `validate`: parse, merge and resolve MDF files without emitting
//! - `sync-terms`: reconcile stored terms against terminology snapshots
//! - `bootstrap`: store-wide indexes, constraints and nanoid trigger
//! - `renumber`: rewrite changeSet ids so changelogs can be concatenated

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdb_changelog::OutputFormat;
use tracing_subscriber::EnvFilter;

mod changelog;
mod config;
mod report;
mod sync;

use config::ToolConfig;
use report::ErrorFormat;

pub const LOG_ENV: &str = "MDB_LOG";

#[derive(Parser)]
#[command(name = "mdb")]
#[command(author, version, about = "MDB model compiler: MDF files to idempotent graph changesets")]
struct Cli {
    /// Tool configuration file (YAML). Defaults to `$MDB_CONFIG`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `mdb_changelog=trace`). Defaults to `$MDB_LOG`, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum, default_value = "text")]
    error_format: ErrorFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile MDF files into a changeset.
    #[command(name = "make-changelog")]
    MakeChangelog(changelog::MakeChangelogArgs),

    /// Parse, merge and resolve MDF files; report entity counts.
    Validate {
        #[arg(long = "mdf_files", alias = "mdf-files", required = true, num_args = 1..)]
        mdf_files: Vec<PathBuf>,

        #[arg(long = "model_handle", alias = "model-handle")]
        model_handle: Option<String>,

        #[arg(long = "model_version", alias = "model-version")]
        model_version: Option<String>,

        /// Allow Enum/Term references to terms not declared in these files.
        #[arg(long = "allow_external_terms", alias = "allow-external-terms")]
        allow_external_terms: bool,
    },

    /// Reconcile stored terms against terminology snapshots.
    #[command(name = "sync-terms")]
    SyncTerms(sync::SyncTermsArgs),

    /// Emit the store bootstrap changeset.
    Bootstrap {
        #[arg(long = "output_file_path", alias = "output-file-path")]
        output_file_path: PathBuf,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        format: Option<OutputFormat>,
    },

    /// Renumber changeSet ids in a Liquibase changelog.
    Renumber {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value_t = 1)]
        start: u32,

        /// Defaults to rewriting `--input` in place.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = ToolConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::MakeChangelog(args) => changelog::cmd_make_changelog(&args, &config)?,
        Commands::Validate {
            mdf_files,
            model_handle,
            model_version,
            allow_external_terms,
        } => changelog::cmd_validate(
            &mdf_files,
            model_handle.as_deref(),
            model_version.as_deref(),
            allow_external_terms,
        )?,
        Commands::SyncTerms(args) => return sync::cmd_sync_terms(&args, &config),
        Commands::Bootstrap {
            output_file_path,
            author,
            format,
        } => changelog::cmd_bootstrap(&output_file_path, author.as_deref(), format, &config)?,
        Commands::Renumber {
            input,
            start,
            output,
        } => changelog::cmd_renumber(&input, start, output.as_ref())?,
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let error_format = cli.error_format;
    match run(cli) {
        Ok(code) => code,
        Err(err) => report::report(&err, error_format),
    }
}
