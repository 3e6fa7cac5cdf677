use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use mdb_changelog::{
    bootstrap_changeset, emit_changeset, renumber_changelog, write_atomic, write_changeset,
    EmitOptions, OutputFormat,
};
use mdb_mdf::{load_model, Model, ModelTarget, ParseOptions};
use mdb_model::{build_graph, ModelGraph};

use crate::config::ToolConfig;

#[derive(Debug, Args)]
pub struct MakeChangelogArgs {
    #[arg(long = "model_handle", alias = "model-handle")]
    pub model_handle: String,

    /// Overrides the `Version` declared in the MDF files.
    #[arg(long = "model_version", alias = "model-version")]
    pub model_version: Option<String>,

    #[arg(long = "mdf_files", alias = "mdf-files", required = true, num_args = 1..)]
    pub mdf_files: Vec<PathBuf>,

    #[arg(long = "output_file_path", alias = "output-file-path")]
    pub output_file_path: PathBuf,

    #[arg(long)]
    pub author: Option<String>,

    /// Stamped on created entities as `_commit`. Defaults to `<handle>_<version>`.
    #[arg(long)]
    pub commit: Option<String>,

    /// Mark this version as the model's latest.
    #[arg(long = "latest_version", alias = "latest-version")]
    pub latest_version: bool,

    #[arg(long = "add_rollback", alias = "add-rollback")]
    pub add_rollback: bool,

    /// MDF files of the prior version; switches to incremental emission.
    #[arg(long = "baseline_mdf_files", alias = "baseline-mdf-files", num_args = 1..)]
    pub baseline_mdf_files: Vec<PathBuf>,

    /// Emit terms (and their tags) only.
    #[arg(long = "terms_only", alias = "terms-only")]
    pub terms_only: bool,

    /// Skip the leading uniqueness-constraint statements.
    #[arg(long = "no_constraints", alias = "no-constraints")]
    pub no_constraints: bool,

    #[arg(long = "allow_external_terms", alias = "allow-external-terms")]
    pub allow_external_terms: bool,

    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// RFC 3339 creation time recorded in the changeset, or `now`. Omitted by
    /// default so identical inputs give identical output.
    #[arg(long)]
    pub timestamp: Option<String>,
}

pub fn parse_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some("now") => Ok(Some(Utc::now())),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .with_context(|| format!("invalid --timestamp `{s}` (expected RFC 3339 or `now`)")),
    }
}

fn load(paths: &[PathBuf], handle: Option<&str>, version: Option<&str>, allow_external_terms: bool) -> Result<Model> {
    let target = ModelTarget {
        handle: handle.map(str::to_string),
        version: version.map(str::to_string),
    };
    let options = ParseOptions {
        allow_external_terms,
    };
    let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    load_model(paths, &target, &options)
        .with_context(|| format!("failed to load MDF files [{}]", names.join(", ")))
}

fn resolve(model: &Model, baseline: Option<&ModelGraph>) -> Result<ModelGraph> {
    build_graph(model, baseline)
        .with_context(|| format!("failed to resolve model {} {}", model.handle, model.version))
}

pub fn cmd_make_changelog(args: &MakeChangelogArgs, config: &ToolConfig) -> Result<()> {
    let format = config.output_format(args.format)?;
    let created_at = parse_timestamp(args.timestamp.as_deref())?;

    let baseline = if args.baseline_mdf_files.is_empty() {
        None
    } else {
        let base = load(
            &args.baseline_mdf_files,
            Some(&args.model_handle),
            None,
            args.allow_external_terms,
        )
        .context("baseline")?;
        Some(resolve(&base, None)?)
    };

    let model = load(
        &args.mdf_files,
        Some(&args.model_handle),
        args.model_version.as_deref(),
        args.allow_external_terms,
    )?;
    let graph = resolve(&model, baseline.as_ref())?;

    let options = EmitOptions {
        author: config.author(args.author.as_deref()),
        source_commit: args.commit.clone(),
        mark_latest_version: args.latest_version,
        include_rollback: args.add_rollback,
        include_constraints: !args.no_constraints,
        terms_only: args.terms_only,
        created_at,
    };
    let emission = emit_changeset(&graph, baseline.as_ref(), &options)?;
    write_changeset(&emission.changeset, format, &args.output_file_path)?;

    let cs = &emission.changeset;
    let report = &emission.report;
    println!(
        "{} {} ({}, {} statements)",
        "wrote".green().bold(),
        args.output_file_path.display().to_string().bold(),
        cs.kind.to_string().cyan(),
        cs.len()
    );
    println!("  Changeset: {}", cs.id.cyan());
    println!("  Digest: {}", cs.digest);
    println!(
        "  Entities: {} added, {} changed, {} unchanged",
        report.added.len(),
        report.changed.len(),
        report.unchanged.len()
    );
    if !report.removed.is_empty() {
        println!(
            "  {} {} entities absent from this version (not deleted):",
            "warning:".yellow().bold(),
            report.removed.len()
        );
        for key in &report.removed {
            println!("    {}", key.to_string().yellow());
        }
    }
    Ok(())
}

pub fn cmd_validate(
    mdf_files: &[PathBuf],
    handle: Option<&str>,
    version: Option<&str>,
    allow_external_terms: bool,
) -> Result<()> {
    println!("{} {} MDF file(s)", "Validating".green().bold(), mdf_files.len());
    let model = load(mdf_files, handle, version, allow_external_terms)?;
    let graph = resolve(&model, None)?;

    println!("  Model: {} {}", graph.handle.cyan(), graph.version.to_string().cyan());
    println!("  Nodes: {}", graph.nodes.len());
    println!("  Relationships: {}", graph.relationships.len());
    println!("  Properties: {}", graph.properties.len());
    println!("  Terms: {}", graph.terms.len());
    println!("  Natural keys: {}", graph.natural_keys().len());
    println!("{}", "Valid.".green());
    Ok(())
}

pub fn cmd_bootstrap(
    output: &Path,
    author: Option<&str>,
    format: Option<OutputFormat>,
    config: &ToolConfig,
) -> Result<()> {
    let format = config.output_format(format)?;
    let cs = bootstrap_changeset(&config.author(author), None);
    write_changeset(&cs, format, output)?;
    println!(
        "{} {} ({} statements)",
        "wrote".green().bold(),
        output.display().to_string().bold(),
        cs.len()
    );
    Ok(())
}

pub fn cmd_renumber(input: &Path, start: u32, output: Option<&PathBuf>) -> Result<()> {
    if start == 0 {
        return Err(anyhow!("--start must be at least 1"));
    }
    let xml = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let renumbered = renumber_changelog(&xml, start)
        .with_context(|| format!("failed to renumber {}", input.display()))?;
    let out = output.map(PathBuf::as_path).unwrap_or(input);
    write_atomic(out, &renumbered.xml)?;
    println!(
        "{} {} (first id {}, next id {})",
        "wrote".green().bold(),
        out.display().to_string().bold(),
        start,
        renumbered.next_id
    );
    Ok(())
}
