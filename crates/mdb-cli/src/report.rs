//! Structured error reporting and exit codes.

use std::process::ExitCode;

use colored::Colorize;
use mdb_changelog::{EmitError, OrderingViolation, WriteError};
use mdb_mdf::{ConflictError, MdfError, SchemaError};
use mdb_model::{GraphError, UnresolvedReferenceError};
use mdb_terms::ReconcileError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ErrorFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Conflict,
    Unresolved,
    SourceUnavailable,
    Baseline,
    Ordering,
    Write,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Conflict => "conflict",
            Self::Unresolved => "unresolved",
            Self::SourceUnavailable => "source_unavailable",
            Self::Baseline => "baseline",
            Self::Ordering => "ordering",
            Self::Write => "write",
            Self::Other => "error",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Schema => 2,
            Self::Conflict => 3,
            Self::Unresolved => 4,
            Self::SourceUnavailable => 5,
            Self::Baseline | Self::Ordering | Self::Write | Self::Other => 1,
        }
    }
}

fn graph_kind(e: &GraphError) -> ErrorKind {
    match e {
        GraphError::Unresolved(_) => ErrorKind::Unresolved,
        GraphError::Conflict(_) => ErrorKind::Conflict,
        GraphError::BaselineMismatch { .. } => ErrorKind::Baseline,
    }
}

/// The first typed error in the chain decides the kind.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<MdfError>() {
            return match e {
                MdfError::Schema(_) => ErrorKind::Schema,
                MdfError::Conflict(_) => ErrorKind::Conflict,
                MdfError::Io { .. } => ErrorKind::Other,
            };
        }
        if cause.is::<SchemaError>() {
            return ErrorKind::Schema;
        }
        if cause.is::<ConflictError>() {
            return ErrorKind::Conflict;
        }
        if cause.is::<UnresolvedReferenceError>() {
            return ErrorKind::Unresolved;
        }
        if let Some(e) = cause.downcast_ref::<GraphError>() {
            return graph_kind(e);
        }
        if let Some(EmitError::Graph(e)) = cause.downcast_ref::<EmitError>() {
            return graph_kind(e);
        }
        if let Some(e) = cause.downcast_ref::<ReconcileError>() {
            return match e {
                ReconcileError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
                _ => ErrorKind::Other,
            };
        }
        if cause.is::<OrderingViolation>() {
            return ErrorKind::Ordering;
        }
        if cause.is::<WriteError>() {
            return ErrorKind::Write;
        }
    }
    ErrorKind::Other
}

#[derive(Debug, Serialize)]
struct JsonError<'a> {
    kind: &'a str,
    message: String,
    chain: Vec<String>,
}

/// Print `err` to stderr and return the matching exit code.
pub fn report(err: &anyhow::Error, format: ErrorFormat) -> ExitCode {
    let kind = classify(err);
    match format {
        ErrorFormat::Text => {
            eprintln!(
                "{} {}",
                format!("error[{}]:", kind.as_str()).red().bold(),
                err
            );
            for cause in err.chain().skip(1) {
                eprintln!("  {} {}", "caused by:".yellow(), cause);
            }
        }
        ErrorFormat::Json => {
            let body = JsonError {
                kind: kind.as_str(),
                message: err.to_string(),
                chain: err.chain().skip(1).map(|c| c.to_string()).collect(),
            };
            match serde_json::to_string(&body) {
                Ok(line) => eprintln!("{line}"),
                Err(_) => eprintln!("error[{}]: {}", kind.as_str(), err),
            }
        }
    }
    ExitCode::from(kind.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kinds_survive_context() {
        let err = Err::<(), _>(MdfError::from(SchemaError::new("Nodes.a", "Props", "bad")))
            .context("loading model")
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Schema);
        assert_eq!(classify(&err).exit_code(), 2);

        let unresolved = UnresolvedReferenceError {
            referrer: "Nodes.a".into(),
            target_kind: "PropDefinition",
            target: "p".into(),
        };
        let err = anyhow::Error::from(EmitError::Graph(GraphError::Unresolved(unresolved)));
        assert_eq!(classify(&err), ErrorKind::Unresolved);

        assert_eq!(classify(&anyhow::anyhow!("plain")), ErrorKind::Other);
    }
}
