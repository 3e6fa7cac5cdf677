//! Changeset output formats and atomic file writes.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::liquibase::to_liquibase_xml;
use crate::statement::Changeset;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed changelog: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
    Cypher,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Cypher => "cypher",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Cypher => "cypher",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" | "liquibase" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            "cypher" | "cql" => Ok(Self::Cypher),
            other => Err(format!("unknown output format `{other}` (xml, json, cypher)")),
        }
    }
}

pub fn render_changeset(changeset: &Changeset, format: OutputFormat) -> Result<String, WriteError> {
    match format {
        OutputFormat::Xml => to_liquibase_xml(changeset),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(changeset)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Cypher => Ok(to_cypher_script(changeset)),
    }
}

/// One statement per block, each preceded by a comment naming its id,
/// category and digest.
pub fn to_cypher_script(changeset: &Changeset) -> String {
    let mut out = format!(
        "// {} ({}) commit={} digest={}\n",
        changeset.id, changeset.kind, changeset.source_commit, changeset.digest
    );
    for stmt in &changeset.statements {
        out.push_str(&format!(
            "\n// {} {} {}\n{};\n",
            stmt.id,
            stmt.category.as_str(),
            stmt.digest,
            stmt.cypher
        ));
    }
    out
}

/// Write through a temp file in the destination directory, then rename, so a
/// reader never observes a partial changelog.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(contents.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

pub fn write_changeset(
    changeset: &Changeset,
    format: OutputFormat,
    path: &Path,
) -> Result<(), WriteError> {
    let text = render_changeset(changeset, format)?;
    write_atomic(path, &text)?;
    tracing::info!(
        path = %path.display(),
        changeset = %changeset.id,
        statements = changeset.len(),
        format = %format,
        "wrote changeset"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Category, ChangesetBuilder, ChangesetKind, MutationOp};

    fn sample() -> Changeset {
        let mut b = ChangesetBuilder::new(ChangesetKind::Latest, None, "me", "c");
        b.push(
            Category::Model,
            MutationOp::MarkLatest { handle: "M".into(), version: "2".into() },
        );
        b.finish()
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("XML".parse::<OutputFormat>(), Ok(OutputFormat::Xml));
        assert_eq!("cypher".parse::<OutputFormat>(), Ok(OutputFormat::Cypher));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn cypher_script_terminates_statements() {
        let script = to_cypher_script(&sample());
        assert!(script.starts_with("// mdb_latest (latest)"));
        assert!(script.contains("// 1 model sha256:"));
        assert!(script.trim_end().ends_with("SET n0.is_latest_version = true;"));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let cs = sample();
        let json = render_changeset(&cs, OutputFormat::Json).unwrap();
        let back: Changeset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cs);
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("changelog.xml");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
