//! Terminology snapshot sources.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::SourceError;
use crate::snapshot::TermSnapshot;

/// Yields the external view of a model version's terms.
#[async_trait]
pub trait TermSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_snapshot(&self, model: &str, version: &str) -> Result<TermSnapshot, SourceError>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct StaticTermSource {
    name: String,
    snapshots: BTreeMap<(String, String), TermSnapshot>,
}

impl StaticTermSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snapshots: BTreeMap::new(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: TermSnapshot) -> Self {
        self.snapshots
            .insert((snapshot.model.clone(), snapshot.version.clone()), snapshot);
        self
    }
}

#[async_trait]
impl TermSource for StaticTermSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_snapshot(&self, model: &str, version: &str) -> Result<TermSnapshot, SourceError> {
        self.snapshots
            .get(&(model.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::Invalid {
                source_name: self.name.clone(),
                message: format!("no snapshot for {model} {version}"),
            })
    }
}

// ============================================================================
// Snapshot directory
// ============================================================================

/// Reads `<dir>/<model>_<version>.json`, falling back to `<dir>/<model>.json`.
#[derive(Debug, Clone)]
pub struct FileTermSource {
    dir: PathBuf,
    name: String,
}

impl FileTermSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir.display().to_string();
        Self { dir, name }
    }

    pub fn candidates(&self, model: &str, version: &str) -> [PathBuf; 2] {
        [
            self.dir.join(format!("{model}_{version}.json")),
            self.dir.join(format!("{model}.json")),
        ]
    }

    async fn read(&self, path: &Path) -> Result<Option<String>, SourceError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SourceError::Unavailable {
                source_name: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl TermSource for FileTermSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_snapshot(&self, model: &str, version: &str) -> Result<TermSnapshot, SourceError> {
        for path in self.candidates(model, version) {
            let Some(text) = self.read(&path).await? else {
                continue;
            };
            tracing::debug!(path = %path.display(), "reading term snapshot");
            return serde_json::from_str(&text).map_err(|e| SourceError::Invalid {
                source_name: path.display().to_string(),
                message: e.to_string(),
            });
        }
        Err(SourceError::Invalid {
            source_name: self.name.clone(),
            message: format!("no snapshot file for {model} {version}"),
        })
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// `GET <base_url>/<model>/<version>` returning a JSON [`TermSnapshot`].
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTermSource {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpTermSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl TermSource for HttpTermSource {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch_snapshot(&self, model: &str, version: &str) -> Result<TermSnapshot, SourceError> {
        let url = format!("{}/{model}/{version}", self.base_url);
        let unavailable = |message: String| SourceError::Unavailable {
            source_name: url.clone(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::Invalid {
                source_name: url.clone(),
                message: format!("HTTP {status}"),
            });
        }

        response
            .json::<TermSnapshot>()
            .await
            .map_err(|e| SourceError::Invalid {
                source_name: url.clone(),
                message: e.to_string(),
            })
    }
}
