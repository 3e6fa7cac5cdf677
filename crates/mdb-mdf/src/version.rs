//! Comparable model versions.
//!
//! Accepted shapes: `1`, `1.2`, `1.2.3`, optionally prefixed with `v` and
//! followed by a `-prerelease` or `+build` suffix. Missing components compare
//! as zero, and a prerelease sorts before the plain release.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SchemaError;

const VERSION_PATTERN: &str = r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:([-+])([0-9A-Za-z.\-]+))?$";

fn version_regex() -> Result<&'static Regex, &'static regex::Error> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERSION_PATTERN)).as_ref()
}

#[derive(Debug, Clone)]
pub struct ModelVersion {
    raw: String,
    parts: [u64; 3],
    prerelease: Option<String>,
}

impl ModelVersion {
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        let invalid = |message: String| SchemaError::new("(model)", "Version", message);
        let re = version_regex().map_err(|e| invalid(e.to_string()))?;
        let caps = re
            .captures(raw.trim())
            .ok_or_else(|| invalid(format!("`{raw}` is not a comparable version")))?;

        let mut parts = [0u64; 3];
        for (slot, idx) in parts.iter_mut().zip(1..=3) {
            if let Some(m) = caps.get(idx) {
                *slot = m
                    .as_str()
                    .parse()
                    .map_err(|_| invalid(format!("component `{}` out of range", m.as_str())))?;
            }
        }
        let prerelease = match (caps.get(4), caps.get(5)) {
            (Some(sep), Some(rest)) if sep.as_str() == "-" => Some(rest.as_str().to_string()),
            _ => None,
        };

        Ok(Self {
            raw: raw.trim().to_string(),
            parts,
            prerelease,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for ModelVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ModelVersion {}

impl PartialOrd for ModelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
            // "1.2" and "1.2.0" order together but stay distinct versions.
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl Serialize for ModelVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ModelVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ModelVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}
