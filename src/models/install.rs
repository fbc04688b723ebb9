use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DevboxError;

/// npm-style package name with an optional `@version` suffix.
static PACKAGE_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[A-Za-z0-9][A-Za-z0-9._~-]*/)?[A-Za-z0-9][A-Za-z0-9._~-]*(@[A-Za-z0-9._^~<>=*-]+)?$")
        .expect("package spec pattern is valid")
});

/// Body of an install request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallInput {
    pub packages: Vec<String>,
    /// Sandbox to reconnect to when no session is current.
    #[serde(default)]
    pub sandbox_id: Option<String>,
}

/// A deduplicated, trimmed, non-empty set of package specs.
///
/// Order of first appearance is preserved so progress messages read the way
/// the caller wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    packages: Vec<String>,
}

impl InstallRequest {
    /// Normalize raw package specs. Rejects an empty result and anything that
    /// is not a package name. Specs are deduplicated by package name.
    pub fn normalize<I, S>(raw: I) -> Result<Self, DevboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut packages = Vec::new();

        for spec in raw {
            let spec = spec.as_ref().trim();
            if spec.is_empty() {
                continue;
            }
            if !PACKAGE_SPEC.is_match(spec) {
                return Err(DevboxError::InvalidRequest(format!(
                    "'{}' is not a valid package name",
                    spec
                )));
            }
            // First spec for a name wins; `lodash@4` after `lodash` is dropped.
            if seen.insert(package_name(spec).to_string()) {
                packages.push(spec.to_string());
            }
        }

        if packages.is_empty() {
            return Err(DevboxError::InvalidRequest(
                "at least one package name is required".to_string(),
            ));
        }

        Ok(Self { packages })
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Strip a trailing `@version` from a package spec, keeping any scope.
///
/// `@scope/pkg@1.2.0` becomes `@scope/pkg`, `lodash@4` becomes `lodash`.
pub fn package_name(spec: &str) -> &str {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(at) => &spec[..search_from + at],
        None => spec,
    }
}

/// Type of a progress event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallEventKind {
    Start,
    Status,
    Info,
    Output,
    Warning,
    Error,
    Success,
    Complete,
}

/// One frame of an installation's progress stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallEvent {
    /// Position in the stream, starting at zero.
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: InstallEventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl InstallEvent {
    /// Whether this kind of event can close a stream. `error` events may also
    /// appear mid-stream, so only the last event of a stream is authoritative.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            InstallEventKind::Complete | InstallEventKind::Error
        )
    }
}
