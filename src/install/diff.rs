//! Exact-name dependency diff against `package.json`.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{package_name, InstallRequest};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    dependencies: Map<String, Value>,
    #[serde(default)]
    dev_dependencies: Map<String, Value>,
}

/// Names listed in `dependencies` and `devDependencies`.
///
/// A malformed manifest counts as having nothing installed.
pub fn installed_packages(package_json: &str) -> BTreeSet<String> {
    match serde_json::from_str::<PackageJson>(package_json) {
        Ok(manifest) => manifest
            .dependencies
            .keys()
            .chain(manifest.dev_dependencies.keys())
            .cloned()
            .collect(),
        Err(e) => {
            tracing::warn!("Could not read package.json, assuming no dependencies: {}", e);
            BTreeSet::new()
        }
    }
}

/// Requested specs split by whether their name is already a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyDiff {
    pub satisfied: Vec<String>,
    pub missing: Vec<String>,
}

/// Partition by exact name. Version suffixes are ignored for the comparison;
/// no range resolution happens.
pub fn partition(request: &InstallRequest, installed: &BTreeSet<String>) -> DependencyDiff {
    let mut diff = DependencyDiff::default();
    for spec in request.packages() {
        if installed.contains(package_name(spec)) {
            diff.satisfied.push(spec.clone());
        } else {
            diff.missing.push(spec.clone());
        }
    }
    diff
}
