use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a file participates in the project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Component,
    Style,
    Entry,
    #[default]
    Utility,
}

/// One `import` statement found in a source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportEdge {
    /// The module specifier as written.
    pub source: String,
    /// Bound names (default, named and namespace).
    pub specifiers: Vec<String>,
    /// Absolute path of the imported file when the import is local and resolves.
    pub resolved: Option<String>,
}

impl ImportEdge {
    pub fn is_local(&self) -> bool {
        self.source.starts_with("./") || self.source.starts_with("../") || self.source.starts_with("@/")
    }
}

/// Metadata recovered from a successful static parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub imports: Vec<ImportEdge>,
    pub exports: Vec<String>,
    pub default_export: Option<String>,
    pub has_jsx: bool,
}

/// A file in the session's project tree.
///
/// Produced fresh on every manifest build and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub relative_path: String,
    pub absolute_path: String,
    pub content: String,
    pub kind: FileKind,
    pub modified_at: DateTime<Utc>,
    /// Absent when the file is not a script or could not be parsed.
    pub metadata: Option<FileMetadata>,
}

/// Directed import graph keyed by absolute path.
///
/// Mutual imports are normal in real projects, so edges may form cycles.
/// Every traversal carries its own visited set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node even if it has no outgoing edges.
    pub fn add_node(&mut self, path: impl Into<String>) {
        self.edges.entry(path.into()).or_default();
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let to = to.into();
        self.edges.entry(to.clone()).or_default();
        self.edges.entry(from.into()).or_default().insert(to);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Files directly imported by `path`.
    pub fn dependencies_of(&self, path: &str) -> Vec<&str> {
        self.edges
            .get(path)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Files that directly import `path`.
    pub fn dependents_of(&self, path: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(path))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Every file transitively imported from `start`, excluding `start` itself
    /// unless it is reachable through a cycle.
    pub fn reachable_from(&self, start: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<&str> = self.dependencies_of(start);

        while let Some(node) = stack.pop() {
            if !visited.insert(node.to_string()) {
                continue;
            }
            stack.extend(self.dependencies_of(node));
        }
        visited
    }
}

/// Where a route entry came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// A route declaration found in source text.
    Declared,
    /// A file under a `pages` directory.
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,
    /// Component name for declared routes, file path for filesystem routes.
    pub target: String,
    /// Absolute path of the file the route was found in.
    pub file: String,
    pub source: RouteSource,
}

/// Immutable snapshot of a session's project tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub files: BTreeMap<String, FileRecord>,
    pub entry_point: Option<String>,
    pub styles: Vec<String>,
    pub imports: ImportGraph,
    pub routes: Vec<Route>,
    /// Human-readable directory listing.
    pub tree: String,
    pub warnings: Vec<String>,
    pub built_at: DateTime<Utc>,
    pub is_demo: bool,
}

impl Manifest {
    /// An empty snapshot, used for demo sessions.
    pub fn empty(is_demo: bool) -> Self {
        Self {
            files: BTreeMap::new(),
            entry_point: None,
            styles: Vec::new(),
            imports: ImportGraph::new(),
            routes: Vec::new(),
            tree: String::new(),
            warnings: Vec::new(),
            built_at: Utc::now(),
            is_demo,
        }
    }

    pub fn file(&self, absolute_path: &str) -> Option<&FileRecord> {
        self.files.get(absolute_path)
    }

    pub fn components(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values().filter(|f| f.kind == FileKind::Component)
    }
}
