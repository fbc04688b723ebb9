//! File manifest of a session's project tree.
//!
//! A build enumerates the remote tree, parses each source file on a
//! best-effort basis and derives the entry point, stylesheets, import graph
//! and route table. Every build produces a new immutable [`Manifest`].

pub mod enumerate;
pub mod parse;
pub mod routes;
pub mod tree_render;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::DevboxError;
use crate::models::{FileKind, FileMetadata, FileRecord, ImportGraph, Manifest, Route, RouteSource};
use crate::provider::ProviderError;
use crate::session::Session;
use enumerate::Enumeration;
use parse::{ParseOutcome, SCRIPT_EXTENSIONS};

/// Conventional entry files, highest priority first.
pub const ENTRY_CANDIDATES: &[&str] = &[
    "src/main.jsx",
    "src/main.tsx",
    "src/main.js",
    "src/main.ts",
    "src/index.jsx",
    "src/index.tsx",
    "src/index.js",
    "src/index.ts",
    "src/App.jsx",
    "src/App.tsx",
    "src/App.js",
    "index.js",
];

const STYLE_EXTENSIONS: &[&str] = &["css", "scss"];

#[derive(Clone)]
pub struct ManifestBuilder {
    config: Arc<Config>,
}

impl ManifestBuilder {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Enumerate the session's project tree and build a fresh manifest.
    pub async fn build(&self, session: &Session) -> Result<Manifest, DevboxError> {
        if session.is_demo() {
            return Ok(Manifest::empty(true));
        }

        let script = enumerate::enumeration_script(session.project_dir(), self.config.max_file_bytes);
        let output = session
            .sandbox()
            .exec(&script, self.config.command_timeout)
            .await
            .map_err(DevboxError::Remote)?;
        if !output.success() {
            return Err(DevboxError::Remote(ProviderError::Server(format!(
                "enumeration exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            ))));
        }

        let enumeration = enumerate::parse_enumeration(&output.stdout, self.config.max_file_bytes);
        let manifest = assemble(session.project_dir(), enumeration);
        info!(
            "Built manifest for {}: {} files, {} routes, {} warnings",
            session.id(),
            manifest.files.len(),
            manifest.routes.len(),
            manifest.warnings.len()
        );
        Ok(manifest)
    }
}

/// Build a manifest from enumerated files.
pub fn assemble(project_dir: &str, enumeration: Enumeration) -> Manifest {
    let Enumeration { files, warnings } = enumeration;
    let known: BTreeSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
    let absolute = |relative: &str| format!("{}/{}", project_dir, relative);

    let entry = resolve_entry(&known);

    let mut records = BTreeMap::new();
    let mut imports = ImportGraph::new();
    let mut routes: Vec<Route> = Vec::new();

    for file in &files {
        let relative = file.relative_path.as_str();
        let path = absolute(relative);
        let mut metadata = None;

        if parse::is_script(relative) {
            imports.add_node(path.clone());

            match parse::parse_source(&file.content) {
                ParseOutcome::Parsed(mut parsed) => {
                    for import in parsed.imports.iter_mut().filter(|i| i.is_local()) {
                        if let Some(target) = resolve_import(relative, &import.source, &known) {
                            let target = absolute(&target);
                            imports.add_edge(path.clone(), target.clone());
                            import.resolved = Some(target);
                        }
                    }
                    metadata = Some(parsed);
                }
                ParseOutcome::Unparsed(e) => debug!("Keeping minimal record for {}: {}", relative, e),
            }

            routes.extend(routes::declared_routes(&file.content, &path));
            if let Some(route) = routes::filesystem_route(relative) {
                routes.push(Route {
                    path: route,
                    target: path.clone(),
                    file: path.clone(),
                    source: RouteSource::Filesystem,
                });
            }
        }

        let is_entry = entry.as_deref() == Some(relative);
        records.insert(
            path.clone(),
            FileRecord {
                relative_path: relative.to_string(),
                absolute_path: path,
                content: file.content.clone(),
                kind: classify(relative, is_entry, metadata.as_ref()),
                modified_at: file.modified_at,
                metadata,
            },
        );
    }

    let entry_point = entry.map(|e| absolute(&e));
    let styles = order_styles(&records, entry_point.as_deref());

    Manifest {
        files: records,
        entry_point,
        styles,
        imports,
        routes,
        tree: tree_render::render_tree(known.iter().copied()),
        warnings,
        built_at: chrono::Utc::now(),
        is_demo: false,
    }
}

/// First conventional entry filename present, in priority order.
pub fn resolve_entry(known: &BTreeSet<&str>) -> Option<String> {
    ENTRY_CANDIDATES
        .iter()
        .find(|candidate| known.contains(*candidate))
        .map(|candidate| candidate.to_string())
}

fn is_style(relative: &str) -> bool {
    enumerate::extension(relative).is_some_and(|ext| STYLE_EXTENSIONS.contains(&ext))
}

fn classify(relative: &str, is_entry: bool, metadata: Option<&FileMetadata>) -> FileKind {
    if is_entry {
        return FileKind::Entry;
    }
    if is_style(relative) {
        return FileKind::Style;
    }
    let Some(metadata) = metadata else {
        return FileKind::Utility;
    };

    let jsx_file = matches!(enumerate::extension(relative), Some("jsx" | "tsx"));
    let exports_component = metadata
        .exports
        .iter()
        .chain(metadata.default_export.iter())
        .any(|name| name.starts_with(|c: char| c.is_ascii_uppercase()));

    if metadata.has_jsx || (jsx_file && exports_component) {
        FileKind::Component
    } else {
        FileKind::Utility
    }
}

/// Stylesheets imported by the entry point first, in import order, then the
/// rest by path.
fn order_styles(records: &BTreeMap<String, FileRecord>, entry: Option<&str>) -> Vec<String> {
    let mut styles: Vec<String> = entry
        .and_then(|e| records.get(e))
        .and_then(|r| r.metadata.as_ref())
        .map(|m| {
            m.imports
                .iter()
                .filter_map(|i| i.resolved.clone())
                .filter(|p| records.get(p).is_some_and(|r| r.kind == FileKind::Style))
                .collect()
        })
        .unwrap_or_default();

    for record in records.values().filter(|r| r.kind == FileKind::Style) {
        if !styles.contains(&record.absolute_path) {
            styles.push(record.absolute_path.clone());
        }
    }
    styles
}

/// Resolve a local import to a known relative path.
fn resolve_import(from: &str, source: &str, known: &BTreeSet<&str>) -> Option<String> {
    let joined = match source.strip_prefix("@/") {
        Some(rest) => format!("src/{}", rest),
        None => {
            let dir = from.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            format!("{}/{}", dir, source)
        }
    };
    let base = normalize_path(&joined)?;

    let mut candidates = vec![base.clone()];
    candidates.extend(SCRIPT_EXTENSIONS.iter().map(|ext| format!("{}.{}", base, ext)));
    candidates.extend(SCRIPT_EXTENSIONS.iter().map(|ext| format!("{}/index.{}", base, ext)));

    candidates.into_iter().find(|c| known.contains(c.as_str()))
}

/// Collapse `.` and `..` segments. Returns None if the path climbs above the
/// project root.
fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_segments() {
        assert_eq!(normalize_path("src/components/../App").as_deref(), Some("src/App"));
        assert_eq!(normalize_path("/./src//main.jsx").as_deref(), Some("src/main.jsx"));
        assert_eq!(normalize_path("../outside"), None);
    }

    #[test]
    fn resolves_imports_by_extension_and_index() {
        let known: BTreeSet<&str> = [
            "src/App.jsx",
            "src/components/index.js",
            "src/index.css",
            "src/lib/api.ts",
        ]
        .into_iter()
        .collect();

        assert_eq!(
            resolve_import("src/main.jsx", "./App", &known).as_deref(),
            Some("src/App.jsx")
        );
        assert_eq!(
            resolve_import("src/main.jsx", "./components", &known).as_deref(),
            Some("src/components/index.js")
        );
        assert_eq!(
            resolve_import("src/main.jsx", "./index.css", &known).as_deref(),
            Some("src/index.css")
        );
        assert_eq!(
            resolve_import("src/components/index.js", "@/lib/api", &known).as_deref(),
            Some("src/lib/api.ts")
        );
        assert_eq!(resolve_import("src/main.jsx", "./Missing", &known), None);
    }

    #[test]
    fn entry_resolution_follows_priority() {
        let known: BTreeSet<&str> = ["src/App.jsx", "src/index.js", "src/main.tsx"]
            .into_iter()
            .collect();
        assert_eq!(resolve_entry(&known).as_deref(), Some("src/main.tsx"));

        let none: BTreeSet<&str> = ["lib/util.js"].into_iter().collect();
        assert_eq!(resolve_entry(&none), None);
    }

    #[test]
    fn classify_prefers_jsx_then_exports() {
        let jsx = FileMetadata {
            has_jsx: true,
            ..Default::default()
        };
        assert_eq!(classify("src/a.js", false, Some(&jsx)), FileKind::Component);

        let pascal = FileMetadata {
            default_export: Some("Card".to_string()),
            ..Default::default()
        };
        assert_eq!(classify("src/Card.tsx", false, Some(&pascal)), FileKind::Component);
        assert_eq!(classify("src/card.ts", false, Some(&pascal)), FileKind::Utility);

        assert_eq!(classify("src/index.css", false, None), FileKind::Style);
        assert_eq!(classify("src/broken.jsx", false, None), FileKind::Utility);
        assert_eq!(classify("src/main.jsx", true, Some(&jsx)), FileKind::Entry);
    }
}
