//! Route extraction.
//!
//! Two independent strategies feed one table and duplicates are kept:
//! route declarations found in source text, and files under a `pages`
//! directory.

use std::sync::LazyLock;

use regex::Regex;

use super::parse::SCRIPT_EXTENSIONS;
use crate::models::{Route, RouteSource};

/// How far past a route's `path` to look for its target.
const DECLARATION_WINDOW: usize = 300;

static JSX_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Route\b").expect("route tag pattern is valid"));

static JSX_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bpath\s*=\s*\{?\s*["'`]([^"'`]+)["'`]"#).expect("route path pattern is valid")
});

static JSX_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:element\s*=\s*\{\s*<\s*([A-Z][\w.]*)|[Cc]omponent\s*=\s*\{\s*([A-Z][\w.]*))")
        .expect("route target pattern is valid")
});

static OBJECT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bpath\s*:\s*["'`]([^"'`]+)["'`]"#).expect("object path pattern is valid")
});

static OBJECT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:element\s*:\s*<\s*([A-Z][\w.]*)|[Cc]omponent\s*:\s*([A-Z][\w.]*))")
        .expect("object target pattern is valid")
});

static ROUTE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\broute\(\s*["'`]([^"'`]+)["'`]\s*,\s*["'`]?([\w./-]+)"#)
        .expect("route call pattern is valid")
});

/// Routes declared in a file's source text.
pub fn declared_routes(content: &str, file: &str) -> Vec<Route> {
    let mut routes = Vec::new();
    let declared = |path: &str, target: &str| Route {
        path: path.to_string(),
        target: target.to_string(),
        file: file.to_string(),
        source: RouteSource::Declared,
    };

    // <Route path="/about" element={<About />} />
    let tags: Vec<usize> = JSX_ROUTE.find_iter(content).map(|m| m.start()).collect();
    for (idx, &start) in tags.iter().enumerate() {
        let end = tags
            .get(idx + 1)
            .copied()
            .unwrap_or(content.len())
            .min(floor_char_boundary(content, start + DECLARATION_WINDOW));
        let tag = &content[start..end];
        if let (Some(path), Some(target)) = (JSX_PATH.captures(tag), JSX_TARGET.captures(tag)) {
            routes.push(declared(&path[1], first_group(&target)));
        }
    }

    // createBrowserRouter([{ path: '/about', element: <About /> }])
    let paths: Vec<_> = OBJECT_PATH.captures_iter(content).collect();
    for (idx, caps) in paths.iter().enumerate() {
        let whole = caps.get(0).expect("group 0 always matches");
        let end = paths
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len())
            .min(floor_char_boundary(content, whole.end() + DECLARATION_WINDOW));
        if let Some(target) = OBJECT_TARGET.captures(&content[whole.end()..end]) {
            routes.push(declared(&caps[1], first_group(&target)));
        }
    }

    // route('/about', 'routes/about.tsx')
    for caps in ROUTE_CALL.captures_iter(content) {
        routes.push(declared(&caps[1], &caps[2]));
    }

    routes
}

/// Route implied by a file's location under a `pages` directory.
///
/// `pages/about.jsx` maps to `/about`, `pages/index.jsx` to `/`,
/// `src/pages/blog/index.tsx` to `/blog`. Framework files whose name starts
/// with `_` are not routes.
pub fn filesystem_route(relative_path: &str) -> Option<String> {
    let rest = if let Some(rest) = relative_path.strip_prefix("pages/") {
        rest
    } else {
        let idx = relative_path.find("/pages/")?;
        &relative_path[idx + "/pages/".len()..]
    };

    let (stem, ext) = rest.rsplit_once('.')?;
    if !SCRIPT_EXTENSIONS.contains(&ext) {
        return None;
    }
    let file_name = stem.rsplit('/').next().unwrap_or(stem);
    if file_name.starts_with('_') {
        return None;
    }

    let route = match stem.strip_suffix("index") {
        Some(prefix) if prefix.is_empty() || prefix.ends_with('/') => prefix.trim_end_matches('/'),
        _ => stem,
    };
    Some(format!("/{}", route))
}

fn first_group<'a>(caps: &regex::Captures<'a>) -> &'a str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
