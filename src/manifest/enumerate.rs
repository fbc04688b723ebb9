//! Remote enumeration of the project tree.
//!
//! The enumeration script prints one tab-separated record per file:
//!
//! ```text
//! FILE <path> <size> <mtime> <base64 content>
//! SKIP <path> <size>
//! ```
//!
//! Records are re-validated here, so a provider that ignores the filters in
//! the script still yields a well-formed manifest.

use base64::Engine;
use chrono::{DateTime, Utc};

use crate::provider::shell_quote;

/// Extensions read into the manifest.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "mjs", "cjs", "css", "scss", "json", "html",
];

/// Directories never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".next",
    ".cache",
    "coverage",
];

/// Upper bound on files read in one enumeration.
pub const MAX_FILES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub relative_path: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub files: Vec<RawFile>,
    pub warnings: Vec<String>,
}

pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(ext)
    }
}

fn is_recognized(path: &str) -> bool {
    extension(path).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn is_excluded(path: &str) -> bool {
    path.split('/').any(|part| EXCLUDED_DIRS.contains(&part))
}

pub fn enumeration_script(project_dir: &str, max_file_bytes: u64) -> String {
    let prune = EXCLUDED_DIRS
        .iter()
        .map(|d| format!("-name {}", shell_quote(d)))
        .collect::<Vec<_>>()
        .join(" -o ");
    let names = SOURCE_EXTENSIONS
        .iter()
        .map(|ext| format!("-name '*.{}'", ext))
        .collect::<Vec<_>>()
        .join(" -o ");

    format!(
        r#"cd {dir} 2>/dev/null || exit 0
find . \( {prune} \) -prune -o -type f \( {names} \) -print 2>/dev/null | sort | head -n {limit} | while IFS= read -r f; do
  size=$(stat -c %s "$f" 2>/dev/null || echo 0)
  mtime=$(stat -c %Y "$f" 2>/dev/null || echo 0)
  if [ "$size" -gt {max} ]; then
    printf 'SKIP\t%s\t%s\n' "${{f#./}}" "$size"
  else
    printf 'FILE\t%s\t%s\t%s\t%s\n' "${{f#./}}" "$size" "$mtime" "$(base64 -w0 "$f")"
  fi
done"#,
        dir = shell_quote(project_dir),
        prune = prune,
        names = names,
        limit = MAX_FILES + 1,
        max = max_file_bytes,
    )
}

/// Parse enumeration output into files and warnings.
pub fn parse_enumeration(stdout: &str, max_file_bytes: u64) -> Enumeration {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut result = Enumeration::default();
    let mut seen = 0usize;

    for line in stdout.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        let (tag, path) = match fields.as_slice() {
            [tag, path, ..] => (*tag, path.trim_start_matches("./")),
            _ => continue,
        };
        if !matches!(tag, "FILE" | "SKIP") || is_excluded(path) || !is_recognized(path) {
            continue;
        }

        seen += 1;
        if seen > MAX_FILES {
            result.warnings.push(format!(
                "File limit of {} reached; remaining files were not read",
                MAX_FILES
            ));
            break;
        }

        let size: u64 = fields.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
        if tag == "SKIP" || size > max_file_bytes {
            result.warnings.push(oversized(path, size, max_file_bytes));
            continue;
        }

        let [_, _, _, mtime, encoded] = fields.as_slice() else {
            result
                .warnings
                .push(format!("Skipped {} (malformed enumeration record)", path));
            continue;
        };

        let content = match engine
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        {
            Some(content) => content,
            None => {
                result
                    .warnings
                    .push(format!("Skipped {} (content is not UTF-8 text)", path));
                continue;
            }
        };
        if content.len() as u64 > max_file_bytes {
            result
                .warnings
                .push(oversized(path, content.len() as u64, max_file_bytes));
            continue;
        }

        let modified_at = mtime
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        result.files.push(RawFile {
            relative_path: path.to_string(),
            size: content.len() as u64,
            modified_at,
            content,
        });
    }

    result
}

fn oversized(path: &str, size: u64, max: u64) -> String {
    format!(
        "Skipped {} ({} bytes exceeds the {} byte limit)",
        path, size, max
    )
}
