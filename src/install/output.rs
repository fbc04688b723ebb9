//! Classification of installer output lines.

use crate::models::InstallEventKind;
use crate::provider::{OutputLine, OutputStream};

const ERROR_MARKER: &str = "ERR!";
const CONFLICT_MARKERS: &[&str] = &["ERESOLVE", "peer dep", "conflicting peer"];

/// Event kind for one line of installer output, or None for blank lines.
pub fn classify(line: &OutputLine) -> Option<(InstallEventKind, bool)> {
    let text = line.text.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_ascii_lowercase();

    if text.contains(ERROR_MARKER) || lower.starts_with("error") {
        return Some((InstallEventKind::Error, false));
    }
    if CONFLICT_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_ascii_lowercase()))
    {
        return Some((InstallEventKind::Warning, true));
    }
    if text.contains("WARN") || lower.contains("warn ") || line.stream == OutputStream::Stderr {
        return Some((InstallEventKind::Warning, false));
    }
    Some((InstallEventKind::Output, false))
}
