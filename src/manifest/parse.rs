//! Best-effort static parse of JavaScript/TypeScript sources.
//!
//! A lightweight scan checks that strings, comments, template literals and
//! bracket pairs are well formed; pattern extraction then recovers import and
//! export edges. Anything the scan cannot make sense of yields
//! [`ParseOutcome::Unparsed`] and the file keeps a minimal record.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::models::{FileMetadata, ImportEdge};

/// Extensions treated as scripts.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?(?:([\w*{}\s,$]+?)\s+from\s+)?['"]([^'"\n]+)['"]"#)
        .expect("import pattern is valid")
});

static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("dynamic import pattern is valid")
});

static EXPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+default\s+(?:async\s+)?(?:function\*?\s*|class\s+)?([A-Za-z_$][\w$]*)?")
        .expect("default export pattern is valid")
});

static EXPORT_NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+(?:async\s+)?(?:const|let|var|function\*?|class)\s+([A-Za-z_$][\w$]*)")
        .expect("named export pattern is valid")
});

static EXPORT_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s*\{([^}]*)\}").expect("export list pattern is valid")
});

static JSX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</[A-Za-z][\w.]*\s*>|/>|<>|</>").expect("jsx pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected '{found}' on line {line}")]
    UnexpectedCloser { found: char, line: usize },

    #[error("'{opener}' opened on line {line} is never closed")]
    Unclosed { opener: char, line: usize },

    #[error("unterminated {what} starting on line {line}")]
    Unterminated { what: &'static str, line: usize },
}

/// Result of a best-effort parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(FileMetadata),
    Unparsed(ParseError),
}

pub fn is_script(path: &str) -> bool {
    super::enumerate::extension(path).is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

pub fn parse_source(content: &str) -> ParseOutcome {
    if let Err(e) = check_structure(content) {
        return ParseOutcome::Unparsed(e);
    }

    let mut imports: Vec<ImportEdge> = IMPORT
        .captures_iter(content)
        .map(|caps| ImportEdge {
            source: caps[2].to_string(),
            specifiers: caps
                .get(1)
                .map(|clause| import_specifiers(clause.as_str()))
                .unwrap_or_default(),
            resolved: None,
        })
        .collect();
    imports.extend(DYNAMIC_IMPORT.captures_iter(content).map(|caps| ImportEdge {
        source: caps[1].to_string(),
        specifiers: Vec::new(),
        resolved: None,
    }));

    let default_export = EXPORT_DEFAULT.captures(content).map(|caps| {
        caps.get(1)
            .map(|name| name.as_str().to_string())
            .unwrap_or_else(|| "default".to_string())
    });

    let mut exports: Vec<String> = EXPORT_NAMED
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect();
    for caps in EXPORT_LIST.captures_iter(content) {
        exports.extend(binding_list(&caps[1]));
    }
    exports.dedup();

    ParseOutcome::Parsed(FileMetadata {
        imports,
        exports,
        default_export,
        has_jsx: JSX.is_match(content),
    })
}

/// Names bound by an import clause such as `React, { useState as useS } `.
fn import_specifiers(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let (outside, inside) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => (
            format!("{}{}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    for part in outside.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.strip_prefix('*') {
            Some(rest) => {
                if let Some(alias) = rest.trim().strip_prefix("as") {
                    names.push(alias.trim().to_string());
                }
            }
            None => names.push(part.to_string()),
        }
    }
    if let Some(inside) = inside {
        names.extend(binding_list(inside));
    }
    names
}

/// Local names from a `{ a, b as c }` list.
fn binding_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once(" as ") {
            Some((_, alias)) => alias.trim().to_string(),
            None => p.trim_start_matches("type ").to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Open(char, usize),
    Template(usize),
    TemplateExpr,
}

/// Verify strings, comments, template literals and brackets are balanced.
fn check_structure(content: &str) -> Result<(), ParseError> {
    let chars: Vec<char> = content.chars().collect();
    let mut stack: Vec<Frame> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c == '\n' {
            line += 1;
        }

        if let Some(Frame::Template(_)) = stack.last() {
            match (c, next) {
                ('\\', _) => i += 1,
                ('`', _) => {
                    stack.pop();
                }
                ('$', Some('{')) => {
                    stack.push(Frame::TemplateExpr);
                    i += 1;
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match (c, next) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ('/', Some('*')) => {
                let start = line;
                i += 2;
                loop {
                    match (chars.get(i), chars.get(i + 1)) {
                        (Some('*'), Some('/')) => {
                            i += 1;
                            break;
                        }
                        (Some('\n'), _) => line += 1,
                        (None, _) => {
                            return Err(ParseError::Unterminated {
                                what: "block comment",
                                line: start,
                            })
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            ('\'' | '"', _) if starts_string(&chars, i) => {
                // Quoted strings end at their closing quote or the line end.
                i += 1;
                while i < chars.len() && chars[i] != c && chars[i] != '\n' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if chars.get(i) == Some(&'\n') {
                    continue;
                }
            }
            ('`', _) => stack.push(Frame::Template(line)),
            ('(' | '[' | '{', _) => stack.push(Frame::Open(c, line)),
            (')' | ']' | '}', _) => match stack.last() {
                Some(Frame::TemplateExpr) if c == '}' => {
                    stack.pop();
                }
                Some(Frame::Open(open, _)) if closes(*open, c) => {
                    stack.pop();
                }
                _ => return Err(ParseError::UnexpectedCloser { found: c, line }),
            },
            _ => {}
        }
        i += 1;
    }

    match stack.last() {
        None => Ok(()),
        Some(Frame::Open(opener, line)) => Err(ParseError::Unclosed {
            opener: *opener,
            line: *line,
        }),
        Some(Frame::Template(line)) => Err(ParseError::Unterminated {
            what: "template literal",
            line: *line,
        }),
        Some(Frame::TemplateExpr) => Err(ParseError::Unclosed {
            opener: '{',
            line,
        }),
    }
}

/// A quote directly after a letter or digit is an apostrophe in JSX text.
fn starts_string(chars: &[char], i: usize) -> bool {
    i == 0 || !chars[i - 1].is_alphanumeric()
}

fn closes(open: char, close: char) -> bool {
    matches!((open, close), ('(', ')') | ('[', ']') | ('{', '}'))
}
