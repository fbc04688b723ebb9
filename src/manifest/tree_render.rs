//! ASCII rendering of the project tree.

use std::collections::BTreeMap;

/// Directories deeper than this are collapsed.
pub const MAX_DEPTH: usize = 4;

/// Entries shown per directory before summarizing the rest.
pub const MAX_ENTRIES: usize = 25;

#[derive(Debug, Default)]
struct DirNode {
    children: BTreeMap<String, DirNode>,
    is_file: bool,
}

impl DirNode {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.is_file = true;
    }

    fn count_files(&self) -> usize {
        usize::from(self.is_file) + self.children.values().map(DirNode::count_files).sum::<usize>()
    }
}

/// Render relative paths as a capped directory tree.
///
/// Example output:
/// ```text
/// ├── index.html
/// ├── package.json
/// └── src/
///     ├── App.jsx
///     └── main.jsx
/// ```
pub fn render_tree<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut root = DirNode::default();
    for path in paths {
        root.insert(path);
    }

    let mut output = String::new();
    render_children(&mut output, &root, "", 1);
    output
}

/// Render a directory's children, directories first.
fn render_children(output: &mut String, node: &DirNode, prefix: &str, depth: usize) {
    let mut entries: Vec<(&String, &DirNode)> = node.children.iter().collect();
    entries.sort_by(|a, b| {
        (a.1.children.is_empty(), a.0).cmp(&(b.1.children.is_empty(), b.0))
    });

    let shown = entries.len().min(MAX_ENTRIES);
    let hidden = entries.len() - shown;

    for (i, (name, child)) in entries.iter().take(shown).enumerate() {
        let is_last = i == shown - 1 && hidden == 0;
        let branch = if is_last { "└── " } else { "├── " };
        let is_dir = !child.children.is_empty();

        output.push_str(prefix);
        output.push_str(branch);
        output.push_str(name);
        if is_dir {
            output.push('/');
        }

        if is_dir && depth >= MAX_DEPTH {
            output.push_str(&format!(" ({} files)\n", child.count_files()));
            continue;
        }
        output.push('\n');

        if is_dir {
            let continuation = if is_last { "    " } else { "│   " };
            let child_prefix = format!("{}{}", prefix, continuation);
            render_children(output, child, &child_prefix, depth + 1);
        }
    }

    if hidden > 0 {
        output.push_str(prefix);
        output.push_str(&format!("└── … {} more\n", hidden));
    }
}
