use serde::{Deserialize, Serialize};

/// A file to materialize inside the session's project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWrite {
    /// Path relative to the project directory.
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFilesInput {
    pub files: Vec<FileWrite>,
}

/// Outcome of a file write, split by whether the path was already known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteFilesResult {
    pub created: Vec<String>,
    pub updated: Vec<String>,
}
