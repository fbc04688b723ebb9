use std::collections::HashSet;
use std::sync::Mutex;

/// Paths known to exist in a session's environment.
///
/// Advisory only: collaborators consult it to skip redundant remote writes.
/// Cleared when the owning session is replaced or killed.
#[derive(Debug, Default)]
pub struct FileStateTracker {
    paths: Mutex<HashSet<String>>,
}

impl FileStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path. Returns true if it was not known before.
    pub fn add(&self, path: impl Into<String>) -> bool {
        let mut paths = self.paths.lock().expect("file state lock poisoned");
        paths.insert(path.into())
    }

    pub fn contains(&self, path: &str) -> bool {
        let paths = self.paths.lock().expect("file state lock poisoned");
        paths.contains(path)
    }

    pub fn clear(&self) {
        let mut paths = self.paths.lock().expect("file state lock poisoned");
        paths.clear();
    }

    pub fn len(&self) -> usize {
        let paths = self.paths.lock().expect("file state lock poisoned");
        paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
