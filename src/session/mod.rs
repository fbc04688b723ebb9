//! Sandbox session lifecycle.
//!
//! A [`Session`] wraps one remote environment. The [`SessionRegistry`] owns the
//! single current session and replaces it atomically; the [`Provisioner`]
//! creates environments and bootstraps the project skeleton inside them.

mod file_state;
mod provisioner;
mod registry;
pub mod scripts;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::DevboxError;
use crate::models::{FileWrite, SessionInfo, SessionStatus, WriteFilesResult};
use crate::provider::Sandbox;

pub use file_state::FileStateTracker;
pub use provisioner::{ProvisionOutcome, Provisioner};
pub use registry::SessionRegistry;

/// One sandbox environment and its bookkeeping.
///
/// Immutable once created; the registry replaces whole sessions rather than
/// editing them.
#[derive(Debug)]
pub struct Session {
    sandbox: Sandbox,
    status: SessionStatus,
    project_dir: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    files: Arc<FileStateTracker>,
    demo_reason: Option<String>,
}

impl Session {
    pub fn new(
        sandbox: Sandbox,
        project_dir: impl Into<String>,
        ttl: Duration,
        files: Arc<FileStateTracker>,
        demo_reason: Option<String>,
    ) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let status = if sandbox.is_demo() {
            SessionStatus::Demo
        } else {
            SessionStatus::Live
        };
        Self {
            sandbox,
            status,
            project_dir: project_dir.into(),
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            files,
            demo_reason,
        }
    }

    pub fn id(&self) -> &str {
        self.sandbox.id()
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_demo(&self) -> bool {
        self.sandbox.is_demo()
    }

    pub fn project_dir(&self) -> &str {
        &self.project_dir
    }

    pub fn files(&self) -> &Arc<FileStateTracker> {
        &self.files
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id().to_string(),
            status: self.status,
            host: self.sandbox.host().map(str::to_string),
            is_demo: self.is_demo(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            demo_reason: self.demo_reason.clone(),
        }
    }

    /// Write files into the project directory and record them as known.
    ///
    /// Demo sessions only record the paths.
    pub async fn write_files(
        &self,
        files: Vec<FileWrite>,
        timeout: Duration,
    ) -> Result<WriteFilesResult, DevboxError> {
        let mut remote = Vec::with_capacity(files.len());
        for file in &files {
            let relative = normalize_relative(&file.path)?;
            remote.push((
                format!("{}/{}", self.project_dir, relative),
                file.content.clone(),
            ));
        }

        if !self.is_demo() {
            self.sandbox
                .write_files(&remote, timeout)
                .await
                .map_err(DevboxError::Remote)?;
        }

        let mut result = WriteFilesResult::default();
        for (path, _) in remote {
            let relative = path[self.project_dir.len() + 1..].to_string();
            if self.files.add(relative.clone()) {
                result.created.push(relative);
            } else {
                result.updated.push(relative);
            }
        }
        tracing::debug!(
            "Wrote {} new and {} existing files to {}",
            result.created.len(),
            result.updated.len(),
            self.id()
        );
        Ok(result)
    }
}

/// Validate a project-relative path, stripping a leading `./`.
fn normalize_relative(path: &str) -> Result<String, DevboxError> {
    let trimmed = path.trim().trim_start_matches("./");
    if trimmed.is_empty() || trimmed.starts_with('/') {
        return Err(DevboxError::InvalidRequest(format!(
            "'{}' is not a project-relative path",
            path
        )));
    }
    if trimmed.split('/').any(|part| part == ".." || part.is_empty()) {
        return Err(DevboxError::InvalidRequest(format!(
            "'{}' escapes the project directory",
            path
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_session() -> Session {
        Session::new(
            Sandbox::demo(),
            "/home/user/app",
            Duration::from_secs(60),
            Arc::new(FileStateTracker::new()),
            Some("no provider".to_string()),
        )
    }

    #[test]
    fn demo_session_reports_demo_status() {
        let session = demo_session();
        let info = session.info();
        assert_eq!(info.status, SessionStatus::Demo);
        assert!(info.is_demo);
        assert!(info.host.is_none());
        assert_eq!(info.demo_reason.as_deref(), Some("no provider"));
    }

    #[test]
    fn expiry_follows_ttl() {
        let session = demo_session();
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.is_expired_at(session.expires_at()));
    }

    #[test]
    fn relative_paths_are_validated() {
        assert_eq!(normalize_relative("./src/App.jsx").unwrap(), "src/App.jsx");
        assert!(normalize_relative("/etc/passwd").is_err());
        assert!(normalize_relative("src/../../etc").is_err());
        assert!(normalize_relative("  ").is_err());
    }

    #[tokio::test]
    async fn demo_write_records_paths() {
        let session = demo_session();
        let files = vec![FileWrite {
            path: "src/Button.jsx".to_string(),
            content: "export const Button = () => null".to_string(),
        }];

        let first = session
            .write_files(files.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(first.created, vec!["src/Button.jsx"]);

        let second = session
            .write_files(files, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(second.updated, vec!["src/Button.jsx"]);
        assert!(session.files().contains("src/Button.jsx"));
    }
}
