//! Remote execution environment provider.
//!
//! The provider is an external service that hands out ephemeral sandboxes and
//! runs shell scripts inside them. It is treated as fallible and possibly
//! absent entirely, in which case sessions degrade to [`Sandbox::Demo`].

mod http;
mod sandbox;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use http::HttpProvider;
pub use sandbox::{LiveSandbox, Sandbox};

/// Provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: provider API key required or invalid")]
    Unauthorized,

    #[error("Provider error: {0}")]
    Server(String),

    #[error("Command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed provider response: {0}")]
    Protocol(String),
}

/// Parameters for creating a sandbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandbox {
    pub template: String,
    pub timeout_secs: u64,
}

/// Reference to a sandbox held by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxHandle {
    #[serde(alias = "sandboxId")]
    pub id: String,
    pub host: String,
}

/// Result of running a script to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of process output, delivered while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, request: &CreateSandbox) -> Result<SandboxHandle, ProviderError>;

    async fn connect(&self, id: &str) -> Result<SandboxHandle, ProviderError>;

    async fn kill(&self, handle: &SandboxHandle) -> Result<(), ProviderError>;

    async fn exec(
        &self,
        handle: &SandboxHandle,
        script: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, ProviderError>;

    /// Run a script, forwarding each output line as it is produced.
    ///
    /// The default replays buffered output once the script finishes.
    async fn exec_streaming(
        &self,
        handle: &SandboxHandle,
        script: &str,
        timeout: Duration,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ExecOutput, ProviderError> {
        let output = self.exec(handle, script, timeout).await?;
        for line in output.stdout.lines() {
            let _ = lines.send(OutputLine::stdout(line));
        }
        for line in output.stderr.lines() {
            let _ = lines.send(OutputLine::stderr(line));
        }
        Ok(output)
    }

    /// Write files given as `(absolute path, content)` pairs.
    async fn write_files(
        &self,
        handle: &SandboxHandle,
        files: &[(String, String)],
        timeout: Duration,
    ) -> Result<(), ProviderError> {
        let script = write_files_script(files);
        let output = self.exec(handle, &script, timeout).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ProviderError::Server(format!(
                "file write exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            )))
        }
    }
}

/// Quote a string for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell script that writes each file through base64 so content never needs
/// escaping.
pub fn write_files_script(files: &[(String, String)]) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut script = String::from("set -e\n");
    for (path, content) in files {
        let dir = match path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &path[..idx],
            None => ".",
        };
        script.push_str(&format!(
            "mkdir -p {} && printf '%s' {} | base64 -d > {}\n",
            shell_quote(dir),
            shell_quote(&engine.encode(content)),
            shell_quote(path),
        ));
    }
    script
}
