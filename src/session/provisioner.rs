use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{scripts, FileStateTracker, Session};
use crate::config::Config;
use crate::error::DevboxError;
use crate::models::CreateSessionInput;
use crate::provider::{CreateSandbox, LiveSandbox, ProviderError, Sandbox, SandboxProvider};

/// How a provisioning attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Live,
    /// The provider was missing or failed; the session is a stand-in.
    Demo { reason: String },
}

/// Creates environments and bootstraps the project skeleton inside them.
#[derive(Clone)]
pub struct Provisioner {
    provider: Option<Arc<dyn SandboxProvider>>,
    config: Arc<Config>,
}

impl Provisioner {
    pub fn new(provider: Option<Arc<dyn SandboxProvider>>, config: Arc<Config>) -> Self {
        Self { provider, config }
    }

    /// Create a fresh environment, falling back to a demo session when the
    /// provider is unusable.
    ///
    /// Only a failure to write the project skeleton is an error; the
    /// environment is torn down first.
    pub async fn provision(
        &self,
        input: &CreateSessionInput,
    ) -> Result<(Session, ProvisionOutcome), DevboxError> {
        let ttl = input
            .ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.session_ttl);
        let files = Arc::new(FileStateTracker::new());

        let sandbox = match self.create_sandbox(input, ttl).await {
            Ok(sandbox) => sandbox,
            Err(reason) => {
                warn!("Sandbox provider unavailable, using demo session: {}", reason);
                let session = Session::new(
                    Sandbox::demo(),
                    &self.config.project_dir,
                    ttl,
                    files,
                    Some(reason.clone()),
                );
                return Ok((session, ProvisionOutcome::Demo { reason }));
            }
        };

        info!("Created sandbox {}", sandbox.id());

        if let Err(e) = self.write_skeleton(&sandbox, &files).await {
            error!("Failed to write project skeleton to {}: {}", sandbox.id(), e);
            if let Err(kill_err) = sandbox.kill().await {
                warn!("Failed to tear down sandbox {}: {}", sandbox.id(), kill_err);
            }
            return Err(DevboxError::Setup(e.to_string()));
        }

        self.finish_bootstrap(&sandbox).await;

        let session = Session::new(sandbox, &self.config.project_dir, ttl, files, None);
        Ok((session, ProvisionOutcome::Live))
    }

    /// Ask the provider for an environment. Errors are rendered as the demo
    /// reason.
    async fn create_sandbox(
        &self,
        input: &CreateSessionInput,
        ttl: Duration,
    ) -> Result<Sandbox, String> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| "no sandbox provider configured".to_string())?;
        self.config.credential().map_err(|e| e.to_string())?;

        let request = CreateSandbox {
            template: input
                .template
                .clone()
                .unwrap_or_else(|| self.config.template.clone()),
            timeout_secs: ttl.as_secs(),
        };

        let created = tokio::time::timeout(self.config.create_timeout, provider.create(&request))
            .await
            .map_err(|_| {
                DevboxError::Timeout {
                    operation: "sandbox creation",
                    after: self.config.create_timeout,
                }
                .to_string()
            })?;

        match created {
            Ok(handle) => Ok(Sandbox::Live(LiveSandbox::new(handle, provider))),
            Err(e) => Err(DevboxError::Provision(e).to_string()),
        }
    }

    async fn write_skeleton(
        &self,
        sandbox: &Sandbox,
        files: &FileStateTracker,
    ) -> Result<(), ProviderError> {
        let skeleton = scripts::skeleton_files();
        let remote: Vec<(String, String)> = skeleton
            .iter()
            .map(|(path, content)| {
                (
                    format!("{}/{}", self.config.project_dir, path),
                    content.to_string(),
                )
            })
            .collect();

        sandbox
            .write_files(&remote, self.config.command_timeout)
            .await?;

        for (path, _) in skeleton {
            files.add(path);
        }
        Ok(())
    }

    /// Dependency install, dev server start and stylesheet nudge. Each step is
    /// best-effort.
    async fn finish_bootstrap(&self, sandbox: &Sandbox) {
        let dir = &self.config.project_dir;
        let steps = [
            ("baseline install", scripts::baseline_install(dir), self.config.install_timeout),
            ("dev server start", scripts::start_dev_server(dir), self.config.command_timeout),
            ("stylesheet rebuild", scripts::touch_stylesheet(dir), self.config.command_timeout),
        ];

        for (label, script, timeout) in steps {
            match sandbox.exec(&script, timeout).await {
                Ok(output) if output.success() => {
                    tracing::debug!("Bootstrap step '{}' finished", label);
                }
                Ok(output) => warn!(
                    "Bootstrap step '{}' exited with {}: {}",
                    label,
                    output.exit_code,
                    output.stderr.trim()
                ),
                Err(e) => warn!("Bootstrap step '{}' failed: {}", label, e),
            }
        }
    }
}
