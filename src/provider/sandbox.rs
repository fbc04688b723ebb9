use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{ExecOutput, OutputLine, ProviderError, SandboxHandle, SandboxProvider};

/// A sandbox backed by a real provider environment.
#[derive(Clone)]
pub struct LiveSandbox {
    handle: SandboxHandle,
    provider: Arc<dyn SandboxProvider>,
}

impl LiveSandbox {
    pub fn new(handle: SandboxHandle, provider: Arc<dyn SandboxProvider>) -> Self {
        Self { handle, provider }
    }
}

impl fmt::Debug for LiveSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSandbox")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// The environment behind a session.
///
/// Both variants expose the same operations. `Demo` stands in when the
/// provider is unreachable: commands fail with [`ProviderError::Unavailable`]
/// and `kill` does nothing.
#[derive(Debug, Clone)]
pub enum Sandbox {
    Live(LiveSandbox),
    Demo { id: String },
}

impl Sandbox {
    pub fn demo() -> Self {
        Self::Demo {
            id: format!("demo-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Live(live) => &live.handle.id,
            Self::Demo { id } => id,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Live(live) => Some(&live.handle.host),
            Self::Demo { .. } => None,
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Self::Demo { .. })
    }

    pub async fn exec(&self, script: &str, timeout: Duration) -> Result<ExecOutput, ProviderError> {
        match self {
            Self::Live(live) => live.provider.exec(&live.handle, script, timeout).await,
            Self::Demo { .. } => Err(demo_unavailable()),
        }
    }

    pub async fn exec_streaming(
        &self,
        script: &str,
        timeout: Duration,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ExecOutput, ProviderError> {
        match self {
            Self::Live(live) => {
                live.provider
                    .exec_streaming(&live.handle, script, timeout, lines)
                    .await
            }
            Self::Demo { .. } => Err(demo_unavailable()),
        }
    }

    pub async fn write_files(
        &self,
        files: &[(String, String)],
        timeout: Duration,
    ) -> Result<(), ProviderError> {
        match self {
            Self::Live(live) => live.provider.write_files(&live.handle, files, timeout).await,
            Self::Demo { .. } => Err(demo_unavailable()),
        }
    }

    pub async fn kill(&self) -> Result<(), ProviderError> {
        match self {
            Self::Live(live) => live.provider.kill(&live.handle).await,
            Self::Demo { .. } => Ok(()),
        }
    }
}

fn demo_unavailable() -> ProviderError {
    ProviderError::Unavailable("demo session has no remote environment".to_string())
}
