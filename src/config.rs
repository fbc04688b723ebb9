//! Runtime configuration loaded from environment variables.

use std::time::Duration;

use crate::error::DevboxError;

/// Default provider API endpoint.
const DEFAULT_PROVIDER_URL: &str = "https://api.devbox.dev/v1";

/// Directory inside the sandbox that holds the bootstrapped project.
pub const PROJECT_DIR: &str = "/home/user/app";

/// Port the development server listens on inside the sandbox.
pub const DEV_SERVER_PORT: u16 = 5173;

#[derive(Clone, Debug)]
pub struct Config {
    /// Provider credential (from DEVBOX_PROVIDER_API_KEY)
    pub provider_api_key: Option<String>,
    /// Provider base URL (from DEVBOX_PROVIDER_URL)
    pub provider_url: String,
    /// Environment template to request (from DEVBOX_TEMPLATE)
    pub template: String,
    /// How long a session lives before it is considered expired
    pub session_ttl: Duration,
    /// Deadline for the provider to hand back a new environment
    pub create_timeout: Duration,
    /// Hard wall-clock limit for one package install
    pub install_timeout: Duration,
    /// Timeout applied to ordinary remote commands
    pub command_timeout: Duration,
    /// Files above this size are left out of the manifest
    pub max_file_bytes: u64,
    /// Pause between stopping and relaunching the dev server
    pub restart_pause: Duration,
    pub project_dir: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let provider_api_key = std::env::var("DEVBOX_PROVIDER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let provider_url = std::env::var("DEVBOX_PROVIDER_URL")
            .unwrap_or_else(|_| DEFAULT_PROVIDER_URL.to_string());

        let template = std::env::var("DEVBOX_TEMPLATE").unwrap_or_else(|_| "node".to_string());

        Self {
            provider_api_key,
            provider_url,
            template,
            session_ttl: env_secs("DEVBOX_SESSION_TTL_SECS", 1800),
            create_timeout: env_secs("DEVBOX_CREATE_TIMEOUT_SECS", 60),
            install_timeout: env_secs("DEVBOX_INSTALL_TIMEOUT_SECS", 60),
            command_timeout: env_secs("DEVBOX_COMMAND_TIMEOUT_SECS", 30),
            max_file_bytes: std::env::var("DEVBOX_MAX_FILE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100_000),
            restart_pause: Duration::from_secs(1),
            project_dir: PROJECT_DIR.to_string(),
        }
    }

    /// Configuration with no credential and default limits (demo mode).
    pub fn offline() -> Self {
        Self {
            provider_api_key: None,
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            template: "node".to_string(),
            session_ttl: Duration::from_secs(1800),
            create_timeout: Duration::from_secs(60),
            install_timeout: Duration::from_secs(60),
            command_timeout: Duration::from_secs(30),
            max_file_bytes: 100_000,
            restart_pause: Duration::from_secs(1),
            project_dir: PROJECT_DIR.to_string(),
        }
    }

    /// Create a config with a provider credential set.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.provider_api_key = Some(key.into());
        self
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    pub fn with_restart_pause(mut self, pause: Duration) -> Self {
        self.restart_pause = pause;
        self
    }

    /// Validate and return the provider credential.
    pub fn credential(&self) -> Result<&str, DevboxError> {
        let key = self.provider_api_key.as_deref().ok_or_else(|| {
            DevboxError::Configuration("DEVBOX_PROVIDER_API_KEY is not set".to_string())
        })?;

        if key.trim().is_empty() {
            return Err(DevboxError::Configuration(
                "provider API key is empty".to_string(),
            ));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(DevboxError::Configuration(
                "provider API key contains whitespace".to_string(),
            ));
        }
        Ok(key)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
