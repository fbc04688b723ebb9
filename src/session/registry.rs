use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use super::{scripts, FileStateTracker, ProvisionOutcome, Provisioner, Session};
use crate::config::Config;
use crate::error::DevboxError;
use crate::models::{CreateSessionInput, RegistryStatus};
use crate::provider::{LiveSandbox, Sandbox, SandboxProvider};

/// Owner of the single current session.
///
/// Replacement is a pointer swap. Operations that already hold an `Arc` to a
/// superseded session keep running against it until they fail on their own.
pub struct SessionRegistry {
    provisioner: Provisioner,
    provider: Option<Arc<dyn SandboxProvider>>,
    config: Arc<Config>,
    current: RwLock<Option<Arc<Session>>>,
    status: Mutex<RegistryStatus>,
    /// Serializes create, reconnect and kill.
    lifecycle: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    pub fn new(provider: Option<Arc<dyn SandboxProvider>>, config: Arc<Config>) -> Self {
        Self {
            provisioner: Provisioner::new(provider.clone(), config.clone()),
            provider,
            config,
            current: RwLock::new(None),
            status: Mutex::new(RegistryStatus::Uninitialized),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> RegistryStatus {
        *self.status.lock().expect("registry status lock poisoned")
    }

    fn set_status(&self, status: RegistryStatus) {
        *self.status.lock().expect("registry status lock poisoned") = status;
    }

    fn snapshot(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .expect("session registry lock poisoned")
            .clone()
    }

    fn replace(&self, session: Option<Arc<Session>>) -> Option<Arc<Session>> {
        let mut current = self.current.write().expect("session registry lock poisoned");
        std::mem::replace(&mut *current, session)
    }

    /// Provision a new session and make it current.
    ///
    /// A previous session is killed once, best-effort, before the new one is
    /// installed. Provider failures produce a demo session, never an error.
    pub async fn create(&self, input: CreateSessionInput) -> Result<Arc<Session>, DevboxError> {
        let _guard = self.lifecycle.lock().await;
        let before = self.status();
        self.set_status(RegistryStatus::Provisioning);

        let (session, outcome) = match self.provisioner.provision(&input).await {
            Ok(provisioned) => provisioned,
            Err(e) => {
                self.set_status(before);
                return Err(e);
            }
        };

        if let Some(previous) = self.snapshot() {
            self.retire(&previous).await;
        }

        let session = Arc::new(session);
        self.replace(Some(session.clone()));
        self.set_status(match outcome {
            ProvisionOutcome::Live => RegistryStatus::Live,
            ProvisionOutcome::Demo { .. } => RegistryStatus::Demo,
        });

        info!(
            "Session {} is now current ({})",
            session.id(),
            session.status().as_str()
        );
        Ok(session)
    }

    /// The current session, if any and not expired.
    pub async fn get(&self) -> Result<Arc<Session>, DevboxError> {
        let session = self
            .snapshot()
            .ok_or_else(|| DevboxError::NotFound("No active sandbox session".to_string()))?;

        if session.is_expired_at(Utc::now()) {
            self.expire(&session);
            return Err(DevboxError::NotFound(format!(
                "Sandbox session {} has expired",
                session.id()
            )));
        }
        Ok(session)
    }

    /// Attach to a previously created environment when no session is current.
    ///
    /// Nothing is installed in the registry unless every step succeeds.
    pub async fn reconnect(&self, id: &str) -> Result<Arc<Session>, DevboxError> {
        let _guard = self.lifecycle.lock().await;

        if let Ok(current) = self.get().await {
            if current.id() == id {
                return Ok(current);
            }
            return Err(DevboxError::Reconnect {
                id: id.to_string(),
                reason: format!("another session ({}) is active", current.id()),
            });
        }

        self.config.credential()?;
        let provider = self.provider.clone().ok_or_else(|| DevboxError::Reconnect {
            id: id.to_string(),
            reason: "no sandbox provider configured".to_string(),
        })?;

        let connect = provider.connect(id);
        let handle = match tokio::time::timeout(self.config.command_timeout, connect).await {
            Ok(result) => result.map_err(|e| DevboxError::Reconnect {
                id: id.to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!("Timed out connecting to sandbox {}", id);
                return Err(DevboxError::Reconnect {
                    id: id.to_string(),
                    reason: "timed out".to_string(),
                });
            }
        };
        let sandbox = Sandbox::Live(LiveSandbox::new(handle, provider));

        let check = sandbox
            .exec(
                &scripts::check_project(&self.config.project_dir),
                self.config.command_timeout,
            )
            .await
            .map_err(|e| DevboxError::Reconnect {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if !check.success() {
            return Err(DevboxError::Reconnect {
                id: id.to_string(),
                reason: "project directory is missing".to_string(),
            });
        }

        let session = Arc::new(Session::new(
            sandbox,
            &self.config.project_dir,
            self.config.session_ttl,
            Arc::new(FileStateTracker::new()),
            None,
        ));
        self.replace(Some(session.clone()));
        self.set_status(RegistryStatus::Live);
        info!("Reconnected to sandbox {}", id);
        Ok(session)
    }

    /// Release the current session. The registry is cleared whatever the
    /// provider says. Returns whether there was a session to kill.
    pub async fn kill(&self) -> bool {
        let _guard = self.lifecycle.lock().await;
        let Some(session) = self.replace(None) else {
            return false;
        };
        self.retire(&session).await;
        self.set_status(RegistryStatus::Killed);
        info!("Killed session {}", session.id());
        true
    }

    /// Current session, or a reconnect to `sandbox_id` when none is current.
    pub async fn resolve(&self, sandbox_id: Option<&str>) -> Result<Arc<Session>, DevboxError> {
        match self.get().await {
            Ok(session) => Ok(session),
            Err(not_found) => match sandbox_id {
                Some(id) => self.reconnect(id).await,
                None => Err(not_found),
            },
        }
    }

    /// Clear a session's file state and close its environment, logging any
    /// failure.
    async fn retire(&self, session: &Session) {
        session.files().clear();
        match tokio::time::timeout(self.config.command_timeout, session.sandbox().kill()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to kill sandbox {}: {}", session.id(), e),
            Err(_) => warn!("Timed out killing sandbox {}", session.id()),
        }
    }

    /// Drop an expired session if it is still current and close it in the
    /// background.
    fn expire(&self, session: &Arc<Session>) {
        {
            let mut current = self.current.write().expect("session registry lock poisoned");
            match current.as_ref() {
                Some(held) if Arc::ptr_eq(held, session) => *current = None,
                _ => return,
            }
        }
        self.set_status(RegistryStatus::Killed);
        info!("Session {} expired", session.id());

        session.files().clear();
        let session = session.clone();
        let timeout = self.config.command_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, session.sandbox().kill()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to kill expired sandbox {}: {}", session.id(), e),
                Err(_) => warn!("Timed out killing expired sandbox {}", session.id()),
            }
        });
    }
}
