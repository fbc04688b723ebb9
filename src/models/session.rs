use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a sandbox session.
///
/// - `Provisioning`: Environment is being created and bootstrapped
/// - `Live`: Backed by a real remote environment
/// - `Demo`: Non-functional stand-in returned when the provider is unavailable
/// - `Killed`: Remote resources released, no longer current
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Provisioning,
    Live,
    Demo,
    Killed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Live => "live",
            Self::Demo => "demo",
            Self::Killed => "killed",
        }
    }
}

/// What the registry currently holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    Uninitialized,
    Provisioning,
    Live,
    Demo,
    Killed,
}

/// Public view of a session, returned by every session endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub status: SessionStatus,
    /// Address of the running dev server, absent for demo sessions.
    pub host: Option<String>,
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Why the session fell back to demo mode, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_reason: Option<String>,
}

/// Input for creating a session. Unset fields fall back to [`crate::Config`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionInput {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}
