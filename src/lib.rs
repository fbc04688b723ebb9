//! Ephemeral sandbox sessions: provisioning, file manifests and streamed
//! dependency installation.

pub mod api;
pub mod config;
pub mod error;
pub mod install;
pub mod manifest;
pub mod models;
pub mod provider;
pub mod session;

pub use config::Config;
pub use error::DevboxError;
