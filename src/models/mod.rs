//! Domain models for devbox.
//!
//! # Core Concepts
//!
//! - [`SessionInfo`]: Serializable view of the single current sandbox session,
//!   live or demo.
//! - [`Manifest`]: Immutable snapshot of a session's file tree with derived
//!   component, import and route metadata. Rebuilt wholesale on every request.
//! - [`InstallRequest`] / [`InstallEvent`]: A normalized package set and the
//!   ordered progress events emitted while installing it.

mod files;
mod install;
mod manifest;
mod session;

pub use files::*;
pub use install::*;
pub use manifest::*;
pub use session::*;
