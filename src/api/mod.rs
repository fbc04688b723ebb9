mod handlers;

use std::sync::{Arc, RwLock};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::install::PackageInstaller;
use crate::manifest::ManifestBuilder;
use crate::models::Manifest;
use crate::provider::SandboxProvider;
use crate::session::SessionRegistry;

pub use handlers::AppError;

/// Shared handles for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub manifests: ManifestBuilder,
    pub installer: PackageInstaller,
    pub config: Arc<Config>,
    /// Most recent manifest; replaced whole on every build.
    pub latest_manifest: Arc<RwLock<Option<Arc<Manifest>>>>,
}

impl AppState {
    pub fn new(provider: Option<Arc<dyn SandboxProvider>>, config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new(provider, config.clone()));
        Self {
            manifests: ManifestBuilder::new(config.clone()),
            installer: PackageInstaller::new(registry.clone(), config.clone()),
            registry,
            config,
            latest_manifest: Arc::new(RwLock::new(None)),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Session lifecycle
        .route(
            "/sandbox",
            post(handlers::create_sandbox)
                .get(handlers::get_sandbox)
                .delete(handlers::kill_sandbox),
        )
        .route("/sandbox/{id}/reconnect", post(handlers::reconnect_sandbox))
        // Project contents
        .route("/sandbox/manifest", get(handlers::get_manifest))
        .route("/sandbox/files", post(handlers::write_files))
        // Dependencies
        .route("/sandbox/install", post(handlers::install_packages))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
