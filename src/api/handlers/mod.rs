use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::error::DevboxError;
use crate::models::*;

// ============================================================
// Envelopes
// ============================================================

/// Success envelope: `{success, data, isDemo, timestamp}`.
fn ok<T: Serialize>(data: T, is_demo: bool) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": data,
        "isDemo": is_demo,
        "timestamp": Utc::now(),
    }))
}

/// Error envelope for every failed request.
#[derive(Debug)]
pub struct AppError(pub DevboxError);

impl From<DevboxError> for AppError {
    fn from(e: DevboxError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        } else {
            tracing::warn!("{}", self.0);
        }

        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "errorCode": self.0.code(),
            "details": self.0.details(),
            "timestamp": Utc::now(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DevboxError::InvalidRequest(rejection.body_text()))
    }
}

/// JSON body extractor that rejects with the error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

type ApiResult = Result<Json<serde_json::Value>, AppError>;

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let manifest_built_at = state
        .latest_manifest
        .read()
        .expect("manifest lock poisoned")
        .as_ref()
        .map(|m| m.built_at);
    ok(
        json!({
            "status": "ok",
            "sandbox": state.registry.status(),
            "manifestBuiltAt": manifest_built_at,
        }),
        false,
    )
}

// ============================================================
// Sandbox lifecycle
// ============================================================

pub async fn create_sandbox(
    State(state): State<AppState>,
    input: Result<Json<CreateSessionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // The body is optional; a request without one gets the defaults.
    let input = match input {
        Ok(Json(input)) => input,
        Err(JsonRejection::MissingJsonContentType(_)) => CreateSessionInput::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let session = state.registry.create(input).await?;
    state.clear_manifest();
    Ok((StatusCode::CREATED, ok(session.info(), session.is_demo())))
}

pub async fn get_sandbox(State(state): State<AppState>) -> ApiResult {
    let session = state.registry.get().await?;
    Ok(ok(session.info(), session.is_demo()))
}

pub async fn kill_sandbox(State(state): State<AppState>) -> ApiResult {
    let killed = state.registry.kill().await;
    state.clear_manifest();
    Ok(ok(json!({ "killed": killed }), false))
}

pub async fn reconnect_sandbox(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state.registry.reconnect(&id).await?;
    Ok(ok(session.info(), session.is_demo()))
}

// ============================================================
// Project contents
// ============================================================

pub async fn get_manifest(State(state): State<AppState>) -> ApiResult {
    let session = state.registry.get().await?;
    let manifest = Arc::new(state.manifests.build(&session).await?);
    *state
        .latest_manifest
        .write()
        .expect("manifest lock poisoned") = Some(manifest.clone());
    Ok(ok(&*manifest, manifest.is_demo))
}

pub async fn write_files(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<WriteFilesInput>,
) -> ApiResult {
    if input.files.is_empty() {
        return Err(DevboxError::InvalidRequest("No files provided".to_string()).into());
    }
    let session = state.registry.get().await?;
    let result = session
        .write_files(input.files, state.config.command_timeout)
        .await?;
    Ok(ok(result, session.is_demo()))
}

// ============================================================
// Dependencies
// ============================================================

/// Stream install progress as Server-Sent Events, one JSON frame per event.
pub async fn install_packages(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<InstallInput>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let mut events = state
        .installer
        .install(&input.packages, input.sandbox_id.as_deref())
        .await?;

    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

impl AppState {
    fn clear_manifest(&self) {
        *self
            .latest_manifest
            .write()
            .expect("manifest lock poisoned") = None;
    }
}
