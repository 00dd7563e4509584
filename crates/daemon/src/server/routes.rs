//! HTTP handlers for pairing, devices, files and health.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{
    CompletePairingRequest, DeviceRecord, DirectoryListing, ErrorBody, ErrorCode, PairingOffer,
    StatusResponse,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::channel::CommandChannel;
use crate::devices::{PairingError, PairingService, RegistryError};
use crate::files::SandboxError;
use crate::session::SessionInfo;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pairing: Arc<PairingService>,
    pub channel: Arc<CommandChannel>,
    /// Cancelled when the host shuts down.
    pub shutdown: CancellationToken,
}

/// A failed request: HTTP status plus `{error, code}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let status = match code {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AccessDenied => StatusCode::FORBIDDEN,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                code,
            },
        }
    }

    fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", err);
        Self::new(ErrorCode::Internal, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err.code() {
            ErrorCode::Internal => ApiError::internal(err),
            code => ApiError::new(code, err.to_string()),
        }
    }
}

impl From<PairingError> for ApiError {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::Registry(e) => e.into(),
            other => ApiError::new(other.code(), other.to_string()),
        }
    }
}

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        match err.code() {
            ErrorCode::Internal => ApiError::internal(err),
            // Escaping the sandbox is a forbidden path, not missing credentials.
            ErrorCode::Unauthorized => {
                ApiError::new(ErrorCode::Unauthorized, err.client_message())
                    .with_status(StatusCode::FORBIDDEN)
            }
            code => ApiError::new(code, err.client_message()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorCode::ValidationError, rejection.body_text())
    }
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the HybridStore host server!" }))
}

pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse::new("ok").with_message("The server is online."))
}

pub async fn pairing_offer(State(state): State<AppState>) -> Json<PairingOffer> {
    Json(state.pairing.generate_offer())
}

pub async fn complete_pairing(
    State(state): State<AppState>,
    payload: Result<Json<CompletePairingRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload?;
    let record = state.pairing.complete_pairing(request)?;
    Ok(Json(
        StatusResponse::new("paired").with_message(format!("{} is paired", record.display_name)),
    ))
}

pub async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceRecord>>, ApiError> {
    Ok(Json(state.channel.registry().list()?))
}

pub async fn revoke_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (record, terminated) = state.channel.revoke_device(&device_id)?;

    let mut message = format!("{} was revoked", record.display_name);
    if terminated > 0 {
        message.push_str(&format!("; {} open channel(s) closed", terminated));
    }
    Ok(Json(StatusResponse::new("revoked").with_message(message)))
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    #[serde(default = "default_files_path")]
    pub path: String,
}

fn default_files_path() -> String {
    "/".to_string()
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<DirectoryListing>, ApiError> {
    let sandbox = Arc::clone(state.channel.sandbox());
    let listing = tokio::task::spawn_blocking(move || sandbox.list(&query.path))
        .await
        .map_err(ApiError::internal)??;
    Ok(Json(listing))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.channel.sessions().list())
}
