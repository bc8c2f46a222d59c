//! Request handlers for the build protocol

use crate::build::{BuildOutcome, Orchestrator};
use crate::cache::{ContentCache, ContentHash};
use crate::error::OffbuildError;
use crate::model::{BeginResponse, BuildRequest};
use crate::session::{BuildId, SessionRegistry};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub cache: ContentCache,
    pub sessions: SessionRegistry,
    pub orchestrator: Orchestrator,
}

/// Error response: maps [`OffbuildError`] onto a status and a short body
#[derive(Debug)]
pub struct ApiError(pub OffbuildError);

impl From<OffbuildError> for ApiError {
    fn from(err: OffbuildError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OffbuildError::UnknownSession(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            OffbuildError::InvalidHash(_) => "bad hash size".to_string(),
            OffbuildError::InvalidBuildId(_) => "bad build id".to_string(),
            OffbuildError::UnknownSession(_) => "no such build".to_string(),
            e if status.is_client_error() => e.to_string(),
            _ => "internal server error".to_string(),
        };

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, "Rejected request");
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{message}\n"),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `POST /begin`: register a manifest, answer with its id and the missing files
pub async fn begin(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<BeginResponse>> {
    let request: BuildRequest = serde_json::from_slice(&body).map_err(|e| {
        OffbuildError::InvalidManifest(format!("malformed build request: {e}"))
    })?;
    request.validate()?;

    let missing = state.cache.find_missing(&request.packages).await?;
    let missing_files: usize = missing.iter().map(|p| p.files.len()).sum();
    let package = request.package_name.clone();
    let files = request.file_count();

    let id = state.sessions.create(request).await;
    info!(
        build_id = %id,
        %package,
        files,
        missing = missing_files,
        "Build begun"
    );

    Ok(Json(BeginResponse { id, missing }))
}

/// `POST /upload/{hash}`: store the request body as the cache entry for `hash`
pub async fn upload(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    body: Body,
) -> ApiResult<StatusCode> {
    let hash = ContentHash::parse(&hash)?;

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(Box::pin(stream));
    state.cache.put(&hash, reader).await?;

    Ok(StatusCode::OK)
}

/// `GET /build/{id}`: run the build and stream the artifact or diagnostics
pub async fn build(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let id = BuildId::parse(&id)?;
    let session = state.sessions.lookup(&id).await?;

    match state.orchestrator.build(&id, &session.request).await? {
        BuildOutcome::CompileFailed(diagnostics) => Ok((
            StatusCode::PRECONDITION_FAILED,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            diagnostics,
        )
            .into_response()),
        BuildOutcome::Success(artifact) => {
            let len = artifact.len();
            Ok((
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                ],
                Body::from_stream(artifact.into_stream()),
            )
                .into_response())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    format: Option<String>,
}

/// `GET /version`: toolchain version text, or the environment as JSON
pub async fn version(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
) -> ApiResult<Response> {
    let backend = state.orchestrator.backend();
    match query.format.as_deref() {
        Some("json") => Ok(Json(backend.environment().await?).into_response()),
        _ => Ok(backend.version().await?.into_response()),
    }
}
