use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::client::{DownloadSelection, MediaApiClient};
use crate::config::{non_empty, normalize_origin};
use crate::error::ClientError;
use crate::validator::ValidationCode;
use crate::ytdlp::{ExtractorError, YtDlp};

const DEFAULT_QUALITY: &str = "best";

#[derive(Clone)]
pub struct AppState {
    client: Arc<MediaApiClient>,
    extractor: YtDlp,
}

impl AppState {
    pub fn new(client: Arc<MediaApiClient>, extractor: YtDlp) -> Self {
        Self { client, extractor }
    }
}

/// Body shared by every `/api/v1` answer.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            error: None,
            data: Some(data),
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("{} {}: {}", self.status.as_u16(), self.code, self.message);
        }

        let body = Json(Envelope::<()> {
            success: false,
            message: Some(self.message),
            error: Some(self.code),
            data: None,
        });

        (self.status, body).into_response()
    }
}

impl From<ClientError> for ApiError {
    fn from(error: ClientError) -> Self {
        let message = error.to_string();
        match error {
            ClientError::Validation(validation) => {
                let code = match validation.code {
                    ValidationCode::UnsupportedPlatform => "UNSUPPORTED_URL",
                    other => other.as_str(),
                };
                Self::new(StatusCode::BAD_REQUEST, code, message)
            }
            ClientError::Timeout { .. } | ClientError::PollTimeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT_ERROR", message)
            }
            ClientError::Connection { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "CONNECTION_ERROR", message)
            }
            ClientError::Backend { status, code, .. } => Self::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                code.unwrap_or_else(|| "API_ERROR".to_string()),
                message,
            ),
            ClientError::Normalization(_) => Self::new(StatusCode::BAD_GATEWAY, "API_ERROR", message),
            ClientError::TaskFailed(_)
            | ClientError::PollCancelled { .. }
            | ClientError::PollAborted { .. } => Self::internal(message),
        }
    }
}

impl From<ExtractorError> for ApiError {
    fn from(error: ExtractorError) -> Self {
        let message = error.to_string();
        match error {
            ExtractorError::Timeout(_) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT_ERROR", message)
            }
            ExtractorError::Failed(_) => Self::new(StatusCode::BAD_REQUEST, "API_ERROR", message),
            ExtractorError::EmptyOutput => Self::new(StatusCode::BAD_GATEWAY, "API_ERROR", message),
            ExtractorError::NotInstalled | ExtractorError::Spawn(_) => Self::internal(message),
        }
    }
}

/// Unreadable request bodies; a readable body without `url` is `MISSING_URL` instead.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            rejection.status(),
            "INVALID_REQUEST",
            format!("Cuerpo JSON invalido: {}", rejection.body_text()),
        )
    }
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadBody {
    url: Option<String>,
    quality: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    url: Option<String>,
}

/// CORS policy for the browser client. An empty list allows any origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if allowed_origins.is_empty() {
        warn!("ALLOWED_ORIGINS no esta configurado. Se aceptara cualquier origen.");
        return layer.allow_origin(Any);
    }

    info!(
        "CORS allow-list cargada con {} origen(es): {:?}",
        allowed_origins.len(),
        allowed_origins
    );
    let allowed = Arc::new(allowed_origins.to_vec());
    layer.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let accepted = normalized
                .as_ref()
                .is_some_and(|value| allowed.contains(value));
            debug!("CORS origin={origin:?} permitido={accepted}");
            accepted
        },
    ))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/video/info", get(video_info))
        .route("/video/options", get(video_options))
        .route("/video/download", post(start_download))
        .route("/video/status/{task_id}", get(task_status))
        .route("/video/task/{task_id}", get(task_status))
        .route("/video/download/{task_id}", get(download_link));

    Router::new()
        .nest("/api/v1", api)
        .route("/generate", post(generate))
        .route("/status", get(service_status))
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<Envelope<serde_json::Value>> {
    let backend = match state.client.health().await {
        Ok(()) => "UP",
        Err(error) => {
            warn!("Backend no disponible: {error}");
            "DOWN"
        }
    };

    Envelope::data(json!({
        "status": "UP",
        "timestamp": Utc::now().to_rfc3339(),
        "backend": backend,
    }))
}

async fn video_info(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let url = query.url.unwrap_or_default();
    let preview = state.client.video_info(&url).await?;
    Ok(Envelope::data(preview))
}

async fn video_options(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let url = query.url.unwrap_or_default();
    let options = state.client.download_options(&url).await?;
    Ok(Envelope::data(options))
}

async fn start_download(
    State(state): State<AppState>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(ApiError::from)?;

    let url = body.url.unwrap_or_default();
    let selection = DownloadSelection {
        quality: body
            .quality
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_QUALITY)
            .to_string(),
        format: body.format,
    };

    let started = state.client.start_download_with(&url, &selection).await?;
    info!(
        "Descarga encolada: tarea {} ({})",
        started.task_id, started.file_name
    );
    Ok((StatusCode::ACCEPTED, Envelope::data(started)))
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.client.check_task_status(&task_id).await?;
    Ok(Envelope::data(task))
}

async fn download_link(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let link = state.client.download_url(&task_id).await?;
    Ok(Envelope::data(json!({ "download_url": link })))
}

async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(ApiError::from)?;
    let url = body.url.unwrap_or_default();
    let source = state.client.validate(&url).map_err(ClientError::from)?;

    let direct_url = state.extractor.direct_url(source.as_str()).await?;
    Ok(Json(json!({ "direct_url": direct_url })))
}

async fn service_status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(format!("Ruta no encontrada: {method} {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationError;

    #[test]
    fn validation_codes_map_onto_gateway_codes() {
        let error = ApiError::from(ClientError::Validation(ValidationError {
            code: ValidationCode::UnsupportedPlatform,
            message: "no".to_string(),
        }));
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, "UNSUPPORTED_URL");

        let error = ApiError::from(ClientError::Validation(ValidationError {
            code: ValidationCode::InvalidTaskId,
            message: "no".to_string(),
        }));
        assert_eq!(error.code, "INVALID_TASK_ID");
    }

    #[test]
    fn transport_failures_map_onto_gateway_codes() {
        let timeout = ApiError::from(ClientError::Timeout {
            operation: "video_info",
        });
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.code, "TIMEOUT_ERROR");

        let connection = ApiError::from(ClientError::Connection {
            operation: "video_info",
            message: "refused".to_string(),
        });
        assert_eq!(connection.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(connection.code, "CONNECTION_ERROR");
    }

    #[test]
    fn backend_errors_keep_status_message_and_code() {
        let error = ApiError::from(ClientError::backend(
            404,
            "Tarea no encontrada",
            Some("NOT_FOUND".to_string()),
        ));
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Tarea no encontrada");
        assert_eq!(error.code, "NOT_FOUND");

        let error = ApiError::from(ClientError::backend(500, "boom", None));
        assert_eq!(error.code, "API_ERROR");

        let error = ApiError::from(ClientError::normalization("x"));
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
    }
}
