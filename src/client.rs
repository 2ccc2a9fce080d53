use std::{future::Future, sync::Arc};

use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::RequestCache;
use crate::config::BackendConfig;
use crate::error::ClientError;
use crate::models::{DownloadOption, DownloadStarted, Task, VideoPreview, is_audio_format};
use crate::normalize;
use crate::poller::{TaskPoller, TaskStatusSource};
use crate::retry::with_retry;
use crate::validator::{MediaSourceUrl, ValidationError, validate_task_id};

const VIDEO_INFO_OPERATION: &str = "video_info";
const DOWNLOAD_OPTIONS_OPERATION: &str = "download_options";
const DEFAULT_FORMAT: &str = "mp4";
const MAX_FILE_STEM_CHARS: usize = 120;

/// What the user picked on the options screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSelection {
    pub quality: String,
    /// Container; looked up in the cached option list when absent.
    pub format: Option<String>,
}

impl DownloadSelection {
    pub fn quality(quality: impl Into<String>) -> Self {
        Self {
            quality: quality.into(),
            format: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct StartDownloadBody<'a> {
    video_url: &'a str,
    format: &'a str,
    audio_only: bool,
    quality: &'a str,
}

/// Typed client of the media-extraction backend.
///
/// Reads of video info and option listings are cached per URL; every other
/// call except the health probe goes through the retry policy uncached.
#[derive(Debug)]
pub struct MediaApiClient {
    http: reqwest::Client,
    config: BackendConfig,
    cache: Mutex<RequestCache>,
}

impl MediaApiClient {
    pub fn new(config: BackendConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.write_timeout)
            .build()
            .map_err(|error| ClientError::Connection {
                operation: "init",
                message: format!("No se pudo crear cliente HTTP: {error}"),
            })?;

        Ok(Self {
            http,
            cache: Mutex::new(RequestCache::new(config.cache_ttl)),
            config,
        })
    }

    pub fn validate(&self, url: &str) -> Result<MediaSourceUrl, ValidationError> {
        self.config.platforms.validate(url)
    }

    pub async fn video_info(&self, url: &str) -> Result<VideoPreview, ClientError> {
        let source = self.validate(url)?;
        let canonical = self
            .cached_read(VIDEO_INFO_OPERATION, "/video/info", &source, |raw| {
                let preview = normalize::video_preview(raw)?;
                to_canonical(&preview)
            })
            .await?;
        normalize::video_preview(canonical)
    }

    pub async fn download_options(&self, url: &str) -> Result<Vec<DownloadOption>, ClientError> {
        let source = self.validate(url)?;
        let canonical = self
            .cached_read(DOWNLOAD_OPTIONS_OPERATION, "/video/options", &source, |raw| {
                let options = normalize::download_options(raw)?;
                to_canonical(&options)
            })
            .await?;
        normalize::download_options(canonical)
    }

    pub async fn start_download(
        &self,
        url: &str,
        quality: &str,
    ) -> Result<DownloadStarted, ClientError> {
        self.start_download_with(url, &DownloadSelection::quality(quality))
            .await
    }

    pub async fn start_download_with(
        &self,
        url: &str,
        selection: &DownloadSelection,
    ) -> Result<DownloadStarted, ClientError> {
        let source = self.validate(url)?;
        let format = match selection.format.as_deref().and_then(crate::config::non_empty) {
            Some(format) => format.to_ascii_lowercase(),
            None => self.cached_format(&source, &selection.quality).await,
        };
        let body = StartDownloadBody {
            video_url: source.as_str(),
            format: &format,
            audio_only: is_audio_format(&format),
            quality: &selection.quality,
        };

        info!(
            "Iniciando descarga en {} de {:?} (calidad={}, formato={format})",
            source.host(),
            source.as_str(),
            selection.quality
        );
        let endpoint = self.endpoint("/video/download");
        let raw = with_retry(self.config.retry, || {
            self.send(
                "start_download",
                self.http
                    .post(&endpoint)
                    .json(&body)
                    .timeout(self.config.write_timeout),
            )
        })
        .await?;

        let task = normalize::task(raw, "")?;
        if task.task_id.is_empty() {
            return Err(ClientError::normalization("task_id no encontrado"));
        }

        Ok(DownloadStarted {
            success: true,
            file_name: file_name_for(&source, &format),
            task_id: task.task_id,
        })
    }

    pub async fn check_task_status(&self, task_id: &str) -> Result<Task, ClientError> {
        let task_id = validate_task_id(task_id)?;
        let prefix = if self.config.legacy_task_path {
            "/video/task/"
        } else {
            "/video/status/"
        };
        let endpoint = self.endpoint(&format!("{prefix}{}", urlencoding::encode(task_id)));

        let raw = with_retry(self.config.retry, || {
            self.send(
                "check_task_status",
                self.http.get(&endpoint).timeout(self.config.read_timeout),
            )
        })
        .await?;

        normalize::task(raw, task_id)
    }

    /// Link of a completed task; relative links are resolved against the backend origin.
    pub async fn download_url(&self, task_id: &str) -> Result<String, ClientError> {
        let task_id = validate_task_id(task_id)?;
        let endpoint = self.endpoint(&format!("/video/download/{}", urlencoding::encode(task_id)));

        let raw = with_retry(self.config.retry, || {
            self.send(
                "download_url",
                self.http.get(&endpoint).timeout(self.config.read_timeout),
            )
        })
        .await?;

        let link = normalize::download_url(raw)?;
        if link.starts_with("http://") || link.starts_with("https://") {
            return Ok(link);
        }

        let origin = self.config.base_url.origin().ascii_serialization();
        Ok(format!("{origin}/{}", link.trim_start_matches('/')))
    }

    /// Liveness probe; never retried.
    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.endpoint("/health"))
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|error| ClientError::from_reqwest("health", error))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::backend(
                status.as_u16(),
                format!("El backend respondio {status} al chequeo de salud."),
                None,
            ))
        }
    }

    /// Polls `task_id` with the configured interval and timeout.
    pub async fn monitor<F>(
        &self,
        task_id: &str,
        on_update: F,
        cancel: &CancellationToken,
    ) -> Result<Task, ClientError>
    where
        F: FnMut(&Task),
    {
        let task_id = validate_task_id(task_id)?;
        TaskPoller::new(self, self.config.poll)
            .monitor_with(task_id, on_update, cancel)
            .await
    }

    /// Poller owning a shared handle to the client, for spawned sessions.
    pub fn poller(self: &Arc<Self>) -> TaskPoller<Arc<Self>> {
        TaskPoller::new(Arc::clone(self), self.config.poll)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.as_str().trim_end_matches('/'))
    }

    async fn cached_read<F>(
        &self,
        operation: &'static str,
        path: &str,
        source: &MediaSourceUrl,
        canonicalize: F,
    ) -> Result<Value, ClientError>
    where
        F: FnOnce(Value) -> Result<Value, ClientError>,
    {
        let key = RequestCache::key(operation, source.as_str());
        let cached = self.cache.lock().await.get(&key).cloned();
        if let Some(hit) = cached {
            debug!("Usando cache para {operation}: {:?}", source.as_str());
            return Ok(hit);
        }

        let endpoint = self.endpoint(path);
        let raw = with_retry(self.config.retry, || {
            self.send(
                operation,
                self.http
                    .get(&endpoint)
                    .query(&[("url", source.as_str())])
                    .timeout(self.config.read_timeout),
            )
        })
        .await?;

        let canonical = canonicalize(raw)?;
        self.cache.lock().await.set(key, canonical.clone());
        Ok(canonical)
    }

    async fn cached_format(&self, source: &MediaSourceUrl, quality: &str) -> String {
        let key = RequestCache::key(DOWNLOAD_OPTIONS_OPERATION, source.as_str());
        let cached = self.cache.lock().await.get(&key).cloned();

        cached
            .and_then(|value| normalize::download_options(value).ok())
            .and_then(|options| {
                options
                    .into_iter()
                    .find(|option| option.quality.eq_ignore_ascii_case(quality))
                    .map(|option| option.format.to_ascii_lowercase())
            })
            .filter(|format| !format.is_empty())
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string())
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Value, ClientError> {
        let correlation_id = Uuid::new_v4();
        debug!("Solicitud {operation} al backend (correlation_id={correlation_id})");

        let response = request
            .header("x-correlation-id", correlation_id.to_string())
            .send()
            .await
            .map_err(|error| ClientError::from_reqwest(operation, error))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| ClientError::from_reqwest(operation, error))?;
        debug!("Respuesta {operation}: {status} (correlation_id={correlation_id})");

        if !status.is_success() {
            warn!("El backend respondio {status} en {operation} (correlation_id={correlation_id})");
            return Err(backend_error(status, &body));
        }

        normalize::parse_body(&body)
    }
}

impl TaskStatusSource for MediaApiClient {
    fn check_status(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send {
        self.check_task_status(task_id)
    }
}

fn to_canonical<T: Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|error| ClientError::normalization(error.to_string()))
}

/// Builds the error of a non-2xx answer, keeping the backend message when there is one.
fn backend_error(status: StatusCode, body: &[u8]) -> ClientError {
    let payload = serde_json::from_slice::<Value>(body).ok();
    let text = |name: &str| {
        payload
            .as_ref()
            .and_then(|value| value.get(name))
            .and_then(Value::as_str)
            .and_then(crate::config::non_empty)
            .map(ToString::to_string)
    };

    let code = text("error");
    let message = text("message")
        .or_else(|| text("detail"))
        .or_else(|| code.clone())
        .unwrap_or_else(|| format!("Error {}: {}", status.as_u16(), status.canonical_reason().unwrap_or("")));

    ClientError::backend(status.as_u16(), message.trim().to_string(), code)
}

fn file_name_for(source: &MediaSourceUrl, format: &str) -> String {
    let tail = source
        .as_str()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let decoded = urlencoding::decode(tail)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| tail.to_string());
    let stem: String = sanitize_ascii_filename(&decoded)
        .chars()
        .take(MAX_FILE_STEM_CHARS)
        .collect();

    format!("{}.{format}", stem.trim_end_matches('.'))
}

fn sanitize_ascii_filename(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());

    for character in value.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_') {
            sanitized.push(character);
        } else {
            sanitized.push('_');
        }
    }

    let compact = sanitized.trim_matches('_');
    if compact.is_empty() {
        "video".to_string()
    } else {
        compact.to_string()
    }
}
