use std::time::Duration;

use url::Url;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::poller::PollSettings;
use crate::retry::RetryPolicy;
use crate::validator::PlatformAllowList;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";
const READ_TIMEOUT_SECONDS: u64 = 30;
const BACKEND_TIMEOUT_SECONDS: u64 = 60;
const PROBE_TIMEOUT_SECONDS: u64 = 5;
const YT_DLP_TIMEOUT_SECONDS: u64 = 30;
const RETRY_DEADLINE_SECONDS: u64 = 120;

#[derive(Debug, thiserror::Error)]
#[error("Valor invalido para {name}: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

/// Everything the backend client needs.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub cache_ttl: Duration,
    pub poll: PollSettings,
    pub retry: RetryPolicy,
    /// Timeout of user-facing reads (info, options, status).
    pub read_timeout: Duration,
    /// Timeout of the download start, which waits on the backend queue.
    pub write_timeout: Duration,
    pub probe_timeout: Duration,
    pub platforms: PlatformAllowList,
    /// Poll `/video/task/{id}` instead of `/video/status/{id}`.
    pub legacy_task_path: bool,
}

impl BackendConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            cache_ttl: DEFAULT_CACHE_TTL,
            poll: PollSettings::default(),
            retry: RetryPolicy::default()
                .with_deadline(Duration::from_secs(RETRY_DEADLINE_SECONDS)),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECONDS),
            write_timeout: Duration::from_secs(BACKEND_TIMEOUT_SECONDS),
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECONDS),
            platforms: PlatformAllowList::default(),
            legacy_task_path: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub backend: BackendConfig,
    pub bind_addr: String,
    pub yt_dlp_timeout: Duration,
    /// Normalized `scheme://host[:port]` origins; empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string))
        };
        let read_u64 = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            read(name)
                .map(|value| {
                    value.parse::<u64>().map_err(|_| ConfigError {
                        name,
                        value: value.clone(),
                    })
                })
                .transpose()
        };

        let base_url = read("PYTHON_API_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let base_url = Url::parse(&base_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ConfigError {
                name: "PYTHON_API_URL",
                value: base_url.clone(),
            })?;

        let mut backend = BackendConfig::new(base_url);
        if let Some(seconds) = read_u64("CACHE_TTL_SECONDS")? {
            backend.cache_ttl = Duration::from_secs(seconds);
        }
        if let Some(millis) = read_u64("STATUS_CHECK_INTERVAL_MS")?.filter(|value| *value > 0) {
            backend.poll.interval = Duration::from_millis(millis);
        }
        if let Some(millis) = read_u64("STATUS_CHECK_TIMEOUT_MS")?.filter(|value| *value > 0) {
            backend.poll.timeout = Duration::from_millis(millis);
        }
        if let Some(retries) = read_u64("MAX_RETRIES")? {
            backend.retry.max_retries = u32::try_from(retries).map_err(|_| ConfigError {
                name: "MAX_RETRIES",
                value: retries.to_string(),
            })?;
        }
        if let Some(millis) = read_u64("RETRY_INITIAL_DELAY_MS")? {
            backend.retry.initial_delay = Duration::from_millis(millis);
        }
        if let Some(seconds) = read_u64("RETRY_DEADLINE_SECONDS")?.filter(|value| *value > 0) {
            backend.retry.deadline = Some(Duration::from_secs(seconds));
        }
        if let Some(seconds) = read_u64("READ_TIMEOUT_SECONDS")?.filter(|value| *value > 0) {
            backend.read_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = read_u64("BACKEND_TIMEOUT_SECONDS")?.filter(|value| *value > 0) {
            backend.write_timeout = Duration::from_secs(seconds);
        }
        if let Some(platforms) = read("SUPPORTED_PLATFORMS") {
            let list = PlatformAllowList::new(platforms.split(','));
            if list.domains().is_empty() {
                return Err(ConfigError {
                    name: "SUPPORTED_PLATFORMS",
                    value: platforms,
                });
            }
            backend.platforms = list;
        }
        backend.legacy_task_path = read("LEGACY_TASK_PATH")
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false);

        let yt_dlp_timeout = read_u64("YT_DLP_TIMEOUT_SECONDS")?
            .filter(|value| *value > 0)
            .unwrap_or(YT_DLP_TIMEOUT_SECONDS);

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(|origin| {
                        normalize_origin(origin).ok_or_else(|| ConfigError {
                            name: "ALLOWED_ORIGINS",
                            value: origin.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            backend,
            bind_addr: resolve_bind_addr(&read),
            yt_dlp_timeout: Duration::from_secs(yt_dlp_timeout),
            allowed_origins,
        })
    }
}

fn resolve_bind_addr(read: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(configured) = read("APP_ADDR") {
        return configured;
    }

    if let Some(port) = read("PORT").and_then(|value| value.parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

/// `scheme://host[:port]` with the default port dropped, or `None` for
/// anything that is not a bare http(s) origin.
pub fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    if !matches!(scheme, "http" | "https") {
        return None;
    }
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend.base_url.as_str(), DEFAULT_BACKEND_URL);
        assert_eq!(config.backend.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.backend.poll.interval, Duration::from_millis(2000));
        assert_eq!(config.backend.poll.timeout, Duration::from_millis(300_000));
        assert_eq!(config.backend.retry.max_retries, 3);
        assert_eq!(config.backend.retry.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.backend.retry.deadline, Some(Duration::from_secs(120)));
        assert_eq!(config.backend.write_timeout, Duration::from_secs(60));
        assert!(!config.backend.legacy_task_path);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("PYTHON_API_URL", "https://api.internal/api/v1"),
            ("CACHE_TTL_SECONDS", "60"),
            ("STATUS_CHECK_INTERVAL_MS", "500"),
            ("SUPPORTED_PLATFORMS", "vimeo.com, Example.org"),
            ("LEGACY_TASK_PATH", "yes"),
            ("RETRY_DEADLINE_SECONDS", "45"),
            ("PORT", "8080"),
            ("ALLOWED_ORIGINS", "https://App.example.com, http://localhost:5173"),
        ])
        .unwrap();

        assert_eq!(config.backend.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.backend.poll.interval, Duration::from_millis(500));
        assert_eq!(config.backend.platforms.domains(), ["vimeo.com", "example.org"]);
        assert!(config.backend.legacy_task_path);
        assert_eq!(config.backend.retry.deadline, Some(Duration::from_secs(45)));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(
            config.allowed_origins,
            ["https://app.example.com", "http://localhost:5173"]
        );
    }

    #[test]
    fn rejects_malformed_values() {
        let error = config_from(&[("CACHE_TTL_SECONDS", "five")]).unwrap_err();
        assert_eq!(error.name, "CACHE_TTL_SECONDS");

        let error = config_from(&[("PYTHON_API_URL", "localhost:8000")]).unwrap_err();
        assert_eq!(error.name, "PYTHON_API_URL");

        let error = config_from(&[("ALLOWED_ORIGINS", "https://app.example.com/path")]).unwrap_err();
        assert_eq!(error.name, "ALLOWED_ORIGINS");
    }

    #[test]
    fn origins_drop_default_ports() {
        assert_eq!(
            normalize_origin("https://example.com:443").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            normalize_origin("http://localhost:5173/").as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(normalize_origin("ftp://example.com"), None);
    }
}
