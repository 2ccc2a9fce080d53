use std::fmt;

use url::Url;

pub const DEFAULT_SUPPORTED_PLATFORMS: [&str; 20] = [
    "youtube.com",
    "youtu.be",
    "instagram.com",
    "facebook.com",
    "fb.com",
    "fb.watch",
    "tiktok.com",
    "vm.tiktok.com",
    "twitter.com",
    "x.com",
    "t.co",
    "soundcloud.com",
    "snd.sc",
    "twitch.tv",
    "clips.twitch.tv",
    "pinterest.com",
    "pin.it",
    "vimeo.com",
    "dailymotion.com",
    "dai.ly",
];

const MAX_TASK_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    MissingUrl,
    InvalidUrl,
    UnsupportedPlatform,
    MissingTaskId,
    InvalidTaskId,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingUrl => "MISSING_URL",
            Self::InvalidUrl => "INVALID_URL",
            Self::UnsupportedPlatform => "UNSUPPORTED_PLATFORM",
            Self::MissingTaskId => "MISSING_TASK_ID",
            Self::InvalidTaskId => "INVALID_TASK_ID",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationError {
    fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A URL that passed [`PlatformAllowList::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSourceUrl(Url);

impl MediaSourceUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl fmt::Display for MediaSourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Hostnames accepted as media sources. An entry also admits all of its subdomains.
#[derive(Debug, Clone)]
pub struct PlatformAllowList {
    domains: Vec<String>,
}

impl Default for PlatformAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_PLATFORMS)
    }
}

impl PlatformAllowList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|domain| domain.as_ref().trim().trim_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();

        Self { domains }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn is_supported_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn validate(&self, input: &str) -> Result<MediaSourceUrl, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::new(
                ValidationCode::MissingUrl,
                "La URL es obligatoria.",
            ));
        }

        let invalid = || {
            ValidationError::new(
                ValidationCode::InvalidUrl,
                "URL invalida. Verifica la direccion e intenta nuevamente.",
            )
        };

        let parsed = Url::parse(input).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid());
        }

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(invalid()),
        };

        if !self.is_supported_host(host) {
            return Err(ValidationError::new(
                ValidationCode::UnsupportedPlatform,
                "URL no soportada. Usa enlaces de las plataformas soportadas.",
            ));
        }

        Ok(MediaSourceUrl(parsed))
    }
}

/// Task ids travel as a single path segment towards the backend.
pub fn validate_task_id(task_id: &str) -> Result<&str, ValidationError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(ValidationError::new(
            ValidationCode::MissingTaskId,
            "El identificador de la tarea es obligatorio.",
        ));
    }

    let well_formed = task_id.len() <= MAX_TASK_ID_LEN
        && task_id
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'));
    if !well_formed {
        return Err(ValidationError::new(
            ValidationCode::InvalidTaskId,
            "Identificador de tarea invalido.",
        ));
    }

    Ok(task_id)
}
