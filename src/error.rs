use std::time::Duration;

use crate::retry::Retryable;
use crate::validator::ValidationError;

/// Errors surfaced by the backend client and the task poller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The per-call timeout elapsed before the backend answered.
    #[error("El backend no respondio a tiempo ({operation}).")]
    Timeout { operation: &'static str },

    #[error("No se pudo conectar con el backend ({operation}): {message}")]
    Connection {
        operation: &'static str,
        message: String,
    },

    /// Non-2xx answer. 5xx and 429 are transient, the rest of 4xx is a caller error.
    #[error("{message}")]
    Backend {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Respuesta invalida del backend: {0}")]
    Normalization(String),

    /// The backend reported the task as failed.
    #[error("{0}")]
    TaskFailed(String),

    #[error("La tarea {task_id} no termino despues de {}s.", waited.as_secs())]
    PollTimeout { task_id: String, waited: Duration },

    #[error("Seguimiento de la tarea {task_id} cancelado.")]
    PollCancelled { task_id: String },

    /// The spawned poll session died before reporting, e.g. a panicking callback.
    #[error("El seguimiento de la tarea {task_id} termino inesperadamente: {message}")]
    PollAborted { task_id: String, message: String },
}

impl ClientError {
    pub fn backend(status: u16, message: impl Into<String>, code: Option<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn normalization(message: impl Into<String>) -> Self {
        Self::Normalization(message.into())
    }

    /// HTTP status carried by the failure, if it came from a backend answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn from_reqwest(operation: &'static str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout { operation }
        } else if error.is_decode() {
            Self::Normalization(error.to_string())
        } else if let Some(status) = error.status() {
            Self::backend(status.as_u16(), error.to_string(), None)
        } else {
            Self::Connection {
                operation,
                message: error.to_string(),
            }
        }
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Backend { status, .. } => *status == 429 || !(400..500).contains(status),
            Self::Validation(_)
            | Self::Normalization(_)
            | Self::TaskFailed(_)
            | Self::PollTimeout { .. }
            | Self::PollCancelled { .. }
            | Self::PollAborted { .. } => false,
        }
    }
}
