use std::{future::Future, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::models::{Task, TaskStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(300_000);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const GENERIC_TASK_FAILURE: &str = "Ocurrio un error durante la descarga.";

/// Anything able to report the current state of a task.
pub trait TaskStatusSource {
    fn check_status(&self, task_id: &str)
    -> impl Future<Output = Result<Task, ClientError>> + Send;
}

impl<T: TaskStatusSource + Sync> TaskStatusSource for &T {
    fn check_status(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send {
        (**self).check_status(task_id)
    }
}

impl<T: TaskStatusSource + Send + Sync> TaskStatusSource for Arc<T> {
    fn check_status(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send {
        self.as_ref().check_status(task_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Polls one task at a time until it reaches `completed` or `failed`.
///
/// Checks are strictly sequential, so a session never has more than one
/// request in flight. Sessions share nothing; run as many as needed.
#[derive(Debug, Clone)]
pub struct TaskPoller<S> {
    source: S,
    settings: PollSettings,
}

impl<S: TaskStatusSource> TaskPoller<S> {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it, so elapsed
    /// time always advances towards the timeout.
    pub fn new(source: S, settings: PollSettings) -> Self {
        let settings = PollSettings {
            interval: settings.interval.max(MIN_POLL_INTERVAL),
            ..settings
        };
        Self { source, settings }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub async fn monitor(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Task, ClientError> {
        self.monitor_with(task_id, |_| {}, cancel).await
    }

    /// Like [`monitor`](Self::monitor), calling `on_update` with every status
    /// received. After `cancel` fires neither checks nor callbacks happen.
    pub async fn monitor_with<F>(
        &self,
        task_id: &str,
        mut on_update: F,
        cancel: &CancellationToken,
    ) -> Result<Task, ClientError>
    where
        F: FnMut(&Task),
    {
        let cancelled = || ClientError::PollCancelled {
            task_id: task_id.to_string(),
        };
        let mut elapsed = Duration::ZERO;

        loop {
            let task = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                result = self.source.check_status(task_id) => result?,
            };
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            debug!(
                "Tarea {task_id}: estado={} progreso={:?}",
                task.status, task.progress
            );
            on_update(&task);

            match task.status {
                TaskStatus::Completed => {
                    info!("Tarea {task_id} completada");
                    return Ok(task);
                }
                TaskStatus::Failed => {
                    let message = task
                        .error_message
                        .unwrap_or_else(|| GENERIC_TASK_FAILURE.to_string());
                    warn!("Tarea {task_id} fallida: {message}");
                    return Err(ClientError::TaskFailed(message));
                }
                TaskStatus::Pending | TaskStatus::Processing => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = sleep(self.settings.interval) => {}
            }

            elapsed += self.settings.interval;
            if elapsed >= self.settings.timeout {
                warn!(
                    "Tarea {task_id} sin estado final despues de {} ms",
                    elapsed.as_millis()
                );
                return Err(ClientError::PollTimeout {
                    task_id: task_id.to_string(),
                    waited: elapsed,
                });
            }
        }
    }
}

impl<S> TaskPoller<S>
where
    S: TaskStatusSource + Clone + Send + Sync + 'static,
{
    /// Runs a poll session on its own tokio task.
    ///
    /// Dropping the returned handle stops the session.
    pub fn spawn<F>(&self, task_id: impl Into<String>, on_update: F) -> PollHandle
    where
        F: FnMut(&Task) + Send + 'static,
    {
        let token = CancellationToken::new();
        let poller = self.clone();
        let task_id: String = task_id.into();
        let session_token = token.clone();
        let session_id = task_id.clone();

        let join = tokio::spawn(async move {
            poller
                .monitor_with(&session_id, on_update, &session_token)
                .await
        });

        PollHandle {
            task_id,
            token: token.clone(),
            _guard: token.drop_guard(),
            join,
        }
    }
}

/// Owner of a spawned poll session.
pub struct PollHandle {
    task_id: String,
    token: CancellationToken,
    _guard: DropGuard,
    join: JoinHandle<Result<Task, ClientError>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<Task, ClientError> {
        let PollHandle {
            task_id,
            join,
            _guard,
            ..
        } = self;
        match join.await {
            Ok(result) => result,
            Err(error) => {
                warn!("Sesion de seguimiento de {task_id} abortada: {error}");
                Err(ClientError::PollAborted {
                    task_id,
                    message: error.to_string(),
                })
            }
        }
    }
}
