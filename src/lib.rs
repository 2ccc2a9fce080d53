//! Client-side plumbing of a media download gateway: URL validation,
//! backend response normalization, retries, a short-lived read cache and
//! task status polling, plus the HTTP surface that exposes them.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalize;
pub mod poller;
pub mod retry;
pub mod validator;
pub mod ytdlp;

pub use client::{DownloadSelection, MediaApiClient};
pub use config::{BackendConfig, GatewayConfig};
pub use error::ClientError;
pub use models::{DownloadOption, DownloadStarted, Task, TaskStatus, VideoPreview};
pub use poller::{PollHandle, PollSettings, TaskPoller, TaskStatusSource};
pub use retry::{RetryPolicy, Retryable, with_retry};
pub use validator::{MediaSourceUrl, PlatformAllowList, ValidationCode, ValidationError};
