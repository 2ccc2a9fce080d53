use std::{io::ErrorKind, time::Duration};

use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

const DEFAULT_PROGRAM: &str = "yt-dlp";

#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
    #[error("yt-dlp excedio el tiempo limite de {}s.", .0.as_secs())]
    Timeout(Duration),

    #[error("yt-dlp no esta instalado en el sistema. Instala yt-dlp y reinicia el servicio.")]
    NotInstalled,

    #[error("No se pudo ejecutar yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("yt-dlp no devolvio ninguna URL directa.")]
    EmptyOutput,
}

/// Thin wrapper over the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program(DEFAULT_PROGRAM, timeout)
    }

    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Runs `yt-dlp -g <url>` and returns the first printed media URL.
    pub async fn direct_url(&self, url: &str) -> Result<String, ExtractorError> {
        let output = self.run(["-g", url]).await?;
        first_url_line(&output.stdout).ok_or(ExtractorError::EmptyOutput)
    }

    async fn run<I, S>(&self, args: I) -> Result<std::process::Output, ExtractorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let command_future = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| ExtractorError::Timeout(self.timeout))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractorError::NotInstalled
                } else {
                    ExtractorError::Spawn(error)
                }
            })?;

        if !output.status.success() {
            let message = run_error_message(&output.stderr);
            warn!("yt-dlp termino con {}: {message}", output.status);
            return Err(ExtractorError::Failed(message));
        }

        debug!("yt-dlp completado ({} bytes en stdout)", output.stdout.len());
        Ok(output)
    }
}

fn first_url_line(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp no pudo completar la operacion")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "URL no soportada o invalida para descarga.".to_string()
    } else {
        message
    }
}
