use std::sync::Arc;

use media_gateway::{
    GatewayConfig, MediaApiClient,
    gateway::{self, ApiError, AppState},
    ytdlp::YtDlp,
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "media_gateway=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = GatewayConfig::from_env().map_err(|error| ApiError::internal(error.to_string()))?;

    info!(
        "Backend de extraccion: {} (cache {}s, sondeo cada {} ms)",
        config.backend.base_url,
        config.backend.cache_ttl.as_secs(),
        config.backend.poll.interval.as_millis()
    );
    if config.backend.legacy_task_path {
        info!("LEGACY_TASK_PATH=true: se consultara /video/task/{{id}}.");
    }

    let client = MediaApiClient::new(config.backend).map_err(|error| ApiError::internal(error.to_string()))?;
    let state = AppState::new(Arc::new(client), YtDlp::new(config.yt_dlp_timeout));
    let app = gateway::router(state, gateway::cors_layer(&config.allowed_origins));

    let addr = config.bind_addr;
    let listener = TcpListener::bind(&addr).await.map_err(|error| {
        ApiError::internal(format!("No se pudo iniciar el puerto {addr}: {error}"))
    })?;

    info!("Gateway listo en http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("Error del servidor HTTP: {error}")))
}
