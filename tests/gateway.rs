use std::{sync::Arc, time::Duration};

use httpmock::prelude::*;
use media_gateway::{
    BackendConfig, MediaApiClient, RetryPolicy,
    gateway::{self, AppState},
    ytdlp::YtDlp,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

const VIDEO: &str = "https://youtube.com/watch?v=abc";

async fn spawn_gateway(backend: &MockServer) -> String {
    let base = url::Url::parse(&backend.url("/api/v1")).unwrap();
    let mut config = BackendConfig::new(base);
    config.retry = RetryPolicy::new(1, Duration::from_millis(5));
    config.probe_timeout = Duration::from_secs(1);

    let client = MediaApiClient::new(config).unwrap();
    let state = AppState::new(
        Arc::new(client),
        YtDlp::with_program("yt-dlp-que-no-existe", Duration::from_secs(1)),
    );
    let app = gateway::router(state, CorsLayer::permissive());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn get_json(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn info_is_served_inside_the_envelope() {
    let backend = MockServer::start_async().await;
    backend
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/video/info");
            then.status(200).json_body(json!({
                "title": "Clip",
                "thumbnail": "https://i.example/t.jpg",
                "duration": 125,
                "uploader": "Canal",
                "view_count": 1_234_567
            }));
        })
        .await;
    let gateway = spawn_gateway(&backend).await;

    let (status, body) = get_json(&format!(
        "{gateway}/api/v1/video/info?url={}",
        urlencoding::encode(VIDEO)
    ))
    .await;

    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": {
                "title": "Clip",
                "thumbnailUrl": "https://i.example/t.jpg",
                "duration": "2:05",
                "author": "Canal",
                "viewCount": "1.2M"
            }
        })
    );
}

#[tokio::test]
async fn validation_failures_carry_their_codes() {
    let backend = MockServer::start_async().await;
    let gateway = spawn_gateway(&backend).await;

    let (status, body) = get_json(&format!("{gateway}/api/v1/video/options")).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("MISSING_URL"));

    let (status, body) = get_json(&format!(
        "{gateway}/api/v1/video/options?url={}",
        urlencoding::encode("https://example.com/clip")
    ))
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], json!("UNSUPPORTED_URL"));

    let (status, body) = get_json(&format!("{gateway}/api/v1/video/status/bad%20id")).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], json!("INVALID_TASK_ID"));
}

#[tokio::test]
async fn download_start_answers_202_and_status_alias_works() {
    let backend = MockServer::start_async().await;
    backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/video/download");
            then.status(200)
                .json_body(json!({"task_id": "t1", "status": "pending"}));
        })
        .await;
    backend
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/video/status/t1");
            then.status(200).json_body(json!({
                "success": true,
                "data": {"task_id": "t1", "status": "completed", "progress": 100, "download_url": "/files/t1.mp4"}
            }));
        })
        .await;
    let gateway = spawn_gateway(&backend).await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/api/v1/video/download"))
        .json(&json!({"url": VIDEO, "quality": "1080p"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["taskId"], json!("t1"));
    assert!(body["data"]["fileName"].as_str().unwrap().ends_with(".mp4"));

    for path in ["status", "task"] {
        let (status, body) = get_json(&format!("{gateway}/api/v1/video/{path}/t1")).await;
        assert_eq!(status, 200);
        assert_eq!(
            body["data"],
            json!({
                "taskId": "t1",
                "status": "completed",
                "progress": 100,
                "downloadUrl": "/files/t1.mp4"
            })
        );
    }
}

#[tokio::test]
async fn backend_errors_pass_through_with_status_and_message() {
    let backend = MockServer::start_async().await;
    backend
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/video/download/gone");
            then.status(404)
                .json_body(json!({"success": false, "message": "Tarea no encontrada"}));
        })
        .await;
    let gateway = spawn_gateway(&backend).await;

    let (status, body) = get_json(&format!("{gateway}/api/v1/video/download/gone")).await;

    assert_eq!(status, 404);
    assert_eq!(
        body,
        json!({"success": false, "message": "Tarea no encontrada", "error": "API_ERROR"})
    );
}

#[tokio::test]
async fn health_reports_backend_reachability() {
    let backend = MockServer::start_async().await;
    let probe = backend
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/health");
            then.status(503);
        })
        .await;
    let gateway = spawn_gateway(&backend).await;

    let (status, body) = get_json(&format!("{gateway}/api/v1/health")).await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], json!("UP"));
    assert_eq!(body["data"]["backend"], json!("DOWN"));
    probe.assert_calls_async(1).await;
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let backend = MockServer::start_async().await;
    let gateway = spawn_gateway(&backend).await;

    let (status, body) = get_json(&format!("{gateway}/api/v1/nope")).await;

    assert_eq!(status, 404);
    assert_eq!(body["error"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn service_status_and_generate_without_extractor() {
    let backend = MockServer::start_async().await;
    let gateway = spawn_gateway(&backend).await;

    let (status, body) = get_json(&format!("{gateway}/status")).await;
    assert_eq!(status, 200);
    assert_eq!(body["service"], json!("media-gateway"));

    let response = reqwest::Client::new()
        .post(format!("{gateway}/generate"))
        .json(&json!({"url": VIDEO}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("SERVER_ERROR"));

    let response = reqwest::Client::new()
        .post(format!("{gateway}/generate"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unreadable_download_bodies_are_not_missing_urls() {
    let backend = MockServer::start_async().await;
    let gateway = spawn_gateway(&backend).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{gateway}/api/v1/video/download"))
        .header("content-type", "application/json")
        .body("{no es json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("INVALID_REQUEST"));

    let response = http
        .post(format!("{gateway}/api/v1/video/download"))
        .json(&json!({"quality": "720p"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("MISSING_URL"));
}
