use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use classifier_web::config::ClassifierApiConfig;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};

/// Requests seen by the fake classification service.
#[derive(Clone, Default)]
pub struct Backend {
    pub uploads: Arc<Mutex<Vec<(String, usize)>>>,
    pub model_types: Arc<Mutex<Vec<String>>>,
    pub empty_history: bool,
    pub failing_history: bool,
    pub delay: Option<Duration>,
}

#[derive(Deserialize)]
struct ModelQuery {
    model_type: Option<String>,
}

async fn classify(
    State(backend): State<Backend>,
    Query(query): Query<ModelQuery>,
    mut multipart: Multipart,
) -> Response {
    if let Some(delay) = backend.delay {
        tokio::time::sleep(delay).await;
    }
    backend
        .model_types
        .lock()
        .push(query.model_type.unwrap_or_default());

    let mut name = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap_or_default();
            backend.uploads.lock().push((name.clone(), bytes.len()));
        }
    }

    match name.as_str() {
        "huge.jpg" => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({"detail": "File exceeds the 5MB limit"})),
        )
            .into_response(),
        "toolarge.jpg" => StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        "broken.jpg" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": {"code": 17}})),
        )
            .into_response(),
        _ => Json(json!({"filename": "abc.jpg"})).into_response(),
    }
}

async fn results(
    State(backend): State<Backend>,
    Path(identifier): Path<String>,
    Query(query): Query<ModelQuery>,
) -> Response {
    if let Some(delay) = backend.delay {
        tokio::time::sleep(delay).await;
    }
    let model_type = query.model_type.unwrap_or_default();
    backend.model_types.lock().push(model_type.clone());

    match identifier.as_str() {
        "abc.jpg" if model_type == "mobilenet_v2" => Json(json!({
            "results": [{"class_name": "Granny Smith", "confidence": 0.61}],
            "timestamp": "2024-03-01T10:15:30"
        }))
        .into_response(),
        "abc.jpg" => Json(json!({
            "results": [
                {"class_name": "apple", "confidence": 0.9312},
                {"class_name": "pear", "confidence": 0.05}
            ],
            "timestamp": "2024-03-01T10:15:30"
        }))
        .into_response(),
        "pending.jpg" => Json(json!({"timestamp": null})).into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Results not found"})),
        )
            .into_response(),
    }
}

async fn history(State(backend): State<Backend>) -> Response {
    if backend.failing_history {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "History store unavailable"})),
        )
            .into_response();
    }
    if backend.empty_history {
        return Json(json!({"history": []})).into_response();
    }
    Json(json!({"history": [
        {"filename": "abc.jpg", "timestamp": "2024-03-02T08:00:00"},
        {"filename": "kiwi.png", "timestamp": "2024-03-01T08:00:00Z"},
        {"filename": "pear.png", "timestamp": "sometime"}
    ]}))
    .into_response()
}

pub fn backend_router(backend: Backend) -> Router {
    Router::new()
        .route("/api/classify", post(classify))
        .route("/api/results/{identifier}", get(results))
        .route("/api/history", get(history))
        .with_state(backend)
}

pub async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    listener.local_addr().expect("local addr")
}

pub fn api_config(addr: SocketAddr, timeout_ms: u64) -> ClassifierApiConfig {
    ClassifierApiConfig {
        base_url: format!("http://{}/api", addr),
        timeout_ms,
        preview_origin: format!("http://{}", addr),
        uploads_path: "uploads".to_string(),
    }
}
