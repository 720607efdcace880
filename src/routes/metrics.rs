use crate::server::SharedState;
use axum::{extract::State, http::StatusCode};
use prometheus::{Encoder, TextEncoder};

pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, StatusCode> {
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    String::from_utf8(buffer).map_err(|e| {
        tracing::error!("Metrics are not valid UTF-8: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
