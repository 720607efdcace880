use crate::{
    server::SharedState,
    views,
    workflow::{HistoryState, HistoryWorkflow},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
};
use chrono::Utc;
use tracing::instrument;

#[instrument(skip(state))]
pub async fn history_page(State(state): State<SharedState>) -> impl IntoResponse {
    state.metrics.record_request("history");

    let mut workflow = HistoryWorkflow::new();
    workflow.load(state.client.as_ref()).await;
    let status = match workflow.state() {
        HistoryState::Failed(_) => {
            state
                .metrics
                .record_backend_error("history", workflow.error_kind().unwrap_or("unknown"));
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::OK,
    };

    (
        status,
        Html(views::history_page(workflow.state(), &state.links, Utc::now())),
    )
}
