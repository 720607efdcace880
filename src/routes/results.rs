use crate::{
    server::SharedState,
    views,
    workflow::{ResultsState, ResultsWorkflow},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ResultsParams {
    model_type: Option<String>,
}

#[instrument(skip(state))]
pub async fn results_page(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
    Query(params): Query<ResultsParams>,
) -> impl IntoResponse {
    state.metrics.record_request("results");

    let model = state.models.resolve(params.model_type.as_deref());
    let mut workflow = ResultsWorkflow::new(identifier, model);
    workflow.load(state.client.as_ref()).await;
    let status = match workflow.state() {
        ResultsState::Loaded(_) | ResultsState::Loading => StatusCode::OK,
        ResultsState::Empty => StatusCode::NOT_FOUND,
        ResultsState::Failed(_) => {
            state
                .metrics
                .record_backend_error("results", workflow.error_kind().unwrap_or("unknown"));
            StatusCode::BAD_GATEWAY
        }
    };

    (
        status,
        Html(views::results_page(&workflow, &state.models, &state.links)),
    )
}
