mod health;
mod history;
mod metrics;
mod results;
mod upload;

use crate::navigation::Route;
use crate::server::SharedState;
use axum::{
    http::Uri,
    response::Redirect,
    routing::{get, Router},
};
use health::healthcheck;
use history::history_page;
use metrics::metrics_handler;
use results::results_page;
use upload::{upload_form, upload_image};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(navigate))
        .route(Route::UPLOAD_PATH, get(upload_form).post(upload_image))
        .route("/results/{identifier}", get(results_page))
        .route(Route::HISTORY_PATH, get(history_page))
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
        .fallback(navigate)
}

/// Sends any path without a handler to the page it resolves to.
async fn navigate(uri: Uri) -> Redirect {
    let navigation = Route::resolve(uri.path());
    if navigation.redirected {
        tracing::debug!("Unknown path {}, redirecting to upload", uri.path());
    }
    Redirect::to(&navigation.route.path())
}
