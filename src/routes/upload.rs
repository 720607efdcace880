use crate::{
    image_utils::format_file_size,
    models::{ModelSelector, SelectedImage, UploadProgress},
    server::SharedState,
    views,
    workflow::{Selection, UploadOutcome, UploadState, UploadWorkflow},
};
use axum::{
    body::Body,
    extract::{
        multipart::{Multipart, MultipartError},
        State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::{convert::Infallible, time::Instant};
use tokio::sync::mpsc;
use tokio_stream::{
    wrappers::{ReceiverStream, WatchStream},
    StreamExt,
};
use tracing::{instrument, Instrument};

/// Form fields of one upload submission.
#[derive(Debug, Default)]
struct UploadForm {
    image: Option<SelectedImage>,
    model_type: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty, unnamed part when no file was picked.
                if !name.is_empty() || !bytes.is_empty() {
                    form.image = Some(SelectedImage::from_bytes(name, media_type, bytes));
                }
            }
            Some("model_type") => form.model_type = Some(field.text().await?),
            other => tracing::debug!("Ignoring upload field {:?}", other),
        }
    }
    Ok(form)
}

fn render(state: &SharedState, workflow: &UploadWorkflow, model: ModelSelector) -> Html<String> {
    Html(views::upload_page(workflow.state(), &state.models, model))
}

pub async fn upload_form(State(state): State<SharedState>) -> Html<String> {
    state.metrics.record_request("upload");
    render(&state, &UploadWorkflow::new(), state.models.default)
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Response {
    state.metrics.record_request("upload");

    let form = match read_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => {
            let status = e.status();
            tracing::warn!("Rejected upload: {}", e);
            let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                format!(
                    "Image too large: the maximum upload size is {}.",
                    format_file_size(state.max_upload_bytes as u64)
                )
            } else {
                format!("Malformed upload: {}", e.body_text())
            };
            let workflow = UploadWorkflow::rejected(message);
            return (status, render(&state, &workflow, state.models.default)).into_response();
        }
    };

    let model = state.models.resolve(form.model_type.as_deref());
    let mut workflow = UploadWorkflow::new();
    if let Some(image) = form.image {
        workflow.select_and_preview(image).await;
    }
    let selection = match workflow.state() {
        current if current.can_submit() => current.selection().cloned(),
        _ => None,
    };
    let Some(selection) = selection else {
        if matches!(workflow.state(), UploadState::Idle) {
            // Sets the "no file" message without reaching the service.
            workflow.submit(state.client.as_ref(), model).await;
        }
        return (StatusCode::BAD_REQUEST, render(&state, &workflow, model)).into_response();
    };

    stream_submission(state, workflow, selection, model)
}

/// Streams the upload page while the submission runs, one fragment per
/// progress step, and ends it with the outcome.
fn stream_submission(
    state: SharedState,
    mut workflow: UploadWorkflow,
    selection: Selection,
    model: ModelSelector,
) -> Response {
    let (tx, rx) = mpsc::channel::<Result<String, Infallible>>(16);
    let submitting = UploadState::Submitting {
        selection,
        model,
        progress: UploadProgress::ZERO,
    };

    tokio::spawn(
        async move {
            let _ = tx
                .send(Ok(views::upload_started(&submitting, &state.models, model)))
                .await;

            let started = Instant::now();
            let mut progress = WatchStream::new(workflow.subscribe_progress());
            let mut shown = UploadProgress::ZERO;
            let outcome = {
                let submission = workflow.submit(state.client.as_ref(), model);
                tokio::pin!(submission);
                loop {
                    tokio::select! {
                        biased;
                        Some(update) = progress.next() => {
                            if update > shown {
                                shown = update;
                                let _ = tx.send(Ok(views::upload_progress(update))).await;
                            }
                        }
                        outcome = &mut submission => break outcome,
                    }
                }
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                UploadOutcome::Navigate { .. } => {
                    state.metrics.record_upload(elapsed_ms, "succeeded");
                    if !shown.is_complete() {
                        let _ = tx
                            .send(Ok(views::upload_progress(UploadProgress::COMPLETE)))
                            .await;
                    }
                }
                UploadOutcome::Stay => {
                    state.metrics.record_upload(elapsed_ms, "failed");
                    state
                        .metrics
                        .record_backend_error("upload", workflow.error_kind().unwrap_or("unknown"));
                }
            }

            let _ = tx
                .send(Ok(views::upload_finished(workflow.state(), &state.models, model)))
                .await;
        }
        .in_current_span(),
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build upload response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
