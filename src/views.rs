//! HTML pages rendered from workflow state.

use crate::config::{ClassifierApiConfig, ModelsConfig};
use crate::image_utils::format_file_size;
use crate::models::{ModelSelector, ScoredLabel, UploadProgress};
use crate::navigation::Route;
use crate::workflow::{HistoryState, PreviewState, ResultsState, ResultsWorkflow, UploadState};
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::fmt::Write;

pub const NO_HISTORY_MESSAGE: &str =
    "No classification history found. Try classifying some images first!";

/// Builds links to uploaded images on the static origin.
#[derive(Debug, Clone)]
pub struct PreviewLinks {
    origin: Url,
    uploads_path: String,
}

impl PreviewLinks {
    pub fn from_config(config: &ClassifierApiConfig) -> Result<Self, String> {
        Ok(Self {
            origin: config.get_preview_origin()?,
            uploads_path: config.uploads_path.trim_matches('/').to_string(),
        })
    }

    pub fn image_url(&self, identifier: &str) -> String {
        let mut url = self.origin.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(self.uploads_path.split('/').filter(|s| !s.is_empty()));
            path.push(identifier);
        }
        url.to_string()
    }
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const LAYOUT_CLOSE: &str = "\n</main>\n<footer>Image Classifier</footer>\n</body>\n</html>";

fn layout_open(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | Image Classifier</title>
</head>
<body>
<nav class="navbar"><a href="{upload}">Upload</a> <a href="{history}">History</a></nav>
<main>
<h1>{title}</h1>
"#,
        title = escape(title),
        upload = Route::UPLOAD_PATH,
        history = Route::HISTORY_PATH,
    )
}

fn layout(title: &str, body: &str) -> String {
    format!("{}{}{}", layout_open(title), body, LAYOUT_CLOSE)
}

fn alert(severity: &str, message: &str) -> String {
    format!(
        r#"<div class="alert alert-{}" role="alert">{}</div>"#,
        severity,
        escape(message)
    )
}

fn model_options(models: &ModelsConfig, selected: ModelSelector) -> String {
    models
        .accepted
        .iter()
        .map(|model| {
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                model.as_str(),
                if *model == selected { " selected" } else { "" },
                escape(model.display_name())
            )
        })
        .collect()
}

const UPLOAD_TITLE: &str = "Image Classification";

pub fn upload_page(state: &UploadState, models: &ModelsConfig, selected: ModelSelector) -> String {
    layout(UPLOAD_TITLE, &upload_body(state, models, selected))
}

fn upload_body(state: &UploadState, models: &ModelsConfig, selected: ModelSelector) -> String {
    let mut body = String::new();
    let submitting = matches!(state, UploadState::Submitting { .. });

    let _ = write!(
        body,
        r#"<p>Upload an image to classify it</p>
<form method="post" action="{action}" enctype="multipart/form-data">
<input type="file" name="file" accept="image/*" required{disabled}>
<p>Supported formats: JPEG, PNG, GIF</p>
<label for="model_type">Model Type</label>
<select id="model_type" name="model_type"{disabled}>{options}</select>
"#,
        action = Route::UPLOAD_PATH,
        disabled = if submitting { " disabled" } else { "" },
        options = model_options(models, selected),
    );

    if let Some(message) = state.error_message() {
        body.push_str(&alert("error", message));
    }

    if let UploadState::Submitting { progress, .. } = state {
        let _ = write!(
            body,
            r#"<progress max="100" value="{0}"></progress><p>Uploading... {0}%</p>"#,
            progress.percent()
        );
    } else {
        body.push_str(r#"<button type="submit">Classify Image</button>"#);
    }
    body.push_str("</form>\n<section class=\"preview\"><h2>Image Preview</h2>");

    match state.selection() {
        Some(selection) => {
            if let PreviewState::Ready(preview) = &selection.preview {
                let _ = write!(
                    body,
                    r#"<img src="{}" alt="Preview">"#,
                    escape(preview.as_str())
                );
            }
            let size = selection
                .image
                .size_hint()
                .map(format_file_size)
                .unwrap_or_default();
            let _ = write!(
                body,
                "<p>{} {}</p>",
                escape(&selection.image.name),
                escape(&size)
            );
        }
        None => body.push_str("<p>No image selected</p>"),
    }
    body.push_str("</section>");
    body
}

/// Opening of a streamed upload page, rendered while the submission is in flight.
/// [`upload_progress`] fragments follow and [`upload_finished`] closes it.
pub fn upload_started(state: &UploadState, models: &ModelsConfig, selected: ModelSelector) -> String {
    format!(
        "{}{}\n<section class=\"progress-log\">\n",
        layout_open(UPLOAD_TITLE),
        upload_body(state, models, selected)
    )
}

pub fn upload_progress(progress: UploadProgress) -> String {
    format!(
        "<p class=\"progress-update\"><progress max=\"100\" value=\"{0}\"></progress> Uploading... {0}%</p>\n",
        progress.percent()
    )
}

/// Closes a streamed upload page. A success hands off to the results page,
/// anything else shows the form again with its message.
pub fn upload_finished(state: &UploadState, models: &ModelsConfig, selected: ModelSelector) -> String {
    let mut body = String::from("</section>\n");
    match state {
        UploadState::Succeeded { identifier, model } => {
            let href = escape(&Route::results_with_model(identifier, *model));
            let _ = write!(
                body,
                r#"<meta http-equiv="refresh" content="0;url={0}">
<p>Upload complete. <a href="{0}">View classification results</a></p>"#,
                href
            );
        }
        other => body.push_str(&upload_body(other, models, selected)),
    }
    body.push_str(LAYOUT_CLOSE);
    body
}

fn label_row(result: &ScoredLabel) -> String {
    let percent = (result.confidence * 100.0).clamp(0.0, 100.0);
    format!(
        r#"<div class="label"><span>{}</span> <span>{}</span><progress max="100" value="{:.2}"></progress></div>"#,
        escape(&result.label),
        result.confidence_percent(),
        percent
    )
}

pub fn results_page(
    workflow: &ResultsWorkflow,
    models: &ModelsConfig,
    links: &PreviewLinks,
) -> String {
    let identifier = workflow.identifier();
    let back = format!(
        r#"<p><a href="{}">Back to History</a></p>"#,
        Route::HISTORY_PATH
    );

    let body = match workflow.state() {
        ResultsState::Loading => "<p>Loading...</p>".to_string(),
        ResultsState::Failed(message) => format!("{}{}", back, alert("error", message)),
        ResultsState::Empty => format!("{}{}", back, alert("info", crate::client::NOT_FOUND_MESSAGE)),
        ResultsState::Loaded(record) => {
            let mut body = back;
            let _ = write!(
                body,
                r#"<section class="image"><img src="{src}" alt="Classified image"><h2>{name}</h2></section>
<section class="results"><h2>Detected Classes</h2>
<form method="get" action="{action}">
<label for="model_type">Model Type</label>
<select id="model_type" name="model_type">{options}</select>
<button type="submit">Reclassify</button>
</form>
"#,
                src = escape(&links.image_url(identifier)),
                name = escape(identifier),
                action = escape(&Route::Results(identifier.to_string()).path()),
                options = model_options(models, workflow.model()),
            );
            if record.results.is_empty() {
                body.push_str("<p>No classes detected.</p>");
            }
            for result in &record.results {
                body.push_str(&label_row(result));
            }
            body.push_str("</section>");
            body
        }
    };

    layout("Classification Results", &body)
}

pub fn history_page(state: &HistoryState, links: &PreviewLinks, now: DateTime<Utc>) -> String {
    let body = match state {
        HistoryState::Loading => "<p>Loading...</p>".to_string(),
        HistoryState::Failed(message) => alert("error", message),
        HistoryState::Loaded(entries) if entries.is_empty() => alert("info", NO_HISTORY_MESSAGE),
        HistoryState::Loaded(entries) => {
            let mut body = String::from(r#"<div class="grid">"#);
            for entry in entries {
                let _ = write!(
                    body,
                    r#"<a class="card" href="{href}"><img src="{src}" alt="Classified image"><h2>{name}</h2><p>{age}</p></a>"#,
                    href = escape(&Route::Results(entry.identifier.clone()).path()),
                    src = escape(&links.image_url(&entry.identifier)),
                    name = escape(&entry.identifier),
                    age = match entry.timestamp {
                        Some(timestamp) => format!("Classified {}", describe_age(timestamp, now)),
                        None => "Classification time unknown".to_string(),
                    },
                );
            }
            body.push_str("</div>");
            body
        }
    };

    layout("Classification History", &body)
}

/// Relative, human readable age of `timestamp`, e.g. `5 minutes ago`.
pub fn describe_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    if elapsed.num_seconds() < 0 {
        return "just now".to_string();
    }

    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };

    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();
    if minutes < 1 {
        "less than a minute ago".to_string()
    } else if minutes < 60 {
        plural(minutes, "minute")
    } else if hours < 24 {
        format!("about {}", plural(hours, "hour"))
    } else if days < 30 {
        plural(days, "day")
    } else if days < 365 {
        format!("about {}", plural(days / 30, "month"))
    } else {
        format!("about {}", plural(days / 365, "year"))
    }
}
