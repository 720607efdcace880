use crate::models::{PreviewRepresentation, SelectedImage};
use base64::Engine;
use bytes::Bytes;
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

const IMAGE_MEDIA_PREFIX: &str = "image/";
const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

#[derive(Error, Debug)]
pub enum ImageUtilsError {
    #[error("Invalid image file: {0}")]
    InvalidInput(String),
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to load image: {0}")]
    Load(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Checks the declared media type only, no content sniffing. The prefix match
/// is exact: `IMAGE/PNG` or ` image/png` are not images.
pub fn is_valid_image(file: &SelectedImage) -> bool {
    file.media_type.starts_with(IMAGE_MEDIA_PREFIX)
}

/// Reads the whole file and encodes it as a `data:` URL.
#[instrument(skip(file), fields(name = %file.name))]
pub async fn create_image_preview(
    file: &SelectedImage,
) -> Result<PreviewRepresentation, ImageUtilsError> {
    if !is_valid_image(file) {
        return Err(ImageUtilsError::InvalidInput(format!(
            "{} has media type {}",
            file.name, file.media_type
        )));
    }

    let bytes = file.read().await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    tracing::debug!("Created preview of {} bytes", bytes.len());

    Ok(PreviewRepresentation(format!(
        "data:{};base64,{}",
        file.media_type,
        encoded
    )))
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    let mut next_unit = 1024_u64;
    while exponent < SIZE_UNITS.len() - 1 && bytes >= next_unit {
        exponent += 1;
        next_unit = next_unit.saturating_mul(1024);
    }
    let value = bytes as f64 / 1024_f64.powi(exponent as i32);

    format!("{:.2} {}", value, SIZE_UNITS[exponent])
}

/// Resolves `src` (a `data:` URL, an http(s) URL or a local path) and decodes
/// just enough of the image to learn its size. `timeout` bounds the whole
/// http(s) fetch.
#[instrument(skip(src))]
pub async fn get_image_dimensions(
    src: &str,
    timeout: Duration,
) -> Result<ImageDimensions, ImageUtilsError> {
    let bytes = load_source(src, timeout).await?;

    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageUtilsError::Load(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ImageUtilsError::Load(e.to_string()))?;

    Ok(ImageDimensions { width, height })
}

async fn load_source(src: &str, timeout: Duration) -> Result<Bytes, ImageUtilsError> {
    if let Some(data_url) = src.strip_prefix("data:") {
        let (_, payload) = data_url
            .split_once(";base64,")
            .ok_or_else(|| ImageUtilsError::Load("unsupported data URL encoding".into()))?;
        return base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(Bytes::from)
            .map_err(|e| ImageUtilsError::Load(format!("invalid base64 payload: {}", e)));
    }

    if src.starts_with("http://") || src.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageUtilsError::Load(e.to_string()))?;
        let response = client.get(src).send().await.map_err(fetch_error)?;
        if !response.status().is_success() {
            return Err(ImageUtilsError::Load(format!(
                "GET {} returned HTTP {}",
                src,
                response.status()
            )));
        }
        return response.bytes().await.map_err(fetch_error);
    }

    tokio::fs::read(src)
        .await
        .map(Bytes::from)
        .map_err(|e| ImageUtilsError::Load(format!("{}: {}", src, e)))
}

fn fetch_error(err: reqwest::Error) -> ImageUtilsError {
    if err.is_timeout() {
        ImageUtilsError::Load("timed out fetching image".into())
    } else {
        ImageUtilsError::Load(err.to_string())
    }
}
