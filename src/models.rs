use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Backend model that processes an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelector {
    #[default]
    FruitClassifier,
    MobilenetV2,
}

impl ModelSelector {
    pub const ALL: [ModelSelector; 2] = [ModelSelector::FruitClassifier, ModelSelector::MobilenetV2];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSelector::FruitClassifier => "fruit_classifier",
            ModelSelector::MobilenetV2 => "mobilenet_v2",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelSelector::FruitClassifier => "Fruit Classifier",
            ModelSelector::MobilenetV2 => "MobileNet V2 (General)",
        }
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fruit_classifier" => Ok(Self::FruitClassifier),
            "mobilenet_v2" => Ok(Self::MobilenetV2),
            other => Err(format!(
                "{} is not a supported model. Use either `fruit_classifier` or `mobilenet_v2`.",
                other
            )),
        }
    }
}

impl TryFrom<String> for ModelSelector {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Where the bytes of a selected image live.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageContent {
    InMemory(Bytes),
    File(PathBuf),
}

/// A file the user picked for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedImage {
    pub name: String,
    pub media_type: String,
    pub content: ImageContent,
}

impl SelectedImage {
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content: ImageContent::InMemory(bytes.into()),
        }
    }

    /// Media type is declared from the file extension, the way a file picker would.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let media_type = image::ImageFormat::from_path(&path)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string());

        Self {
            name,
            media_type,
            content: ImageContent::File(path),
        }
    }

    pub fn size_hint(&self) -> Option<u64> {
        match &self.content {
            ImageContent::InMemory(bytes) => Some(bytes.len() as u64),
            ImageContent::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
        }
    }

    pub async fn read(&self) -> std::io::Result<Bytes> {
        match &self.content {
            ImageContent::InMemory(bytes) => Ok(bytes.clone()),
            ImageContent::File(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

/// Renderable encoding of a selected image, a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRepresentation(pub String);

impl PreviewRepresentation {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    #[serde(rename = "class_name")]
    pub label: String,
    pub confidence: f64,
}

impl ScoredLabel {
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.confidence * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRecord {
    pub identifier: String,
    pub results: Vec<ScoredLabel>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One past classification. An unreadable timestamp leaves `timestamp` empty
/// instead of failing the whole history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "filename")]
    pub identifier: String,
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Percentage of the upload body handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct UploadProgress(u8);

impl UploadProgress {
    pub const ZERO: UploadProgress = UploadProgress(0);
    pub const COMPLETE: UploadProgress = UploadProgress(100);

    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    pub fn from_bytes(loaded: u64, total: u64) -> Self {
        if total == 0 {
            return Self::ZERO;
        }
        let percent = ((loaded.min(total) as f64 * 100.0) / total as f64).round();
        Self(percent as u8)
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    pub fn is_complete(&self) -> bool {
        self.0 == 100
    }
}

impl fmt::Display for UploadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifyResponse {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultsResponse {
    #[serde(default)]
    pub results: Option<Vec<ScoredLabel>>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceErrorBody {
    pub detail: Option<serde_json::Value>,
}

/// Accepts RFC 3339 and naive ISO 8601 timestamps, with either `T` or a space
/// between date and time. Naive values are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::from_str(raw)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp `{}`: {}", raw, e))
}

fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(raw)) => match parse_timestamp(&raw) {
            Ok(timestamp) => Some(timestamp),
            Err(e) => {
                tracing::warn!("Ignoring history timestamp: {}", e);
                None
            }
        },
        Some(other) => {
            tracing::warn!("Ignoring non-string history timestamp {}", other);
            None
        }
    })
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_model_selector_parsing() {
        assert_eq!(
            "fruit_classifier".parse::<ModelSelector>(),
            Ok(ModelSelector::FruitClassifier)
        );
        assert_eq!(
            "MobileNet_V2".parse::<ModelSelector>(),
            Ok(ModelSelector::MobilenetV2)
        );
        assert!("resnet".parse::<ModelSelector>().is_err());
        assert_eq!(ModelSelector::default(), ModelSelector::FruitClassifier);
    }

    #[test]
    fn test_upload_progress_from_bytes() {
        assert_eq!(UploadProgress::from_bytes(0, 200).percent(), 0);
        assert_eq!(UploadProgress::from_bytes(1, 3).percent(), 33);
        assert_eq!(UploadProgress::from_bytes(2, 3).percent(), 67);
        assert_eq!(UploadProgress::from_bytes(500, 200).percent(), 100);
        assert_eq!(UploadProgress::from_bytes(10, 0), UploadProgress::ZERO);
        assert_eq!(UploadProgress::new(250), UploadProgress::COMPLETE);
    }

    #[test]
    fn test_history_timestamps_accept_naive_and_offset_forms() {
        let body = r#"{"history": [
            {"filename": "a.jpg", "timestamp": "2024-03-01T10:15:30.250000"},
            {"filename": "b.jpg", "timestamp": "2024-03-01T12:15:30+02:00"}
        ]}"#;
        let parsed: HistoryResponse = serde_json::from_str(body).unwrap();

        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap();
        assert_eq!(parsed.history[0].identifier, "a.jpg");
        assert_eq!(
            parsed.history[0].timestamp.map(|t| t.timestamp()),
            Some(expected.timestamp())
        );
        assert_eq!(parsed.history[1].timestamp, Some(expected));
    }

    #[test]
    fn test_malformed_history_timestamp_keeps_other_entries() {
        let body = r#"{"history": [
            {"filename": "a.jpg", "timestamp": "yesterday"},
            {"filename": "b.jpg", "timestamp": "2024-03-01 10:15:30"},
            {"filename": "c.jpg", "timestamp": 1709288130},
            {"filename": "d.jpg"}
        ]}"#;
        let parsed: HistoryResponse = serde_json::from_str(body).unwrap();

        let names: Vec<&str> = parsed.history.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        assert_eq!(parsed.history[0].timestamp, None);
        assert_eq!(
            parsed.history[1].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap())
        );
        assert_eq!(parsed.history[2].timestamp, None);
        assert_eq!(parsed.history[3].timestamp, None);
    }

    #[test]
    fn test_results_response_without_results_is_none() {
        let parsed: ResultsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_none());

        let parsed: ResultsResponse = serde_json::from_str(
            r#"{"results": [{"class_name": "apple", "confidence": 0.9312}]}"#,
        )
        .unwrap();
        let results = parsed.results.unwrap();
        assert_eq!(results[0].label, "apple");
        assert_eq!(results[0].confidence_percent(), "93.12%");
    }

    #[test]
    fn test_selected_image_from_path_declares_media_type() {
        let image = SelectedImage::from_path("/tmp/photo.JPG");
        assert_eq!(image.name, "photo.JPG");
        assert_eq!(image.media_type, "image/jpeg");

        let notes = SelectedImage::from_path("/tmp/notes.txt");
        assert_eq!(notes.media_type, "application/octet-stream");
    }
}
