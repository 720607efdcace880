use crate::models::ModelSelector;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub classifier_api: ClassifierApiConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.classifier_api.validate()?;
        self.models.validate()?;
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote classification service. There is deliberately no default endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub preview_origin: String,
    #[serde(default = "default_uploads_path")]
    pub uploads_path: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_uploads_path() -> String {
    "uploads".to_string()
}

impl ClassifierApiConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn get_base_url(&self) -> Result<Url, String> {
        parse_http_url("classifier_api.base_url", &self.base_url)
    }

    pub fn get_preview_origin(&self) -> Result<Url, String> {
        parse_http_url("classifier_api.preview_origin", &self.preview_origin)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.get_base_url()?;
        self.get_preview_origin()?;
        if self.timeout_ms == 0 {
            return Err("classifier_api.timeout_ms must be greater than zero".into());
        }
        Ok(())
    }
}

fn parse_http_url(key: &str, raw: &str) -> Result<Url, String> {
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(format!("{} must start with http:// or https://", key));
    }
    Url::parse(raw).map_err(|e| format!("{} is not a valid URL: {}", key, e))
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ModelsConfig {
    #[serde(default = "default_accepted_models")]
    pub accepted: Vec<ModelSelector>,
    #[serde(default)]
    pub default: ModelSelector,
}

fn default_accepted_models() -> Vec<ModelSelector> {
    ModelSelector::ALL.to_vec()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            accepted: default_accepted_models(),
            default: ModelSelector::default(),
        }
    }
}

impl ModelsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.accepted.is_empty() {
            return Err("models.accepted must list at least one model".into());
        }
        if !self.accepted.contains(&self.default) {
            return Err(format!(
                "models.default `{}` is not one of models.accepted",
                self.default
            ));
        }
        Ok(())
    }

    /// Missing or unrecognised selectors fall back to the configured default.
    pub fn resolve(&self, requested: Option<&str>) -> ModelSelector {
        let Some(raw) = requested.filter(|raw| !raw.trim().is_empty()) else {
            return self.default;
        };
        match raw.parse::<ModelSelector>() {
            Ok(model) if self.accepted.contains(&model) => model,
            Ok(model) => {
                tracing::warn!("Model {} is not enabled, using {}", model, self.default);
                self.default
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.default
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), &environment)
}

/// Layers `base.yaml`, `{environment}.yaml` and `WEB_*` variables. Runs before
/// logging is installed, so failures are only reported through the error.
pub fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("WEB")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate().map_err(|e| {
        config::ConfigError::Message(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}
