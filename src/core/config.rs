use std::str::FromStr;
use std::{env, fs, io::Write, path::PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    server: ServerSettings,
    runtime: RuntimeSettings,
    api: ApiSettings,
    security: SecuritySettings,
    cors: CorsSettings,
    database: DatabaseSettings,
    grading: GradingSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
struct ServerSettings {
    host: String,
    port: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SecuritySettings {
    pub(crate) secret_key: String,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    url: String,
    pub(crate) max_connections: u32,
    pub(crate) acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        self.url.clone()
    }
}

/// Limits and policies applied to submissions and teacher grading.
#[derive(Debug, Clone)]
pub(crate) struct GradingSettings {
    pub(crate) status_policy: StatusPolicy,
    pub(crate) eager_recompute: bool,
    pub(crate) max_answers_per_submission: usize,
    pub(crate) max_answer_length: usize,
    pub(crate) max_feedback_length: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    fn from_env(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("production" | "prod") => Environment::Production,
            Some("staging") => Environment::Staging,
            Some("test" | "testing") => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// How status strings that do not name a known attempt status are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusPolicy {
    /// Unknown values fall back to `in_progress`.
    Lenient,
    /// Unknown values are rejected as a validation error.
    Strict,
}

impl StatusPolicy {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            StatusPolicy::Lenient => "lenient",
            StatusPolicy::Strict => "strict",
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "lenient" => Ok(StatusPolicy::Lenient),
            "strict" => Ok(StatusPolicy::Strict),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment = Environment::from_env(var("QUIZ_ENV").as_deref());
        let strict_config =
            flag("QUIZ_STRICT_CONFIG", false) || environment == Environment::Production;

        let settings = Self {
            server: ServerSettings {
                host: var_or("QUIZ_HOST", "0.0.0.0"),
                port: parse_var("QUIZ_PORT", 8000)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                project_name: var_or("PROJECT_NAME", "Quiz Attempts API"),
                version: var_or("VERSION", env!("CARGO_PKG_VERSION")),
                api_v1_str: var_or("API_V1_STR", "/api/v1"),
            },
            security: SecuritySettings {
                secret_key: var("SECRET_KEY").unwrap_or_else(load_or_create_secret_key),
                algorithm: var_or("ALGORITHM", "HS256"),
            },
            cors: CorsSettings { origins: parse_cors_origins(var("BACKEND_CORS_ORIGINS"))? },
            database: DatabaseSettings {
                url: database_url(strict_config)?,
                max_connections: parse_var("DB_MAX_CONNECTIONS", 30)?,
                acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT_SECS", 30)?,
            },
            grading: GradingSettings {
                status_policy: parse_var("ATTEMPT_STATUS_POLICY", StatusPolicy::Lenient)?,
                eager_recompute: flag("GRADING_EAGER_RECOMPUTE", false),
                max_answers_per_submission: parse_var("MAX_ANSWERS_PER_SUBMISSION", 500)?,
                max_answer_length: parse_var("MAX_ANSWER_LENGTH", 20_000)?,
                max_feedback_length: parse_var("MAX_FEEDBACK_LENGTH", 5_000)?,
            },
            telemetry: TelemetrySettings {
                log_level: var_or("QUIZ_LOG_LEVEL", "info"),
                json: flag("QUIZ_LOG_JSON", false),
                prometheus_enabled: flag("PROMETHEUS_ENABLED", false),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("QUIZ_PORT", self.server.port as usize),
            ("DB_MAX_CONNECTIONS", self.database.max_connections as usize),
            ("DB_ACQUIRE_TIMEOUT_SECS", self.database.acquire_timeout_secs as usize),
            ("MAX_ANSWERS_PER_SUBMISSION", self.grading.max_answers_per_submission),
            ("MAX_ANSWER_LENGTH", self.grading.max_answer_length),
            ("MAX_FEEDBACK_LENGTH", self.grading.max_feedback_length),
        ];
        if let Some((field, _)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue { field, value: "0".to_string() });
        }

        if self.server.host.is_empty() {
            return Err(ConfigError::InvalidValue { field: "QUIZ_HOST", value: String::new() });
        }
        if !self.api.api_v1_str.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "API_V1_STR",
                value: self.api.api_v1_str.clone(),
            });
        }

        Ok(())
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn flag(key: &str, default: bool) -> bool {
    var(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_var<T: FromStr>(field: &'static str, default: T) -> Result<T, ConfigError> {
    match var(field) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue { field, value }),
        None => Ok(default),
    }
}

/// `DATABASE_URL` wins; otherwise the URL is assembled from `POSTGRES_*`.
/// Strict configs refuse a passwordless assembled URL.
fn database_url(strict: bool) -> Result<String, ConfigError> {
    if let Some(url) = var("DATABASE_URL") {
        return Ok(url);
    }

    let password = var("POSTGRES_PASSWORD").unwrap_or_default();
    if strict && password.is_empty() {
        return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
    }

    let port: u16 = parse_var("POSTGRES_PORT", 5432)?;
    Ok(format!(
        "postgresql://{}:{}@{}:{}/{}",
        var_or("POSTGRES_USER", "quiz"),
        password,
        var_or("POSTGRES_SERVER", "localhost"),
        port,
        var_or("POSTGRES_DB", "quiz_attempts"),
    ))
}

/// Accepts a JSON array or a comma-separated list.
fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let origins: Vec<String> = match value {
        Some(raw) if raw.starts_with('[') => {
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?
        }
        Some(raw) => raw.split(',').map(str::trim).map(str::to_string).collect(),
        None => Vec::new(),
    };

    let origins: Vec<String> = origins.into_iter().filter(|origin| !origin.is_empty()).collect();
    if origins.is_empty() {
        return Ok(DEFAULT_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect());
    }
    Ok(origins)
}

/// Reads the JWT secret from `QUIZ_SECRET_FILE` (default `.secret_key` next to
/// the manifest), creating it with a random key on first start.
fn load_or_create_secret_key() -> String {
    let path = var("QUIZ_SECRET_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".secret_key"));

    let read_existing = || {
        fs::read_to_string(&path)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    if let Some(existing) = read_existing() {
        return existing;
    }

    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    let generated = URL_SAFE_NO_PAD.encode(bytes);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

    match options.open(&path) {
        Ok(mut file) => {
            if let Err(err) = file.write_all(generated.as_bytes()) {
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    "Failed to persist secret key"
                );
            }
            generated
        }
        // Another process won the race; use its key.
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            read_existing().unwrap_or(generated)
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "Failed to create secret key file"
            );
            generated
        }
    }
}
