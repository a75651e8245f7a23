use crate::models::BatchPolicy;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 4000;
const CONFIG_DIR: &str = "config";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";
const DEFAULT_RAZORPAY_URL: &str = "https://api.razorpay.com/v1";
/// Selects the process-local store instead of a SQL database.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Payment gateway credentials and order conventions
#[derive(Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RazorpayConfig {
    #[validate(length(min = 1))]
    pub key_id: String,

    /// Also the shared secret for payment signatures
    #[validate(length(min = 1))]
    pub key_secret: String,

    #[serde(default = "default_razorpay_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default = "default_gateway_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Store units to gateway minor units
    #[serde(default = "default_minor_units")]
    #[validate(range(min = 1))]
    pub minor_units_per_unit: u64,
}

impl RazorpayConfig {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: default_razorpay_url(),
            timeout_ms: default_gateway_timeout_ms(),
            currency: default_currency(),
            minor_units_per_unit: default_minor_units(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("currency", &self.currency)
            .field("minor_units_per_unit", &self.minor_units_per_unit)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EnrollmentConfig {
    #[serde(default)]
    pub policy: BatchPolicy,

    #[serde(default = "default_notification_timeout_ms")]
    #[validate(range(min = 1))]
    pub notification_timeout_ms: u64,

    /// Re-read the gateway order at verify time and compare it with the
    /// request and current prices
    #[serde(default)]
    pub recheck_order: bool,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            policy: BatchPolicy::default(),
            notification_timeout_ms: default_notification_timeout_ms(),
            recheck_order: false,
        }
    }
}

impl EnrollmentConfig {
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

/// Where notifications go. Without a relay they are only logged.
#[derive(Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default)]
    #[validate(url)]
    pub relay_url: Option<String>,

    #[serde(default)]
    pub relay_secret: Option<String>,
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("relay_url", &self.relay_url)
            .field("relay_secret", &self.relay_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// `memory` or a sqlite/postgres connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// HS256 key for caller-identity tokens
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Comma-separated list of allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: String,

    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Upper bound for any single store call
    #[serde(default = "default_store_timeout_ms")]
    #[validate(range(min = 1))]
    pub store_timeout_ms: u64,

    #[validate]
    pub razorpay: RazorpayConfig,

    #[serde(default)]
    #[validate]
    pub enrollment: EnrollmentConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("razorpay", &self.razorpay)
            .field("enrollment", &self.enrollment)
            .field("notifications", &self.notifications)
            .finish()
    }
}

impl AppConfig {
    /// Builds a development configuration around the required secrets.
    pub fn new(
        database_url: impl Into<String>,
        jwt_secret: impl Into<String>,
        razorpay: RazorpayConfig,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: default_cors_origins(),
            request_timeout_secs: default_request_timeout_secs(),
            db_max_connections: default_db_max_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            store_timeout_ms: default_store_timeout_ms(),
            razorpay,
            enrollment: EnrollmentConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.trim() == MEMORY_DATABASE_URL
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEFAULT_ENV)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.uses_memory_store() {
            let mut err = ValidationError::new("database_url_memory");
            err.message = Some(
                "The in-memory store loses enrollments on restart; set APP__DATABASE_URL in production"
                    .into(),
            );
            errors.add("database_url", err);
        }

        if !self.is_development() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
            errors.add("cors_allowed_origins", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cors_origins() -> String {
    DEFAULT_CORS_ORIGINS.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_razorpay_url() -> String {
    DEFAULT_RAZORPAY_URL.to_string()
}

fn default_gateway_timeout_ms() -> u64 {
    10_000
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_minor_units() -> u64 {
    100
}

fn default_notification_timeout_ms() -> u64 {
    5_000
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
        return Err(err);
    }

    const DISALLOWED: [&str; 3] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
    ];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("course_checkout={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Built-in defaults, lowest precedence.
fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database_url", MEMORY_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("razorpay.base_url", DEFAULT_RAZORPAY_URL)
}

fn finish(config: Config) -> Result<AppConfig, AppConfigError> {
    for required in ["jwt_secret", "razorpay.key_id", "razorpay.key_secret"] {
        if config.get_string(required).is_err() {
            let var = format!("APP__{}", required.replace('.', "__").to_uppercase());
            error!("{} is not configured. Set {}.", required, var);
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{required} is required but not configured. Set {var}."
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = defaults()?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    finish(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use config::FileFormat;

    const SECRET: &str = "k3y-for-signing-caller-tokens-in-tests-0123456789";

    fn from_toml(content: &str) -> Result<AppConfig, AppConfigError> {
        let config = defaults()
            .unwrap()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap();
        finish(config)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg = from_toml(&format!(
            r#"
            jwt_secret = "{SECRET}"
            [razorpay]
            key_id = "rzp_test_key"
            key_secret = "rzp_test_secret"
            "#
        ))
        .unwrap();

        assert!(cfg.uses_memory_store());
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.razorpay.base_url, DEFAULT_RAZORPAY_URL);
        assert_eq!(cfg.razorpay.minor_units_per_unit, 100);
        assert_eq!(cfg.razorpay.currency, "INR");
        assert_eq!(cfg.enrollment.policy, BatchPolicy::StopOnFirstFailure);
        assert!(!cfg.enrollment.recheck_order);
        assert_eq!(cfg.cors_origins(), vec!["http://localhost:3000".to_string()]);
    }

    #[test]
    fn nested_sections_override_defaults() {
        let cfg = from_toml(&format!(
            r#"
            jwt_secret = "{SECRET}"
            cors_allowed_origins = "https://a.example, https://b.example"
            [razorpay]
            key_id = "rzp_test_key"
            key_secret = "rzp_test_secret"
            timeout_ms = 2500
            [enrollment]
            policy = "continue_and_aggregate"
            recheck_order = true
            [notifications]
            relay_url = "https://relay.example/notify"
            "#
        ))
        .unwrap();

        assert_eq!(cfg.razorpay.timeout(), Duration::from_millis(2500));
        assert_eq!(cfg.enrollment.policy, BatchPolicy::ContinueAndAggregate);
        assert!(cfg.enrollment.recheck_order);
        assert_eq!(cfg.cors_origins().len(), 2);
        assert_eq!(
            cfg.notifications.relay_url.as_deref(),
            Some("https://relay.example/notify")
        );
    }

    #[test]
    fn missing_gateway_secret_is_reported() {
        let err = from_toml(&format!(
            r#"
            jwt_secret = "{SECRET}"
            [razorpay]
            key_id = "rzp_test_key"
            "#
        ))
        .unwrap_err();
        assert_matches!(err, AppConfigError::Load(ConfigError::NotFound(msg)) if msg.contains("APP__RAZORPAY__KEY_SECRET"));
    }

    #[test]
    fn weak_values_fail_validation() {
        let err = from_toml(
            r#"
            jwt_secret = "short"
            log_level = "loud"
            [razorpay]
            key_id = "rzp_test_key"
            key_secret = "rzp_test_secret"
            minor_units_per_unit = 0
            "#,
        )
        .unwrap_err();

        let AppConfigError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        let fields = errors.errors();
        assert!(fields.contains_key("jwt_secret"));
        assert!(fields.contains_key("log_level"));
        assert!(fields.contains_key("razorpay"));
    }

    #[test]
    fn production_rejects_memory_store() {
        let err = from_toml(&format!(
            r#"
            jwt_secret = "{SECRET}"
            environment = "production"
            [razorpay]
            key_id = "rzp_live_key"
            key_secret = "rzp_live_secret"
            "#
        ))
        .unwrap_err();
        assert_matches!(err, AppConfigError::Validation(e) if e.field_errors().contains_key("database_url"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = AppConfig::new(
            MEMORY_DATABASE_URL,
            SECRET,
            RazorpayConfig::new("rzp_test_key", "rzp_test_secret"),
        );
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains(SECRET));
        assert!(!rendered.contains("rzp_test_secret"));
        assert!(rendered.contains("rzp_test_key"));
    }
}
