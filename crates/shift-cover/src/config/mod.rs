use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::workflows::coverage::{CoverageConfig, RankingConfig, RetryPolicy};

const DEVELOPMENT_JWT_SECRET: &str = "shift-cover-development-secret";
const DEVELOPMENT_WEBHOOK_SECRET: &str = "shift-cover-development-webhook";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub coverage: CoverageConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let coverage = CoverageConfig {
            ranking: RankingConfig {
                overtime_threshold_hours: parse_var("COVERAGE_OVERTIME_THRESHOLD_HOURS", 40)?,
                exclude_conflicting_staff: parse_flag("COVERAGE_EXCLUDE_CONFLICTS", true)?,
                fairness_window_days: parse_var("COVERAGE_FAIRNESS_WINDOW_DAYS", 30)?,
            },
            max_candidates: parse_var("COVERAGE_MAX_CANDIDATES", 5)?,
            retry: RetryPolicy {
                max_attempts: parse_var("NOTIFY_MAX_ATTEMPTS", 3)?,
                base_backoff_ms: parse_var("NOTIFY_BACKOFF_MS", 500)?,
            },
        };
        if coverage.max_candidates == 0 {
            return Err(ConfigError::InvalidValue {
                key: "COVERAGE_MAX_CANDIDATES",
                value: "0".to_string(),
            });
        }
        if coverage.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let jwt_secret = secret_var("AUTH_JWT_SECRET", environment, DEVELOPMENT_JWT_SECRET)?;
        let sms_webhook_secret = secret_var(
            "AUTH_SMS_WEBHOOK_SECRET",
            environment,
            DEVELOPMENT_WEBHOOK_SECRET,
        )?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            coverage,
            auth: AuthConfig {
                jwt_secret,
                sms_webhook_secret,
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Secrets have a development fallback but must be set explicitly in production.
fn secret_var(
    key: &'static str,
    environment: AppEnvironment,
    development: &str,
) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(secret) if !secret.trim().is_empty() => Ok(secret.trim().to_string()),
        _ if environment == AppEnvironment::Production => Err(ConfigError::MissingSecret(key)),
        _ => Ok(development.to_string()),
    }
}

fn parse_flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Bearer token verification and the SMS vendor's shared secret.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub sms_webhook_secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("sms_webhook_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    MissingSecret(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::MissingSecret(key) => {
                write!(f, "{key} must be set when APP_ENV is production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingSecret(_) => None,
        }
    }
}
