use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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
    pub onboarding: OnboardingConfig,
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

        let onboarding = OnboardingConfig::load(environment)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            onboarding,
        })
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

/// Knobs for the onboarding engine: token signing, deadlines, cache staleness.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub session_deadline_days: i64,
    pub property_cache_ttl: Duration,
}

impl OnboardingConfig {
    fn load(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let token_secret = match env::var("ONBOARD_TOKEN_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingTokenSecret)
            }
            _ => "insecure-dev-secret".to_string(),
        };

        let token_ttl_hours = env::var("ONBOARD_TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "72".to_string())
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidDuration {
                variable: "ONBOARD_TOKEN_TTL_HOURS",
            })?;

        let session_deadline_days = env::var("ONBOARD_SESSION_DEADLINE_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidDuration {
                variable: "ONBOARD_SESSION_DEADLINE_DAYS",
            })?;

        let cache_ttl_secs = env::var("ONBOARD_PROPERTY_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidDuration {
                variable: "ONBOARD_PROPERTY_CACHE_TTL_SECS",
            })?;

        Ok(Self {
            token_secret,
            token_ttl_hours,
            session_deadline_days,
            property_cache_ttl: Duration::from_secs(cache_ttl_secs),
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDuration { variable: &'static str },
    MissingTokenSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDuration { variable } => {
                write!(f, "{variable} must be a positive integer")
            }
            ConfigError::MissingTokenSecret => {
                write!(f, "ONBOARD_TOKEN_SECRET must be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
