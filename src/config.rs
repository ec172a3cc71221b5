//! Application configuration module
//! Handles environment variable loading, configuration validation, and gateway settings

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Absent when running with `SKIP_EXTERNALS=true`
    pub database: Option<DatabaseConfig>,
    pub cache: CacheSettings,
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    pub data_api: DataApiConfig,
    pub gateway: GatewayConfig,
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build the upstream callback URL
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis configuration for the request throttle
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub redis_url: String,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Upstream payment backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Token-authenticated data API used for payment acceptance
#[derive(Debug, Clone)]
pub struct DataApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Deployment environment. Sandbox fixtures are served everywhere except `Prod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEV" | "DEVELOPMENT" | "LOCAL" => Ok(Environment::Dev),
            "STAGING" | "TEST" => Ok(Environment::Staging),
            "PROD" | "PRODUCTION" => Ok(Environment::Prod),
            other => Err(ConfigError::InvalidValue(format!("ENVIRONMENT={}", other))),
        }
    }
}

/// Gateway behaviour knobs
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub service_version: String,
    pub environment: Environment,
    /// Shared secret for the `Signature` header on upstream callbacks
    pub signature_secret: String,
    pub min_payment_millimes: i64,
    pub notify_timeout: Duration,
    pub pos_status_throttle: Duration,
    pub public_base_url: String,
}

impl GatewayConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Prod
    }

    /// Where the upstream backend posts send-money confirmations.
    pub fn catcher_url(&self) -> String {
        format!(
            "{}/partners/internal/send_money_catcher",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        let server = ServerConfig::from_env()?;
        let database = if skip_externals {
            None
        } else {
            Some(DatabaseConfig::from_env()?)
        };

        Ok(AppConfig {
            gateway: GatewayConfig::from_env(&server.public_base_url)?,
            server,
            database,
            cache: CacheSettings::from_env()?,
            logging: LoggingConfig::from_env()?,
            backend: BackendConfig::from_env()?,
            data_api: DataApiConfig::from_env()?,
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.cache.validate()?;
        self.logging.validate()?;
        self.backend.validate()?;
        self.gateway.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?;

        Ok(ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            port,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("PORT cannot be 0".to_string()));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("HOST cannot be empty".to_string()));
        }

        validate_url("PUBLIC_BASE_URL", &self.public_base_url)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationFailed(
                "DB_MIN_CONNECTIONS cannot exceed DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheSettings {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_connections: env::var("CACHE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CACHE_MAX_CONNECTIONS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue("REDIS_URL".to_string()));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue("RUST_LOG".to_string()));
        }

        Ok(())
    }
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(BackendConfig {
            base_url: env::var("BACKEND_API_ADDRESS")
                .map_err(|_| ConfigError::MissingVariable("BACKEND_API_ADDRESS".to_string()))?,
            api_key: env::var("BACKEND_API_KEY")
                .map_err(|_| ConfigError::MissingVariable("BACKEND_API_KEY".to_string()))?,
            timeout: Duration::from_secs(
                env::var("BACKEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("BACKEND_TIMEOUT_SECS".to_string()))?,
            ),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("BACKEND_API_ADDRESS", &self.base_url)?;

        if self.api_key.is_empty() {
            return Err(ConfigError::MissingVariable("BACKEND_API_KEY".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue("BACKEND_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl DataApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DataApiConfig {
            base_url: env::var("DATA_API_ADDRESS")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            username: env::var("DATA_API_USERNAME").unwrap_or_default(),
            password: env::var("DATA_API_PASSWORD").unwrap_or_default(),
            timeout: Duration::from_secs(
                env::var("DATA_API_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("DATA_API_TIMEOUT_SECS".to_string()))?,
            ),
        })
    }
}

impl GatewayConfig {
    pub fn from_env(public_base_url: &str) -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "DEV".to_string())
                .parse()?,
            signature_secret: env::var("DATA_API_SIGNATURE_SECRET").map_err(|_| {
                ConfigError::MissingVariable("DATA_API_SIGNATURE_SECRET".to_string())
            })?,
            min_payment_millimes: env::var("MIN_PAYMENT_MILLIMES")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MIN_PAYMENT_MILLIMES".to_string()))?,
            notify_timeout: Duration::from_secs(
                env::var("WEBHOOK_NOTIFY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),
            pos_status_throttle: Duration::from_secs(
                env::var("POS_STATUS_THROTTLE_SECS")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()?,
            ),
            public_base_url: public_base_url.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signature_secret.len() < 16 {
            return Err(ConfigError::ValidationFailed(
                "DATA_API_SIGNATURE_SECRET must be at least 16 characters".to_string(),
            ));
        }

        if self.min_payment_millimes <= 0 {
            return Err(ConfigError::InvalidValue("MIN_PAYMENT_MILLIMES".to_string()));
        }

        Ok(())
    }
}

fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a valid URL",
            name
        )));
    }

    Ok(())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
    }
}
