use config::{Config as Cfg, File};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Events kept by the access ledger before the oldest are dropped.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
    #[serde(default = "default_worker_qr_validity_hours")]
    pub worker_qr_validity_hours: i64,
    #[serde(default = "default_host_qr_validity_hours")]
    pub host_qr_validity_hours: i64,
    /// When false, a holder may hold only one live credential per kind.
    #[serde(default)]
    pub allow_overlapping_credentials: bool,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

/// Longest QR validity period accepted from configuration (one leap year).
pub const MAX_QR_VALIDITY_HOURS: i64 = 24 * 366;

fn default_service_name() -> String {
    "access-service".to_string()
}

fn default_ledger_capacity() -> usize {
    1000
}

fn default_worker_qr_validity_hours() -> i64 {
    8
}

fn default_host_qr_validity_hours() -> i64 {
    4
}

fn default_page_size() -> usize {
    50
}

fn default_max_page_size() -> usize {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: default_ledger_capacity(),
            worker_qr_validity_hours: default_worker_qr_validity_hours(),
            host_qr_validity_hours: default_host_qr_validity_hours(),
            allow_overlapping_credentials: false,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let problem = if self.ledger_capacity == 0 {
            Some("ledger_capacity must be positive")
        } else if self.worker_qr_validity_hours <= 0 || self.host_qr_validity_hours <= 0 {
            Some("QR validity hours must be positive")
        } else if self.worker_qr_validity_hours > MAX_QR_VALIDITY_HOURS
            || self.host_qr_validity_hours > MAX_QR_VALIDITY_HOURS
        {
            Some("QR validity hours must not exceed one year")
        } else if self.default_page_size == 0 || self.max_page_size == 0 {
            Some("page sizes must be positive")
        } else if self.default_page_size > self.max_page_size {
            Some("default_page_size must not exceed max_page_size")
        } else {
            None
        };

        match problem {
            Some(msg) => Err(AppError::ConfigError(anyhow::anyhow!(msg))),
            None => Ok(()),
        }
    }
}

impl AccessConfig {
    /// Load from `configuration` file and `APP__` environment variables,
    /// e.g. `APP__ENGINE__LEDGER_CAPACITY=5000`.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config: AccessConfig = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.engine.validate()?;
        Ok(config)
    }
}
