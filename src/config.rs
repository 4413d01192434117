use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::{Money, Rate};

/// prefix for environment overrides, e.g. `BANK_POLICY__EXPOSURE_CAP=500000`
pub const ENV_PREFIX: &str = "BANK_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// credit approval and servicing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPolicy {
    /// fixed annual rate applied to every new credit, in percent
    #[serde(default = "default_annual_rate_percent")]
    pub annual_rate_percent: Decimal,
    /// aggregate active principal a single user may hold; reaching it is rejected
    #[serde(default = "default_exposure_cap")]
    pub exposure_cap: Money,
    /// late installments after which a credit is marked defaulted, 0 disables
    #[serde(default = "default_after_late_installments")]
    pub default_after_late_installments: u32,
}

fn default_annual_rate_percent() -> Decimal {
    dec!(12)
}

fn default_exposure_cap() -> Money {
    Money::from_major(1_000_000)
}

fn default_after_late_installments() -> u32 {
    3
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            annual_rate_percent: default_annual_rate_percent(),
            exposure_cap: default_exposure_cap(),
            default_after_late_installments: default_after_late_installments(),
        }
    }
}

impl CreditPolicy {
    pub fn annual_rate(&self) -> Rate {
        Rate::from_percent_decimal(self.annual_rate_percent)
    }

    pub fn with_annual_rate_percent(mut self, percent: Decimal) -> Self {
        self.annual_rate_percent = percent;
        self
    }

    pub fn with_exposure_cap(mut self, cap: Money) -> Self {
        self.exposure_cap = cap;
        self
    }

    pub fn with_default_after_late_installments(mut self, count: u32) -> Self {
        self.default_after_late_installments = count;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.annual_rate_percent < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                message: format!(
                    "annual rate must not be negative, got {}",
                    self.annual_rate_percent
                ),
            });
        }
        if !self.exposure_cap.is_positive() {
            return Err(ConfigError::Invalid {
                message: format!("exposure cap must be positive, got {}", self.exposure_cap),
            });
        }
        Ok(())
    }
}

/// logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub policy: CreditPolicy,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    /// load defaults, then the optional toml file, then `BANK_` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(figment)
    }

    /// extract and validate from an already assembled figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.policy.validate()?;
        Ok(config)
    }
}
