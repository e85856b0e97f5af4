// 9.0 config.rs: engine-wide settings in one place. oracle sanity limits, risk band,
// funding cadence, fee bounds, and who the operator is.
// 9.1 presets per environment. 9.2 loading from env vars for the sim binary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::funding::{FeeParams, FundingParams, FUNDING_INTERVAL_MS};
use crate::math;
use crate::oracle::OracleParams;
use crate::risk::{RiskParams, PRICE_BAND_BPS};
use crate::types::{AccountId, Price};

const YEAR_MS: i128 = 365 * 24 * 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // The only identity allowed to run admin operations
    pub operator: AccountId,
    // Events kept in memory before the oldest are dropped
    pub max_events: usize,
    // Seed price for new markets when the oracle has nothing
    pub default_initial_price: Decimal,
    pub oracle: OracleParams,
    pub risk: RiskParams,
    pub funding: FundingParams,
    pub fees: FeeParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operator: AccountId(1),
            max_events: 100_000,
            default_initial_price: Decimal::new(2000, 0),
            oracle: OracleParams::default(),
            risk: RiskParams::default(),
            funding: FundingParams::default(),
            fees: FeeParams::default(),
        }
    }
}

impl EngineConfig {
    // 9.1: presets only tune retention and fee bounds. band and funding cadence are fixed
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.fees.max_fee_pips = crate::types::FeePips(50_000); // 5%
        config.max_events = 10_000;
        config
    }

    pub fn mainnet() -> Self {
        let mut config = Self::default();
        config.fees.max_fee_pips = crate::types::FeePips(30_000); // 3%
        config.fees.funding_fee_share_bps = 500; // 5%
        config.max_events = 1_000_000;
        config
    }

    pub fn with_operator(mut self, operator: AccountId) -> Self {
        self.operator = operator;
        self
    }

    pub fn default_price(&self) -> Option<Price> {
        Price::from_decimal(self.default_initial_price)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "max_events must be positive".to_string(),
            });
        }
        if self.default_price().is_none() {
            return Err(ConfigError::InvalidEngine {
                reason: format!("default initial price {} is not a positive price", self.default_initial_price),
            });
        }

        if self.oracle.min_sane_price >= self.oracle.max_sane_price {
            return Err(ConfigError::InvalidOracle {
                reason: "sanity band min must be below max".to_string(),
            });
        }
        if self.oracle.max_spot_deviation_bps == 0 || self.oracle.max_spot_deviation_bps > math::BPS_DENOMINATOR {
            return Err(ConfigError::InvalidOracle {
                reason: "spot deviation limit must be in (0, 10000] bps".to_string(),
            });
        }

        if self.risk.price_band_bps != PRICE_BAND_BPS {
            return Err(ConfigError::InvalidRisk {
                reason: format!("price band must be {} bps, got {}", PRICE_BAND_BPS, self.risk.price_band_bps),
            });
        }
        if self.risk.max_rebalance_deviation_bps > math::BPS_DENOMINATOR {
            return Err(ConfigError::InvalidRisk {
                reason: "rebalance deviation cannot exceed 100%".to_string(),
            });
        }

        if self.funding.interval_ms != FUNDING_INTERVAL_MS {
            return Err(ConfigError::InvalidFunding {
                reason: format!("funding interval must be {} ms, got {}", FUNDING_INTERVAL_MS, self.funding.interval_ms),
            });
        }
        // the divisor turns an annual spread into a per-interval rate
        if i128::from(self.funding.interval_ms) * self.funding.annualization_divisor != YEAR_MS {
            return Err(ConfigError::InvalidFunding {
                reason: format!(
                    "annualization divisor {} does not match a {} ms interval",
                    self.funding.annualization_divisor, self.funding.interval_ms
                ),
            });
        }

        if self.fees.max_fee_pips.value() >= math::PIPS_DENOMINATOR {
            return Err(ConfigError::InvalidFees {
                reason: "max fee must be below 100%".to_string(),
            });
        }
        if self.fees.funding_fee_share_bps > math::BPS_DENOMINATOR {
            return Err(ConfigError::InvalidFees {
                reason: "funding fee share cannot exceed 100%".to_string(),
            });
        }

        Ok(())
    }

    // 9.2: VAMM_ENV picks the preset, the rest override it
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let environment = match env_map.get("VAMM_ENV").map(|s| s.as_str()).unwrap_or("development") {
            "development" => Environment::Development,
            "testnet" => Environment::Testnet,
            "mainnet" => Environment::Mainnet,
            other => {
                return Err(ConfigError::InvalidValue(
                    "VAMM_ENV".to_string(),
                    format!("must be development, testnet, or mainnet, got {}", other),
                ))
            }
        };
        let mut config = environment.config();

        if let Some(raw) = env_map.get("VAMM_OPERATOR") {
            let id = raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue("VAMM_OPERATOR".to_string(), "must be a valid u64".to_string())
            })?;
            config.operator = AccountId(id);
        }

        if let Some(raw) = env_map.get("VAMM_DEFAULT_PRICE") {
            config.default_initial_price = Decimal::from_str(raw).map_err(|_| {
                ConfigError::InvalidValue("VAMM_DEFAULT_PRICE".to_string(), "must be a decimal number".to_string())
            })?;
        }

        if let Some(raw) = env_map.get("VAMM_MAX_EVENTS") {
            config.max_events = raw.parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue("VAMM_MAX_EVENTS".to_string(), "must be a valid usize".to_string())
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Invalid engine config: {reason}")]
    InvalidEngine { reason: String },

    #[error("Invalid oracle config: {reason}")]
    InvalidOracle { reason: String },

    #[error("Invalid risk config: {reason}")]
    InvalidRisk { reason: String },

    #[error("Invalid funding config: {reason}")]
    InvalidFunding { reason: String },

    #[error("Invalid fee config: {reason}")]
    InvalidFees { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> EngineConfig {
        match self {
            Environment::Development => EngineConfig::default(),
            Environment::Testnet => EngineConfig::testnet(),
            Environment::Mainnet => EngineConfig::mainnet(),
        }
    }
}
