//! Shop configuration.
//!
//! Loaded from `SHOPKIT_*` environment variables with fallback to defaults.
//!
//! | Variable                          | Default        |
//! |-----------------------------------|----------------|
//! | `SHOPKIT_DATABASE_PATH`           | `./shopkit.db` |
//! | `SHOPKIT_MAX_CONNECTIONS`         | `5`            |
//! | `SHOPKIT_TAX_RATE_BPS`            | `0`            |
//! | `SHOPKIT_FLAT_SHIPPING_CENTS`     | `0`            |
//! | `SHOPKIT_FREE_SHIPPING_CENTS`     | unset (never)  |
//! | `SHOPKIT_LOW_STOCK_THRESHOLD`     | `5`            |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use shopkit_core::{CheckoutSettings, Money, Rate};

use crate::pool::DbConfig;

/// Shop-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopConfig {
    /// SQLite file path (`:memory:` for an in-memory database)
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Tax rate in basis points (825 = 8.25%)
    pub tax_rate_bps: u32,

    /// Flat shipping charged per order
    pub flat_shipping_cents: i64,

    /// Subtotal at which shipping becomes free
    pub free_shipping_threshold_cents: Option<i64>,

    /// Reorder threshold given to new stock rows
    pub low_stock_threshold: i64,
}

impl Default for ShopConfig {
    fn default() -> Self {
        ShopConfig {
            database_path: PathBuf::from("./shopkit.db"),
            max_connections: 5,
            tax_rate_bps: 0,
            flat_shipping_cents: 0,
            free_shipping_threshold_cents: None,
            low_stock_threshold: 5,
        }
    }
}

impl ShopConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ShopConfig::default();

        let config = ShopConfig {
            database_path: lookup("SHOPKIT_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: parse(&lookup, "SHOPKIT_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),

            tax_rate_bps: parse(&lookup, "SHOPKIT_TAX_RATE_BPS")?
                .unwrap_or(defaults.tax_rate_bps),

            flat_shipping_cents: parse(&lookup, "SHOPKIT_FLAT_SHIPPING_CENTS")?
                .unwrap_or(defaults.flat_shipping_cents),

            free_shipping_threshold_cents: parse(&lookup, "SHOPKIT_FREE_SHIPPING_CENTS")?,

            low_stock_threshold: parse(&lookup, "SHOPKIT_LOW_STOCK_THRESHOLD")?
                .unwrap_or(defaults.low_stock_threshold),
        };

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("SHOPKIT_MAX_CONNECTIONS".to_string()));
        }
        if config.low_stock_threshold < 0 {
            return Err(ConfigError::InvalidValue("SHOPKIT_LOW_STOCK_THRESHOLD".to_string()));
        }
        config
            .checkout_settings()
            .validate()
            .map_err(|_| ConfigError::InvalidValue("checkout settings".to_string()))?;

        Ok(config)
    }

    /// Pool configuration. An in-memory path ignores the pool size.
    pub fn db_config(&self) -> DbConfig {
        let config = DbConfig::new(&self.database_path);
        if config.is_in_memory() {
            return DbConfig::in_memory();
        }
        config.max_connections(self.max_connections)
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            tax_rate: Rate::from_bps(self.tax_rate_bps),
            flat_shipping: Money::from_cents(self.flat_shipping_cents),
            free_shipping_threshold: self.free_shipping_threshold_cents.map(Money::from_cents),
        }
    }
}

/// Parses `key` if set. Empty values count as unset.
fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        _ => Ok(None),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
