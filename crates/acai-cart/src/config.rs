//! # Cart Configuration
//!
//! Where the storefront API lives, where the cart is saved, and which
//! toppings come free with which size.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ACAI_API_URL=https://api.acai.example/api                          │
//! │     ACAI_API_TIMEOUT_SECS=10                                           │
//! │     ACAI_CART_DB=/tmp/cart.db                                          │
//! │     ACAI_CART_KEY=acai-cart-storage                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/storefront/cart.toml (Linux)                             │
//! │     ~/Library/Application Support/br.acai.storefront/cart.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cart.toml
//! [api]
//! base_url = "http://localhost:3001/api"
//! timeout_secs = 10
//!
//! [persistence]
//! database_path = "/var/lib/acai/cart.db"
//! cart_key = "acai-cart-storage"
//!
//! [allowances]
//! never_free = ["extras"]
//!
//! [[allowances.limits]]
//! size = "500ml"
//! category = "frutas"
//! limit = 2
//! ```

use std::path::PathBuf;
use std::time::Duration;

use acai_core::toppings::ToppingAllowancePolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CartError, CartResult};

/// Storage key of the saved cart, shared with earlier storefront versions.
pub const DEFAULT_CART_KEY: &str = "acai-cart-storage";

// =============================================================================
// API Settings
// =============================================================================

/// Storefront API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL, including the `/api` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3001/api".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ApiSettings {
    /// Request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Persistence Settings
// =============================================================================

/// Where the cart snapshot is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// SQLite file. Defaults to `cart.db` in the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Key of the cart record.
    #[serde(default = "default_cart_key")]
    pub cart_key: String,
}

fn default_cart_key() -> String {
    DEFAULT_CART_KEY.to_string()
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        PersistenceSettings {
            database_path: None,
            cart_key: default_cart_key(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete cart configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub persistence: PersistenceSettings,

    /// Free-topping allowances per size and category.
    #[serde(default)]
    pub allowances: ToppingAllowancePolicy,
}

impl CartConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cart.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CartResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading cart config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load cart config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> CartResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| CartError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Cart config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CartResult<()> {
        let url = Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CartError::Config(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(CartError::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.persistence.cart_key.trim().is_empty() {
            return Err(CartError::Config("cart_key must not be empty".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ACAI_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(timeout) = std::env::var("ACAI_API_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.api.timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid ACAI_API_TIMEOUT_SECS"),
            }
        }

        if let Ok(path) = std::env::var("ACAI_CART_DB") {
            debug!(path = %path, "Overriding cart database from environment");
            self.persistence.database_path = Some(PathBuf::from(path));
        }

        if let Ok(key) = std::env::var("ACAI_CART_KEY") {
            self.persistence.cart_key = key;
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("br", "acai", "storefront")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("cart.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolved SQLite path: configured, else the platform data directory.
    pub fn database_path(&self) -> CartResult<PathBuf> {
        if let Some(path) = &self.persistence.database_path {
            return Ok(path.clone());
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("cart.db"))
            .ok_or_else(|| CartError::Config("No data directory available".into()))
    }

    /// Returns the cart record key.
    pub fn cart_key(&self) -> &str {
        &self.persistence.cart_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CartConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:3001/api");
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.cart_key(), DEFAULT_CART_KEY);
        assert!(config.allowances.never_free.contains("extras"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CartConfig::default();

        config.api.base_url = "ftp://files.example".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = "https://api.acai.example/api".to_string();
        assert!(config.validate().is_ok());

        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.api.timeout_secs = 5;
        config.persistence.cart_key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_allowances() {
        let config: CartConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://api.acai.example/api"

            [[allowances.limits]]
            size = "500ml"
            category = "frutas"
            limit = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.allowances.limit_for(Some("500ml"), "frutas"), 2);
        assert!(config.allowances.never_free.contains("extras"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cart.toml");

        let mut config = CartConfig::default();
        config.persistence.database_path = Some(dir.path().join("cart.db"));
        config.allowances = config.allowances.with_limit("300ml", "cremes", 1);
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[api]"));
        assert!(contents.contains("[persistence]"));

        let loaded: CartConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.allowances.limit_for(Some("300ml"), "cremes"), 1);
        assert_eq!(
            loaded.database_path().unwrap(),
            dir.path().join("cart.db")
        );
    }
}
