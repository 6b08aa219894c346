//! TOML-based configuration for giftledger.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! The `GIFTLEDGER_DATA_DIR` environment variable overrides
//! `daemon.data_dir` when applied through [`AppConfig::apply_env_overrides`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Environment variable overriding `daemon.data_dir`.
pub const DATA_DIR_ENV: &str = "GIFTLEDGER_DATA_DIR";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Store backend selection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Balance ledger policies.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Static fields echoed on gift-card responses.
    #[serde(default)]
    pub giftcard: GiftCardConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persistent data (database or JSON store files).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Optional log file; when set, logs also go to a daily rolling file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/giftledger")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            log_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Which store implementation backs the ledger.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database `giftledger.db` in the data directory.
    #[default]
    Sqlite,
    /// Legacy `creditDB.json` / `transactions.json` files.
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Listen address (default `127.0.0.1:3000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Absolute base URL for `_self` links. When unset it is derived from
    /// the request's `Host` and `X-Forwarded-Proto` headers.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Prefix of the `_self.href` returned for new purchase transactions.
    #[serde(default = "default_transaction_href_prefix")]
    pub transaction_href_prefix: String,
}

fn default_listen() -> String {
    "127.0.0.1:3000".into()
}
fn default_transaction_href_prefix() -> String {
    "gatewayqa".into()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_base_url: None,
            transaction_href_prefix: default_transaction_href_prefix(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Absolute tolerance when matching a compensation value against the
    /// original transaction amount.
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: f64,

    /// `userId` recorded on recharges that do not name an operator.
    #[serde(default = "default_operator")]
    pub default_operator: String,

    /// Reject a second settlement, or a second cancellation, of the same
    /// original transaction.
    #[serde(default = "default_true")]
    pub reject_duplicate_compensation: bool,

    /// Refuse company names whose card slug collides with another company.
    #[serde(default = "default_true")]
    pub enforce_unique_slugs: bool,
}

fn default_amount_tolerance() -> f64 {
    0.01
}
fn default_operator() -> String {
    "admin".into()
}
fn default_true() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: default_amount_tolerance(),
            default_operator: default_operator(),
            reject_duplicate_compensation: true,
            enforce_unique_slugs: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Gift card presentation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCardConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_currency_code")]
    pub currency_code: String,

    #[serde(default = "default_emission_date")]
    pub emission_date: String,

    #[serde(default = "default_expiring_date")]
    pub expiring_date: String,
}

fn default_provider() -> String {
    "arroyave_gift".into()
}
fn default_currency_code() -> String {
    "COP".into()
}
fn default_emission_date() -> String {
    "2025-04-24T20:22:58.163".into()
}
fn default_expiring_date() -> String {
    "2030-01-01T00:00:00".into()
}

impl Default for GiftCardConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            currency_code: default_currency_code(),
            emission_date: default_emission_date(),
            expiring_date: default_expiring_date(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                debug!(dir, "data_dir overridden from environment");
                self.daemon.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.listen.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "web.listen".into(),
                detail: "listen address must not be empty".into(),
            });
        }
        let tolerance = self.ledger.amount_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "ledger.amount_tolerance".into(),
                detail: format!("must be a finite number >= 0, got {tolerance}"),
            });
        }
        if self.ledger.default_operator.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ledger.default_operator".into(),
                detail: "default operator must not be empty".into(),
            });
        }
        if self.daemon.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "daemon.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, apply overrides, and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[daemon]
log_level = "debug"
data_dir = "/tmp/giftledger"
log_file = "/tmp/giftledger/giftledger.log"

[storage]
backend = "json"

[web]
listen = "0.0.0.0:8080"
public_base_url = "https://cards.example.com"
transaction_href_prefix = "gateway"

[ledger]
amount_tolerance = 0.5
default_operator = "ops"
reject_duplicate_compensation = false
enforce_unique_slugs = false

[giftcard]
provider = "acme_gift"
currency_code = "USD"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.web.listen, "0.0.0.0:8080");
        assert_eq!(
            config.web.public_base_url.as_deref(),
            Some("https://cards.example.com")
        );
        assert_eq!(config.ledger.amount_tolerance, 0.5);
        assert!(!config.ledger.reject_duplicate_compensation);
        assert_eq!(config.giftcard.currency_code, "USD");
        // Unset giftcard fields keep their defaults.
        assert_eq!(config.giftcard.expiring_date, "2030-01-01T00:00:00");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.web.transaction_href_prefix, "gateway");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/giftledger.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ledger]\namount_tolerance = \"lots\"\n").unwrap();
        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.data_dir, PathBuf::from("/var/lib/giftledger"));
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.web.listen, "127.0.0.1:3000");
        assert_eq!(config.web.transaction_href_prefix, "gatewayqa");
        assert_eq!(config.ledger.amount_tolerance, 0.01);
        assert_eq!(config.ledger.default_operator, "admin");
        assert!(config.ledger.reject_duplicate_compensation);
        assert!(config.ledger.enforce_unique_slugs);
        assert_eq!(config.giftcard.provider, "arroyave_gift");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_tolerance() {
        let mut config = AppConfig::default();
        config.ledger.amount_tolerance = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "ledger.amount_tolerance"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_listen() {
        let mut config = AppConfig::default();
        config.web.listen = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "web.listen"
        ));
    }

    #[test]
    fn test_env_override_data_dir() {
        std::env::set_var(DATA_DIR_ENV, "/srv/giftledger");
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(config.daemon.data_dir, PathBuf::from("/srv/giftledger"));
    }
}
