//! # SMS Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     BAZAAR_DB_PATH=/var/lib/bazaar/bazaar.db                            │
//! │     BAZAAR_MAX_RETRIES=5                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/bazaar/sms.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.bazaar.bazaar/sms.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/bazaar/bazaar.db"
//! max_connections = 8
//!
//! [dispatch]
//! max_retries = 3
//! retry_base_delay_secs = 10   # attempt n waits base × (n + 1)
//! request_timeout_secs = 30
//! concurrency = 16
//! reconcile_delay_secs = 30
//!
//! [alert]
//! enabled = true
//! balance_url = "https://api.rtcom.xyz/balance"
//! acode = "30000222"
//! api_key = "..."
//! threshold = 600000         # minor units
//! recipients = ["8801861650206"]
//! alert_url = "https://sms.example.com/api/sendsms?phone={phone_number}&message={message}"
//! check_interval_secs = 3600
//!
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bazaar_core::sms::gateway::{MESSAGE_PLACEHOLDER, PHONE_PLACEHOLDER};
use bazaar_core::Money;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SmsError, SmsResult};

/// Text of the low-balance alert.
pub const ALERT_MESSAGE: &str = "Your balance is low in RT Communication. Please recharge your account.";

// =============================================================================
// Database
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "bazaar", "bazaar")
        .map(|dirs| dirs.data_dir().join("bazaar.db"))
        .unwrap_or_else(|| PathBuf::from("bazaar.db"))
}

fn default_max_connections() -> u32 {
    8
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// How messages are pushed to gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Extra attempts per gateway after the first one fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry n (0-based) waits `retry_base_delay_secs × (n + 1)`.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Messages of one batch in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wait before undelivered parts of a batch are refunded.
    #[serde(default = "default_reconcile_delay")]
    pub reconcile_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    16
}

fn default_reconcile_delay() -> u64 {
    30
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay(),
            request_timeout_secs: default_request_timeout(),
            concurrency: default_concurrency(),
            reconcile_delay_secs: default_reconcile_delay(),
        }
    }
}

impl DispatchSettings {
    /// Delay before retry `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs * (u64::from(attempt) + 1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_secs(self.reconcile_delay_secs)
    }
}

// =============================================================================
// Balance Alert
// =============================================================================

/// Vendor balance check and the SMS sent when it runs low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_balance_url")]
    pub balance_url: String,

    #[serde(default)]
    pub acode: String,

    #[serde(default)]
    pub api_key: String,

    /// Alert when the vendor balance is at or below this (minor units in
    /// the file).
    #[serde(default = "default_threshold")]
    pub threshold: Money,

    #[serde(default)]
    pub recipients: Vec<String>,

    /// GET template with `{phone_number}` and `{message}`.
    #[serde(default)]
    pub alert_url: String,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_balance_url() -> String {
    "https://api.rtcom.xyz/balance".to_string()
}

fn default_threshold() -> Money {
    Money::from_major(6000)
}

fn default_check_interval() -> u64 {
    3600
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            enabled: false,
            balance_url: default_balance_url(),
            acode: String::new(),
            api_key: String::new(),
            threshold: default_threshold(),
            recipients: Vec::new(),
            alert_url: String::new(),
            check_interval_secs: default_check_interval(),
        }
    }
}

impl AlertSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub alert: AlertSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

impl SmsConfig {
    /// Loads defaults, then the file, then environment overrides, and
    /// validates the result.
    pub fn load(config_path: Option<PathBuf>) -> SmsResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading SMS config from file");
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

    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load SMS config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SmsResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SmsError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "SMS config saved");
        Ok(())
    }

    pub fn validate(&self) -> SmsResult<()> {
        if self.dispatch.concurrency == 0 {
            return Err(SmsError::InvalidConfig("dispatch.concurrency must be greater than 0".into()));
        }
        if self.database.max_connections == 0 {
            return Err(SmsError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.alert.enabled {
            Url::parse(&self.alert.balance_url)?;
            if !self.alert.alert_url.contains(PHONE_PLACEHOLDER) || !self.alert.alert_url.contains(MESSAGE_PLACEHOLDER) {
                return Err(SmsError::InvalidUrl(format!(
                    "alert_url must contain {} and {}",
                    PHONE_PLACEHOLDER, MESSAGE_PLACEHOLDER
                )));
            }
            if self.alert.recipients.is_empty() {
                return Err(SmsError::InvalidConfig("alert.recipients is empty".into()));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("BAZAAR_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(retries) = std::env::var("BAZAAR_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.dispatch.max_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid BAZAAR_MAX_RETRIES"),
            }
        }

        if let Ok(delay) = std::env::var("BAZAAR_RECONCILE_DELAY_SECS") {
            match delay.parse::<u64>() {
                Ok(secs) => self.dispatch.reconcile_delay_secs = secs,
                Err(_) => warn!(value = %delay, "Ignoring invalid BAZAAR_RECONCILE_DELAY_SECS"),
            }
        }

        if let Ok(port) = std::env::var("BAZAAR_SERVER_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding server port from environment");
                self.server.port = p;
            }
        }

        if let Ok(enabled) = std::env::var("BAZAAR_ALERT_ENABLED") {
            self.alert.enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bazaar", "bazaar").map(|dirs| dirs.config_dir().join("sms.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SmsConfig::default();
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.dispatch.reconcile_delay(), Duration::from_secs(30));
        assert_eq!(config.alert.threshold, Money::from_major(6000));
        assert!(!config.alert.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_delay_grows_linearly() {
        let dispatch = DispatchSettings::default();
        assert_eq!(dispatch.retry_delay(0), Duration::from_secs(10));
        assert_eq!(dispatch.retry_delay(2), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SmsConfig = toml::from_str(
            r#"
            [dispatch]
            max_retries = 1

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.dispatch.max_retries, 1);
        assert_eq!(config.dispatch.concurrency, 16);
        assert_eq!(config.server.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_enabled_alert_needs_template_and_recipients() {
        let mut config = SmsConfig::default();
        config.alert.enabled = true;
        config.alert.alert_url = "https://sms.test/send?to={phone_number}".into();
        assert!(config.validate().unwrap_err().is_config_error());

        config.alert.alert_url = "https://sms.test/send?to={phone_number}&msg={message}".into();
        assert!(config.validate().is_err());

        config.alert.recipients = vec!["8801861650206".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = SmsConfig::default();
        config.dispatch.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_sections() {
        let toml_str = toml::to_string_pretty(&SmsConfig::default()).unwrap();
        assert!(toml_str.contains("[dispatch]"));
        assert!(toml_str.contains("[alert]"));
    }
}
