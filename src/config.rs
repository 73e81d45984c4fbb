//! # Configuration
//!
//! Constants used throughout the wallet client, plus [`WalletConfig`], the
//! resolved runtime configuration (environment first, then defaults, then
//! command-line overrides applied by the binary).

use crate::error::{WalletError, WalletResult};
use std::{path::PathBuf, time::Duration};

/// Network and coordination server configuration
pub mod network {
    use std::time::Duration;

    /// Ark coordination server the SDK connects to
    pub const DEFAULT_SERVER_URL: &str = "https://mutinynet.arkade.sh";

    /// Local SDK bridge that hosts the wallet SDK
    pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:7070";

    /// Per-request timeout for the HTTP client
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    /// Upper bound for any single network-bound wallet step
    pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Persistence configuration
pub mod storage {
    /// Key under which the wallet record is stored
    pub const WALLET_RECORD_KEY: &str = "arkWallet";

    /// Key a record that failed to parse is moved aside to
    pub const CORRUPT_RECORD_KEY: &str = "arkWallet.corrupt";

    /// Directory name under the platform data directory
    pub const DATA_DIR_NAME: &str = "aw";
}

/// Display configuration
pub mod display {
    /// Leading characters kept when shortening an address
    pub const ADDRESS_DISPLAY_PREFIX: usize = 10;

    /// Trailing characters kept when shortening an address
    pub const ADDRESS_DISPLAY_SUFFIX: usize = 8;

    /// Leading characters kept when shortening a txid
    pub const TXID_DISPLAY_PREFIX: usize = 8;

    /// Trailing characters kept when shortening a txid
    pub const TXID_DISPLAY_SUFFIX: usize = 8;
}

/// Environment variable names
pub mod env {
    /// Coordination server override
    pub const SERVER_URL: &str = "ARK_SERVER_URL";

    /// SDK bridge override
    pub const BRIDGE_URL: &str = "AW_BRIDGE_URL";

    /// Data directory override
    pub const DATA_DIR: &str = "AW_DATA_DIR";

    /// Operation timeout override, in seconds
    pub const TIMEOUT_SECS: &str = "AW_TIMEOUT_SECS";
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    /// Ark coordination server URL handed to the SDK when opening a session.
    pub server_url: String,
    /// SDK bridge base URL used by the HTTP session factory.
    pub bridge_url: String,
    /// Directory holding the persisted wallet record.
    pub data_dir: PathBuf,
    /// Timeout applied to every network-bound step.
    pub operation_timeout: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            server_url: network::DEFAULT_SERVER_URL.to_string(),
            bridge_url: network::DEFAULT_BRIDGE_URL.to_string(),
            data_dir: default_data_dir(),
            operation_timeout: network::DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl WalletConfig {
    /// Build the configuration from environment variables or defaults
    pub fn from_env() -> WalletResult<Self> {
        // Load .env if present
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let server_url = std::env::var(env::SERVER_URL).unwrap_or(defaults.server_url);
        let bridge_url = std::env::var(env::BRIDGE_URL).unwrap_or(defaults.bridge_url);
        let data_dir = std::env::var(env::DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let operation_timeout = match std::env::var(env::TIMEOUT_SECS) {
            Ok(raw) => parse_timeout_secs(&raw)?,
            Err(_) => defaults.operation_timeout,
        };

        let config = Self {
            server_url,
            bridge_url,
            data_dir,
            operation_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that URLs are usable and the timeout is non-zero
    pub fn validate(&self) -> WalletResult<()> {
        for (name, url) in [("server url", &self.server_url), ("bridge url", &self.bridge_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(WalletError::config(format!(
                    "{} must start with http:// or https://, got '{}'",
                    name, url
                )));
            }
        }
        if self.operation_timeout.is_zero() {
            return Err(WalletError::config("operation timeout must be positive"));
        }
        Ok(())
    }
}

/// Parse a timeout given in whole seconds
pub fn parse_timeout_secs(raw: &str) -> WalletResult<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| WalletError::config(format!("invalid timeout '{}'", raw)))?;
    if secs == 0 {
        return Err(WalletError::config("operation timeout must be positive"));
    }
    Ok(Duration::from_secs(secs))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(storage::DATA_DIR_NAME)
}
