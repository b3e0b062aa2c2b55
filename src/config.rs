//! Configuration
//!
//! JSON configuration for the adapters and the command line tool. Every
//! field is optional; missing ones take the adapters' defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::adapter::PollConfig;
#[cfg(feature = "walletconnect")]
use crate::wallets::WalletConnectConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_rpc_url() -> String {
    "https://testnet1.neo.coz.io:443".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Readiness polling of injected wallets
    #[serde(default)]
    pub poll: PollConfig,
    /// Connect the selected wallet as soon as it is ready
    #[serde(default)]
    pub auto_connect: bool,
    /// Neo JSON-RPC node used to confirm transactions
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[cfg(feature = "walletconnect")]
    #[serde(default)]
    pub wallet_connect: WalletConnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            auto_connect: false,
            rpc_url: default_rpc_url(),
            #[cfg(feature = "walletconnect")]
            wallet_connect: WalletConnectConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_str)?;
        info!("Loaded configuration");
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.poll.count, 3);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = serde_json::from_str(
            r#"{"poll": {"intervalMs": 250}, "autoConnect": true, "rpcUrl": "http://localhost:10332"}"#,
        )
        .unwrap();
        assert_eq!(config.poll.interval_ms, 250);
        assert_eq!(config.poll.count, 3);
        assert!(config.auto_connect);
        assert_eq!(config.rpc_url, "http://localhost:10332");
    }

    #[cfg(feature = "walletconnect")]
    #[test]
    fn test_wallet_connect_section() {
        let config: Config = serde_json::from_str(
            r#"{"walletConnect": {"relayProvider": "wss://relay.example", "options": {"chainId": "neo3:mainnet"}}}"#,
        )
        .unwrap();
        assert_eq!(config.wallet_connect.relay_provider, "wss://relay.example");
        assert_eq!(config.wallet_connect.options.chain_id, "neo3:mainnet");
    }

    #[test]
    fn test_missing_file() {
        let err = assert_err!(Config::from_file("/nonexistent/neo-wallet-adapter.json"));
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
