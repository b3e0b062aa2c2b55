//! Wallet implementations for Neo N3
//!
//! This module provides one adapter per supported wallet plus the
//! descriptors an application registers with the provider.

pub mod dapi;
pub mod neo_dapi;
pub mod neoline;
pub mod o3;
#[cfg(feature = "walletconnect")]
pub mod walletconnect;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::{PollConfig, WalletAdapter};

// Re-export wallet adapters
pub use neo_dapi::{NeoDapiWalletAdapter, NeoProvider};
pub use neoline::{NeoLineHost, NeoLineWalletAdapter};
pub use o3::{O3Dapi, O3WalletAdapter};
#[cfg(feature = "walletconnect")]
pub use walletconnect::{WalletConnectConfig, WalletConnectWalletAdapter};

/// Supported wallets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletName {
    NeoLine,
    NeoLineMobile,
    O3,
    OneGate,
    WalletConnect,
    Neon,
}

impl WalletName {
    pub const ALL: [WalletName; 6] = [
        WalletName::NeoLine,
        WalletName::NeoLineMobile,
        WalletName::O3,
        WalletName::OneGate,
        WalletName::WalletConnect,
        WalletName::Neon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletName::NeoLine => "NeoLine",
            WalletName::NeoLineMobile => "NeoLineMobile",
            WalletName::O3 => "O3",
            WalletName::OneGate => "OneGate",
            WalletName::WalletConnect => "WalletConnect",
            WalletName::Neon => "Neon",
        }
    }

    /// Install or landing page of the wallet
    pub fn url(&self) -> &'static str {
        match self {
            WalletName::NeoLine | WalletName::NeoLineMobile => "https://neoline.io/",
            WalletName::O3 => "https://o3.network/",
            WalletName::OneGate => "https://onegate.space/",
            WalletName::WalletConnect => "https://walletconnect.com/",
            WalletName::Neon => "https://neon.coz.io/",
        }
    }

    /// Transport the wallet is reached through
    pub fn transport(&self) -> &'static str {
        match self {
            WalletName::NeoLine | WalletName::O3 => "injected dAPI",
            WalletName::NeoLineMobile | WalletName::OneGate => "injected NeoDapi provider",
            WalletName::WalletConnect | WalletName::Neon => "WalletConnect relay",
        }
    }
}

impl fmt::Display for WalletName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WalletName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WalletName::ALL
            .iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown wallet: {}", s))
    }
}

/// Builds a fresh adapter each time a wallet is selected
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn WalletAdapter> + Send + Sync>;

/// Wallet registered with the provider
#[derive(Clone)]
pub struct Wallet {
    pub name: WalletName,
    pub url: String,
    pub icon: Option<String>,
    pub adapter: AdapterFactory,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("icon", &self.icon)
            .finish()
    }
}

impl Wallet {
    pub fn new<F>(name: WalletName, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn WalletAdapter> + Send + Sync + 'static,
    {
        Self {
            name,
            url: name.url().to_string(),
            icon: None,
            adapter: Arc::new(factory),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn neoline(host: Arc<dyn NeoLineHost>, poll: PollConfig) -> Self {
        Wallet::new(WalletName::NeoLine, move || {
            Arc::new(NeoLineWalletAdapter::new(host.clone(), poll)) as Arc<dyn WalletAdapter>
        })
    }

    pub fn o3(dapi: Arc<dyn O3Dapi>) -> Self {
        Wallet::new(WalletName::O3, move || {
            Arc::new(O3WalletAdapter::new(dapi.clone())) as Arc<dyn WalletAdapter>
        })
    }

    pub fn onegate(provider: Arc<dyn NeoProvider>, poll: PollConfig) -> Self {
        Wallet::new(WalletName::OneGate, move || {
            Arc::new(NeoDapiWalletAdapter::onegate(provider.clone(), poll)) as Arc<dyn WalletAdapter>
        })
    }

    pub fn neoline_mobile(provider: Arc<dyn NeoProvider>, poll: PollConfig) -> Self {
        Wallet::new(WalletName::NeoLineMobile, move || {
            Arc::new(NeoDapiWalletAdapter::neoline_mobile(provider.clone(), poll))
                as Arc<dyn WalletAdapter>
        })
    }

    #[cfg(feature = "walletconnect")]
    pub fn walletconnect(
        name: WalletName,
        config: WalletConnectConfig,
        builder: Arc<dyn walletconnect::SignClientBuilder>,
        presenter: Arc<dyn walletconnect::PairingPresenter>,
    ) -> Self {
        Wallet::new(name, move || {
            Arc::new(WalletConnectWalletAdapter::new(
                name,
                config.clone(),
                builder.clone(),
                presenter.clone(),
            )) as Arc<dyn WalletAdapter>
        })
    }
}
