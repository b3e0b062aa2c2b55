//! neo-wallet-adapter - Unified Neo N3 wallet adapters
//!
//! One interface over NeoLine, O3, OneGate, NeoLine Mobile and WalletConnect
//! wallets, plus a provider that manages the selected wallet.

pub mod adapter;
pub mod config;
pub mod provider;
pub mod wait;
pub mod wallets;

pub use adapter::{AdapterEvent, WalletAdapter, WalletError, WalletErrorKind};
pub use config::{Config, ConfigError};
pub use provider::{ProviderOptions, ProviderState, WalletProvider};
pub use wait::{wait_tx, RpcClient, TransactionSource, WaitOptions};
pub use wallets::{Wallet, WalletName};
