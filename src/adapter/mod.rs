//! Wallet Adapters for Neo N3
//!
//! This module provides a unified interface for interacting with Neo N3 wallets.
//! All wallets implement the `WalletAdapter` trait, providing a consistent API for:
//! - Connection lifecycle (connect, disconnect, readiness)
//! - Contract invocation (test invokes and signed transactions)
//! - Network discovery and message signing
//! - Lifecycle events (ready, connect, disconnect, error)

pub mod error;
pub mod events;
pub mod lifecycle;
pub mod normalize;
pub mod readiness;
pub mod types;

// Re-export commonly used items
pub use error::{WalletError, WalletErrorKind};
pub use events::{AdapterEvent, AdapterEventStream, EventEmitter, ListenerHandle};
pub use lifecycle::{AdapterCore, AdapterSession, ConnectionPhase};
pub use readiness::{EnvironmentProbe, PollConfig, ReadinessPoller};
pub use types::*;

use async_trait::async_trait;

use crate::wallets::WalletName;

/// Base trait for all wallet adapters
///
/// Every operation except `connect` and `disconnect` fails with
/// `NotConnected` before reaching the wallet when no account is connected.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Get the wallet name
    fn name(&self) -> WalletName;

    /// Connected account address
    fn address(&self) -> Option<String>;

    /// Whether the wallet transport was detected
    fn ready(&self) -> bool;

    fn connecting(&self) -> bool;

    fn connected(&self) -> bool {
        self.address().is_some()
    }

    /// Event subscription capability
    fn events(&self) -> &EventEmitter;

    /// Register an event listener
    fn on(&self, listener: Box<dyn Fn(&AdapterEvent) + Send + Sync>) -> ListenerHandle {
        self.events().on(listener)
    }

    /// Remove an event listener
    fn off(&self, handle: ListenerHandle) -> bool {
        self.events().off(handle)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the wallet, a no-op while connected or connecting
    async fn connect(&self) -> Result<(), WalletError>;

    /// Disconnect, always emitting exactly one `Disconnect`
    async fn disconnect(&self) -> Result<(), WalletError>;

    // =========================================================================
    // Invocations
    // =========================================================================

    /// Test invoke a single contract call
    async fn invoke_read(
        &self,
        request: &ContractReadInvocation,
    ) -> Result<ContractReadInvocationResult, WalletError>;

    /// Test invoke several contract calls in one script
    async fn invoke_read_multi(
        &self,
        request: &ContractReadInvocationMulti,
    ) -> Result<ContractReadInvocationResult, WalletError>;

    /// Sign and relay a single contract call
    async fn invoke(
        &self,
        request: &ContractWriteInvocation,
    ) -> Result<ContractWriteInvocationResult, WalletError>;

    /// Sign and relay several contract calls in one transaction
    async fn invoke_multi(
        &self,
        request: &ContractWriteInvocationMulti,
    ) -> Result<ContractWriteInvocationResult, WalletError>;

    // =========================================================================
    // Wallet
    // =========================================================================

    async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError>;

    async fn sign_message(
        &self,
        request: &SignMessageInvocation,
    ) -> Result<SignMessageInvocationResult, WalletError>;
}
