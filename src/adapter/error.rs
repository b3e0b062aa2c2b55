//! Wallet Error Types
//!
//! Unified error handling for all wallet adapters.

use std::fmt;
use std::sync::Arc;

/// Shared, cloneable cause attached to a [`WalletError`]
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// The kind of failure a wallet interaction ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletErrorKind {
    /// The requested wallet is not known
    NotFound,
    /// The wallet extension is not installed
    NotInstalled,
    /// The wallet transport has not been detected yet
    NotReady,
    /// Acquiring the wallet transport failed
    Connection,
    /// The wallet dropped the connection on its own
    Disconnected,
    /// Tearing the connection down failed
    Disconnection,
    /// The wallet returned no account or an invalid one
    Account,
    /// An operation was attempted while disconnected
    NotConnected,
    /// An operation did not complete in time
    Timeout,
    /// The wallet window could not be opened
    WindowBlocked,
    /// The user dismissed the wallet or pairing window
    WindowClosed,
    /// The wallet does not implement the requested method
    MethodNotSupported,
    /// No wallet has been selected in the provider
    NotSelected,
    /// The wallet rejected or failed a request
    Invocation,
}

impl WalletErrorKind {
    /// Name of the error, matching the classic `Wallet*Error` naming
    pub fn name(&self) -> &'static str {
        match self {
            WalletErrorKind::NotFound => "WalletNotFoundError",
            WalletErrorKind::NotInstalled => "WalletNotInstalledError",
            WalletErrorKind::NotReady => "WalletNotReadyError",
            WalletErrorKind::Connection => "WalletConnectionError",
            WalletErrorKind::Disconnected => "WalletDisconnectedError",
            WalletErrorKind::Disconnection => "WalletDisconnectionError",
            WalletErrorKind::Account => "WalletAccountError",
            WalletErrorKind::NotConnected => "WalletNotConnectedError",
            WalletErrorKind::Timeout => "WalletTimeoutError",
            WalletErrorKind::WindowBlocked => "WalletWindowBlockedError",
            WalletErrorKind::WindowClosed => "WalletWindowClosedError",
            WalletErrorKind::MethodNotSupported => "WalletMethodNotSupportedError",
            WalletErrorKind::NotSelected => "WalletNotSelectedError",
            WalletErrorKind::Invocation => "WalletInvocationError",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            WalletErrorKind::NotFound => "wallet not found",
            WalletErrorKind::NotInstalled => "wallet not installed",
            WalletErrorKind::NotReady => "wallet not ready",
            WalletErrorKind::Connection => "wallet connection failed",
            WalletErrorKind::Disconnected => "wallet disconnected",
            WalletErrorKind::Disconnection => "wallet disconnection failed",
            WalletErrorKind::Account => "wallet returned no usable account",
            WalletErrorKind::NotConnected => "wallet not connected",
            WalletErrorKind::Timeout => "wallet operation timed out",
            WalletErrorKind::WindowBlocked => "wallet window blocked",
            WalletErrorKind::WindowClosed => "wallet window closed",
            WalletErrorKind::MethodNotSupported => "method not supported by wallet",
            WalletErrorKind::NotSelected => "no wallet selected",
            WalletErrorKind::Invocation => "wallet request failed",
        }
    }
}

impl fmt::Display for WalletErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error raised by every wallet adapter operation
///
/// Cloneable so the same error can be returned to the caller and broadcast
/// to every event listener.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct WalletError {
    kind: WalletErrorKind,
    message: String,
    custom_message: bool,
    #[source]
    source: Option<ErrorSource>,
}

impl WalletError {
    /// Create an error of the given kind with its default message
    pub fn new(kind: WalletErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            custom_message: false,
            source: None,
        }
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self.custom_message = true;
        self
    }

    /// Wrap an underlying cause, keeping its text as the message when none is set
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.custom_message {
            self.message = source.to_string();
            self.custom_message = true;
        }
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> WalletErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, kind: WalletErrorKind) -> bool {
        self.kind == kind
    }

    pub fn not_found() -> Self {
        Self::new(WalletErrorKind::NotFound)
    }

    pub fn not_installed() -> Self {
        Self::new(WalletErrorKind::NotInstalled)
    }

    pub fn not_ready() -> Self {
        Self::new(WalletErrorKind::NotReady)
    }

    pub fn connection() -> Self {
        Self::new(WalletErrorKind::Connection)
    }

    pub fn disconnected() -> Self {
        Self::new(WalletErrorKind::Disconnected)
    }

    pub fn disconnection() -> Self {
        Self::new(WalletErrorKind::Disconnection)
    }

    pub fn account() -> Self {
        Self::new(WalletErrorKind::Account)
    }

    pub fn not_connected() -> Self {
        Self::new(WalletErrorKind::NotConnected)
    }

    pub fn timeout() -> Self {
        Self::new(WalletErrorKind::Timeout)
    }

    pub fn window_blocked() -> Self {
        Self::new(WalletErrorKind::WindowBlocked)
    }

    pub fn window_closed() -> Self {
        Self::new(WalletErrorKind::WindowClosed)
    }

    pub fn method_not_supported() -> Self {
        Self::new(WalletErrorKind::MethodNotSupported)
    }

    pub fn not_selected() -> Self {
        Self::new(WalletErrorKind::NotSelected)
    }

    pub fn invocation() -> Self {
        Self::new(WalletErrorKind::Invocation)
    }
}

impl From<WalletErrorKind> for WalletError {
    fn from(kind: WalletErrorKind) -> Self {
        WalletError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, thiserror::Error)]
    #[error("extension refused")]
    struct Refused;

    #[test]
    fn test_default_message() {
        let err = WalletError::not_connected();
        assert_eq!(err.kind(), WalletErrorKind::NotConnected);
        assert_eq!(err.to_string(), "WalletNotConnectedError: wallet not connected");
        assert_eq!(err.message(), "wallet not connected");
    }

    #[test]
    fn test_source_becomes_message() {
        let err = WalletError::connection().with_source(Refused);
        assert_eq!(err.message(), "extension refused");
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "WalletConnectionError: extension refused");
    }

    #[test]
    fn test_explicit_message_wins() {
        let err = WalletError::account()
            .with_message("no accounts in session")
            .with_source(Refused);
        assert_eq!(err.message(), "no accounts in session");
    }

    #[test]
    fn test_clone_keeps_kind() {
        let err = WalletError::window_closed();
        let cloned = err.clone();
        assert!(cloned.is(WalletErrorKind::WindowClosed));
    }
}
