//! Wallet Provider
//!
//! Application facing registry: holds the registered wallets, at most one
//! selected adapter, and a mirror of its state. Every adapter error reaches
//! one error handler, so callers can treat failed calls as already reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};

use crate::adapter::types::*;
use crate::adapter::{AdapterEvent, ListenerHandle, WalletAdapter, WalletError};
use crate::wallets::{Wallet, WalletName};

/// Receives every error raised through the provider
pub type ErrorHandler = Arc<dyn Fn(&WalletError) + Send + Sync>;

/// Provider behavior
#[derive(Clone)]
pub struct ProviderOptions {
    /// Connect as soon as the selected wallet is ready
    pub auto_connect: bool,
    pub on_error: ErrorHandler,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            auto_connect: false,
            on_error: Arc::new(|e: &WalletError| error!("{}", e)),
        }
    }
}

/// Snapshot of the provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderState {
    pub wallet: Option<WalletName>,
    pub ready: bool,
    pub address: Option<String>,
    pub connected: bool,
    pub connecting: bool,
    pub disconnecting: bool,
}

#[derive(Debug, Clone, Default)]
struct Mirror {
    ready: bool,
    address: Option<String>,
    connected: bool,
}

struct Selection {
    name: WalletName,
    adapter: Arc<dyn WalletAdapter>,
    listener: ListenerHandle,
}

/// Clears a busy flag on drop
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    wallets: Vec<Wallet>,
    options: ProviderOptions,
    selection: Mutex<Option<Selection>>,
    mirror: Mutex<Mirror>,
    connecting: AtomicBool,
    disconnecting: AtomicBool,
    unloading: AtomicBool,
}

impl Inner {
    fn selection(&self) -> MutexGuard<'_, Option<Selection>> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mirror(&self) -> MutexGuard<'_, Mirror> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn busy(&self) -> bool {
        self.connecting.load(Ordering::SeqCst) || self.disconnecting.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<(WalletName, Arc<dyn WalletAdapter>)> {
        self.selection()
            .as_ref()
            .map(|s| (s.name, s.adapter.clone()))
    }

    /// Hand an error to the handler unless the application is unloading
    fn raise(&self, error: WalletError) -> WalletError {
        if !self.unloading.load(Ordering::SeqCst) {
            (self.options.on_error)(&error);
        }
        error
    }

    fn sync_mirror(&self, adapter: &dyn WalletAdapter) {
        *self.mirror() = Mirror {
            ready: adapter.ready(),
            address: adapter.address(),
            connected: adapter.connected(),
        };
    }

    /// Drop the selection and its listener without touching the adapter
    fn deselect(&self) -> Option<Selection> {
        let selection = self.selection().take();
        if let Some(selection) = &selection {
            selection.adapter.off(selection.listener);
            info!("Deselected {}", selection.name);
        }
        *self.mirror() = Mirror::default();
        selection
    }

    fn attach(self: &Arc<Self>, name: WalletName, adapter: Arc<dyn WalletAdapter>) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let listener = adapter.on(Box::new(move |event: &AdapterEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_event(name, event);
            }
        }));
        self.sync_mirror(adapter.as_ref());
        *self.selection() = Some(Selection {
            name,
            adapter,
            listener,
        });
        info!("Selected {}", name);
    }

    fn on_event(self: &Arc<Self>, name: WalletName, event: &AdapterEvent) {
        let current = self.current();
        let Some((selected, adapter)) = current else {
            return;
        };
        if selected != name {
            return;
        }
        match event {
            AdapterEvent::Ready => {
                self.mirror().ready = true;
                self.auto_connect();
            }
            AdapterEvent::Connect => self.sync_mirror(adapter.as_ref()),
            AdapterEvent::Disconnect => {
                if !self.unloading.load(Ordering::SeqCst) {
                    self.deselect();
                }
            }
            AdapterEvent::Error(e) => {
                self.raise(e.clone());
            }
        }
    }

    /// Spawn a connect when enabled and the selected wallet is ready
    fn auto_connect(self: &Arc<Self>) {
        if !self.options.auto_connect {
            return;
        }
        let mirror = self.mirror().clone();
        if !mirror.ready || mirror.connected || self.busy() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Auto-connect needs a tokio runtime");
            return;
        };
        let inner = self.clone();
        handle.spawn(async move {
            if let Err(e) = inner.connect().await {
                debug!("Auto-connect failed: {}", e);
            }
        });
    }

    async fn connect(self: &Arc<Self>) -> Result<(), WalletError> {
        let connected = self.mirror().connected;
        if self.busy() || connected {
            return Ok(());
        }
        let Some((name, adapter)) = self.current() else {
            return Err(self.raise(WalletError::not_selected()));
        };

        if !adapter.ready() {
            let url = self
                .wallets
                .iter()
                .find(|w| w.name == name)
                .map(|w| w.url.clone())
                .unwrap_or_else(|| name.url().to_string());
            self.deselect();
            warn!("{} is not ready, install it from {}", name, url);
            return Err(self.raise(WalletError::not_ready()));
        }

        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let _connecting = FlagGuard(&self.connecting);

        match adapter.connect().await {
            Ok(()) => {
                self.sync_mirror(adapter.as_ref());
                Ok(())
            }
            Err(e) => {
                self.deselect();
                Err(e)
            }
        }
    }

    /// Claim the disconnecting flag, `None` when another switch holds it
    fn begin_switch(&self) -> Option<FlagGuard<'_>> {
        self.disconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlagGuard(&self.disconnecting))
    }

    /// Disconnect and detach the selected adapter
    async fn release(&self) {
        let Some(selection) = self.deselect() else {
            return;
        };
        if let Err(e) = selection.adapter.disconnect().await {
            warn!("Failed to disconnect {}: {}", selection.name, e);
        }
    }
}

/// Registry of wallets with one selected adapter
#[derive(Clone)]
pub struct WalletProvider {
    inner: Arc<Inner>,
}

impl WalletProvider {
    pub fn new(wallets: Vec<Wallet>) -> Self {
        Self::with_options(wallets, ProviderOptions::default())
    }

    pub fn with_options(wallets: Vec<Wallet>, options: ProviderOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                wallets,
                options,
                selection: Mutex::new(None),
                mirror: Mutex::new(Mirror::default()),
                connecting: AtomicBool::new(false),
                disconnecting: AtomicBool::new(false),
                unloading: AtomicBool::new(false),
            }),
        }
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.inner.wallets
    }

    /// Selected wallet
    pub fn wallet(&self) -> Option<&Wallet> {
        let name = self.inner.current()?.0;
        self.inner.wallets.iter().find(|w| w.name == name)
    }

    pub fn adapter(&self) -> Option<Arc<dyn WalletAdapter>> {
        self.inner.current().map(|(_, adapter)| adapter)
    }

    pub fn state(&self) -> ProviderState {
        let mirror = self.inner.mirror().clone();
        ProviderState {
            wallet: self.inner.current().map(|(name, _)| name),
            ready: mirror.ready,
            address: mirror.address,
            connected: mirror.connected,
            connecting: self.inner.connecting.load(Ordering::SeqCst),
            disconnecting: self.inner.disconnecting.load(Ordering::SeqCst),
        }
    }

    /// Select a wallet, disconnecting the previous one first
    ///
    /// A no-op for the current wallet or while connecting or disconnecting.
    pub async fn select(&self, name: WalletName) -> Result<(), WalletError> {
        if self.inner.busy() {
            debug!("Ignoring selection of {} while busy", name);
            return Ok(());
        }
        if self.inner.current().map(|(n, _)| n) == Some(name) {
            return Ok(());
        }
        let Some(wallet) = self.inner.wallets.iter().find(|w| w.name == name).cloned() else {
            return Err(self
                .inner
                .raise(WalletError::not_found().with_message(format!("{} is not registered", name))));
        };

        let Some(switching) = self.inner.begin_switch() else {
            debug!("Ignoring selection of {} while busy", name);
            return Ok(());
        };
        self.inner.release().await;
        let adapter = (wallet.adapter)();
        self.inner.attach(name, adapter);
        drop(switching);
        self.inner.auto_connect();
        Ok(())
    }

    /// Disconnect and forget the selected wallet
    pub async fn deselect(&self) {
        if self.inner.busy() {
            return;
        }
        let Some(_switching) = self.inner.begin_switch() else {
            return;
        };
        self.inner.release().await;
    }

    pub async fn connect(&self) -> Result<(), WalletError> {
        self.inner.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), WalletError> {
        if self.inner.disconnecting.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some((_, adapter)) = self.inner.current() else {
            self.inner.deselect();
            return Ok(());
        };

        self.inner.disconnecting.store(true, Ordering::SeqCst);
        let _disconnecting = FlagGuard(&self.inner.disconnecting);
        match adapter.disconnect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.deselect();
                Err(e)
            }
        }
    }

    /// Stop reacting to adapter errors and disconnects
    pub fn unload(&self) {
        self.inner.unloading.store(true, Ordering::SeqCst);
    }

    fn connected_adapter(&self) -> Result<Arc<dyn WalletAdapter>, WalletError> {
        let Some((_, adapter)) = self.inner.current() else {
            return Err(self.inner.raise(WalletError::not_selected()));
        };
        if !self.inner.mirror().connected {
            return Err(self.inner.raise(WalletError::not_connected()));
        }
        Ok(adapter)
    }

    // =========================================================================
    // Delegation
    // =========================================================================

    pub async fn invoke_read(
        &self,
        request: &ContractReadInvocation,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        self.connected_adapter()?.invoke_read(request).await
    }

    pub async fn invoke_read_multi(
        &self,
        request: &ContractReadInvocationMulti,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        self.connected_adapter()?.invoke_read_multi(request).await
    }

    pub async fn invoke(
        &self,
        request: &ContractWriteInvocation,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        self.connected_adapter()?.invoke(request).await
    }

    pub async fn invoke_multi(
        &self,
        request: &ContractWriteInvocationMulti,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        self.connected_adapter()?.invoke_multi(request).await
    }

    pub async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError> {
        self.connected_adapter()?.get_networks().await
    }

    pub async fn sign_message(
        &self,
        request: &SignMessageInvocation,
    ) -> Result<SignMessageInvocationResult, WalletError> {
        self.connected_adapter()?.sign_message(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{EventEmitter, WalletErrorKind};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MockAdapter {
        name: Option<WalletName>,
        ready: AtomicBool,
        fail: bool,
        address: Mutex<Option<String>>,
        events: EventEmitter,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        hold_disconnect: Option<Arc<tokio::sync::Notify>>,
    }

    impl MockAdapter {
        fn new(name: WalletName, ready: bool) -> Self {
            Self {
                name: Some(name),
                ready: AtomicBool::new(ready),
                ..Default::default()
            }
        }

        fn become_ready(&self) {
            self.ready.store(true, Ordering::SeqCst);
            self.events.emit(AdapterEvent::Ready);
        }

        fn drop_connection(&self) {
            *self.address.lock().unwrap() = None;
            self.events.emit(AdapterEvent::Error(WalletError::disconnected()));
            self.events.emit(AdapterEvent::Disconnect);
        }
    }

    #[async_trait]
    impl WalletAdapter for MockAdapter {
        fn name(&self) -> WalletName {
            self.name.unwrap_or(WalletName::NeoLine)
        }

        fn address(&self) -> Option<String> {
            self.address.lock().unwrap().clone()
        }

        fn ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn connecting(&self) -> bool {
            false
        }

        fn events(&self) -> &EventEmitter {
            &self.events
        }

        async fn connect(&self) -> Result<(), WalletError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                let err = WalletError::connection();
                self.events.emit(AdapterEvent::Error(err.clone()));
                return Err(err);
            }
            *self.address.lock().unwrap() = Some("NVg7LjGcUSrgxgjX3zEgqaksfMaiS8Z6e1".to_string());
            self.events.emit(AdapterEvent::Connect);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), WalletError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.hold_disconnect {
                gate.notified().await;
            }
            *self.address.lock().unwrap() = None;
            self.events.emit(AdapterEvent::Disconnect);
            Ok(())
        }

        async fn invoke_read(
            &self,
            _request: &ContractReadInvocation,
        ) -> Result<ContractReadInvocationResult, WalletError> {
            Ok(InvocationResult::error("unused", "TEST"))
        }

        async fn invoke_read_multi(
            &self,
            _request: &ContractReadInvocationMulti,
        ) -> Result<ContractReadInvocationResult, WalletError> {
            Ok(InvocationResult::error("unused", "TEST"))
        }

        async fn invoke(
            &self,
            _request: &ContractWriteInvocation,
        ) -> Result<ContractWriteInvocationResult, WalletError> {
            Ok(InvocationResult::success(ContractWriteInvocationResultData {
                tx_id: "0xabc".to_string(),
            }))
        }

        async fn invoke_multi(
            &self,
            _request: &ContractWriteInvocationMulti,
        ) -> Result<ContractWriteInvocationResult, WalletError> {
            Ok(InvocationResult::error("unused", "TEST"))
        }

        async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError> {
            Ok(InvocationResult::success(GetNetworksResultData {
                networks: vec!["TestNet".to_string()],
                default_network: "TestNet".to_string(),
            }))
        }

        async fn sign_message(
            &self,
            _request: &SignMessageInvocation,
        ) -> Result<SignMessageInvocationResult, WalletError> {
            Err(WalletError::method_not_supported())
        }
    }

    fn wallet_for(adapter: Arc<MockAdapter>) -> Wallet {
        let name = adapter.name();
        Wallet::new(name, move || adapter.clone() as Arc<dyn WalletAdapter>)
    }

    fn provider_with(
        wallets: Vec<Wallet>,
        auto_connect: bool,
    ) -> (WalletProvider, Arc<Mutex<Vec<WalletErrorKind>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let provider = WalletProvider::with_options(
            wallets,
            ProviderOptions {
                auto_connect,
                on_error: Arc::new(move |e: &WalletError| seen.lock().unwrap().push(e.kind())),
            },
        );
        (provider, errors)
    }

    #[tokio::test]
    async fn test_select_ignored_while_switching() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let mut neoline = MockAdapter::new(WalletName::NeoLine, true);
        neoline.hold_disconnect = Some(gate.clone());
        let neoline = Arc::new(neoline);
        let o3 = Arc::new(MockAdapter::new(WalletName::O3, true));
        let onegate = Arc::new(MockAdapter::new(WalletName::OneGate, true));
        let (provider, _) = provider_with(
            vec![wallet_for(neoline.clone()), wallet_for(o3), wallet_for(onegate.clone())],
            false,
        );
        provider.select(WalletName::NeoLine).await.unwrap();

        let switching = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.select(WalletName::O3).await })
        };
        while neoline.disconnects.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(provider.state().disconnecting);

        provider.select(WalletName::OneGate).await.unwrap();
        gate.notify_one();
        switching.await.unwrap().unwrap();

        let state = provider.state();
        assert_eq!(state.wallet, Some(WalletName::O3));
        assert!(!state.disconnecting);
        assert_eq!(onegate.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_select_and_connect_mirror_state() {
        let adapter = Arc::new(MockAdapter::new(WalletName::NeoLine, true));
        let (provider, errors) = provider_with(vec![wallet_for(adapter.clone())], false);

        provider.select(WalletName::NeoLine).await.unwrap();
        assert_eq!(provider.state().wallet, Some(WalletName::NeoLine));
        assert!(provider.state().ready);

        provider.connect().await.unwrap();
        let state = provider.state();
        assert!(state.connected);
        assert_eq!(state.address.as_deref(), Some("NVg7LjGcUSrgxgjX3zEgqaksfMaiS8Z6e1"));
        assert!(!state.connecting);

        // Connected: a second connect is a no-op
        provider.connect().await.unwrap();
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 1);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_selection() {
        let (provider, errors) = provider_with(Vec::new(), false);

        let err = provider.connect().await.unwrap_err();

        assert!(err.is(WalletErrorKind::NotSelected));
        assert_eq!(*errors.lock().unwrap(), vec![WalletErrorKind::NotSelected]);
    }

    #[tokio::test]
    async fn test_connect_not_ready_deselects() {
        let adapter = Arc::new(MockAdapter::new(WalletName::O3, false));
        let (provider, errors) = provider_with(vec![wallet_for(adapter.clone())], false);
        provider.select(WalletName::O3).await.unwrap();

        let err = provider.connect().await.unwrap_err();

        assert!(err.is(WalletErrorKind::NotReady));
        assert_eq!(provider.state().wallet, None);
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 0);
        assert_eq!(*errors.lock().unwrap(), vec![WalletErrorKind::NotReady]);
    }

    #[tokio::test]
    async fn test_adapter_failure_deselects_and_reports_once() {
        let adapter = Arc::new(MockAdapter {
            fail: true,
            ..MockAdapter::new(WalletName::OneGate, true)
        });
        let (provider, errors) = provider_with(vec![wallet_for(adapter.clone())], false);
        provider.select(WalletName::OneGate).await.unwrap();

        let err = provider.connect().await.unwrap_err();

        assert!(err.is(WalletErrorKind::Connection));
        assert_eq!(provider.state().wallet, None);
        assert_eq!(*errors.lock().unwrap(), vec![WalletErrorKind::Connection]);
        assert_eq!(adapter.events.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_switching_wallets_disconnects_previous() {
        let first = Arc::new(MockAdapter::new(WalletName::NeoLine, true));
        let second = Arc::new(MockAdapter::new(WalletName::O3, true));
        let (provider, _) = provider_with(
            vec![wallet_for(first.clone()), wallet_for(second.clone())],
            false,
        );

        provider.select(WalletName::NeoLine).await.unwrap();
        provider.connect().await.unwrap();
        provider.select(WalletName::O3).await.unwrap();

        assert_eq!(first.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(first.events.listener_count(), 0);
        assert_eq!(provider.state().wallet, Some(WalletName::O3));
        assert!(!provider.state().connected);

        // Same wallet again is a no-op
        provider.select(WalletName::O3).await.unwrap();
        assert_eq!(second.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unregistered_wallet_is_not_found() {
        let (provider, errors) = provider_with(Vec::new(), false);
        let err = provider.select(WalletName::Neon).await.unwrap_err();
        assert!(err.is(WalletErrorKind::NotFound));
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_disconnect_deselects() {
        let adapter = Arc::new(MockAdapter::new(WalletName::NeoLine, true));
        let (provider, errors) = provider_with(vec![wallet_for(adapter.clone())], false);
        provider.select(WalletName::NeoLine).await.unwrap();
        provider.connect().await.unwrap();

        adapter.drop_connection();

        assert_eq!(provider.state(), ProviderState::default());
        assert_eq!(*errors.lock().unwrap(), vec![WalletErrorKind::Disconnected]);
    }

    #[tokio::test]
    async fn test_unload_suppresses_handling() {
        let adapter = Arc::new(MockAdapter::new(WalletName::NeoLine, true));
        let (provider, errors) = provider_with(vec![wallet_for(adapter.clone())], false);
        provider.select(WalletName::NeoLine).await.unwrap();
        provider.connect().await.unwrap();

        provider.unload();
        adapter.drop_connection();

        assert_eq!(provider.state().wallet, Some(WalletName::NeoLine));
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_disconnect() {
        let adapter = Arc::new(MockAdapter::new(WalletName::NeoLine, true));
        let (provider, _) = provider_with(vec![wallet_for(adapter.clone())], false);

        // Nothing selected
        provider.disconnect().await.unwrap();

        provider.select(WalletName::NeoLine).await.unwrap();
        provider.connect().await.unwrap();
        provider.disconnect().await.unwrap();

        assert_eq!(adapter.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(provider.state().wallet, None);
        assert!(!provider.state().disconnecting);
    }

    #[tokio::test]
    async fn test_invoke_guards() {
        let adapter = Arc::new(MockAdapter::new(WalletName::NeoLine, true));
        let (provider, errors) = provider_with(vec![wallet_for(adapter.clone())], false);
        let request = ContractWriteInvocation::new(ContractReadInvocation::new("0x01", "transfer"));

        let err = provider.invoke(&request).await.unwrap_err();
        assert!(err.is(WalletErrorKind::NotSelected));

        provider.select(WalletName::NeoLine).await.unwrap();
        let err = provider.invoke(&request).await.unwrap_err();
        assert!(err.is(WalletErrorKind::NotConnected));

        provider.connect().await.unwrap();
        let result = provider.invoke(&request).await.unwrap();
        assert_eq!(result.data().map(|d| d.tx_id.as_str()), Some("0xabc"));
        assert_eq!(
            *errors.lock().unwrap(),
            vec![WalletErrorKind::NotSelected, WalletErrorKind::NotConnected]
        );
    }

    #[tokio::test]
    async fn test_auto_connect_on_ready() {
        let adapter = Arc::new(MockAdapter::new(WalletName::NeoLine, false));
        let (provider, _) = provider_with(vec![wallet_for(adapter.clone())], true);
        provider.select(WalletName::NeoLine).await.unwrap();
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 0);

        adapter.become_ready();
        for _ in 0..10 {
            if provider.state().connected {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(provider.state().connected);
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 1);
    }
}
