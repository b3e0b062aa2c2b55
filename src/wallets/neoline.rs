//! NeoLine Wallet Adapter
//!
//! Adapter for the NeoLine browser extension. The extension injects two
//! objects: the N3 dAPI used for accounts and invocations, and a common dAPI
//! that reports networks. Account, network and disconnect changes arrive as
//! window events.
//!
//! API Reference: https://neoline.io/dapi/N3.html

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::dapi::*;
use super::WalletName;
use crate::adapter::types::*;
use crate::adapter::{
    AdapterCore, EnvironmentProbe, EventEmitter, PollConfig, WalletAdapter, WalletError,
    WalletErrorKind,
};

/// Window events NeoLine fires when the connection is no longer valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeoLineEvent {
    Disconnected,
    AccountChanged,
    NetworkChanged,
}

impl NeoLineEvent {
    pub const WATCHED: [NeoLineEvent; 3] = [
        NeoLineEvent::Disconnected,
        NeoLineEvent::AccountChanged,
        NeoLineEvent::NetworkChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NeoLineEvent::Disconnected => "NEOLine.NEO.EVENT.DISCONNECTED",
            NeoLineEvent::AccountChanged => "NEOLine.NEO.EVENT.ACCOUNT_CHANGED",
            NeoLineEvent::NetworkChanged => "NEOLine.NEO.EVENT.NETWORK_CHANGED",
        }
    }
}

/// The `NEOLineN3` dAPI object
#[async_trait]
pub trait NeoLineN3: Send + Sync {
    /// Prompts the user to connect the dapp
    async fn get_account(&self) -> Result<DapiAccount, DapiError>;

    async fn invoke_read(&self, params: ReadParams) -> Result<DapiReadResult, DapiError>;

    async fn invoke_read_multi(&self, params: ReadMultiParams) -> Result<DapiReadResult, DapiError>;

    async fn invoke(&self, params: WriteParams) -> Result<DapiWriteResult, DapiError>;

    async fn invoke_multiple(&self, params: WriteMultiParams) -> Result<DapiWriteResult, DapiError>;

    async fn sign_message(&self, params: SignMessageParams) -> Result<DapiSignedMessage, DapiError>;
}

/// The `NEOLine` common dAPI object
#[async_trait]
pub trait NeoLineCommon: Send + Sync {
    async fn get_networks(&self) -> Result<DapiNetworks, DapiError>;
}

/// Host environment the extension injects into
#[async_trait]
pub trait NeoLineHost: Send + Sync {
    /// Whether the `NEOLineN3` global is present
    fn is_injected(&self) -> bool;

    async fn init_n3(&self) -> Result<Arc<dyn NeoLineN3>, DapiError>;

    async fn init_common(&self) -> Result<Arc<dyn NeoLineCommon>, DapiError>;

    fn add_event_listener(&self, event: NeoLineEvent, listener: TransportListener) -> ListenerId;

    fn remove_event_listener(&self, event: NeoLineEvent, id: ListenerId) -> Result<(), DapiError>;
}

/// Clients and listener registrations of a live connection
struct NeoLineClients {
    n3: Arc<dyn NeoLineN3>,
    common: Arc<dyn NeoLineCommon>,
    listeners: Vec<(NeoLineEvent, ListenerId)>,
}

struct Inner {
    core: Arc<AdapterCore>,
    host: Arc<dyn NeoLineHost>,
    clients: Mutex<Option<NeoLineClients>>,
}

impl Inner {
    fn clients(&self) -> MutexGuard<'_, Option<NeoLineClients>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn establish(self: &Arc<Self>) -> Result<(), WalletError> {
        self.core.require_ready()?;

        let n3 = self
            .host
            .init_n3()
            .await
            .map_err(|e| e.into_wallet_error(WalletErrorKind::Connection))?;
        let common = self
            .host
            .init_common()
            .await
            .map_err(|e| e.into_wallet_error(WalletErrorKind::Connection))?;

        let account = n3
            .get_account()
            .await
            .map_err(|e| e.into_wallet_error(WalletErrorKind::Account))?;
        if account.address.is_empty() {
            return Err(WalletError::account());
        }

        let listeners = self.watch();
        *self.clients() = Some(NeoLineClients {
            n3,
            common,
            listeners,
        });
        self.core.complete_connect(account.address);
        Ok(())
    }

    fn watch(self: &Arc<Self>) -> Vec<(NeoLineEvent, ListenerId)> {
        NeoLineEvent::WATCHED
            .iter()
            .map(|event| {
                let weak = Arc::downgrade(self);
                let listener: TransportListener = Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_wallet_event();
                    }
                });
                (*event, self.host.add_event_listener(*event, listener))
            })
            .collect()
    }

    /// Remove every registration, reporting the first failure
    fn unwatch(&self, listeners: &[(NeoLineEvent, ListenerId)]) -> Result<(), DapiError> {
        let mut first_error = None;
        for (event, id) in listeners {
            if let Err(e) = self.host.remove_event_listener(*event, *id) {
                warn!("Failed to remove {} listener: {}", event.as_str(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn on_wallet_event(&self) {
        let Some(clients) = self.clients().take() else {
            debug!("Ignoring NeoLine event without a connection");
            return;
        };
        if let Err(e) = self.unwatch(&clients.listeners) {
            warn!("Failed to tear down NeoLine listeners: {}", e);
        }
        self.core.transport_disconnected();
    }

    fn n3(&self) -> Result<Arc<dyn NeoLineN3>, WalletError> {
        self.core.require_connected()?;
        self.clients()
            .as_ref()
            .map(|c| c.n3.clone())
            .ok_or_else(WalletError::not_connected)
    }

    fn common(&self) -> Result<Arc<dyn NeoLineCommon>, WalletError> {
        self.core.require_connected()?;
        self.clients()
            .as_ref()
            .map(|c| c.common.clone())
            .ok_or_else(WalletError::not_connected)
    }
}

/// NeoLine browser extension adapter
pub struct NeoLineWalletAdapter {
    inner: Arc<Inner>,
}

impl NeoLineWalletAdapter {
    pub fn new(host: Arc<dyn NeoLineHost>, poll: PollConfig) -> Self {
        let probe_host = host.clone();
        let probe: Arc<dyn EnvironmentProbe> = Arc::new(move || probe_host.is_injected());
        Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new(WalletName::NeoLine, probe, poll),
                host,
                clients: Mutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl WalletAdapter for NeoLineWalletAdapter {
    fn name(&self) -> WalletName {
        WalletName::NeoLine
    }

    fn address(&self) -> Option<String> {
        self.inner.core.address()
    }

    fn ready(&self) -> bool {
        self.inner.core.ready()
    }

    fn connecting(&self) -> bool {
        self.inner.core.connecting()
    }

    fn events(&self) -> &EventEmitter {
        self.inner.core.events()
    }

    async fn connect(&self) -> Result<(), WalletError> {
        let core = &self.inner.core;
        let Some(_guard) = core.begin_connect() else {
            return Ok(());
        };
        let result = self.inner.establish().await;
        core.report(result)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        let clients = self.inner.clients().take();
        if let Some(clients) = clients {
            if let Err(e) = self.inner.unwatch(&clients.listeners) {
                self.inner.core.emit_error(WalletError::disconnection().with_source(e));
            }
        }
        self.inner.core.complete_disconnect();
        Ok(())
    }

    async fn invoke_read(
        &self,
        request: &ContractReadInvocation,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        let client = self.inner.n3()?;
        let response = client.invoke_read(ReadParams::new(request, ScopeFormat::Bits)).await;
        self.inner.core.report(settle(response, DapiReadResult::into_result))
    }

    async fn invoke_read_multi(
        &self,
        request: &ContractReadInvocationMulti,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        let client = self.inner.n3()?;
        let response = client
            .invoke_read_multi(ReadMultiParams::new(request, ScopeFormat::Bits))
            .await;
        self.inner.core.report(settle(response, DapiReadResult::into_result))
    }

    async fn invoke(
        &self,
        request: &ContractWriteInvocation,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        let client = self.inner.n3()?;
        let response = client.invoke(WriteParams::new(request, ScopeFormat::Bits)).await;
        self.inner.core.report(settle(response, DapiWriteResult::into_result))
    }

    async fn invoke_multi(
        &self,
        request: &ContractWriteInvocationMulti,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        let client = self.inner.n3()?;
        let response = client
            .invoke_multiple(WriteMultiParams::new(request, ScopeFormat::Bits))
            .await;
        self.inner.core.report(settle(response, DapiWriteResult::into_result))
    }

    async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError> {
        let client = self.inner.common()?;
        let response = client.get_networks().await;
        self.inner.core.report(settle(response, DapiNetworks::into_result))
    }

    async fn sign_message(
        &self,
        request: &SignMessageInvocation,
    ) -> Result<SignMessageInvocationResult, WalletError> {
        let client = self.inner.n3()?;
        let params = SignMessageParams {
            message: request.message.clone(),
        };
        let response = client.sign_message(params).await;
        self.inner.core.report(settle(response, DapiSignedMessage::into_result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterEvent;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    const ADDRESS: &str = "NhGomBpYnKXArr55nHRQ5rzy79TwKVXZbr";

    #[derive(Default)]
    struct MockN3 {
        account_calls: AtomicUsize,
        read_calls: AtomicUsize,
        reject_account: bool,
        state: Mutex<String>,
    }

    #[async_trait]
    impl NeoLineN3 for MockN3 {
        async fn get_account(&self) -> Result<DapiAccount, DapiError> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.reject_account {
                return Err(DapiError::new(DapiError::CONNECTION_DENIED, "user rejected"));
            }
            Ok(DapiAccount {
                address: ADDRESS.to_string(),
                label: Some("main".to_string()),
                public_key: None,
            })
        }

        async fn invoke_read(&self, params: ReadParams) -> Result<DapiReadResult, DapiError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(params.invocation.operation, "symbol");
            let state = self.state.lock().unwrap().clone();
            let exception = if state == "FAULT" { Some("boom") } else { None };
            Ok(serde_json::from_value(json!({
                "script": "wh8MBnN5bWJvbAwUz3bii9AGLEpHjuNVYQETGfPPpNJBYn1bUg==",
                "state": state,
                "gas_consumed": "0.0098",
                "stack": [{"type": "ByteString", "value": "R0FT"}],
                "exception": exception
            }))
            .unwrap())
        }

        async fn invoke_read_multi(&self, _params: ReadMultiParams) -> Result<DapiReadResult, DapiError> {
            Err(DapiError::new(DapiError::RPC_ERROR, "node unreachable"))
        }

        async fn invoke(&self, params: WriteParams) -> Result<DapiWriteResult, DapiError> {
            assert_eq!(params.options.fee.as_deref(), Some("0.0001"));
            Ok(DapiWriteResult {
                txid: "0x7f".to_string(),
                node_url: None,
                signed_tx: None,
            })
        }

        async fn invoke_multiple(&self, _params: WriteMultiParams) -> Result<DapiWriteResult, DapiError> {
            Err(DapiError::new(DapiError::CANCELED, "user canceled"))
        }

        async fn sign_message(&self, params: SignMessageParams) -> Result<DapiSignedMessage, DapiError> {
            Ok(DapiSignedMessage {
                public_key: "03ab".to_string(),
                data: "sig".to_string(),
                salt: "salt".to_string(),
                message: params.message,
            })
        }
    }

    struct MockCommon;

    #[async_trait]
    impl NeoLineCommon for MockCommon {
        async fn get_networks(&self) -> Result<DapiNetworks, DapiError> {
            Ok(DapiNetworks {
                networks: vec!["N3MainNet".to_string(), "N3TestNet".to_string()],
                default_network: "N3TestNet".to_string(),
                chain_id: Some(4),
            })
        }
    }

    #[derive(Default)]
    struct MockHost {
        injected: AtomicBool,
        fail_remove: bool,
        n3: Arc<MockN3>,
        next_id: AtomicU64,
        listeners: Mutex<Vec<(NeoLineEvent, ListenerId, TransportListener)>>,
    }

    impl MockHost {
        fn injected(n3: MockN3) -> Arc<Self> {
            Arc::new(Self {
                injected: AtomicBool::new(true),
                n3: Arc::new(n3),
                ..Default::default()
            })
        }

        fn fire(&self, event: NeoLineEvent) {
            let snapshot: Vec<TransportListener> = self
                .listeners
                .lock()
                .unwrap()
                .iter()
                .filter(|(e, _, _)| *e == event)
                .map(|(_, _, l)| l.clone())
                .collect();
            for listener in snapshot {
                listener();
            }
        }

        fn listener_count(&self) -> usize {
            self.listeners.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NeoLineHost for MockHost {
        fn is_injected(&self) -> bool {
            self.injected.load(Ordering::SeqCst)
        }

        async fn init_n3(&self) -> Result<Arc<dyn NeoLineN3>, DapiError> {
            Ok(self.n3.clone())
        }

        async fn init_common(&self) -> Result<Arc<dyn NeoLineCommon>, DapiError> {
            Ok(Arc::new(MockCommon))
        }

        fn add_event_listener(&self, event: NeoLineEvent, listener: TransportListener) -> ListenerId {
            let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.listeners.lock().unwrap().push((event, id, listener));
            id
        }

        fn remove_event_listener(&self, _event: NeoLineEvent, id: ListenerId) -> Result<(), DapiError> {
            if self.fail_remove {
                return Err(DapiError::new(DapiError::UNKNOWN_ERROR, "window gone"));
            }
            self.listeners.lock().unwrap().retain(|(_, i, _)| *i != id);
            Ok(())
        }
    }

    fn record(adapter: &dyn WalletAdapter) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        adapter.events().on(move |event| {
            let entry = match event {
                AdapterEvent::Error(e) => format!("error:{}", e.kind().name()),
                other => other.name().to_string(),
            };
            l.lock().unwrap().push(entry);
        });
        log
    }

    fn read_request() -> ContractReadInvocation {
        ContractReadInvocation::new("0xd2a4cff31913016155e38e474a2c06d08be276cf", "symbol")
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sets_address_and_listeners() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        let log = record(&adapter);

        adapter.connect().await.unwrap();

        assert_eq!(adapter.address().as_deref(), Some(ADDRESS));
        assert!(adapter.connected());
        assert!(!adapter.connecting());
        assert_eq!(host.listener_count(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["connect".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_asks_once() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());

        let (first, second) = tokio::join!(adapter.connect(), adapter.connect());
        first.unwrap();
        second.unwrap();

        assert_eq!(host.n3.account_calls.load(Ordering::SeqCst), 1);
        assert!(adapter.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_when_not_ready() {
        let host = Arc::new(MockHost::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        let log = record(&adapter);

        let err = adapter.connect().await.unwrap_err();

        assert!(err.is(WalletErrorKind::NotReady));
        assert_eq!(adapter.address(), None);
        assert!(!adapter.connecting());
        assert_eq!(*log.lock().unwrap(), vec!["error:WalletNotReadyError".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_account() {
        let host = MockHost::injected(MockN3 {
            reject_account: true,
            ..Default::default()
        });
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());

        let err = adapter.connect().await.unwrap_err();

        assert!(err.is(WalletErrorKind::Account));
        assert!(!adapter.connecting());
        assert_eq!(host.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_requires_connection() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());

        let err = adapter.invoke_read(&read_request()).await.unwrap_err();

        assert!(err.is(WalletErrorKind::NotConnected));
        assert_eq!(host.n3.read_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_results_follow_vm_state() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        adapter.connect().await.unwrap();

        *host.n3.state.lock().unwrap() = "HALT".to_string();
        let ok = adapter.invoke_read(&read_request()).await.unwrap();
        assert!(ok.is_success());

        *host.n3.state.lock().unwrap() = "FAULT".to_string();
        let faulted = adapter.invoke_read(&read_request()).await.unwrap();
        assert_eq!(faulted.status(), "error");
        assert_eq!(faulted.message(), Some("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_typed() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        adapter.connect().await.unwrap();
        let log = record(&adapter);

        let request = ContractReadInvocationMulti {
            invocations: vec![read_request()],
            signers: vec![],
        };
        let err = adapter.invoke_read_multi(&request).await.unwrap_err();

        assert!(err.is(WalletErrorKind::Invocation));
        assert_eq!(*log.lock().unwrap(), vec!["error:WalletInvocationError".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_and_networks() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        adapter.connect().await.unwrap();

        let mut request = ContractWriteInvocation::new(read_request());
        request.options.fee = Some("0.0001".to_string());
        let written = adapter.invoke(&request).await.unwrap();
        assert_eq!(written.data().map(|d| d.tx_id.as_str()), Some("0x7f"));

        let networks = adapter.get_networks().await.unwrap();
        assert_eq!(networks.data().map(|d| d.default_network.as_str()), Some("N3TestNet"));

        let signed = adapter
            .sign_message(&SignMessageInvocation {
                message: "hello".to_string(),
                version: None,
            })
            .await
            .unwrap();
        assert_eq!(signed.data().map(|d| d.message.as_str()), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_event_disconnects() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        adapter.connect().await.unwrap();
        let log = record(&adapter);

        host.fire(NeoLineEvent::AccountChanged);
        host.fire(NeoLineEvent::NetworkChanged);

        assert_eq!(adapter.address(), None);
        assert_eq!(host.listener_count(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["error:WalletDisconnectedError".to_string(), "disconnect".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_event_teardown_failure_still_disconnects() {
        let host = Arc::new(MockHost {
            injected: AtomicBool::new(true),
            fail_remove: true,
            ..Default::default()
        });
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        adapter.connect().await.unwrap();
        let log = record(&adapter);

        host.fire(NeoLineEvent::Disconnected);
        host.fire(NeoLineEvent::Disconnected);

        assert!(!adapter.connected());
        // Listeners the wallet refused to drop are left registered
        assert_eq!(host.listener_count(), 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["error:WalletDisconnectedError".to_string(), "disconnect".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_emits_once_even_on_teardown_failure() {
        let host = Arc::new(MockHost {
            injected: AtomicBool::new(true),
            fail_remove: true,
            ..Default::default()
        });
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        adapter.connect().await.unwrap();
        let log = record(&adapter);

        adapter.disconnect().await.unwrap();

        assert_eq!(adapter.address(), None);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["error:WalletDisconnectionError".to_string(), "disconnect".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_disconnect() {
        let host = MockHost::injected(MockN3::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());

        adapter.connect().await.unwrap();
        adapter.disconnect().await.unwrap();
        adapter.connect().await.unwrap();

        assert!(adapter.connected());
        assert_eq!(host.listener_count(), 3);
        assert_eq!(host.n3.account_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_event_after_injection() {
        let host = Arc::new(MockHost::default());
        let adapter = NeoLineWalletAdapter::new(host.clone(), PollConfig::default());
        let log = record(&adapter);
        assert!(!adapter.ready());

        host.injected.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(adapter.ready());
        assert_eq!(*log.lock().unwrap(), vec!["ready".to_string()]);
    }
}
