//! NeoDapi Wallet Adapter
//!
//! Adapter for wallets that inject a standard Neo dAPI provider object:
//! OneGate (`window.OneGate`) and NeoLine Mobile (`window.NeoLineMobile`).
//! Requests go through [`NeoDapi`], a typed client over the provider's
//! `request` method.
//!
//! Reference: https://github.com/neo-ngd/neo-dapi-monorepo

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::dapi::*;
use super::WalletName;
use crate::adapter::normalize::{invalid_fee, optional_minimal_units};
use crate::adapter::types::*;
use crate::adapter::{
    AdapterCore, EnvironmentProbe, EventEmitter, PollConfig, WalletAdapter, WalletError,
    WalletErrorKind,
};

/// Provider events that end the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEvent {
    Disconnect,
    AccountChanged,
    NetworkChanged,
}

impl ProviderEvent {
    pub const WATCHED: [ProviderEvent; 3] = [
        ProviderEvent::Disconnect,
        ProviderEvent::AccountChanged,
        ProviderEvent::NetworkChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEvent::Disconnect => "disconnect",
            ProviderEvent::AccountChanged => "accountChanged",
            ProviderEvent::NetworkChanged => "networkChanged",
        }
    }
}

/// Injected Neo dAPI provider
#[async_trait]
pub trait NeoProvider: Send + Sync {
    /// Whether the provider global is present
    fn is_injected(&self) -> bool;

    /// Raw dAPI request
    async fn request(&self, method: &str, params: Value) -> Result<Value, DapiError>;

    fn on(&self, event: ProviderEvent, listener: TransportListener) -> ListenerId;

    fn remove_listener(&self, event: ProviderEvent, id: ListenerId) -> Result<(), DapiError>;
}

// =============================================================================
// Typed client
// =============================================================================

/// `invokeReadMulti` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoDapiReadMultiParams {
    pub invocations: Vec<DapiInvocation>,
    pub signers: Vec<DapiSigner>,
}

/// Fees in integer minimal units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoDapiFees {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_network_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_system_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_override: Option<bool>,
}

impl NeoDapiFees {
    /// Scale decimal GAS fees to minimal units
    pub fn from_options(
        options: &ContractWriteOptions,
    ) -> Result<Self, crate::adapter::normalize::NormalizeError> {
        Ok(Self {
            extra_network_fee: optional_minimal_units(options.fee.as_deref())?,
            extra_system_fee: optional_minimal_units(options.extra_system_fee.as_deref())?,
            broadcast_override: options.broadcast_override,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoDapiWriteParams {
    #[serde(flatten)]
    pub invocation: DapiInvocation,
    pub signers: Vec<DapiSigner>,
    #[serde(flatten)]
    pub fees: NeoDapiFees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoDapiWriteMultiParams {
    pub invocations: Vec<DapiInvocation>,
    pub signers: Vec<DapiSigner>,
    #[serde(flatten)]
    pub fees: NeoDapiFees,
}

/// Typed dAPI client over a [`NeoProvider`]
#[derive(Clone)]
pub struct NeoDapi {
    provider: Arc<dyn NeoProvider>,
}

impl NeoDapi {
    pub fn new(provider: Arc<dyn NeoProvider>) -> Self {
        Self { provider }
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, DapiError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| DapiError::new(DapiError::MALFORMED_INPUT, e.to_string()))?;
        debug!("dAPI request: {}", method);
        let response = self.provider.request(method, params).await?;
        serde_json::from_value(response).map_err(|e| {
            DapiError::new(
                DapiError::UNKNOWN_ERROR,
                format!("Unexpected {} response: {}", method, e),
            )
        })
    }

    pub async fn get_account(&self) -> Result<DapiAccount, DapiError> {
        self.call("getAccount", &Value::Null).await
    }

    pub async fn get_networks(&self) -> Result<DapiNetworks, DapiError> {
        self.call("getNetworks", &Value::Null).await
    }

    pub async fn invoke_read(&self, params: &ReadParams) -> Result<DapiReadResult, DapiError> {
        self.call("invokeRead", params).await
    }

    pub async fn invoke_read_multi(
        &self,
        params: &NeoDapiReadMultiParams,
    ) -> Result<DapiReadResult, DapiError> {
        self.call("invokeReadMulti", params).await
    }

    pub async fn invoke(&self, params: &NeoDapiWriteParams) -> Result<DapiWriteResult, DapiError> {
        self.call("invoke", params).await
    }

    pub async fn invoke_multi(
        &self,
        params: &NeoDapiWriteMultiParams,
    ) -> Result<DapiWriteResult, DapiError> {
        self.call("invokeMulti", params).await
    }
}

// =============================================================================
// Adapter
// =============================================================================

struct Inner {
    core: Arc<AdapterCore>,
    provider: Arc<dyn NeoProvider>,
    /// Client and listener registrations, present while connected
    session: Mutex<Option<(NeoDapi, Vec<(ProviderEvent, ListenerId)>)>>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Option<(NeoDapi, Vec<(ProviderEvent, ListenerId)>)>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn establish(self: &Arc<Self>) -> Result<(), WalletError> {
        self.core.require_ready()?;
        let dapi = NeoDapi::new(self.provider.clone());

        let account = dapi
            .get_account()
            .await
            .map_err(|e| e.into_wallet_error(WalletErrorKind::Account))?;
        if account.address.is_empty() {
            return Err(WalletError::account());
        }

        let registrations = ProviderEvent::WATCHED
            .iter()
            .map(|event| {
                let weak = Arc::downgrade(self);
                let listener: TransportListener = Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_wallet_event();
                    }
                });
                (*event, self.provider.on(*event, listener))
            })
            .collect();
        *self.session() = Some((dapi, registrations));
        self.core.complete_connect(account.address);
        Ok(())
    }

    fn unwatch(&self, registrations: &[(ProviderEvent, ListenerId)]) -> Result<(), DapiError> {
        let mut first_error = None;
        for (event, id) in registrations {
            if let Err(e) = self.provider.remove_listener(*event, *id) {
                warn!("Failed to remove {} listener: {}", event.as_str(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn on_wallet_event(&self) {
        let Some((_, registrations)) = self.session().take() else {
            debug!("Ignoring {} event without a connection", self.core.name());
            return;
        };
        if let Err(e) = self.unwatch(&registrations) {
            warn!("Failed to tear down {} listeners: {}", self.core.name(), e);
        }
        self.core.transport_disconnected();
    }

    fn dapi(&self) -> Result<NeoDapi, WalletError> {
        self.core.require_connected()?;
        self.session()
            .as_ref()
            .map(|(dapi, _)| dapi.clone())
            .ok_or_else(WalletError::not_connected)
    }
}

/// Adapter for OneGate and NeoLine Mobile
///
/// Both speak the same dAPI; NeoLine Mobile expects signer scopes as names.
pub struct NeoDapiWalletAdapter {
    name: WalletName,
    scopes: ScopeFormat,
    inner: Arc<Inner>,
}

impl NeoDapiWalletAdapter {
    pub fn new(
        name: WalletName,
        scopes: ScopeFormat,
        provider: Arc<dyn NeoProvider>,
        poll: PollConfig,
    ) -> Self {
        let probe_provider = provider.clone();
        let probe: Arc<dyn EnvironmentProbe> = Arc::new(move || probe_provider.is_injected());
        Self {
            name,
            scopes,
            inner: Arc::new(Inner {
                core: AdapterCore::new(name, probe, poll),
                provider,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn onegate(provider: Arc<dyn NeoProvider>, poll: PollConfig) -> Self {
        Self::new(WalletName::OneGate, ScopeFormat::Bits, provider, poll)
    }

    pub fn neoline_mobile(provider: Arc<dyn NeoProvider>, poll: PollConfig) -> Self {
        Self::new(WalletName::NeoLineMobile, ScopeFormat::Names, provider, poll)
    }
}

#[async_trait]
impl WalletAdapter for NeoDapiWalletAdapter {
    fn name(&self) -> WalletName {
        self.name
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
        let session = self.inner.session().take();
        if let Some((_, registrations)) = session {
            if let Err(e) = self.inner.unwatch(&registrations) {
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
        let dapi = self.inner.dapi()?;
        let response = dapi.invoke_read(&ReadParams::new(request, self.scopes)).await;
        self.inner.core.report(settle(response, DapiReadResult::into_result))
    }

    async fn invoke_read_multi(
        &self,
        request: &ContractReadInvocationMulti,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let params = NeoDapiReadMultiParams {
            invocations: dapi_invocations(&request.invocations),
            signers: dapi_signers(&request.signers, self.scopes),
        };
        let response = dapi.invoke_read_multi(&params).await;
        self.inner.core.report(settle(response, DapiReadResult::into_result))
    }

    async fn invoke(
        &self,
        request: &ContractWriteInvocation,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let fees = match NeoDapiFees::from_options(&request.options) {
            Ok(fees) => fees,
            Err(e) => return Ok(invalid_fee(&e)),
        };
        let params = NeoDapiWriteParams {
            invocation: DapiInvocation::from(&request.invocation),
            signers: dapi_signers(
                request.invocation.signers.as_deref().unwrap_or_default(),
                self.scopes,
            ),
            fees,
        };
        let response = dapi.invoke(&params).await;
        self.inner.core.report(settle(response, DapiWriteResult::into_result))
    }

    async fn invoke_multi(
        &self,
        request: &ContractWriteInvocationMulti,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let fees = match NeoDapiFees::from_options(&request.options) {
            Ok(fees) => fees,
            Err(e) => return Ok(invalid_fee(&e)),
        };
        let params = NeoDapiWriteMultiParams {
            invocations: dapi_invocations(&request.invocations),
            signers: dapi_signers(&request.signers, self.scopes),
            fees,
        };
        let response = dapi.invoke_multi(&params).await;
        self.inner.core.report(settle(response, DapiWriteResult::into_result))
    }

    async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let response = dapi.get_networks().await;
        self.inner.core.report(settle(response, DapiNetworks::into_result))
    }

    /// The Neo dAPI has no message signing
    async fn sign_message(
        &self,
        _request: &SignMessageInvocation,
    ) -> Result<SignMessageInvocationResult, WalletError> {
        self.inner.core.require_connected()?;
        self.inner.core.report(Err(WalletError::method_not_supported()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct MockProvider {
        absent: AtomicBool,
        requests: Mutex<Vec<(String, Value)>>,
        next_id: AtomicU64,
        listeners: Mutex<Vec<(ProviderEvent, ListenerId, TransportListener)>>,
    }

    impl MockProvider {
        fn fire(&self, event: ProviderEvent) {
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

        fn last_request(&self) -> (String, Value) {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }

        fn methods(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }
    }

    #[async_trait]
    impl NeoProvider for MockProvider {
        fn is_injected(&self) -> bool {
            !self.absent.load(Ordering::SeqCst)
        }

        async fn request(&self, method: &str, params: Value) -> Result<Value, DapiError> {
            self.requests.lock().unwrap().push((method.to_string(), params));
            match method {
                "getAccount" => Ok(json!({"address": "NVg7LjGcUSrgxgjX3zEgqaksfMaiS8Z6e1", "publicKey": "03ab"})),
                "getNetworks" => Ok(json!({"networks": ["MainNet", "TestNet"], "defaultNetwork": "TestNet"})),
                "invokeRead" | "invokeReadMulti" => Ok(json!({
                    "script": "AA==",
                    "state": "HALT",
                    "gasConsumed": "0.0103",
                    "stack": [{"type": "Boolean", "value": true}]
                })),
                "invoke" | "invokeMulti" => Ok(json!({"txid": "0xfeed"})),
                _ => Err(DapiError::new(DapiError::UNKNOWN_ERROR, "unsupported")),
            }
        }

        fn on(&self, event: ProviderEvent, listener: TransportListener) -> ListenerId {
            let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.listeners.lock().unwrap().push((event, id, listener));
            id
        }

        fn remove_listener(&self, _event: ProviderEvent, id: ListenerId) -> Result<(), DapiError> {
            self.listeners.lock().unwrap().retain(|(_, i, _)| *i != id);
            Ok(())
        }
    }

    fn write_request(fee: &str) -> ContractWriteInvocation {
        let mut request = ContractWriteInvocation::new(
            ContractReadInvocation::new("0xd2a4cff31913016155e38e474a2c06d08be276cf", "transfer")
                .with_signers(vec![Signer::new(
                    "0x1f1d2b2a0b9e5fbc6a2a1b4d14f1b83d6c3d7b0c",
                    WitnessScope::CALLED_BY_ENTRY | WitnessScope::CUSTOM_GROUPS,
                )]),
        );
        request.options.fee = Some(fee.to_string());
        request.options.extra_system_fee = Some("1.5".to_string());
        request
    }

    #[tokio::test]
    async fn test_onegate_scales_fees() {
        let provider = Arc::new(MockProvider::default());
        let adapter = NeoDapiWalletAdapter::onegate(provider.clone(), PollConfig::default());
        adapter.connect().await.unwrap();

        let result = adapter.invoke(&write_request("0.0001")).await.unwrap();
        assert_eq!(result.data().map(|d| d.tx_id.as_str()), Some("0xfeed"));

        let (method, params) = provider.last_request();
        assert_eq!(method, "invoke");
        assert_eq!(params["extraNetworkFee"], "10000");
        assert_eq!(params["extraSystemFee"], "150000000");
        assert_eq!(params["signers"][0]["scopes"], json!(0x21));
        assert!(params.get("fee").is_none());
    }

    #[tokio::test]
    async fn test_neoline_mobile_names_scopes() {
        let provider = Arc::new(MockProvider::default());
        let adapter = NeoDapiWalletAdapter::neoline_mobile(provider.clone(), PollConfig::default());
        adapter.connect().await.unwrap();

        adapter.invoke(&write_request("0.5")).await.unwrap();

        let (_, params) = provider.last_request();
        assert_eq!(params["signers"][0]["scopes"], "CalledByEntry,CustomGroups");
    }

    #[tokio::test]
    async fn test_bad_fee_fails_without_request() {
        let provider = Arc::new(MockProvider::default());
        let adapter = NeoDapiWalletAdapter::onegate(provider.clone(), PollConfig::default());
        adapter.connect().await.unwrap();

        let result = adapter.invoke(&write_request("lots")).await.unwrap();

        assert_eq!(result.status(), "fail");
        assert_eq!(provider.methods(), vec!["getAccount".to_string()]);
    }

    #[tokio::test]
    async fn test_read_and_networks() {
        let provider = Arc::new(MockProvider::default());
        let adapter = NeoDapiWalletAdapter::onegate(provider.clone(), PollConfig::default());
        adapter.connect().await.unwrap();

        let read = adapter
            .invoke_read(&ContractReadInvocation::new("0x01", "verify"))
            .await
            .unwrap();
        assert_eq!(read.data().map(|d| d.gas_consumed.as_str()), Some("0.0103"));

        let networks = adapter.get_networks().await.unwrap();
        assert_eq!(networks.data().map(|d| d.networks.len()), Some(2));
    }

    #[tokio::test]
    async fn test_sign_message_not_supported() {
        let provider = Arc::new(MockProvider::default());
        let adapter = NeoDapiWalletAdapter::onegate(provider.clone(), PollConfig::default());
        let request = SignMessageInvocation {
            message: "hi".to_string(),
            version: None,
        };

        let before = adapter.sign_message(&request).await.unwrap_err();
        assert!(before.is(WalletErrorKind::NotConnected));

        adapter.connect().await.unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        adapter.events().on(move |event| {
            if let crate::adapter::AdapterEvent::Error(err) = event {
                e.lock().unwrap().push(err.kind());
            }
        });

        let after = adapter.sign_message(&request).await.unwrap_err();
        assert!(after.is(WalletErrorKind::MethodNotSupported));
        assert_eq!(*errors.lock().unwrap(), vec![WalletErrorKind::MethodNotSupported]);
    }

    #[tokio::test]
    async fn test_provider_events_disconnect() {
        let provider = Arc::new(MockProvider::default());
        let adapter = NeoDapiWalletAdapter::onegate(provider.clone(), PollConfig::default());
        adapter.connect().await.unwrap();
        assert_eq!(provider.listeners.lock().unwrap().len(), 3);

        provider.fire(ProviderEvent::NetworkChanged);

        assert!(!adapter.connected());
        assert!(provider.listeners.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_when_provider_missing() {
        let provider = Arc::new(MockProvider {
            absent: AtomicBool::new(true),
            ..Default::default()
        });
        let adapter = NeoDapiWalletAdapter::neoline_mobile(provider.clone(), PollConfig::default());

        let err = adapter.connect().await.unwrap_err();
        assert!(err.is(WalletErrorKind::NotReady));
        assert!(provider.methods().is_empty());
    }
}
