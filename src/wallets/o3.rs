//! O3 Wallet Adapter
//!
//! Adapter for the O3 wallet, reached through the single `neo3Dapi` object
//! it injects.
//!
//! API Reference: https://neo3dapidocs.o3.network/

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

/// `neo3Dapi.Constants.EventName` values the adapter listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum O3Event {
    Disconnected,
    AccountChanged,
    NetworkChanged,
}

impl O3Event {
    pub const WATCHED: [O3Event; 3] = [
        O3Event::Disconnected,
        O3Event::AccountChanged,
        O3Event::NetworkChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            O3Event::Disconnected => "DISCONNECTED",
            O3Event::AccountChanged => "ACCOUNT_CHANGED",
            O3Event::NetworkChanged => "NETWORK_CHANGED",
        }
    }
}

/// The `neo3Dapi` object
#[async_trait]
pub trait O3Dapi: Send + Sync {
    fn is_injected(&self) -> bool;

    async fn get_account(&self) -> Result<DapiAccount, DapiError>;

    async fn invoke_read(&self, params: ReadParams) -> Result<DapiReadResult, DapiError>;

    async fn invoke_read_multi(&self, params: ReadMultiParams) -> Result<DapiReadResult, DapiError>;

    async fn invoke(&self, params: WriteParams) -> Result<DapiWriteResult, DapiError>;

    async fn invoke_multi(&self, params: WriteMultiParams) -> Result<DapiWriteResult, DapiError>;

    async fn get_networks(&self) -> Result<DapiNetworks, DapiError>;

    async fn sign_message(&self, params: SignMessageParams) -> Result<DapiSignedMessage, DapiError>;

    fn add_event_listener(&self, event: O3Event, listener: TransportListener) -> ListenerId;

    fn remove_event_listener(&self, event: O3Event, id: ListenerId) -> Result<(), DapiError>;
}

struct Inner {
    core: Arc<AdapterCore>,
    dapi: Arc<dyn O3Dapi>,
    /// Listener registrations, present while connected
    listeners: Mutex<Option<Vec<(O3Event, ListenerId)>>>,
}

impl Inner {
    fn listeners(&self) -> MutexGuard<'_, Option<Vec<(O3Event, ListenerId)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn establish(self: &Arc<Self>) -> Result<(), WalletError> {
        self.core.require_ready()?;

        let account = self
            .dapi
            .get_account()
            .await
            .map_err(|e| e.into_wallet_error(WalletErrorKind::Account))?;
        if account.address.is_empty() {
            return Err(WalletError::account());
        }

        let registrations = O3Event::WATCHED
            .iter()
            .map(|event| {
                let weak = Arc::downgrade(self);
                let listener: TransportListener = Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_wallet_event();
                    }
                });
                (*event, self.dapi.add_event_listener(*event, listener))
            })
            .collect();
        *self.listeners() = Some(registrations);
        self.core.complete_connect(account.address);
        Ok(())
    }

    fn unwatch(&self, registrations: &[(O3Event, ListenerId)]) -> Result<(), DapiError> {
        let mut first_error = None;
        for (event, id) in registrations {
            if let Err(e) = self.dapi.remove_event_listener(*event, *id) {
                warn!("Failed to remove O3 {} listener: {}", event.as_str(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn on_wallet_event(&self) {
        let Some(registrations) = self.listeners().take() else {
            debug!("Ignoring O3 event without a connection");
            return;
        };
        if let Err(e) = self.unwatch(&registrations) {
            warn!("Failed to tear down O3 listeners: {}", e);
        }
        self.core.transport_disconnected();
    }

    fn dapi(&self) -> Result<Arc<dyn O3Dapi>, WalletError> {
        self.core.require_connected()?;
        Ok(self.dapi.clone())
    }
}

/// O3 wallet adapter
pub struct O3WalletAdapter {
    inner: Arc<Inner>,
}

impl O3WalletAdapter {
    pub fn new(dapi: Arc<dyn O3Dapi>) -> Self {
        Self::with_poll(dapi, PollConfig::default())
    }

    pub fn with_poll(dapi: Arc<dyn O3Dapi>, poll: PollConfig) -> Self {
        let probe_dapi = dapi.clone();
        let probe: Arc<dyn EnvironmentProbe> = Arc::new(move || probe_dapi.is_injected());
        Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new(WalletName::O3, probe, poll),
                dapi,
                listeners: Mutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl WalletAdapter for O3WalletAdapter {
    fn name(&self) -> WalletName {
        WalletName::O3
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
        let registrations = self.inner.listeners().take();
        if let Some(registrations) = registrations {
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
        let response = dapi.invoke_read(ReadParams::new(request, ScopeFormat::Bits)).await;
        self.inner.core.report(settle(response, DapiReadResult::into_result))
    }

    async fn invoke_read_multi(
        &self,
        request: &ContractReadInvocationMulti,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let response = dapi
            .invoke_read_multi(ReadMultiParams::new(request, ScopeFormat::Bits))
            .await;
        self.inner.core.report(settle(response, DapiReadResult::into_result))
    }

    async fn invoke(
        &self,
        request: &ContractWriteInvocation,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let response = dapi.invoke(WriteParams::new(request, ScopeFormat::Bits)).await;
        self.inner.core.report(settle(response, DapiWriteResult::into_result))
    }

    async fn invoke_multi(
        &self,
        request: &ContractWriteInvocationMulti,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let response = dapi
            .invoke_multi(WriteMultiParams::new(request, ScopeFormat::Bits))
            .await;
        self.inner.core.report(settle(response, DapiWriteResult::into_result))
    }

    async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let response = dapi.get_networks().await;
        self.inner.core.report(settle(response, DapiNetworks::into_result))
    }

    async fn sign_message(
        &self,
        request: &SignMessageInvocation,
    ) -> Result<SignMessageInvocationResult, WalletError> {
        let dapi = self.inner.dapi()?;
        let params = SignMessageParams {
            message: request.message.clone(),
        };
        let response = dapi.sign_message(params).await;
        self.inner.core.report(settle(response, DapiSignedMessage::into_result))
    }
}
