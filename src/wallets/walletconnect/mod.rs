//! WalletConnect Wallet Adapter
//!
//! Reaches wallets such as Neon over a WalletConnect relay. The adapter is
//! always ready; connecting negotiates (or restores) a session through a
//! [`SignClient`] and shows the pairing URI through a [`PairingPresenter`].
//!
//! Requests are JSON-RPC calls sent over the session topic tagged with the
//! configured chain id. Byte string arguments travel hex encoded.

pub mod client;
pub mod modal;
pub mod relay;

pub use client::{
    AppMetadata, ClientError, ClientEvent, ClientOptions, ConnectParams, FileSessionStore,
    MemorySessionStore, Reason, RpcRequest, Session, SessionStore, SignClient, SignClientBuilder,
    StoreError,
};
pub use modal::{PairingPresenter, TerminalPresenter};
pub use relay::{Base64JsonCodec, PayloadCodec, RelaySignClient, RelaySignClientBuilder};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dapi::{
    dapi_invocations, dapi_signers, DapiInvocation, DapiReadResult, DapiSignedMessage, DapiSigner,
    ScopeFormat,
};
use super::neo_dapi::NeoDapiFees;
use super::WalletName;
use crate::adapter::normalize::{arguments_to_hex, invalid_fee, FAULT_CODE};
use crate::adapter::types::*;
use crate::adapter::{AdapterCore, EnvironmentProbe, EventEmitter, PollConfig, WalletAdapter, WalletError};

/// Code of results whose relay request failed
pub const RELAY_ERROR_CODE: &str = "RELAY_ERROR";
/// Code of results refused because a byte string argument did not decode
pub const INVALID_ARGUMENT_CODE: &str = "INVALID_ARGUMENT";

// =============================================================================
// Configuration
// =============================================================================

fn default_relay_provider() -> String {
    "wss://relay.walletconnect.org".to_string()
}

fn default_logger() -> String {
    "error".to_string()
}

fn default_chain_id() -> String {
    "neo3:testnet".to_string()
}

fn default_methods() -> Vec<String> {
    ["testInvoke", "multiTestInvoke", "invokeFunction", "multiInvokeFunction", "signMessage"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_app_metadata() -> AppMetadata {
    AppMetadata {
        name: "neo-wallet-adapter".to_string(),
        description: "Neo N3 wallet adapter".to_string(),
        url: "https://github.com/".to_string(),
        icons: Vec::new(),
    }
}

/// Session negotiation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnectOptions {
    /// Chain requests are tagged with, e.g. `neo3:testnet`
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Existing pairing topic to propose over
    #[serde(default)]
    pub topic: Option<String>,
    /// Chains to request, `[chain_id]` when absent
    #[serde(default)]
    pub chains: Option<Vec<String>>,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default = "default_app_metadata")]
    pub app_metadata: AppMetadata,
}

impl Default for WalletConnectOptions {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            topic: None,
            chains: None,
            methods: default_methods(),
            app_metadata: default_app_metadata(),
        }
    }
}

impl WalletConnectOptions {
    pub fn requested_chains(&self) -> Vec<String> {
        self.chains.clone().unwrap_or_else(|| vec![self.chain_id.clone()])
    }
}

/// WalletConnect adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnectConfig {
    #[serde(default = "default_relay_provider")]
    pub relay_provider: String,
    #[serde(default = "default_logger")]
    pub logger: String,
    #[serde(default)]
    pub options: WalletConnectOptions,
    /// JSON file settled sessions are persisted to, in memory when absent
    #[serde(default)]
    pub session_file: Option<String>,
}

impl Default for WalletConnectConfig {
    fn default() -> Self {
        Self {
            relay_provider: default_relay_provider(),
            logger: default_logger(),
            options: WalletConnectOptions::default(),
            session_file: None,
        }
    }
}

impl WalletConnectConfig {
    fn client_options(&self) -> ClientOptions {
        let store: Arc<dyn SessionStore> = match &self.session_file {
            Some(path) => Arc::new(FileSessionStore::new(path)),
            None => Arc::new(MemorySessionStore::new()),
        };
        ClientOptions {
            relay_provider: self.relay_provider.clone(),
            logger: self.logger.clone(),
            store,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Parameters of every invocation method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WcInvocationParams {
    pub invocations: Vec<DapiInvocation>,
    pub signers: Vec<DapiSigner>,
    #[serde(flatten)]
    pub fees: NeoDapiFees,
}

impl WcInvocationParams {
    fn new(
        invocations: &[ContractReadInvocation],
        signers: &[Signer],
        fees: NeoDapiFees,
    ) -> Result<Self, crate::adapter::normalize::NormalizeError> {
        let mut invocations = dapi_invocations(invocations);
        for invocation in &mut invocations {
            invocation.args = arguments_to_hex(&invocation.args)?;
        }
        Ok(Self {
            invocations,
            signers: dapi_signers(signers, ScopeFormat::Bits),
            fees,
        })
    }
}

/// First account of a session, `<namespace>:<chain>:<address>`
fn session_address(session: &Session) -> Result<String, WalletError> {
    let account = session
        .accounts
        .first()
        .ok_or_else(|| WalletError::account().with_message("Session has no accounts"))?;
    match account.split(':').nth(2) {
        Some(address) if !address.is_empty() => Ok(address.to_string()),
        _ => Err(WalletError::account().with_message(format!("Malformed account: {}", account))),
    }
}

/// Error object a wallet embedded in an otherwise successful reply
fn embedded_error(value: &Value) -> Option<(String, String)> {
    let error = value.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Wallet returned an error")
        .to_string();
    let code = match error.get("code") {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Number(code)) => code.to_string(),
        _ => RELAY_ERROR_CODE.to_string(),
    };
    Some((message, code))
}

fn client_error_code(err: &ClientError) -> String {
    match err {
        ClientError::Rpc { code, .. } => code.to_string(),
        ClientError::Rejected(reason) => reason.code.to_string(),
        _ => RELAY_ERROR_CODE.to_string(),
    }
}

/// Normalize a relay reply into the shared result model
fn settle_reply<R, T>(
    reply: Result<Value, ClientError>,
    convert: impl FnOnce(R) -> InvocationResult<T>,
) -> InvocationResult<T>
where
    R: DeserializeOwned,
{
    let value = match reply {
        Ok(value) => value,
        Err(e) => {
            warn!("Relay request failed: {}", e);
            return InvocationResult::error(e.to_string(), client_error_code(&e));
        }
    };
    if let Some((message, code)) = embedded_error(&value) {
        return InvocationResult::error(message, code);
    }
    match serde_json::from_value::<R>(value) {
        Ok(reply) => convert(reply),
        Err(e) => InvocationResult::error(format!("Unexpected response: {}", e), RELAY_ERROR_CODE),
    }
}

/// Write reply, either a bare transaction id or an object carrying one
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum WcWriteReply {
    TxId(String),
    Object {
        #[serde(alias = "txId")]
        txid: Option<String>,
        #[serde(default)]
        state: Option<VmState>,
        #[serde(default)]
        exception: Option<String>,
    },
}

impl WcWriteReply {
    fn into_result(self) -> ContractWriteInvocationResult {
        match self {
            WcWriteReply::TxId(tx_id) => {
                InvocationResult::success(ContractWriteInvocationResultData { tx_id })
            }
            WcWriteReply::Object {
                state: Some(state),
                exception,
                ..
            } if state != VmState::Halt => InvocationResult::error(
                exception
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "execution faulted".to_string()),
                FAULT_CODE,
            ),
            WcWriteReply::Object {
                txid: Some(tx_id), ..
            } => InvocationResult::success(ContractWriteInvocationResultData { tx_id }),
            WcWriteReply::Object { exception, .. } => InvocationResult::error(
                exception
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "No transaction id in reply".to_string()),
                FAULT_CODE,
            ),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

struct Connection {
    client: Arc<dyn SignClient>,
    session: Session,
    /// Session deletion watcher
    watcher: JoinHandle<()>,
}

struct Inner {
    core: Arc<AdapterCore>,
    config: WalletConnectConfig,
    builder: Arc<dyn SignClientBuilder>,
    presenter: Arc<dyn PairingPresenter>,
    connection: Mutex<Option<Connection>>,
}

/// Resolves when the user dismisses the pairing prompt
async fn dismissed(slot: &mut Option<oneshot::Receiver<()>>) {
    if let Some(rx) = slot.as_mut() {
        if rx.await.is_ok() {
            return;
        }
        *slot = None;
    }
    std::future::pending::<()>().await
}

impl Inner {
    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn establish(self: &Arc<Self>) -> Result<(), WalletError> {
        let client = self
            .builder
            .init(&self.config.client_options())
            .await
            .map_err(|e| WalletError::connection().with_source(e))?;

        let deletions = client.subscribe();
        let restored = client.sessions().into_iter().find(|s| !s.is_expired());
        let session = match restored {
            Some(session) => {
                info!("Restoring WalletConnect session {}", session.topic);
                session
            }
            None => self.negotiate(&client).await?,
        };
        let address = session_address(&session)?;

        let watcher = self.watch(deletions, &session.topic);
        let previous = self.connection().replace(Connection {
            client,
            session,
            watcher,
        });
        if let Some(previous) = previous {
            previous.watcher.abort();
        }
        self.core.complete_connect(address);
        Ok(())
    }

    /// Negotiate a new session, presenting the pairing URI while it runs
    async fn negotiate(&self, client: &Arc<dyn SignClient>) -> Result<Session, WalletError> {
        let options = &self.config.options;
        let params = ConnectParams {
            metadata: options.app_metadata.clone(),
            pairing_topic: options.topic.clone(),
            chains: options.requested_chains(),
            methods: options.methods.clone(),
        };

        let mut events = client.subscribe();
        let mut events_open = true;
        let mut dismissal: Option<oneshot::Receiver<()>> = None;
        let connect = client.connect(params);
        tokio::pin!(connect);

        let outcome = loop {
            tokio::select! {
                result = &mut connect => {
                    break result.map_err(|e| WalletError::connection().with_source(e));
                }
                event = events.recv(), if events_open => match event {
                    Ok(ClientEvent::PairingProposal { uri }) => {
                        debug!("Presenting pairing URI");
                        dismissal = Some(self.presenter.open(&uri));
                    }
                    Ok(ClientEvent::PairingCreated { topic }) => {
                        debug!("Pairing {} created", topic);
                        self.presenter.paired();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} sign client events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                _ = dismissed(&mut dismissal) => {
                    info!("Pairing dismissed by the user");
                    break Err(WalletError::window_closed());
                }
            }
        };
        self.presenter.close();
        outcome
    }

    /// Watch `events` for deletion of `topic`, subscribed before the session settled
    fn watch(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ClientEvent>,
        topic: &str,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let topic = topic.to_string();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::SessionDeleted {
                        topic: deleted,
                        reason,
                    }) if deleted == topic => {
                        debug!("Session {} deleted: {}", deleted, reason.message);
                        if let Some(inner) = weak.upgrade() {
                            inner.on_session_deleted();
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} sign client events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn on_session_deleted(&self) {
        if self.connection().take().is_none() {
            return;
        }
        self.core.transport_disconnected();
    }

    /// Client and session topic of the live connection
    fn session(&self) -> Result<(Arc<dyn SignClient>, Session), WalletError> {
        self.core.require_connected()?;
        self.connection()
            .as_ref()
            .map(|c| (c.client.clone(), c.session.clone()))
            .ok_or_else(WalletError::not_connected)
    }

    async fn request<P: Serialize>(&self, method: &str, params: &P) -> Result<Value, ClientError> {
        let (client, session) = self
            .session()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        let params = serde_json::to_value(params).map_err(|e| ClientError::Protocol(e.to_string()))?;
        debug!("WalletConnect request: {}", method);
        client
            .request(
                &session.topic,
                &self.config.options.chain_id,
                RpcRequest {
                    method: method.to_string(),
                    params,
                },
            )
            .await
    }
}

/// Adapter for wallets reached over WalletConnect
pub struct WalletConnectWalletAdapter {
    inner: Arc<Inner>,
}

impl WalletConnectWalletAdapter {
    pub fn new(
        name: WalletName,
        config: WalletConnectConfig,
        builder: Arc<dyn SignClientBuilder>,
        presenter: Arc<dyn PairingPresenter>,
    ) -> Self {
        let probe: Arc<dyn EnvironmentProbe> = Arc::new(|| true);
        Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new(name, probe, PollConfig::default()),
                config,
                builder,
                presenter,
                connection: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &WalletConnectConfig {
        &self.inner.config
    }

    /// Topic of the live session
    pub fn session_topic(&self) -> Option<String> {
        self.inner.connection().as_ref().map(|c| c.session.topic.clone())
    }
}

#[async_trait]
impl WalletAdapter for WalletConnectWalletAdapter {
    fn name(&self) -> WalletName {
        self.inner.core.name()
    }

    fn address(&self) -> Option<String> {
        self.inner.core.address()
    }

    fn ready(&self) -> bool {
        true
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
        let connection = self.inner.connection().take();
        self.inner.core.clear();
        if let Some(connection) = connection {
            connection.watcher.abort();
            if let Err(e) = connection
                .client
                .disconnect(&connection.session.topic, Reason::user_disconnected())
                .await
            {
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
        self.inner.core.require_connected()?;
        let params = match WcInvocationParams::new(
            std::slice::from_ref(request),
            request.signers.as_deref().unwrap_or_default(),
            NeoDapiFees::default(),
        ) {
            Ok(params) => params,
            Err(e) => return Ok(InvocationResult::fail(e.to_string(), INVALID_ARGUMENT_CODE)),
        };
        let reply = self.inner.request("testInvoke", &params).await;
        Ok(settle_reply(reply, DapiReadResult::into_result))
    }

    async fn invoke_read_multi(
        &self,
        request: &ContractReadInvocationMulti,
    ) -> Result<ContractReadInvocationResult, WalletError> {
        self.inner.core.require_connected()?;
        let params = match WcInvocationParams::new(
            &request.invocations,
            &request.signers,
            NeoDapiFees::default(),
        ) {
            Ok(params) => params,
            Err(e) => return Ok(InvocationResult::fail(e.to_string(), INVALID_ARGUMENT_CODE)),
        };
        let reply = self.inner.request("multiTestInvoke", &params).await;
        Ok(settle_reply(reply, DapiReadResult::into_result))
    }

    async fn invoke(
        &self,
        request: &ContractWriteInvocation,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        self.inner.core.require_connected()?;
        let fees = match NeoDapiFees::from_options(&request.options) {
            Ok(fees) => fees,
            Err(e) => return Ok(invalid_fee(&e)),
        };
        let params = match WcInvocationParams::new(
            std::slice::from_ref(&request.invocation),
            request.invocation.signers.as_deref().unwrap_or_default(),
            fees,
        ) {
            Ok(params) => params,
            Err(e) => return Ok(InvocationResult::fail(e.to_string(), INVALID_ARGUMENT_CODE)),
        };
        let reply = self.inner.request("invokeFunction", &params).await;
        Ok(settle_reply(reply, WcWriteReply::into_result))
    }

    async fn invoke_multi(
        &self,
        request: &ContractWriteInvocationMulti,
    ) -> Result<ContractWriteInvocationResult, WalletError> {
        self.inner.core.require_connected()?;
        let fees = match NeoDapiFees::from_options(&request.options) {
            Ok(fees) => fees,
            Err(e) => return Ok(invalid_fee(&e)),
        };
        let params = match WcInvocationParams::new(&request.invocations, &request.signers, fees) {
            Ok(params) => params,
            Err(e) => return Ok(InvocationResult::fail(e.to_string(), INVALID_ARGUMENT_CODE)),
        };
        let reply = self.inner.request("multiInvokeFunction", &params).await;
        Ok(settle_reply(reply, WcWriteReply::into_result))
    }

    /// Networks the session permits, the configured chain first
    async fn get_networks(&self) -> Result<GetNetworksInvocationResult, WalletError> {
        let (_, session) = self.inner.session()?;
        let default_network = self.inner.config.options.chain_id.clone();
        let networks = if session.chains.is_empty() {
            self.inner.config.options.requested_chains()
        } else {
            session.chains
        };
        Ok(InvocationResult::success(GetNetworksResultData {
            networks,
            default_network,
        }))
    }

    async fn sign_message(
        &self,
        request: &SignMessageInvocation,
    ) -> Result<SignMessageInvocationResult, WalletError> {
        self.inner.core.require_connected()?;
        let reply = self.inner.request("signMessage", request).await;
        Ok(settle_reply(reply, DapiSignedMessage::into_result))
    }
}

impl Drop for WalletConnectWalletAdapter {
    fn drop(&mut self) {
        if let Some(connection) = self.inner.connection().take() {
            connection.watcher.abort();
        }
    }
}
