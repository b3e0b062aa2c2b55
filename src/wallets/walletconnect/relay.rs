//! WalletConnect Relay Client
//!
//! [`SignClient`] over a JSON-RPC WebSocket relay. The transport layer
//! speaks the relay's `waku_*` methods and correlates responses by id; the
//! sign client layer runs the pairing and session flow on top of it:
//!
//! - `wc_pairingApprove` answers a pairing URI
//! - `wc_sessionPropose` / `wc_sessionApprove` / `wc_sessionReject` settle a session
//! - `wc_sessionPayload` carries wallet requests
//! - `wc_sessionDelete` and `wc_sessionPing` manage a live session
//!
//! Payloads pass through a [`PayloadCodec`] before publishing.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::client::*;

/// Relay protocol named in pairing URIs
pub const RELAY_PROTOCOL: &str = "waku";
/// Seconds a published message is kept by the relay
pub const MESSAGE_TTL: u64 = 86_400;
/// Seconds a settled session lives without an explicit expiry
pub const SESSION_TTL: i64 = 7 * 86_400;

const JSONRPC_VERSION: &str = "2.0";
const METHOD_NOT_FOUND: i64 = -32601;

// =============================================================================
// JSON-RPC framing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Request, notification or response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonRpcFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Unique payload id, milliseconds with three random digits
pub fn payload_id() -> u64 {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    millis * 1000 + rand::thread_rng().gen_range(0..1000)
}

fn rpc_request(id: u64, method: &str, params: Value) -> Value {
    json!({"id": id, "jsonrpc": JSONRPC_VERSION, "method": method, "params": params})
}

fn rpc_result(id: u64, result: Value) -> Value {
    json!({"id": id, "jsonrpc": JSONRPC_VERSION, "result": result})
}

fn rpc_error(id: u64, code: i64, message: String) -> Value {
    json!({"id": id, "jsonrpc": JSONRPC_VERSION, "error": {"code": code, "message": message}})
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

// =============================================================================
// Pairing
// =============================================================================

/// Fresh 32 byte symmetric key
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    key
}

/// Pairing topic derived from its key
pub fn pairing_topic(sym_key: &[u8]) -> String {
    hex::encode(Sha256::digest(sym_key))
}

pub fn pairing_uri(topic: &str, sym_key: &[u8]) -> String {
    format!(
        "wc:{}@2?relay-protocol={}&symKey={}",
        topic,
        RELAY_PROTOCOL,
        hex::encode(sym_key)
    )
}

// =============================================================================
// Payload codec
// =============================================================================

/// Turns JSON-RPC payloads into relay messages and back
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, topic: &str, payload: &Value) -> Result<String, ClientError>;

    fn decode(&self, topic: &str, message: &str) -> Result<Value, ClientError>;
}

/// Base64 encoded JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64JsonCodec;

impl PayloadCodec for Base64JsonCodec {
    fn encode(&self, _topic: &str, payload: &Value) -> Result<String, ClientError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| ClientError::Protocol(e.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    fn decode(&self, topic: &str, message: &str) -> Result<Value, ClientError> {
        let bytes = STANDARD.decode(message).map_err(|e| {
            ClientError::Protocol(format!("Undecodable message on {}: {}", topic, e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Protocol(e.to_string()))
    }
}

// =============================================================================
// Relay transport
// =============================================================================

/// Relay connection settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub ping_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// How long to wait for the relay to acknowledge a call
    pub request_timeout: Duration,
    /// Log every frame
    pub log_frames: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            request_timeout: Duration::from_secs(10),
            log_frames: false,
        }
    }
}

/// Message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub topic: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionData {
    topic: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    data: SubscriptionData,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ClientError>>>>>;
type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fail_pending(pending: &PendingMap, reason: &str) {
    for (_, sender) in lock(pending).drain() {
        let _ = sender.send(Err(ClientError::Transport(reason.to_string())));
    }
}

/// Route one frame from the relay
///
/// Subscription messages are forwarded and acknowledged, responses resolve
/// their pending call. Returns the acknowledgement to send back.
fn route_frame(
    text: &str,
    pending: &PendingMap,
    messages: &mpsc::UnboundedSender<RelayMessage>,
) -> Option<String> {
    let frame: JsonRpcFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Unparseable relay frame: {}", e);
            return None;
        }
    };
    match frame.method.as_deref() {
        Some("waku_subscription") => {
            let params = frame
                .params
                .and_then(|p| serde_json::from_value::<SubscriptionParams>(p).ok());
            let Some(params) = params else {
                warn!("Malformed subscription frame");
                return None;
            };
            let _ = messages.send(RelayMessage {
                topic: params.data.topic,
                message: params.data.message,
            });
            frame.id.map(|id| rpc_result(id, Value::Bool(true)).to_string())
        }
        Some(method) => {
            debug!("Ignoring relay request {}", method);
            None
        }
        None => {
            let id = frame.id?;
            let sender = lock(pending).remove(&id)?;
            let result = match frame.error {
                Some(e) => Err(ClientError::Rpc {
                    code: e.code,
                    message: e.message,
                }),
                None => Ok(frame.result.unwrap_or(Value::Null)),
            };
            let _ = sender.send(result);
            None
        }
    }
}

/// Handle to the relay socket task
#[derive(Clone)]
pub struct RelayTransport {
    outgoing: mpsc::Sender<String>,
    pending: PendingMap,
    topics: Arc<Mutex<HashSet<String>>>,
    request_timeout: Duration,
}

impl RelayTransport {
    fn from_parts(
        outgoing: mpsc::Sender<String>,
        pending: PendingMap,
        topics: Arc<Mutex<HashSet<String>>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            outgoing,
            pending,
            topics,
            request_timeout,
        }
    }

    /// Open the relay socket and spawn its task
    ///
    /// The first connection must succeed; later drops reconnect and
    /// re-subscribe every topic.
    pub async fn connect(
        config: RelayConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RelayMessage>), ClientError> {
        let (ws_stream, _response) = connect_async(config.url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        info!("Relay connected to {}", config.url);

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(100);
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let topics = Arc::new(Mutex::new(HashSet::new()));

        let transport = Self::from_parts(
            outgoing_tx,
            pending.clone(),
            topics.clone(),
            config.request_timeout,
        );
        tokio::spawn(run_socket(
            config,
            ws_stream,
            outgoing_rx,
            pending,
            topics,
            messages_tx,
        ));
        Ok((transport, messages_rx))
    }

    /// Call a relay method and wait for its acknowledgement
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = payload_id();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let frame = rpc_request(id, method, params).to_string();
        if self.outgoing.send(frame).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(ClientError::Transport("relay socket closed".to_string()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Transport("relay socket closed".to_string())),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(ClientError::Timeout(method.to_string()))
            }
        }
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.call("waku_subscribe", json!({"topic": topic})).await?;
        lock(&self.topics).insert(topic.to_string());
        debug!("Subscribed to {}", topic);
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        lock(&self.topics).remove(topic);
        self.call("waku_unsubscribe", json!({"topic": topic})).await?;
        Ok(())
    }

    pub async fn publish(&self, topic: &str, message: String) -> Result<(), ClientError> {
        self.call(
            "waku_publish",
            json!({"topic": topic, "message": message, "ttl": MESSAGE_TTL}),
        )
        .await?;
        Ok(())
    }
}

async fn run_socket(
    config: RelayConfig,
    first: WsStream,
    mut outgoing_rx: mpsc::Receiver<String>,
    pending: PendingMap,
    topics: Arc<Mutex<HashSet<String>>>,
    messages: mpsc::UnboundedSender<RelayMessage>,
) {
    let mut socket = Some(first);
    let mut reconnect_attempts = 0;

    loop {
        let ws_stream = match socket.take() {
            Some(ws_stream) => ws_stream,
            None => match connect_async(config.url.as_str()).await {
                Ok((ws_stream, _response)) => {
                    reconnect_attempts = 0;
                    info!("Relay reconnected to {}", config.url);
                    ws_stream
                }
                Err(e) => {
                    error!("Relay connection failed: {}", e);
                    reconnect_attempts += 1;
                    if reconnect_attempts >= config.max_reconnect_attempts {
                        error!("Max relay reconnection attempts reached, giving up");
                        break;
                    }
                    tokio::time::sleep(config.reconnect_delay).await;
                    continue;
                }
            },
        };

        let (mut write, mut read) = ws_stream.split();

        let resubscribe: Vec<String> = lock(&topics)
            .iter()
            .map(|topic| rpc_request(payload_id(), "waku_subscribe", json!({"topic": topic})).to_string())
            .collect();
        for frame in resubscribe {
            if write.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }

        let mut ping = tokio::time::interval(config.ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                msg = outgoing_rx.recv() => match msg {
                    Some(text) => {
                        if config.log_frames {
                            debug!("Sending relay frame: {}", preview(&text));
                        }
                        if write.send(Message::Text(text)).await.is_err() {
                            error!("Failed to send relay frame");
                            break;
                        }
                    }
                    None => {
                        debug!("Relay transport dropped, closing socket");
                        let _ = write.send(Message::Close(None)).await;
                        fail_pending(&pending, "relay transport dropped");
                        return;
                    }
                },

                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if config.log_frames {
                            debug!("Received relay frame: {}", preview(&text));
                        }
                        if let Some(ack) = route_frame(&text, &pending, &messages) {
                            if write.send(Message::Text(ack)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay closed the socket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Relay socket error: {}", e);
                        break;
                    }
                },

                _ = ping.tick() => {
                    if write.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
            }
        }

        fail_pending(&pending, "relay connection lost");
        reconnect_attempts += 1;
        if reconnect_attempts >= config.max_reconnect_attempts {
            error!("Max relay reconnection attempts reached, giving up");
            break;
        }
        warn!(
            "Reconnecting to relay in {:?} (attempt {}/{})",
            config.reconnect_delay, reconnect_attempts, config.max_reconnect_attempts
        );
        tokio::time::sleep(config.reconnect_delay).await;
    }

    fail_pending(&pending, "relay unavailable");
}

// =============================================================================
// Sign client
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct Responder {
    #[serde(default)]
    metadata: Option<AppMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalState {
    #[serde(default)]
    accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SessionApproval {
    #[serde(default)]
    responder: Responder,
    #[serde(default)]
    state: ApprovalState,
    #[serde(default)]
    expiry: Option<i64>,
}

#[derive(Default)]
struct ClientState {
    sessions: HashMap<String, Session>,
    /// Proposals keyed by the topic their answer arrives on
    waiters: HashMap<String, oneshot::Sender<JsonRpcFrame>>,
    /// Session requests keyed by payload id
    responses: HashMap<u64, oneshot::Sender<Result<Value, ClientError>>>,
}

struct Shared {
    transport: RelayTransport,
    codec: Arc<dyn PayloadCodec>,
    store: Arc<dyn SessionStore>,
    state: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        lock(&self.state)
    }

    async fn send(&self, topic: &str, payload: &Value) -> Result<(), ClientError> {
        let message = self.codec.encode(topic, payload)?;
        self.transport.publish(topic, message).await
    }

    fn persist(&self) {
        let sessions: Vec<Session> = self.state().sessions.values().cloned().collect();
        if let Err(e) = self.store.save(&sessions) {
            warn!("Failed to persist sessions: {}", e);
        }
    }

    async fn handle(&self, message: RelayMessage) {
        let payload = match self.codec.decode(&message.topic, &message.message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        let frame: JsonRpcFrame = match serde_json::from_value(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Malformed wallet payload on {}: {}", message.topic, e);
                return;
            }
        };
        let deleted = frame.method.as_deref() == Some("wc_sessionDelete");

        if let Some(reply) = self.route(&message.topic, frame) {
            if let Err(e) = self.send(&message.topic, &reply).await {
                warn!("Failed to answer wallet on {}: {}", message.topic, e);
            }
        }
        if deleted {
            if let Err(e) = self.transport.unsubscribe(&message.topic).await {
                debug!("Failed to unsubscribe {}: {}", message.topic, e);
            }
        }
    }

    /// Apply a wallet payload, returning the reply to publish
    fn route(&self, topic: &str, frame: JsonRpcFrame) -> Option<Value> {
        match frame.method.as_deref() {
            Some("wc_pairingApprove") | Some("wc_sessionApprove") | Some("wc_sessionReject") => {
                let id = frame.id;
                let waiter = self.state().waiters.remove(topic);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(frame);
                    }
                    None => debug!("No proposal waiting on {}", topic),
                }
                id.map(|id| rpc_result(id, Value::Bool(true)))
            }
            Some("wc_sessionDelete") => {
                let reason = frame
                    .params
                    .as_ref()
                    .and_then(|p| p.get("reason"))
                    .and_then(|r| serde_json::from_value::<Reason>(r.clone()).ok())
                    .unwrap_or_else(Reason::user_disconnected);
                let removed = self.state().sessions.remove(topic).is_some();
                if removed {
                    self.persist();
                    info!("Wallet deleted session {}: {}", topic, reason.message);
                    let _ = self.events.send(ClientEvent::SessionDeleted {
                        topic: topic.to_string(),
                        reason,
                    });
                }
                frame.id.map(|id| rpc_result(id, Value::Bool(true)))
            }
            Some("wc_sessionPing") | Some("wc_pairingPing") => {
                frame.id.map(|id| rpc_result(id, Value::Bool(true)))
            }
            Some(method) => {
                warn!("Unsupported wallet method {}", method);
                frame.id.map(|id| {
                    rpc_error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
                })
            }
            None => {
                let id = frame.id?;
                let sender = self.state().responses.remove(&id)?;
                let result = match frame.error {
                    Some(e) => Err(ClientError::Rpc {
                        code: e.code,
                        message: e.message,
                    }),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                let _ = sender.send(result);
                None
            }
        }
    }
}

/// Answer to a proposal, unregistered on drop
struct Waiter<'a> {
    shared: &'a Shared,
    topic: String,
    rx: oneshot::Receiver<JsonRpcFrame>,
}

impl<'a> Waiter<'a> {
    fn register(shared: &'a Shared, topic: &str) -> Self {
        let (tx, rx) = oneshot::channel();
        shared.state().waiters.insert(topic.to_string(), tx);
        Self {
            shared,
            topic: topic.to_string(),
            rx,
        }
    }

    async fn wait(mut self) -> Result<JsonRpcFrame, ClientError> {
        (&mut self.rx)
            .await
            .map_err(|_| ClientError::Transport("sign client closed".to_string()))
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.shared.state().waiters.remove(&self.topic);
    }
}

/// Outstanding session request, unregistered on drop
struct PendingResponse<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingResponse<'_> {
    fn drop(&mut self) {
        self.shared.state().responses.remove(&self.id);
    }
}

/// Sign client speaking to a WalletConnect relay
pub struct RelaySignClient {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl RelaySignClient {
    /// Connect to the relay and restore persisted sessions
    pub async fn connect(
        options: &ClientOptions,
        codec: Arc<dyn PayloadCodec>,
        relay: RelayConfig,
    ) -> Result<Self, ClientError> {
        let config = RelayConfig {
            url: options.relay_provider.clone(),
            log_frames: matches!(options.logger.as_str(), "debug" | "trace"),
            ..relay
        };
        let (transport, messages) = RelayTransport::connect(config).await?;
        Self::start(transport, messages, codec, options.store.clone()).await
    }

    async fn start(
        transport: RelayTransport,
        mut messages: mpsc::UnboundedReceiver<RelayMessage>,
        codec: Arc<dyn PayloadCodec>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ClientError> {
        let restored: Vec<Session> = store
            .load()?
            .into_iter()
            .filter(|s| !s.is_expired())
            .collect();
        for session in &restored {
            transport.subscribe(&session.topic).await?;
        }
        if !restored.is_empty() {
            info!("Restored {} WalletConnect session(s)", restored.len());
        }

        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            transport,
            codec,
            store,
            state: Mutex::new(ClientState {
                sessions: restored.into_iter().map(|s| (s.topic.clone(), s)).collect(),
                ..Default::default()
            }),
            events,
        });

        let dispatcher = {
            let shared = shared.clone();
            tokio::spawn(async move {
                while let Some(message) = messages.recv().await {
                    shared.handle(message).await;
                }
                debug!("Relay message channel closed");
            })
        };

        Ok(Self { shared, dispatcher })
    }

    /// Create a pairing and wait for the wallet to approve it
    async fn pair(&self) -> Result<String, ClientError> {
        let sym_key = generate_key();
        let topic = pairing_topic(&sym_key);

        let approval = Waiter::register(&self.shared, &topic);
        self.shared.transport.subscribe(&topic).await?;
        let _ = self.shared.events.send(ClientEvent::PairingProposal {
            uri: pairing_uri(&topic, &sym_key),
        });

        let answer = approval.wait().await?;
        if answer.method.as_deref() != Some("wc_pairingApprove") {
            return Err(ClientError::Protocol(format!(
                "Unexpected pairing answer on {}",
                topic
            )));
        }
        info!("Pairing {} approved", topic);
        let _ = self.shared.events.send(ClientEvent::PairingCreated {
            topic: topic.clone(),
        });
        Ok(topic)
    }
}

impl Drop for RelaySignClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

#[async_trait]
impl SignClient for RelaySignClient {
    fn sessions(&self) -> Vec<Session> {
        self.shared
            .state()
            .sessions
            .values()
            .filter(|s| !s.is_expired())
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    async fn connect(&self, params: ConnectParams) -> Result<Session, ClientError> {
        let pairing = match params.pairing_topic.clone() {
            Some(topic) => topic,
            None => self.pair().await?,
        };

        let session_topic = hex::encode(generate_key());
        let approval = Waiter::register(&self.shared, &session_topic);
        self.shared.transport.subscribe(&session_topic).await?;

        let proposal = rpc_request(
            payload_id(),
            "wc_sessionPropose",
            json!({
                "topic": session_topic,
                "relay": {"protocol": RELAY_PROTOCOL},
                "proposer": {"metadata": params.metadata},
                "signal": {"method": "pairing", "params": {"topic": pairing}},
                "permissions": {
                    "blockchain": {"chains": params.chains},
                    "jsonrpc": {"methods": params.methods}
                },
                "ttl": SESSION_TTL,
            }),
        );
        self.shared.send(&pairing, &proposal).await?;
        debug!("Proposed session {} over {}", session_topic, pairing);

        let answer = approval.wait().await?;
        if answer.method.as_deref() != Some("wc_sessionApprove") {
            let reason = answer
                .params
                .as_ref()
                .and_then(|p| p.get("reason"))
                .and_then(|r| serde_json::from_value::<Reason>(r.clone()).ok())
                .unwrap_or(Reason {
                    code: 0,
                    message: "Session rejected".to_string(),
                });
            if let Err(e) = self.shared.transport.unsubscribe(&session_topic).await {
                debug!("Failed to unsubscribe {}: {}", session_topic, e);
            }
            return Err(ClientError::Rejected(reason));
        }

        let approved: SessionApproval = answer
            .params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ClientError::Protocol(e.to_string()))?
            .ok_or_else(|| ClientError::Protocol("Empty session approval".to_string()))?;

        let session = Session {
            topic: session_topic.clone(),
            accounts: approved.state.accounts,
            methods: params.methods,
            chains: params.chains,
            peer: approved.responder.metadata,
            expiry: approved
                .expiry
                .unwrap_or_else(|| Utc::now().timestamp() + SESSION_TTL),
        };
        self.shared
            .state()
            .sessions
            .insert(session_topic.clone(), session.clone());
        self.shared.persist();
        info!("Session {} settled", session_topic);
        let _ = self.shared.events.send(ClientEvent::SessionCreated {
            topic: session_topic,
        });
        Ok(session)
    }

    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        request: RpcRequest,
    ) -> Result<Value, ClientError> {
        let known = self.shared.state().sessions.contains_key(topic);
        if !known {
            return Err(ClientError::UnknownTopic(topic.to_string()));
        }

        let id = payload_id();
        let (tx, rx) = oneshot::channel();
        self.shared.state().responses.insert(id, tx);
        let _pending = PendingResponse {
            shared: &self.shared,
            id,
        };

        let payload = rpc_request(
            id,
            "wc_sessionPayload",
            json!({
                "request": {"method": request.method, "params": request.params},
                "chainId": chain_id,
            }),
        );
        self.shared.send(topic, &payload).await?;
        debug!("Sent {} over {}", request.method, topic);

        rx.await
            .map_err(|_| ClientError::Transport("sign client closed".to_string()))?
    }

    async fn disconnect(&self, topic: &str, reason: Reason) -> Result<(), ClientError> {
        let removed = self.shared.state().sessions.remove(topic);
        if removed.is_none() {
            return Err(ClientError::UnknownTopic(topic.to_string()));
        }
        self.shared.persist();

        let payload = rpc_request(payload_id(), "wc_sessionDelete", json!({"reason": reason}));
        let sent = self.shared.send(topic, &payload).await;
        if let Err(e) = self.shared.transport.unsubscribe(topic).await {
            debug!("Failed to unsubscribe {}: {}", topic, e);
        }
        sent
    }
}

/// Builds [`RelaySignClient`]s
#[derive(Clone)]
pub struct RelaySignClientBuilder {
    codec: Arc<dyn PayloadCodec>,
    relay: RelayConfig,
}

impl Default for RelaySignClientBuilder {
    fn default() -> Self {
        Self {
            codec: Arc::new(Base64JsonCodec),
            relay: RelayConfig::default(),
        }
    }
}

impl RelaySignClientBuilder {
    pub fn new(codec: Arc<dyn PayloadCodec>, relay: RelayConfig) -> Self {
        Self { codec, relay }
    }
}

#[async_trait]
impl SignClientBuilder for RelaySignClientBuilder {
    async fn init(&self, options: &ClientOptions) -> Result<Arc<dyn SignClient>, ClientError> {
        let client = RelaySignClient::connect(options, self.codec.clone(), self.relay.clone()).await?;
        Ok(Arc::new(client))
    }
}
