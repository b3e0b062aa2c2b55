//! WalletConnect Sign Client
//!
//! The seam between the WalletConnect adapter and a relay client: session
//! types, the client trait, and session persistence.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Application metadata shown to the wallet during pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

/// Settled session with a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: String,
    /// Chain qualified accounts, `<namespace>:<chain>:<address>`
    pub accounts: Vec<String>,
    pub methods: Vec<String>,
    pub chains: Vec<String>,
    #[serde(default)]
    pub peer: Option<AppMetadata>,
    /// Unix seconds
    pub expiry: i64,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expiry <= Utc::now().timestamp()
    }
}

/// Session negotiation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub metadata: AppMetadata,
    /// Existing pairing to propose over instead of pairing anew
    pub pairing_topic: Option<String>,
    pub chains: Vec<String>,
    pub methods: Vec<String>,
}

/// JSON-RPC call forwarded to the wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
}

/// Reason attached to a session deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub code: u32,
    pub message: String,
}

impl Reason {
    pub const USER_DISCONNECTED: u32 = 6000;

    pub fn user_disconnected() -> Self {
        Self {
            code: Self::USER_DISCONNECTED,
            message: "User disconnected.".to_string(),
        }
    }
}

/// Notifications published by a sign client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A pairing URI is waiting to be shown to the user
    PairingProposal { uri: String },
    /// The wallet accepted the pairing
    PairingCreated { topic: String },
    /// A session was settled
    SessionCreated { topic: String },
    /// The wallet ended a session
    SessionDeleted { topic: String, reason: Reason },
}

/// Sign client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Relay transport error: {0}")]
    Transport(String),

    #[error("Relay timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Session rejected: {}", .0.message)]
    Rejected(Reason),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// Options passed to [`SignClientBuilder::init`]
#[derive(Clone)]
pub struct ClientOptions {
    /// Relay WebSocket URL
    pub relay_provider: String,
    /// Log level name of the client
    pub logger: String,
    pub store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("relay_provider", &self.relay_provider)
            .field("logger", &self.logger)
            .finish()
    }
}

/// Relay based sign client
#[async_trait]
pub trait SignClient: Send + Sync {
    /// Settled sessions, including ones restored from the store
    fn sessions(&self) -> Vec<Session>;

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;

    /// Negotiate a new session, pairing first when no pairing topic is given
    async fn connect(&self, params: ConnectParams) -> Result<Session, ClientError>;

    /// Forward a request to the wallet and wait for its answer
    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        request: RpcRequest,
    ) -> Result<Value, ClientError>;

    async fn disconnect(&self, topic: &str, reason: Reason) -> Result<(), ClientError>;
}

/// Factory for sign clients
#[async_trait]
pub trait SignClientBuilder: Send + Sync {
    async fn init(&self, options: &ClientOptions) -> Result<Arc<dyn SignClient>, ClientError>;
}

// =============================================================================
// Session persistence
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persistence for settled sessions
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Vec<Session>, StoreError>;

    fn save(&self, sessions: &[Session]) -> Result<(), StoreError>;
}

/// Sessions kept for the life of the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<Vec<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, sessions: &[Session]) -> Result<(), StoreError> {
        *self.sessions.lock().unwrap_or_else(PoisonError::into_inner) = sessions.to_vec();
        Ok(())
    }
}

/// Sessions persisted as a JSON file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Vec<Session>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, sessions: &[Session]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(sessions)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(topic: &str, expiry: i64) -> Session {
        Session {
            topic: topic.to_string(),
            accounts: vec!["neo3:testnet:NNLi44dJNXtDNSBkofB48aTVYtb1zZrNEs".to_string()],
            methods: vec!["invokeFunction".to_string()],
            chains: vec!["neo3:testnet".to_string()],
            peer: None,
            expiry,
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        assert!(store.load().unwrap().is_empty());
        store.save(&[session("a", 1)]).unwrap();
        assert_eq!(store.load().unwrap()[0].topic, "a");
    }

    #[test]
    fn test_file_store_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "neo-wallet-adapter-sessions-{}.json",
            std::process::id()
        ));
        let store = FileSessionStore::new(&path);
        assert!(store.load().unwrap().is_empty());

        store.save(&[session("b", 2)]).unwrap();
        let loaded = store.load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, vec![session("b", 2)]);
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now().timestamp();
        assert!(session("c", now - 1).is_expired());
        assert!(!session("c", now + 60).is_expired());
    }

    #[test]
    fn test_user_disconnected_reason() {
        let reason = Reason::user_disconnected();
        assert_eq!(reason.code, 6000);
    }
}
