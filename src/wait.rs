//! Transaction Confirmation
//!
//! Polls a Neo JSON-RPC node until a transaction can be fetched, which means
//! it made it into a block.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::adapter::WalletError;

/// Node RPC errors
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// Source of confirmed transactions
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Verbose transaction by id, an error while the node does not know it
    async fn get_raw_transaction(&self, tx_id: &str) -> Result<Value, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Neo JSON-RPC client
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call a node method
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let resp = self.client.post(&self.url).json(&body).send().await?;

        if !resp.status().is_success() {
            let error = resp.text().await.unwrap_or_default();
            return Err(RpcError::InvalidResponse(error));
        }

        let data: RpcResponse = resp.json().await?;
        if let Some(error) = data.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        data.result
            .ok_or_else(|| RpcError::InvalidResponse(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl TransactionSource for RpcClient {
    async fn get_raw_transaction(&self, tx_id: &str) -> Result<Value, RpcError> {
        self.call("getrawtransaction", json!([tx_id, true])).await
    }
}

/// Polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub read_frequency: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            read_frequency: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Wait until `tx_id` is found, returning the transaction
///
/// Lookup failures are retried every `read_frequency`. Fails with a
/// `Timeout` error once `timeout` has elapsed.
pub async fn wait_tx(
    source: &dyn TransactionSource,
    tx_id: &str,
    options: WaitOptions,
) -> Result<Value, WalletError> {
    let start = Instant::now();
    loop {
        if start.elapsed() > options.timeout {
            return Err(WalletError::timeout().with_message(format!(
                "Transaction {} not found after {:?}",
                tx_id, options.timeout
            )));
        }

        match source.get_raw_transaction(tx_id).await {
            Ok(transaction) => return Ok(transaction),
            Err(e) => {
                debug!("Transaction {} not found yet: {}", tx_id, e);
                tokio::time::sleep(options.read_frequency).await;
            }
        }
    }
}
