//! Injected dAPI Types
//!
//! Wire types shared by the wallets that expose an injected dAPI object
//! (NeoLine, O3, OneGate, NeoLine Mobile) and their conversion into the
//! common result model.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapter::normalize::ExecutionOutcome;
use crate::adapter::types::*;
use crate::adapter::{WalletError, WalletErrorKind};

/// Error object thrown by an injected dAPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {description}")]
pub struct DapiError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

impl DapiError {
    pub const NO_PROVIDER: &'static str = "NO_PROVIDER";
    pub const CONNECTION_DENIED: &'static str = "CONNECTION_DENIED";
    pub const CANCELED: &'static str = "CANCELED";
    pub const RPC_ERROR: &'static str = "RPC_ERROR";
    pub const MALFORMED_INPUT: &'static str = "MALFORMED_INPUT";
    pub const UNKNOWN_ERROR: &'static str = "UNKNOWN_ERROR";

    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
        }
    }

    /// Wrap into a typed wallet error
    ///
    /// A missing provider always maps to `NotInstalled`; everything else
    /// takes the kind of the step that failed.
    pub fn into_wallet_error(self, step: WalletErrorKind) -> WalletError {
        let kind = if self.kind == Self::NO_PROVIDER {
            WalletErrorKind::NotInstalled
        } else {
            step
        };
        WalletError::new(kind).with_source(self)
    }
}

/// Callback registered on a transport event
pub type TransportListener = Arc<dyn Fn() + Send + Sync>;

/// Registration returned by a transport when a listener is added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

// =============================================================================
// Requests
// =============================================================================

/// Scope encoding expected by a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFormat {
    /// Numeric bit mask
    Bits,
    /// Comma-joined flag names
    Names,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DapiScopes {
    Bits(u8),
    Names(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapiSigner {
    pub account: String,
    pub scopes: DapiScopes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_contracts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_groups: Option<Vec<String>>,
}

impl DapiSigner {
    pub fn from_signer(signer: &Signer, format: ScopeFormat) -> Self {
        let scopes = match format {
            ScopeFormat::Bits => DapiScopes::Bits(signer.scopes.bits()),
            ScopeFormat::Names => DapiScopes::Names(signer.scopes.to_names_string()),
        };
        Self {
            account: signer.account.clone(),
            scopes,
            allowed_contracts: signer.allowed_contracts.clone(),
            allowed_groups: signer.allowed_groups.clone(),
        }
    }
}

pub fn dapi_signers(signers: &[Signer], format: ScopeFormat) -> Vec<DapiSigner> {
    signers.iter().map(|s| DapiSigner::from_signer(s, format)).collect()
}

/// Single contract call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapiInvocation {
    pub script_hash: String,
    pub operation: String,
    pub args: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_on_fail: Option<bool>,
}

impl From<&ContractReadInvocation> for DapiInvocation {
    fn from(invocation: &ContractReadInvocation) -> Self {
        Self {
            script_hash: invocation.script_hash.clone(),
            operation: invocation.operation.clone(),
            args: invocation.args.clone(),
            abort_on_fail: invocation.abort_on_fail,
        }
    }
}

pub fn dapi_invocations(invocations: &[ContractReadInvocation]) -> Vec<DapiInvocation> {
    invocations.iter().map(DapiInvocation::from).collect()
}

/// `invokeRead` parameters of the NeoLine and O3 dAPIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    #[serde(flatten)]
    pub invocation: DapiInvocation,
    pub signers: Vec<DapiSigner>,
}

impl ReadParams {
    pub fn new(request: &ContractReadInvocation, format: ScopeFormat) -> Self {
        Self {
            invocation: DapiInvocation::from(request),
            signers: dapi_signers(request.signers.as_deref().unwrap_or_default(), format),
        }
    }
}

/// `invokeReadMulti` parameters of the NeoLine and O3 dAPIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMultiParams {
    pub invoke_read_args: Vec<DapiInvocation>,
    pub signers: Vec<DapiSigner>,
}

impl ReadMultiParams {
    pub fn new(request: &ContractReadInvocationMulti, format: ScopeFormat) -> Self {
        Self {
            invoke_read_args: dapi_invocations(&request.invocations),
            signers: dapi_signers(&request.signers, format),
        }
    }
}

/// `invoke` parameters of the NeoLine and O3 dAPIs, fees in decimal GAS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteParams {
    #[serde(flatten)]
    pub invocation: DapiInvocation,
    pub signers: Vec<DapiSigner>,
    #[serde(flatten)]
    pub options: ContractWriteOptions,
}

impl WriteParams {
    pub fn new(request: &ContractWriteInvocation, format: ScopeFormat) -> Self {
        Self {
            invocation: DapiInvocation::from(&request.invocation),
            signers: dapi_signers(
                request.invocation.signers.as_deref().unwrap_or_default(),
                format,
            ),
            options: request.options.clone(),
        }
    }
}

/// Multi-call `invoke` parameters of the NeoLine and O3 dAPIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteMultiParams {
    pub invoke_args: Vec<DapiInvocation>,
    pub signers: Vec<DapiSigner>,
    #[serde(flatten)]
    pub options: ContractWriteOptions,
}

impl WriteMultiParams {
    pub fn new(request: &ContractWriteInvocationMulti, format: ScopeFormat) -> Self {
        Self {
            invoke_args: dapi_invocations(&request.invocations),
            signers: dapi_signers(&request.signers, format),
            options: request.options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignMessageParams {
    pub message: String,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapiAccount {
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Test invoke response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DapiReadResult {
    pub script: String,
    pub state: VmState,
    #[serde(alias = "gasConsumed", alias = "gasconsumed")]
    pub gas_consumed: String,
    #[serde(default)]
    pub stack: Vec<StackItem>,
    #[serde(default)]
    pub exception: Option<String>,
}

impl DapiReadResult {
    pub fn into_result(self) -> ContractReadInvocationResult {
        ExecutionOutcome {
            script: self.script,
            state: self.state,
            gas_consumed: self.gas_consumed,
            stack: self.stack,
            exception: self.exception,
            tx: None,
        }
        .into_result()
    }
}

/// Signed transaction response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapiWriteResult {
    #[serde(alias = "txId")]
    pub txid: String,
    #[serde(default, rename = "nodeURL")]
    pub node_url: Option<String>,
    #[serde(default)]
    pub signed_tx: Option<String>,
}

impl DapiWriteResult {
    pub fn into_result(self) -> ContractWriteInvocationResult {
        InvocationResult::success(ContractWriteInvocationResultData { tx_id: self.txid })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapiNetworks {
    pub networks: Vec<String>,
    pub default_network: String,
    #[serde(default)]
    pub chain_id: Option<u32>,
}

impl DapiNetworks {
    pub fn into_result(self) -> GetNetworksInvocationResult {
        InvocationResult::success(GetNetworksResultData {
            networks: self.networks,
            default_network: self.default_network,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapiSignedMessage {
    pub public_key: String,
    pub data: String,
    pub salt: String,
    #[serde(alias = "messageHex")]
    pub message: String,
}

impl DapiSignedMessage {
    pub fn into_result(self) -> SignMessageInvocationResult {
        InvocationResult::success(SignMessageResultData {
            public_key: self.public_key,
            data: self.data,
            salt: self.salt,
            message: self.message,
        })
    }
}

/// Map a transport call onto the result model, typing its failure
pub fn settle<T, R>(
    response: Result<T, DapiError>,
    convert: impl FnOnce(T) -> R,
) -> Result<R, WalletError> {
    response
        .map(convert)
        .map_err(|e| e.into_wallet_error(WalletErrorKind::Invocation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signer_scope_formats() {
        let signer = Signer::new("0x01", WitnessScope::CALLED_BY_ENTRY | WitnessScope::CUSTOM_CONTRACTS);
        let bits = serde_json::to_value(DapiSigner::from_signer(&signer, ScopeFormat::Bits)).unwrap();
        let names = serde_json::to_value(DapiSigner::from_signer(&signer, ScopeFormat::Names)).unwrap();
        assert_eq!(bits["scopes"], json!(17));
        assert_eq!(names["scopes"], json!("CalledByEntry,CustomContracts"));
    }

    #[test]
    fn test_write_params_wire_format() {
        let mut request = ContractWriteInvocation::new(
            ContractReadInvocation::new("0xef4073a0f2b305a38ec4050e4d3d28bc40ea63f5", "transfer")
                .with_args(vec![Argument::hash160("0x01"), Argument::integer(1)]),
        );
        request.options.extra_system_fee = Some("0.5".to_string());
        let value = serde_json::to_value(WriteParams::new(&request, ScopeFormat::Bits)).unwrap();
        assert_eq!(value["scriptHash"], "0xef4073a0f2b305a38ec4050e4d3d28bc40ea63f5");
        assert_eq!(value["extraSystemFee"], "0.5");
        assert_eq!(value["signers"], json!([]));
        assert_eq!(value["args"][1], json!({"type": "Integer", "value": "1"}));
    }

    #[test]
    fn test_read_result_snake_case_gas() {
        let result: DapiReadResult = serde_json::from_value(json!({
            "script": "wh8MCGRlY2ltYWxzDBTPduKL0AYsSkeO41VhARMZ88+k0kFifVtS",
            "state": "HALT",
            "gas_consumed": "0.0200",
            "stack": [{"type": "Integer", "value": "8"}]
        }))
        .unwrap();
        let normalized = result.into_result();
        assert_eq!(normalized.data().map(|d| d.gas_consumed.as_str()), Some("0.0200"));
    }

    #[test]
    fn test_error_mapping() {
        let missing = DapiError::new(DapiError::NO_PROVIDER, "no provider").into_wallet_error(WalletErrorKind::Account);
        assert!(missing.is(WalletErrorKind::NotInstalled));

        let denied = DapiError::new(DapiError::CANCELED, "user canceled").into_wallet_error(WalletErrorKind::Account);
        assert!(denied.is(WalletErrorKind::Account));
        assert_eq!(denied.message(), "CANCELED: user canceled");
    }

    #[test]
    fn test_write_result_alias() {
        let result: DapiWriteResult = serde_json::from_value(json!({"txId": "0xabc"})).unwrap();
        assert_eq!(result.into_result().data().map(|d| d.tx_id.as_str()), Some("0xabc"));
    }
}
