//! Common types for wallet adapters
//!
//! These types provide a unified representation for contract invocations
//! and their results across different wallets. Field names follow the
//! camelCase wire format callers already depend on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

// =============================================================================
// Signers
// =============================================================================

/// Witness scope bit flags of a transaction signer
///
/// Scopes are not exclusive: several flags combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WitnessScope(u8);

impl WitnessScope {
    pub const NONE: WitnessScope = WitnessScope(0x00);
    pub const CALLED_BY_ENTRY: WitnessScope = WitnessScope(0x01);
    pub const CUSTOM_CONTRACTS: WitnessScope = WitnessScope(0x10);
    pub const CUSTOM_GROUPS: WitnessScope = WitnessScope(0x20);
    pub const GLOBAL: WitnessScope = WitnessScope(0x80);

    /// Named flags in the order wallets expect them
    const NAMED: [(WitnessScope, &'static str); 4] = [
        (WitnessScope::CALLED_BY_ENTRY, "CalledByEntry"),
        (WitnessScope::CUSTOM_CONTRACTS, "CustomContracts"),
        (WitnessScope::CUSTOM_GROUPS, "CustomGroups"),
        (WitnessScope::GLOBAL, "Global"),
    ];

    pub const fn from_bits(bits: u8) -> Self {
        WitnessScope(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set
    pub fn contains(&self, other: WitnessScope) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the set flags, `["None"]` for an empty mask
    ///
    /// Unknown bits are ignored.
    pub fn names(&self) -> Vec<&'static str> {
        if self.is_empty() {
            return vec!["None"];
        }
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Comma-joined flag names, e.g. `CalledByEntry,Global`
    pub fn to_names_string(&self) -> String {
        self.names().join(",")
    }
}

impl BitOr for WitnessScope {
    type Output = WitnessScope;

    fn bitor(self, rhs: Self) -> Self::Output {
        WitnessScope(self.0 | rhs.0)
    }
}

impl BitOrAssign for WitnessScope {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for WitnessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_names_string())
    }
}

/// Transaction signer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    /// Script hash of the signing account
    pub account: String,
    pub scopes: WitnessScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_contracts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_groups: Option<Vec<String>>,
}

impl Signer {
    pub fn new(account: impl Into<String>, scopes: WitnessScope) -> Self {
        Self {
            account: account.into(),
            scopes,
            allowed_contracts: None,
            allowed_groups: None,
        }
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// Contract parameter type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgumentType {
    Any,
    Boolean,
    Integer,
    #[serde(alias = "ByteString")]
    ByteArray,
    String,
    Hash160,
    Hash256,
    PublicKey,
    Signature,
    Array,
    Map,
    InteropInterface,
    Void,
}

/// Typed contract argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    #[serde(default)]
    pub value: ArgumentValue,
}

/// Argument payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    #[default]
    Null,
    Boolean(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Argument>),
    Map(Vec<MapEntry>),
}

/// Key/value pair of a `Map` argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Argument,
    pub value: Argument,
}

impl Argument {
    pub fn new(kind: ArgumentType, value: ArgumentValue) -> Self {
        Self { kind, value }
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ArgumentType::Boolean, ArgumentValue::Boolean(value))
    }

    /// Integers travel as decimal strings to avoid precision loss
    pub fn integer(value: impl fmt::Display) -> Self {
        Self::new(ArgumentType::Integer, ArgumentValue::String(value.to_string()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ArgumentType::String, ArgumentValue::String(value.into()))
    }

    /// Byte string, base64 encoded
    pub fn byte_array(base64: impl Into<String>) -> Self {
        Self::new(ArgumentType::ByteArray, ArgumentValue::String(base64.into()))
    }

    pub fn hash160(value: impl Into<String>) -> Self {
        Self::new(ArgumentType::Hash160, ArgumentValue::String(value.into()))
    }

    pub fn hash256(value: impl Into<String>) -> Self {
        Self::new(ArgumentType::Hash256, ArgumentValue::String(value.into()))
    }

    pub fn array(items: Vec<Argument>) -> Self {
        Self::new(ArgumentType::Array, ArgumentValue::Array(items))
    }

    pub fn map(entries: Vec<MapEntry>) -> Self {
        Self::new(ArgumentType::Map, ArgumentValue::Map(entries))
    }

    /// Check that the value shape matches the type tag, recursively
    pub fn is_well_typed(&self) -> bool {
        match (&self.kind, &self.value) {
            (ArgumentType::Any, _) => true,
            (ArgumentType::Void, ArgumentValue::Null) => true,
            (ArgumentType::Boolean, ArgumentValue::Boolean(_)) => true,
            (ArgumentType::Integer, ArgumentValue::Number(_)) => true,
            (ArgumentType::Integer, ArgumentValue::String(s)) => {
                let digits = s.strip_prefix('-').unwrap_or(s);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            (
                ArgumentType::ByteArray
                | ArgumentType::String
                | ArgumentType::Hash160
                | ArgumentType::Hash256
                | ArgumentType::PublicKey
                | ArgumentType::Signature,
                ArgumentValue::String(_),
            ) => true,
            (ArgumentType::Array, ArgumentValue::Array(items)) => {
                items.iter().all(Argument::is_well_typed)
            }
            (ArgumentType::Map, ArgumentValue::Array(items)) => items.is_empty(),
            (ArgumentType::Map, ArgumentValue::Map(entries)) => entries
                .iter()
                .all(|e| e.key.is_well_typed() && e.value.is_well_typed()),
            (ArgumentType::InteropInterface, _) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Stack
// =============================================================================

/// VM stack item type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackItemType {
    Any,
    Pointer,
    Boolean,
    Integer,
    #[serde(alias = "ByteArray")]
    ByteString,
    Buffer,
    Array,
    Struct,
    Map,
    InteropInterface,
}

/// Result stack entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackItem {
    #[serde(rename = "type")]
    pub kind: StackItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

// =============================================================================
// Invocations
// =============================================================================

/// Read-only contract call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractReadInvocation {
    pub script_hash: String,
    pub operation: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_on_fail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<Vec<Signer>>,
}

impl ContractReadInvocation {
    pub fn new(script_hash: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            script_hash: script_hash.into(),
            operation: operation.into(),
            args: Vec::new(),
            abort_on_fail: None,
            signers: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Argument>) -> Self {
        self.args = args;
        self
    }

    pub fn with_signers(mut self, signers: Vec<Signer>) -> Self {
        self.signers = Some(signers);
        self
    }
}

/// Several read-only calls evaluated in one script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractReadInvocationMulti {
    pub invocations: Vec<ContractReadInvocation>,
    #[serde(default)]
    pub signers: Vec<Signer>,
}

/// Fee overrides of a write call, fees given as decimal GAS strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractWriteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_system_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_override: Option<bool>,
}

/// Contract call that produces a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractWriteInvocation {
    #[serde(flatten)]
    pub invocation: ContractReadInvocation,
    #[serde(flatten)]
    pub options: ContractWriteOptions,
}

impl ContractWriteInvocation {
    pub fn new(invocation: ContractReadInvocation) -> Self {
        Self {
            invocation,
            options: ContractWriteOptions::default(),
        }
    }
}

/// Several contract calls packed in one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractWriteInvocationMulti {
    pub invocations: Vec<ContractReadInvocation>,
    #[serde(default)]
    pub signers: Vec<Signer>,
    #[serde(flatten)]
    pub options: ContractWriteOptions,
}

/// Message signing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignMessageInvocation {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

// =============================================================================
// Results
// =============================================================================

/// VM execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    #[serde(rename = "HALT")]
    Halt,
    #[serde(rename = "FAULT")]
    Fault,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractReadInvocationResultData {
    pub script: String,
    pub state: VmState,
    pub gas_consumed: String,
    pub stack: Vec<StackItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractWriteInvocationResultData {
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNetworksResultData {
    pub networks: Vec<String>,
    pub default_network: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageResultData {
    pub public_key: String,
    pub data: String,
    pub salt: String,
    pub message: String,
}

/// JSEND style result of a wallet request
///
/// `Fail` marks requests rejected before they reached the wallet,
/// `Error` marks requests the wallet or VM refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult<T> {
    Success {
        data: T,
    },
    Fail {
        message: String,
        #[serde(default)]
        code: String,
    },
    Error {
        message: String,
        #[serde(default)]
        code: String,
    },
}

impl<T> InvocationResult<T> {
    pub fn success(data: T) -> Self {
        InvocationResult::Success { data }
    }

    pub fn fail(message: impl Into<String>, code: impl Into<String>) -> Self {
        InvocationResult::Fail {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        InvocationResult::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            InvocationResult::Success { .. } => "success",
            InvocationResult::Fail { .. } => "fail",
            InvocationResult::Error { .. } => "error",
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            InvocationResult::Success { data } => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            InvocationResult::Success { data } => Some(data),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            InvocationResult::Success { .. } => None,
            InvocationResult::Fail { message, .. } | InvocationResult::Error { message, .. } => {
                Some(message)
            }
        }
    }
}

pub type ContractReadInvocationResult = InvocationResult<ContractReadInvocationResultData>;
pub type ContractWriteInvocationResult = InvocationResult<ContractWriteInvocationResultData>;
pub type GetNetworksInvocationResult = InvocationResult<GetNetworksResultData>;
pub type SignMessageInvocationResult = InvocationResult<SignMessageResultData>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_names_follow_set_bits() {
        let scope = WitnessScope::CALLED_BY_ENTRY | WitnessScope::GLOBAL;
        assert_eq!(scope.bits(), 0x81);
        assert_eq!(scope.names(), vec!["CalledByEntry", "Global"]);
        assert_eq!(scope.to_names_string(), "CalledByEntry,Global");
    }

    #[test]
    fn test_scope_names_every_combination() {
        let flags = [
            WitnessScope::CALLED_BY_ENTRY,
            WitnessScope::CUSTOM_CONTRACTS,
            WitnessScope::CUSTOM_GROUPS,
            WitnessScope::GLOBAL,
        ];
        for mask in 0u8..16 {
            let mut scope = WitnessScope::NONE;
            for (i, flag) in flags.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    scope |= *flag;
                }
            }
            let names = scope.names();
            if mask == 0 {
                assert_eq!(names, vec!["None"]);
            } else {
                assert_eq!(names.len(), mask.count_ones() as usize);
            }
        }
    }

    #[test]
    fn test_signer_wire_format() {
        let signer = Signer::new("0xabc", WitnessScope::CALLED_BY_ENTRY);
        let value = serde_json::to_value(&signer).unwrap();
        assert_eq!(value, json!({"account": "0xabc", "scopes": 1}));
    }

    #[test]
    fn test_byte_string_alias() {
        let arg: Argument = serde_json::from_value(json!({"type": "ByteString", "value": "AQI="})).unwrap();
        assert_eq!(arg.kind, ArgumentType::ByteArray);
    }

    #[test]
    fn test_nested_arguments_parse() {
        let arg: Argument = serde_json::from_value(json!({
            "type": "Array",
            "value": [
                {"type": "Integer", "value": "5"},
                {"type": "Array", "value": [{"type": "Hash160", "value": "0x01"}]},
                {"type": "Map", "value": [
                    {"key": {"type": "String", "value": "a"}, "value": {"type": "Boolean", "value": true}}
                ]}
            ]
        }))
        .unwrap();
        assert!(arg.is_well_typed());
        match &arg.value {
            ArgumentValue::Array(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[2].value, ArgumentValue::Map(_)));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_ill_typed_argument() {
        let arg = Argument::array(vec![Argument::new(
            ArgumentType::Boolean,
            ArgumentValue::String("yes".to_string()),
        )]);
        assert!(!arg.is_well_typed());
        assert!(!Argument::integer("12a").is_well_typed());
        assert!(Argument::integer(-12).is_well_typed());
    }

    #[test]
    fn test_write_invocation_flattens() {
        let mut invocation = ContractWriteInvocation::new(
            ContractReadInvocation::new("0xd2a4cff31913016155e38e474a2c06d08be276cf", "transfer"),
        );
        invocation.options.fee = Some("0.0001".to_string());
        let value = serde_json::to_value(&invocation).unwrap();
        assert_eq!(value["scriptHash"], "0xd2a4cff31913016155e38e474a2c06d08be276cf");
        assert_eq!(value["fee"], "0.0001");
        assert!(value.get("broadcastOverride").is_none());
    }

    #[test]
    fn test_result_status_tag() {
        let ok: ContractWriteInvocationResult = InvocationResult::success(ContractWriteInvocationResultData {
            tx_id: "0x01".to_string(),
        });
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"status": "success", "data": {"txId": "0x01"}}));

        let err: ContractWriteInvocationResult =
            serde_json::from_value(json!({"status": "error", "message": "denied", "code": "CANCELED"})).unwrap();
        assert_eq!(err.status(), "error");
        assert_eq!(err.message(), Some("denied"));
    }

    #[test]
    fn test_unknown_vm_state() {
        let state: VmState = serde_json::from_value(json!("BREAK")).unwrap();
        assert_eq!(state, VmState::Unknown);
    }
}
