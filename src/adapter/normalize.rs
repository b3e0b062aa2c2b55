//! Result Normalization
//!
//! Conversions between wallet specific payloads and the shared result model:
//! VM state mapping, GAS fee scaling and byte string re-encoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use super::types::{
    Argument, ArgumentType, ArgumentValue, ContractReadInvocationResult,
    ContractReadInvocationResultData, InvocationResult, MapEntry, StackItem, VmState,
};

/// GAS has 8 decimals
pub const GAS_DECIMALS: u32 = 8;

/// Error code attached to results whose execution did not halt
pub const FAULT_CODE: &str = "FAULT";

/// Error code attached to requests rejected for an unparsable fee
pub const INVALID_FEE_CODE: &str = "INVALID_FEE";

/// Errors raised while normalizing wallet payloads
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount out of range: {0}")]
    Overflow(String),

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

// =============================================================================
// VM results
// =============================================================================

/// Raw outcome of a test invocation as reported by a wallet transport
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub script: String,
    pub state: VmState,
    pub gas_consumed: String,
    pub stack: Vec<StackItem>,
    pub exception: Option<String>,
    pub tx: Option<String>,
}

impl ExecutionOutcome {
    /// Map the outcome onto the shared result
    ///
    /// Only `HALT` is a success. Any other state becomes an error carrying
    /// the VM exception text.
    pub fn into_result(self) -> ContractReadInvocationResult {
        match self.state {
            VmState::Halt => InvocationResult::success(ContractReadInvocationResultData {
                script: self.script,
                state: self.state,
                gas_consumed: self.gas_consumed,
                stack: self.stack,
                exception: self.exception,
                tx: self.tx,
            }),
            _ => InvocationResult::error(
                self.exception
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "execution faulted".to_string()),
                FAULT_CODE,
            ),
        }
    }
}

/// Result for a request refused because a fee did not parse
pub fn invalid_fee<T>(err: &NormalizeError) -> InvocationResult<T> {
    InvocationResult::fail(err.to_string(), INVALID_FEE_CODE)
}

// =============================================================================
// Fees
// =============================================================================

fn scale() -> Decimal {
    Decimal::from(10u64.pow(GAS_DECIMALS))
}

/// Convert a decimal GAS amount to its integer minimal unit string
///
/// `"0.0001"` becomes `"10000"`. Digits past the eighth decimal are rounded
/// half away from zero.
pub fn to_minimal_units(amount: &str) -> Result<String, NormalizeError> {
    let value = Decimal::from_str(amount.trim())
        .map_err(|_| NormalizeError::InvalidAmount(amount.to_string()))?;
    let scaled = value
        .checked_mul(scale())
        .ok_or_else(|| NormalizeError::Overflow(amount.to_string()))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Ok(scaled.normalize().to_string())
}

/// Inverse of [`to_minimal_units`]
pub fn from_minimal_units(units: &str) -> Result<String, NormalizeError> {
    let value = Decimal::from_str(units.trim())
        .map_err(|_| NormalizeError::InvalidAmount(units.to_string()))?;
    if value.fract() != Decimal::ZERO {
        return Err(NormalizeError::InvalidAmount(units.to_string()));
    }
    let amount = value
        .checked_div(scale())
        .ok_or_else(|| NormalizeError::Overflow(units.to_string()))?;
    Ok(amount.normalize().to_string())
}

/// Scale an optional fee, keeping `None` as is
pub fn optional_minimal_units(amount: Option<&str>) -> Result<Option<String>, NormalizeError> {
    amount.map(to_minimal_units).transpose()
}

// =============================================================================
// Byte strings
// =============================================================================

pub fn base64_to_hex(value: &str) -> Result<String, NormalizeError> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| NormalizeError::InvalidBase64(format!("{}: {}", value, e)))?;
    Ok(hex::encode(bytes))
}

pub fn hex_to_base64(value: &str) -> Result<String, NormalizeError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    let bytes =
        hex::decode(trimmed).map_err(|e| NormalizeError::InvalidHex(format!("{}: {}", value, e)))?;
    Ok(STANDARD.encode(bytes))
}

/// Re-encode every byte string argument from base64 to hex
///
/// Array and Map arguments are walked recursively.
pub fn arguments_to_hex(args: &[Argument]) -> Result<Vec<Argument>, NormalizeError> {
    args.iter().map(|arg| convert_argument(arg, &base64_to_hex)).collect()
}

/// Re-encode every byte string argument from hex to base64
pub fn arguments_to_base64(args: &[Argument]) -> Result<Vec<Argument>, NormalizeError> {
    args.iter().map(|arg| convert_argument(arg, &hex_to_base64)).collect()
}

fn convert_argument(
    arg: &Argument,
    convert: &dyn Fn(&str) -> Result<String, NormalizeError>,
) -> Result<Argument, NormalizeError> {
    let value = match (&arg.kind, &arg.value) {
        (ArgumentType::ByteArray, ArgumentValue::String(s)) => ArgumentValue::String(convert(s)?),
        (_, ArgumentValue::Array(items)) => ArgumentValue::Array(
            items
                .iter()
                .map(|item| convert_argument(item, convert))
                .collect::<Result<_, _>>()?,
        ),
        (_, ArgumentValue::Map(entries)) => ArgumentValue::Map(
            entries
                .iter()
                .map(|entry| {
                    Ok(MapEntry {
                        key: convert_argument(&entry.key, convert)?,
                        value: convert_argument(&entry.value, convert)?,
                    })
                })
                .collect::<Result<_, NormalizeError>>()?,
        ),
        (_, other) => other.clone(),
    };
    Ok(Argument::new(arg.kind, value))
}
