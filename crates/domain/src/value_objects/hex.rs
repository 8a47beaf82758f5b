//! Hex string normalization for hashes and addresses.

use primitive_types::{H160, H256};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error returned when a string is not a valid fixed-size hex value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} hex string: {input}")]
pub struct HexError {
    /// What was being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub input: String,
}

/// Adds or strips the `0x` prefix of a hex string.
#[must_use]
pub fn format_hex(hex: &str, with_0x: bool) -> String {
    let stripped = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if with_0x {
        format!("0x{stripped}")
    } else {
        stripped.to_string()
    }
}

/// Parses a 32-byte hash with or without `0x` prefix.
///
/// # Errors
/// Returns `HexError` if the input is not 64 hex digits.
pub fn parse_h256(hex: &str) -> Result<H256, HexError> {
    parse_fixed(hex, 64, "hash")
}

/// Parses a 20-byte address with or without `0x` prefix.
///
/// # Errors
/// Returns `HexError` if the input is not 40 hex digits.
pub fn parse_h160(hex: &str) -> Result<H160, HexError> {
    parse_fixed(hex, 40, "address")
}

fn parse_fixed<T: DeserializeOwned>(
    hex: &str,
    digits: usize,
    kind: &'static str,
) -> Result<T, HexError> {
    let err = || HexError {
        kind,
        input: hex.to_string(),
    };
    let bare = format_hex(hex.trim(), false);
    if bare.len() != digits {
        return Err(err());
    }
    serde_json::from_value(serde_json::Value::String(format!("0x{bare}"))).map_err(|_| err())
}
