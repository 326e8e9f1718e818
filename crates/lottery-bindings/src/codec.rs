//! Static ABI codec
//!
//! Every value the Lottery interface exchanges is a static type, so encoding
//! is a concatenation of 32-byte words. Dynamic types are out of reach on
//! purpose, apart from the empty `bytes` argument of the upkeep functions.

use alloy_primitives::{Address, B256, U256};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use crate::abi::selector;

/// Size of an ABI word
pub const WORD: usize = 32;

/// Decoding error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the requested word
    #[error("data too short: need {needed} bytes, got {actual}")]
    ShortData {
        /// Bytes required
        needed: usize,
        /// Bytes available
        actual: usize,
    },
    /// A value that does not fit the expected type
    #[error("invalid {kind} value: {value}")]
    InvalidValue {
        /// What was being parsed
        kind: &'static str,
        /// Offending input
        value: String,
    },
    /// A Solidity type this codec cannot handle
    #[error("unsupported abi type: {0}")]
    UnsupportedType(String),
    /// Malformed hex string
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// A static ABI value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiValue {
    /// `address`
    Address(Address),
    /// `uint8` .. `uint256`
    Uint(U256),
    /// `bytes32`
    FixedBytes(B256),
    /// `bool`
    Bool(bool),
}

impl AbiValue {
    /// Encode as a single 32-byte word
    pub fn to_word(&self) -> [u8; 32] {
        match self {
            Self::Address(address) => address.into_word().0,
            Self::Uint(value) => value.to_be_bytes::<32>(),
            Self::FixedBytes(bytes) => bytes.0,
            Self::Bool(flag) => U256::from(u8::from(*flag)).to_be_bytes::<32>(),
        }
    }

    /// Convert a JSON constructor argument (as stored in deployment artifacts)
    /// into a value of the given Solidity type.
    ///
    /// Numbers may be JSON numbers, decimal strings or `0x`-prefixed hex strings.
    pub fn from_json(kind: &str, value: &Value) -> Result<Self, DecodeError> {
        let invalid = || DecodeError::InvalidValue {
            kind: "constructor argument",
            value: value.to_string(),
        };

        match kind {
            "address" => {
                let text = value.as_str().ok_or_else(invalid)?;
                Address::from_str(text).map(Self::Address).map_err(|_| invalid())
            }
            "bool" => value.as_bool().map(Self::Bool).ok_or_else(invalid),
            "bytes32" => {
                let text = value.as_str().ok_or_else(invalid)?;
                B256::from_str(text).map(Self::FixedBytes).map_err(|_| invalid())
            }
            kind if kind.starts_with("uint") => {
                let parsed = match value {
                    Value::Number(number) => number.as_u64().map(U256::from),
                    Value::String(text) => parse_quantity(text).ok(),
                    _ => None,
                };
                parsed.map(Self::Uint).ok_or_else(invalid)
            }
            other => Err(DecodeError::UnsupportedType(other.to_string())),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex quantity
pub fn parse_quantity(text: &str) -> Result<U256, DecodeError> {
    let parsed = match text.strip_prefix("0x") {
        Some("") => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(text, 10),
    };
    parsed.map_err(|_| DecodeError::InvalidValue {
        kind: "quantity",
        value: text.to_string(),
    })
}

/// Decode a `0x`-prefixed hex string into bytes
pub fn decode_hex(text: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(text.trim_start_matches("0x")).map_err(|e| DecodeError::Hex(e.to_string()))
}

/// Concatenate the words of the given values
pub fn encode(values: &[AbiValue]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * WORD);
    for value in values {
        out.extend_from_slice(&value.to_word());
    }
    out
}

/// Calldata for `signature` called with static arguments
pub fn encode_call(signature: &str, args: &[AbiValue]) -> Vec<u8> {
    let mut calldata = selector(signature).to_vec();
    calldata.extend_from_slice(&encode(args));
    calldata
}

/// Calldata for a function whose single argument is an empty `bytes`
/// (`checkUpkeep("0x")`, `performUpkeep([])`)
pub fn encode_empty_bytes_call(signature: &str) -> Vec<u8> {
    let mut calldata = selector(signature).to_vec();
    // head: offset of the tail, tail: zero length
    calldata.extend_from_slice(&U256::from(WORD).to_be_bytes::<32>());
    calldata.extend_from_slice(&[0u8; WORD]);
    calldata
}

/// Word at `index` of ABI-encoded data
pub fn word(data: &[u8], index: usize) -> Result<[u8; 32], DecodeError> {
    let start = index * WORD;
    let end = start + WORD;
    let slice = data.get(start..end).ok_or(DecodeError::ShortData {
        needed: end,
        actual: data.len(),
    })?;
    let mut out = [0u8; 32];
    out.copy_from_slice(slice);
    Ok(out)
}

/// `uint` at word `index`
pub fn decode_uint(data: &[u8], index: usize) -> Result<U256, DecodeError> {
    word(data, index).map(U256::from_be_bytes)
}

/// `address` at word `index`
pub fn decode_address(data: &[u8], index: usize) -> Result<Address, DecodeError> {
    let word = word(data, index)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::InvalidValue {
            kind: "address",
            value: format!("0x{}", hex::encode(word)),
        });
    }
    Ok(Address::from_word(B256::from(word)))
}

/// `bool` at word `index`
pub fn decode_bool(data: &[u8], index: usize) -> Result<bool, DecodeError> {
    match decode_uint(data, index)? {
        value if value.is_zero() => Ok(false),
        value if value == U256::from(1) => Ok(true),
        value => Err(DecodeError::InvalidValue {
            kind: "bool",
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{CHECK_UPKEEP, GET_PLAYER};
    use serde_json::json;

    #[test]
    fn test_encode_call_appends_words() {
        let calldata = encode_call(GET_PLAYER, &[AbiValue::Uint(U256::from(3))]);
        assert_eq!(calldata.len(), 4 + WORD);
        assert_eq!(&calldata[..4], &selector(GET_PLAYER));
        assert_eq!(calldata[4 + 31], 3);
    }

    #[test]
    fn test_empty_bytes_call_layout() {
        let calldata = encode_empty_bytes_call(CHECK_UPKEEP);
        assert_eq!(calldata.len(), 4 + 2 * WORD);
        assert_eq!(decode_uint(&calldata[4..], 0).unwrap(), U256::from(32));
        assert_eq!(decode_uint(&calldata[4..], 1).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_decode_address_rejects_dirty_word() {
        let mut data = [0u8; 32];
        data[0] = 1;
        assert!(decode_address(&data, 0).is_err());

        let address = Address::repeat_byte(0x11);
        let encoded = AbiValue::Address(address).to_word();
        assert_eq!(decode_address(&encoded, 0).unwrap(), address);
    }

    #[test]
    fn test_decode_short_data() {
        assert_eq!(
            decode_uint(&[0u8; 40], 1),
            Err(DecodeError::ShortData { needed: 64, actual: 40 })
        );
    }

    #[test]
    fn test_decode_bool() {
        assert!(decode_bool(&U256::from(1).to_be_bytes::<32>(), 0).unwrap());
        assert!(!decode_bool(&[0u8; 32], 0).unwrap());
        assert!(decode_bool(&U256::from(2).to_be_bytes::<32>(), 0).is_err());
    }

    #[test]
    fn test_constructor_args_from_json() {
        let fee = AbiValue::from_json("uint256", &json!("10000000000000000")).unwrap();
        assert_eq!(fee, AbiValue::Uint(U256::from(10_000_000_000_000_000u64)));

        let interval = AbiValue::from_json("uint256", &json!(30)).unwrap();
        assert_eq!(interval, AbiValue::Uint(U256::from(30)));

        let hex_amount = AbiValue::from_json("uint64", &json!("0x1f")).unwrap();
        assert_eq!(hex_amount, AbiValue::Uint(U256::from(31)));

        assert!(AbiValue::from_json("address", &json!("not an address")).is_err());
        assert!(matches!(
            AbiValue::from_json("string", &json!("x")),
            Err(DecodeError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x10").unwrap(), U256::from(16));
        assert_eq!(parse_quantity("10").unwrap(), U256::from(10));
        assert!(parse_quantity("0xzz").is_err());
    }
}
