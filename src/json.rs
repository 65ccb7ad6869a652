//! # JSON Serialization Module
//!
//! High-performance JSON parsing using simd-json with serde_json for
//! serialization.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse a JSON string to a typed value using simd-json
///
/// # Errors
///
/// Returns `Error::JsonParse` if parsing fails
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    let mut bytes = json_str.as_bytes().to_vec();

    simd_json::from_slice(&mut bytes).map_err(|e| Error::JsonParse {
        reason: e.to_string(),
    })
}

/// Parse JSON bytes to a typed value using simd-json
///
/// More efficient than string parsing; the slice is mutated in place.
///
/// # Errors
///
/// Returns `Error::JsonParse` if parsing fails
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::JsonParse {
        reason: e.to_string(),
    })
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
