// src/utils/serialization.rs
//! Serialization utilities for token segments.
//!
//! Token segments are JSON documents encoded as unpadded base64url.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes raw bytes as unpadded base64url.
pub fn b64url_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Decodes an unpadded base64url segment.
///
/// # Errors
/// Returns `MalformedToken` naming the segment that failed.
pub fn b64url_decode(segment: &str, what: &str) -> Result<Vec<u8>> {
    base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|e| Error::MalformedToken(format!("{} is not base64url: {}", what, e)))
}

/// Serializes a value to JSON and encodes it as a token segment.
///
/// Struct fields serialize in declaration order and `serde_json::Map` keeps its keys sorted,
/// so equal values always produce identical segments.
pub fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(b64url_encode(&json))
}

/// Decodes a token segment and deserializes its JSON content.
pub fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let bytes = b64url_decode(segment, what)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("{} is not valid JSON: {}", what, e)))
}
