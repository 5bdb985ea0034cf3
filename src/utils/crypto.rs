// src/utils/crypto.rs
//! Hashing and randomness helpers.
//!
//! All randomness comes from the operating system RNG (`OsRng`); nothing in this crate uses a
//! seeded or thread-local generator for protocol values.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Computes a SHA-256 digest of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash
///
/// # Returns
/// Fixed-size 32-byte array containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Fills a fresh buffer of `len` bytes from the OS RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Random URL-safe identifier carrying `len` bytes of entropy.
///
/// Used for challenge nonces and token `jti` values.
pub fn random_token(len: usize) -> String {
    base64::encode_config(random_bytes(len), base64::URL_SAFE_NO_PAD)
}
