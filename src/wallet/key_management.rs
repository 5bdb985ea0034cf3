// src/wallet/key_management.rs
//! Cryptographic key management and the signing capability.
//!
//! The protocol core never touches curve arithmetic directly: it calls a [`Signer`] with raw
//! key material and canonical bytes. [`Secp256k1Signer`] is the built-in implementation:
//! - secp256k1 curve (via `k256`)
//! - ECDSA with SHA-256 prehashing (`ES256K`)
//! - Keys generated from the operating system RNG

use crate::error::{Error, Result};
use crate::models::did::Did;
use k256::ecdsa::signature::{Signer as _, Verifier as _};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// JOSE algorithm name for [`Secp256k1Signer`].
pub const ES256K: &str = "ES256K";

/// Verification key bytes (compressed SEC1 for secp256k1). Base58 on the wire.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_base58(encoded: &str) -> Result<Self> {
        bs58::decode(encoded)
            .into_vec()
            .map(PublicKey)
            .map_err(|e| Error::InvalidInput(format!("public key is not base58: {}", e)))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

impl TryFrom<String> for PublicKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        PublicKey::from_base58(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_base58()
    }
}

/// Secret scalar bytes. Never serialized and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(pub Vec<u8>);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Signing capability over raw key material.
pub trait Signer: Send + Sync {
    /// JOSE `alg` value this signer produces.
    fn algorithm(&self) -> &'static str;

    /// Signs `message` with `private_key`.
    ///
    /// # Errors
    /// `Error::Signing` when the key material cannot produce a signature.
    fn sign(&self, private_key: &PrivateKey, message: &[u8]) -> Result<Vec<u8>>;

    /// Checks `signature` over `message`. Malformed keys or signatures verify as `false`.
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool;
}

/// ECDSA over secp256k1 with SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Signer;

impl Signer for Secp256k1Signer {
    fn algorithm(&self) -> &'static str {
        ES256K
    }

    fn sign(&self, private_key: &PrivateKey, message: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::from_slice(&private_key.0)
            .map_err(|e| Error::Signing(format!("invalid secp256k1 private key: {}", e)))?;
        let signature: Signature = signing_key
            .try_sign(message)
            .map_err(|e| Error::Signing(e.to_string()))?;
        // 64-byte compact form (R || S)
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&public_key.0) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

/// A freshly generated or imported secp256k1 key pair.
#[derive(Clone)]
pub struct KeyPair {
    /// Secret key, kept private to this struct
    private_key: PrivateKey,
    /// Derived compressed public key
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new key pair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        Self::from_signing_key(&signing_key)
    }

    /// Rebuilds a key pair from secret scalar bytes.
    pub fn from_private_key(private_key: &PrivateKey) -> Result<Self> {
        let signing_key = SigningKey::from_slice(&private_key.0)
            .map_err(|e| Error::Signing(format!("invalid secp256k1 private key: {}", e)))?;
        Ok(Self::from_signing_key(&signing_key))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        KeyPair {
            private_key: PrivateKey(signing_key.to_bytes().to_vec()),
            public_key: PublicKey(public_key),
        }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// An identity that signs things: a DID plus the key pair it controls.
///
/// Actors are constructed explicitly and passed to the engines; nothing in the crate keeps
/// a process-wide actor.
#[derive(Debug, Clone)]
pub struct Actor {
    pub did: Did,
    pub keys: KeyPair,
}

impl Actor {
    pub fn new(did: Did, keys: KeyPair) -> Self {
        Actor { did, keys }
    }

    pub fn did_string(&self) -> String {
        self.did.to_string()
    }

    /// Replaces the local key pair. The registry is not touched.
    pub fn replace_keys(&mut self, keys: KeyPair) {
        self.keys = keys;
    }
}

/// Shared handle to the default signer.
pub fn default_signer() -> Arc<dyn Signer> {
    Arc::new(Secp256k1Signer)
}
