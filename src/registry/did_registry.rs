// src/registry/did_registry.rs
//! DID registry interface and in-memory implementation.
//!
//! The engines only need [`DidResolver`]: DID in, current public key out. The in-memory
//! registry additionally supports creation, fixed registration and key rotation. Reads take
//! a shared lock; rotation takes the write lock, so a rotated key is visible to every
//! resolution that starts afterwards.

use crate::error::{Error, Result};
use crate::models::did::{Did, DidDocument};
use crate::utils::crypto::hash_data;
use crate::utils::time::now;
use crate::wallet::key_management::{PublicKey, Signer};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Bytes of the key hash used for derived identifiers.
const IDENTIFIER_HASH_BYTES: usize = 16;

/// Resolves a DID to its registered verification key.
pub trait DidResolver: Send + Sync {
    /// # Errors
    /// `UnknownDid` when the DID is not registered.
    fn resolve(&self, did: &str) -> Result<PublicKey>;
}

/// Derives the method-specific identifier for a key: base58 of the leading bytes of
/// SHA-256(public key).
pub fn derive_identifier(public_key: &PublicKey) -> String {
    let digest = hash_data(public_key.as_bytes());
    bs58::encode(&digest[..IDENTIFIER_HASH_BYTES]).into_string()
}

/// Process-local DID registry.
pub struct InMemoryDidRegistry {
    /// Documents keyed by the DID string
    documents: RwLock<HashMap<String, DidDocument>>,
    /// Used to check key rotation proofs
    signer: Arc<dyn Signer>,
}

impl InMemoryDidRegistry {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        InMemoryDidRegistry {
            documents: RwLock::new(HashMap::new()),
            signer,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DidDocument>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DidDocument>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates `did:<method>:<derived-id>` for `public_key` and registers it.
    ///
    /// # Errors
    /// - `InvalidInput` for an invalid method name or an empty key
    /// - `DidExists` when the same key was already registered under `method`
    pub fn create_did(&self, method: &str, public_key: PublicKey) -> Result<Did> {
        if public_key.as_bytes().is_empty() {
            return Err(Error::InvalidInput("public key is empty".into()));
        }
        let did = Did::new(method, &derive_identifier(&public_key))?;
        self.register(did.clone(), public_key)?;
        Ok(did)
    }

    /// Registers a caller-chosen DID.
    ///
    /// # Errors
    /// `DidExists` if the DID is already present.
    pub fn register(&self, did: Did, public_key: PublicKey) -> Result<DidDocument> {
        let key = did.to_string();
        let mut documents = self.write();
        if documents.contains_key(&key) {
            return Err(Error::DidExists(key));
        }
        let created_at = now();
        let document = DidDocument {
            id: did,
            public_key,
            created_at,
            updated_at: created_at,
        };
        documents.insert(key.clone(), document.clone());
        info!("registered {}", key);
        Ok(document)
    }

    /// Full registry entry for `did`.
    pub fn resolve_document(&self, did: &str) -> Result<DidDocument> {
        self.read()
            .get(did)
            .cloned()
            .ok_or_else(|| Error::UnknownDid(did.to_string()))
    }

    /// Binds `new_key` to `did`.
    ///
    /// `proof` must be a signature over the new key's bytes made with the currently
    /// registered key. The check and the update happen under one write lock.
    ///
    /// # Errors
    /// - `UnknownDid` when the DID is not registered
    /// - `InvalidInput` when the proof does not verify
    pub fn rotate_key(&self, did: &str, new_key: PublicKey, proof: &[u8]) -> Result<DidDocument> {
        let mut documents = self.write();
        let document = documents
            .get_mut(did)
            .ok_or_else(|| Error::UnknownDid(did.to_string()))?;
        if !self
            .signer
            .verify(&document.public_key, new_key.as_bytes(), proof)
        {
            return Err(Error::InvalidInput(
                "rotation proof does not verify against the registered key".into(),
            ));
        }
        document.public_key = new_key;
        document.updated_at = now();
        info!("rotated key for {}", did);
        Ok(document.clone())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl DidResolver for InMemoryDidRegistry {
    fn resolve(&self, did: &str) -> Result<PublicKey> {
        let key = self.resolve_document(did).map(|doc| doc.public_key);
        if key.is_err() {
            debug!("resolution failed for {}", did);
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::{default_signer, KeyPair};

    fn registry() -> InMemoryDidRegistry {
        InMemoryDidRegistry::new(default_signer())
    }

    #[test]
    fn create_then_resolve() {
        let registry = registry();
        let keys = KeyPair::generate();
        let did = registry.create_did("demo", keys.public_key.clone()).unwrap();

        assert_eq!(did.method, "demo");
        assert_eq!(did.identifier, derive_identifier(&keys.public_key));
        assert_eq!(registry.resolve(&did.to_string()).unwrap(), keys.public_key);
    }

    #[test]
    fn unknown_did_fails() {
        let err = registry().resolve("did:demo:nobody").unwrap_err();
        assert!(matches!(err, Error::UnknownDid(_)));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = registry();
        let keys = KeyPair::generate();
        let did: Did = "did:demo:issuer1".parse().unwrap();
        registry.register(did.clone(), keys.public_key.clone()).unwrap();
        let err = registry.register(did, keys.public_key).unwrap_err();
        assert!(matches!(err, Error::DidExists(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = registry().create_did("demo", PublicKey(vec![])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rotation_requires_proof_from_current_key() {
        let registry = registry();
        let signer = default_signer();
        let old = KeyPair::generate();
        let new = KeyPair::generate();
        let did = registry.create_did("demo", old.public_key.clone()).unwrap();
        let did = did.to_string();

        let forged = signer.sign(new.private_key(), new.public_key.as_bytes()).unwrap();
        assert!(registry.rotate_key(&did, new.public_key.clone(), &forged).is_err());
        assert_eq!(registry.resolve(&did).unwrap(), old.public_key);

        let proof = signer.sign(old.private_key(), new.public_key.as_bytes()).unwrap();
        let document = registry.rotate_key(&did, new.public_key.clone(), &proof).unwrap();
        assert_eq!(document.public_key, new.public_key);
        assert_eq!(registry.resolve(&did).unwrap(), new.public_key);
    }
}
