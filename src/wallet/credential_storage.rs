// src/wallet/credential_storage.rs
//! Credential storage for the holder's wallet.
//!
//! Keeps issued VC tokens in memory next to their decoded view, keyed by a caller-chosen
//! slot name (e.g. `driver_license`). Nothing is persisted.

use crate::codec::vc::decode_vc;
use crate::error::Result;
use crate::models::credential::Credential;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A stored credential: the token as issued plus its decoded (unverified) content.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredential {
    pub token: String,
    pub credential: Credential,
}

/// In-memory storage for Verifiable Credentials.
///
/// # Note
/// Not synchronized; wrap in a mutex when shared between tasks.
#[derive(Debug, Default)]
pub struct CredentialStorage {
    /// Internal hashmap storing credentials by slot name
    credentials: HashMap<String, StoredCredential>,
}

impl CredentialStorage {
    pub fn new() -> Self {
        CredentialStorage {
            credentials: HashMap::new(),
        }
    }

    /// Stores a VC token under `id`, overwriting any previous entry.
    ///
    /// # Errors
    /// `MalformedToken` if the token cannot be decoded. The signature is not checked here.
    pub fn store_credential(&mut self, id: &str, token: &str) -> Result<&StoredCredential> {
        let credential = decode_vc(token)?.claims;
        self.credentials.insert(
            id.to_string(),
            StoredCredential {
                token: token.to_string(),
                credential,
            },
        );
        Ok(&self.credentials[id])
    }

    pub fn get_credential(&self, id: &str) -> Option<&StoredCredential> {
        self.credentials.get(id)
    }

    /// Token for `id`, if stored.
    pub fn token(&self, id: &str) -> Option<&str> {
        self.credentials.get(id).map(|c| c.token.as_str())
    }

    pub fn count_credentials(&self) -> usize {
        self.credentials.len()
    }

    pub fn contains_credential(&self, id: &str) -> bool {
        self.credentials.contains_key(id)
    }

    /// Removes a credential. Returns true if something was removed.
    pub fn remove_credential(&mut self, id: &str) -> bool {
        self.credentials.remove(id).is_some()
    }

    /// Drops every credential expired at `now`; returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.credentials.len();
        self.credentials
            .retain(|_, stored| !stored.credential.is_expired_at(now));
        before - self.credentials.len()
    }
}
