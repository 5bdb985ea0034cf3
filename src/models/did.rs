// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! A DID is `did:<method>:<identifier>`. The identifier never changes once created; the key
//! recorded against it in the registry may be rotated.

use crate::error::{Error, Result};
use crate::wallet::key_management::PublicKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed DID string.
///
/// # DID Format
/// ```text
/// did:<method>:<method-specific-id>
/// ```
/// The method is lowercase alphanumeric; the identifier may itself contain `:`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Did {
    /// DID method name, e.g. `demo`
    pub method: String,
    /// Method-specific identifier
    pub identifier: String,
}

impl Did {
    /// Builds a DID from its parts, validating both.
    pub fn new(method: &str, identifier: &str) -> Result<Self> {
        if method.is_empty()
            || !method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(Error::InvalidInput(format!("invalid DID method: {:?}", method)));
        }
        if identifier.is_empty() || identifier.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "invalid DID identifier: {:?}",
                identifier
            )));
        }
        Ok(Did {
            method: method.to_string(),
            identifier: identifier.to_string(),
        })
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.identifier)
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| Error::InvalidInput(format!("not a DID: {:?}", s)))?;
        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("DID has no identifier: {:?}", s)))?;
        Did::new(method, identifier)
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.to_string()
    }
}

/// Registry entry: a DID and the key currently bound to it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DidDocument {
    /// The DID this document describes
    pub id: Did,

    /// Currently registered verification key (SEC1, base58 on the wire)
    pub public_key: PublicKey,

    pub created_at: DateTime<Utc>,

    /// Last key rotation, equal to `created_at` until the first rotation
    pub updated_at: DateTime<Utc>,
}
