// src/models/presentation.rs
//! Verifiable Presentation data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A holder-signed bundle of credential tokens bound to one `(audience, nonce)` challenge.
///
/// An empty `credentials` list is a *simple* presentation: pure proof of control over the
/// holder DID's key, used for DID authentication.
///
/// Embedded credentials are kept as their original tokens so their issuer signatures stay
/// checkable; they are decoded only during verification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Presentation {
    /// Token identifier (`jti`)
    pub id: String,
    /// Presenting DID (`iss`)
    pub holder: String,
    /// Ordered VC tokens
    pub credentials: Vec<String>,
    /// Intended verifiers (`aud`, a single string or a list on the wire)
    pub audience: Vec<String>,
    /// Challenge nonce
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Presentation {
    /// True for zero-credential DID-auth presentations.
    pub fn is_simple(&self) -> bool {
        self.credentials.is_empty()
    }

    /// True if `audience` is one of the presentation's intended verifiers.
    pub fn is_addressed_to(&self, audience: &str) -> bool {
        self.audience.iter().any(|aud| aud == audience)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    pub fn is_not_yet_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.not_before
    }
}
