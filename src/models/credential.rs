// src/models/credential.rs
//! Verifiable Credential data model.
//!
//! A credential is an issuer's signed statement about a subject. This struct is the decoded,
//! *unverified* view of a VC token; validity is only established by the verifier.

use crate::utils::time::remaining_seconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A Verifiable Credential.
///
/// # Fields
/// - `id`: Unique token identifier (`jti`)
/// - `issuer`: DID of the issuing entity (`iss`)
/// - `subject`: DID (or free-form id) the claims are about (`sub`)
/// - `credential_type`: Specific type next to `VerifiableCredential`, e.g. `DriverLicenseCredential`
/// - `claims`: Contents of `credentialSubject`
/// - `issued_at` / `not_before` / `expires_at`: Whole-second timestamps (`iat`, `nbf`, `exp`);
///   no `expires_at` means no expiry
///
/// # Signature coverage
/// Every field is part of the signed payload; changing any of them after signing makes the
/// issuer signature fail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Credential {
    pub id: String,
    pub issuer: String,
    pub subject: String,
    pub credential_type: String,
    pub claims: Map<String, Value>,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// True once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    /// True while `now` is before `not_before`.
    pub fn is_not_yet_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.not_before
    }

    /// Seconds of validity left, for display. `None` when the credential never expires.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        remaining_seconds(now, self.expires_at)
    }

    /// Looks up a single claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}
