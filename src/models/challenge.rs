// src/models/challenge.rs
//! One-time `(audience, nonce)` challenges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the verifier expects to receive in answer to a challenge.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// A simple presentation (no credentials): DID authentication only.
    Authentication,
    /// A presentation carrying one or more credentials.
    Presentation,
}

/// A challenge handed to a holder. Single use: consumed by the first verification that
/// redeems it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Challenge {
    #[serde(rename = "aud")]
    pub audience: String,
    pub nonce: String,
    pub kind: ChallengeKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed: bool,
}

impl Challenge {
    /// True while the challenge can still be redeemed at `now`.
    pub fn is_outstanding_at(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && !matches!(self.expires_at, Some(exp) if exp <= now)
    }
}
