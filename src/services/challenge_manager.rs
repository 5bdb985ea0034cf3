// src/services/challenge_manager.rs
//! One-time challenge issuance and redemption.
//!
//! Each verifier owns a manager whose table maps nonce -> challenge. Redemption is a single
//! check-and-consume under the table lock, so two concurrent verifications can never both
//! redeem the same challenge.

use crate::config::{
    ChallengeSettings, MAX_CHALLENGE_TTL_SECS, MIN_CHALLENGE_TTL_SECS, MIN_NONCE_BYTES,
};
use crate::models::challenge::{Challenge, ChallengeKind};
use crate::utils::crypto::random_token;
use crate::utils::time::now;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Issues and tracks challenges for one verifier.
pub struct ChallengeManager {
    /// Default audience (normally the verifier's DID)
    audience: String,
    ttl: Duration,
    nonce_bytes: usize,
    challenges: Mutex<HashMap<String, Challenge>>,
}

impl ChallengeManager {
    pub fn new(audience: impl Into<String>, settings: &ChallengeSettings) -> Self {
        ChallengeManager {
            audience: audience.into(),
            ttl: Duration::seconds(
                settings
                    .ttl_secs
                    .clamp(MIN_CHALLENGE_TTL_SECS, MAX_CHALLENGE_TTL_SECS) as i64,
            ),
            nonce_bytes: settings.nonce_bytes.max(MIN_NONCE_BYTES),
            challenges: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Challenge>> {
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Issues a challenge addressed to this manager's audience.
    pub fn issue_challenge(&self, kind: ChallengeKind) -> Challenge {
        self.issue_challenge_for(kind, &self.audience)
    }

    /// Issues a challenge with an explicit audience value.
    pub fn issue_challenge_for(&self, kind: ChallengeKind, audience: &str) -> Challenge {
        let issued_at = now();
        let mut table = self.table();
        let mut nonce = random_token(self.nonce_bytes);
        while table.contains_key(&nonce) {
            nonce = random_token(self.nonce_bytes);
        }
        let challenge = Challenge {
            audience: audience.to_string(),
            nonce: nonce.clone(),
            kind,
            issued_at,
            expires_at: Some(issued_at + self.ttl),
            consumed: false,
        };
        table.insert(nonce, challenge.clone());
        debug!("issued {:?} challenge for {}", kind, audience);
        challenge
    }

    /// Consumes the challenge iff one is outstanding with exactly this `(nonce, audience)`.
    /// Returns false and changes nothing otherwise.
    pub fn redeem(&self, nonce: &str, audience: &str) -> bool {
        self.redeem_at(nonce, audience, now())
    }

    pub fn redeem_at(&self, nonce: &str, audience: &str, at: DateTime<Utc>) -> bool {
        let mut table = self.table();
        match table.get_mut(nonce) {
            Some(challenge) if challenge.audience == audience && challenge.is_outstanding_at(at) => {
                challenge.consumed = true;
                info!("redeemed challenge for {}", audience);
                true
            }
            _ => {
                debug!("challenge redemption refused for {}", audience);
                false
            }
        }
    }

    /// True if `(nonce, audience)` could be redeemed at `at`. Does not consume.
    pub fn is_outstanding_at(&self, nonce: &str, audience: &str, at: DateTime<Utc>) -> bool {
        self.table()
            .get(nonce)
            .is_some_and(|c| c.audience == audience && c.is_outstanding_at(at))
    }

    pub fn get(&self, nonce: &str) -> Option<Challenge> {
        self.table().get(nonce).cloned()
    }

    /// Number of challenges still redeemable now.
    pub fn outstanding(&self) -> usize {
        let at = now();
        self.table()
            .values()
            .filter(|c| c.is_outstanding_at(at))
            .count()
    }

    /// Drops consumed and expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_at(now())
    }

    pub fn purge_at(&self, at: DateTime<Utc>) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, c| c.is_outstanding_at(at));
        before - table.len()
    }
}
