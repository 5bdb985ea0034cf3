// src/services/verifier.rs
//! Presentation and credential verification.
//!
//! A verifier resolves signer keys through a [`DidResolver`], checks signatures with a
//! [`Signer`] and redeems challenges from its own [`ChallengeManager`]. Verification never
//! short-circuits: every check is computed and reported so the caller can see each one.

use crate::codec::token::SignedToken;
use crate::codec::vc::decode_vc;
use crate::codec::vp::decode_vp;
use crate::config::RedemptionPolicy;
use crate::error::{Error, ErrorKind, Result};
use crate::models::challenge::{Challenge, ChallengeKind};
use crate::models::check::{Check, CheckResult, Failure};
use crate::models::credential::Credential;
use crate::registry::did_registry::DidResolver;
use crate::services::challenge_manager::ChallengeManager;
use crate::utils::time::now;
use crate::wallet::key_management::Signer;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of checking one credential on its own.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialReport {
    pub valid: bool,
    pub signature_valid: Check,
    pub not_expired: Check,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    #[serde(skip)]
    pub credential: Credential,
}

/// Relying party: issues challenges and verifies presentations against them.
pub struct Verifier {
    resolver: Arc<dyn DidResolver>,
    signer: Arc<dyn Signer>,
    challenges: Arc<ChallengeManager>,
    policy: RedemptionPolicy,
}

impl Verifier {
    /// Creates a verifier with the default redemption policy.
    ///
    /// # Arguments
    /// * `resolver` - DID registry used to look up issuer and holder keys
    /// * `signer` - Signature algorithm implementation
    /// * `challenges` - Challenge table owned by this verifier
    pub fn new(
        resolver: Arc<dyn DidResolver>,
        signer: Arc<dyn Signer>,
        challenges: Arc<ChallengeManager>,
    ) -> Self {
        Verifier {
            resolver,
            signer,
            challenges,
            policy: RedemptionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RedemptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RedemptionPolicy {
        self.policy
    }

    pub fn challenges(&self) -> &ChallengeManager {
        &self.challenges
    }

    /// Issues a fresh challenge addressed to this verifier.
    pub fn request_challenge(&self, kind: ChallengeKind) -> Challenge {
        self.challenges.issue_challenge(kind)
    }

    /// Verifies a presentation against the challenge `(expected_audience, expected_nonce)`.
    ///
    /// # Returns
    /// The full checklist. Semantic failures (bad signature, expiry, mismatch) are reported
    /// inside the [`CheckResult`], never as `Err`.
    ///
    /// # Errors
    /// `MalformedToken` when the outer presentation cannot be parsed at all.
    pub fn verify_presentation(
        &self,
        token: &str,
        expected_audience: &str,
        expected_nonce: &str,
    ) -> Result<CheckResult> {
        self.verify_presentation_at(token, expected_audience, expected_nonce, now())
    }

    /// Same as [`Verifier::verify_presentation`] with an explicit clock.
    pub fn verify_presentation_at(
        &self,
        token: &str,
        expected_audience: &str,
        expected_nonce: &str,
        at: DateTime<Utc>,
    ) -> Result<CheckResult> {
        let vp_token = decode_vp(token)?;
        let vp = &vp_token.claims;
        let mut result = CheckResult {
            holder: Some(vp.holder.clone()),
            ..Default::default()
        };

        // Holder signature
        result.vp_signature_valid =
            self.signature_check(&vp_token, &vp.holder, "presentation", &mut result);

        // Presentation lifetime
        result.vp_not_expired = lifetime_check(
            "presentation",
            vp.is_not_yet_valid_at(at),
            vp.is_expired_at(at),
            ErrorKind::ExpiredPresentation,
            &mut result,
        );

        // Challenge binding
        result.aud_nonce_valid = if !vp.is_addressed_to(expected_audience)
            || vp.nonce != expected_nonce
        {
            result.record(
                ErrorKind::ChallengeMismatch,
                "presentation is bound to a different audience or nonce",
            );
            Check::Failed
        } else if !self
            .challenges
            .is_outstanding_at(expected_nonce, expected_audience, at)
        {
            result.record(
                ErrorKind::ChallengeMismatch,
                "challenge is unknown, expired or already used",
            );
            Check::Failed
        } else {
            match self.policy {
                RedemptionPolicy::OnChallengeMatch if result.vp_signature_valid.passed() => {
                    self.redeem(expected_nonce, expected_audience, at, &mut result)
                }
                // Unsigned attempts leave the challenge outstanding; full-success redemption
                // happens after every other check.
                _ => Check::Passed,
            }
        };

        // Embedded credentials
        let mut signatures = Vec::with_capacity(vp.credentials.len());
        let mut lifetimes = Vec::with_capacity(vp.credentials.len());
        let mut holders = Vec::with_capacity(vp.credentials.len());
        for (index, vc_token) in vp.credentials.iter().enumerate() {
            let vc_token = match decode_vc(vc_token) {
                Ok(vc_token) => vc_token,
                Err(e) => {
                    result.record(ErrorKind::MalformedToken, format!("credential #{}: {}", index, e));
                    signatures.push(Check::Failed);
                    lifetimes.push(Check::NotChecked);
                    holders.push(Check::NotChecked);
                    continue;
                }
            };
            let vc = &vc_token.claims;
            let what = format!("credential #{}", index);
            signatures.push(self.signature_check(&vc_token, &vc.issuer, &what, &mut result));

            lifetimes.push(lifetime_check(
                &format!("{} ({})", what, vc.credential_type),
                vc.is_not_yet_valid_at(at),
                vc.is_expired_at(at),
                ErrorKind::ExpiredCredential,
                &mut result,
            ));

            let same_holder = Check::from_bool(vc.subject == vp.holder);
            if same_holder.failed() {
                result.record(
                    ErrorKind::HolderMismatch,
                    format!("{} subject {} is not the holder", what, vc.subject),
                );
            }
            holders.push(same_holder);
            result.credentials.push(vc_token.claims);
        }
        result.vc_valid = Check::all(signatures);
        result.vc_not_expired = Check::all(lifetimes);
        result.holder_did_match = Check::all(holders);

        result.finalize();
        if result.valid && self.policy == RedemptionPolicy::OnFullSuccess {
            result.aud_nonce_valid = self.redeem(expected_nonce, expected_audience, at, &mut result);
            result.finalize();
        }

        info!(
            "presentation from {} for {}: valid={}",
            vp.holder, expected_audience, result.valid
        );
        if let Some(error) = &result.error {
            debug!("first failure: {}", error);
        }
        Ok(result)
    }

    /// Checks a single credential token: issuer signature and lifetime.
    ///
    /// # Errors
    /// `MalformedToken` when the token cannot be parsed.
    pub fn verify_credential(&self, token: &str) -> Result<CredentialReport> {
        self.verify_credential_at(token, now())
    }

    pub fn verify_credential_at(&self, token: &str, at: DateTime<Utc>) -> Result<CredentialReport> {
        let vc_token = decode_vc(token)?;
        let mut scratch = CheckResult::default();
        let signature_valid =
            self.signature_check(&vc_token, &vc_token.claims.issuer, "credential", &mut scratch);
        let not_expired = lifetime_check(
            "credential",
            vc_token.claims.is_not_yet_valid_at(at),
            vc_token.claims.is_expired_at(at),
            ErrorKind::ExpiredCredential,
            &mut scratch,
        );
        Ok(CredentialReport {
            valid: signature_valid.passed() && not_expired.passed(),
            signature_valid,
            not_expired,
            failures: scratch.failures,
            credential: vc_token.claims,
        })
    }

    /// Checks a token signature against the key registered for `signer_did`, recording the
    /// reason on failure.
    fn signature_check<T>(
        &self,
        token: &SignedToken<T>,
        signer_did: &str,
        what: &str,
        result: &mut CheckResult,
    ) -> Check {
        if token.header.kid != signer_did {
            result.record(
                ErrorKind::InvalidSignature,
                format!("{} key id {} does not name its signer", what, token.header.kid),
            );
            return Check::Failed;
        }
        let public_key = match self.resolver.resolve(signer_did) {
            Ok(key) => key,
            Err(Error::UnknownDid(did)) => {
                result.record(
                    ErrorKind::UnknownIssuerOrHolder,
                    format!("{} signer {} is not registered", what, did),
                );
                return Check::Failed;
            }
            Err(e) => {
                warn!("resolution of {} failed: {}", signer_did, e);
                result.record(e.kind(), format!("{}: {}", what, e));
                return Check::Failed;
            }
        };
        if token.verify_with(self.signer.as_ref(), &public_key) {
            Check::Passed
        } else {
            result.record(
                ErrorKind::InvalidSignature,
                format!("{} signature does not verify", what),
            );
            Check::Failed
        }
    }

    fn redeem(&self, nonce: &str, audience: &str, at: DateTime<Utc>, result: &mut CheckResult) -> Check {
        if self.challenges.redeem_at(nonce, audience, at) {
            Check::Passed
        } else {
            result.record(ErrorKind::ChallengeMismatch, "challenge was already used");
            Check::Failed
        }
    }
}

/// A token is usable from its `nbf` until just before its `exp`. Using it early is reported
/// as `NotYetValid`, late as `expired_kind`.
fn lifetime_check(
    what: &str,
    not_yet_valid: bool,
    expired: bool,
    expired_kind: ErrorKind,
    result: &mut CheckResult,
) -> Check {
    if not_yet_valid {
        result.record(ErrorKind::NotYetValid, format!("{} is not valid yet", what));
        Check::Failed
    } else if expired {
        result.record(expired_kind, format!("{} has expired", what));
        Check::Failed
    } else {
        Check::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::token::{decode, encode};
    use crate::config::ChallengeSettings;
    use crate::models::presentation::Presentation;
    use crate::registry::did_registry::InMemoryDidRegistry;
    use crate::services::credential_issuer::CredentialIssuer;
    use crate::utils::serialization::b64url_encode;
    use crate::wallet::key_management::{default_signer, Actor, KeyPair};
    use chrono::Duration;
    use serde_json::{json, Map, Value};

    struct Fixture {
        registry: Arc<InMemoryDidRegistry>,
        engine: CredentialIssuer,
        issuer: Actor,
        alice: Actor,
        verifier: Verifier,
    }

    fn fixture(policy: RedemptionPolicy) -> Fixture {
        let registry = Arc::new(InMemoryDidRegistry::new(default_signer()));
        let register = |did: &str| {
            let actor = Actor::new(did.parse().unwrap(), KeyPair::generate());
            registry
                .register(actor.did.clone(), actor.keys.public_key.clone())
                .unwrap();
            actor
        };
        let issuer = register("did:demo:issuer1");
        let alice = register("did:demo:alice");
        let challenges = Arc::new(ChallengeManager::new(
            "did:demo:rentacar",
            &ChallengeSettings {
                ttl_secs: 300,
                nonce_bytes: 16,
            },
        ));
        let verifier =
            Verifier::new(registry.clone(), default_signer(), challenges).with_policy(policy);
        Fixture {
            registry,
            engine: CredentialIssuer::new(default_signer()),
            issuer,
            alice,
            verifier,
        }
    }

    fn license(f: &Fixture, subject: &str, ttl_secs: u64) -> String {
        let mut claims = Map::new();
        claims.insert("licenseType".into(), json!("Type-1"));
        f.engine
            .issue_credential(&f.issuer, subject, "DriverLicense", claims, ttl_secs)
            .unwrap()
    }

    fn present(f: &Fixture, vcs: &[String], challenge: &Challenge) -> String {
        f.engine
            .create_presentation(&f.alice, vcs, &challenge.audience, &challenge.nonce, vcs.is_empty())
            .unwrap()
    }

    #[test]
    fn end_to_end_presentation_passes() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &[license(&f, "did:demo:alice", 300)], &challenge);

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(result.valid, "{:?}", result.failures);
        assert_eq!(result.vp_signature_valid, Check::Passed);
        assert_eq!(result.vp_not_expired, Check::Passed);
        assert_eq!(result.aud_nonce_valid, Check::Passed);
        assert_eq!(result.vc_valid, Check::Passed);
        assert_eq!(result.vc_not_expired, Check::Passed);
        assert_eq!(result.holder_did_match, Check::Passed);
        assert_eq!(result.holder.as_deref(), Some("did:demo:alice"));
        assert_eq!(result.credentials[0].claim("licenseType"), Some(&json!("Type-1")));
        assert!(result.error.is_none());
    }

    #[test]
    fn challenge_is_single_use() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &[license(&f, "did:demo:alice", 300)], &challenge);

        let first = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(first.valid);
        let replay = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!replay.valid);
        assert_eq!(replay.aud_nonce_valid, Check::Failed);
        assert_eq!(replay.vp_signature_valid, Check::Passed);
        assert!(replay.has_failure(ErrorKind::ChallengeMismatch));
    }

    #[test]
    fn unissued_nonce_is_rejected() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let forged = Challenge {
            audience: "did:demo:rentacar".into(),
            nonce: "made-up".into(),
            kind: ChallengeKind::Presentation,
            issued_at: now(),
            expires_at: None,
            consumed: false,
        };
        let vp = present(&f, &[license(&f, "did:demo:alice", 300)], &forged);
        let result = f
            .verifier
            .verify_presentation(&vp, "did:demo:rentacar", "made-up")
            .unwrap();
        assert_eq!(result.aud_nonce_valid, Check::Failed);
        assert!(!result.valid);
    }

    #[test]
    fn wrong_audience_or_nonce_does_not_consume() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &[license(&f, "did:demo:alice", 300)], &challenge);

        let result = f
            .verifier
            .verify_presentation(&vp, "did:demo:other", &challenge.nonce)
            .unwrap();
        assert_eq!(result.aud_nonce_valid, Check::Failed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::ChallengeMismatch));
        assert!(f
            .verifier
            .challenges()
            .is_outstanding_at(&challenge.nonce, &challenge.audience, now()));
    }

    #[test]
    fn expired_credential_fails_only_expiry() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vc = license(&f, "did:demo:alice", 60);
        let vp = present(&f, &[vc], &challenge);

        // One second before exp still passes.
        let exp = decode_vc(&vp_first_credential(&vp)).unwrap().claims.expires_at.unwrap();
        let before = f
            .verifier
            .verify_credential_at(&vp_first_credential(&vp), exp - Duration::seconds(1))
            .unwrap();
        assert_eq!(before.not_expired, Check::Passed);

        // Presentation lifetime is 120s, credential 60s: at exp the VP is still fresh.
        let result = f
            .verifier
            .verify_presentation_at(&vp, &challenge.audience, &challenge.nonce, exp)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.vc_not_expired, Check::Failed);
        assert_eq!(result.vc_valid, Check::Passed);
        assert_eq!(result.vp_not_expired, Check::Passed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::ExpiredCredential));
    }

    fn vp_first_credential(vp: &str) -> String {
        decode_vp(vp).unwrap().claims.credentials[0].clone()
    }

    #[test]
    fn expired_presentation_is_reported() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &[license(&f, "did:demo:alice", 0)], &challenge);
        let exp = decode_vp(&vp).unwrap().claims.expires_at.unwrap();

        let result = f
            .verifier
            .verify_presentation_at(&vp, &challenge.audience, &challenge.nonce, exp + Duration::seconds(1))
            .unwrap();
        assert_eq!(result.vp_not_expired, Check::Failed);
        assert_eq!(result.vc_not_expired, Check::Passed);
        assert!(result.has_failure(ErrorKind::ExpiredPresentation));
    }

    #[test]
    fn credential_for_someone_else_is_holder_mismatch() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &[license(&f, "did:demo:bob", 300)], &challenge);

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.holder_did_match, Check::Failed);
        assert_eq!(result.vc_valid, Check::Passed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::HolderMismatch));
    }

    #[test]
    fn tampered_payload_never_verifies() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &[license(&f, "did:demo:alice", 300)], &challenge);

        // Swap the payload for an edited one, keeping header and signature.
        let parts: Vec<&str> = vp.split('.').collect();
        let mut payload: Value = decode::<Value>(&vp).unwrap().claims;
        payload["iss"] = json!("did:demo:alice");
        payload["jti"] = json!("edited");
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            b64url_encode(&serde_json::to_vec(&payload).unwrap()),
            parts[2]
        );
        let result = f
            .verifier
            .verify_presentation(&tampered, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.vp_signature_valid, Check::Failed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::InvalidSignature));
        // An unsigned attempt leaves the challenge usable.
        assert!(f
            .verifier
            .challenges()
            .is_outstanding_at(&challenge.nonce, &challenge.audience, now()));

        // Flipping a byte of the signature segment either breaks parsing or the signature.
        let mut bytes = vp.into_bytes();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let flipped = String::from_utf8(bytes).unwrap();
        match f
            .verifier
            .verify_presentation(&flipped, &challenge.audience, &challenge.nonce)
        {
            Ok(result) => {
                assert_eq!(result.vp_signature_valid, Check::Failed);
                assert!(!result.valid);
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::MalformedToken),
        }
    }

    #[test]
    fn tampered_embedded_credential_fails_vc_signature() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vc = license(&f, "did:demo:alice", 300);

        // Upgrade the license class, keep the issuer's header and signature.
        let parts: Vec<&str> = vc.split('.').collect();
        let mut payload: Value = decode::<Value>(&vc).unwrap().claims;
        payload["vc"]["credentialSubject"]["licenseType"] = json!("Type-A-Commercial");
        let edited = format!(
            "{}.{}.{}",
            parts[0],
            b64url_encode(&serde_json::to_vec(&payload).unwrap()),
            parts[2]
        );

        // The holder re-wraps it in a correctly signed presentation.
        let vp = present(&f, &[edited], &challenge);
        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert_eq!(result.vp_signature_valid, Check::Passed);
        assert_eq!(result.vc_valid, Check::Failed);
        assert!(!result.valid);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::InvalidSignature));
    }

    fn future_license(f: &Fixture, starts_in: Duration) -> String {
        let issued_at = now() + starts_in;
        let credential = Credential {
            id: "vc-future".into(),
            issuer: "did:demo:issuer1".into(),
            subject: "did:demo:alice".into(),
            credential_type: "DriverLicense".into(),
            claims: Map::new(),
            issued_at,
            not_before: issued_at,
            expires_at: Some(issued_at + Duration::days(30)),
        };
        f.engine.sign_credential(&credential, &f.issuer).unwrap()
    }

    #[test]
    fn credential_from_the_future_is_not_yet_valid() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vc = future_license(&f, Duration::days(365));
        let vp = present(&f, &[vc.clone()], &challenge);

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.vc_valid, Check::Passed);
        assert_eq!(result.vc_not_expired, Check::Failed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::NotYetValid));

        let report = f.verifier.verify_credential(&vc).unwrap();
        assert!(!report.valid);
        assert_eq!(report.not_expired, Check::Failed);
        let later = now() + Duration::days(366);
        assert!(f.verifier.verify_credential_at(&vc, later).unwrap().valid);
    }

    #[test]
    fn presentation_from_the_future_is_not_yet_valid() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Authentication);
        let issued_at = now() + Duration::hours(1);
        let presentation = Presentation {
            id: "vp-future".into(),
            holder: "did:demo:alice".into(),
            credentials: vec![],
            audience: vec![challenge.audience.clone()],
            nonce: challenge.nonce.clone(),
            issued_at,
            not_before: issued_at,
            expires_at: Some(issued_at + Duration::seconds(120)),
        };
        let vp = f.engine.sign_presentation(&presentation, &f.alice).unwrap();

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.vp_not_expired, Check::Failed);
        assert!(result.has_failure(ErrorKind::NotYetValid));
    }

    #[test]
    fn credential_expiring_at_issue_is_malformed() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let iat = now().timestamp();
        let payload = json!({
            "iss": "did:demo:issuer1", "sub": "did:demo:alice", "jti": "x",
            "iat": iat, "nbf": iat, "exp": iat,
            "vc": {"@context": [], "type": ["VerifiableCredential", "DriverLicense"],
                   "credentialSubject": {}}
        });
        let header = crate::codec::token::Header::new("ES256K", "did:demo:issuer1");
        let vc = encode(&header, &payload, &*default_signer(), f.issuer.keys.private_key()).unwrap();
        let vp = present(&f, &[vc], &challenge);

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.vc_valid, Check::Failed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::MalformedToken));
    }

    #[test]
    fn audience_list_matches_any_member() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Authentication);
        let issued_at = now();
        let presentation = Presentation {
            id: "vp-multi".into(),
            holder: "did:demo:alice".into(),
            credentials: vec![],
            audience: vec!["did:demo:car".into(), challenge.audience.clone()],
            nonce: challenge.nonce.clone(),
            issued_at,
            not_before: issued_at,
            expires_at: Some(issued_at + Duration::seconds(120)),
        };
        let vp = f.engine.sign_presentation(&presentation, &f.alice).unwrap();

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(result.valid, "{:?}", result.failures);
        assert_eq!(result.aud_nonce_valid, Check::Passed);
    }

    #[test]
    fn unknown_holder_is_reported() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Authentication);
        let mallory = Actor::new("did:demo:mallory".parse().unwrap(), KeyPair::generate());
        let vp = f
            .engine
            .create_presentation(&mallory, &[], &challenge.audience, &challenge.nonce, true)
            .unwrap();

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert_eq!(result.vp_signature_valid, Check::Failed);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::UnknownIssuerOrHolder));
    }

    #[test]
    fn rotated_key_invalidates_old_signatures() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Authentication);
        let vp = present(&f, &[], &challenge);

        let next = KeyPair::generate();
        let proof = default_signer()
            .sign(f.alice.keys.private_key(), next.public_key.as_bytes())
            .unwrap();
        f.registry
            .rotate_key("did:demo:alice", next.public_key.clone(), &proof)
            .unwrap();

        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert_eq!(result.vp_signature_valid, Check::Failed);
        assert!(!result.valid);
    }

    #[test]
    fn simple_presentation_checks_are_vacuous() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Authentication);
        let vp = present(&f, &[], &challenge);
        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(result.valid);
        assert_eq!(result.vc_valid, Check::Passed);
        assert!(result.credentials.is_empty());
    }

    #[test]
    fn malformed_embedded_credential_is_a_check_failure() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let vp = present(&f, &["not-a-token".to_string()], &challenge);
        let result = f
            .verifier
            .verify_presentation(&vp, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert_eq!(result.vc_valid, Check::Failed);
        assert_eq!(result.vc_not_expired, Check::NotChecked);
        assert_eq!(result.holder_did_match, Check::NotChecked);
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::MalformedToken));
    }

    #[test]
    fn malformed_presentation_is_an_error() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let err = f.verifier.verify_presentation("a.b", "aud", "n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedToken);
    }

    #[test]
    fn full_success_policy_allows_retry() {
        let f = fixture(RedemptionPolicy::OnFullSuccess);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);

        let bad = present(&f, &[license(&f, "did:demo:bob", 300)], &challenge);
        let result = f
            .verifier
            .verify_presentation(&bad, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!result.valid);

        let good = present(&f, &[license(&f, "did:demo:alice", 300)], &challenge);
        let result = f
            .verifier
            .verify_presentation(&good, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(result.valid, "{:?}", result.failures);
        assert!(!f
            .verifier
            .challenges()
            .is_outstanding_at(&challenge.nonce, &challenge.audience, now()));
    }

    #[test]
    fn challenge_match_policy_consumes_on_failed_credentials() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let challenge = f.verifier.request_challenge(ChallengeKind::Presentation);
        let bad = present(&f, &[license(&f, "did:demo:bob", 300)], &challenge);
        f.verifier
            .verify_presentation(&bad, &challenge.audience, &challenge.nonce)
            .unwrap();
        assert!(!f
            .verifier
            .challenges()
            .is_outstanding_at(&challenge.nonce, &challenge.audience, now()));
    }

    #[test]
    fn standalone_credential_report() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let report = f.verifier.verify_credential(&license(&f, "did:demo:alice", 300)).unwrap();
        assert!(report.valid);
        assert_eq!(report.credential.issuer, "did:demo:issuer1");

        // Signed by a key the registry does not know.
        let stranger = Actor::new("did:demo:issuer1".parse().unwrap(), KeyPair::generate());
        let forged = f
            .engine
            .issue_credential(&stranger, "did:demo:alice", "DriverLicense", Map::new(), 300)
            .unwrap();
        let report = f.verifier.verify_credential(&forged).unwrap();
        assert_eq!(report.signature_valid, Check::Failed);
        assert!(!report.valid);
    }

    #[test]
    fn kid_must_name_the_signer() {
        let f = fixture(RedemptionPolicy::OnChallengeMatch);
        let token = license(&f, "did:demo:alice", 300);
        let decoded = decode_vc(&token).unwrap();
        let mut header = decoded.header.clone();
        header.kid = "did:demo:alice".into();
        let payload: Value = decode::<Value>(&token).unwrap().claims;
        let resigned = encode(&header, &payload, &*default_signer(), f.issuer.keys.private_key()).unwrap();
        let report = f.verifier.verify_credential(&resigned).unwrap();
        assert_eq!(report.signature_valid, Check::Failed);
    }
}
