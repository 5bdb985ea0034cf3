// src/services/demo_flow.rs
//! Issuer and verifier side of the car rental demo.
//!
//! Three fixed actors take part:
//! - the license issuer authenticates a holder with a simple presentation and issues a
//!   `DriverLicenseCredential`
//! - the rental company accepts a presentation of that license and issues a
//!   `RentalCarAgreementCredential`
//! - the car accepts a presentation of the rental agreement and grants access
//!
//! A fourth, general verifier backs the generic challenge / verify endpoints. Each actor owns
//! its own challenge table, so a nonce issued by one can never be redeemed at another.

use crate::config::Settings;
use crate::error::{Error, ErrorKind, Result};
use crate::models::challenge::{Challenge, ChallengeKind};
use crate::models::check::{CheckResult, Failure, IssueResult};
use crate::models::did::{Did, DidDocument};
use crate::registry::did_registry::InMemoryDidRegistry;
use crate::services::challenge_manager::ChallengeManager;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::verifier::{CredentialReport, Verifier};
use crate::utils::crypto::random_token;
use crate::wallet::key_management::{Actor, KeyPair, PublicKey, Signer};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const DRIVER_LICENSE_CREDENTIAL: &str = "DriverLicenseCredential";
pub const RENTAL_AGREEMENT_CREDENTIAL: &str = "RentalCarAgreementCredential";

/// DIDs of the demo actors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DemoActors {
    pub license_issuer_did: String,
    pub rental_company_did: String,
    pub car_did: String,
    pub verifier_did: String,
}

/// Request to issue a driver license against a simple presentation.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IssueLicenseRequest {
    pub holder_did: String,
    pub simple_vp_jwt: String,
    pub expected_aud: String,
    pub expected_nonce: String,
    #[serde(default)]
    pub expires_in_minutes: u64,
    /// Takes precedence over `expires_in_minutes`
    #[serde(default)]
    pub expires_in_seconds: u64,
}

/// Request to issue a rental agreement against a presentation of the license.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IssueRentalRequest {
    pub vp_jwt: String,
    pub expected_aud: String,
    pub expected_nonce: String,
    #[serde(default)]
    pub expires_in_minutes: u64,
    #[serde(default)]
    pub expires_in_seconds: u64,
}

/// A presentation answering a previously issued challenge.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VerifyPresentationRequest {
    pub vp_jwt: String,
    pub expected_aud: String,
    pub expected_nonce: String,
}

/// The car's answer to an access attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub granted: bool,
    pub checks: CheckResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Failure>,
}

/// Operations a holder needs from the demo services, in-process or over HTTP.
#[async_trait]
pub trait DemoBackend: Send + Sync {
    /// Registers `public_key` and returns the new DID string.
    async fn create_did(&self, method: &str, public_key: &PublicKey) -> Result<String>;

    /// Rotates the key registered for `did`; `proof` is signed by the current key.
    async fn rotate_key(&self, did: &str, new_key: &PublicKey, proof: &[u8]) -> Result<()>;

    async fn actors(&self) -> Result<DemoActors>;

    async fn license_challenge(&self) -> Result<Challenge>;

    async fn issue_license(&self, request: &IssueLicenseRequest) -> Result<IssueResult>;

    async fn rental_challenge(&self) -> Result<Challenge>;

    async fn issue_rental(&self, request: &IssueRentalRequest) -> Result<IssueResult>;

    async fn access_challenge(&self) -> Result<Challenge>;

    async fn verify_access(&self, request: &VerifyPresentationRequest) -> Result<AccessDecision>;
}

/// Issuer/verifier services for the demo, sharing one DID registry.
pub struct DemoFlow {
    registry: Arc<InMemoryDidRegistry>,
    engine: CredentialIssuer,
    method: String,
    default_ttl_secs: u64,
    license: Actor,
    rental: Actor,
    license_verifier: Verifier,
    rental_verifier: Verifier,
    access_verifier: Verifier,
    general_verifier: Verifier,
}

impl DemoFlow {
    /// Creates and registers the demo actors.
    ///
    /// # Arguments
    /// * `registry` - DID registry shared with every verifier
    /// * `signer` - Signature algorithm implementation
    /// * `settings` - DID method, challenge, credential and verifier settings
    ///
    /// # Errors
    /// Fails if an actor DID cannot be created.
    pub fn new(
        registry: Arc<InMemoryDidRegistry>,
        signer: Arc<dyn Signer>,
        settings: &Settings,
    ) -> Result<Self> {
        let method = settings.did.method.as_str();
        let license = Self::create_actor(&registry, method, "license-issuer")?;
        let rental = Self::create_actor(&registry, method, "rental-company")?;
        let car = Self::create_actor(&registry, method, "car")?;
        let general = Self::create_actor(&registry, method, "verifier")?;

        let verifier_for = |actor: &Actor| {
            let challenges = Arc::new(ChallengeManager::new(actor.did_string(), &settings.challenge));
            Verifier::new(registry.clone(), signer.clone(), challenges)
                .with_policy(settings.verifier.redemption_policy)
        };
        let license_verifier = verifier_for(&license);
        let rental_verifier = verifier_for(&rental);
        let access_verifier = verifier_for(&car);
        let general_verifier = verifier_for(&general);

        Ok(DemoFlow {
            engine: CredentialIssuer::with_settings(signer.clone(), &settings.credential),
            method: settings.did.method.clone(),
            default_ttl_secs: settings.credential.default_ttl_secs,
            registry,
            license,
            rental,
            license_verifier,
            rental_verifier,
            access_verifier,
            general_verifier,
        })
    }

    fn create_actor(registry: &InMemoryDidRegistry, method: &str, tag: &str) -> Result<Actor> {
        let keys = KeyPair::generate();
        let did = registry.create_did(method, keys.public_key.clone())?;
        info!("demo actor {} is {}", tag, did);
        Ok(Actor::new(did, keys))
    }

    pub fn actors(&self) -> DemoActors {
        DemoActors {
            license_issuer_did: self.license.did_string(),
            rental_company_did: self.rental.did_string(),
            car_did: self.access_verifier.challenges().audience().to_string(),
            verifier_did: self.general_verifier.challenges().audience().to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<InMemoryDidRegistry> {
        &self.registry
    }

    /// Registers a holder key under `method` (the configured method when empty).
    pub fn create_did(&self, method: &str, public_key: PublicKey) -> Result<Did> {
        let method = if method.is_empty() { self.method.as_str() } else { method };
        self.registry.create_did(method, public_key)
    }

    pub fn resolve_did(&self, did: &str) -> Result<DidDocument> {
        self.registry.resolve_document(did)
    }

    pub fn rotate_key(&self, did: &str, new_key: PublicKey, proof: &[u8]) -> Result<DidDocument> {
        self.registry.rotate_key(did, new_key, proof)
    }

    pub fn license_challenge(&self) -> Challenge {
        self.license_verifier.request_challenge(ChallengeKind::Authentication)
    }

    pub fn rental_challenge(&self) -> Challenge {
        self.rental_verifier.request_challenge(ChallengeKind::Presentation)
    }

    pub fn access_challenge(&self) -> Challenge {
        self.access_verifier.request_challenge(ChallengeKind::Presentation)
    }

    /// Challenge from the general verifier.
    pub fn request_challenge(&self, kind: ChallengeKind) -> Challenge {
        self.general_verifier.request_challenge(kind)
    }

    /// Verifies a presentation against the general verifier's challenges.
    pub fn verify_presentation(&self, request: &VerifyPresentationRequest) -> Result<CheckResult> {
        self.general_verifier.verify_presentation(
            &request.vp_jwt,
            &request.expected_aud,
            &request.expected_nonce,
        )
    }

    pub fn verify_credential(&self, token: &str) -> Result<CredentialReport> {
        self.general_verifier.verify_credential(token)
    }

    /// Drops expired and used challenges from every verifier.
    pub fn purge_expired(&self) -> usize {
        [
            &self.license_verifier,
            &self.rental_verifier,
            &self.access_verifier,
            &self.general_verifier,
        ]
        .iter()
        .map(|v| v.challenges().purge_expired())
        .sum()
    }

    /// Issues a driver license to `holder_did` after DID authentication.
    ///
    /// The simple presentation must be signed by `holder_did`, answer a challenge from the
    /// license issuer, and carry no credentials.
    pub fn issue_license(&self, request: &IssueLicenseRequest) -> IssueResult {
        if request.holder_did.is_empty() || request.simple_vp_jwt.is_empty() {
            return IssueResult::rejected(
                CheckResult::default(),
                ErrorKind::InvalidInput,
                "holder_did and simple_vp_jwt are required",
            );
        }
        let checks = match self.license_verifier.verify_presentation(
            &request.simple_vp_jwt,
            &request.expected_aud,
            &request.expected_nonce,
        ) {
            Ok(checks) => checks,
            Err(e) => return IssueResult::rejected(CheckResult::default(), e.kind(), e.to_string()),
        };
        if !checks.valid {
            let kind = checks.first_failure_kind().unwrap_or(ErrorKind::InvalidInput);
            let message = format!(
                "simple presentation invalid: {}",
                checks.error.as_deref().unwrap_or("unknown")
            );
            return IssueResult::rejected(checks, kind, message);
        }
        if !checks.credentials.is_empty() {
            return IssueResult::rejected(
                checks,
                ErrorKind::InvalidInput,
                "license issuance expects a simple presentation",
            );
        }
        if checks.holder.as_deref() != Some(request.holder_did.as_str()) {
            return IssueResult::rejected(checks, ErrorKind::HolderMismatch, "holder did mismatch");
        }

        let mut claims = Map::new();
        claims.insert("holderDid".into(), json!(request.holder_did));
        claims.insert("licenseType".into(), json!("Type-1"));
        claims.insert("country".into(), json!("KR"));
        let ttl = self.requested_ttl(request.expires_in_seconds, request.expires_in_minutes);
        self.issue(checks, &self.license, &request.holder_did, DRIVER_LICENSE_CREDENTIAL, claims, ttl)
    }

    /// Issues a rental agreement to the holder of a valid driver license.
    pub fn issue_rental(&self, request: &IssueRentalRequest) -> IssueResult {
        if request.vp_jwt.is_empty() {
            return IssueResult::rejected(
                CheckResult::default(),
                ErrorKind::InvalidInput,
                "vp_jwt is required",
            );
        }
        let checks = match self.rental_verifier.verify_presentation(
            &request.vp_jwt,
            &request.expected_aud,
            &request.expected_nonce,
        ) {
            Ok(checks) => checks,
            Err(e) => return IssueResult::rejected(CheckResult::default(), e.kind(), e.to_string()),
        };
        if !checks.valid {
            let kind = checks.first_failure_kind().unwrap_or(ErrorKind::InvalidInput);
            let message = format!(
                "vp or vc invalid: {}",
                checks.error.as_deref().unwrap_or("unknown")
            );
            return IssueResult::rejected(checks, kind, message);
        }
        if let Err(reason) = require_credential(&checks, DRIVER_LICENSE_CREDENTIAL, &self.license) {
            return IssueResult::rejected(checks, reason.kind, reason.message);
        }
        let Some(holder) = checks.holder.clone() else {
            return IssueResult::rejected(checks, ErrorKind::InvalidInput, "holder did missing");
        };

        let mut claims = Map::new();
        claims.insert("holderDid".into(), json!(holder));
        claims.insert("agreementId".into(), json!(format!("rent-{}", random_token(6))));
        claims.insert("validDays".into(), Value::from(1));
        let ttl = self.requested_ttl(request.expires_in_seconds, request.expires_in_minutes);
        self.issue(checks, &self.rental, &holder, RENTAL_AGREEMENT_CREDENTIAL, claims, ttl)
    }

    /// Decides whether the presenter may access the car.
    ///
    /// # Errors
    /// `MalformedToken` when the presentation cannot be parsed.
    pub fn verify_access(&self, request: &VerifyPresentationRequest) -> Result<AccessDecision> {
        if request.vp_jwt.is_empty() {
            return Err(Error::InvalidInput("vp_jwt is required".into()));
        }
        let checks = self.access_verifier.verify_presentation(
            &request.vp_jwt,
            &request.expected_aud,
            &request.expected_nonce,
        )?;
        let reason = if !checks.valid {
            checks.failures.first().cloned()
        } else {
            require_credential(&checks, RENTAL_AGREEMENT_CREDENTIAL, &self.rental).err()
        };
        let granted = reason.is_none();
        info!(
            "car access for {}: {}",
            checks.holder.as_deref().unwrap_or("-"),
            if granted { "granted" } else { "denied" }
        );
        Ok(AccessDecision {
            granted,
            checks,
            reason,
        })
    }

    fn issue(
        &self,
        checks: CheckResult,
        issuer: &Actor,
        subject: &str,
        credential_type: &str,
        claims: Map<String, Value>,
        ttl_secs: u64,
    ) -> IssueResult {
        match self
            .engine
            .issue_credential(issuer, subject, credential_type, claims, ttl_secs)
        {
            Ok(token) => IssueResult::issued(checks, token),
            Err(e) => {
                warn!("{} issuance failed: {}", credential_type, e);
                IssueResult::rejected(checks, e.kind(), e.to_string())
            }
        }
    }

    /// Seconds win over minutes; neither falls back to the configured default.
    fn requested_ttl(&self, seconds: u64, minutes: u64) -> u64 {
        if seconds > 0 {
            seconds
        } else if minutes > 0 {
            minutes.saturating_mul(60)
        } else {
            self.default_ttl_secs
        }
    }
}

/// Requires a verified credential of `credential_type` issued by `issuer`.
fn require_credential(
    checks: &CheckResult,
    credential_type: &str,
    issuer: &Actor,
) -> std::result::Result<(), Failure> {
    let issuer_did = issuer.did_string();
    let found = checks
        .credentials
        .iter()
        .any(|c| c.credential_type == credential_type && c.issuer == issuer_did);
    if found {
        Ok(())
    } else {
        Err(Failure {
            kind: ErrorKind::UntrustedCredential,
            message: format!("no {} issued by {}", credential_type, issuer_did),
        })
    }
}

#[async_trait]
impl DemoBackend for DemoFlow {
    async fn create_did(&self, method: &str, public_key: &PublicKey) -> Result<String> {
        DemoFlow::create_did(self, method, public_key.clone()).map(|did| did.to_string())
    }

    async fn rotate_key(&self, did: &str, new_key: &PublicKey, proof: &[u8]) -> Result<()> {
        DemoFlow::rotate_key(self, did, new_key.clone(), proof).map(|_| ())
    }

    async fn actors(&self) -> Result<DemoActors> {
        Ok(DemoFlow::actors(self))
    }

    async fn license_challenge(&self) -> Result<Challenge> {
        Ok(DemoFlow::license_challenge(self))
    }

    async fn issue_license(&self, request: &IssueLicenseRequest) -> Result<IssueResult> {
        Ok(DemoFlow::issue_license(self, request))
    }

    async fn rental_challenge(&self) -> Result<Challenge> {
        Ok(DemoFlow::rental_challenge(self))
    }

    async fn issue_rental(&self, request: &IssueRentalRequest) -> Result<IssueResult> {
        Ok(DemoFlow::issue_rental(self, request))
    }

    async fn access_challenge(&self) -> Result<Challenge> {
        Ok(DemoFlow::access_challenge(self))
    }

    async fn verify_access(&self, request: &VerifyPresentationRequest) -> Result<AccessDecision> {
        DemoFlow::verify_access(self, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vc::decode_vc;
    use crate::wallet::key_management::default_signer;

    struct Harness {
        flow: DemoFlow,
        engine: CredentialIssuer,
        alice: Actor,
    }

    fn harness() -> Harness {
        let registry = Arc::new(InMemoryDidRegistry::new(default_signer()));
        let flow = DemoFlow::new(registry, default_signer(), &Settings::default()).unwrap();
        let keys = KeyPair::generate();
        let did = flow.create_did("demo", keys.public_key.clone()).unwrap();
        Harness {
            flow,
            engine: CredentialIssuer::new(default_signer()),
            alice: Actor::new(did, keys),
        }
    }

    fn license_for(h: &Harness) -> String {
        let challenge = h.flow.license_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[], &challenge.audience, &challenge.nonce, true)
            .unwrap();
        let result = h.flow.issue_license(&IssueLicenseRequest {
            holder_did: h.alice.did_string(),
            simple_vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            ..Default::default()
        });
        result.token().unwrap().to_string()
    }

    fn rental_for(h: &Harness, license: String) -> IssueResult {
        let challenge = h.flow.rental_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[license], &challenge.audience, &challenge.nonce, false)
            .unwrap();
        h.flow.issue_rental(&IssueRentalRequest {
            vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            expires_in_seconds: 90,
            ..Default::default()
        })
    }

    #[test]
    fn actors_are_registered() {
        let h = harness();
        let actors = h.flow.actors();
        for did in [
            &actors.license_issuer_did,
            &actors.rental_company_did,
            &actors.car_did,
            &actors.verifier_did,
        ] {
            assert!(did.starts_with("did:demo:"));
            assert!(h.flow.resolve_did(did).is_ok());
        }
        assert_eq!(h.flow.registry().len(), 5);
    }

    #[test]
    fn license_is_issued_after_did_auth() {
        let h = harness();
        let token = license_for(&h);
        let vc = decode_vc(&token).unwrap().claims;
        assert_eq!(vc.credential_type, DRIVER_LICENSE_CREDENTIAL);
        assert_eq!(vc.subject, h.alice.did_string());
        assert_eq!(vc.issuer, h.flow.actors().license_issuer_did);
        assert_eq!(vc.claim("country"), Some(&json!("KR")));
        assert_eq!(
            (vc.expires_at.unwrap() - vc.issued_at).num_seconds(),
            Settings::default().credential.default_ttl_secs as i64
        );
    }

    #[test]
    fn license_requires_matching_holder() {
        let h = harness();
        let challenge = h.flow.license_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[], &challenge.audience, &challenge.nonce, true)
            .unwrap();
        let result = h.flow.issue_license(&IssueLicenseRequest {
            holder_did: "did:demo:bob".into(),
            simple_vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            ..Default::default()
        });
        let failure = result.into_result().unwrap_err();
        assert_eq!(failure.kind, ErrorKind::HolderMismatch);
    }

    #[test]
    fn license_challenge_cannot_be_answered_elsewhere() {
        let h = harness();
        let challenge = h.flow.rental_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[], &challenge.audience, &challenge.nonce, true)
            .unwrap();
        let result = h.flow.issue_license(&IssueLicenseRequest {
            holder_did: h.alice.did_string(),
            simple_vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            ..Default::default()
        });
        assert_eq!(result.checks.aud_nonce_valid, crate::models::check::Check::Failed);
        assert_eq!(
            result.into_result().unwrap_err().kind,
            ErrorKind::ChallengeMismatch
        );
    }

    #[test]
    fn missing_fields_are_rejected() {
        let h = harness();
        let result = h.flow.issue_license(&IssueLicenseRequest::default());
        assert_eq!(result.into_result().unwrap_err().kind, ErrorKind::InvalidInput);
        let result = h.flow.issue_rental(&IssueRentalRequest::default());
        assert_eq!(result.into_result().unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn rental_then_access() {
        let h = harness();
        let license = license_for(&h);
        let rental = rental_for(&h, license).into_result().unwrap();
        let vc = decode_vc(&rental).unwrap().claims;
        assert_eq!(vc.credential_type, RENTAL_AGREEMENT_CREDENTIAL);
        assert_eq!((vc.expires_at.unwrap() - vc.issued_at).num_seconds(), 90);
        assert!(vc.claim("agreementId").unwrap().as_str().unwrap().starts_with("rent-"));

        let challenge = h.flow.access_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[rental], &challenge.audience, &challenge.nonce, false)
            .unwrap();
        let decision = h
            .flow
            .verify_access(&VerifyPresentationRequest {
                vp_jwt: vp,
                expected_aud: challenge.audience,
                expected_nonce: challenge.nonce,
            })
            .unwrap();
        assert!(decision.granted);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn self_issued_license_is_untrusted() {
        let h = harness();
        let forged = h
            .engine
            .issue_credential(
                &h.alice,
                &h.alice.did_string(),
                DRIVER_LICENSE_CREDENTIAL,
                Map::new(),
                300,
            )
            .unwrap();
        let failure = rental_for(&h, forged).into_result().unwrap_err();
        assert_eq!(failure.kind, ErrorKind::UntrustedCredential);
    }

    #[test]
    fn license_does_not_open_the_car() {
        let h = harness();
        let license = license_for(&h);
        let challenge = h.flow.access_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[license], &challenge.audience, &challenge.nonce, false)
            .unwrap();
        let decision = h
            .flow
            .verify_access(&VerifyPresentationRequest {
                vp_jwt: vp,
                expected_aud: challenge.audience,
                expected_nonce: challenge.nonce,
            })
            .unwrap();
        assert!(!decision.granted);
        assert!(decision.checks.valid);
        assert_eq!(decision.reason.unwrap().kind, ErrorKind::UntrustedCredential);
    }

    #[test]
    fn ttl_selection() {
        let h = harness();
        assert_eq!(h.flow.requested_ttl(30, 5), 30);
        assert_eq!(h.flow.requested_ttl(0, 5), 300);
        assert_eq!(h.flow.requested_ttl(0, 0), h.flow.default_ttl_secs);
    }

    #[test]
    fn unrepresentable_expiry_is_rejected() {
        let h = harness();
        let challenge = h.flow.license_challenge();
        let vp = h
            .engine
            .create_presentation(&h.alice, &[], &challenge.audience, &challenge.nonce, true)
            .unwrap();
        let result = h.flow.issue_license(&IssueLicenseRequest {
            holder_did: h.alice.did_string(),
            simple_vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            expires_in_minutes: u64::MAX / 2,
            ..Default::default()
        });
        assert!(result.checks.valid);
        assert_eq!(result.into_result().unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn purge_drops_used_challenges() {
        let h = harness();
        license_for(&h);
        h.flow.license_challenge();
        assert_eq!(h.flow.purge_expired(), 1);
    }

    #[test]
    fn general_verifier_round_trip() {
        let h = harness();
        let challenge = h.flow.request_challenge(ChallengeKind::Authentication);
        assert_eq!(challenge.audience, h.flow.actors().verifier_did);
        let vp = h
            .engine
            .create_presentation(&h.alice, &[], &challenge.audience, &challenge.nonce, true)
            .unwrap();
        let checks = h
            .flow
            .verify_presentation(&VerifyPresentationRequest {
                vp_jwt: vp,
                expected_aud: challenge.audience,
                expected_nonce: challenge.nonce,
            })
            .unwrap();
        assert!(checks.valid);
    }
}
