// src/services/scenario.rs
//! Holder side of the car rental demo.
//!
//! [`Scenario`] walks one holder through DID creation, driver license issuance, rental
//! agreement issuance and the car access check against any [`DemoBackend`]. Every check the
//! services report is kept as a tri-state [`Check`] so a UI can show which steps ran, passed
//! or failed. Issued credentials land in the holder's [`CredentialStorage`].

use crate::config::Settings;
use crate::error::{Error, ErrorKind};
use crate::models::check::{Artifact, Check, Failure, IssueResult};
use crate::models::did::Did;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::demo_flow::{
    DemoBackend, IssueLicenseRequest, IssueRentalRequest, VerifyPresentationRequest,
};
use crate::utils::time::now;
use crate::wallet::credential_storage::CredentialStorage;
use crate::wallet::key_management::{Actor, KeyPair, Signer};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Wallet slot of the driver license.
pub const LICENSE_SLOT: &str = "driver_license";
/// Wallet slot of the rental agreement.
pub const RENTAL_SLOT: &str = "rental_agreement";

/// Per-step checks shown to the holder.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioChecks {
    pub license_did_auth: Check,
    pub license_vc_issued: Check,
    pub rental_vp_signature: Check,
    pub rental_aud_nonce: Check,
    pub rental_vc_integrity: Check,
    pub rental_holder_match: Check,
    pub car_vp_valid: Check,
}

/// Why a scenario step did not complete.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("no DID yet; create one first")]
    NeedDid,

    #[error("no driver license credential; obtain one first")]
    NeedLicense,

    #[error("no rental agreement; obtain one first")]
    NeedRental,

    #[error("DID authentication failed: {0}")]
    DidAuthFailed(Failure),

    #[error("license issuance failed: {0}")]
    LicenseIssueFailed(Failure),

    #[error("rental issuance failed: {0}")]
    RentalIssueFailed(Failure),

    /// The backend or the local wallet failed.
    #[error(transparent)]
    Backend(#[from] Error),
}

/// Result of the car access step.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessOutcome {
    Allowed,
    Denied(Option<Failure>),
}

/// One holder going through the demo.
pub struct Scenario {
    backend: Arc<dyn DemoBackend>,
    engine: CredentialIssuer,
    method: String,
    holder: Option<Actor>,
    wallet: CredentialStorage,
    checks: ScenarioChecks,
}

impl Scenario {
    pub fn new(backend: Arc<dyn DemoBackend>, signer: Arc<dyn Signer>, settings: &Settings) -> Self {
        Scenario {
            backend,
            engine: CredentialIssuer::with_settings(signer, &settings.credential),
            method: settings.did.method.clone(),
            holder: None,
            wallet: CredentialStorage::new(),
            checks: ScenarioChecks::default(),
        }
    }

    pub fn did(&self) -> Option<String> {
        self.holder.as_ref().map(Actor::did_string)
    }

    pub fn checks(&self) -> &ScenarioChecks {
        &self.checks
    }

    pub fn wallet(&self) -> &CredentialStorage {
        &self.wallet
    }

    /// Seconds left on the stored driver license.
    pub fn license_remaining_seconds(&self) -> Option<i64> {
        self.wallet
            .get_credential(LICENSE_SLOT)
            .and_then(|stored| stored.credential.remaining_seconds(now()))
    }

    /// Seconds left on the stored rental agreement.
    pub fn rental_remaining_seconds(&self) -> Option<i64> {
        self.wallet
            .get_credential(RENTAL_SLOT)
            .and_then(|stored| stored.credential.remaining_seconds(now()))
    }

    /// Generates a key pair and registers a new DID for it. Starts the scenario over.
    pub async fn create_did(&mut self) -> Result<String, ScenarioError> {
        let keys = KeyPair::generate();
        let did = self.backend.create_did(&self.method, &keys.public_key).await?;
        let parsed: Did = did.parse()?;
        self.holder = Some(Actor::new(parsed, keys));
        self.wallet = CredentialStorage::new();
        self.checks = ScenarioChecks::default();
        info!("holder DID is {}", did);
        Ok(did)
    }

    /// Authenticates with a simple presentation and obtains a driver license.
    pub async fn issue_driver_license(
        &mut self,
        expires_in_seconds: u64,
    ) -> Result<String, ScenarioError> {
        self.checks.license_did_auth = Check::NotChecked;
        self.checks.license_vc_issued = Check::NotChecked;
        let holder = self.holder.as_ref().ok_or(ScenarioError::NeedDid)?;

        let challenge = self.backend.license_challenge().await?;
        let vp = match self.engine.create_presentation(
            holder,
            &[],
            &challenge.audience,
            &challenge.nonce,
            true,
        ) {
            Ok(vp) => vp,
            Err(e) => {
                self.checks.license_did_auth = Check::Failed;
                return Err(ScenarioError::DidAuthFailed(failure_of(&e)));
            }
        };
        let request = IssueLicenseRequest {
            holder_did: holder.did_string(),
            simple_vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            expires_in_minutes: 0,
            expires_in_seconds,
        };
        let result = self.backend.issue_license(&request).await?;

        let holder_mismatch = matches!(
            result.artifact,
            Artifact::Rejected {
                kind: ErrorKind::HolderMismatch,
                ..
            }
        );
        self.checks.license_did_auth = if holder_mismatch {
            Check::Failed
        } else {
            Check::all([
                result.checks.vp_signature_valid,
                result.checks.vp_not_expired,
                result.checks.aud_nonce_valid,
            ])
        };
        self.checks.license_vc_issued = Check::from_bool(result.token().is_some());

        match result.into_result() {
            Ok(token) => {
                self.wallet.store_credential(LICENSE_SLOT, &token)?;
                Ok(token)
            }
            Err(failure) => {
                warn!("license issuance rejected: {}", failure);
                self.wallet.remove_credential(LICENSE_SLOT);
                if self.checks.license_did_auth.failed() {
                    Err(ScenarioError::DidAuthFailed(failure))
                } else {
                    Err(ScenarioError::LicenseIssueFailed(failure))
                }
            }
        }
    }

    /// Presents the driver license to the rental company and obtains an agreement.
    pub async fn issue_rental_agreement(
        &mut self,
        expires_in_seconds: u64,
    ) -> Result<String, ScenarioError> {
        self.checks.rental_vp_signature = Check::NotChecked;
        self.checks.rental_aud_nonce = Check::NotChecked;
        self.checks.rental_vc_integrity = Check::NotChecked;
        self.checks.rental_holder_match = Check::NotChecked;
        let holder = self.holder.as_ref().ok_or(ScenarioError::NeedDid)?;
        let license = self
            .wallet
            .token(LICENSE_SLOT)
            .ok_or(ScenarioError::NeedLicense)?
            .to_string();

        let challenge = self.backend.rental_challenge().await?;
        let vp = self.engine.create_presentation(
            holder,
            &[license],
            &challenge.audience,
            &challenge.nonce,
            false,
        )?;
        let request = IssueRentalRequest {
            vp_jwt: vp,
            expected_aud: challenge.audience,
            expected_nonce: challenge.nonce,
            expires_in_minutes: 0,
            expires_in_seconds,
        };
        let result: IssueResult = self.backend.issue_rental(&request).await?;

        let checks = &result.checks;
        self.checks.rental_vp_signature = checks.vp_signature_valid;
        self.checks.rental_aud_nonce = checks.aud_nonce_valid;
        self.checks.rental_vc_integrity = Check::all([checks.vc_valid, checks.vc_not_expired]);
        self.checks.rental_holder_match = checks.holder_did_match;

        match result.into_result() {
            Ok(token) => {
                self.wallet.store_credential(RENTAL_SLOT, &token)?;
                Ok(token)
            }
            Err(failure) => {
                warn!("rental issuance rejected: {}", failure);
                self.wallet.remove_credential(RENTAL_SLOT);
                Err(ScenarioError::RentalIssueFailed(failure))
            }
        }
    }

    /// Presents the rental agreement to the car.
    pub async fn car_access_check(&mut self) -> Result<AccessOutcome, ScenarioError> {
        self.checks.car_vp_valid = Check::NotChecked;
        let holder = self.holder.as_ref().ok_or(ScenarioError::NeedDid)?;
        let rental = self
            .wallet
            .token(RENTAL_SLOT)
            .ok_or(ScenarioError::NeedRental)?
            .to_string();

        let challenge = self.backend.access_challenge().await?;
        let vp = self.engine.create_presentation(
            holder,
            &[rental],
            &challenge.audience,
            &challenge.nonce,
            false,
        )?;
        let decision = self
            .backend
            .verify_access(&VerifyPresentationRequest {
                vp_jwt: vp,
                expected_aud: challenge.audience,
                expected_nonce: challenge.nonce,
            })
            .await?;
        self.checks.car_vp_valid = Check::from_bool(decision.granted);
        Ok(if decision.granted {
            AccessOutcome::Allowed
        } else {
            AccessOutcome::Denied(decision.reason)
        })
    }

    /// Replaces the holder key.
    ///
    /// With `update_registry` the new key is registered (with a proof signed by the old key).
    /// Without it only the local key changes, so later authentication fails until the
    /// registry catches up.
    pub async fn rotate_key(&mut self, update_registry: bool) -> Result<(), ScenarioError> {
        let holder = self.holder.as_mut().ok_or(ScenarioError::NeedDid)?;
        let next = KeyPair::generate();
        if update_registry {
            let proof = self
                .engine
                .signer()
                .sign(holder.keys.private_key(), next.public_key.as_bytes())?;
            self.backend
                .rotate_key(&holder.did_string(), &next.public_key, &proof)
                .await?;
        } else {
            warn!("rotating {} locally only; registry keeps the old key", holder.did);
        }
        holder.replace_keys(next);
        Ok(())
    }

    /// Runs every step in order, creating a DID first if there is none.
    pub async fn run(
        &mut self,
        license_ttl_secs: u64,
        rental_ttl_secs: u64,
    ) -> Result<AccessOutcome, ScenarioError> {
        if self.holder.is_none() {
            self.create_did().await?;
        }
        self.issue_driver_license(license_ttl_secs).await?;
        self.issue_rental_agreement(rental_ttl_secs).await?;
        self.car_access_check().await
    }
}

fn failure_of(err: &Error) -> Failure {
    Failure {
        kind: err.kind(),
        message: err.to_string(),
    }
}
