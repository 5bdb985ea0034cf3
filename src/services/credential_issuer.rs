// src/services/credential_issuer.rs
//! Issuance engine.
//!
//! Builds and signs credentials (issuer -> subject) and presentations (holder-wrapped
//! bundles of credential tokens bound to a challenge). Keys come in through an explicit
//! [`Actor`]; the engine itself holds nothing but the signing capability.

use crate::codec::vc::encode_vc;
use crate::codec::vp::encode_vp;
use crate::config::CredentialSettings;
use crate::error::{Error, Result};
use crate::models::credential::Credential;
use crate::models::presentation::Presentation;
use crate::utils::crypto::random_token;
use crate::utils::time::{expiry_after, now};
use crate::wallet::key_management::{Actor, Signer};
use log::info;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Entropy of generated `jti` values.
const TOKEN_ID_BYTES: usize = 12;

/// Service that produces signed VC and VP tokens.
#[derive(Clone)]
pub struct CredentialIssuer {
    signer: Arc<dyn Signer>,
    /// Lifetime given to presentations; zero means no expiry
    presentation_ttl_secs: u64,
}

impl CredentialIssuer {
    /// Creates an issuer using the default presentation lifetime.
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        let defaults = crate::config::Settings::default();
        Self::with_settings(signer, &defaults.credential)
    }

    pub fn with_settings(signer: Arc<dyn Signer>, settings: &CredentialSettings) -> Self {
        CredentialIssuer {
            signer,
            presentation_ttl_secs: settings.presentation_ttl_secs,
        }
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    /// Issues a credential about `subject`, signed with the issuer actor's key.
    ///
    /// # Arguments
    /// * `issuer` - Issuing DID and its key pair
    /// * `subject` - DID (or identifier) the claims are about
    /// * `credential_type` - Specific credential type, e.g. `DriverLicenseCredential`
    /// * `claims` - `credentialSubject` contents
    /// * `ttl_secs` - Lifetime in seconds; zero means the credential never expires
    ///
    /// # Errors
    /// - `InvalidInput` for an empty subject or a lifetime too long to represent
    /// - `Signing` when the issuer key cannot sign
    pub fn issue_credential(
        &self,
        issuer: &Actor,
        subject: &str,
        credential_type: &str,
        claims: Map<String, Value>,
        ttl_secs: u64,
    ) -> Result<String> {
        if subject.trim().is_empty() {
            return Err(Error::InvalidInput("credential subject is empty".into()));
        }
        let issued_at = now();
        let credential = Credential {
            id: random_token(TOKEN_ID_BYTES),
            issuer: issuer.did_string(),
            subject: subject.to_string(),
            credential_type: credential_type.to_string(),
            claims,
            issued_at,
            not_before: issued_at,
            expires_at: expiry_after(issued_at, ttl_secs)?,
        };
        let token = self.sign_credential(&credential, issuer)?;
        info!(
            "{} issued {} to {}",
            credential.issuer, credential.credential_type, credential.subject
        );
        Ok(token)
    }

    /// Signs an already assembled credential.
    ///
    /// # Errors
    /// `InvalidInput` if `credential.issuer` is not the signing actor's DID, or if the
    /// credential would not decode back unchanged (sub-second timestamps, `exp <= iat`,
    /// `nbf > iat`, or the bare `VerifiableCredential` type).
    pub fn sign_credential(&self, credential: &Credential, issuer: &Actor) -> Result<String> {
        if credential.issuer != issuer.did_string() {
            return Err(Error::InvalidInput(format!(
                "credential issuer {} is not the signing actor {}",
                credential.issuer, issuer.did
            )));
        }
        encode_vc(credential, self.signer.as_ref(), issuer.keys.private_key())
    }

    /// Wraps credential tokens into a presentation bound to `(audience, nonce)`.
    ///
    /// With `simple = true` the presentation carries no credentials and only proves control
    /// of the holder key; `vc_tokens` must then be empty. With `simple = false` at least one
    /// token is required. Token order is preserved.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty audience or nonce, or a token list that contradicts `simple`
    /// - `Signing` when the holder key cannot sign
    pub fn create_presentation(
        &self,
        holder: &Actor,
        vc_tokens: &[String],
        audience: &str,
        nonce: &str,
        simple: bool,
    ) -> Result<String> {
        if audience.is_empty() || nonce.is_empty() {
            return Err(Error::InvalidInput(
                "presentation needs both audience and nonce".into(),
            ));
        }
        match (simple, vc_tokens.is_empty()) {
            (true, false) => {
                return Err(Error::InvalidInput(
                    "a simple presentation cannot carry credentials".into(),
                ))
            }
            (false, true) => {
                return Err(Error::InvalidInput(
                    "presentation needs at least one credential".into(),
                ))
            }
            _ => {}
        }

        let issued_at = now();
        let presentation = Presentation {
            id: random_token(TOKEN_ID_BYTES),
            holder: holder.did_string(),
            credentials: vc_tokens.to_vec(),
            audience: vec![audience.to_string()],
            nonce: nonce.to_string(),
            issued_at,
            not_before: issued_at,
            expires_at: expiry_after(issued_at, self.presentation_ttl_secs)?,
        };
        let token = self.sign_presentation(&presentation, holder)?;
        info!(
            "{} presented {} credential(s) to {}",
            presentation.holder,
            presentation.credentials.len(),
            audience
        );
        Ok(token)
    }

    /// Signs an already assembled presentation.
    pub fn sign_presentation(&self, presentation: &Presentation, holder: &Actor) -> Result<String> {
        if presentation.holder != holder.did_string() {
            return Err(Error::InvalidInput(format!(
                "presentation holder {} is not the signing actor {}",
                presentation.holder, holder.did
            )));
        }
        encode_vp(presentation, self.signer.as_ref(), holder.keys.private_key())
    }
}
