// src/codec/vc.rs
//! Verifiable Credential tokens.
//!
//! Claim layout follows the JWT encoding of the W3C VC data model:
//! `iss`, `sub`, `jti`, `iat`, `nbf`, optional `exp`, and the credential body under `vc`.

use crate::codec::token::{self, Header, SignedToken};
use crate::codec::W3C_CONTEXTS;
use crate::error::{Error, Result};
use crate::models::credential::Credential;
use crate::utils::time::lifetime_problem;
use crate::wallet::key_management::{PrivateKey, Signer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Base type present in every credential's `type` list.
pub const VERIFIABLE_CREDENTIAL: &str = "VerifiableCredential";

#[derive(Serialize, Deserialize, Debug)]
struct VcClaims {
    iss: String,
    sub: String,
    jti: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    iat: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    nbf: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    exp: Option<DateTime<Utc>>,
    vc: VcBody,
}

#[derive(Serialize, Deserialize, Debug)]
struct VcBody {
    #[serde(rename = "@context")]
    context: Vec<String>,
    #[serde(rename = "type")]
    types: Vec<String>,
    #[serde(rename = "credentialSubject")]
    credential_subject: Map<String, Value>,
}

impl From<&Credential> for VcClaims {
    fn from(vc: &Credential) -> Self {
        let mut types = vec![VERIFIABLE_CREDENTIAL.to_string()];
        if !vc.credential_type.is_empty() {
            types.push(vc.credential_type.clone());
        }
        VcClaims {
            iss: vc.issuer.clone(),
            sub: vc.subject.clone(),
            jti: vc.id.clone(),
            iat: vc.issued_at,
            nbf: Some(vc.not_before),
            exp: vc.expires_at,
            vc: VcBody {
                context: W3C_CONTEXTS.iter().map(|c| c.to_string()).collect(),
                types,
                credential_subject: vc.claims.clone(),
            },
        }
    }
}

impl VcClaims {
    fn into_credential(self) -> Result<Credential> {
        if !self.vc.types.iter().any(|t| t == VERIFIABLE_CREDENTIAL) {
            return Err(Error::MalformedToken(
                "type list lacks VerifiableCredential".into(),
            ));
        }
        let not_before = self.nbf.unwrap_or(self.iat);
        if let Some(problem) = lifetime_problem(self.iat, not_before, self.exp) {
            return Err(Error::MalformedToken(problem));
        }
        let credential_type = self
            .vc
            .types
            .into_iter()
            .find(|t| t != VERIFIABLE_CREDENTIAL)
            .unwrap_or_default();
        Ok(Credential {
            id: self.jti,
            issuer: self.iss,
            subject: self.sub,
            credential_type,
            claims: self.vc.credential_subject,
            issued_at: self.iat,
            not_before,
            expires_at: self.exp,
        })
    }
}

/// Signs `vc` with the issuer's key and returns the token. The header `kid` is `vc.issuer`.
///
/// # Errors
/// `InvalidInput` when `vc` would not decode back unchanged: the base type used as the
/// specific type, or an inconsistent lifetime (see [`lifetime_problem`]).
pub fn encode_vc(vc: &Credential, signer: &dyn Signer, private_key: &PrivateKey) -> Result<String> {
    if vc.credential_type == VERIFIABLE_CREDENTIAL {
        return Err(Error::InvalidInput(format!(
            "{} is implied and cannot be the credential type",
            VERIFIABLE_CREDENTIAL
        )));
    }
    if let Some(problem) = lifetime_problem(vc.issued_at, vc.not_before, vc.expires_at) {
        return Err(Error::InvalidInput(problem));
    }
    let header = Header::new(signer.algorithm(), &vc.issuer);
    token::encode(&header, &VcClaims::from(vc), signer, private_key)
}

/// Parses a VC token. The result is unverified.
pub fn decode_vc(token: &str) -> Result<SignedToken<Credential>> {
    token::decode::<VcClaims>(token)?.try_map(VcClaims::into_credential)
}
