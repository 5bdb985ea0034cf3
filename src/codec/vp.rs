// src/codec/vp.rs
//! Verifiable Presentation tokens.
//!
//! `iss` is the holder DID; `aud` and `nonce` bind the presentation to a challenge; the
//! embedded credential tokens travel verbatim under `vp.verifiableCredential`.

use crate::codec::token::{self, Header, SignedToken};
use crate::codec::W3C_CONTEXTS;
use crate::error::{Error, Result};
use crate::models::presentation::Presentation;
use crate::utils::time::lifetime_problem;
use crate::wallet::key_management::{PrivateKey, Signer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const VERIFIABLE_PRESENTATION: &str = "VerifiablePresentation";

#[derive(Serialize, Deserialize, Debug)]
struct VpClaims {
    iss: String,
    aud: OneOrMany,
    nonce: String,
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
    vp: VpBody,
}

#[derive(Serialize, Deserialize, Debug)]
struct VpBody {
    #[serde(rename = "@context")]
    context: Vec<String>,
    #[serde(rename = "type")]
    types: Vec<String>,
    #[serde(
        rename = "verifiableCredential",
        default,
        deserialize_with = "one_or_many"
    )]
    verifiable_credential: Vec<String>,
}

/// A JWT claim that may be a single string or a list of strings.
#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl From<&[String]> for OneOrMany {
    fn from(values: &[String]) -> Self {
        match values {
            [single] => OneOrMany::One(single.clone()),
            _ => OneOrMany::Many(values.to_vec()),
        }
    }
}

/// Accepts a single token string as well as a list.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(OneOrMany::deserialize(deserializer)?.into_vec())
}

impl From<&Presentation> for VpClaims {
    fn from(vp: &Presentation) -> Self {
        VpClaims {
            iss: vp.holder.clone(),
            aud: OneOrMany::from(vp.audience.as_slice()),
            nonce: vp.nonce.clone(),
            jti: vp.id.clone(),
            iat: vp.issued_at,
            nbf: Some(vp.not_before),
            exp: vp.expires_at,
            vp: VpBody {
                context: W3C_CONTEXTS.iter().map(|c| c.to_string()).collect(),
                types: vec![VERIFIABLE_PRESENTATION.to_string()],
                verifiable_credential: vp.credentials.clone(),
            },
        }
    }
}

impl VpClaims {
    fn into_presentation(self) -> Result<Presentation> {
        if !self.vp.types.iter().any(|t| t == VERIFIABLE_PRESENTATION) {
            return Err(Error::MalformedToken(
                "type list lacks VerifiablePresentation".into(),
            ));
        }
        let not_before = self.nbf.unwrap_or(self.iat);
        if let Some(problem) = lifetime_problem(self.iat, not_before, self.exp) {
            return Err(Error::MalformedToken(problem));
        }
        Ok(Presentation {
            id: self.jti,
            holder: self.iss,
            credentials: self.vp.verifiable_credential,
            audience: self.aud.into_vec(),
            nonce: self.nonce,
            issued_at: self.iat,
            not_before,
            expires_at: self.exp,
        })
    }
}

/// Signs `vp` with the holder's key. The header `kid` is `vp.holder`.
///
/// # Errors
/// `InvalidInput` for a presentation without audience or with an inconsistent lifetime.
pub fn encode_vp(vp: &Presentation, signer: &dyn Signer, private_key: &PrivateKey) -> Result<String> {
    if vp.audience.is_empty() {
        return Err(Error::InvalidInput("presentation has no audience".into()));
    }
    if let Some(problem) = lifetime_problem(vp.issued_at, vp.not_before, vp.expires_at) {
        return Err(Error::InvalidInput(problem));
    }
    let header = Header::new(signer.algorithm(), &vp.holder);
    token::encode(&header, &VpClaims::from(vp), signer, private_key)
}

/// Parses a VP token. Embedded credentials are left as tokens; nothing is verified.
pub fn decode_vp(token: &str) -> Result<SignedToken<Presentation>> {
    token::decode::<VpClaims>(token)?.try_map(VpClaims::into_presentation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::now;
    use crate::wallet::key_management::{KeyPair, Secp256k1Signer};
    use chrono::Duration;
    use serde_json::json;

    fn sample(credentials: Vec<String>) -> Presentation {
        let issued_at = now();
        Presentation {
            id: "vp-1".into(),
            holder: "did:demo:alice".into(),
            credentials,
            audience: vec!["did:demo:rentacar".into()],
            nonce: "abc123".into(),
            issued_at,
            not_before: issued_at,
            expires_at: Some(issued_at + Duration::seconds(120)),
        }
    }

    #[test]
    fn decode_restores_every_field() {
        let keys = KeyPair::generate();
        for vp in [sample(vec![]), sample(vec!["a.b.c".into(), "d.e.f".into()])] {
            let token = encode_vp(&vp, &Secp256k1Signer, keys.private_key()).unwrap();
            let decoded = decode_vp(&token).unwrap();
            assert_eq!(decoded.claims, vp);
            assert!(decoded.verify_with(&Secp256k1Signer, &keys.public_key));
        }
    }

    #[test]
    fn accepts_single_credential_string() {
        let keys = KeyPair::generate();
        let header = Header::new("ES256K", "did:demo:alice");
        let claims = json!({
            "iss": "did:demo:alice", "aud": "did:demo:rentacar", "nonce": "n", "jti": "j",
            "iat": 10, "nbf": 10,
            "vp": {"@context": [], "type": ["VerifiablePresentation"], "verifiableCredential": "x.y.z"}
        });
        let token = token::encode(&header, &claims, &Secp256k1Signer, keys.private_key()).unwrap();
        let vp = decode_vp(&token).unwrap().claims;
        assert_eq!(vp.credentials, vec!["x.y.z".to_string()]);
        assert_eq!(vp.expires_at, None);
    }

    #[test]
    fn single_audience_is_a_string_on_the_wire() {
        let keys = KeyPair::generate();
        let token = encode_vp(&sample(vec![]), &Secp256k1Signer, keys.private_key()).unwrap();
        let payload: serde_json::Value =
            crate::utils::serialization::decode_segment(token.split('.').nth(1).unwrap(), "payload")
                .unwrap();
        assert_eq!(payload["aud"], json!("did:demo:rentacar"));
    }

    #[test]
    fn accepts_audience_list() {
        let keys = KeyPair::generate();
        let header = Header::new("ES256K", "did:demo:alice");
        let claims = json!({
            "iss": "did:demo:alice", "aud": ["did:demo:car", "did:demo:rentacar"], "nonce": "n",
            "jti": "j", "iat": 10,
            "vp": {"@context": [], "type": ["VerifiablePresentation"], "verifiableCredential": []}
        });
        let token = token::encode(&header, &claims, &Secp256k1Signer, keys.private_key()).unwrap();
        let vp = decode_vp(&token).unwrap().claims;
        assert!(vp.is_addressed_to("did:demo:rentacar"));
        assert!(vp.is_addressed_to("did:demo:car"));
        assert!(!vp.is_addressed_to("did:demo:other"));
        assert_eq!(vp.not_before, vp.issued_at);
    }

    #[test]
    fn presentation_expiring_at_issue_is_malformed() {
        let keys = KeyPair::generate();
        let header = Header::new("ES256K", "did:demo:alice");
        let claims = json!({
            "iss": "did:demo:alice", "aud": "did:demo:rentacar", "nonce": "n", "jti": "j",
            "iat": 10, "exp": 5,
            "vp": {"@context": [], "type": ["VerifiablePresentation"]}
        });
        let token = token::encode(&header, &claims, &Secp256k1Signer, keys.private_key()).unwrap();
        assert!(matches!(decode_vp(&token), Err(Error::MalformedToken(_))));

        let mut vp = sample(vec![]);
        vp.expires_at = Some(vp.issued_at - Duration::seconds(1));
        let err = encode_vp(&vp, &Secp256k1Signer, keys.private_key()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn credential_token_is_not_a_presentation() {
        let keys = KeyPair::generate();
        let header = Header::new("ES256K", "did:demo:alice");
        let claims = json!({"iss": "did:demo:alice", "sub": "x", "jti": "j", "iat": 1, "nbf": 1,
            "vc": {"@context": [], "type": ["VerifiableCredential"], "credentialSubject": {}}});
        let token = token::encode(&header, &claims, &Secp256k1Signer, keys.private_key()).unwrap();
        assert!(matches!(decode_vp(&token), Err(Error::MalformedToken(_))));
    }
}
