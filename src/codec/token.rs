// src/codec/token.rs
//! Compact signed token format.
//!
//! ```text
//! base64url(header) "." base64url(payload) "." base64url(signature)
//! ```
//! The signature covers the ASCII bytes of `base64url(header) "." base64url(payload)`, so the
//! exact bytes the signer produced are what the verifier checks; payloads are never
//! re-serialized before verification.

use crate::error::{Error, Result};
use crate::utils::serialization::{b64url_decode, b64url_encode, decode_segment, encode_segment};
use crate::wallet::key_management::{PrivateKey, PublicKey, Signer};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Token type written into every header.
pub const TOKEN_TYPE: &str = "JWT";

/// Protected header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Signature algorithm, e.g. `ES256K`
    pub alg: String,
    pub typ: String,
    /// DID whose registered key signed the token
    pub kid: String,
}

impl Header {
    pub fn new(alg: &str, kid: &str) -> Self {
        Header {
            alg: alg.to_string(),
            typ: TOKEN_TYPE.to_string(),
            kid: kid.to_string(),
        }
    }
}

/// A decoded but unverified token.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedToken<T> {
    pub header: Header,
    pub claims: T,
    signing_input: String,
    signature: Vec<u8>,
}

impl<T> SignedToken<T> {
    /// Bytes the signature is computed over.
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Checks the signature with `signer` against `public_key`.
    ///
    /// A header algorithm other than the signer's own never verifies.
    pub fn verify_with(&self, signer: &dyn Signer, public_key: &PublicKey) -> bool {
        self.header.alg == signer.algorithm()
            && signer.verify(public_key, self.signing_input(), &self.signature)
    }

    /// Converts the claims, keeping header and signature data.
    pub fn try_map<U, F>(self, f: F) -> Result<SignedToken<U>>
    where
        F: FnOnce(T) -> Result<U>,
    {
        Ok(SignedToken {
            header: self.header,
            claims: f(self.claims)?,
            signing_input: self.signing_input,
            signature: self.signature,
        })
    }
}

/// Serializes `claims`, signs them, and returns the compact token.
///
/// # Errors
/// `Signing` if the signer rejects the key material.
pub fn encode<T: Serialize>(
    header: &Header,
    claims: &T,
    signer: &dyn Signer,
    private_key: &PrivateKey,
) -> Result<String> {
    let signing_input = format!("{}.{}", encode_segment(header)?, encode_segment(claims)?);
    let signature = signer.sign(private_key, signing_input.as_bytes())?;
    Ok(format!("{}.{}", signing_input, b64url_encode(&signature)))
}

/// Parses a compact token into header, claims and signature.
///
/// # Errors
/// `MalformedToken` when the token does not have exactly three non-empty parts or a part
/// fails base64url / JSON decoding.
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<SignedToken<T>> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 parts, found {}",
            parts.len()
        )));
    }
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::MalformedToken("empty token part".into()));
    }

    let header: Header = decode_segment(parts[0], "header")?;
    let claims: T = decode_segment(parts[1], "payload")?;
    let signature = b64url_decode(parts[2], "signature")?;

    Ok(SignedToken {
        header,
        claims,
        signing_input: format!("{}.{}", parts[0], parts[1]),
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::{KeyPair, Secp256k1Signer, ES256K};
    use serde_json::{json, Value};

    #[test]
    fn encode_then_verify() {
        let keys = KeyPair::generate();
        let header = Header::new(ES256K, "did:demo:alice");
        let token = encode(&header, &json!({"n": 1}), &Secp256k1Signer, keys.private_key()).unwrap();
        assert!(token.starts_with("ey"));

        let decoded: SignedToken<Value> = decode(&token).unwrap();
        assert_eq!(decoded.header, header);
        assert_eq!(decoded.claims, json!({"n": 1}));
        assert!(decoded.verify_with(&Secp256k1Signer, &keys.public_key));
    }

    #[test]
    fn wrong_part_count_is_malformed() {
        for token in ["a.b", "a.b.c.d", "", "abc"] {
            let err = decode::<Value>(token).unwrap_err();
            assert!(matches!(err, Error::MalformedToken(_)), "{token}");
        }
    }

    #[test]
    fn empty_part_is_malformed() {
        assert!(decode::<Value>("eyJhIjoxfQ..c2ln").is_err());
    }

    #[test]
    fn foreign_algorithm_never_verifies() {
        let keys = KeyPair::generate();
        let header = Header::new("HS256", "did:demo:alice");
        let token = encode(&header, &json!({}), &Secp256k1Signer, keys.private_key()).unwrap();
        let decoded: SignedToken<Value> = decode(&token).unwrap();
        assert!(!decoded.verify_with(&Secp256k1Signer, &keys.public_key));
    }
}
