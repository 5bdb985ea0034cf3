// src/error.rs
//! Error types for the DID / VC / VP system.
//!
//! Two layers are kept apart:
//! - [`Error`] is a hard failure: structurally malformed input, a capability that could not
//!   be reached (DID registry, signer, transport), or a bad configuration.
//! - [`ErrorKind`] is the stable tag attached to both hard failures and semantic verification
//!   failures, so callers can route on it instead of parsing message text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable, serializable failure category.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Token is not three base64url segments of valid JSON.
    MalformedToken,
    /// The issuer or holder DID is not registered.
    UnknownIssuerOrHolder,
    /// The signer capability could not produce a signature.
    SigningError,
    /// A signature did not verify against the registered key.
    InvalidSignature,
    /// An embedded credential is past its `exp`.
    ExpiredCredential,
    /// The presentation itself is past its `exp`.
    ExpiredPresentation,
    /// A credential or presentation is used before its `nbf`.
    NotYetValid,
    /// Audience/nonce did not match an outstanding challenge.
    ChallengeMismatch,
    /// A credential subject differs from the presentation holder.
    HolderMismatch,
    /// A credential is valid but not the kind or issuer the relying party requires.
    UntrustedCredential,
    /// Request parameters were missing or inconsistent.
    InvalidInput,
    /// The remote service could not be reached or answered with an error.
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MalformedToken => "malformed_token",
            ErrorKind::UnknownIssuerOrHolder => "unknown_issuer_or_holder",
            ErrorKind::SigningError => "signing_error",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::ExpiredCredential => "expired_credential",
            ErrorKind::ExpiredPresentation => "expired_presentation",
            ErrorKind::NotYetValid => "not_yet_valid",
            ErrorKind::ChallengeMismatch => "challenge_mismatch",
            ErrorKind::HolderMismatch => "holder_mismatch",
            ErrorKind::UntrustedCredential => "untrusted_credential",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transport => "transport",
        };
        f.write_str(name)
    }
}

/// Hard failures raised by the codec, engines, registry and transport layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Token could not be parsed into its header/payload/signature parts.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// DID is not present in the registry.
    #[error("unknown DID: {0}")]
    UnknownDid(String),

    /// DID already registered.
    #[error("DID already registered: {0}")]
    DidExists(String),

    /// Key material could not produce a signature.
    #[error("signing error: {0}")]
    Signing(String),

    /// Caller supplied inconsistent or missing parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// HTTP transport failure (connect, timeout, decode).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote service answered with a non-success status.
    #[error("upstream returned {status} ({kind}): {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Category reported by the service; `Transport` when the body carried none.
        kind: ErrorKind,
        /// Error message reported by the service.
        message: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps a hard failure to its stable category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedToken(_) => ErrorKind::MalformedToken,
            Error::UnknownDid(_) => ErrorKind::UnknownIssuerOrHolder,
            Error::Signing(_) => ErrorKind::SigningError,
            Error::DidExists(_) | Error::InvalidInput(_) | Error::Config(_) => {
                ErrorKind::InvalidInput
            }
            Error::Upstream { kind, .. } => *kind,
            Error::Transport(_) | Error::Io(_) => ErrorKind::Transport,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedToken(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
