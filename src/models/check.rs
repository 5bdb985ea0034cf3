// src/models/check.rs
//! Explainable verification results.
//!
//! Every verification step reports its own [`Check`] instead of being folded into a single
//! boolean, so a caller can show exactly which condition failed.

use crate::error::ErrorKind;
use crate::models::credential::Credential;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Outcome of one verification step.
///
/// Serialized as `null` / `true` / `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Check {
    #[default]
    NotChecked,
    Passed,
    Failed,
}

impl Check {
    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Check::Passed
        } else {
            Check::Failed
        }
    }

    pub fn passed(self) -> bool {
        self == Check::Passed
    }

    pub fn failed(self) -> bool {
        self == Check::Failed
    }

    /// Conjunction over several checks. Empty input is vacuously `Passed`; any `Failed`
    /// wins over `NotChecked`.
    pub fn all<I: IntoIterator<Item = Check>>(checks: I) -> Check {
        let mut result = Check::Passed;
        for check in checks {
            match check {
                Check::Failed => return Check::Failed,
                Check::NotChecked => result = Check::NotChecked,
                Check::Passed => {}
            }
        }
        result
    }
}

impl Serialize for Check {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Check::NotChecked => serializer.serialize_none(),
            Check::Passed => serializer.serialize_some(&true),
            Check::Failed => serializer.serialize_some(&false),
        }
    }
}

impl<'de> Deserialize<'de> for Check {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<bool>::deserialize(deserializer)? {
            None => Check::NotChecked,
            Some(ok) => Check::from_bool(ok),
        })
    }
}

/// A single failed condition with its category.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Full checklist for one presentation verification.
///
/// `valid` is the conjunction of every check. `error` carries the first failure message;
/// `failures` lists all of them in the order they were found.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub valid: bool,
    pub vp_signature_valid: Check,
    pub vp_not_expired: Check,
    pub aud_nonce_valid: Check,
    pub vc_valid: Check,
    pub vc_not_expired: Check,
    pub holder_did_match: Check,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    /// Decoded embedded credentials, in presentation order. Not part of the wire format.
    #[serde(skip)]
    pub credentials: Vec<Credential>,
}

impl CheckResult {
    /// Records a failed condition; the first one becomes `error`.
    pub fn record(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        if self.error.is_none() {
            self.error = Some(message.clone());
        }
        self.failures.push(Failure { kind, message });
    }

    /// Recomputes `valid` from the individual checks.
    pub fn finalize(&mut self) {
        self.valid = Check::all([
            self.vp_signature_valid,
            self.vp_not_expired,
            self.aud_nonce_valid,
            self.vc_valid,
            self.vc_not_expired,
            self.holder_did_match,
        ])
        .passed();
    }

    /// Category of the first recorded failure.
    pub fn first_failure_kind(&self) -> Option<ErrorKind> {
        self.failures.first().map(|f| f.kind)
    }

    /// True when a failure of `kind` was recorded.
    pub fn has_failure(&self, kind: ErrorKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }
}

/// Issued artifact or the reason nothing was issued.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Artifact {
    Issued { token: String },
    Rejected { kind: ErrorKind, message: String },
}

/// Result of an issuance request that is gated on a presentation: the checklist plus the
/// issued token (or the rejection).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IssueResult {
    pub checks: CheckResult,
    pub artifact: Artifact,
}

impl IssueResult {
    pub fn issued(checks: CheckResult, token: String) -> Self {
        IssueResult {
            checks,
            artifact: Artifact::Issued { token },
        }
    }

    pub fn rejected(checks: CheckResult, kind: ErrorKind, message: impl Into<String>) -> Self {
        IssueResult {
            checks,
            artifact: Artifact::Rejected {
                kind,
                message: message.into(),
            },
        }
    }

    /// The issued token, if any.
    pub fn token(&self) -> Option<&str> {
        match &self.artifact {
            Artifact::Issued { token } => Some(token),
            Artifact::Rejected { .. } => None,
        }
    }

    /// Converts into a tagged result for callers that only care about the artifact.
    pub fn into_result(self) -> Result<String, Failure> {
        match self.artifact {
            Artifact::Issued { token } => Ok(token),
            Artifact::Rejected { kind, message } => Err(Failure { kind, message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_is_vacuously_passed() {
        assert_eq!(Check::all([]), Check::Passed);
        assert_eq!(Check::all([Check::Passed, Check::NotChecked]), Check::NotChecked);
        assert_eq!(
            Check::all([Check::NotChecked, Check::Failed, Check::Passed]),
            Check::Failed
        );
    }

    #[test]
    fn checks_serialize_as_nullable_booleans() {
        let mut result = CheckResult {
            vp_signature_valid: Check::Passed,
            aud_nonce_valid: Check::Failed,
            ..Default::default()
        };
        result.record(ErrorKind::ChallengeMismatch, "nonce differs");
        result.record(ErrorKind::HolderMismatch, "subject differs");
        result.finalize();

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["vpSignatureValid"], json!(true));
        assert_eq!(value["audNonceValid"], json!(false));
        assert_eq!(value["vcValid"], json!(null));
        assert_eq!(value["valid"], json!(false));
        assert_eq!(value["error"], json!("nonce differs"));
        assert_eq!(result.first_failure_kind(), Some(ErrorKind::ChallengeMismatch));

        let back: CheckResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.vc_valid, Check::NotChecked);
        assert_eq!(back.failures.len(), 2);
    }

    #[test]
    fn artifact_is_tagged() {
        let issued = IssueResult::issued(CheckResult::default(), "eyJ.x.y".into());
        let value = serde_json::to_value(&issued).unwrap();
        assert_eq!(value["artifact"]["status"], json!("issued"));
        assert_eq!(issued.token(), Some("eyJ.x.y"));

        let rejected = IssueResult::rejected(
            CheckResult::default(),
            ErrorKind::InvalidInput,
            "holder_did is required",
        );
        let failure = rejected.into_result().unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidInput);
    }
}
