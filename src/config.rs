// src/config.rs
//! Runtime configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. Optional file `config/did-vp-system.{toml,yaml,json}`
//! 3. Environment variables prefixed with `SSI__` (e.g. `SSI__SERVER__PORT=8080`)
//!
//! A `.env` file is loaded into the environment before the layers are read.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum entropy for challenge nonces.
pub const MIN_NONCE_BYTES: usize = 16;

/// Bounds on challenge lifetime. Every challenge expires, so the janitor can always reclaim it.
pub const MIN_CHALLENGE_TTL_SECS: u64 = 1;
pub const MAX_CHALLENGE_TTL_SECS: u64 = 86_400;

/// Top-level settings tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub did: DidSettings,
    pub challenge: ChallengeSettings,
    pub credential: CredentialSettings,
    pub verifier: VerifierSettings,
    pub client: ClientSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single request; no automatic retry.
    pub request_timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DidSettings {
    /// DID method used for actors created by this service.
    pub method: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChallengeSettings {
    /// Clamped to `MIN_CHALLENGE_TTL_SECS..=MAX_CHALLENGE_TTL_SECS`.
    pub ttl_secs: u64,
    pub nonce_bytes: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialSettings {
    /// Lifetime of credentials issued without an explicit expiry request.
    pub default_ttl_secs: u64,
    /// Lifetime of presentations created by holders.
    pub presentation_ttl_secs: u64,
}

/// When a verifier marks a challenge as consumed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionPolicy {
    /// Consume once the signed presentation matches an outstanding challenge,
    /// whatever the embedded credentials turn out to be.
    #[default]
    OnChallengeMatch,
    /// Consume only when every check passes; failed attempts may retry.
    OnFullSuccess,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifierSettings {
    pub redemption_policy: RedemptionPolicy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings {
                host: "127.0.0.1".into(),
                port: 3000,
                request_timeout_secs: 10,
            },
            did: DidSettings {
                method: "demo".into(),
            },
            challenge: ChallengeSettings {
                ttl_secs: 300,
                nonce_bytes: MIN_NONCE_BYTES,
            },
            credential: CredentialSettings {
                default_ttl_secs: 300,
                presentation_ttl_secs: 120,
            },
            verifier: VerifierSettings {
                redemption_policy: RedemptionPolicy::OnChallengeMatch,
            },
            client: ClientSettings {
                base_url: "http://127.0.0.1:3000".into(),
                timeout_secs: 10,
            },
        }
    }
}

impl Settings {
    /// Loads `.env`, then the layered configuration.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load_from("config/did-vp-system")
    }

    /// Loads the layered configuration using `file` as the optional file layer.
    pub fn load_from(file: &str) -> Result<Self> {
        let defaults = Settings::default();
        let settings = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default(
                "server.request_timeout_secs",
                defaults.server.request_timeout_secs as i64,
            )?
            .set_default("did.method", defaults.did.method)?
            .set_default("challenge.ttl_secs", defaults.challenge.ttl_secs as i64)?
            .set_default("challenge.nonce_bytes", defaults.challenge.nonce_bytes as i64)?
            .set_default(
                "credential.default_ttl_secs",
                defaults.credential.default_ttl_secs as i64,
            )?
            .set_default(
                "credential.presentation_ttl_secs",
                defaults.credential.presentation_ttl_secs as i64,
            )?
            .set_default("verifier.redemption_policy", "on_challenge_match")?
            .set_default("client.base_url", defaults.client.base_url)?
            .set_default("client.timeout_secs", defaults.client.timeout_secs as i64)?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("SSI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = settings.try_deserialize()?;
        settings.challenge.nonce_bytes = settings.challenge.nonce_bytes.max(MIN_NONCE_BYTES);
        settings.challenge.ttl_secs = settings
            .challenge
            .ttl_secs
            .clamp(MIN_CHALLENGE_TTL_SECS, MAX_CHALLENGE_TTL_SECS);
        Ok(settings)
    }

    /// Socket address string the API server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
