// src/client/api_client.rs
//! HTTP client for the demo API.
//!
//! Holders use it to reach the issuer/verifier services of another process. Every request
//! is bounded by the configured timeout and is never retried; a non-2xx answer becomes
//! [`Error::Upstream`] carrying the server's error code and message.

use crate::config::ClientSettings;
use crate::error::{Error, ErrorKind, Result};
use crate::models::challenge::{Challenge, ChallengeKind};
use crate::models::check::{CheckResult, IssueResult};
use crate::models::did::DidDocument;
use crate::services::api_server::{
    ChallengeRequest, CreateDidRequest, CreateDidResponse, ErrorResponse, RotateKeyRequest,
};
use crate::services::demo_flow::{
    AccessDecision, DemoActors, DemoBackend, IssueLicenseRequest, IssueRentalRequest,
    VerifyPresentationRequest,
};
use crate::utils::serialization::b64url_encode;
use crate::wallet::key_management::PublicKey;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Thin JSON client over `reqwest`.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// `Transport` when the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(&settings.base_url, Duration::from_secs(settings.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!("{} {}", status, response.url());
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let (kind, message) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(e) => (e.code, e.message),
            // Not one of ours, e.g. a proxy error page
            Err(_) => (ErrorKind::Transport, body),
        };
        Err(Error::Upstream {
            status: status.as_u16(),
            kind,
            message,
        })
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::POST, path)).await
    }

    pub async fn resolve_did(&self, did: &str) -> Result<DidDocument> {
        self.send(self.request(Method::GET, &format!("/dids/{}", did)))
            .await
    }

    /// Requests a challenge from the service's general verifier.
    pub async fn request_challenge(&self, kind: ChallengeKind) -> Result<Challenge> {
        self.post("/challenges", &ChallengeRequest { kind }).await
    }

    /// Verifies a presentation against the service's general verifier.
    pub async fn verify_presentation(&self, request: &VerifyPresentationRequest) -> Result<CheckResult> {
        self.post("/presentations/verify", request).await
    }
}

#[async_trait]
impl DemoBackend for ApiClient {
    async fn create_did(&self, method: &str, public_key: &PublicKey) -> Result<String> {
        let request = CreateDidRequest {
            method: method.to_string(),
            public_key: public_key.clone(),
        };
        let response: CreateDidResponse = self.post("/dids", &request).await?;
        Ok(response.did)
    }

    async fn rotate_key(&self, did: &str, new_key: &PublicKey, proof: &[u8]) -> Result<()> {
        let request = RotateKeyRequest {
            public_key: new_key.clone(),
            proof: b64url_encode(proof),
        };
        let _: DidDocument = self
            .send(
                self.request(Method::PUT, &format!("/dids/{}/key", did))
                    .json(&request),
            )
            .await?;
        Ok(())
    }

    async fn actors(&self) -> Result<DemoActors> {
        self.send(self.request(Method::GET, "/demo/actors")).await
    }

    async fn license_challenge(&self) -> Result<Challenge> {
        self.post_empty("/license/challenge").await
    }

    async fn issue_license(&self, request: &IssueLicenseRequest) -> Result<IssueResult> {
        self.post("/license/issue", request).await
    }

    async fn rental_challenge(&self) -> Result<Challenge> {
        self.post_empty("/rental/challenge").await
    }

    async fn issue_rental(&self, request: &IssueRentalRequest) -> Result<IssueResult> {
        self.post("/rental/issue", request).await
    }

    async fn access_challenge(&self) -> Result<Challenge> {
        self.post_empty("/access/challenge").await
    }

    async fn verify_access(&self, request: &VerifyPresentationRequest) -> Result<AccessDecision> {
        self.post("/access/verify", request).await
    }
}
