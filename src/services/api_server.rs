// src/services/api_server.rs
//! API Server for the DID / VC / VP demo.
//!
//! REST interface over [`DemoFlow`]:
//! - DID creation, resolution and key rotation
//! - Challenge endpoints for the license issuer, rental company and car
//! - License and rental issuance gated on presentations
//! - Car access decision
//! - Generic challenge / presentation verification against the service's own verifier
//!
//! Every request runs under a timeout layer. Nothing is retried.

use crate::error::{Error, ErrorKind};
use crate::models::challenge::ChallengeKind;
use crate::services::demo_flow::{
    DemoFlow, IssueLicenseRequest, IssueRentalRequest, VerifyPresentationRequest,
};
use crate::utils::serialization::b64url_decode;
use crate::wallet::key_management::PublicKey;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

// API request and response structures

/// Request payload for creating a new DID
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateDidRequest {
    /// DID method; the configured method when empty
    #[serde(default)]
    pub method: String,
    /// Compressed secp256k1 public key, base58
    pub public_key: PublicKey,
}

/// Response for DID creation
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateDidResponse {
    pub did: String,
}

/// Request payload for rotating the key bound to a DID
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RotateKeyRequest {
    /// New public key, base58
    pub public_key: PublicKey,
    /// Signature over the new key bytes by the current key, base64url
    pub proof: String,
}

/// Request payload for a generic challenge
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChallengeRequest {
    pub kind: ChallengeKind,
}

/// Error body returned with every non-2xx status
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub code: ErrorKind,
    #[serde(default)]
    pub message: String,
}

/// API server state
#[derive(Clone)]
pub struct ApiServer {
    /// Issuer and verifier services
    flow: Arc<DemoFlow>,

    /// Upper bound on a single request
    request_timeout: Duration,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `flow` - Demo issuer/verifier services
    /// * `request_timeout` - Per-request timeout
    pub fn new(flow: Arc<DemoFlow>, request_timeout: Duration) -> Self {
        ApiServer {
            flow,
            request_timeout,
        }
    }

    /// Builds the router with every route and the timeout layer.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/dids", post(Self::create_did_handler))
            .route("/dids/:did", get(Self::resolve_did_handler))
            .route("/dids/:did/key", put(Self::rotate_key_handler))
            .route("/demo/actors", get(Self::actors_handler))
            .route("/license/challenge", post(Self::license_challenge_handler))
            .route("/license/issue", post(Self::issue_license_handler))
            .route("/rental/challenge", post(Self::rental_challenge_handler))
            .route("/rental/issue", post(Self::issue_rental_handler))
            .route("/access/challenge", post(Self::access_challenge_handler))
            .route("/access/verify", post(Self::verify_access_handler))
            .route("/challenges", post(Self::challenge_handler))
            .route("/presentations/verify", post(Self::verify_presentation_handler))
            .with_state(self.flow.clone())
            .layer(ServiceBuilder::new().layer(TimeoutLayer::new(self.request_timeout)))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    ///
    /// # Errors
    /// `Io` when the address cannot be bound or the server stops with an error.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), Error> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    // =====================
    // DID Management Handlers
    // =====================

    /// Creates a new DID for a public key
    ///
    /// # Endpoint
    /// POST /dids
    ///
    /// # Responses
    /// - 200 OK: Returns the DID
    /// - 400 Bad Request: Invalid method or key
    /// - 409 Conflict: Key already registered under the method
    async fn create_did_handler(
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<CreateDidRequest>,
    ) -> Response {
        match flow.create_did(&payload.method, payload.public_key) {
            Ok(did) => (
                StatusCode::OK,
                Json(CreateDidResponse {
                    did: did.to_string(),
                }),
            )
                .into_response(),
            Err(e) => error_response(e),
        }
    }

    /// Resolves a DID to its registry entry
    ///
    /// # Endpoint
    /// GET /dids/:did
    ///
    /// # Responses
    /// - 200 OK: Returns the DID document
    /// - 404 Not Found: DID is not registered
    async fn resolve_did_handler(
        Path(did): Path<String>,
        State(flow): State<Arc<DemoFlow>>,
    ) -> Response {
        match flow.resolve_did(&did) {
            Ok(document) => (StatusCode::OK, Json(document)).into_response(),
            Err(e) => error_response(e),
        }
    }

    /// Rotates the key bound to a DID
    ///
    /// # Endpoint
    /// PUT /dids/:did/key
    ///
    /// # Responses
    /// - 200 OK: Returns the updated DID document
    /// - 400 Bad Request: Proof is not base64url or does not verify
    /// - 404 Not Found: DID is not registered
    async fn rotate_key_handler(
        Path(did): Path<String>,
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<RotateKeyRequest>,
    ) -> Response {
        let proof = match b64url_decode(&payload.proof, "rotation proof") {
            Ok(proof) => proof,
            Err(e) => return error_response(e),
        };
        match flow.rotate_key(&did, payload.public_key, &proof) {
            Ok(document) => (StatusCode::OK, Json(document)).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn actors_handler(State(flow): State<Arc<DemoFlow>>) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.actors()))
    }

    // =====================
    // Demo Flow Handlers
    // =====================

    async fn license_challenge_handler(State(flow): State<Arc<DemoFlow>>) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.license_challenge()))
    }

    /// Verifies a simple presentation and issues a driver license
    ///
    /// # Endpoint
    /// POST /license/issue
    ///
    /// # Responses
    /// - 200 OK: Checklist plus the issued credential or the rejection reason
    async fn issue_license_handler(
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<IssueLicenseRequest>,
    ) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.issue_license(&payload)))
    }

    async fn rental_challenge_handler(State(flow): State<Arc<DemoFlow>>) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.rental_challenge()))
    }

    /// Verifies a presentation of the driver license and issues a rental agreement
    ///
    /// # Endpoint
    /// POST /rental/issue
    ///
    /// # Responses
    /// - 200 OK: Checklist plus the issued credential or the rejection reason
    async fn issue_rental_handler(
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<IssueRentalRequest>,
    ) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.issue_rental(&payload)))
    }

    async fn access_challenge_handler(State(flow): State<Arc<DemoFlow>>) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.access_challenge()))
    }

    /// Decides car access from a presentation of the rental agreement
    ///
    /// # Endpoint
    /// POST /access/verify
    ///
    /// # Responses
    /// - 200 OK: Access decision with the checklist
    /// - 400 Bad Request: Presentation is not a parseable token
    async fn verify_access_handler(
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<VerifyPresentationRequest>,
    ) -> Response {
        match flow.verify_access(&payload) {
            Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
            Err(e) => error_response(e),
        }
    }

    // =====================
    // Generic Verifier Handlers
    // =====================

    async fn challenge_handler(
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<ChallengeRequest>,
    ) -> impl IntoResponse {
        (StatusCode::OK, Json(flow.request_challenge(payload.kind)))
    }

    /// Verifies a presentation against a challenge from `POST /challenges`
    ///
    /// # Endpoint
    /// POST /presentations/verify
    ///
    /// # Responses
    /// - 200 OK: Full checklist
    /// - 400 Bad Request: Presentation is not a parseable token
    async fn verify_presentation_handler(
        State(flow): State<Arc<DemoFlow>>,
        Json(payload): Json<VerifyPresentationRequest>,
    ) -> Response {
        match flow.verify_presentation(&payload) {
            Ok(checks) => (StatusCode::OK, Json(checks)).into_response(),
            Err(e) => error_response(e),
        }
    }
}

/// HTTP status for a hard failure.
fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::MalformedToken(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::UnknownDid(_) => StatusCode::NOT_FOUND,
        Error::DidExists(_) => StatusCode::CONFLICT,
        Error::Transport(_) | Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
        Error::Signing(_) | Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!("request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            code: err.kind(),
            message: err.to_string(),
        }),
    )
        .into_response()
}
