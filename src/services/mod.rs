// src/services/mod.rs
pub mod api_server;
pub mod challenge_manager;
pub mod credential_issuer;
pub mod demo_flow;
pub mod scenario;
pub mod verifier;
